//! Hook types for streaming phases.
//!
//! A phase is defined by the subset of its hook slots a job fills in. Body
//! slots carry either in-process script code or an opaque external command
//! string; the distinction is fixed when the step is built and drives both
//! protocol negotiation and the step descriptions handed to orchestrators.

use serde_json::Value;

use crate::step::{PhaseDescription, PhaseImpl};

/// One decoded record: an opaque key and value.
///
/// Sequence order is significant everywhere pairs flow; nothing in this
/// crate sorts or reorders them.
pub type Pair = (Value, Value);

/// Init and final hooks run with no input and yield zero or more pairs.
pub type SetupFn = Box<dyn FnMut() -> anyhow::Result<Vec<Pair>>>;

/// Per-pair mapper body.
pub type MapFn = Box<dyn FnMut(Value, Value) -> anyhow::Result<Vec<Pair>>>;

/// Whole-file mapper body, invoked once with a local path and a source URI
/// instead of iterating decoded pairs.
pub type RawMapFn = Box<dyn FnMut(&str, &str) -> anyhow::Result<Vec<Pair>>>;

/// Per-run combiner/reducer body. The value iterator yields the current
/// key's run lazily, straight off the input stream; it must be consumed
/// within the call and only once.
pub type ReduceFn =
    Box<dyn FnMut(Value, &mut dyn Iterator<Item = Value>) -> anyhow::Result<Vec<Pair>>>;

/// Distributed-computation body, invoked once with input and output
/// locations.
pub type DistributedFn = Box<dyn FnMut(&str, &str) -> anyhow::Result<()>>;

/// A phase body: in-process script code, or an external command string
/// that some other harness will execute.
pub enum PhaseBody<F> {
    InProcess(F),
    ExternalCommand(String),
}

impl<F> PhaseBody<F> {
    pub fn is_command(&self) -> bool {
        matches!(self, PhaseBody::ExternalCommand(_))
    }

    fn command(&self) -> Option<&str> {
        match self {
            PhaseBody::ExternalCommand(cmd) => Some(cmd),
            PhaseBody::InProcess(_) => None,
        }
    }
}

/// Hook set for a mapper phase.
#[derive(Default)]
pub struct MapperPhase {
    pub(crate) body: Option<PhaseBody<MapFn>>,
    pub(crate) raw: Option<RawMapFn>,
    pub(crate) init: Option<SetupFn>,
    pub(crate) finish: Option<SetupFn>,
    pub(crate) pre_filter: Option<String>,
}

impl MapperPhase {
    pub fn is_empty(&self) -> bool {
        self.body.is_none()
            && self.raw.is_none()
            && self.init.is_none()
            && self.finish.is_none()
            && self.pre_filter.is_none()
    }

    /// True when the phase runs in-process rather than as a command.
    pub fn is_script(&self) -> bool {
        !self.is_empty() && !self.body.as_ref().is_some_and(PhaseBody::is_command)
    }

    pub fn description(&self) -> Option<PhaseDescription> {
        description(
            self.is_empty(),
            self.body.as_ref().and_then(PhaseBody::command),
            self.pre_filter.as_deref(),
        )
    }
}

/// Hook set for a combiner or reducer phase.
#[derive(Default)]
pub struct ReducerPhase {
    pub(crate) body: Option<PhaseBody<ReduceFn>>,
    pub(crate) init: Option<SetupFn>,
    pub(crate) finish: Option<SetupFn>,
    pub(crate) pre_filter: Option<String>,
}

impl ReducerPhase {
    pub fn is_empty(&self) -> bool {
        self.body.is_none()
            && self.init.is_none()
            && self.finish.is_none()
            && self.pre_filter.is_none()
    }

    pub fn is_script(&self) -> bool {
        !self.is_empty() && !self.body.as_ref().is_some_and(PhaseBody::is_command)
    }

    pub fn description(&self) -> Option<PhaseDescription> {
        description(
            self.is_empty(),
            self.body.as_ref().and_then(PhaseBody::command),
            self.pre_filter.as_deref(),
        )
    }
}

fn description(
    empty: bool,
    command: Option<&str>,
    pre_filter: Option<&str>,
) -> Option<PhaseDescription> {
    if empty {
        return None;
    }
    Some(PhaseDescription {
        kind: if command.is_some() {
            PhaseImpl::Command
        } else {
            PhaseImpl::Script
        },
        command: command.map(str::to_owned),
        pre_filter: pre_filter.map(str::to_owned),
    })
}
