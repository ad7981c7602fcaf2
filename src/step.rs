//! Steps and their externally visible descriptions.
//!
//! A step is the scheduling unit of a pipeline: either a streaming step
//! combining up to three phases (mapper, combiner, reducer) or exactly one
//! distributed computation. Steps are built once, at pipeline-definition
//! time, and never change afterwards.
//!
//! Each step summarizes itself as a [`StepDescription`]: a serializable
//! record naming which phases are present and whether each is script code
//! or an external command. Orchestrators plan external invocations from
//! these records without ever seeing hook bodies.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::job::hooks::{
    DistributedFn, MapFn, MapperPhase, Pair, PhaseBody, RawMapFn, ReduceFn, ReducerPhase, SetupFn,
};

/// Which phase of a step is being addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Mapper,
    Combiner,
    Reducer,
    Distributed,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseKind::Mapper => "mapper",
            PhaseKind::Combiner => "combiner",
            PhaseKind::Reducer => "reducer",
            PhaseKind::Distributed => "distributed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Streaming,
    Distributed,
}

/// Externally visible classification of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseImpl {
    Script,
    Command,
}

/// One phase's entry in a step description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDescription {
    #[serde(rename = "type")]
    pub kind: PhaseImpl,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_filter: Option<String>,
}

/// Serializable summary of one step, in the shape orchestrators consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescription {
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapper: Option<PhaseDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combiner: Option<PhaseDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reducer: Option<PhaseDescription>,
}

/// One scheduling unit of a pipeline.
pub enum Step {
    Streaming(StreamingStep),
    Distributed(DistributedStep),
}

impl Step {
    /// A step wrapping one opaque distributed computation.
    pub fn distributed<F>(run: F) -> Self
    where
        F: FnMut(&str, &str) -> anyhow::Result<()> + 'static,
    {
        Step::Distributed(DistributedStep {
            run: Box::new(run),
        })
    }

    pub fn kind(&self) -> StepKind {
        match self {
            Step::Streaming(_) => StepKind::Streaming,
            Step::Distributed(_) => StepKind::Distributed,
        }
    }

    pub fn description(&self) -> StepDescription {
        match self {
            Step::Streaming(step) => StepDescription {
                kind: StepKind::Streaming,
                mapper: step.mapper.description(),
                combiner: step.combiner.description(),
                reducer: step.reducer.description(),
            },
            Step::Distributed(_) => StepDescription {
                kind: StepKind::Distributed,
                mapper: None,
                combiner: None,
                reducer: None,
            },
        }
    }
}

/// Up to three streaming phases driven over record streams.
#[derive(Default)]
pub struct StreamingStep {
    pub(crate) mapper: MapperPhase,
    pub(crate) combiner: ReducerPhase,
    pub(crate) reducer: ReducerPhase,
}

/// A distributed-computation step carries no phase hook set, only the
/// computation itself.
pub struct DistributedStep {
    pub(crate) run: DistributedFn,
}

/// Builder for a streaming step.
///
/// Each hook slot accepts either in-process script code or, for body
/// slots, an external command string. Command strings are stored as
/// literals when the step is built and never re-evaluated.
#[derive(Default)]
pub struct StepBuilder {
    map_fn: Option<MapFn>,
    map_raw: Option<RawMapFn>,
    map_init: Option<SetupFn>,
    map_final: Option<SetupFn>,
    map_cmd: Option<String>,
    map_pre_filter: Option<String>,
    combine_fn: Option<ReduceFn>,
    combine_init: Option<SetupFn>,
    combine_final: Option<SetupFn>,
    combine_cmd: Option<String>,
    combine_pre_filter: Option<String>,
    reduce_fn: Option<ReduceFn>,
    reduce_init: Option<SetupFn>,
    reduce_final: Option<SetupFn>,
    reduce_cmd: Option<String>,
    reduce_pre_filter: Option<String>,
}

impl StepBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mapper<F>(mut self, f: F) -> Self
    where
        F: FnMut(Value, Value) -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.map_fn = Some(Box::new(f));
        self
    }

    /// Mapper body that receives one whole input file (local path and
    /// source URI) instead of decoded pairs.
    pub fn mapper_raw<F>(mut self, f: F) -> Self
    where
        F: FnMut(&str, &str) -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.map_raw = Some(Box::new(f));
        self
    }

    pub fn mapper_init<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.map_init = Some(Box::new(f));
        self
    }

    pub fn mapper_final<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.map_final = Some(Box::new(f));
        self
    }

    /// Mapper as an external command, passed through to the surrounding
    /// harness unchanged.
    pub fn mapper_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.map_cmd = Some(cmd.into());
        self
    }

    /// Shell command that filters mapper input before it reaches the
    /// mapper. Described to orchestrators, never executed here.
    pub fn mapper_pre_filter(mut self, cmd: impl Into<String>) -> Self {
        self.map_pre_filter = Some(cmd.into());
        self
    }

    pub fn combiner<F>(mut self, f: F) -> Self
    where
        F: FnMut(Value, &mut dyn Iterator<Item = Value>) -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.combine_fn = Some(Box::new(f));
        self
    }

    pub fn combiner_init<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.combine_init = Some(Box::new(f));
        self
    }

    pub fn combiner_final<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.combine_final = Some(Box::new(f));
        self
    }

    pub fn combiner_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.combine_cmd = Some(cmd.into());
        self
    }

    pub fn combiner_pre_filter(mut self, cmd: impl Into<String>) -> Self {
        self.combine_pre_filter = Some(cmd.into());
        self
    }

    pub fn reducer<F>(mut self, f: F) -> Self
    where
        F: FnMut(Value, &mut dyn Iterator<Item = Value>) -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.reduce_fn = Some(Box::new(f));
        self
    }

    pub fn reducer_init<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.reduce_init = Some(Box::new(f));
        self
    }

    pub fn reducer_final<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.reduce_final = Some(Box::new(f));
        self
    }

    pub fn reducer_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.reduce_cmd = Some(cmd.into());
        self
    }

    pub fn reducer_pre_filter(mut self, cmd: impl Into<String>) -> Self {
        self.reduce_pre_filter = Some(cmd.into());
        self
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.map_fn.is_none()
            && self.map_raw.is_none()
            && self.map_init.is_none()
            && self.map_final.is_none()
            && self.map_cmd.is_none()
            && self.map_pre_filter.is_none()
            && self.combine_fn.is_none()
            && self.combine_init.is_none()
            && self.combine_final.is_none()
            && self.combine_cmd.is_none()
            && self.combine_pre_filter.is_none()
            && self.reduce_fn.is_none()
            && self.reduce_init.is_none()
            && self.reduce_final.is_none()
            && self.reduce_cmd.is_none()
            && self.reduce_pre_filter.is_none()
    }

    pub fn build(self) -> Result<Step> {
        if self.is_empty() {
            return Err(Error::config("step has no mappers, combiners, or reducers"));
        }

        let mapper = build_mapper(
            self.map_fn,
            self.map_raw,
            self.map_init,
            self.map_final,
            self.map_cmd,
            self.map_pre_filter,
        )?;
        let combiner = build_reducer(
            PhaseKind::Combiner,
            self.combine_fn,
            self.combine_init,
            self.combine_final,
            self.combine_cmd,
            self.combine_pre_filter,
        )?;
        let reducer = build_reducer(
            PhaseKind::Reducer,
            self.reduce_fn,
            self.reduce_init,
            self.reduce_final,
            self.reduce_cmd,
            self.reduce_pre_filter,
        )?;

        Ok(Step::Streaming(StreamingStep {
            mapper,
            combiner,
            reducer,
        }))
    }
}

fn build_mapper(
    body: Option<MapFn>,
    raw: Option<RawMapFn>,
    init: Option<SetupFn>,
    finish: Option<SetupFn>,
    cmd: Option<String>,
    pre_filter: Option<String>,
) -> Result<MapperPhase> {
    if let Some(cmd) = cmd {
        if body.is_some()
            || raw.is_some()
            || init.is_some()
            || finish.is_some()
            || pre_filter.is_some()
        {
            return Err(Error::config(
                "can't combine a mapper command with other mapper hooks",
            ));
        }
        return Ok(MapperPhase {
            body: Some(PhaseBody::ExternalCommand(cmd)),
            ..MapperPhase::default()
        });
    }
    if body.is_some() && raw.is_some() {
        return Err(Error::config("can't define both mapper and mapper_raw"));
    }
    Ok(MapperPhase {
        body: body.map(PhaseBody::InProcess),
        raw,
        init,
        finish,
        pre_filter,
    })
}

fn build_reducer(
    kind: PhaseKind,
    body: Option<ReduceFn>,
    init: Option<SetupFn>,
    finish: Option<SetupFn>,
    cmd: Option<String>,
    pre_filter: Option<String>,
) -> Result<ReducerPhase> {
    if let Some(cmd) = cmd {
        if body.is_some() || init.is_some() || finish.is_some() || pre_filter.is_some() {
            return Err(Error::config(format!(
                "can't combine a {kind} command with other {kind} hooks"
            )));
        }
        return Ok(ReducerPhase {
            body: Some(PhaseBody::ExternalCommand(cmd)),
            ..ReducerPhase::default()
        });
    }
    Ok(ReducerPhase {
        body: body.map(PhaseBody::InProcess),
        init,
        finish,
        pre_filter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_step_is_rejected() {
        let result = StepBuilder::new().build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn command_and_script_hooks_conflict() {
        let result = StepBuilder::new()
            .mapper_cmd("cat")
            .mapper_init(|| Ok(vec![]))
            .build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn mapper_and_mapper_raw_conflict() {
        let result = StepBuilder::new()
            .mapper(|k, v| Ok(vec![(k, v)]))
            .mapper_raw(|_, _| Ok(vec![]))
            .build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn description_classifies_script_and_command() -> Result<()> {
        let step = StepBuilder::new()
            .mapper(|k, v| Ok(vec![(k, v)]))
            .mapper_pre_filter("grep x")
            .reducer_cmd("uniq -c")
            .build()?;

        let desc = step.description();
        assert_eq!(desc.kind, StepKind::Streaming);

        let mapper = desc.mapper.as_ref().ok_or_else(|| Error::config("no mapper"))?;
        assert_eq!(mapper.kind, PhaseImpl::Script);
        assert_eq!(mapper.command, None);
        assert_eq!(mapper.pre_filter.as_deref(), Some("grep x"));

        let reducer = desc.reducer.as_ref().ok_or_else(|| Error::config("no reducer"))?;
        assert_eq!(reducer.kind, PhaseImpl::Command);
        assert_eq!(reducer.command.as_deref(), Some("uniq -c"));

        assert_eq!(desc.combiner, None);
        Ok(())
    }

    #[test]
    fn description_serializes_without_hook_bodies() -> Result<()> {
        let step = StepBuilder::new()
            .mapper(|_k, v| Ok(vec![(json!("fixed"), v)]))
            .build()?;
        let text = serde_json::to_string(&step.description())?;
        assert_eq!(text, r#"{"type":"streaming","mapper":{"type":"script"}}"#);
        Ok(())
    }

    #[test]
    fn distributed_description_names_no_phases() {
        let step = Step::distributed(|_input, _output| Ok(()));
        let desc = step.description();
        assert_eq!(desc.kind, StepKind::Distributed);
        assert!(desc.mapper.is_none() && desc.combiner.is_none() && desc.reducer.is_none());
    }
}
