//! Job definition.
//!
//! A [`Job`] is an immutable pipeline of steps plus the three wire
//! protocols that govern its boundaries: one for decoding job input, one
//! for interior hand-offs between steps, and one for encoding final
//! output. Jobs are assembled through [`JobBuilder`], which either
//! synthesizes a single step from the hooks a job registers or takes an
//! explicit pipeline verbatim.

pub mod hooks;

use std::io::BufRead;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::job::hooks::{DistributedFn, Pair};
use crate::pipeline;
use crate::protocol::negotiate;
use crate::protocol::{
    JsonProtocol, Protocol, ProtocolAssignment, ProtocolRole, RawValueProtocol,
};
use crate::step::{PhaseKind, Step, StepBuilder, StepDescription, StreamingStep};

const RAW_PASSTHROUGH: RawValueProtocol = RawValueProtocol;

pub struct Job {
    steps: Vec<Step>,
    input_protocol: Box<dyn Protocol>,
    internal_protocol: Box<dyn Protocol>,
    output_protocol: Box<dyn Protocol>,
}

impl Job {
    pub fn builder() -> JobBuilder {
        JobBuilder::new()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Serializable descriptions of every step, in pipeline order.
    pub fn descriptions(&self) -> Vec<StepDescription> {
        self.steps.iter().map(Step::description).collect()
    }

    /// Resolve which wire formats govern one (step, phase) boundary.
    /// Cheap and pure; recomputed per dispatch.
    pub fn pick_protocols(&self, step: usize, phase: PhaseKind) -> Result<ProtocolAssignment> {
        negotiate::resolve(&self.descriptions(), step, phase)
    }

    pub(crate) fn step_mut(&mut self, index: usize) -> Result<&mut Step> {
        let count = self.steps.len();
        self.steps
            .get_mut(index)
            .ok_or_else(|| Error::config(format!("out-of-range step: {index} of {count}")))
    }

    /// The streaming step at `index` along with the protocols for the
    /// resolved read and write roles.
    pub(crate) fn streaming_parts(
        &mut self,
        index: usize,
        assignment: ProtocolAssignment,
    ) -> Result<(&mut StreamingStep, &dyn Protocol, &dyn Protocol)> {
        let Job {
            steps,
            input_protocol,
            internal_protocol,
            output_protocol,
        } = self;
        let count = steps.len();
        let step = match steps.get_mut(index) {
            Some(Step::Streaming(step)) => step,
            Some(Step::Distributed(_)) => {
                return Err(Error::config(format!(
                    "step {index} is not a streaming step"
                )));
            }
            None => {
                return Err(Error::config(format!(
                    "out-of-range step: {index} of {count}"
                )));
            }
        };
        let read = protocol_for(
            assignment.read,
            &**input_protocol,
            &**internal_protocol,
            &**output_protocol,
        );
        let write = protocol_for(
            assignment.write,
            &**input_protocol,
            &**internal_protocol,
            &**output_protocol,
        );
        Ok((step, read, write))
    }

    /// Decode a finished job's output stream into pairs with the job's
    /// output protocol.
    pub fn parse_output<R: BufRead>(&self, reader: R) -> OutputPairs<'_, R> {
        OutputPairs {
            protocol: self.output_protocol.as_ref(),
            reader,
            done: false,
        }
    }
}

fn protocol_for<'p>(
    role: ProtocolRole,
    input: &'p dyn Protocol,
    internal: &'p dyn Protocol,
    output: &'p dyn Protocol,
) -> &'p dyn Protocol {
    match role {
        ProtocolRole::Input => input,
        ProtocolRole::Internal => internal,
        ProtocolRole::Output => output,
        ProtocolRole::Raw => &RAW_PASSTHROUGH,
    }
}

/// Iterator over decoded pairs of a job's final output.
pub struct OutputPairs<'a, R> {
    protocol: &'a dyn Protocol,
    reader: R,
    done: bool,
}

impl<'a, R: BufRead> Iterator for OutputPairs<'a, R> {
    type Item = Result<Pair>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut record = Vec::new();
        match self.reader.read_until(b'\n', &mut record) {
            Ok(0) => None,
            Ok(_) => {
                if record.last() == Some(&b'\n') {
                    record.pop();
                    if record.last() == Some(&b'\r') {
                        record.pop();
                    }
                }
                Some(self.protocol.decode(&record))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err.into()))
            }
        }
    }
}

/// Builder for a [`Job`].
///
/// Hooks registered here describe a single implicit step; supplying an
/// explicit pipeline with [`JobBuilder::pipeline`] takes precedence and
/// uses it verbatim. A distributed hook must be the only hook provided.
pub struct JobBuilder {
    hooks: StepBuilder,
    distributed: Option<DistributedFn>,
    explicit: Option<Vec<Step>>,
    input_protocol: Box<dyn Protocol>,
    internal_protocol: Box<dyn Protocol>,
    output_protocol: Box<dyn Protocol>,
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl JobBuilder {
    pub fn new() -> Self {
        JobBuilder {
            hooks: StepBuilder::new(),
            distributed: None,
            explicit: None,
            input_protocol: Box::new(RawValueProtocol),
            internal_protocol: Box::new(JsonProtocol),
            output_protocol: Box::new(JsonProtocol),
        }
    }

    pub fn mapper<F>(mut self, f: F) -> Self
    where
        F: FnMut(Value, Value) -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.hooks = self.hooks.mapper(f);
        self
    }

    pub fn mapper_raw<F>(mut self, f: F) -> Self
    where
        F: FnMut(&str, &str) -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.hooks = self.hooks.mapper_raw(f);
        self
    }

    pub fn mapper_init<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.hooks = self.hooks.mapper_init(f);
        self
    }

    pub fn mapper_final<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.hooks = self.hooks.mapper_final(f);
        self
    }

    pub fn mapper_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.hooks = self.hooks.mapper_cmd(cmd);
        self
    }

    pub fn mapper_pre_filter(mut self, cmd: impl Into<String>) -> Self {
        self.hooks = self.hooks.mapper_pre_filter(cmd);
        self
    }

    pub fn combiner<F>(mut self, f: F) -> Self
    where
        F: FnMut(Value, &mut dyn Iterator<Item = Value>) -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.hooks = self.hooks.combiner(f);
        self
    }

    pub fn combiner_init<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.hooks = self.hooks.combiner_init(f);
        self
    }

    pub fn combiner_final<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.hooks = self.hooks.combiner_final(f);
        self
    }

    pub fn combiner_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.hooks = self.hooks.combiner_cmd(cmd);
        self
    }

    pub fn combiner_pre_filter(mut self, cmd: impl Into<String>) -> Self {
        self.hooks = self.hooks.combiner_pre_filter(cmd);
        self
    }

    pub fn reducer<F>(mut self, f: F) -> Self
    where
        F: FnMut(Value, &mut dyn Iterator<Item = Value>) -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.hooks = self.hooks.reducer(f);
        self
    }

    pub fn reducer_init<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.hooks = self.hooks.reducer_init(f);
        self
    }

    pub fn reducer_final<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> anyhow::Result<Vec<Pair>> + 'static,
    {
        self.hooks = self.hooks.reducer_final(f);
        self
    }

    pub fn reducer_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.hooks = self.hooks.reducer_cmd(cmd);
        self
    }

    pub fn reducer_pre_filter(mut self, cmd: impl Into<String>) -> Self {
        self.hooks = self.hooks.reducer_pre_filter(cmd);
        self
    }

    /// One opaque distributed computation, invoked with input and output
    /// locations. Must be the only hook the job provides.
    pub fn distributed<F>(mut self, f: F) -> Self
    where
        F: FnMut(&str, &str) -> anyhow::Result<()> + 'static,
    {
        self.distributed = Some(Box::new(f));
        self
    }

    /// Use an explicit pipeline verbatim instead of synthesizing one from
    /// job-level hooks.
    pub fn pipeline(mut self, steps: Vec<Step>) -> Self {
        self.explicit = Some(steps);
        self
    }

    /// Protocol for decoding job input. Defaults to [`RawValueProtocol`].
    pub fn input_protocol<P: Protocol + 'static>(mut self, protocol: P) -> Self {
        self.input_protocol = Box::new(protocol);
        self
    }

    /// Protocol for hand-offs between interior phases. Defaults to
    /// [`JsonProtocol`].
    pub fn internal_protocol<P: Protocol + 'static>(mut self, protocol: P) -> Self {
        self.internal_protocol = Box::new(protocol);
        self
    }

    /// Protocol for encoding final output. Defaults to [`JsonProtocol`].
    pub fn output_protocol<P: Protocol + 'static>(mut self, protocol: P) -> Self {
        self.output_protocol = Box::new(protocol);
        self
    }

    pub fn build(self) -> Result<Job> {
        let steps = pipeline::synthesize(self.hooks, self.distributed, self.explicit)?;
        Ok(Job {
            steps,
            input_protocol: self.input_protocol,
            internal_protocol: self.internal_protocol,
            output_protocol: self.output_protocol,
        })
    }
}
