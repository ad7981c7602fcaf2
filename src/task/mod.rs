//! Task dispatch.
//!
//! Routes one external directive to the matching phase invocation. For
//! streaming phases the dispatcher wires the full chain: byte source →
//! read-protocol decode → phase execution → write-protocol encode → sink,
//! one record terminator per output record. Every stage is pulled lazily;
//! the sink's pull rate paces the whole chain.

pub(crate) mod source;

use std::io::{self, Read, Write};

use tracing::debug;

use crate::error::{Error, Result};
use crate::exec;
use crate::job::hooks::Pair;
use crate::job::Job;
use crate::protocol::negotiate;
use crate::protocol::Protocol;
use crate::step::{PhaseKind, Step};

use self::source::{expand_sources, Records, SourceState};

/// One external operation on a job. Exactly one branch per dispatch; the
/// enum makes simultaneous selection unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Print the pipeline's step descriptions as one JSON record.
    ShowSteps,
    /// Run one step's mapper phase. Positional arguments name input
    /// sources, or carry the raw mapper's local path and source URI.
    RunMapper { step: usize, args: Vec<String> },
    /// Run one step's combiner phase.
    RunCombiner { step: usize, args: Vec<String> },
    /// Run one step's reducer phase.
    RunReducer { step: usize, args: Vec<String> },
    /// Run one distributed step with its input and output locations.
    RunDistributed { step: usize, args: Vec<String> },
}

/// Byte streams a dispatch runs against. Defaults to the process
/// streams; tests substitute in-memory buffers.
pub struct TaskIo {
    pub input: Box<dyn Read>,
    pub output: Box<dyn Write>,
}

impl Default for TaskIo {
    fn default() -> Self {
        TaskIo {
            input: Box::new(io::stdin()),
            output: Box::new(io::stdout()),
        }
    }
}

pub struct Dispatcher<'a> {
    job: &'a mut Job,
    io: TaskIo,
}

impl<'a> Dispatcher<'a> {
    pub fn new(job: &'a mut Job, io: TaskIo) -> Self {
        Dispatcher { job, io }
    }

    pub fn execute(&mut self, directive: &Directive) -> Result<()> {
        debug!(?directive, "dispatching");
        match directive {
            Directive::ShowSteps => self.show_steps(),
            Directive::RunMapper { step, args } => {
                self.run_streaming(*step, PhaseKind::Mapper, args)
            }
            Directive::RunCombiner { step, args } => {
                self.run_streaming(*step, PhaseKind::Combiner, args)
            }
            Directive::RunReducer { step, args } => {
                self.run_streaming(*step, PhaseKind::Reducer, args)
            }
            Directive::RunDistributed { step, args } => self.run_distributed(*step, args),
        }
    }

    /// Serialize the step descriptions as one JSON record. Descriptions
    /// are pure data, so identical pipelines print identical bytes.
    fn show_steps(&mut self) -> Result<()> {
        let record = serde_json::to_vec(&self.job.descriptions())?;
        self.io.output.write_all(&record)?;
        self.io.output.write_all(b"\n")?;
        self.io.output.flush()?;
        Ok(())
    }

    fn run_streaming(&mut self, index: usize, phase: PhaseKind, args: &[String]) -> Result<()> {
        let assignment = negotiate::resolve(&self.job.descriptions(), index, phase)?;
        debug!(step = index, %phase, ?assignment, "running streaming phase");

        let (step, read_protocol, write_protocol) =
            self.job.streaming_parts(index, assignment)?;

        let units = expand_sources(args)?;
        let mut state = SourceState::default();
        let TaskIo { input, output } = &mut self.io;
        let records = Records::new(units, input.as_mut(), &mut state);
        let pairs =
            records.map(|record| record.and_then(|bytes| read_protocol.decode(&bytes)));

        match phase {
            PhaseKind::Mapper => write_pairs(
                exec::map_pairs(&mut step.mapper, pairs, args),
                write_protocol,
                output.as_mut(),
            ),
            PhaseKind::Combiner => write_pairs(
                exec::reduce_pairs(&mut step.combiner, phase, pairs)?,
                write_protocol,
                output.as_mut(),
            ),
            PhaseKind::Reducer => write_pairs(
                exec::reduce_pairs(&mut step.reducer, phase, pairs)?,
                write_protocol,
                output.as_mut(),
            ),
            PhaseKind::Distributed => {
                Err(Error::config("distributed phases don't stream records"))
            }
        }
    }

    fn run_distributed(&mut self, index: usize, args: &[String]) -> Result<()> {
        let step = self.job.step_mut(index)?;
        let distributed = match step {
            Step::Distributed(distributed) => distributed,
            Step::Streaming(_) => {
                return Err(Error::config(format!(
                    "step {index} is not a distributed step"
                )));
            }
        };
        if args.len() != 2 {
            return Err(Error::ArgumentArity {
                expected: 2,
                actual: args.len(),
            });
        }
        debug!(step = index, input = %args[0], output = %args[1], "running distributed step");
        (distributed.run)(&args[0], &args[1])?;
        Ok(())
    }
}

fn write_pairs<I>(pairs: I, protocol: &dyn Protocol, output: &mut dyn Write) -> Result<()>
where
    I: Iterator<Item = Result<Pair>>,
{
    for pair in pairs {
        let (key, value) = pair?;
        let record = protocol.encode(&key, &value)?;
        output.write_all(&record)?;
        output.write_all(b"\n")?;
    }
    output.flush()?;
    Ok(())
}
