//! Command-line directive layer.
//!
//! Converts argv into one dispatch directive and drives the dispatcher
//! against the process streams. The core never parses argv itself; a job
//! binary's `main` hands its built [`Job`] to [`run`].

use std::io;

use clap::Parser;
use tracing::debug;

use crate::job::Job;
use crate::task::{Directive, Dispatcher, TaskIo};

/// Task-side command line, as an external orchestrator invokes it.
#[derive(Debug, Parser)]
#[command(about = "Run one phase of a streaming job", long_about = None)]
pub struct TaskCli {
    /// Print the pipeline's step descriptions as JSON and exit
    #[arg(long = "steps", group = "operation")]
    pub show_steps: bool,

    /// Run a mapper phase
    #[arg(long, group = "operation")]
    pub mapper: bool,

    /// Run a combiner phase
    #[arg(long, group = "operation")]
    pub combiner: bool,

    /// Run a reducer phase
    #[arg(long, group = "operation")]
    pub reducer: bool,

    /// Run a distributed-computation phase
    #[arg(long, group = "operation")]
    pub distributed: bool,

    /// Which step to run (0-indexed)
    #[arg(long, default_value_t = 0)]
    pub step_num: usize,

    /// Input sources (`-` for stdin), or the two positional locations for
    /// raw-mapper and distributed phases
    pub args: Vec<String>,

    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl TaskCli {
    /// The directive this command line selects, if any.
    pub fn directive(&self) -> Option<Directive> {
        let step = self.step_num;
        let args = self.args.clone();
        if self.show_steps {
            Some(Directive::ShowSteps)
        } else if self.mapper {
            Some(Directive::RunMapper { step, args })
        } else if self.combiner {
            Some(Directive::RunCombiner { step, args })
        } else if self.reducer {
            Some(Directive::RunReducer { step, args })
        } else if self.distributed {
            Some(Directive::RunDistributed { step, args })
        } else {
            None
        }
    }
}

/// Parse argv, initialize logging, and execute one directive against
/// `job` over the process streams.
pub fn run(job: &mut Job) -> anyhow::Result<()> {
    let cli = TaskCli::parse();
    init_logging(cli.verbose);
    debug!(verbose = cli.verbose, "task started");

    let directive = cli.directive().ok_or_else(|| {
        anyhow::anyhow!(
            "no operation selected; pass --steps, --mapper, --combiner, \
             --reducer, or --distributed"
        )
    })?;

    let mut dispatcher = Dispatcher::new(job, TaskIo::default());
    dispatcher.execute(&directive)?;
    Ok(())
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // records go to stdout; diagnostics must stay on stderr
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(verbose >= 2)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}
