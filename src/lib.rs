//! # Switchyard
//!
//! Define a multi-step map/combine/reduce job as plain Rust functions and
//! run each phase over newline-delimited record streams.
//!
//! A job is a pipeline of steps. A streaming step combines up to three
//! phases (mapper, combiner, reducer); a distributed step wraps one opaque
//! distributed computation. Hooks registered on [`JobBuilder`] synthesize
//! a single implicit step, or an explicit pipeline can be supplied. For
//! every phase boundary the crate negotiates which wire format governs
//! reading and writing, so a pipeline decodes its input once, encodes its
//! output once, and hands records between interior phases in one shared
//! internal format.
//!
//! ```no_run
//! use serde_json::{json, Value};
//! use switchyard::Job;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut job = Job::builder()
//!         .mapper(|_key, value| {
//!             let line = value.as_str().unwrap_or_default().to_owned();
//!             Ok(line
//!                 .split_whitespace()
//!                 .map(|word| (json!(word), json!(1)))
//!                 .collect())
//!         })
//!         .reducer(|key, values: &mut dyn Iterator<Item = Value>| {
//!             let total: i64 = values.filter_map(|v| v.as_i64()).sum();
//!             Ok(vec![(key, json!(total))])
//!         })
//!         .build()?;
//!     switchyard::cli::run(&mut job)
//! }
//! ```
//!
//! ## Modules
//!
//! - `job` - job definition: hook registration and protocol selection
//! - `step` - steps and their externally visible descriptions
//! - `pipeline` - step pipeline synthesis
//! - `protocol` - wire protocols and role negotiation
//! - `exec` - per-phase execution over pair streams
//! - `task` - directive dispatch over byte streams
//! - `report` - counter/status side channel
//! - `cli` - argv-to-directive layer

pub mod cli;
pub mod error;
pub mod exec;
pub mod job;
pub mod pipeline;
pub mod protocol;
pub mod report;
pub mod step;
pub mod task;

pub use error::{Error, Result};
pub use job::hooks::Pair;
pub use job::{Job, JobBuilder};
pub use protocol::{
    JsonProtocol, JsonValueProtocol, Protocol, ProtocolAssignment, ProtocolRole,
    RawValueProtocol,
};
pub use report::Reporter;
pub use step::{PhaseKind, Step, StepBuilder, StepDescription};
pub use task::{Directive, Dispatcher, TaskIo};
