//! Step pipeline synthesis.
//!
//! A job either supplies an explicit pipeline, which is used verbatim, or
//! registers hooks at the job level, from which exactly one step is
//! synthesized. A distributed hook must be the only hook a job provides.
//! Registering nothing yields an empty pipeline, which is legal: there is
//! nothing to run.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::job::hooks::DistributedFn;
use crate::step::{Step, StepBuilder, StepKind};

/// Build the ordered step list for a job from what it registered.
pub fn synthesize(
    hooks: StepBuilder,
    distributed: Option<DistributedFn>,
    explicit: Option<Vec<Step>>,
) -> Result<Vec<Step>> {
    if let Some(steps) = explicit {
        if !hooks.is_empty() || distributed.is_some() {
            warn!("job-level hooks are ignored when an explicit pipeline is supplied");
        }
        validate(&steps)?;
        debug!(steps = steps.len(), "using explicit pipeline");
        return Ok(steps);
    }

    if let Some(run) = distributed {
        if !hooks.is_empty() {
            return Err(Error::config(
                "can't mix a distributed hook with mapper, combiner, or reducer hooks",
            ));
        }
        debug!("synthesized single distributed step");
        return Ok(vec![Step::Distributed(crate::step::DistributedStep {
            run,
        })]);
    }

    if hooks.is_empty() {
        debug!("no hooks provided; pipeline is empty");
        return Ok(vec![]);
    }

    let step = hooks.build()?;
    debug!("synthesized single streaming step");
    Ok(vec![step])
}

/// An explicit pipeline never mixes streaming and distributed steps.
fn validate(steps: &[Step]) -> Result<()> {
    let distributed = steps
        .iter()
        .filter(|step| step.kind() == StepKind::Distributed)
        .count();
    if distributed > 0 && distributed != steps.len() {
        return Err(Error::config(
            "a pipeline can't mix distributed steps with streaming steps",
        ));
    }
    Ok(())
}
