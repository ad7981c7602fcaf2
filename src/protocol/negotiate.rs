//! Protocol role negotiation.
//!
//! Resolves which wire format governs reading and writing at one
//! (step, phase) boundary, given the pipeline's step descriptions. The
//! first script phase in pipeline order reads the input format, the last
//! writes the output format, and every interior hand-off uses the shared
//! internal format, so a pipeline decodes its input exactly once and
//! encodes its output exactly once regardless of step count.
//!
//! Combiners are excluded from the ordering: they may run any number of
//! times without changing the shape of the data, so they read and write
//! whatever their step's mapper writes. When that mapper is an external
//! command, records never get decoded in-process at all and the combiner
//! boundary degrades to raw pass-through.

use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::{ProtocolAssignment, ProtocolRole};
use crate::step::{PhaseImpl, PhaseKind, StepDescription};

/// Script phases among {mapper, reducer}, in pipeline order. A phase's
/// index in this table is its position in the global decode/encode chain.
fn script_phase_table(steps: &[StepDescription]) -> Vec<(usize, PhaseKind)> {
    let mut table = Vec::new();
    for (index, step) in steps.iter().enumerate() {
        for (phase, description) in [
            (PhaseKind::Mapper, &step.mapper),
            (PhaseKind::Reducer, &step.reducer),
        ] {
            if let Some(description) = description {
                if description.kind == PhaseImpl::Script {
                    table.push((index, phase));
                }
            }
        }
    }
    table
}

fn position(table: &[(usize, PhaseKind)], step: usize, phase: PhaseKind) -> Option<usize> {
    table.iter().position(|&entry| entry == (step, phase))
}

/// The write role of a step's mapper, or raw pass-through when that mapper
/// is not script code.
fn mapper_write_role(table: &[(usize, PhaseKind)], step: usize) -> ProtocolRole {
    match position(table, step, PhaseKind::Mapper) {
        Some(pos) if pos + 1 >= table.len() => ProtocolRole::Output,
        Some(_) => ProtocolRole::Internal,
        None => ProtocolRole::Raw,
    }
}

/// Resolve the read and write roles for one (step, phase) boundary.
///
/// Fails with [`Error::ProtocolResolution`] when the requested phase is
/// not script code: command phases are executed by an external harness
/// and never decode or encode records here.
pub fn resolve(
    steps: &[StepDescription],
    step: usize,
    phase: PhaseKind,
) -> Result<ProtocolAssignment> {
    let table = script_phase_table(steps);

    let assignment = if phase == PhaseKind::Combiner {
        let role = mapper_write_role(&table, step);
        ProtocolAssignment {
            read: role,
            write: role,
        }
    } else {
        let pos =
            position(&table, step, phase).ok_or(Error::ProtocolResolution { step, phase })?;
        ProtocolAssignment {
            read: if pos == 0 {
                ProtocolRole::Input
            } else {
                ProtocolRole::Internal
            },
            write: if pos + 1 == table.len() {
                ProtocolRole::Output
            } else {
                ProtocolRole::Internal
            },
        }
    };

    trace!(step, %phase, ?assignment, "resolved protocol roles");
    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{PhaseDescription, StepKind};

    fn phase(kind: PhaseImpl) -> Option<PhaseDescription> {
        Some(PhaseDescription {
            kind,
            command: None,
            pre_filter: None,
        })
    }

    fn streaming(
        mapper: Option<PhaseDescription>,
        combiner: Option<PhaseDescription>,
        reducer: Option<PhaseDescription>,
    ) -> StepDescription {
        StepDescription {
            kind: StepKind::Streaming,
            mapper,
            combiner,
            reducer,
        }
    }

    #[test]
    fn single_script_phase_reads_input_and_writes_output() -> Result<()> {
        let steps = [streaming(phase(PhaseImpl::Script), None, None)];
        let assignment = resolve(&steps, 0, PhaseKind::Mapper)?;
        assert_eq!(assignment.read, ProtocolRole::Input);
        assert_eq!(assignment.write, ProtocolRole::Output);
        Ok(())
    }

    #[test]
    fn command_phases_are_invisible_to_the_table() -> Result<()> {
        // A command mapper ahead of a script reducer leaves the reducer as
        // both the first and last script phase.
        let steps = [streaming(
            phase(PhaseImpl::Command),
            None,
            phase(PhaseImpl::Script),
        )];
        let assignment = resolve(&steps, 0, PhaseKind::Reducer)?;
        assert_eq!(assignment.read, ProtocolRole::Input);
        assert_eq!(assignment.write, ProtocolRole::Output);
        Ok(())
    }

    #[test]
    fn combiner_behind_command_mapper_degrades_to_raw() -> Result<()> {
        let steps = [streaming(
            phase(PhaseImpl::Command),
            phase(PhaseImpl::Script),
            phase(PhaseImpl::Script),
        )];
        let assignment = resolve(&steps, 0, PhaseKind::Combiner)?;
        assert_eq!(assignment.read, ProtocolRole::Raw);
        assert_eq!(assignment.write, ProtocolRole::Raw);
        Ok(())
    }

    #[test]
    fn non_script_phase_cannot_resolve() {
        let steps = [streaming(phase(PhaseImpl::Command), None, None)];
        let result = resolve(&steps, 0, PhaseKind::Mapper);
        assert!(matches!(
            result,
            Err(Error::ProtocolResolution {
                step: 0,
                phase: PhaseKind::Mapper
            })
        ));
    }

    #[test]
    fn absent_phase_cannot_resolve() {
        let steps = [streaming(phase(PhaseImpl::Script), None, None)];
        let result = resolve(&steps, 0, PhaseKind::Reducer);
        assert!(matches!(result, Err(Error::ProtocolResolution { .. })));
    }

    #[test]
    fn distributed_steps_contribute_nothing() {
        let steps = [StepDescription {
            kind: StepKind::Distributed,
            mapper: None,
            combiner: None,
            reducer: None,
        }];
        let result = resolve(&steps, 0, PhaseKind::Mapper);
        assert!(matches!(result, Err(Error::ProtocolResolution { .. })));
    }
}
