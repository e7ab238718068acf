use crate::error::StepError;

/// What one executed instruction tells the interpreter to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Move to the next instruction in authored order.
    Advance,
    /// Jump to this 1-based instruction index (check instructions).
    Jump(u32),
}

/// Script interpreter state. The pointer is zero-based internally and
/// always derived from the 1-based authored index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running(usize),
    Succeeded,
}

impl RunState {
    /// Transition after executing the instruction at the current
    /// pointer. A jump at or past the end of the script terminates the
    /// run successfully; a zero target can never name an instruction
    /// and is a configuration error.
    pub fn transition(self, outcome: StepOutcome, script_len: usize) -> Result<RunState, StepError> {
        let RunState::Running(pointer) = self else {
            return Ok(self);
        };
        let next = match outcome {
            StepOutcome::Advance => pointer + 1,
            StepOutcome::Jump(0) => {
                return Err(StepError::InvalidBranchTarget {
                    target: 0,
                    len: script_len,
                })
            }
            StepOutcome::Jump(target) => target as usize - 1,
        };
        if next >= script_len {
            Ok(RunState::Succeeded)
        } else {
            Ok(RunState::Running(next))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_increments_pointer() {
        let state = RunState::Running(0).transition(StepOutcome::Advance, 3).unwrap();
        assert_eq!(state, RunState::Running(1));
    }

    #[test]
    fn test_advance_past_last_instruction_succeeds() {
        let state = RunState::Running(2).transition(StepOutcome::Advance, 3).unwrap();
        assert_eq!(state, RunState::Succeeded);
    }

    #[test]
    fn test_jump_targets_are_one_based() {
        // ifTrueNext=5 / ifFalseNext=3 from instruction 1 of a 6-step
        // script: true goes to pointer 4, false to pointer 2, never to
        // the sequential successor.
        let state = RunState::Running(0).transition(StepOutcome::Jump(5), 6).unwrap();
        assert_eq!(state, RunState::Running(4));
        let state = RunState::Running(0).transition(StepOutcome::Jump(3), 6).unwrap();
        assert_eq!(state, RunState::Running(2));
    }

    #[test]
    fn test_jump_past_end_terminates_successfully() {
        let state = RunState::Running(2).transition(StepOutcome::Jump(5), 3).unwrap();
        assert_eq!(state, RunState::Succeeded);
    }

    #[test]
    fn test_jump_to_zero_is_invalid() {
        let err = RunState::Running(1).transition(StepOutcome::Jump(0), 3).unwrap_err();
        assert!(matches!(err, StepError::InvalidBranchTarget { target: 0, .. }));
    }

    #[test]
    fn test_terminal_state_absorbs_outcomes() {
        let state = RunState::Succeeded.transition(StepOutcome::Advance, 3).unwrap();
        assert_eq!(state, RunState::Succeeded);
    }
}
