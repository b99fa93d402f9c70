use airline_core::RoundStatus;

use crate::error::{OrchestratorError, Result};

/// Forward-only round lifecycle. `Aborted` is reachable from every status
/// before `MarketUpdating`.
pub struct RoundStateMachine;

impl RoundStateMachine {
    pub fn validate_transition(from: &RoundStatus, to: &RoundStatus) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &RoundStatus) -> Vec<RoundStatus> {
        let mut allowed: Vec<RoundStatus> = Self::next_status(from).into_iter().collect();
        if from.is_abortable() {
            allowed.push(RoundStatus::Aborted);
        }
        allowed
    }

    pub fn can_transition(from: &RoundStatus, to: &RoundStatus) -> bool {
        Self::validate_transition(from, to).is_ok()
    }

    pub fn next_status(current: &RoundStatus) -> Option<RoundStatus> {
        match current {
            RoundStatus::Collecting => Some(RoundStatus::Validating),
            RoundStatus::Validating => Some(RoundStatus::Executing),
            RoundStatus::Executing => Some(RoundStatus::AwaitingBarrier),
            RoundStatus::AwaitingBarrier => Some(RoundStatus::MarketUpdating),
            RoundStatus::MarketUpdating => Some(RoundStatus::Evaluating),
            RoundStatus::Evaluating => Some(RoundStatus::Closed),
            RoundStatus::Closed | RoundStatus::Aborted => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        let mut status = RoundStatus::Collecting;
        let mut visited = vec![status];
        while let Some(next) = RoundStateMachine::next_status(&status) {
            assert!(RoundStateMachine::can_transition(&status, &next));
            status = next;
            visited.push(status);
        }
        assert_eq!(visited.len(), 7);
        assert_eq!(status, RoundStatus::Closed);
    }

    #[test]
    fn test_no_backward_or_skipping_transitions() {
        assert!(!RoundStateMachine::can_transition(
            &RoundStatus::Executing,
            &RoundStatus::Validating
        ));
        assert!(!RoundStateMachine::can_transition(
            &RoundStatus::Collecting,
            &RoundStatus::MarketUpdating
        ));
        assert!(!RoundStateMachine::can_transition(
            &RoundStatus::Closed,
            &RoundStatus::Collecting
        ));
    }

    #[test]
    fn test_abort_window() {
        assert!(RoundStateMachine::can_transition(
            &RoundStatus::AwaitingBarrier,
            &RoundStatus::Aborted
        ));
        assert!(!RoundStateMachine::can_transition(
            &RoundStatus::MarketUpdating,
            &RoundStatus::Aborted
        ));
        assert!(!RoundStateMachine::can_transition(
            &RoundStatus::Aborted,
            &RoundStatus::Collecting
        ));
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = RoundStateMachine::validate_transition(&RoundStatus::Closed, &RoundStatus::Evaluating)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid state transition from closed to evaluating"
        );
    }
}
