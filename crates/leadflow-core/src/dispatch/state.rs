//! Campaign lifecycle state machine
//!
//! The transition table is the single source of truth for campaign
//! status changes; callers own the side effects. `Aborting` is a visible
//! intermediate state so in-flight dispatch work can finish or fail
//! cleanly before the terminal `Aborted` write.

use leadflow_common::{Error, Result};
use leadflow_storage::models::CampaignStatus;

/// Allowed targets for each campaign status.
pub fn allowed_targets(from: CampaignStatus) -> &'static [CampaignStatus] {
    use CampaignStatus::*;

    match from {
        Draft => &[Queued, Aborted],
        Queued => &[Running, Paused, Draft, Aborted],
        Running => &[Paused, Aborting, Completed, Error],
        Paused => &[Running, Draft, Aborted],
        Aborting => &[Aborted, Error],
        Aborted => &[Draft],
        Completed => &[Draft],
        Error => &[Draft, Aborted],
    }
}

/// True iff `to` is in the allow-list for `from`.
pub fn can_transition(from: CampaignStatus, to: CampaignStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Validate a transition, returning the target status or an
/// `InvalidTransition` error. Never retried by callers.
pub fn transition(from: CampaignStatus, to: CampaignStatus) -> Result<CampaignStatus> {
    if can_transition(from, to) {
        Ok(to)
    } else {
        Err(Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CampaignStatus::*;

    const ALL: [CampaignStatus; 8] = [
        Draft, Queued, Running, Paused, Aborting, Aborted, Completed, Error,
    ];

    #[test]
    fn test_allowed_transitions() {
        assert!(can_transition(Draft, Queued));
        assert!(can_transition(Draft, Aborted));
        assert!(can_transition(Queued, Running));
        assert!(can_transition(Queued, Paused));
        assert!(can_transition(Queued, Draft));
        assert!(can_transition(Queued, Aborted));
        assert!(can_transition(Running, Paused));
        assert!(can_transition(Running, Aborting));
        assert!(can_transition(Running, Completed));
        assert!(can_transition(Running, Error));
        assert!(can_transition(Paused, Running));
        assert!(can_transition(Paused, Draft));
        assert!(can_transition(Paused, Aborted));
        assert!(can_transition(Aborting, Aborted));
        assert!(can_transition(Aborting, Error));
        assert!(can_transition(Aborted, Draft));
        assert!(can_transition(Completed, Draft));
        assert!(can_transition(Error, Draft));
        assert!(can_transition(Error, Aborted));
    }

    #[test]
    fn test_every_unlisted_pair_is_rejected() {
        for from in ALL {
            for to in ALL {
                let expected = allowed_targets(from).contains(&to);
                assert_eq!(
                    can_transition(from, to),
                    expected,
                    "table mismatch for {from} -> {to}"
                );
                if !expected {
                    let err = transition(from, to).unwrap_err();
                    assert!(matches!(
                        err,
                        leadflow_common::Error::InvalidTransition { .. }
                    ));
                }
            }
        }
    }

    #[test]
    fn test_no_self_transitions() {
        for status in ALL {
            assert!(!can_transition(status, status), "{status} -> {status}");
        }
    }

    #[test]
    fn test_terminal_states_only_restart_as_draft() {
        assert_eq!(allowed_targets(Aborted), &[Draft]);
        assert_eq!(allowed_targets(Completed), &[Draft]);
    }

    #[test]
    fn test_running_cannot_jump_straight_to_aborted() {
        // Aborting must let in-flight work settle first.
        assert!(!can_transition(Running, Aborted));
    }
}
