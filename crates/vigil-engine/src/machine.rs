//! Per-target incident state machine.
//!
//! Pure transition logic — the result processor owns one [`HealthState`] per
//! target, feeds it each check in order, and applies the returned
//! [`StepOutcome`] (persist an incident, close one, or nothing). Keeping the
//! transitions side-effect free makes the threshold arithmetic trivially
//! testable.
//!
//! States and transitions:
//!   Healthy      --fail-->  Failing(1)           (or straight to open at threshold 1)
//!   Failing(n)   --fail-->  Failing(n+1); at n+1 ≥ alert_threshold → open, Down
//!   Failing(n)   --ok---->  Healthy
//!   Down         --ok---->  Recovering(1); at recovery_threshold → close, Healthy
//!   Recovering(m)--fail-->  Down                 (incident stays open, streak resets)
//!   Recovering(m)--ok---->  Recovering(m+1); at threshold → close, Healthy
//!
//! The incident closes with the id of the FIRST check of the recovery
//! streak, so `Recovering` carries it from the `Down` transition onward.

use vigil_core::{CheckId, IncidentId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Failing { streak: u32 },
    Down { incident: IncidentId },
    Recovering {
        incident: IncidentId,
        /// First successful check after `Down` — the `end_check_id` when the
        /// streak completes. Reset whenever a failure re-enters `Down`.
        first_recovering_check: CheckId,
        streak: u32,
    },
}

/// What the processor must do after one check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// No incident activity; adopt the carried state.
    Stay(HealthState),
    /// The alert threshold was crossed: open an incident for this check and
    /// move to `Down` with its id.
    OpenIncident,
    /// The recovery threshold was met: close the incident with the first
    /// check of the recovery streak and move to `Healthy`.
    CloseIncident {
        incident: IncidentId,
        end_check: CheckId,
    },
}

pub fn advance(
    state: HealthState,
    success: bool,
    check: CheckId,
    alert_threshold: u32,
    recovery_threshold: u32,
) -> StepOutcome {
    match (state, success) {
        (HealthState::Healthy, true) => StepOutcome::Stay(HealthState::Healthy),
        (HealthState::Healthy, false) => {
            if alert_threshold <= 1 {
                StepOutcome::OpenIncident
            } else {
                StepOutcome::Stay(HealthState::Failing { streak: 1 })
            }
        }
        (HealthState::Failing { .. }, true) => StepOutcome::Stay(HealthState::Healthy),
        (HealthState::Failing { streak }, false) => {
            let streak = streak + 1;
            if streak >= alert_threshold {
                StepOutcome::OpenIncident
            } else {
                StepOutcome::Stay(HealthState::Failing { streak })
            }
        }
        (HealthState::Down { incident }, false) => {
            StepOutcome::Stay(HealthState::Down { incident })
        }
        (HealthState::Down { incident }, true) => {
            // This check starts the recovery streak.
            if recovery_threshold <= 1 {
                StepOutcome::CloseIncident {
                    incident,
                    end_check: check,
                }
            } else {
                StepOutcome::Stay(HealthState::Recovering {
                    incident,
                    first_recovering_check: check,
                    streak: 1,
                })
            }
        }
        (HealthState::Recovering { incident, .. }, false) => {
            // Any failure during recovery re-enters Down; the streak resets
            // and the incident remains open.
            StepOutcome::Stay(HealthState::Down { incident })
        }
        (
            HealthState::Recovering {
                incident,
                first_recovering_check,
                streak,
            },
            true,
        ) => {
            let streak = streak + 1;
            if streak >= recovery_threshold {
                StepOutcome::CloseIncident {
                    incident,
                    end_check: first_recovering_check,
                }
            } else {
                StepOutcome::Stay(HealthState::Recovering {
                    incident,
                    first_recovering_check,
                    streak,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incident() -> IncidentId {
        IncidentId::random()
    }

    #[test]
    fn opens_on_the_threshold_crossing_failure() {
        let mut state = HealthState::Healthy;
        for expected_streak in 1..=2u32 {
            match advance(state, false, CheckId::random(), 3, 1) {
                StepOutcome::Stay(next) => {
                    assert_eq!(next, HealthState::Failing { streak: expected_streak });
                    state = next;
                }
                other => panic!("unexpected: {other:?}"),
            }
        }
        assert_eq!(
            advance(state, false, CheckId::random(), 3, 1),
            StepOutcome::OpenIncident
        );
    }

    #[test]
    fn threshold_one_opens_immediately() {
        assert_eq!(
            advance(HealthState::Healthy, false, CheckId::random(), 1, 1),
            StepOutcome::OpenIncident
        );
    }

    #[test]
    fn success_resets_a_failing_streak() {
        let state = HealthState::Failing { streak: 2 };
        assert_eq!(
            advance(state, true, CheckId::random(), 3, 1),
            StepOutcome::Stay(HealthState::Healthy)
        );
    }

    #[test]
    fn down_closes_on_first_success_with_default_threshold() {
        let id = incident();
        let check = CheckId::random();
        assert_eq!(
            advance(HealthState::Down { incident: id }, true, check, 3, 1),
            StepOutcome::CloseIncident {
                incident: id,
                end_check: check,
            }
        );
    }

    #[test]
    fn recovery_closes_with_the_first_check_of_the_streak() {
        let id = incident();
        let first = CheckId::random();
        let second = CheckId::random();

        let step = advance(HealthState::Down { incident: id }, true, first, 3, 2);
        assert_eq!(
            step,
            StepOutcome::Stay(HealthState::Recovering {
                incident: id,
                first_recovering_check: first,
                streak: 1,
            })
        );

        let step = advance(
            HealthState::Recovering {
                incident: id,
                first_recovering_check: first,
                streak: 1,
            },
            true,
            second,
            3,
            2,
        );
        // Closes with the streak's first check, not the current one.
        assert_eq!(
            step,
            StepOutcome::CloseIncident {
                incident: id,
                end_check: first,
            }
        );
    }

    #[test]
    fn failure_during_recovery_re_enters_down_and_drops_the_streak() {
        let id = incident();
        let first = CheckId::random();
        let step = advance(
            HealthState::Recovering {
                incident: id,
                first_recovering_check: first,
                streak: 1,
            },
            false,
            CheckId::random(),
            3,
            2,
        );
        assert_eq!(step, StepOutcome::Stay(HealthState::Down { incident: id }));

        // The next success starts a fresh streak with a new first check.
        let restart = CheckId::random();
        let step = advance(HealthState::Down { incident: id }, true, restart, 3, 2);
        assert_eq!(
            step,
            StepOutcome::Stay(HealthState::Recovering {
                incident: id,
                first_recovering_check: restart,
                streak: 1,
            })
        );
    }

    #[test]
    fn down_stays_down_on_further_failures() {
        let id = incident();
        assert_eq!(
            advance(HealthState::Down { incident: id }, false, CheckId::random(), 3, 1),
            StepOutcome::Stay(HealthState::Down { incident: id })
        );
    }
}
