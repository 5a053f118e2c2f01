//! Dependency resolution for plugin instances.
//!
//! One rule decides the status of a new instance and the fate of an
//! instance that is waiting on its previous one, so creation and the
//! waiting reaper always agree.

use crate::status::PluginInstanceStatus;

/// Outcome of resolving an instance against its upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Status the instance should move to.
    pub status: PluginInstanceStatus,
    /// Whether the instance is ready to be handed to the dispatcher.
    pub dispatch: bool,
}

impl Decision {
    const READY: Decision = Decision {
        status: PluginInstanceStatus::Scheduled,
        dispatch: true,
    };

    const CANCEL: Decision = Decision {
        status: PluginInstanceStatus::Cancelled,
        dispatch: false,
    };

    const WAIT: Decision = Decision {
        status: PluginInstanceStatus::WaitingForPrevious,
        dispatch: false,
    };
}

/// Decide the next status given the upstream instance's current status
/// (`None` for root instances).
pub fn resolve(upstream: Option<PluginInstanceStatus>) -> Decision {
    use PluginInstanceStatus::*;
    match upstream {
        None | Some(FinishedSuccessfully) => Decision::READY,
        Some(FinishedWithError) | Some(Cancelled) => Decision::CANCEL,
        Some(Created) | Some(Scheduled) | Some(WaitingForPrevious) | Some(Started) => {
            Decision::WAIT
        }
    }
}

/// Human-readable reason recorded when an instance is cancelled because
/// of its upstream.
pub fn cascade_reason(previous_id: crate::types::DbId, upstream: PluginInstanceStatus) -> String {
    format!("Cancelled because previous plugin instance {previous_id} is '{upstream}'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ALL_STATUSES;
    use PluginInstanceStatus::*;

    #[test]
    fn root_is_scheduled_and_dispatched() {
        assert_eq!(
            resolve(None),
            Decision {
                status: Scheduled,
                dispatch: true
            }
        );
    }

    #[test]
    fn successful_upstream_schedules() {
        let d = resolve(Some(FinishedSuccessfully));
        assert_eq!(d.status, Scheduled);
        assert!(d.dispatch);
    }

    #[test]
    fn failed_or_cancelled_upstream_cascades() {
        for upstream in [FinishedWithError, Cancelled] {
            let d = resolve(Some(upstream));
            assert_eq!(d.status, Cancelled);
            assert!(!d.dispatch);
        }
    }

    #[test]
    fn in_flight_upstream_waits() {
        for upstream in [Created, Scheduled, WaitingForPrevious, Started] {
            let d = resolve(Some(upstream));
            assert_eq!(d.status, WaitingForPrevious);
            assert!(!d.dispatch);
        }
    }

    #[test]
    fn resolving_twice_gives_the_same_answer() {
        for upstream in ALL_STATUSES {
            assert_eq!(resolve(Some(upstream)), resolve(Some(upstream)));
        }
        assert_eq!(resolve(None), resolve(None));
    }

    #[test]
    fn every_decision_is_a_legal_edge_from_created() {
        for upstream in ALL_STATUSES {
            assert!(Created.can_transition(resolve(Some(upstream)).status));
        }
    }

    #[test]
    fn cascade_reason_names_upstream() {
        let reason = cascade_reason(7, FinishedWithError);
        assert!(reason.contains('7'));
        assert!(reason.contains("finishedWithError"));
    }
}
