//! Plugin-instance lifecycle status and its state machine.
//!
//! Discriminants match the `plugin_instance_statuses` seed data
//! (1-based SMALLINT). The wire representation is camelCase, matching the
//! status strings clients already know (`waitingForPrevious`, ...).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

/// Lifecycle status of a plugin instance.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PluginInstanceStatus {
    Created = 1,
    WaitingForPrevious = 2,
    Scheduled = 3,
    Started = 4,
    FinishedSuccessfully = 5,
    FinishedWithError = 6,
    Cancelled = 7,
}

/// Every status, in discriminant order.
pub const ALL_STATUSES: [PluginInstanceStatus; 7] = [
    PluginInstanceStatus::Created,
    PluginInstanceStatus::WaitingForPrevious,
    PluginInstanceStatus::Scheduled,
    PluginInstanceStatus::Started,
    PluginInstanceStatus::FinishedSuccessfully,
    PluginInstanceStatus::FinishedWithError,
    PluginInstanceStatus::Cancelled,
];

impl PluginInstanceStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Look up a status by its database ID.
    pub fn from_id(id: StatusId) -> Option<Self> {
        ALL_STATUSES.iter().copied().find(|s| s.id() == id)
    }

    /// The camelCase name used on the wire and in error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::WaitingForPrevious => "waitingForPrevious",
            Self::Scheduled => "scheduled",
            Self::Started => "started",
            Self::FinishedSuccessfully => "finishedSuccessfully",
            Self::FinishedWithError => "finishedWithError",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::FinishedSuccessfully | Self::FinishedWithError | Self::Cancelled
        )
    }

    /// Returns the set of statuses reachable from `self`.
    ///
    /// `Scheduled -> FinishedWithError` is the dispatcher giving up after
    /// its retry budget; every other edge is part of the normal lifecycle.
    pub fn valid_transitions(self) -> &'static [PluginInstanceStatus] {
        use PluginInstanceStatus::*;
        match self {
            Created => &[Scheduled, WaitingForPrevious, Cancelled],
            WaitingForPrevious => &[Scheduled, Cancelled],
            Scheduled => &[Started, Cancelled, FinishedWithError],
            Started => &[FinishedSuccessfully, FinishedWithError, Cancelled],
            FinishedSuccessfully | FinishedWithError | Cancelled => &[],
        }
    }

    /// Check whether a transition from `self` to `to` is valid.
    pub fn can_transition(self, to: PluginInstanceStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Validate a transition.
    ///
    /// Leaving a terminal status is a [`CoreError::Conflict`]; any other
    /// edge missing from the table is a [`CoreError::Validation`].
    pub fn validate_transition(self, to: PluginInstanceStatus) -> Result<(), CoreError> {
        if self.can_transition(to) {
            return Ok(());
        }
        let msg = format!("Can not change status from '{self}' to '{to}'.");
        if self.is_terminal() {
            Err(CoreError::Conflict(msg))
        } else {
            Err(CoreError::Validation(msg))
        }
    }
}

impl fmt::Display for PluginInstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginInstanceStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_STATUSES
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown status '{s}'")))
    }
}

impl From<PluginInstanceStatus> for StatusId {
    fn from(value: PluginInstanceStatus) -> Self {
        value as StatusId
    }
}

#[cfg(test)]
mod tests {
    use super::PluginInstanceStatus::*;
    use super::*;

    // -----------------------------------------------------------------------
    // Valid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn created_fans_out_to_resolver_outcomes() {
        assert!(Created.can_transition(Scheduled));
        assert!(Created.can_transition(WaitingForPrevious));
        assert!(Created.can_transition(Cancelled));
    }

    #[test]
    fn waiting_can_be_scheduled_or_cancelled() {
        assert!(WaitingForPrevious.can_transition(Scheduled));
        assert!(WaitingForPrevious.can_transition(Cancelled));
    }

    #[test]
    fn scheduled_to_started() {
        assert!(Scheduled.can_transition(Started));
    }

    #[test]
    fn scheduled_to_finished_with_error_after_dispatch_gives_up() {
        assert!(Scheduled.can_transition(FinishedWithError));
    }

    #[test]
    fn started_reaches_every_terminal_status() {
        assert!(Started.can_transition(FinishedSuccessfully));
        assert!(Started.can_transition(FinishedWithError));
        assert!(Started.can_transition(Cancelled));
    }

    // -----------------------------------------------------------------------
    // Invalid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn terminal_statuses_have_no_transitions() {
        for status in [FinishedSuccessfully, FinishedWithError, Cancelled] {
            assert!(status.is_terminal());
            assert!(status.valid_transitions().is_empty());
        }
    }

    #[test]
    fn waiting_cannot_start_without_scheduling() {
        assert!(!WaitingForPrevious.can_transition(Started));
    }

    #[test]
    fn scheduled_cannot_finish_successfully_without_starting() {
        assert!(!Scheduled.can_transition(FinishedSuccessfully));
    }

    #[test]
    fn nothing_returns_to_created() {
        for status in ALL_STATUSES {
            assert!(!status.can_transition(Created));
        }
    }

    // -----------------------------------------------------------------------
    // validate_transition error classes
    // -----------------------------------------------------------------------

    #[test]
    fn leaving_terminal_status_is_conflict() {
        let err = Cancelled.validate_transition(Scheduled).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    fn illegal_non_terminal_edge_is_validation() {
        let err = Scheduled.validate_transition(WaitingForPrevious).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    // -----------------------------------------------------------------------
    // Conversions
    // -----------------------------------------------------------------------

    #[test]
    fn ids_round_trip() {
        for status in ALL_STATUSES {
            assert_eq!(PluginInstanceStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(PluginInstanceStatus::from_id(99), None);
    }

    #[test]
    fn parses_wire_names() {
        assert_eq!(
            "waitingForPrevious".parse::<PluginInstanceStatus>().unwrap(),
            WaitingForPrevious
        );
        assert!("finished".parse::<PluginInstanceStatus>().is_err());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_string(&FinishedSuccessfully).unwrap();
        assert_eq!(json, "\"finishedSuccessfully\"");
    }
}
