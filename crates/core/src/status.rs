//! Position lifecycle status and the transition table.
//!
//! The status column is the single source of truth for which job may act on a
//! position. Every status change goes through [`StatusChange::new`], so an
//! illegal transition cannot be expressed as a write.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    PendingEntry,
    Active,
    Stasis,
    ProcessingExit,
    Emergency,
    Closed,
}

impl PositionStatus {
    pub const ALL: [Self; 6] = [
        Self::PendingEntry,
        Self::Active,
        Self::Stasis,
        Self::ProcessingExit,
        Self::Emergency,
        Self::Closed,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingEntry => "pending_entry",
            Self::Active => "active",
            Self::Stasis => "stasis",
            Self::ProcessingExit => "processing_exit",
            Self::Emergency => "emergency",
            Self::Closed => "closed",
        }
    }

    /// Returns true if `self -> to` is an edge of the lifecycle graph.
    ///
    /// ```text
    /// pending_entry -> active <-> stasis
    /// {active, stasis} -> emergency
    /// {active, stasis, emergency} -> processing_exit
    /// processing_exit -> closed
    /// ```
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::PendingEntry, Self::Active)
                | (Self::Active, Self::Stasis)
                | (Self::Stasis, Self::Active)
                | (Self::Active | Self::Stasis, Self::Emergency)
                | (Self::Active | Self::Stasis | Self::Emergency, Self::ProcessingExit)
                | (Self::ProcessingExit, Self::Closed)
        )
    }

    /// Validates a transition and returns the target status.
    ///
    /// # Errors
    /// Returns [`TransitionError`] if the edge is not in the lifecycle table.
    pub const fn transition(self, to: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(TransitionError { from: self, to })
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: PositionStatus,
    pub to: PositionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown position status: {0}")]
pub struct UnknownStatus(pub String);

/// A validated status edge. Only constructible through [`StatusChange::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    from: PositionStatus,
    to: PositionStatus,
}

impl StatusChange {
    /// # Errors
    /// Returns [`TransitionError`] if `from -> to` is not allowed.
    pub const fn new(from: PositionStatus, to: PositionStatus) -> Result<Self, TransitionError> {
        match from.transition(to) {
            Ok(to) => Ok(Self { from, to }),
            Err(e) => Err(e),
        }
    }

    #[must_use]
    pub const fn from(&self) -> PositionStatus {
        self.from
    }

    #[must_use]
    pub const fn to(&self) -> PositionStatus {
        self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PositionStatus::*;

    #[test]
    fn test_allowed_edges() {
        let allowed = [
            (PendingEntry, Active),
            (Active, Stasis),
            (Stasis, Active),
            (Active, Emergency),
            (Stasis, Emergency),
            (Active, ProcessingExit),
            (Stasis, ProcessingExit),
            (Emergency, ProcessingExit),
            (ProcessingExit, Closed),
        ];

        for from in PositionStatus::ALL {
            for to in PositionStatus::ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "unexpected result for {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_closed_is_never_left() {
        for to in PositionStatus::ALL {
            assert!(Closed.transition(to).is_err());
        }
        assert!(Closed.is_terminal());
    }

    #[test]
    fn test_emergency_does_not_heal_to_active() {
        let err = StatusChange::new(Emergency, Active).unwrap_err();
        assert_eq!(err.from, Emergency);
        assert_eq!(err.to, Active);
        assert_eq!(err.to_string(), "invalid status transition emergency -> active");
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in PositionStatus::ALL {
            assert_eq!(status.as_str().parse::<PositionStatus>().unwrap(), status);
        }
        assert!("ACTIVE".parse::<PositionStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&ProcessingExit).unwrap();
        assert_eq!(json, "\"processing_exit\"");
    }
}
