//! Lifecycle of doctor, patient and nurse records.
//!
//! Records are never hard-deleted: they move between `Active`,
//! `Deactivated` and the terminal `Deleted` state.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    #[default]
    Active,
    Deactivated,
    Deleted,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: RecordState, to: RecordState },
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordState::Active => write!(f, "active"),
            RecordState::Deactivated => write!(f, "deactivated"),
            RecordState::Deleted => write!(f, "deleted"),
        }
    }
}

impl RecordState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordState::Deleted)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RecordState::Active)
    }

    pub fn can_transition_to(&self, target: &RecordState) -> bool {
        use RecordState::*;
        matches!(
            (self, target),
            (Active, Deactivated) | (Deactivated, Active) | (Active, Deleted) | (Deactivated, Deleted)
        )
    }

    pub fn transition_to(self, target: RecordState) -> Result<RecordState, LifecycleError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(LifecycleError::InvalidTransition { from: self, to: target })
        }
    }

    /// The old active/blacklist toggle: Active <-> Deactivated.
    pub fn toggled(self) -> Result<RecordState, LifecycleError> {
        match self {
            RecordState::Active => self.transition_to(RecordState::Deactivated),
            RecordState::Deactivated => self.transition_to(RecordState::Active),
            RecordState::Deleted => Err(LifecycleError::InvalidTransition {
                from: self,
                to: RecordState::Active,
            }),
        }
    }
}
