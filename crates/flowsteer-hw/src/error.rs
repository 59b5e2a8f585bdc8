//! Error types for device access.

use crate::types::{CounterHandle, EntryIndex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for MCAM device operations.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum HwError {
    /// The entry index does not address a valid MCAM slot.
    #[error("MCAM entry {0} out of range")]
    EntryOutOfRange(EntryIndex),

    /// No free MCAM entry is available.
    #[error("MCAM entry table full")]
    EntryTableFull,

    /// No free hit counter is available.
    #[error("hit counter pool exhausted")]
    CounterExhausted,

    /// The counter is not allocated, or allocated to a different owner.
    #[error("counter {0} is not allocated to the caller")]
    CounterNotOwned(CounterHandle),

    /// Register read/write failed.
    #[error("device register access failed: {0}")]
    RegisterAccess(String),
}

impl HwError {
    /// Returns true if the error reports resource exhaustion.
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, HwError::EntryTableFull | HwError::CounterExhausted)
    }
}

/// Result type for MCAM device operations.
pub type HwResult<T> = Result<T, HwError>;
