//! Hardware abstraction for the MCAM packet classifier block.
//!
//! This crate defines the boundary between the classifier control plane and
//! the physical device:
//!
//! - [`types`]: Key geometry, entry/counter identifiers, and the raw
//!   ternary entry representation
//! - [`action`]: Bit-exact encoders/decoders for the action and VLAN-tag
//!   action registers
//! - [`error`]: Error types for device access
//! - [`backend`]: The [`McamBackend`] trait consumed by the classifier
//! - [`mock`]: An in-memory device implementation for tests
//!
//! Register-level access lives behind [`McamBackend`]; the classifier core
//! never touches device registers directly.

pub mod action;
pub mod backend;
pub mod error;
pub mod mock;
pub mod types;

pub use action::{RxAction, RxOpcode, RxVtagAction, TxAction, TxOpcode, TxVtagAction};
pub use backend::{ExtractCfg, McamBackend};
pub use error::{HwError, HwResult};
pub use mock::MockMcam;
pub use types::{
    CounterHandle, Direction, EntryIndex, FuncId, KeySize, McamEntry, MAX_KEY_WORDS,
};
