//! Control-plane compiler for the MCAM packet classifier.
//!
//! The device extracts profile-selected header byte ranges into a fixed
//! generic match key; this crate turns that into a usable flow-steering
//! control plane:
//!
//! ```text
//! extraction profile ──> [kex] field maps + feature bitsets   (init time)
//!                              │
//! flow requests ──────> [flow] Classifier ──> McamBackend ──> device
//!                              │
//!                          [RuleDb]
//! ```
//!
//! - [`kex`]: scans the profile, derives per-field key bit positions,
//!   detects fields overwritten by higher protocol layers, and computes
//!   the per-direction supported-feature bitsets
//! - [`entry`]: compiles (value, mask) pairs into ternary entry words
//! - [`flow`]: the rule database and the install/delete/bulk-enable
//!   orchestration, including default-rule inheritance and counter
//!   lifecycle
//!
//! # Concurrency
//!
//! Every operation runs to completion within one `&mut self` call; a
//! device context shares one [`Classifier`] per device behind a single
//! coarse mutex. Bulk operations snapshot their working set before
//! mutating, so structural changes mid-scan are safe.

pub mod entry;
pub mod flow;
pub mod kex;

pub use flow::{
    Classifier, ClassifierConfig, ClassifierError, ClassifierStats, CounterOutcome, DeleteScope,
    EndpointConfig, FlowAction, FlowRule, FlowSpec, InstallRequest, InstallResponse, RuleAction,
    RuleDb,
};
pub use kex::{ClassifierProfile, FieldSet, FlowField, InitError, KeyField, KeyMap};
