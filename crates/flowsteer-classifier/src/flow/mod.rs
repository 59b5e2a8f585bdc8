//! Flow rule management: the rule database and the install/delete/enable
//! orchestration.
//!
//! # Key Components
//!
//! - [`FlowSpec`] / [`InstallRequest`]: caller-facing request shapes
//! - [`FlowRule`]: one installed rule as recorded in the database
//! - [`RuleDb`]: the ordered rule store, keyed by entry index
//! - [`Classifier`]: the orchestrator tying profile, database, and device
//!   together

mod db;
mod orch;
mod rule;
mod types;

pub use db::RuleDb;
pub use orch::{Classifier, ClassifierConfig, ClassifierError, ClassifierStats};
pub use rule::{FlowRule, RuleAction};
pub use types::{
    CounterOutcome, DeleteScope, EndpointConfig, FlowAction, FlowSpec, InstallRequest,
    InstallResponse,
};
