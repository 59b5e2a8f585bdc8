//! Key-extraction profile analysis.
//!
//! The device copies selected protocol-header byte ranges and parser
//! metadata nibbles into a fixed-width match key. This module works out
//! what that means for matching:
//!
//! - [`scan`]: derives, per logical field, exactly which key bits carry it
//! - [`features`]: detects fields whose bits a higher layer can overwrite
//!   and unifies multi-layer fields into canonical ones
//! - [`profile`]: ties both together into an immutable
//!   [`ClassifierProfile`] with per-direction supported-feature bitsets
//!
//! # Key Components
//!
//! - [`FlowField`] / [`FieldSet`]: the logical field inventory
//! - [`KeyField`]: one field's word masks within the key
//! - [`ClassifierProfile`]: the scanned, verified result

mod features;
mod field;
mod profile;
mod scan;

pub use field::{layer, ltype, FieldSet, FlowField};
pub use profile::{ClassifierProfile, InitError, KeyMap};
pub use scan::{KeyField, LayerMdata, ProfileSnapshot};
