//! The scanned, immutable classifier profile.
//!
//! [`ClassifierProfile::scan`] reads the device's key-extraction profile
//! once, derives every field's key position, verifies the mandatory
//! ingress fields, and computes the supported-feature bitsets. The result
//! is immutable: re-programming the extraction profile requires building a
//! new one.

use flowsteer_hw::{Direction, KeySize, McamBackend};
use log::error;
use thiserror::Error;

use super::features::{
    apply_vlan_gate, check_overlap, handle_multi_layer_fields, set_features,
};
use super::field::{FieldSet, FlowField};
use super::scan::{scan_kex, KeyField, ProfileSnapshot};

/// Fatal profile problems that prevent bringing the classifier up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InitError {
    /// The ingress channel selector is not extracted into the key; no rule
    /// could be scoped to its endpoint.
    #[error("channel not present in key")]
    ChannelMissing,

    /// Another extraction can overwrite the channel bits.
    #[error("channel cannot be overwritten")]
    ChannelOverwritten,

    /// The destination MAC is not extracted into the key; unicast
    /// filtering cannot work.
    #[error("dmac not present in key")]
    DmacMissing,

    /// Another extraction can overwrite the destination MAC bits.
    #[error("dmac cannot be overwritten")]
    DmacOverwritten,
}

/// One direction's derived key layout and supported features.
#[derive(Debug, Clone)]
pub struct KeyMap {
    pub(crate) fields: [KeyField; FlowField::COUNT],
    pub(crate) features: FieldSet,
}

impl KeyMap {
    /// The key position of one field; `nr_words` of 0 means absent.
    pub fn field(&self, field: FlowField) -> &KeyField {
        &self.fields[field.index()]
    }

    /// The supported-feature bitset for this direction.
    pub fn features(&self) -> FieldSet {
        self.features
    }
}

/// Scanned profile state for one device, both directions.
#[derive(Debug, Clone)]
pub struct ClassifierProfile {
    rx: KeyMap,
    tx: KeyMap,
    key_size: KeySize,
}

impl ClassifierProfile {
    /// Scans the extraction profile and derives the field maps and feature
    /// bitsets.
    ///
    /// Fails when a mandatory ingress field (channel, destination MAC) is
    /// missing from the key or can be overwritten by a higher layer; the
    /// classifier must not come up on such a profile.
    pub fn scan(backend: &dyn McamBackend, key_size: KeySize) -> Result<Self, InitError> {
        let max_word = key_size.max_word_index();

        let rx_snapshot = ProfileSnapshot::read(backend, Direction::Rx);
        let tx_snapshot = ProfileSnapshot::read(backend, Direction::Tx);

        let mut rx_fields = scan_kex(&rx_snapshot, Direction::Rx, max_word);
        let mut tx_fields = scan_kex(&tx_snapshot, Direction::Tx, max_word);

        verify_mandatory(&rx_snapshot, &rx_fields, max_word)?;

        let mut tx_features = set_features(&tx_snapshot, &tx_fields, Direction::Tx, max_word);
        let mut rx_features = set_features(&rx_snapshot, &rx_fields, Direction::Rx, max_word);

        handle_multi_layer_fields(&tx_snapshot, &mut tx_fields, &mut tx_features, max_word);
        handle_multi_layer_fields(&rx_snapshot, &mut rx_fields, &mut rx_features, max_word);

        apply_vlan_gate(&tx_snapshot, &tx_fields, &mut tx_features, Direction::Tx, max_word);
        apply_vlan_gate(&rx_snapshot, &rx_fields, &mut rx_features, Direction::Rx, max_word);

        Ok(ClassifierProfile {
            rx: KeyMap {
                fields: rx_fields,
                features: rx_features,
            },
            tx: KeyMap {
                fields: tx_fields,
                features: tx_features,
            },
            key_size,
        })
    }

    pub fn map(&self, dir: Direction) -> &KeyMap {
        match dir {
            Direction::Rx => &self.rx,
            Direction::Tx => &self.tx,
        }
    }

    pub fn features(&self, dir: Direction) -> FieldSet {
        self.map(dir).features()
    }

    pub fn key_size(&self) -> KeySize {
        self.key_size
    }
}

/// Channel and DMAC must be present and safe from overwrite on ingress:
/// the channel scopes every rule to its endpoint, and unicast filtering
/// matches on the destination MAC.
fn verify_mandatory(
    snapshot: &ProfileSnapshot,
    fields: &[KeyField; FlowField::COUNT],
    max_word: usize,
) -> Result<(), InitError> {
    if !fields[FlowField::Chan.index()].is_present() {
        error!("channel not present in key");
        return Err(InitError::ChannelMissing);
    }
    if check_overlap(snapshot, fields, FlowField::Chan, 0, max_word) {
        error!("channel cannot be overwritten");
        return Err(InitError::ChannelOverwritten);
    }
    if !fields[FlowField::Dmac.index()].is_present() {
        error!("dmac not present in key");
        return Err(InitError::DmacMissing);
    }
    if check_overlap(snapshot, fields, FlowField::Dmac, 0, max_word) {
        error!("dmac cannot be overwritten");
        return Err(InitError::DmacOverwritten);
    }
    Ok(())
}
