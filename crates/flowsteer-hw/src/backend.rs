//! The device collaborator trait consumed by the classifier core.

use crate::error::HwResult;
use crate::types::{CounterHandle, Direction, EntryIndex, FuncId, McamEntry};
use serde::{Deserialize, Serialize};

/// One key-extraction entry read from the device's programmed profile.
///
/// The profile tells hardware which header byte ranges of each
/// (layer, layer type) are copied into the generic match key. A disabled
/// entry contributes nothing to the key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractCfg {
    pub enabled: bool,
    /// Byte offset of the extracted range within the protocol header.
    pub hdr_offset: u8,
    /// Byte offset of the extracted range within the match key.
    pub key_offset: u8,
    /// Length of the extracted range in bytes (1..=16).
    pub byte_len: u8,
}

impl ExtractCfg {
    pub const fn disabled() -> Self {
        ExtractCfg {
            enabled: false,
            hdr_offset: 0,
            key_offset: 0,
            byte_len: 0,
        }
    }
}

/// Access to the MCAM classifier block of one device.
///
/// All register-level access is behind this trait; implementations are
/// expected to be cheap and synchronous. Methods take `&self` so one
/// backend can be shared by the classifier and other device consumers.
pub trait McamBackend: Send + Sync {
    /// Reads one key-extraction profile entry for
    /// (direction, layer, layer type, extractor slot).
    fn read_profile_entry(&self, dir: Direction, lid: u8, ltype: u8, slot: u8) -> ExtractCfg;

    /// Reads the parse-result nibble enable mask for a direction. Each set
    /// bit contributes one nibble of parser metadata ahead of the layer
    /// data in the key.
    fn read_parse_nibble_mask(&self, dir: Direction) -> u32;

    /// Writes a full MCAM entry. `counter`, when given, binds the entry's
    /// hit statistics to that counter; `None` leaves any existing binding
    /// unchanged (counters are unbound via [`McamBackend::free_counter`]).
    fn write_entry(
        &self,
        index: EntryIndex,
        dir: Direction,
        entry: &McamEntry,
        enable: bool,
        counter: Option<CounterHandle>,
    ) -> HwResult<()>;

    /// Reads back an MCAM entry with its direction and enable state.
    fn read_entry(&self, index: EntryIndex) -> HwResult<(McamEntry, Direction, bool)>;

    /// Enables or disables an existing MCAM entry without rewriting it.
    fn enable_entry(&self, index: EntryIndex, enable: bool) -> HwResult<()>;

    /// Allocates one hit counter for `owner`.
    fn alloc_counter(&self, owner: FuncId) -> HwResult<CounterHandle>;

    /// Releases a counter previously allocated to `owner`.
    fn free_counter(&self, owner: FuncId, counter: CounterHandle) -> HwResult<()>;

    /// Resets a counter's value to zero.
    fn reset_counter(&self, counter: CounterHandle) -> HwResult<()>;
}
