//! In-memory MCAM device for tests.
//!
//! `MockMcam` simulates the classifier block of a real device without
//! hardware: a programmable extraction profile, an entry store, and a
//! bounded counter pool. Tests program a profile, run the classifier
//! against it, and inspect what was written.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use crate::backend::{ExtractCfg, McamBackend};
use crate::error::{HwError, HwResult};
use crate::types::{CounterHandle, Direction, EntryIndex, FuncId, McamEntry};

/// One entry slot as the mock device sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockEntrySlot {
    pub entry: McamEntry,
    pub dir: Direction,
    pub enabled: bool,
    pub counter: Option<CounterHandle>,
}

#[derive(Debug, Default)]
struct MockState {
    profile: HashMap<(Direction, u8, u8, u8), ExtractCfg>,
    nibble_mask: HashMap<Direction, u32>,
    entries: HashMap<EntryIndex, MockEntrySlot>,
    free_counters: BTreeSet<u16>,
    counter_owners: HashMap<u16, FuncId>,
    counter_values: HashMap<u16, u64>,
    fail_writes: u32,
    fail_enables: u32,
}

/// An in-memory [`McamBackend`] implementation.
pub struct MockMcam {
    state: Mutex<MockState>,
    num_entries: u16,
}

impl MockMcam {
    /// Creates a mock device with `num_entries` MCAM slots and
    /// `num_counters` hit counters.
    pub fn new(num_entries: u16, num_counters: u16) -> Self {
        let mut state = MockState::default();
        state.free_counters = (0..num_counters).collect();
        MockMcam {
            state: Mutex::new(state),
            num_entries,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A poisoned lock only happens when a test already panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ============ Profile programming ============

    /// Programs one extraction entry: copy `byte_len` bytes starting at
    /// header offset `hdr_offset` of (lid, ltype) into the key at byte
    /// offset `key_offset`.
    pub fn set_extract(
        &self,
        dir: Direction,
        lid: u8,
        ltype: u8,
        slot: u8,
        hdr_offset: u8,
        key_offset: u8,
        byte_len: u8,
    ) {
        self.lock().profile.insert(
            (dir, lid, ltype, slot),
            ExtractCfg {
                enabled: true,
                hdr_offset,
                key_offset,
                byte_len,
            },
        );
    }

    /// Programs the parse-result nibble enable mask for a direction.
    pub fn set_parse_nibbles(&self, dir: Direction, mask: u32) {
        self.lock().nibble_mask.insert(dir, mask);
    }

    // ============ Failure injection ============

    /// Makes the next `n` entry writes fail with a register access error.
    pub fn fail_writes(&self, n: u32) {
        self.lock().fail_writes = n;
    }

    /// Makes the next `n` enable/disable operations fail.
    pub fn fail_enables(&self, n: u32) {
        self.lock().fail_enables = n;
    }

    // ============ Inspection ============

    /// Returns the entry slot at `index`, if one was ever written.
    pub fn entry(&self, index: EntryIndex) -> Option<MockEntrySlot> {
        self.lock().entries.get(&index).cloned()
    }

    /// Number of counters currently allocated.
    pub fn counters_in_use(&self) -> usize {
        self.lock().counter_owners.len()
    }

    /// Returns the value of an allocated counter.
    pub fn counter_value(&self, counter: CounterHandle) -> Option<u64> {
        self.lock().counter_values.get(&counter.raw()).copied()
    }

    /// Records `hits` on a counter, as traffic would.
    pub fn bump_counter(&self, counter: CounterHandle, hits: u64) {
        let mut state = self.lock();
        if let Some(value) = state.counter_values.get_mut(&counter.raw()) {
            *value += hits;
        }
    }
}

impl McamBackend for MockMcam {
    fn read_profile_entry(&self, dir: Direction, lid: u8, ltype: u8, slot: u8) -> ExtractCfg {
        self.lock()
            .profile
            .get(&(dir, lid, ltype, slot))
            .copied()
            .unwrap_or(ExtractCfg::disabled())
    }

    fn read_parse_nibble_mask(&self, dir: Direction) -> u32 {
        self.lock().nibble_mask.get(&dir).copied().unwrap_or(0)
    }

    fn write_entry(
        &self,
        index: EntryIndex,
        dir: Direction,
        entry: &McamEntry,
        enable: bool,
        counter: Option<CounterHandle>,
    ) -> HwResult<()> {
        let mut state = self.lock();
        if index >= self.num_entries {
            return Err(HwError::EntryOutOfRange(index));
        }
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(HwError::RegisterAccess("injected write failure".into()));
        }

        let existing_counter = state.entries.get(&index).and_then(|slot| slot.counter);
        state.entries.insert(
            index,
            MockEntrySlot {
                entry: entry.clone(),
                dir,
                enabled: enable,
                counter: counter.or(existing_counter),
            },
        );
        Ok(())
    }

    fn read_entry(&self, index: EntryIndex) -> HwResult<(McamEntry, Direction, bool)> {
        let state = self.lock();
        let slot = state
            .entries
            .get(&index)
            .ok_or(HwError::EntryOutOfRange(index))?;
        Ok((slot.entry.clone(), slot.dir, slot.enabled))
    }

    fn enable_entry(&self, index: EntryIndex, enable: bool) -> HwResult<()> {
        let mut state = self.lock();
        if state.fail_enables > 0 {
            state.fail_enables -= 1;
            return Err(HwError::RegisterAccess("injected enable failure".into()));
        }
        let slot = state
            .entries
            .get_mut(&index)
            .ok_or(HwError::EntryOutOfRange(index))?;
        slot.enabled = enable;
        Ok(())
    }

    fn alloc_counter(&self, owner: FuncId) -> HwResult<CounterHandle> {
        let mut state = self.lock();
        let raw = state
            .free_counters
            .iter()
            .next()
            .copied()
            .ok_or(HwError::CounterExhausted)?;
        state.free_counters.remove(&raw);
        state.counter_owners.insert(raw, owner);
        state.counter_values.insert(raw, 0);
        Ok(CounterHandle::new(raw))
    }

    fn free_counter(&self, owner: FuncId, counter: CounterHandle) -> HwResult<()> {
        let mut state = self.lock();
        match state.counter_owners.get(&counter.raw()) {
            Some(o) if *o == owner => {}
            _ => return Err(HwError::CounterNotOwned(counter)),
        }
        state.counter_owners.remove(&counter.raw());
        state.counter_values.remove(&counter.raw());
        state.free_counters.insert(counter.raw());
        // Unbind from any entry referencing it.
        for slot in state.entries.values_mut() {
            if slot.counter == Some(counter) {
                slot.counter = None;
            }
        }
        Ok(())
    }

    fn reset_counter(&self, counter: CounterHandle) -> HwResult<()> {
        let mut state = self.lock();
        match state.counter_values.get_mut(&counter.raw()) {
            Some(value) => {
                *value = 0;
                Ok(())
            }
            None => Err(HwError::CounterNotOwned(counter)),
        }
    }
}
