//! Key-extraction profile scanning.
//!
//! The device's extraction profile decides which header byte ranges land
//! where in the generic match key. Scanning derives, for every logical
//! field, the exact key bits that carry it: a set of per-word bit masks
//! plus the metadata identifying the extraction entry it came from.
//!
//! The scan runs once at init against a [`ProfileSnapshot`] taken from the
//! device, so the derived maps are immutable afterwards.

use flowsteer_hw::{Direction, ExtractCfg, McamBackend, MAX_KEY_WORDS};

use super::field::{layer, ltype, FlowField};

/// Layer-type values per decode layer.
pub(crate) const MAX_LAYER_TYPES: u8 = 16;
/// Extractor slots per (layer, layer type).
pub(crate) const MAX_EXTRACTORS: u8 = 2;

/// Identity of the extraction entry a field was derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerMdata {
    /// Decode layer id.
    pub lid: u8,
    /// Layer-type match value.
    pub ltype: u8,
    /// Header byte offset of the extracted range.
    pub hdr: u8,
    /// Key byte offset of the extracted range.
    pub key: u8,
    /// Extracted range length in bytes.
    pub len: u8,
}

/// Where one logical field lives in the match key.
///
/// `nr_words` of 0 means the field is structurally absent for the scanned
/// direction. A present field occupies 1-3 consecutive key words; its
/// per-word masks mark exactly the bits carrying the field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyField {
    pub kw_mask: [u64; MAX_KEY_WORDS],
    pub nr_words: u8,
    pub mdata: LayerMdata,
}

impl KeyField {
    pub const fn is_present(&self) -> bool {
        self.nr_words > 0
    }

    /// Total number of key bits carrying this field.
    pub fn mask_bits(&self) -> u32 {
        self.kw_mask.iter().map(|m| m.count_ones()).sum()
    }

    pub(crate) fn masks_equal(&self, other: &KeyField) -> bool {
        self.kw_mask == other.kw_mask
    }
}

/// One direction's extraction profile, read once from the device.
#[derive(Debug, Clone)]
pub struct ProfileSnapshot {
    extract: [[[ExtractCfg; MAX_EXTRACTORS as usize]; MAX_LAYER_TYPES as usize];
        layer::COUNT as usize],
    nibble_mask: u32,
}

impl ProfileSnapshot {
    pub(crate) fn empty() -> Self {
        ProfileSnapshot {
            extract: [[[ExtractCfg::disabled(); MAX_EXTRACTORS as usize];
                MAX_LAYER_TYPES as usize]; layer::COUNT as usize],
            nibble_mask: 0,
        }
    }

    /// Reads the full profile for one direction from the device.
    pub fn read(backend: &dyn McamBackend, dir: Direction) -> Self {
        let mut snapshot = Self::empty();
        snapshot.nibble_mask = backend.read_parse_nibble_mask(dir);
        for lid in 0..layer::COUNT {
            for lt in 0..MAX_LAYER_TYPES {
                for ld in 0..MAX_EXTRACTORS {
                    snapshot.extract[lid as usize][lt as usize][ld as usize] =
                        backend.read_profile_entry(dir, lid, lt, ld);
                }
            }
        }
        snapshot
    }

    pub(crate) fn get(&self, lid: u8, lt: u8, ld: u8) -> ExtractCfg {
        self.extract[lid as usize][lt as usize][ld as usize]
    }

    pub(crate) fn set(&mut self, lid: u8, lt: u8, ld: u8, cfg: ExtractCfg) {
        self.extract[lid as usize][lt as usize][ld as usize] = cfg;
    }

    pub(crate) fn set_nibble_mask(&mut self, mask: u32) {
        self.nibble_mask = mask;
    }

    pub(crate) fn nibble_mask(&self) -> u32 {
        self.nibble_mask
    }

    /// Iterates the enabled extraction entries as (lid, ltype, slot, cfg).
    pub(crate) fn enabled_entries(&self) -> impl Iterator<Item = (u8, u8, u8, ExtractCfg)> + '_ {
        (0..layer::COUNT).flat_map(move |lid| {
            (0..MAX_LAYER_TYPES).flat_map(move |lt| {
                (0..MAX_EXTRACTORS).filter_map(move |ld| {
                    let cfg = self.get(lid, lt, ld);
                    cfg.enabled.then_some((lid, lt, ld, cfg))
                })
            })
        })
    }
}

/// The low `n` bits set, saturating at a full word.
const fn low_mask(n: u32) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

/// Merges a span of `nr_bits` starting at (`start_word`, `offset`) into the
/// field's per-word masks and records how many words the field spans.
///
/// Spans needing a word index beyond `max_word` are silently skipped; the
/// active key class simply cannot hold them.
pub(crate) fn set_word_masks(
    field: &mut KeyField,
    nr_bits: u16,
    start_word: usize,
    offset: u32,
    max_word: usize,
) {
    let nr_bits = nr_bits as u32;

    if offset + nr_bits <= 64 {
        // one word only
        if start_word > max_word {
            return;
        }
        field.kw_mask[start_word] |= low_mask(nr_bits) << offset;
        field.nr_words = 1;
    } else if offset + nr_bits <= 128 {
        // two words
        if start_word + 1 > max_word {
            return;
        }
        let bits_in_first = 64 - offset;
        field.kw_mask[start_word] |= low_mask(bits_in_first) << offset;
        field.kw_mask[start_word + 1] |= low_mask(nr_bits + offset - 64);
        field.nr_words = 2;
    } else {
        // three words, middle word fully covered
        if start_word + 2 > max_word {
            return;
        }
        let bits_in_first = 64 - offset;
        field.kw_mask[start_word] |= low_mask(bits_in_first) << offset;
        field.kw_mask[start_word + 1] = u64::MAX;
        field.kw_mask[start_word + 2] |= low_mask(nr_bits + offset - 128);
        field.nr_words = 3;
    }
}

/// Records one enabled parse-result nibble into the field it feeds.
///
/// `bit_number` is the position in the nibble enable mask; `key_nibble` is
/// how many enabled nibbles precede it (enabled nibbles are concatenated
/// in the key, so unmapped ones still consume key space).
pub(crate) fn scan_parse_result(
    fields: &mut [KeyField; FlowField::COUNT],
    bit_number: u8,
    key_nibble: u8,
    max_word: usize,
) {
    let offset = (key_nibble as u32 * 4) % 64;
    let word = (key_nibble as usize * 4) / 64;

    let field = match bit_number {
        0..=2 => FlowField::Chan,
        3 => FlowField::ErrLev,
        4..=5 => FlowField::ErrCode,
        6 => FlowField::Lxmb,
        // layer-type nibbles only as of now
        9 => FlowField::La,
        12 => FlowField::Lb,
        15 => FlowField::Lc,
        18 => FlowField::Ld,
        21 => FlowField::Le,
        24 => FlowField::Lf,
        27 => FlowField::Lg,
        30 => FlowField::Lh,
        _ => return,
    };

    set_word_masks(&mut fields[field.index()], 4, word, offset, max_word);
}

/// One row of the header scan table: where a logical field sits within its
/// protocol header.
pub(crate) struct HeaderScan {
    pub field: FlowField,
    pub lid: u8,
    pub ltype: u8,
    /// Byte offset of the field within the layer's header.
    pub start: u8,
    /// Field length in bytes.
    pub len: u8,
}

/// The header fields of interest with their (layer, layer type, offset,
/// length) positions. Example: the IPv4 source address is 4 bytes starting
/// at byte 12 of the IP header.
///
/// On the transmit path layer A carries the inline transmit header ahead of
/// the Ethernet header, shifting the MAC fields by its 8-byte prefix; the
/// target-function selector occupies its first two bytes.
pub(crate) fn header_scan_table(dir: Direction) -> [HeaderScan; 17] {
    let (la_ltype, la_start) = match dir {
        Direction::Rx => (ltype::LA_ETHER, 0),
        Direction::Tx => (ltype::LA_IH_NIX_ETHER, 8),
    };

    [
        HeaderScan {
            field: FlowField::SipV4,
            lid: layer::LC,
            ltype: ltype::LC_IP,
            start: 12,
            len: 4,
        },
        HeaderScan {
            field: FlowField::DipV4,
            lid: layer::LC,
            ltype: ltype::LC_IP,
            start: 16,
            len: 4,
        },
        HeaderScan {
            field: FlowField::Tos,
            lid: layer::LC,
            ltype: ltype::LC_IP,
            start: 1,
            len: 1,
        },
        HeaderScan {
            field: FlowField::SipV6,
            lid: layer::LC,
            ltype: ltype::LC_IP6,
            start: 8,
            len: 16,
        },
        HeaderScan {
            field: FlowField::DipV6,
            lid: layer::LC,
            ltype: ltype::LC_IP6,
            start: 24,
            len: 16,
        },
        HeaderScan {
            field: FlowField::SportUdp,
            lid: layer::LD,
            ltype: ltype::LD_UDP,
            start: 0,
            len: 2,
        },
        HeaderScan {
            field: FlowField::DportUdp,
            lid: layer::LD,
            ltype: ltype::LD_UDP,
            start: 2,
            len: 2,
        },
        HeaderScan {
            field: FlowField::SportTcp,
            lid: layer::LD,
            ltype: ltype::LD_TCP,
            start: 0,
            len: 2,
        },
        HeaderScan {
            field: FlowField::DportTcp,
            lid: layer::LD,
            ltype: ltype::LD_TCP,
            start: 2,
            len: 2,
        },
        HeaderScan {
            field: FlowField::EtypeEther,
            lid: layer::LA,
            ltype: ltype::LA_ETHER,
            start: 12,
            len: 2,
        },
        HeaderScan {
            field: FlowField::EtypeTag1,
            lid: layer::LB,
            ltype: ltype::LB_CTAG,
            start: 4,
            len: 2,
        },
        HeaderScan {
            field: FlowField::EtypeTag2,
            lid: layer::LB,
            ltype: ltype::LB_STAG_QINQ,
            start: 8,
            len: 2,
        },
        HeaderScan {
            field: FlowField::VlanTag1,
            lid: layer::LB,
            ltype: ltype::LB_CTAG,
            start: 2,
            len: 2,
        },
        HeaderScan {
            field: FlowField::VlanTag2,
            lid: layer::LB,
            ltype: ltype::LB_STAG_QINQ,
            start: 2,
            len: 2,
        },
        HeaderScan {
            field: FlowField::Dmac,
            lid: layer::LA,
            ltype: la_ltype,
            start: la_start,
            len: 6,
        },
        HeaderScan {
            field: FlowField::Smac,
            lid: layer::LA,
            ltype: la_ltype,
            start: la_start,
            len: 6,
        },
        // Target function is 2 bytes at byte 0 of the inline header.
        HeaderScan {
            field: FlowField::PfFunc,
            lid: layer::LA,
            ltype: ltype::LA_IH_NIX_ETHER,
            start: 0,
            len: 2,
        },
    ]
}

/// Records every field of interest covered by one enabled extraction entry.
pub(crate) fn scan_ldata(
    fields: &mut [KeyField; FlowField::COUNT],
    lid: u8,
    lt: u8,
    cfg: ExtractCfg,
    dir: Direction,
    max_word: usize,
) {
    let hdr = cfg.hdr_offset as u32;
    let nr_bytes = cfg.byte_len as u32;

    for row in header_scan_table(dir) {
        if row.lid != lid || row.ltype != lt {
            continue;
        }
        let start = row.start as u32;
        let len = row.len as u32;
        if start < hdr || start + len > hdr + nr_bytes {
            continue;
        }

        // Bit offset of the field within the extracted chunk: extraction
        // preserves header byte order, so later header bytes sit at lower
        // key bit offsets.
        let bit_offset = (hdr + nr_bytes - start - len) * 8;
        let abs_bit = cfg.key_offset as u32 * 8 + bit_offset;

        let kf = &mut fields[row.field.index()];
        kf.mdata = LayerMdata {
            lid,
            ltype: lt,
            hdr: cfg.hdr_offset,
            key: cfg.key_offset,
            len: cfg.byte_len,
        };
        set_word_masks(
            kf,
            (len * 8) as u16,
            (abs_bit / 64) as usize,
            abs_bit % 64,
            max_word,
        );
    }
}

/// Scans one direction's profile and derives the per-field key maps.
pub(crate) fn scan_kex(
    snapshot: &ProfileSnapshot,
    dir: Direction,
    max_word: usize,
) -> [KeyField; FlowField::COUNT] {
    let mut fields = [KeyField::default(); FlowField::COUNT];

    // Enabled parse-result nibbles are concatenated ahead of layer data.
    let mut key_nibble = 0u8;
    for bit in 0..31u8 {
        if snapshot.nibble_mask() & (1 << bit) != 0 {
            scan_parse_result(&mut fields, bit, key_nibble, max_word);
            key_nibble += 1;
        }
    }

    for (lid, lt, _slot, cfg) in snapshot.enabled_entries() {
        scan_ldata(&mut fields, lid, lt, cfg, dir, max_word);
    }

    fields
}
