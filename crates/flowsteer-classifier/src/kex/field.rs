//! Logical flow fields and the feature bitset.
//!
//! A flow field is a logical quantity that can be matched on: either a
//! packet header field (MAC addresses, ethertype, IP addresses, ports) or
//! a piece of parser metadata concatenated into the key (channel, error
//! codes, per-layer detected types). Which fields are actually usable on a
//! given device depends on the programmed key-extraction profile; see
//! [`super::profile::ClassifierProfile`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol decode layer ids, outermost first.
pub mod layer {
    /// Layer A: outer Ethernet (or the inline transmit header).
    pub const LA: u8 = 0;
    /// Layer B: VLAN/QinQ tags.
    pub const LB: u8 = 1;
    /// Layer C: IP.
    pub const LC: u8 = 2;
    /// Layer D: transport (TCP/UDP/...).
    pub const LD: u8 = 3;
    /// Layer E: tunnel.
    pub const LE: u8 = 4;
    /// Layer F: inner Ethernet.
    pub const LF: u8 = 5;
    /// Layer G: inner IP.
    pub const LG: u8 = 6;
    /// Layer H: inner transport.
    pub const LH: u8 = 7;

    /// Number of decode layers.
    pub const COUNT: u8 = 8;
}

/// Layer-type values detected by the parser, per layer.
pub mod ltype {
    /// No layer detected.
    pub const NA: u8 = 0;

    pub const LA_ETHER: u8 = 2;
    /// Ethernet preceded by the inline transmit header.
    pub const LA_IH_NIX_ETHER: u8 = 3;

    pub const LB_CTAG: u8 = 2;
    pub const LB_STAG_QINQ: u8 = 3;

    pub const LC_IP: u8 = 2;
    pub const LC_IP6: u8 = 4;

    pub const LD_TCP: u8 = 1;
    pub const LD_UDP: u8 = 2;

    /// Number of layer-type values per layer.
    pub const COUNT: u8 = 16;
}

/// A logical flow field.
///
/// The first block ([`FlowField::Dmac`] through [`FlowField::DportUdp`])
/// are the header fields callers may request in a flow specification; the
/// rest are parser metadata and per-layer variants used internally by the
/// profile scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum FlowField {
    // Header fields requestable in flow specifications.
    Dmac = 0,
    Smac = 1,
    /// Canonical ethertype, unified across tagging variants.
    Etype = 2,
    /// Canonical outer VLAN TCI, unified across tagging variants.
    OuterVid = 3,
    Tos = 4,
    SipV4 = 5,
    DipV4 = 6,
    SipV6 = 7,
    DipV6 = 8,
    SportTcp = 9,
    DportTcp = 10,
    SportUdp = 11,
    DportUdp = 12,

    // Parser metadata concatenated ahead of layer data in the key.
    Chan = 13,
    /// Target-function selector in the inline transmit header.
    PfFunc = 14,
    ErrLev = 15,
    ErrCode = 16,
    /// "More bits" marker nibble from the parser.
    Lxmb = 17,
    La = 18,
    Lb = 19,
    Lc = 20,
    Ld = 21,
    Le = 22,
    Lf = 23,
    Lg = 24,
    Lh = 25,

    // Per-layer variants unified into the canonical fields above.
    EtypeEther = 26,
    EtypeTag1 = 27,
    EtypeTag2 = 28,
    VlanTag1 = 29,
    VlanTag2 = 30,
}

impl FlowField {
    /// Total number of flow fields.
    pub const COUNT: usize = 31;

    /// The header fields callers may request in a flow specification, in
    /// bit order.
    pub const HEADER_FIELDS: [FlowField; 13] = [
        FlowField::Dmac,
        FlowField::Smac,
        FlowField::Etype,
        FlowField::OuterVid,
        FlowField::Tos,
        FlowField::SipV4,
        FlowField::DipV4,
        FlowField::SipV6,
        FlowField::DipV6,
        FlowField::SportTcp,
        FlowField::DportTcp,
        FlowField::SportUdp,
        FlowField::DportUdp,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn bit(self) -> u64 {
        1u64 << (self as usize)
    }

    pub(crate) fn from_index(index: usize) -> Option<FlowField> {
        ALL_FIELDS.get(index).copied()
    }

    /// Human-readable field name used in diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            FlowField::Dmac => "dmac",
            FlowField::Smac => "smac",
            FlowField::Etype => "ether type",
            FlowField::OuterVid => "outer vlan id",
            FlowField::Tos => "tos",
            FlowField::SipV4 => "ipv4 source ip",
            FlowField::DipV4 => "ipv4 destination ip",
            FlowField::SipV6 => "ipv6 source ip",
            FlowField::DipV6 => "ipv6 destination ip",
            FlowField::SportTcp => "tcp source port",
            FlowField::DportTcp => "tcp destination port",
            FlowField::SportUdp => "udp source port",
            FlowField::DportUdp => "udp destination port",
            FlowField::Chan => "channel",
            FlowField::PfFunc => "target function",
            FlowField::ErrLev => "error level",
            FlowField::ErrCode => "error code",
            FlowField::Lxmb => "lx more-bits",
            FlowField::La => "layer a type",
            FlowField::Lb => "layer b type",
            FlowField::Lc => "layer c type",
            FlowField::Ld => "layer d type",
            FlowField::Le => "layer e type",
            FlowField::Lf => "layer f type",
            FlowField::Lg => "layer g type",
            FlowField::Lh => "layer h type",
            FlowField::EtypeEther => "ether type (untagged)",
            FlowField::EtypeTag1 => "ether type (single tag)",
            FlowField::EtypeTag2 => "ether type (double tag)",
            FlowField::VlanTag1 => "vlan tci (single tag)",
            FlowField::VlanTag2 => "vlan tci (double tag)",
        }
    }
}

impl fmt::Display for FlowField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const ALL_FIELDS: [FlowField; FlowField::COUNT] = [
    FlowField::Dmac,
    FlowField::Smac,
    FlowField::Etype,
    FlowField::OuterVid,
    FlowField::Tos,
    FlowField::SipV4,
    FlowField::DipV4,
    FlowField::SipV6,
    FlowField::DipV6,
    FlowField::SportTcp,
    FlowField::DportTcp,
    FlowField::SportUdp,
    FlowField::DportUdp,
    FlowField::Chan,
    FlowField::PfFunc,
    FlowField::ErrLev,
    FlowField::ErrCode,
    FlowField::Lxmb,
    FlowField::La,
    FlowField::Lb,
    FlowField::Lc,
    FlowField::Ld,
    FlowField::Le,
    FlowField::Lf,
    FlowField::Lg,
    FlowField::Lh,
    FlowField::EtypeEther,
    FlowField::EtypeTag1,
    FlowField::EtypeTag2,
    FlowField::VlanTag1,
    FlowField::VlanTag2,
];

/// A set of flow fields, one bit per [`FlowField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSet(u64);

impl FieldSet {
    pub const EMPTY: FieldSet = FieldSet(0);

    pub const fn empty() -> Self {
        FieldSet(0)
    }

    pub const fn of(fields: &[FlowField]) -> Self {
        let mut bits = 0u64;
        let mut i = 0;
        while i < fields.len() {
            bits |= fields[i].bit();
            i += 1;
        }
        FieldSet(bits)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn contains(&self, field: FlowField) -> bool {
        self.0 & field.bit() != 0
    }

    pub fn insert(&mut self, field: FlowField) {
        self.0 |= field.bit();
    }

    pub fn remove(&mut self, field: FlowField) {
        self.0 &= !field.bit();
    }

    pub const fn intersects(&self, other: FieldSet) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(&self, other: FieldSet) -> FieldSet {
        FieldSet(self.0 | other.0)
    }

    pub const fn intersection(&self, other: FieldSet) -> FieldSet {
        FieldSet(self.0 & other.0)
    }

    /// Fields in `self` that are not in `other`.
    pub const fn difference(&self, other: FieldSet) -> FieldSet {
        FieldSet(self.0 & !other.0)
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterates the member fields in bit order.
    pub fn iter(&self) -> impl Iterator<Item = FlowField> + '_ {
        ALL_FIELDS.iter().copied().filter(|f| self.contains(*f))
    }
}

impl From<FlowField> for FieldSet {
    fn from(field: FlowField) -> Self {
        FieldSet(field.bit())
    }
}

impl fmt::Display for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for field in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str(field.name())?;
            first = false;
        }
        Ok(())
    }
}
