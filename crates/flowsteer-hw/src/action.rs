//! Encoders and decoders for the MCAM action registers.
//!
//! The forwarding block consumes two 64-bit registers per entry: the action
//! register (what to do with a matching packet) and the VLAN-tag action
//! register (tag strip/insert descriptors). The bit layouts differ between
//! the receive and transmit paths. Each layout is expressed here as an
//! explicit encode/decode pair over documented bit ranges so the shift/mask
//! arithmetic can be tested independently of the classifier logic.

use serde::{Deserialize, Serialize};

/// Reserved receive VLAN-tag type used for endpoint-assigned VLAN
/// configuration applied by a parent function.
pub const RX_VTAG_TYPE7: u8 = 7;

/// Decode layer holding VLAN tags (layer B), referenced by the receive
/// VLAN-tag action.
const RX_VTAG_LID: u64 = 1;

/// Decode layer holding the inline transmit header (layer A), referenced by
/// the transmit VLAN-tag action.
const TX_VTAG_LID: u64 = 0;

/// Receive action opcode (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum RxOpcode {
    /// Drop the packet.
    #[default]
    Drop = 0,
    /// Deliver to the unicast queue named by `index`.
    Ucast = 1,
    /// Deliver to the unicast IPsec queue.
    UcastIpsec = 2,
    /// Deliver to a multicast/mirror list.
    Mcast = 3,
    /// Spread across queues with the RSS algorithm named by `flow_key_alg`.
    Rss = 4,
    /// Use the owner's default-rule action instead of this one.
    Default = 0xf,
}

impl RxOpcode {
    /// Decodes a raw opcode; unknown values decode as [`RxOpcode::Drop`].
    pub const fn from_raw(raw: u8) -> Self {
        match raw & 0xf {
            1 => RxOpcode::Ucast,
            2 => RxOpcode::UcastIpsec,
            3 => RxOpcode::Mcast,
            4 => RxOpcode::Rss,
            0xf => RxOpcode::Default,
            _ => RxOpcode::Drop,
        }
    }
}

/// Transmit action opcode (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxOpcode {
    /// Drop the packet.
    #[default]
    Drop = 0,
    /// Transmit on the default channel.
    UcastDefault = 1,
    /// Transmit on the channel named by `index`.
    UcastChan = 2,
    /// Deliver to a multicast/mirror list.
    Mcast = 3,
}

impl TxOpcode {
    /// Decodes a raw opcode; unknown values decode as [`TxOpcode::Drop`].
    pub const fn from_raw(raw: u8) -> Self {
        match raw & 0xf {
            1 => TxOpcode::UcastDefault,
            2 => TxOpcode::UcastChan,
            3 => TxOpcode::Mcast,
            _ => TxOpcode::Drop,
        }
    }
}

/// Receive action register.
///
/// Layout: bits 3:0 `op`, 19:4 `pf_func`, 39:20 `index`, 55:40 `match_id`,
/// 60:56 `flow_key_alg`, 63:61 reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RxAction {
    pub op: RxOpcode,
    /// Destination function receiving the packet.
    pub pf_func: u16,
    /// Opcode-specific index (queue, multicast list, RSS group), 20 bits.
    pub index: u32,
    /// Match id reported with the packet, 16 bits.
    pub match_id: u16,
    /// RSS flow key algorithm selector, 5 bits.
    pub flow_key_alg: u8,
}

impl RxAction {
    pub const fn encode(&self) -> u64 {
        (self.op as u64 & 0xf)
            | (self.pf_func as u64) << 4
            | (self.index as u64 & 0xf_ffff) << 20
            | (self.match_id as u64) << 40
            | (self.flow_key_alg as u64 & 0x1f) << 56
    }

    pub const fn decode(raw: u64) -> Self {
        RxAction {
            op: RxOpcode::from_raw((raw & 0xf) as u8),
            pf_func: (raw >> 4) as u16,
            index: ((raw >> 20) & 0xf_ffff) as u32,
            match_id: (raw >> 40) as u16,
            flow_key_alg: ((raw >> 56) & 0x1f) as u8,
        }
    }
}

/// Transmit action register.
///
/// Layout: bits 3:0 `op`, 11:4 reserved, 31:12 `index`, 47:32 `match_id`,
/// 63:48 reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxAction {
    pub op: TxOpcode,
    /// Opcode-specific index (channel, multicast list), 20 bits.
    pub index: u32,
    /// Match id reported with the packet, 16 bits.
    pub match_id: u16,
}

impl TxAction {
    pub const fn encode(&self) -> u64 {
        (self.op as u64 & 0xf)
            | (self.index as u64 & 0xf_ffff) << 12
            | (self.match_id as u64) << 32
    }

    pub const fn decode(raw: u64) -> Self {
        TxAction {
            op: TxOpcode::from_raw((raw & 0xf) as u8),
            index: ((raw >> 12) & 0xf_ffff) as u32,
            match_id: (raw >> 32) as u16,
        }
    }
}

/// Receive VLAN-tag action register: strip/capture configuration for the
/// two outermost tags.
///
/// Layout per tag slot: bits 7:0 relative pointer, 10:8 layer id,
/// 14:12 tag type, 15 valid — slot 0 in bits 15:0, slot 1 in bits 47:32.
/// Tag 0 sits at byte 0 of the VLAN decode layer, tag 1 at byte 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RxVtagAction {
    pub vtag0_valid: bool,
    /// Strip/capture profile for the outer tag, 3 bits.
    pub vtag0_type: u8,
    pub vtag1_valid: bool,
    /// Strip/capture profile for the inner tag, 3 bits.
    pub vtag1_type: u8,
}

impl RxVtagAction {
    pub const fn encode(&self) -> u64 {
        (self.vtag0_valid as u64) << 15
            | (self.vtag0_type as u64 & 0x7) << 12
            | RX_VTAG_LID << 8
            | (self.vtag1_valid as u64) << 47
            | (self.vtag1_type as u64 & 0x7) << 44
            | RX_VTAG_LID << 40
            | 4 << 32
    }

    pub const fn decode(raw: u64) -> Self {
        RxVtagAction {
            vtag0_valid: raw >> 15 & 1 != 0,
            vtag0_type: (raw >> 12 & 0x7) as u8,
            vtag1_valid: raw >> 47 & 1 != 0,
            vtag1_type: (raw >> 44 & 0x7) as u8,
        }
    }
}

/// Transmit VLAN-tag action register: insertion descriptors for the two
/// outermost tags.
///
/// Layout per tag slot: bits 7:0 relative pointer, 10:8 layer id,
/// 13:12 insert opcode, 25:16 tag definition index — slot 0 in bits 25:0,
/// slot 1 in bits 57:32. Insertion points sit at bytes 20 and 24 of the
/// inline transmit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxVtagAction {
    /// Tag definition index for the outer tag, 10 bits.
    pub vtag0_def: u16,
    /// Insert opcode for the outer tag, 2 bits.
    pub vtag0_op: u8,
    /// Tag definition index for the inner tag, 10 bits.
    pub vtag1_def: u16,
    /// Insert opcode for the inner tag, 2 bits.
    pub vtag1_op: u8,
}

impl TxVtagAction {
    pub const fn encode(&self) -> u64 {
        (self.vtag0_def as u64 & 0x3ff) << 16
            | (self.vtag0_op as u64 & 0x3) << 12
            | TX_VTAG_LID << 8
            | 20
            | (self.vtag1_def as u64 & 0x3ff) << 48
            | (self.vtag1_op as u64 & 0x3) << 44
            | TX_VTAG_LID << 40
            | 24 << 32
    }

    pub const fn decode(raw: u64) -> Self {
        TxVtagAction {
            vtag0_def: (raw >> 16 & 0x3ff) as u16,
            vtag0_op: (raw >> 12 & 0x3) as u8,
            vtag1_def: (raw >> 48 & 0x3ff) as u16,
            vtag1_op: (raw >> 44 & 0x3) as u8,
        }
    }
}
