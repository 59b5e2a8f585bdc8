//! Core classifier hardware types.
//!
//! These types describe the geometry of the generic match key and identify
//! the scarce device resources (MCAM entries, hit counters, functions)
//! managed by the control plane.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of 64-bit words in a match key entry, sized for the
/// largest key class.
pub const MAX_KEY_WORDS: usize = 7;

/// Index of an MCAM entry (one hardware ternary rule slot).
pub type EntryIndex = u16;

/// Traffic direction through the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Receive path (packets arriving from the wire).
    #[default]
    Rx,
    /// Transmit path (packets leaving a local function).
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rx => write!(f, "RX"),
            Self::Tx => write!(f, "TX"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "RX" | "INGRESS" => Ok(Self::Rx),
            "TX" | "EGRESS" => Ok(Self::Tx),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

/// MCAM key size class.
///
/// The class determines how many banks one entry consumes and therefore how
/// many 64-bit key words are usable for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeySize {
    /// One bank per entry.
    X1,
    /// Two banks per entry.
    #[default]
    X2,
    /// Four banks per entry.
    X4,
}

impl KeySize {
    /// Highest usable key word index for this class.
    pub const fn max_word_index(&self) -> usize {
        match self {
            KeySize::X1 => 1,
            KeySize::X2 => 3,
            KeySize::X4 => 6,
        }
    }
}

impl fmt::Display for KeySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X1 => write!(f, "X1"),
            Self::X2 => write!(f, "X2"),
            Self::X4 => write!(f, "X4"),
        }
    }
}

/// Handle to a hardware hit counter bound to one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterHandle(u16);

impl CounterHandle {
    pub const fn new(raw: u16) -> Self {
        CounterHandle(raw)
    }

    pub const fn raw(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for CounterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cntr{}", self.0)
    }
}

/// Identifier of a local function (physical or virtual).
///
/// The low 10 bits select a function within the physical function; a
/// non-zero function selector denotes a virtual function. The all-zero id
/// is the administrative function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FuncId(u16);

impl FuncId {
    /// Mask of the function-selector bits.
    pub const FUNC_MASK: u16 = 0x3ff;

    /// The administrative function id.
    pub const ADMIN: FuncId = FuncId(0);

    pub const fn new(raw: u16) -> Self {
        FuncId(raw)
    }

    pub const fn raw(&self) -> u16 {
        self.0
    }

    /// Physical function number.
    pub const fn pf(&self) -> u16 {
        self.0 >> 10
    }

    /// Function selector within the physical function (0 = the PF itself).
    pub const fn func(&self) -> u16 {
        self.0 & Self::FUNC_MASK
    }

    /// Returns true if this id names a virtual function.
    pub const fn is_vf(&self) -> bool {
        self.func() != 0
    }

    /// Returns true if this is the administrative function.
    pub const fn is_admin(&self) -> bool {
        self.0 == 0
    }

    /// Replaces the function-selector bits, keeping the PF bits.
    pub const fn with_func(&self, func: u16) -> Self {
        FuncId((self.0 & !Self::FUNC_MASK) | (func & Self::FUNC_MASK))
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_vf() {
            write!(f, "pf{}vf{}", self.pf(), self.func() - 1)
        } else {
            write!(f, "pf{}", self.pf())
        }
    }
}

/// One MCAM entry: the ternary match key plus its action payloads.
///
/// `kw` holds the key value words and `kw_mask` the care masks; a mask bit
/// of 0 means "don't care" at that key bit. `action` and `vtag_action` are
/// the encoded action registers (see [`crate::action`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McamEntry {
    pub kw: [u64; MAX_KEY_WORDS],
    pub kw_mask: [u64; MAX_KEY_WORDS],
    pub action: u64,
    pub vtag_action: u64,
}
