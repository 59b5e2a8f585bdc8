//! Common flowsteer types for NIC control-plane code.
//!
//! This crate provides type-safe representations of the network primitives
//! carried by flow match specifications:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`Ipv4Address`] / [`Ipv6Address`]: IP addresses with bit-conversion
//!   helpers for key packing

mod ip;
mod mac;

pub use ip::{Ipv4Address, Ipv6Address};
pub use mac::MacAddress;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),
}
