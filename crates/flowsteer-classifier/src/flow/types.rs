//! Flow request/response types.
//!
//! These are the transport-agnostic shapes exchanged with callers: a flow
//! specification in natural byte order, the direction-specific action
//! payload, and the install/delete request forms.

use flowsteer_hw::{
    CounterHandle, Direction, EntryIndex, FuncId, HwError, RxOpcode, RxVtagAction, TxOpcode,
    TxVtagAction,
};
use flowsteer_types::{Ipv4Address, Ipv6Address, MacAddress};
use serde::{Deserialize, Serialize};

use crate::kex::{FieldSet, FlowField};

/// A flow match specification in natural representation.
///
/// Used twice per request: once for the values and once for the care
/// masks. Only the members selected by the request's feature set are
/// meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSpec {
    pub dmac: MacAddress,
    pub smac: MacAddress,
    pub etype: u16,
    /// Outer VLAN TCI (PCP/DEI/VID).
    pub vlan_tci: u16,
    pub tos: u8,
    pub ip4_src: Ipv4Address,
    pub ip4_dst: Ipv4Address,
    pub ip6_src: Ipv6Address,
    pub ip6_dst: Ipv6Address,
    /// L4 source port, shared by the TCP and UDP port fields.
    pub sport: u16,
    /// L4 destination port, shared by the TCP and UDP port fields.
    pub dport: u16,
}

impl Default for FlowSpec {
    fn default() -> Self {
        FlowSpec {
            dmac: MacAddress::ZERO,
            smac: MacAddress::ZERO,
            etype: 0,
            vlan_tci: 0,
            tos: 0,
            ip4_src: Ipv4Address::UNSPECIFIED,
            ip4_dst: Ipv4Address::UNSPECIFIED,
            ip6_src: Ipv6Address::UNSPECIFIED,
            ip6_dst: Ipv6Address::UNSPECIFIED,
            sport: 0,
            dport: 0,
        }
    }
}

impl FlowSpec {
    /// Copies the members selected by `features` from `src`, leaving the
    /// rest untouched.
    pub fn copy_fields(&mut self, src: &FlowSpec, features: FieldSet) {
        for field in features.iter() {
            match field {
                FlowField::Dmac => self.dmac = src.dmac,
                FlowField::Smac => self.smac = src.smac,
                FlowField::Etype => self.etype = src.etype,
                FlowField::OuterVid => self.vlan_tci = src.vlan_tci,
                FlowField::Tos => self.tos = src.tos,
                FlowField::SipV4 => self.ip4_src = src.ip4_src,
                FlowField::DipV4 => self.ip4_dst = src.ip4_dst,
                FlowField::SipV6 => self.ip6_src = src.ip6_src,
                FlowField::DipV6 => self.ip6_dst = src.ip6_dst,
                FlowField::SportTcp | FlowField::SportUdp => self.sport = src.sport,
                FlowField::DportTcp | FlowField::DportUdp => self.dport = src.dport,
                _ => {}
            }
        }
    }
}

/// Direction-specific action payload of an install request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    /// Receive-path action plus tag strip/capture descriptor.
    Ingress {
        op: RxOpcode,
        index: u32,
        match_id: u16,
        flow_key_alg: u8,
        vtag: RxVtagAction,
    },
    /// Transmit-path action plus tag insertion descriptor.
    Egress {
        op: TxOpcode,
        index: u32,
        match_id: u16,
        vtag: TxVtagAction,
    },
}

impl FlowAction {
    /// Drop on the receive path, no tag handling.
    pub fn ingress_drop() -> Self {
        FlowAction::Ingress {
            op: RxOpcode::Drop,
            index: 0,
            match_id: 0,
            flow_key_alg: 0,
            vtag: RxVtagAction::default(),
        }
    }

    /// Deliver to a unicast queue on the receive path.
    pub fn ingress_ucast(index: u32) -> Self {
        FlowAction::Ingress {
            op: RxOpcode::Ucast,
            index,
            match_id: 0,
            flow_key_alg: 0,
            vtag: RxVtagAction::default(),
        }
    }

    /// Defer to the owner's default-rule action.
    pub fn ingress_default() -> Self {
        FlowAction::Ingress {
            op: RxOpcode::Default,
            index: 0,
            match_id: 0,
            flow_key_alg: 0,
            vtag: RxVtagAction::default(),
        }
    }

    /// Transmit on the default channel.
    pub fn egress_default() -> Self {
        FlowAction::Egress {
            op: TxOpcode::UcastDefault,
            index: 0,
            match_id: 0,
            vtag: TxVtagAction::default(),
        }
    }

    /// The direction this action applies to.
    pub fn direction(&self) -> Direction {
        match self {
            FlowAction::Ingress { .. } => Direction::Rx,
            FlowAction::Egress { .. } => Direction::Tx,
        }
    }
}

/// Request to install (or reinstall) one classification rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallRequest {
    /// Requesting function; the administrative function installs on behalf
    /// of the target named by `vf`.
    pub owner: FuncId,
    pub direction: Direction,
    /// Target MCAM entry. Required for non-default rules; default rules
    /// resolve to the endpoint's reserved entry.
    pub entry: Option<EntryIndex>,
    /// Function selector of the install target within the owner's PF
    /// (0 = the owner itself).
    pub vf: u16,
    /// Header fields the flow discriminates on.
    pub features: FieldSet,
    pub packet: FlowSpec,
    pub mask: FlowSpec,
    /// Ingress channel the flow applies to.
    pub channel: u16,
    pub action: FlowAction,
    /// Install as the endpoint's baseline default rule.
    pub default_rule: bool,
    /// For default-rule installs: merge into the existing default instead
    /// of overwriting it.
    pub append: bool,
    /// Bind a hit counter to the rule (best effort).
    pub set_counter: bool,
}

impl InstallRequest {
    pub fn new(owner: FuncId, action: FlowAction) -> Self {
        InstallRequest {
            owner,
            direction: action.direction(),
            entry: None,
            vf: 0,
            features: FieldSet::empty(),
            packet: FlowSpec::default(),
            mask: FlowSpec::default(),
            channel: 0,
            action,
            default_rule: false,
            append: false,
            set_counter: false,
        }
    }

    pub fn with_entry(mut self, entry: EntryIndex) -> Self {
        self.entry = Some(entry);
        self
    }

    pub fn with_match(mut self, features: FieldSet, packet: FlowSpec, mask: FlowSpec) -> Self {
        self.features = features;
        self.packet = packet;
        self.mask = mask;
        self
    }

    pub fn with_channel(mut self, channel: u16) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_counter(mut self) -> Self {
        self.set_counter = true;
        self
    }

    pub fn as_default_rule(mut self, append: bool) -> Self {
        self.default_rule = true;
        self.append = append;
        self
    }

    pub fn for_vf(mut self, vf: u16) -> Self {
        self.vf = vf;
        self
    }
}

/// Counter outcome reported back for an install.
///
/// Counter exhaustion does not fail the install: classifier entries are
/// more plentiful than counters, so the rule is installed without one and
/// the failure is surfaced here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterOutcome {
    /// The request did not ask for a counter.
    NotRequested,
    /// A counter is bound to the rule.
    Bound(CounterHandle),
    /// Allocation failed; the rule is installed without a counter.
    AllocFailed(HwError),
}

/// Response to a successful install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallResponse {
    /// The entry the rule landed on (relevant for default rules, where the
    /// classifier picks the reserved entry).
    pub entry: EntryIndex,
    pub counter: CounterOutcome,
}

/// What a delete request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteScope {
    /// One entry by index.
    Entry(EntryIndex),
    /// All of the owner's rules within an inclusive index range.
    Range { start: EntryIndex, end: EntryIndex },
    /// All of the owner's rules.
    All,
}

/// Registration data for one endpoint (PF or VF) using the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub func: FuncId,
    /// The endpoint's configured MAC address, used for DMAC autofill and
    /// refresh.
    pub mac: MacAddress,
    /// First ingress channel owned by the endpoint.
    pub channel_base: u16,
    /// Number of ingress channels owned by the endpoint.
    pub channel_count: u16,
    /// Reserved MCAM entry for the endpoint's default unicast rule.
    pub default_entry: EntryIndex,
    /// Whether the endpoint's receive path is initialized; rules for a
    /// not-ready endpoint are installed disabled.
    pub ready: bool,
}
