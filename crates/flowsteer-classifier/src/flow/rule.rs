//! Installed classification rules.

use flowsteer_hw::{CounterHandle, Direction, EntryIndex, FuncId, RxAction, TxAction};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::FlowSpec;
use crate::kex::FieldSet;

/// The compiled, direction-specific action recorded on a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleAction {
    Rx(RxAction),
    Tx(TxAction),
}

impl RuleAction {
    /// The action register value written to hardware.
    pub fn encode(&self) -> u64 {
        match self {
            RuleAction::Rx(action) => action.encode(),
            RuleAction::Tx(action) => action.encode(),
        }
    }

    pub fn as_rx(&self) -> Option<&RxAction> {
        match self {
            RuleAction::Rx(action) => Some(action),
            RuleAction::Tx(_) => None,
        }
    }
}

/// One installed classification rule.
///
/// The database exclusively owns rule records; callers see them only as
/// borrowed references in the scope of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRule {
    /// Hardware entry index; unique key within the database.
    pub entry: EntryIndex,
    pub direction: Direction,
    /// Function that installed the rule.
    pub owner: FuncId,
    /// Match values in natural representation.
    pub packet: FlowSpec,
    /// Care masks in natural representation.
    pub mask: FlowSpec,
    /// Fields actually compiled into the entry, including any inherited
    /// from the owner's default rule.
    pub features: FieldSet,
    pub action: RuleAction,
    /// Encoded VLAN-tag action register.
    pub vtag_action: u64,
    /// Bound hit counter, if any.
    pub counter: Option<CounterHandle>,
    pub enabled: bool,
    /// Baseline catch-all rule for the endpoint; exempt from generic
    /// deletion and inherited by later installs.
    pub is_default: bool,
    /// Rule carries endpoint VLAN configuration applied by a parent
    /// function; its DMAC is refreshed on bulk enable.
    pub vf_vlan_cfg: bool,
}

impl FlowRule {
    pub fn new(entry: EntryIndex, direction: Direction, owner: FuncId, action: RuleAction) -> Self {
        FlowRule {
            entry,
            direction,
            owner,
            packet: FlowSpec::default(),
            mask: FlowSpec::default(),
            features: FieldSet::empty(),
            action,
            vtag_action: 0,
            counter: None,
            enabled: false,
            is_default: false,
            vf_vlan_cfg: false,
        }
    }

    pub fn has_counter(&self) -> bool {
        self.counter.is_some()
    }
}

impl fmt::Display for FlowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FlowRule(entry={}, {}, owner={}, features=[{}]{}{})",
            self.entry,
            self.direction,
            self.owner,
            self.features,
            if self.is_default { ", default" } else { "" },
            if self.enabled { ", enabled" } else { ", disabled" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowsteer_hw::RxOpcode;

    #[test]
    fn test_rule_action_encode_dispatch() {
        let rx = RuleAction::Rx(RxAction {
            op: RxOpcode::Ucast,
            pf_func: 0x400,
            index: 1,
            match_id: 0,
            flow_key_alg: 0,
        });
        assert_eq!(rx.encode() & 0xf, 1);
        assert!(rx.as_rx().is_some());

        let tx = RuleAction::Tx(TxAction::default());
        assert!(tx.as_rx().is_none());
    }

    #[test]
    fn test_rule_display() {
        let rule = FlowRule::new(
            7,
            Direction::Rx,
            FuncId::new(0x400),
            RuleAction::Rx(RxAction::default()),
        );
        let text = rule.to_string();
        assert!(text.contains("entry=7"));
        assert!(text.contains("disabled"));
    }
}
