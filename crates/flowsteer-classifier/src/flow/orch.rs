//! Classifier - flow install/delete/enable orchestration.
//!
//! The [`Classifier`] owns the scanned profile, the rule database, and the
//! per-endpoint state, and drives the hardware collaborator. All mutating
//! operations take `&mut self` and run to completion synchronously; a
//! device context shares one classifier per device behind a single
//! coarse-grained mutex, which serializes the counter-allocate-then-write
//! sequences as required.

use std::collections::HashMap;
use std::sync::Arc;

use flowsteer_hw::action::RX_VTAG_TYPE7;
use flowsteer_hw::{
    Direction, EntryIndex, FuncId, HwError, KeySize, McamBackend, McamEntry, RxAction, RxOpcode,
    TxAction,
};
use flowsteer_types::MacAddress;
use log::{debug, info, warn};
use thiserror::Error;

use super::db::RuleDb;
use super::rule::{FlowRule, RuleAction};
use super::types::{
    CounterOutcome, DeleteScope, EndpointConfig, FlowAction, FlowSpec, InstallRequest,
    InstallResponse,
};
use crate::entry::{build_match, set_field};
use crate::kex::{ClassifierProfile, FieldSet, FlowField, InitError};

/// Error type for classifier operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifierError {
    /// Requested field(s) outside the supported-feature bitset for the
    /// direction. Nothing was mutated.
    #[error("unsupported flow field(s): {0}")]
    UnsupportedFields(FieldSet),

    /// The requested channel does not belong to the target endpoint.
    #[error("channel {channel} out of range for {target}")]
    InvalidChannel { target: FuncId, channel: u16 },

    /// The install target has not been registered.
    #[error("target function {0} is not registered")]
    UnknownTarget(FuncId),

    /// Dependent functions may not install default rules.
    #[error("dependent functions may not install default rules")]
    PermissionDenied,

    /// A non-default install did not name a target entry.
    #[error("entry index required for non-default rules")]
    EntryIndexRequired,

    /// A dependent function's rule would be installed disabled.
    #[error("target function {0} is not initialized")]
    TargetNotReady(FuncId),

    /// A dependent function's fields collide with its reserved default
    /// rule.
    #[error("requested fields overlap the default rule for {0}")]
    OverlapsDefaultRule(FuncId),

    /// The action payload is for the other direction.
    #[error("action direction does not match flow direction")]
    ActionMismatch,

    /// No rule installed at the entry.
    #[error("no rule at entry {0}")]
    RuleNotFound(EntryIndex),

    /// A device write failed; any counter allocated by the same operation
    /// was released and the database left unmodified.
    #[error(transparent)]
    Hw(#[from] HwError),
}

/// Result type alias for classifier operations.
pub type Result<T> = std::result::Result<T, ClassifierError>;

/// Configuration for the classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifierConfig {
    /// MCAM key size class the device is configured for.
    pub key_size: KeySize,
}

impl ClassifierConfig {
    pub fn with_key_size(mut self, key_size: KeySize) -> Self {
        self.key_size = key_size;
        self
    }
}

/// Operation counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifierStats {
    pub installs: u64,
    pub deletes: u64,
    pub bulk_enables: u64,
    pub hw_errors: u64,
    pub counter_exhaustions: u64,
}

/// Per-endpoint state tracked by the classifier.
#[derive(Debug, Clone)]
struct Endpoint {
    mac: MacAddress,
    channel_base: u16,
    channel_count: u16,
    default_entry: EntryIndex,
    ready: bool,
    /// A parent function has applied configuration to this endpoint.
    parent_cfg: bool,
    default_rule: Option<EntryIndex>,
}

/// The classifier control plane for one device.
pub struct Classifier {
    backend: Arc<dyn McamBackend>,
    profile: ClassifierProfile,
    config: ClassifierConfig,
    db: RuleDb,
    endpoints: HashMap<FuncId, Endpoint>,
    stats: ClassifierStats,
}

impl Classifier {
    /// Scans the device's extraction profile and brings the classifier up.
    ///
    /// Fails when the profile cannot support the mandatory ingress fields;
    /// no install operation is possible afterwards.
    pub fn init(
        backend: Arc<dyn McamBackend>,
        config: ClassifierConfig,
    ) -> std::result::Result<Self, InitError> {
        let profile = ClassifierProfile::scan(backend.as_ref(), config.key_size)?;
        info!(
            "classifier up ({} key): rx features [{}], tx features [{}]",
            config.key_size,
            profile.features(Direction::Rx),
            profile.features(Direction::Tx),
        );
        Ok(Classifier {
            backend,
            profile,
            config,
            db: RuleDb::new(),
            endpoints: HashMap::new(),
            stats: ClassifierStats::default(),
        })
    }

    // ============ Endpoint registry ============

    /// Registers or updates an endpoint. Default-rule bookkeeping for an
    /// already-known endpoint is preserved.
    pub fn register_endpoint(&mut self, cfg: EndpointConfig) {
        let (parent_cfg, default_rule) = self
            .endpoints
            .get(&cfg.func)
            .map(|ep| (ep.parent_cfg, ep.default_rule))
            .unwrap_or((false, None));
        self.endpoints.insert(
            cfg.func,
            Endpoint {
                mac: cfg.mac,
                channel_base: cfg.channel_base,
                channel_count: cfg.channel_count,
                default_entry: cfg.default_entry,
                ready: cfg.ready,
                parent_cfg,
                default_rule,
            },
        );
    }

    /// Marks an endpoint's receive path as (not) initialized.
    pub fn set_endpoint_ready(&mut self, func: FuncId, ready: bool) {
        match self.endpoints.get_mut(&func) {
            Some(ep) => ep.ready = ready,
            None => warn!("set_endpoint_ready: unknown endpoint {}", func),
        }
    }

    /// The endpoint's currently recorded MAC address.
    pub fn endpoint_mac(&self, func: FuncId) -> Option<MacAddress> {
        self.endpoints.get(&func).map(|ep| ep.mac)
    }

    // ============ Read access ============

    /// Supported-feature bitset for a direction.
    pub fn features(&self, dir: Direction) -> FieldSet {
        self.profile.features(dir)
    }

    pub fn profile(&self) -> &ClassifierProfile {
        &self.profile
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn stats(&self) -> &ClassifierStats {
        &self.stats
    }

    pub fn rule_count(&self) -> usize {
        self.db.len()
    }

    pub fn find_rule(&self, entry: EntryIndex) -> Option<&FlowRule> {
        self.db.find(entry)
    }

    /// All installed rules in ascending entry order.
    pub fn rules(&self) -> impl Iterator<Item = &FlowRule> {
        self.db.iter()
    }

    // ============ Install ============

    /// Installs or reinstalls one classification rule.
    pub fn install_flow(&mut self, req: InstallRequest) -> Result<InstallResponse> {
        if req.action.direction() != req.direction {
            return Err(ClassifierError::ActionMismatch);
        }

        let from_vf = req.owner.is_vf();
        if from_vf && req.default_rule {
            return Err(ClassifierError::PermissionDenied);
        }

        // Resolve the install target: the administrative function installs
        // on behalf of the named function, a PF may install for its own
        // VF, everyone else installs for themselves.
        let mut pf_sets_vf_mac = false;
        let target = if req.owner.is_admin() {
            FuncId::new(req.vf)
        } else if !from_vf && req.vf != 0 {
            pf_sets_vf_mac = req.default_rule && req.features.contains(FlowField::Dmac);
            req.owner.with_func(req.vf)
        } else {
            req.owner
        };

        // Reject unsupported fields before touching any state.
        let unsupported = req.features.difference(self.profile.features(req.direction));
        if !unsupported.is_empty() {
            info!("unsupported flow field(s): {}", unsupported);
            return Err(ClassifierError::UnsupportedFields(unsupported));
        }

        let ep = self
            .endpoints
            .get(&target)
            .ok_or(ClassifierError::UnknownTarget(target))?;
        let mut ep_parent_cfg = ep.parent_cfg;
        let ep_mac = ep.mac;
        let ep_ready = ep.ready;
        let ep_default_entry = ep.default_entry;
        let default_rule_idx = ep.default_rule;

        if req.direction == Direction::Rx
            && !(ep.channel_base..ep.channel_base.saturating_add(ep.channel_count))
                .contains(&req.channel)
        {
            return Err(ClassifierError::InvalidChannel {
                target,
                channel: req.channel,
            });
        }

        // A PF configuring its VF marks the endpoint.
        if !req.owner.is_admin() && !from_vf && req.vf != 0 {
            if let Some(ep) = self.endpoints.get_mut(&target) {
                ep.parent_cfg = true;
                ep_parent_cfg = true;
            }
        }

        // An all-zero DMAC in an ingress request means "the endpoint's own
        // address".
        let mut packet = req.packet;
        let mut mask = req.mask;
        if req.features.contains(FlowField::Dmac)
            && req.direction == Direction::Rx
            && packet.dmac.is_zero()
        {
            packet.dmac = ep_mac;
            mask.dmac = MacAddress::BROADCAST;
        }

        // Rules for an uninitialized endpoint are installed disabled; a
        // packet reaching the egress classifier implies the source
        // function is up, so egress rules always enable.
        let mut enable = true;
        if !ep_ready || (!req.default_rule && default_rule_idx.is_none()) {
            enable = false;
        }
        if req.direction == Direction::Tx {
            enable = true;
        }
        if from_vf && !enable {
            return Err(ClassifierError::TargetNotReady(target));
        }

        let def_rule = default_rule_idx.and_then(|idx| self.db.find(idx)).cloned();

        // A dependent function's flow must not collide with the reserved
        // unicast flow.
        if from_vf && req.direction == Direction::Rx {
            if let Some(def) = &def_rule {
                if def.features.intersects(req.features) {
                    return Err(ClassifierError::OverlapsDefaultRule(target));
                }
            }
        }

        let entry_index = if req.default_rule {
            ep_default_entry
        } else {
            req.entry.ok_or(ClassifierError::EntryIndexRequired)?
        };

        // ---- Compile the ternary entry ----

        let map = self.profile.map(req.direction);
        let mut entry = McamEntry::default();
        let mut installed_packet = FlowSpec::default();
        let mut installed_mask = FlowSpec::default();
        let mut installed_features = req.features;

        build_match(map, &mut entry, req.features, &packet, &mask);
        installed_packet.copy_fields(&packet, req.features);
        installed_mask.copy_fields(&mask, req.features);

        let action = match req.action {
            FlowAction::Ingress {
                op,
                index,
                match_id,
                flow_key_alg,
                vtag,
            } => {
                set_field(map, FlowField::Chan, &mut entry, req.channel as u64, 0, !0, 0);
                let mut rx = RxAction {
                    op,
                    pf_func: target.raw(),
                    index,
                    match_id,
                    flow_key_alg,
                };
                if op == RxOpcode::Default {
                    if let Some(def_rx) = def_rule.as_ref().and_then(|def| def.action.as_rx()) {
                        rx = *def_rx;
                    }
                }
                entry.action = rx.encode();
                entry.vtag_action = vtag.encode();
                RuleAction::Rx(rx)
            }
            FlowAction::Egress {
                op,
                index,
                match_id,
                vtag,
            } => {
                // The inline header carries the function id byte-swapped.
                set_field(
                    map,
                    FlowField::PfFunc,
                    &mut entry,
                    target.raw().swap_bytes() as u64,
                    0,
                    !0,
                    0,
                );
                let tx = TxAction {
                    op,
                    index,
                    match_id,
                };
                entry.action = tx.encode();
                entry.vtag_action = vtag.encode();
                RuleAction::Tx(tx)
            }
        };

        // ---- Additive default-rule inheritance (ingress only) ----

        let merge = if req.default_rule {
            req.append
        } else {
            from_vf || req.append
        };
        if req.direction == Direction::Rx && merge {
            if let Some(def) = &def_rule {
                let missing = def.features.difference(req.features);
                if !missing.is_empty() {
                    build_match(map, &mut entry, missing, &def.packet, &def.mask);
                    installed_packet.copy_fields(&def.packet, missing);
                    installed_mask.copy_fields(&def.mask, missing);
                    installed_features = req.features.union(missing);
                }
            }
        }

        // ---- Counter lifecycle ----

        let existing = self.db.find(entry_index).cloned();
        let mut counter = existing.as_ref().and_then(|rule| rule.counter);
        let mut outcome = CounterOutcome::NotRequested;
        let mut newly_allocated = None;

        // Default unicast rules carry no counter.
        if !req.default_rule && req.set_counter {
            if counter.is_none() {
                // Counters are scarcer than entries: allocation failure is
                // reported, not fatal.
                match self.backend.alloc_counter(req.owner) {
                    Ok(handle) => {
                        counter = Some(handle);
                        newly_allocated = Some(handle);
                    }
                    Err(err) => {
                        self.stats.counter_exhaustions += 1;
                        warn!("counter allocation for entry {} failed: {}", entry_index, err);
                        outcome = CounterOutcome::AllocFailed(err);
                    }
                }
            }
            if let Some(handle) = counter {
                if let Err(err) = self.backend.reset_counter(handle) {
                    warn!("resetting {} failed: {}", handle, err);
                }
                outcome = CounterOutcome::Bound(handle);
            }
        }

        // ---- Write through ----

        let bind = if req.set_counter { counter } else { None };
        if let Err(err) = self
            .backend
            .write_entry(entry_index, req.direction, &entry, enable, bind)
        {
            self.stats.hw_errors += 1;
            // Roll back a counter allocated by this operation; the
            // database is left unmodified.
            if let Some(handle) = newly_allocated {
                if let Err(free_err) = self.backend.free_counter(req.owner, handle) {
                    warn!("rollback of {} failed: {}", handle, free_err);
                }
            }
            return Err(err.into());
        }

        // The write succeeded; release a binding that is no longer wanted.
        if !req.default_rule && !req.set_counter {
            if let Some(handle) = counter.take() {
                if let Err(err) = self.backend.free_counter(req.owner, handle) {
                    warn!("releasing {} failed: {}", handle, err);
                }
            }
        }

        // ---- Record the rule ----

        let mut rule = existing.unwrap_or_else(|| {
            FlowRule::new(entry_index, req.direction, req.owner, action)
        });
        rule.entry = entry_index;
        rule.direction = req.direction;
        rule.owner = req.owner;
        rule.packet = installed_packet;
        rule.mask = installed_mask;
        rule.features = installed_features;
        rule.action = action;
        rule.vtag_action = entry.vtag_action;
        rule.enabled = enable;
        rule.is_default = req.default_rule;
        if !req.default_rule {
            rule.counter = counter;
        }
        if let FlowAction::Ingress { vtag, .. } = req.action {
            if ep_parent_cfg && vtag.vtag0_type == RX_VTAG_TYPE7 {
                rule.vf_vlan_cfg = true;
            }
        }
        self.db.insert(rule);

        if req.default_rule {
            if let Some(ep) = self.endpoints.get_mut(&target) {
                ep.default_rule = Some(entry_index);
            }
        }
        // A VF's MAC address being set via its PF.
        if pf_sets_vf_mac {
            if let Some(ep) = self.endpoints.get_mut(&target) {
                ep.mac = packet.dmac;
            }
        }

        self.stats.installs += 1;
        debug!(
            "installed {} entry {} for {} (features [{}]{})",
            req.direction,
            entry_index,
            target,
            installed_features,
            if enable { "" } else { ", disabled" },
        );

        Ok(InstallResponse {
            entry: entry_index,
            counter: outcome,
        })
    }

    // ============ Delete ============

    /// Deletes the owner's rules in the given scope. Default rules are
    /// never deleted here; deleting one directly is a visible no-op.
    pub fn delete_flow(&mut self, owner: FuncId, scope: DeleteScope) -> Result<()> {
        match scope {
            DeleteScope::Entry(entry) => self.delete_one(owner, entry),
            DeleteScope::Range { start, end } => {
                let targets = self
                    .db
                    .snapshot_indices(|r| r.owner == owner && r.entry >= start && r.entry <= end);
                for entry in targets {
                    self.delete_one(owner, entry)?;
                }
                Ok(())
            }
            DeleteScope::All => {
                let targets = self.db.snapshot_indices(|r| r.owner == owner);
                for entry in targets {
                    self.delete_one(owner, entry)?;
                }
                Ok(())
            }
        }
    }

    fn delete_one(&mut self, owner: FuncId, entry: EntryIndex) -> Result<()> {
        let rule = self
            .db
            .find(entry)
            .ok_or(ClassifierError::RuleNotFound(entry))?;

        // Default rules are lifecycle-managed with the endpoint.
        if rule.is_default {
            return Ok(());
        }

        if let Some(handle) = rule.counter {
            if let Err(err) = self.backend.free_counter(owner, handle) {
                warn!("releasing {} for entry {} failed: {}", handle, entry, err);
            }
            if let Some(rule) = self.db.find_mut(entry) {
                rule.counter = None;
            }
        }

        if let Err(err) = self.backend.enable_entry(entry, false) {
            self.stats.hw_errors += 1;
            return Err(err.into());
        }

        self.db.remove(entry);
        self.stats.deletes += 1;
        debug!("deleted entry {} for {}", entry, owner);
        Ok(())
    }

    // ============ Bulk enable ============

    /// Enables every disabled ingress rule targeting `target`, refreshing
    /// stale default actions and endpoint-assigned MAC matches first.
    ///
    /// Invoked when a previously uninitialized endpoint becomes ready.
    /// Per-rule device failures are logged and skipped; the remaining
    /// rules still get their chance.
    pub fn enable_flows(&mut self, target: FuncId) {
        let (ep_mac, ep_default_rule) = match self.endpoints.get(&target) {
            Some(ep) => (ep.mac, ep.default_rule),
            None => {
                warn!("enable_flows: unknown endpoint {}", target);
                return;
            }
        };
        let def_action = ep_default_rule
            .and_then(|idx| self.db.find(idx))
            .map(|rule| rule.action);

        let pending = self.db.snapshot_indices(|rule| {
            rule.direction == Direction::Rx
                && !rule.enabled
                && rule
                    .action
                    .as_rx()
                    .map(|rx| rx.pf_func == target.raw())
                    .unwrap_or(false)
        });

        for entry_index in pending {
            let (is_default, vf_vlan, wants_default_action) = match self.db.find(entry_index) {
                Some(rule) => (
                    rule.is_default,
                    rule.vf_vlan_cfg,
                    matches!(rule.action.as_rx(), Some(rx) if rx.op == RxOpcode::Default),
                ),
                None => continue,
            };

            if is_default {
                self.enable_one(entry_index);
                continue;
            }

            // The endpoint's address may have been (re)assigned while the
            // rule sat disabled.
            if vf_vlan {
                if let Err(err) = self.refresh_dmac(entry_index, ep_mac) {
                    warn!("refreshing dmac on entry {} failed: {}", entry_index, err);
                }
            }

            // The default action may have changed since the rule was
            // installed.
            if wants_default_action {
                let def_action = match def_action {
                    Some(action) => action,
                    // no default rule yet; leave the rule disabled
                    None => continue,
                };
                if let Err(err) = self.refresh_action(entry_index, def_action) {
                    warn!("refreshing action on entry {} failed: {}", entry_index, err);
                    continue;
                }
            }

            self.enable_one(entry_index);
        }
    }

    fn enable_one(&mut self, entry: EntryIndex) {
        match self.backend.enable_entry(entry, true) {
            Ok(()) => {
                if let Some(rule) = self.db.find_mut(entry) {
                    rule.enabled = true;
                }
                self.stats.bulk_enables += 1;
            }
            Err(err) => warn!("enabling entry {} failed: {}", entry, err),
        }
    }

    /// Rewrites a rule's DMAC match with the endpoint's current address.
    fn refresh_dmac(&mut self, entry_index: EntryIndex, mac: MacAddress) -> Result<()> {
        let (mut entry, dir, enabled) = self.backend.read_entry(entry_index)?;
        let map = self.profile.map(dir);
        set_field(
            map,
            FlowField::Dmac,
            &mut entry,
            mac.to_u64(),
            0,
            0xffff_ffff_ffff,
            0,
        );
        self.backend.write_entry(entry_index, dir, &entry, enabled, None)?;
        if let Some(rule) = self.db.find_mut(entry_index) {
            rule.packet.dmac = mac;
        }
        Ok(())
    }

    /// Rewrites a rule's action register in place.
    fn refresh_action(&mut self, entry_index: EntryIndex, action: RuleAction) -> Result<()> {
        let (mut entry, dir, enabled) = self.backend.read_entry(entry_index)?;
        entry.action = action.encode();
        self.backend.write_entry(entry_index, dir, &entry, enabled, None)?;
        if let Some(rule) = self.db.find_mut(entry_index) {
            rule.action = action;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowsteer_hw::{MockMcam, RxVtagAction};
    use pretty_assertions::assert_eq;

    use crate::kex::{layer, ltype};

    const PF1: FuncId = FuncId::new(0x400);
    const PF1_VF0: FuncId = FuncId::new(0x401);
    const CHAN: u16 = 0x800;

    /// A representative ingress profile: channel + layer-type nibbles,
    /// MAC/ethertype/VLAN/IP/port extractions, and an egress function
    /// selector.
    fn standard_mock(num_counters: u16) -> MockMcam {
        let mock = MockMcam::new(256, num_counters);

        // Channel (3 nibbles), VLAN type, transport type.
        mock.set_parse_nibbles(Direction::Rx, 0x7 | 1 << 12 | 1 << 18);

        let rx = Direction::Rx;
        mock.set_extract(rx, layer::LA, ltype::LA_ETHER, 0, 0, 3, 12);
        mock.set_extract(rx, layer::LA, ltype::LA_ETHER, 1, 12, 15, 2);
        mock.set_extract(rx, layer::LB, ltype::LB_CTAG, 0, 2, 17, 2);
        mock.set_extract(rx, layer::LB, ltype::LB_CTAG, 1, 4, 15, 2);
        mock.set_extract(rx, layer::LC, ltype::LC_IP, 0, 12, 19, 8);
        mock.set_extract(rx, layer::LD, ltype::LD_TCP, 0, 0, 27, 4);
        mock.set_extract(rx, layer::LD, ltype::LD_UDP, 0, 0, 27, 4);

        mock.set_extract(Direction::Tx, layer::LA, ltype::LA_IH_NIX_ETHER, 0, 0, 0, 2);
        mock
    }

    fn classifier(mock: Arc<MockMcam>) -> Classifier {
        let mut classifier =
            Classifier::init(mock, ClassifierConfig::default()).expect("viable profile");
        classifier.register_endpoint(EndpointConfig {
            func: PF1,
            mac: MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x01, 0x00]),
            channel_base: CHAN,
            channel_count: 16,
            default_entry: 0,
            ready: true,
        });
        classifier
    }

    fn install_default_rule(classifier: &mut Classifier) {
        let req = InstallRequest::new(PF1, FlowAction::ingress_ucast(1))
            .with_match(
                FieldSet::of(&[FlowField::Dmac]),
                FlowSpec::default(),
                FlowSpec {
                    dmac: MacAddress::BROADCAST,
                    ..FlowSpec::default()
                },
            )
            .with_channel(CHAN)
            .as_default_rule(false);
        classifier.install_flow(req).expect("default install");
    }

    #[test]
    fn test_supported_features_of_standard_profile() {
        let classifier = classifier(Arc::new(standard_mock(4)));
        let features = classifier.features(Direction::Rx);

        for field in [
            FlowField::Dmac,
            FlowField::Smac,
            FlowField::Etype,
            FlowField::OuterVid,
            FlowField::SipV4,
            FlowField::DipV4,
            FlowField::SportTcp,
            FlowField::DportUdp,
        ] {
            assert!(features.contains(field), "missing {}", field);
        }
        assert!(!features.contains(FlowField::Tos));
        assert!(!features.contains(FlowField::SipV6));
    }

    #[test]
    fn test_action_direction_mismatch_rejected() {
        let mut classifier = classifier(Arc::new(standard_mock(4)));
        let mut req = InstallRequest::new(PF1, FlowAction::egress_default()).with_entry(10);
        req.direction = Direction::Rx;

        assert_eq!(
            classifier.install_flow(req),
            Err(ClassifierError::ActionMismatch)
        );
    }

    #[test]
    fn test_unsupported_feature_rejected_before_any_mutation() {
        let mock = Arc::new(standard_mock(4));
        let mut classifier = classifier(mock.clone());
        install_default_rule(&mut classifier);

        let req = InstallRequest::new(PF1, FlowAction::ingress_drop())
            .with_entry(10)
            .with_match(
                FieldSet::of(&[FlowField::SipV6]),
                FlowSpec::default(),
                FlowSpec::default(),
            )
            .with_channel(CHAN);
        assert_eq!(
            classifier.install_flow(req),
            Err(ClassifierError::UnsupportedFields(FieldSet::of(&[
                FlowField::SipV6
            ])))
        );
        assert!(classifier.find_rule(10).is_none());
        assert!(mock.entry(10).is_none());
    }

    #[test]
    fn test_unknown_target_rejected() {
        let mut classifier = classifier(Arc::new(standard_mock(4)));
        let req = InstallRequest::new(FuncId::new(0x800), FlowAction::ingress_drop())
            .with_entry(10)
            .with_channel(CHAN);
        assert_eq!(
            classifier.install_flow(req),
            Err(ClassifierError::UnknownTarget(FuncId::new(0x800)))
        );
    }

    #[test]
    fn test_invalid_channel_rejected() {
        let mut classifier = classifier(Arc::new(standard_mock(4)));
        install_default_rule(&mut classifier);

        let req = InstallRequest::new(PF1, FlowAction::ingress_drop())
            .with_entry(10)
            .with_channel(CHAN + 16);
        assert_eq!(
            classifier.install_flow(req),
            Err(ClassifierError::InvalidChannel {
                target: PF1,
                channel: CHAN + 16
            })
        );
    }

    #[test]
    fn test_entry_index_required_for_non_default() {
        let mut classifier = classifier(Arc::new(standard_mock(4)));
        install_default_rule(&mut classifier);

        let req = InstallRequest::new(PF1, FlowAction::ingress_drop()).with_channel(CHAN);
        assert_eq!(
            classifier.install_flow(req),
            Err(ClassifierError::EntryIndexRequired)
        );
    }

    #[test]
    fn test_vf_may_not_install_default_rule() {
        let mut classifier = classifier(Arc::new(standard_mock(4)));
        let req = InstallRequest::new(PF1_VF0, FlowAction::ingress_drop())
            .with_channel(CHAN)
            .as_default_rule(false);
        assert_eq!(
            classifier.install_flow(req),
            Err(ClassifierError::PermissionDenied)
        );
    }

    #[test]
    fn test_vf_rejected_when_rule_would_be_disabled() {
        let mut classifier = classifier(Arc::new(standard_mock(4)));
        classifier.register_endpoint(EndpointConfig {
            func: PF1_VF0,
            mac: MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x01, 0x01]),
            channel_base: CHAN,
            channel_count: 1,
            default_entry: 1,
            ready: false,
        });

        let req = InstallRequest::new(PF1_VF0, FlowAction::ingress_drop())
            .with_entry(10)
            .with_channel(CHAN);
        assert_eq!(
            classifier.install_flow(req),
            Err(ClassifierError::TargetNotReady(PF1_VF0))
        );
    }

    #[test]
    fn test_vf_overlap_with_default_rule_rejected() {
        let mock = Arc::new(standard_mock(4));
        let mut classifier = classifier(mock);
        classifier.register_endpoint(EndpointConfig {
            func: PF1_VF0,
            mac: MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x01, 0x01]),
            channel_base: CHAN,
            channel_count: 1,
            default_entry: 1,
            ready: true,
        });
        // Admin installs the VF's default rule matching on DMAC.
        let req = InstallRequest::new(FuncId::ADMIN, FlowAction::ingress_ucast(1))
            .for_vf(PF1_VF0.raw())
            .with_match(
                FieldSet::of(&[FlowField::Dmac]),
                FlowSpec::default(),
                FlowSpec::default(),
            )
            .with_channel(CHAN)
            .as_default_rule(false);
        classifier.install_flow(req).unwrap();

        let req = InstallRequest::new(PF1_VF0, FlowAction::ingress_drop())
            .with_entry(10)
            .with_match(
                FieldSet::of(&[FlowField::Dmac, FlowField::SipV4]),
                FlowSpec::default(),
                FlowSpec::default(),
            )
            .with_channel(CHAN);
        assert_eq!(
            classifier.install_flow(req),
            Err(ClassifierError::OverlapsDefaultRule(PF1_VF0))
        );
    }

    #[test]
    fn test_write_failure_rolls_back_counter_and_database() {
        let mock = Arc::new(standard_mock(4));
        let mut classifier = classifier(mock.clone());
        install_default_rule(&mut classifier);

        mock.fail_writes(1);
        let req = InstallRequest::new(PF1, FlowAction::ingress_ucast(2))
            .with_entry(10)
            .with_channel(CHAN)
            .with_counter();
        let result = classifier.install_flow(req);

        assert!(matches!(result, Err(ClassifierError::Hw(_))));
        assert!(classifier.find_rule(10).is_none());
        // The counter allocated for this install was released.
        assert_eq!(mock.counters_in_use(), 0);
        assert_eq!(classifier.stats().hw_errors, 1);
    }

    #[test]
    fn test_reinstall_without_counter_releases_binding() {
        let mock = Arc::new(standard_mock(4));
        let mut classifier = classifier(mock.clone());
        install_default_rule(&mut classifier);

        let req = InstallRequest::new(PF1, FlowAction::ingress_ucast(2))
            .with_entry(10)
            .with_channel(CHAN)
            .with_counter();
        let rsp = classifier.install_flow(req.clone()).unwrap();
        assert!(matches!(rsp.counter, CounterOutcome::Bound(_)));
        assert_eq!(mock.counters_in_use(), 1);

        // Reinstall the same entry without a counter.
        let mut req = req;
        req.set_counter = false;
        let rsp = classifier.install_flow(req).unwrap();
        assert_eq!(rsp.counter, CounterOutcome::NotRequested);
        assert_eq!(mock.counters_in_use(), 0);
        assert!(!classifier.find_rule(10).unwrap().has_counter());
    }

    #[test]
    fn test_reinstall_keeps_existing_counter() {
        let mock = Arc::new(standard_mock(4));
        let mut classifier = classifier(mock.clone());
        install_default_rule(&mut classifier);

        let req = InstallRequest::new(PF1, FlowAction::ingress_ucast(2))
            .with_entry(10)
            .with_channel(CHAN)
            .with_counter();
        let first = classifier.install_flow(req.clone()).unwrap();
        let second = classifier.install_flow(req).unwrap();

        assert_eq!(first.counter, second.counter);
        assert_eq!(mock.counters_in_use(), 1);
    }

    #[test]
    fn test_default_rule_resolves_reserved_entry() {
        let mock = Arc::new(standard_mock(4));
        let mut classifier = classifier(mock.clone());
        install_default_rule(&mut classifier);

        let rule = classifier.find_rule(0).expect("default rule at entry 0");
        assert!(rule.is_default);
        assert!(rule.enabled);
        assert!(mock.entry(0).is_some());
    }

    #[test]
    fn test_default_action_inherited_for_use_default_op() {
        let mut classifier = classifier(Arc::new(standard_mock(4)));
        install_default_rule(&mut classifier);

        let req = InstallRequest::new(PF1, FlowAction::ingress_default())
            .with_entry(10)
            .with_channel(CHAN);
        classifier.install_flow(req).unwrap();

        let rule = classifier.find_rule(10).unwrap();
        let rx = rule.action.as_rx().unwrap();
        // The recorded action is the default rule's, not the sentinel.
        assert_eq!(rx.op, RxOpcode::Ucast);
        assert_eq!(rx.index, 1);
    }

    #[test]
    fn test_dmac_autofill_uses_endpoint_address() {
        let mut classifier = classifier(Arc::new(standard_mock(4)));
        install_default_rule(&mut classifier);

        let req = InstallRequest::new(PF1, FlowAction::ingress_drop())
            .with_entry(10)
            .with_match(
                FieldSet::of(&[FlowField::Dmac]),
                FlowSpec::default(),
                FlowSpec::default(),
            )
            .with_channel(CHAN);
        classifier.install_flow(req).unwrap();

        let rule = classifier.find_rule(10).unwrap();
        assert_eq!(rule.packet.dmac, classifier.endpoint_mac(PF1).unwrap());
        assert_eq!(rule.mask.dmac, MacAddress::BROADCAST);
    }

    #[test]
    fn test_vf_vlan_cfg_flag_set_for_parent_applied_vtag() {
        let mut classifier = classifier(Arc::new(standard_mock(4)));
        classifier.register_endpoint(EndpointConfig {
            func: PF1_VF0,
            mac: MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x01, 0x01]),
            channel_base: CHAN,
            channel_count: 1,
            default_entry: 1,
            ready: true,
        });

        // PF installs the VF's default rule with the reserved vtag type.
        let req = InstallRequest {
            action: FlowAction::Ingress {
                op: RxOpcode::Ucast,
                index: 1,
                match_id: 0,
                flow_key_alg: 0,
                vtag: RxVtagAction {
                    vtag0_valid: true,
                    vtag0_type: RX_VTAG_TYPE7,
                    ..RxVtagAction::default()
                },
            },
            ..InstallRequest::new(PF1, FlowAction::ingress_drop())
        }
        .for_vf(PF1_VF0.raw())
        .with_entry(20)
        .with_channel(CHAN);
        classifier.install_flow(req).unwrap();

        assert!(classifier.find_rule(20).unwrap().vf_vlan_cfg);
    }

    #[test]
    fn test_egress_install_packs_target_function() {
        let mock = Arc::new(standard_mock(4));
        let mut classifier = classifier(mock.clone());

        let req = InstallRequest::new(PF1, FlowAction::egress_default()).with_entry(30);
        classifier.install_flow(req).unwrap();

        let slot = mock.entry(30).unwrap();
        assert_eq!(slot.dir, Direction::Tx);
        assert!(slot.enabled, "egress rules always enable");
        // Function id is packed byte-swapped into key bits 0..16.
        assert_eq!(slot.entry.kw[0] & 0xffff, PF1.raw().swap_bytes() as u64);
        assert_eq!(slot.entry.kw_mask[0] & 0xffff, 0xffff);
    }
}
