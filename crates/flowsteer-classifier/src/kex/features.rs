//! Overlap detection and supported-feature derivation.
//!
//! Key size is limited, so the extraction profile can make higher decode
//! layers overwrite the key bits of lower ones. A field is only usable for
//! matching if nothing else in the profile can clobber its bits; fields at
//! the same layer with different layer types are mutually exclusive on the
//! wire (a packet decodes to exactly one type per layer) and may share
//! bits freely.

use flowsteer_hw::Direction;
use log::debug;

use super::field::{layer, FieldSet, FlowField};
use super::scan::{
    set_word_masks, KeyField, LayerMdata, ProfileSnapshot, MAX_EXTRACTORS, MAX_LAYER_TYPES,
};

/// True if the two fields' key bits collide.
///
/// Same layer id with different layer types never collides: the packet
/// carries only one of them.
pub(crate) fn check_overlap_fields(a: &KeyField, b: &KeyField) -> bool {
    if a.mdata.lid == b.mdata.lid && a.mdata.ltype != b.mdata.ltype {
        return false;
    }
    a.kw_mask
        .iter()
        .zip(b.kw_mask.iter())
        .any(|(x, y)| x & y != 0)
}

/// True if any profile-enabled extraction at layer `start_lid` or above
/// can overwrite `field`'s key bits.
///
/// Each enabled extraction entry is materialized as its own scratch field
/// and compared pairwise against the input; the entry the input itself was
/// derived from is excluded by metadata identity.
pub(crate) fn check_overlap(
    snapshot: &ProfileSnapshot,
    fields: &[KeyField; FlowField::COUNT],
    field: FlowField,
    start_lid: u8,
    max_word: usize,
) -> bool {
    let input = &fields[field.index()];

    for lid in start_lid..layer::COUNT {
        for lt in 0..MAX_LAYER_TYPES {
            for ld in 0..MAX_EXTRACTORS {
                let cfg = snapshot.get(lid, lt, ld);
                if !cfg.enabled {
                    continue;
                }

                let mut scratch = KeyField {
                    mdata: LayerMdata {
                        lid,
                        ltype: lt,
                        hdr: cfg.hdr_offset,
                        key: cfg.key_offset,
                        len: cfg.byte_len,
                    },
                    ..KeyField::default()
                };
                // exclude the entry the input was derived from
                if scratch.mdata == input.mdata {
                    continue;
                }

                set_word_masks(
                    &mut scratch,
                    cfg.byte_len as u16 * 8,
                    cfg.key_offset as usize / 8,
                    (cfg.key_offset as u32 * 8) % 64,
                    max_word,
                );

                if check_overlap_fields(&scratch, input) {
                    return true;
                }
            }
        }
    }

    false
}

/// True if the field is present in the key and no other extraction can
/// overwrite it.
pub(crate) fn check_field(
    snapshot: &ProfileSnapshot,
    fields: &[KeyField; FlowField::COUNT],
    field: FlowField,
    max_word: usize,
) -> bool {
    fields[field.index()].is_present() && !check_overlap(snapshot, fields, field, 0, max_word)
}

/// Derives the supported-feature bitset over the header fields.
pub(crate) fn set_features(
    snapshot: &ProfileSnapshot,
    fields: &[KeyField; FlowField::COUNT],
    dir: Direction,
    max_word: usize,
) -> FieldSet {
    let mut features = FieldSet::empty();

    for field in FlowField::HEADER_FIELDS {
        if check_field(snapshot, fields, field, max_word) {
            features.insert(field);
        }
    }

    // Port matches are meaningless unless the transport layer-type nibble
    // is usable to disambiguate TCP from UDP.
    let tcp_udp = FieldSet::of(&[
        FlowField::SportTcp,
        FlowField::DportTcp,
        FlowField::SportUdp,
        FlowField::DportUdp,
    ]);
    if features.intersects(tcp_udp) && !check_field(snapshot, fields, FlowField::Ld, max_word) {
        features = features.difference(tcp_udp);
        debug!("{}: transport type not usable, stripping port matches", dir);
    }

    features
}

/// Unifies per-layer variants into `composite` when their key positions
/// agree. Returns true if the composite was adopted.
///
/// A field matchable from several mutually exclusive tagging variants is
/// only usable as one feature when every present variant lands on the
/// same key bits; otherwise one flow would need several MCAM entries,
/// which complicates entry space management.
fn unify_variants(
    fields: &mut [KeyField; FlowField::COUNT],
    variants: &[FlowField],
    composite: FlowField,
) -> bool {
    let present: Vec<FlowField> = variants
        .iter()
        .copied()
        .filter(|v| fields[v.index()].is_present())
        .collect();

    let (first, rest) = match present.split_first() {
        Some(split) => split,
        None => return false,
    };

    for variant in rest {
        let a = fields[first.index()];
        let b = fields[variant.index()];
        if !a.masks_equal(&b) {
            return false;
        }
    }

    // Adopt the highest present variant, matching the deepest tag depth.
    let winner = present[present.len() - 1];
    fields[composite.index()] = fields[winner.index()];
    true
}

/// Resolves the composite ethertype and outer VLAN TCI fields.
///
/// After adopting a variant the overlap check reruns from one layer above
/// the winner: the variant's own layer peers are mutually exclusive with
/// it, but anything higher can still overwrite the shared position.
pub(crate) fn handle_multi_layer_fields(
    snapshot: &ProfileSnapshot,
    fields: &mut [KeyField; FlowField::COUNT],
    features: &mut FieldSet,
    max_word: usize,
) {
    // Ether type can come from three layers (untagged, single tagged,
    // double tagged).
    if unify_variants(
        fields,
        &[
            FlowField::EtypeEther,
            FlowField::EtypeTag1,
            FlowField::EtypeTag2,
        ],
        FlowField::Etype,
    ) {
        let start_lid = fields[FlowField::Etype.index()].mdata.lid + 1;
        if !check_overlap(snapshot, fields, FlowField::Etype, start_lid, max_word) {
            features.insert(FlowField::Etype);
        }
    }

    // Outer VLAN TCI can come from two layers (single and double tagged).
    if unify_variants(
        fields,
        &[FlowField::VlanTag1, FlowField::VlanTag2],
        FlowField::OuterVid,
    ) {
        let start_lid = fields[FlowField::OuterVid.index()].mdata.lid + 1;
        if !check_overlap(snapshot, fields, FlowField::OuterVid, start_lid, max_word) {
            features.insert(FlowField::OuterVid);
        }
    }
}

/// Strips the outer VLAN feature when the VLAN layer-type nibble is not
/// usable: without the type discriminator a TCI match cannot tell tagged
/// from untagged traffic.
pub(crate) fn apply_vlan_gate(
    snapshot: &ProfileSnapshot,
    fields: &[KeyField; FlowField::COUNT],
    features: &mut FieldSet,
    dir: Direction,
    max_word: usize,
) {
    if features.contains(FlowField::OuterVid)
        && !check_field(snapshot, fields, FlowField::Lb, max_word)
    {
        features.remove(FlowField::OuterVid);
        debug!("{}: vlan layer type not usable, stripping outer vlan match", dir);
    }
}

#[cfg(test)]
mod tests {
    use super::super::scan::scan_kex;
    use super::*;
    use flowsteer_hw::{ExtractCfg, KeySize};
    use pretty_assertions::assert_eq;

    const MAX_WORD: usize = KeySize::X2.max_word_index();

    fn extract(hdr_offset: u8, key_offset: u8, byte_len: u8) -> ExtractCfg {
        ExtractCfg {
            enabled: true,
            hdr_offset,
            key_offset,
            byte_len,
        }
    }

    use super::super::field::ltype;

    #[test]
    fn test_same_layer_different_type_may_share_bits() {
        let mut snapshot = ProfileSnapshot::empty();
        // TCP and UDP ports extracted to the same key bytes.
        snapshot.set(layer::LD, ltype::LD_TCP, 0, extract(0, 8, 4));
        snapshot.set(layer::LD, ltype::LD_UDP, 0, extract(0, 8, 4));

        let fields = scan_kex(&snapshot, Direction::Rx, MAX_WORD);
        let tcp = &fields[FlowField::SportTcp.index()];
        let udp = &fields[FlowField::SportUdp.index()];
        assert_eq!(tcp.kw_mask, udp.kw_mask);

        assert!(!check_overlap(
            &snapshot,
            &fields,
            FlowField::SportTcp,
            0,
            MAX_WORD
        ));
        assert!(!check_overlap(
            &snapshot,
            &fields,
            FlowField::SportUdp,
            0,
            MAX_WORD
        ));
    }

    #[test]
    fn test_higher_layer_overwrite_disqualifies() {
        let mut snapshot = ProfileSnapshot::empty();
        // Ethernet header bytes at key bytes 0..14, and an IP extraction
        // clobbering key bytes 8..16.
        snapshot.set(layer::LA, ltype::LA_ETHER, 0, extract(0, 0, 14));
        snapshot.set(layer::LC, ltype::LC_IP, 0, extract(12, 8, 8));

        let fields = scan_kex(&snapshot, Direction::Rx, MAX_WORD);
        assert!(fields[FlowField::Dmac.index()].is_present());

        // The MAC bytes sit in the overwritten range.
        assert!(check_overlap(
            &snapshot,
            &fields,
            FlowField::Dmac,
            0,
            MAX_WORD
        ));
        let features = set_features(&snapshot, &fields, Direction::Rx, MAX_WORD);
        assert!(!features.contains(FlowField::Dmac));
        // The ethertype lands in key bytes 0..2, below the clobbered range.
        assert!(fields[FlowField::EtypeEther.index()].is_present());
        assert!(!check_overlap(
            &snapshot,
            &fields,
            FlowField::EtypeEther,
            0,
            MAX_WORD
        ));
    }

    #[test]
    fn test_ports_stripped_without_transport_type_nibble() {
        let mut snapshot = ProfileSnapshot::empty();
        snapshot.set(layer::LD, ltype::LD_TCP, 0, extract(0, 8, 4));

        let fields = scan_kex(&snapshot, Direction::Rx, MAX_WORD);
        let features = set_features(&snapshot, &fields, Direction::Rx, MAX_WORD);
        assert!(!features.contains(FlowField::SportTcp));
        assert!(!features.contains(FlowField::DportTcp));

        // With the transport layer-type nibble enabled the ports survive.
        snapshot.set_nibble_mask(1 << 18);
        let fields = scan_kex(&snapshot, Direction::Rx, MAX_WORD);
        let features = set_features(&snapshot, &fields, Direction::Rx, MAX_WORD);
        assert!(features.contains(FlowField::SportTcp));
        assert!(features.contains(FlowField::DportTcp));
    }

    #[test]
    fn test_composite_etype_identical_positions() {
        let mut snapshot = ProfileSnapshot::empty();
        // Plain-ethernet ethertype (bytes 12..14) and single-tag ethertype
        // (bytes 4..6) extracted to the same key position.
        snapshot.set(layer::LA, ltype::LA_ETHER, 0, extract(12, 16, 2));
        snapshot.set(layer::LB, ltype::LB_CTAG, 0, extract(4, 16, 2));

        let mut fields = scan_kex(&snapshot, Direction::Rx, MAX_WORD);
        let mut features = set_features(&snapshot, &fields, Direction::Rx, MAX_WORD);
        assert!(!features.contains(FlowField::Etype));

        handle_multi_layer_fields(&snapshot, &mut fields, &mut features, MAX_WORD);
        assert!(features.contains(FlowField::Etype));
        // The composite adopts the deepest contributing variant.
        assert_eq!(
            fields[FlowField::Etype.index()].mdata.lid,
            layer::LB,
        );
    }

    #[test]
    fn test_composite_etype_mismatched_positions() {
        let mut snapshot = ProfileSnapshot::empty();
        snapshot.set(layer::LA, ltype::LA_ETHER, 0, extract(12, 16, 2));
        snapshot.set(layer::LB, ltype::LB_CTAG, 0, extract(4, 20, 2));

        let mut fields = scan_kex(&snapshot, Direction::Rx, MAX_WORD);
        let mut features = set_features(&snapshot, &fields, Direction::Rx, MAX_WORD);
        handle_multi_layer_fields(&snapshot, &mut fields, &mut features, MAX_WORD);

        assert!(!features.contains(FlowField::Etype));
        assert!(!fields[FlowField::Etype.index()].is_present());
    }

    #[test]
    fn test_composite_single_variant_adopted() {
        let mut snapshot = ProfileSnapshot::empty();
        snapshot.set(layer::LB, ltype::LB_CTAG, 0, extract(2, 16, 2));
        snapshot.set_nibble_mask(1 << 12); // VLAN layer-type nibble

        let mut fields = scan_kex(&snapshot, Direction::Rx, MAX_WORD);
        let mut features = set_features(&snapshot, &fields, Direction::Rx, MAX_WORD);
        handle_multi_layer_fields(&snapshot, &mut fields, &mut features, MAX_WORD);
        apply_vlan_gate(&snapshot, &fields, &mut features, Direction::Rx, MAX_WORD);

        assert!(features.contains(FlowField::OuterVid));
        assert_eq!(
            fields[FlowField::OuterVid.index()].kw_mask,
            fields[FlowField::VlanTag1.index()].kw_mask
        );
    }

    #[test]
    fn test_vlan_gate_strips_without_type_nibble() {
        let mut snapshot = ProfileSnapshot::empty();
        snapshot.set(layer::LB, ltype::LB_CTAG, 0, extract(2, 16, 2));

        let mut fields = scan_kex(&snapshot, Direction::Rx, MAX_WORD);
        let mut features = set_features(&snapshot, &fields, Direction::Rx, MAX_WORD);
        handle_multi_layer_fields(&snapshot, &mut fields, &mut features, MAX_WORD);
        assert!(features.contains(FlowField::OuterVid));

        apply_vlan_gate(&snapshot, &fields, &mut features, Direction::Rx, MAX_WORD);
        assert!(!features.contains(FlowField::OuterVid));
    }

    #[test]
    fn test_composite_overwritten_above_resolved_layer() {
        let mut snapshot = ProfileSnapshot::empty();
        // Both ethertype variants agree on key bytes 16..18, but an IP
        // extraction overwrites those bytes.
        snapshot.set(layer::LA, ltype::LA_ETHER, 0, extract(12, 16, 2));
        snapshot.set(layer::LB, ltype::LB_CTAG, 0, extract(4, 16, 2));
        snapshot.set(layer::LC, ltype::LC_IP, 0, extract(12, 14, 8));

        let mut fields = scan_kex(&snapshot, Direction::Rx, MAX_WORD);
        let mut features = set_features(&snapshot, &fields, Direction::Rx, MAX_WORD);
        handle_multi_layer_fields(&snapshot, &mut fields, &mut features, MAX_WORD);

        assert!(!features.contains(FlowField::Etype));
    }
}
