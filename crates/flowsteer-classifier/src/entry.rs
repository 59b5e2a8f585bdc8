//! Ternary entry compilation.
//!
//! Compiles natural-representation (value, care-mask) pairs into the bit
//! positions the scanned profile assigned to each field. Values wider than
//! 64 bits (the 128-bit address fields) are passed as a lo/hi word pair.

use flowsteer_hw::McamEntry;

use crate::kex::{ltype, FieldSet, FlowField, KeyMap};
use crate::flow::FlowSpec;

/// Packs one field's (value, mask) pair into `entry`.
///
/// The field's own bits are cleared from the entry's value and mask words
/// before merging, so repacking the same field is idempotent and never
/// disturbs other fields' bits. A field the profile did not place in the
/// key is silently skipped; callers gate on the supported-feature bitset
/// before trusting a match.
///
/// An exact match needs an all-ones mask; mask bits of 0 make the
/// corresponding value bits don't-care.
pub fn set_field(
    map: &KeyMap,
    field: FlowField,
    entry: &mut McamEntry,
    val_lo: u64,
    val_hi: u64,
    mask_lo: u64,
    mask_hi: u64,
) {
    let kf = &map.fields[field.index()];
    if !kf.is_present() {
        return;
    }

    let mut staged = McamEntry::default();

    for i in 0..kf.kw_mask.len() {
        if kf.kw_mask[i] == 0 {
            continue;
        }
        // Place the low value word at the field's first occupied word.
        let shift = kf.kw_mask[i].trailing_zeros();
        staged.kw[i] = (val_lo << shift) & kf.kw_mask[i];
        staged.kw_mask[i] = (mask_lo << shift) & kf.kw_mask[i];

        if kf.nr_words == 1 {
            break;
        }

        // Bits pushed out of the first word carry into the next, joined by
        // the high value word shifted into position.
        let carry = |lo: u64, hi: u64| {
            if shift == 0 {
                hi
            } else {
                (lo >> (64 - shift)) | (hi << shift)
            }
        };
        let spill = |hi: u64| if shift == 0 { 0 } else { hi >> (64 - shift) };

        if kf.nr_words == 2 {
            staged.kw[i + 1] = carry(val_lo, val_hi) & kf.kw_mask[i + 1];
            staged.kw_mask[i + 1] = carry(mask_lo, mask_hi) & kf.kw_mask[i + 1];
            break;
        }
        if kf.nr_words == 3 {
            staged.kw[i + 1] = carry(val_lo, val_hi) & kf.kw_mask[i + 1];
            staged.kw[i + 2] = spill(val_hi) & kf.kw_mask[i + 2];
            staged.kw_mask[i + 1] = carry(mask_lo, mask_hi) & kf.kw_mask[i + 1];
            staged.kw_mask[i + 2] = spill(mask_hi) & kf.kw_mask[i + 2];
            break;
        }
    }

    // Clear exactly this field's bits, then merge the staged words.
    for i in 0..kf.kw_mask.len() {
        if kf.kw_mask[i] == 0 {
            continue;
        }
        entry.kw[i] = (entry.kw[i] & !kf.kw_mask[i]) | staged.kw[i];
        entry.kw_mask[i] = (entry.kw_mask[i] & !kf.kw_mask[i]) | staged.kw_mask[i];
    }
}

/// Compiles the selected header fields of a flow specification into the
/// entry.
///
/// Port matches additionally pin the transport layer-type nibble to TCP or
/// UDP, and an outer VLAN match pins the VLAN layer-type nibble to the
/// tagged variants: the discriminator makes the ambiguous byte positions
/// meaningful.
pub fn build_match(
    map: &KeyMap,
    entry: &mut McamEntry,
    features: FieldSet,
    packet: &FlowSpec,
    mask: &FlowSpec,
) {
    if features.is_empty() {
        return;
    }

    if features.intersects(FieldSet::of(&[FlowField::SportTcp, FlowField::DportTcp])) {
        set_field(map, FlowField::Ld, entry, ltype::LD_TCP as u64, 0, !0, 0);
    }
    if features.intersects(FieldSet::of(&[FlowField::SportUdp, FlowField::DportUdp])) {
        set_field(map, FlowField::Ld, entry, ltype::LD_UDP as u64, 0, !0, 0);
    }
    if features.contains(FlowField::OuterVid) {
        // Match either tagged variant: care only about the type bits the
        // two values share.
        set_field(
            map,
            FlowField::Lb,
            entry,
            (ltype::LB_STAG_QINQ | ltype::LB_CTAG) as u64,
            0,
            (ltype::LB_STAG_QINQ & ltype::LB_CTAG) as u64,
            0,
        );
    }

    for field in features.iter() {
        match field {
            FlowField::Dmac => set_field(
                map,
                field,
                entry,
                packet.dmac.to_u64(),
                0,
                mask.dmac.to_u64(),
                0,
            ),
            FlowField::Smac => set_field(
                map,
                field,
                entry,
                packet.smac.to_u64(),
                0,
                mask.smac.to_u64(),
                0,
            ),
            FlowField::Etype => set_field(
                map,
                field,
                entry,
                packet.etype as u64,
                0,
                mask.etype as u64,
                0,
            ),
            FlowField::OuterVid => set_field(
                map,
                field,
                entry,
                packet.vlan_tci as u64,
                0,
                mask.vlan_tci as u64,
                0,
            ),
            FlowField::Tos => {
                set_field(map, field, entry, packet.tos as u64, 0, mask.tos as u64, 0)
            }
            FlowField::SipV4 => set_field(
                map,
                field,
                entry,
                packet.ip4_src.to_u32() as u64,
                0,
                mask.ip4_src.to_u32() as u64,
                0,
            ),
            FlowField::DipV4 => set_field(
                map,
                field,
                entry,
                packet.ip4_dst.to_u32() as u64,
                0,
                mask.ip4_dst.to_u32() as u64,
                0,
            ),
            FlowField::SipV6 => {
                let val = packet.ip6_src.to_u128();
                let msk = mask.ip6_src.to_u128();
                set_field(
                    map,
                    field,
                    entry,
                    val as u64,
                    (val >> 64) as u64,
                    msk as u64,
                    (msk >> 64) as u64,
                );
            }
            FlowField::DipV6 => {
                let val = packet.ip6_dst.to_u128();
                let msk = mask.ip6_dst.to_u128();
                set_field(
                    map,
                    field,
                    entry,
                    val as u64,
                    (val >> 64) as u64,
                    msk as u64,
                    (msk >> 64) as u64,
                );
            }
            FlowField::SportTcp | FlowField::SportUdp => set_field(
                map,
                field,
                entry,
                packet.sport as u64,
                0,
                mask.sport as u64,
                0,
            ),
            FlowField::DportTcp | FlowField::DportUdp => set_field(
                map,
                field,
                entry,
                packet.dport as u64,
                0,
                mask.dport as u64,
                0,
            ),
            // Non-header fields are compiled by their dedicated paths
            // (channel, target function, layer types).
            _ => {}
        }
    }
}
