//! Per-mode state layout records.
//!
//! Every component carries an [`OffsetTable`]: one [`SolverOffsets`] record
//! per solver mode, holding the component's own and subtree-total block
//! sizes and the offsets where its blocks start inside that mode's state
//! vector. Records are loaded lazily; freshness is judged by comparing the
//! record's revision stamps against the owning component's subtree
//! revision, so a structure change anywhere below a component makes every
//! record above it stale without any explicit notification.

use crate::mode::{SolverMode, DEFAULT_MODE_SLOTS, LOCAL_MODE_INDEX};
use crate::NULL_LOCATION;
use serde::{Deserialize, Serialize};

/// Block sizes contributed by a component or its subtree under one mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSizes {
    /// Generic algebraic variables.
    pub alg: usize,
    /// Differential variables.
    pub diff: usize,
    /// Voltage variables (algebraic, tiled ahead of `alg`).
    pub v: usize,
    /// Angle variables (algebraic, tiled ahead of `v`).
    pub a: usize,
    /// Algebraic root functions.
    pub alg_roots: usize,
    /// Differential root functions.
    pub diff_roots: usize,
    /// Jacobian entry estimate.
    pub jac: usize,
}

impl StateSizes {
    /// All state variables: angle + voltage + algebraic + differential.
    pub fn total_state(&self) -> usize {
        self.a + self.v + self.alg + self.diff
    }

    /// Algebraic variables of every kind.
    pub fn total_algebraic(&self) -> usize {
        self.a + self.v + self.alg
    }

    pub fn total_roots(&self) -> usize {
        self.alg_roots + self.diff_roots
    }

    pub fn reset(&mut self) {
        *self = StateSizes::default();
    }

    /// Zero the state counts, keeping roots and Jacobian.
    pub fn reset_state(&mut self) {
        self.alg = 0;
        self.diff = 0;
        self.v = 0;
        self.a = 0;
    }

    pub fn reset_roots(&mut self) {
        self.alg_roots = 0;
        self.diff_roots = 0;
    }

    pub fn reset_jacobian(&mut self) {
        self.jac = 0;
    }

    /// Add `other`'s state counts into this one.
    pub fn add_state(&mut self, other: &StateSizes) {
        self.alg += other.alg;
        self.diff += other.diff;
        self.v += other.v;
        self.a += other.a;
    }

    pub fn add_roots(&mut self, other: &StateSizes) {
        self.alg_roots += other.alg_roots;
        self.diff_roots += other.diff_roots;
    }

    pub fn add_jacobian(&mut self, other: &StateSizes) {
        self.jac += other.jac;
    }

    /// Add all of `other`'s counts into this one.
    pub fn add(&mut self, other: &StateSizes) {
        self.add_state(other);
        self.add_roots(other);
        self.add_jacobian(other);
    }
}

/// Root-function counts reported by a leaf model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootCount {
    pub alg: usize,
    pub diff: usize,
}

impl RootCount {
    pub fn new(alg: usize, diff: usize) -> Self {
        Self { alg, diff }
    }

    pub fn total(&self) -> usize {
        self.alg + self.diff
    }
}

/// Revision stamps recording when each size category was last loaded.
///
/// A category is current when its stamp equals the owning component's
/// subtree revision for that category. Zero never matches a live revision,
/// so a zeroed stamp reads as never loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStamps {
    pub state: u64,
    pub root: u64,
    pub jacobian: u64,
}

/// One component's layout record for one solver mode.
///
/// Offsets default to [`NULL_LOCATION`] until assigned. The angle,
/// voltage, algebraic, and differential blocks run independent cursors:
/// advancing past a sibling subtree moves each offset by that subtree's
/// count in the same block only.
#[derive(Debug, Clone)]
pub struct SolverOffsets {
    pub mode: SolverMode,
    /// Start of the angle block.
    pub a_offset: usize,
    /// Start of the voltage block.
    pub v_offset: usize,
    /// Start of the generic algebraic block.
    pub alg_offset: usize,
    /// Start of the differential block.
    pub diff_offset: usize,
    /// First root index owned by the component.
    pub root_offset: usize,
    /// Sizes contributed by the component alone.
    pub local: StateSizes,
    /// Sizes for the whole subtree.
    pub total: StateSizes,
    pub stamps: LoadStamps,
}

impl Default for SolverOffsets {
    fn default() -> Self {
        Self {
            mode: SolverMode::empty(),
            a_offset: NULL_LOCATION,
            v_offset: NULL_LOCATION,
            alg_offset: NULL_LOCATION,
            diff_offset: NULL_LOCATION,
            root_offset: NULL_LOCATION,
            local: StateSizes::default(),
            total: StateSizes::default(),
            stamps: LoadStamps::default(),
        }
    }
}

fn offset_add(offset: usize, delta: usize) -> usize {
    if offset == NULL_LOCATION {
        NULL_LOCATION
    } else {
        offset + delta
    }
}

impl SolverOffsets {
    pub fn new(mode: SolverMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn is_state_loaded(&self, revision: u64) -> bool {
        self.stamps.state == revision
    }

    pub fn is_root_loaded(&self, revision: u64) -> bool {
        self.stamps.root == revision
    }

    pub fn is_jacobian_loaded(&self, revision: u64) -> bool {
        self.stamps.jacobian == revision
    }

    /// Advance every block offset past `other`'s subtree totals.
    pub fn increment(&mut self, other: &SolverOffsets) {
        self.advance(&other.total);
    }

    /// Advance every block offset past `other`'s own sizes.
    pub fn local_increment(&mut self, other: &SolverOffsets) {
        self.advance(&other.local);
    }

    fn advance(&mut self, sizes: &StateSizes) {
        self.a_offset = offset_add(self.a_offset, sizes.a);
        self.v_offset = offset_add(self.v_offset, sizes.v);
        self.alg_offset = offset_add(self.alg_offset, sizes.alg);
        self.diff_offset = offset_add(self.diff_offset, sizes.diff);
    }

    /// Take the four state block offsets from `other`; sizes and the root
    /// offset stay.
    pub fn set_block_offsets(&mut self, other: &SolverOffsets) {
        self.a_offset = other.a_offset;
        self.v_offset = other.v_offset;
        self.alg_offset = other.alg_offset;
        self.diff_offset = other.diff_offset;
    }

    /// Lay the subtree's regions out contiguously from `base`: angle,
    /// voltage, algebraic, then differential.
    pub fn set_base(&mut self, base: usize) {
        self.a_offset = base;
        self.v_offset = base + self.total.a;
        self.alg_offset = base + self.total.a + self.total.v;
        self.diff_offset = base + self.total.a + self.total.v + self.total.alg;
    }

    /// One past the highest flat index assigned to the subtree's blocks.
    ///
    /// Non-dynamic modes ignore the differential block: those solvers
    /// never address it.
    pub fn max_index(&self) -> usize {
        let mut mx = 0;
        if self.alg_offset != NULL_LOCATION {
            mx = self.alg_offset + self.total.alg;
        }
        if self.mode.is_dynamic() && self.diff_offset != NULL_LOCATION {
            mx = mx.max(self.diff_offset + self.total.diff);
        }
        if self.v_offset != NULL_LOCATION {
            mx = mx.max(self.v_offset + self.total.v);
        }
        if self.a_offset != NULL_LOCATION {
            mx = mx.max(self.a_offset + self.total.a);
        }
        mx
    }

    /// Seed the subtree state totals from the component's own sizes.
    pub fn local_state_load(&mut self) {
        self.total.alg = self.local.alg;
        self.total.diff = self.local.diff;
        self.total.v = self.local.v;
        self.total.a = self.local.a;
    }

    pub fn local_root_load(&mut self) {
        self.total.alg_roots = self.local.alg_roots;
        self.total.diff_roots = self.local.diff_roots;
    }

    pub fn local_jacobian_load(&mut self) {
        self.total.jac = self.local.jac;
    }

    /// Forget the state layout: stamp cleared, state offsets nulled.
    pub fn state_unload(&mut self) {
        self.stamps.state = 0;
        self.alg_offset = NULL_LOCATION;
        self.diff_offset = NULL_LOCATION;
    }

    pub fn root_unload(&mut self) {
        self.stamps.root = 0;
    }

    pub fn jacobian_unload(&mut self) {
        self.stamps.jacobian = 0;
    }

    /// Forget everything this record has loaded.
    pub fn unload(&mut self) {
        self.state_unload();
        self.root_unload();
        self.jacobian_unload();
    }
}

/// Per-component cache of [`SolverOffsets`], one record per mode slot.
///
/// Slot 0 always holds the local mode; other slots grow on demand the
/// first time a mode with a higher `offset_index` asks for its record.
#[derive(Debug, Clone)]
pub struct OffsetTable {
    container: Vec<SolverOffsets>,
}

impl Default for OffsetTable {
    fn default() -> Self {
        Self::new()
    }
}

impl OffsetTable {
    pub fn new() -> Self {
        let mut container = Vec::with_capacity(DEFAULT_MODE_SLOTS);
        container.push(SolverOffsets::new(SolverMode::local()));
        Self { container }
    }

    /// Record for `mode`, if its slot has been touched.
    pub fn get(&self, mode: &SolverMode) -> Option<&SolverOffsets> {
        self.container.get(mode.offset_index)
    }

    /// Record for `mode`, growing the table as needed. The stored mode tag
    /// is refreshed so pairing changes take effect.
    pub fn get_mut(&mut self, mode: &SolverMode) -> &mut SolverOffsets {
        let index = mode.offset_index;
        while self.container.len() <= index {
            self.container.push(SolverOffsets::default());
        }
        let rec = &mut self.container[index];
        rec.mode = *mode;
        rec
    }

    /// The local-mode record; always present.
    pub fn local(&self) -> &SolverOffsets {
        &self.container[LOCAL_MODE_INDEX]
    }

    pub fn local_mut(&mut self) -> &mut SolverOffsets {
        &mut self.container[LOCAL_MODE_INDEX]
    }

    /// Record stored at a raw slot index.
    pub fn slot(&self, index: usize) -> Option<&SolverOffsets> {
        self.container.get(index)
    }

    /// Mode stored at a raw slot index.
    pub fn mode_at(&self, index: usize) -> Option<&SolverMode> {
        self.container.get(index).map(|rec| &rec.mode)
    }

    /// First stored mode whose identity flags match `mode`.
    pub fn find(&self, mode: &SolverMode) -> Option<&SolverMode> {
        self.container
            .iter()
            .find(|rec| rec.mode.same_identity(mode))
            .map(|rec| &rec.mode)
    }

    pub fn len(&self) -> usize {
        self.container.len()
    }

    pub fn is_empty(&self) -> bool {
        self.container.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SolverOffsets> {
        self.container.iter()
    }

    /// One past the highest flat index assigned under `mode`.
    pub fn max_index(&self, mode: &SolverMode) -> usize {
        self.get(mode).map_or(0, SolverOffsets::max_index)
    }

    /// Forget every record's layout, or only the dynamic ones.
    pub fn unload(&mut self, dynamic_only: bool) {
        for rec in &mut self.container {
            if dynamic_only && !rec.mode.is_dynamic() {
                continue;
            }
            rec.unload();
        }
    }

    pub fn state_unload(&mut self, dynamic_only: bool) {
        for rec in &mut self.container {
            if dynamic_only && !rec.mode.is_dynamic() {
                continue;
            }
            rec.state_unload();
        }
    }

    pub fn root_unload(&mut self, dynamic_only: bool) {
        for rec in &mut self.container {
            if dynamic_only && !rec.mode.is_dynamic() {
                continue;
            }
            rec.root_unload();
        }
    }

    pub fn jacobian_unload(&mut self, dynamic_only: bool) {
        for rec in &mut self.container {
            if dynamic_only && !rec.mode.is_dynamic() {
                continue;
            }
            rec.jacobian_unload();
        }
    }

    /// Refresh every record's root and Jacobian counts from the local-mode
    /// record, for changes that touch only those counts.
    ///
    /// Counts land in both the local and subtree sizes, and refreshed
    /// records take the local record's root and Jacobian stamps, so they
    /// read as loaded exactly when the local record does.
    pub fn local_update_all(&mut self, dynamic_only: bool) {
        let local = self.container[LOCAL_MODE_INDEX].local;
        let stamps = self.container[LOCAL_MODE_INDEX].stamps;
        for rec in &mut self.container {
            if dynamic_only && !rec.mode.is_dynamic() {
                continue;
            }
            rec.local.alg_roots = local.alg_roots;
            rec.local.diff_roots = local.diff_roots;
            rec.local.jac = local.jac;
            rec.total.alg_roots = local.alg_roots;
            rec.total.diff_roots = local.diff_roots;
            rec.total.jac = local.jac;
            rec.stamps.root = stamps.root;
            rec.stamps.jacobian = stamps.jacobian;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized_record(mode: SolverMode) -> SolverOffsets {
        let mut rec = SolverOffsets::new(mode);
        rec.local = StateSizes {
            alg: 3,
            diff: 4,
            v: 2,
            a: 1,
            ..StateSizes::default()
        };
        rec.total = rec.local;
        rec
    }

    #[test]
    fn test_state_sizes_totals() {
        let s = StateSizes {
            alg: 3,
            diff: 4,
            v: 2,
            a: 1,
            alg_roots: 5,
            diff_roots: 6,
            jac: 7,
        };
        assert_eq!(s.total_state(), 10);
        assert_eq!(s.total_algebraic(), 6);
        assert_eq!(s.total_roots(), 11);
    }

    #[test]
    fn test_state_sizes_partial_resets() {
        let mut s = StateSizes {
            alg: 3,
            diff: 4,
            v: 2,
            a: 1,
            alg_roots: 5,
            diff_roots: 6,
            jac: 7,
        };
        s.reset_state();
        assert_eq!(s.total_state(), 0);
        assert_eq!(s.total_roots(), 11);
        assert_eq!(s.jac, 7);
        s.reset_roots();
        assert_eq!(s.total_roots(), 0);
        s.reset_jacobian();
        assert_eq!(s, StateSizes::default());
    }

    #[test]
    fn test_default_offsets_are_null() {
        let rec = SolverOffsets::default();
        assert_eq!(rec.alg_offset, NULL_LOCATION);
        assert_eq!(rec.diff_offset, NULL_LOCATION);
        assert_eq!(rec.root_offset, NULL_LOCATION);
        assert!(!rec.is_state_loaded(1));
    }

    #[test]
    fn test_set_base_packs_regions() {
        let mut rec = sized_record(SolverMode::dae(2));
        rec.set_base(10);
        assert_eq!(rec.a_offset, 10);
        assert_eq!(rec.v_offset, 11);
        assert_eq!(rec.alg_offset, 13);
        assert_eq!(rec.diff_offset, 16);
        assert_eq!(rec.max_index(), 20);
    }

    #[test]
    fn test_max_index_ignores_diff_when_static() {
        let mut rec = sized_record(SolverMode::power_flow(1));
        rec.set_base(0);
        // a ends at 1, v at 3, alg at 6; diff not addressed
        assert_eq!(rec.max_index(), 6);
    }

    #[test]
    fn test_increment_moves_each_block_independently() {
        let mut cursor = SolverOffsets::new(SolverMode::dae(2));
        cursor.a_offset = 0;
        cursor.v_offset = 0;
        cursor.alg_offset = 0;
        cursor.diff_offset = 0;

        let other = sized_record(SolverMode::dae(2));
        cursor.increment(&other);
        assert_eq!(cursor.a_offset, 1);
        assert_eq!(cursor.v_offset, 2);
        assert_eq!(cursor.alg_offset, 3);
        assert_eq!(cursor.diff_offset, 4);

        cursor.local_increment(&other);
        assert_eq!(cursor.alg_offset, 6);
        assert_eq!(cursor.diff_offset, 8);
    }

    #[test]
    fn test_increment_leaves_null_offsets_null() {
        let mut cursor = SolverOffsets::new(SolverMode::dae(2));
        let other = sized_record(SolverMode::dae(2));
        cursor.increment(&other);
        assert_eq!(cursor.alg_offset, NULL_LOCATION);
        assert_eq!(cursor.diff_offset, NULL_LOCATION);
    }

    #[test]
    fn test_table_grows_on_demand() {
        let mut table = OffsetTable::new();
        assert_eq!(table.len(), 1);
        assert!(table.local().mode.is_local());

        let dae = SolverMode::dae(4);
        table.get_mut(&dae).local.alg = 2;
        assert_eq!(table.len(), 5);
        assert_eq!(table.get(&dae).map(|r| r.local.alg), Some(2));
        // intermediate slots exist but stay blank
        assert_eq!(table.slot(2).map(|r| r.local.alg), Some(0));
    }

    #[test]
    fn test_find_matches_identity_not_slot() {
        let mut table = OffsetTable::new();
        table.get_mut(&SolverMode::dae(4));

        let probe = SolverMode::dae(9);
        let found = table.find(&probe).copied();
        assert_eq!(found.map(|m| m.offset_index), Some(4));
        // blank grown slots carry the empty identity and never match
        assert!(table.find(&SolverMode::power_flow(1)).is_none());
    }

    #[test]
    fn test_unload_dynamic_only_spares_static_modes() {
        let mut table = OffsetTable::new();
        let pf = SolverMode::power_flow(1);
        let dae = SolverMode::dae(2);
        for mode in [&pf, &dae] {
            let rec = table.get_mut(mode);
            rec.alg_offset = 0;
            rec.stamps.state = 7;
        }

        table.state_unload(true);
        assert!(table.get(&pf).unwrap().is_state_loaded(7));
        assert!(!table.get(&dae).unwrap().is_state_loaded(7));
        assert_eq!(table.get(&dae).unwrap().alg_offset, NULL_LOCATION);

        table.state_unload(false);
        assert!(!table.get(&pf).unwrap().is_state_loaded(7));
    }

    #[test]
    fn test_local_update_all_copies_counts() {
        let mut table = OffsetTable::new();
        table.get_mut(&SolverMode::power_flow(1));
        table.get_mut(&SolverMode::dae(2));
        {
            let local = table.local_mut();
            local.local.alg_roots = 2;
            local.local.diff_roots = 1;
            local.local.jac = 9;
            local.stamps.root = 5;
            local.stamps.jacobian = 6;
        }

        table.local_update_all(true);
        let rec = table.get(&SolverMode::dae(2)).unwrap();
        assert_eq!(rec.local.alg_roots, 2);
        assert_eq!(rec.local.diff_roots, 1);
        assert_eq!(rec.total.total_roots(), 3);
        assert_eq!(rec.total.jac, 9);
        assert!(rec.is_root_loaded(5));
        assert!(rec.is_jacobian_loaded(6));
        // non-dynamic records sit out a dynamic-only refresh
        let pf = table.get(&SolverMode::power_flow(1)).unwrap();
        assert_eq!(pf.total.jac, 0);
        assert!(!pf.is_root_loaded(5));

        table.local_update_all(false);
        let pf = table.get(&SolverMode::power_flow(1)).unwrap();
        assert_eq!(pf.total.total_roots(), 3);
        assert_eq!(pf.total.jac, 9);
        assert!(pf.is_root_loaded(5));
    }
}
