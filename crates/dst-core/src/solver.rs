//! Solver-facing surface of the component tree.
//!
//! Everything an external integrator or nonlinear solver needs from a root
//! component: size queries (loading lazily on first use), offset
//! assignment, state transfer between flat solver vectors and private
//! storage, diagnostic labeling, and the evaluation entry points that
//! recurse over the tree and delegate to leaf models with pre-resolved
//! [`Locations`](crate::locations::Locations).
//!
//! Evaluation recursions skip children flagged for separate processing and
//! children contributing nothing under the active mode; disabled children
//! fall out naturally because their loaded sizes are zero.

use crate::component::Component;
use crate::locations::window_mut;
use crate::mode::SolverMode;
use crate::offsets::SolverOffsets;
use crate::state::StateData;
use crate::{DstResult, INVALID_LOCATION, NULL_LOCATION};
use dst_sparse::Accumulator;
use tracing::trace;

/// Marker value written by [`Component::variable_types`] for algebraic
/// entries.
pub const ALGEBRAIC_VARIABLE: f64 = 0.0;
/// Marker value for differential entries.
pub const DIFFERENTIAL_VARIABLE: f64 = 1.0;

/// Copy `count` values between flat buffers, skipping silently when either
/// window falls outside its buffer.
fn copy_block(src: &[f64], src_start: usize, dst: &mut [f64], dst_start: usize, count: usize) {
    if count == 0 || src_start == NULL_LOCATION {
        return;
    }
    debug_assert!(src_start.saturating_add(count) <= src.len());
    debug_assert!(dst_start.saturating_add(count) <= dst.len());
    if src_start.saturating_add(count) > src.len() || dst_start.saturating_add(count) > dst.len() {
        return;
    }
    dst[dst_start..dst_start + count].copy_from_slice(&src[src_start..src_start + count]);
}

fn fill_range(data: &mut [f64], offset: usize, count: usize, value: f64) {
    for slot in window_mut(data, offset, count) {
        *slot = value;
    }
}

/// Digits at the end of a field name, zero when absent.
fn trailing_index(field: &str) -> usize {
    let head = field.trim_end_matches(|c: char| c.is_ascii_digit());
    field[head.len()..].parse().unwrap_or(0)
}

/// Label `count` entries starting at `offset`, taking model-supplied names
/// from `model_names[base..]` and synthesizing `fallback` names past them.
/// Entries another component already labeled are left alone.
fn fill_block(
    names: &mut [String],
    offset: usize,
    count: usize,
    model_names: &[String],
    base: usize,
    prefix: &str,
    fallback: &str,
) {
    if count == 0 || offset == NULL_LOCATION {
        return;
    }
    for kk in 0..count {
        let Some(slot) = names.get_mut(offset + kk) else {
            break;
        };
        if !slot.is_empty() {
            continue;
        }
        *slot = match model_names.get(base + kk) {
            Some(name) => format!("{prefix}{name}"),
            None => format!("{prefix}{fallback}{kk}"),
        };
    }
}

impl Component {
    /// Total states the subtree contributes under `mode`, loading sizes on
    /// first use.
    pub fn state_size(&mut self, mode: &SolverMode) -> usize {
        self.load_state_sizes(mode);
        self.state_size_cached(mode)
    }

    /// Last loaded state count; zero for an untouched slot.
    pub fn state_size_cached(&self, mode: &SolverMode) -> usize {
        let Some(rec) = self.offsets.get(mode) else {
            return 0;
        };
        let mut size = if mode.has_algebraic() {
            rec.total.total_algebraic()
        } else {
            0
        };
        if mode.has_differential() {
            size += rec.total.diff;
        }
        size
    }

    /// Generic algebraic states only, excluding voltage and angle.
    pub fn alg_size(&mut self, mode: &SolverMode) -> usize {
        self.load_state_sizes(mode);
        self.alg_size_cached(mode)
    }

    pub fn alg_size_cached(&self, mode: &SolverMode) -> usize {
        self.offsets.get(mode).map_or(0, |rec| rec.total.alg)
    }

    /// Algebraic states of every kind: generic, voltage, and angle.
    pub fn total_alg_size(&mut self, mode: &SolverMode) -> usize {
        self.load_state_sizes(mode);
        self.total_alg_size_cached(mode)
    }

    pub fn total_alg_size_cached(&self, mode: &SolverMode) -> usize {
        self.offsets
            .get(mode)
            .map_or(0, |rec| rec.total.total_algebraic())
    }

    pub fn diff_size(&mut self, mode: &SolverMode) -> usize {
        self.load_state_sizes(mode);
        self.diff_size_cached(mode)
    }

    pub fn diff_size_cached(&self, mode: &SolverMode) -> usize {
        self.offsets.get(mode).map_or(0, |rec| rec.total.diff)
    }

    pub fn voltage_size(&mut self, mode: &SolverMode) -> usize {
        self.load_state_sizes(mode);
        self.offsets.get(mode).map_or(0, |rec| rec.total.v)
    }

    pub fn angle_size(&mut self, mode: &SolverMode) -> usize {
        self.load_state_sizes(mode);
        self.offsets.get(mode).map_or(0, |rec| rec.total.a)
    }

    pub fn root_size(&mut self, mode: &SolverMode) -> usize {
        self.load_root_sizes(mode);
        self.root_size_cached(mode)
    }

    pub fn root_size_cached(&self, mode: &SolverMode) -> usize {
        self.offsets
            .get(mode)
            .map_or(0, |rec| rec.total.total_roots())
    }

    pub fn jac_size(&mut self, mode: &SolverMode) -> usize {
        self.load_jacobian_sizes(mode);
        self.jac_size_cached(mode)
    }

    pub fn jac_size_cached(&self, mode: &SolverMode) -> usize {
        self.offsets.get(mode).map_or(0, |rec| rec.total.jac)
    }

    /// The full layout record for `mode`, with every size category loaded.
    pub fn get_offsets(&mut self, mode: &SolverMode) -> &SolverOffsets {
        self.load_state_sizes(mode);
        self.load_root_sizes(mode);
        self.load_jacobian_sizes(mode);
        self.offsets.get_mut(mode)
    }

    pub fn is_state_loaded(&self, mode: &SolverMode) -> bool {
        let rev = self.subtree_revisions();
        self.offsets
            .get(mode)
            .is_some_and(|rec| rec.is_state_loaded(rev.state))
    }

    pub fn is_root_loaded(&self, mode: &SolverMode) -> bool {
        let rev = self.subtree_revisions();
        self.offsets
            .get(mode)
            .is_some_and(|rec| rec.is_root_loaded(rev.root))
    }

    pub fn is_jacobian_loaded(&self, mode: &SolverMode) -> bool {
        let rev = self.subtree_revisions();
        self.offsets
            .get(mode)
            .is_some_and(|rec| rec.is_jacobian_loaded(rev.jacobian))
    }

    /// Start of the algebraic block, or [`NULL_LOCATION`] when the record
    /// is unassigned or stale.
    pub fn alg_offset(&self, mode: &SolverMode) -> usize {
        let rev = self.subtree_revisions();
        match self.offsets.get(mode) {
            Some(rec) if rec.is_state_loaded(rev.state) => rec.alg_offset,
            _ => NULL_LOCATION,
        }
    }

    pub fn diff_offset(&self, mode: &SolverMode) -> usize {
        let rev = self.subtree_revisions();
        match self.offsets.get(mode) {
            Some(rec) if rec.is_state_loaded(rev.state) => rec.diff_offset,
            _ => NULL_LOCATION,
        }
    }

    pub fn root_offset(&self, mode: &SolverMode) -> usize {
        let rev = self.subtree_revisions();
        match self.offsets.get(mode) {
            Some(rec) if rec.is_root_loaded(rev.root) => rec.root_offset,
            _ => NULL_LOCATION,
        }
    }

    /// Copy the solver's view of this subtree into private storage.
    ///
    /// Also advances the component's notion of current time; children
    /// receive the same call and pick out their own blocks.
    pub fn set_state(&mut self, time: f64, state: &[f64], dstate_dt: &[f64], mode: &SolverMode) {
        self.prev_time = time;
        if self.state_size(mode) == 0 {
            return;
        }
        self.ensure_private_storage();
        let boundary = self.offsets.local().local.alg;
        let Some(rec) = self.offsets.get(mode) else {
            return;
        };
        let own = if self.children.is_empty() {
            rec.total
        } else {
            rec.local
        };
        let (alg_offset, diff_offset) = (rec.alg_offset, rec.diff_offset);

        if mode.has_algebraic() && own.alg > 0 {
            copy_block(state, alg_offset, &mut self.state, 0, own.alg);
        }
        if own.diff > 0 {
            // differential-only modes filter the local algebraic count to
            // zero, so the private boundary comes from the local record
            let dst = if mode.is_differential_only() {
                boundary
            } else {
                own.alg
            };
            copy_block(state, diff_offset, &mut self.state, dst, own.diff);
            copy_block(dstate_dt, diff_offset, &mut self.dstate_dt, dst, own.diff);
        }
        for child in &mut self.children {
            child.set_state(time, state, dstate_dt, mode);
        }
    }

    /// Copy private storage out into the solver's flat buffers.
    pub fn guess_state(
        &mut self,
        time: f64,
        state: &mut [f64],
        dstate_dt: &mut [f64],
        mode: &SolverMode,
    ) {
        if self.state_size(mode) == 0 {
            return;
        }
        self.ensure_private_storage();
        let boundary = self.offsets.local().local.alg;
        let Some(rec) = self.offsets.get(mode) else {
            return;
        };
        let own = if self.children.is_empty() {
            rec.total
        } else {
            rec.local
        };
        let (alg_offset, diff_offset) = (rec.alg_offset, rec.diff_offset);

        if mode.has_algebraic() && own.alg > 0 {
            copy_block(&self.state, 0, state, alg_offset, own.alg);
        }
        if own.diff > 0 {
            let src = if mode.is_differential_only() {
                boundary
            } else {
                own.alg
            };
            copy_block(&self.state, src, state, diff_offset, own.diff);
            copy_block(&self.dstate_dt, src, dstate_dt, diff_offset, own.diff);
        }
        for child in &mut self.children {
            child.guess_state(time, state, dstate_dt, mode);
        }
    }

    /// Human-readable labels for every flat index under `mode`.
    ///
    /// Model-supplied names are prefixed with the component path
    /// (`root:child:name`); blocks past the model's list get synthesized
    /// `alg_state_N` style labels.
    pub fn state_names(&mut self, mode: &SolverMode) -> Vec<String> {
        // model names are indexed through the local layout
        self.load_state_sizes(&SolverMode::local());
        self.load_state_sizes(mode);
        let mut names = vec![String::new(); self.offsets.max_index(mode)];
        self.fill_state_names(&mut names, mode, "");
        names
    }

    fn fill_state_names(&self, names: &mut [String], mode: &SolverMode, prefix: &str) {
        let Some(rec) = self.offsets.get(mode) else {
            return;
        };
        let prefix2 = format!("{}{}:", prefix, self.name);
        let model_names = self.model.state_names();
        // model names follow the private layout of the local record
        let lc = self.offsets.local().local;
        if mode.has_algebraic() {
            fill_block(
                names,
                rec.v_offset,
                rec.local.v,
                &model_names,
                0,
                &prefix2,
                "voltage_state_",
            );
            fill_block(
                names,
                rec.a_offset,
                rec.local.a,
                &model_names,
                lc.v,
                &prefix2,
                "angle_state_",
            );
            fill_block(
                names,
                rec.alg_offset,
                rec.local.alg,
                &model_names,
                lc.v + lc.a,
                &prefix2,
                "alg_state_",
            );
        }
        if !mode.is_algebraic_only() {
            fill_block(
                names,
                rec.diff_offset,
                rec.local.diff,
                &model_names,
                lc.v + lc.a + lc.alg,
                &prefix2,
                "diff_state_",
            );
        }
        for child in &self.children {
            child.fill_state_names(names, mode, &prefix2);
        }
    }

    /// Flat index for a named or positional state, searching this
    /// component and then its descendants.
    ///
    /// Recognizes `state<N>`, `alg<N>`, and `diff<N>` positional fields
    /// plus the model's own state names. Returns [`NULL_LOCATION`] when
    /// the state exists but has no assigned offset yet, and
    /// [`INVALID_LOCATION`] when nothing in the subtree matches.
    ///
    /// Model-supplied names map through the component's local layout, so
    /// local sizes must have been loaded (any initialization pass does
    /// this) for named lookups to land in the right partition.
    pub fn find_index(&self, field: &str, mode: &SolverMode) -> usize {
        let rev = self.subtree_revisions();
        let rec = self.offsets.get(mode);
        let loaded = rec.is_some_and(|r| r.is_state_loaded(rev.state));

        if let Some(rest) = field.strip_prefix("state") {
            let num = trailing_index(rest);
            return if self.state_size_cached(mode) > num {
                match rec {
                    Some(r) if r.alg_offset != NULL_LOCATION => r.alg_offset + num,
                    _ => NULL_LOCATION,
                }
            } else {
                INVALID_LOCATION
            };
        }
        if let Some(rest) = field.strip_prefix("alg") {
            let num = trailing_index(rest);
            return if rec.map_or(0, |r| r.total.alg) > num {
                match rec {
                    Some(r) if r.alg_offset != NULL_LOCATION => r.alg_offset + num,
                    _ => NULL_LOCATION,
                }
            } else if !loaded {
                NULL_LOCATION
            } else {
                INVALID_LOCATION
            };
        }
        if let Some(rest) = field.strip_prefix("diff") {
            let num = trailing_index(rest);
            return if rec.map_or(0, |r| r.total.diff) > num {
                match rec {
                    Some(r) if r.diff_offset != NULL_LOCATION => r.diff_offset + num,
                    _ => NULL_LOCATION,
                }
            } else if !loaded {
                NULL_LOCATION
            } else {
                INVALID_LOCATION
            };
        }

        let model_names = self.model.state_names();
        if let Some(nn) = model_names.iter().position(|n| n == field) {
            let lc = self.offsets.local().local;
            if nn < lc.alg {
                return match rec {
                    Some(r) if r.alg_offset != NULL_LOCATION => r.alg_offset + nn,
                    _ => NULL_LOCATION,
                };
            }
            if nn - lc.alg < lc.diff {
                return match rec {
                    Some(r) if r.diff_offset != NULL_LOCATION => r.diff_offset + nn - lc.alg,
                    _ => NULL_LOCATION,
                };
            }
            return if loaded {
                INVALID_LOCATION
            } else {
                NULL_LOCATION
            };
        }

        for child in &self.children {
            let found = child.find_index(field, mode);
            if found != INVALID_LOCATION {
                return found;
            }
        }
        INVALID_LOCATION
    }

    /// Mark each assigned flat index as algebraic or differential.
    pub fn variable_types(&mut self, sdata: &mut [f64], mode: &SolverMode) {
        self.load_state_sizes(mode);
        self.variable_types_inner(sdata, mode);
    }

    fn variable_types_inner(&self, sdata: &mut [f64], mode: &SolverMode) {
        let Some(rec) = self.offsets.get(mode) else {
            return;
        };
        let own = if self.children.is_empty() {
            rec.total
        } else {
            rec.local
        };
        fill_range(sdata, rec.alg_offset, own.alg, ALGEBRAIC_VARIABLE);
        fill_range(sdata, rec.diff_offset, own.diff, DIFFERENTIAL_VARIABLE);
        for child in &self.children {
            if child.is_enabled() {
                child.variable_types_inner(sdata, mode);
            }
        }
    }

    /// Evaluate residual contributions into `resid`.
    pub fn residual(
        &mut self,
        sd: &StateData<'_>,
        resid: &mut [f64],
        mode: &SolverMode,
    ) -> DstResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.load_state_sizes(mode);
        {
            let mut loc = self.resolve_locations_mut(sd, &mut *resid, mode)?;
            self.model.residual(sd, &mut loc, mode);
        }
        for child in &mut self.children {
            if child.flags.separate_processing {
                continue;
            }
            if child.state_size(mode) > 0 {
                child.residual(sd, resid, mode)?;
            }
        }
        Ok(())
    }

    /// Evaluate state derivatives into `deriv`.
    pub fn derivative(
        &mut self,
        sd: &StateData<'_>,
        deriv: &mut [f64],
        mode: &SolverMode,
    ) -> DstResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.load_state_sizes(mode);
        {
            let mut loc = self.resolve_locations_mut(sd, &mut *deriv, mode)?;
            self.model.derivative(sd, &mut loc, mode);
        }
        for child in &mut self.children {
            if child.flags.separate_processing {
                continue;
            }
            if child.diff_size(mode) > 0 {
                child.derivative(sd, deriv, mode)?;
            }
        }
        Ok(())
    }

    /// Solve or relax algebraic states into `update`, damped by `alpha`.
    pub fn algebraic_update(
        &mut self,
        sd: &StateData<'_>,
        update: &mut [f64],
        mode: &SolverMode,
        alpha: f64,
    ) -> DstResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.load_state_sizes(mode);
        {
            let mut loc = self.resolve_locations_mut(sd, &mut *update, mode)?;
            self.model.algebraic_update(sd, &mut loc, mode, alpha);
        }
        for child in &mut self.children {
            if child.flags.separate_processing {
                continue;
            }
            if child.alg_size(mode) > 0 {
                child.algebraic_update(sd, update, mode, alpha)?;
            }
        }
        Ok(())
    }

    /// Collect Jacobian contributions into the accumulator.
    pub fn jacobian_elements(
        &mut self,
        sd: &StateData<'_>,
        md: &mut dyn Accumulator,
        mode: &SolverMode,
    ) -> DstResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.load_state_sizes(mode);
        self.load_jacobian_sizes(mode);
        {
            let loc = self.resolve_locations(sd, mode)?;
            self.model.jacobian_elements(sd, &loc, md, mode);
        }
        for child in &mut self.children {
            if child.flags.separate_processing {
                continue;
            }
            if child.state_size(mode) > 0 {
                child.jacobian_elements(sd, md, mode)?;
            }
        }
        Ok(())
    }

    /// Evaluate root (event) functions into `roots`; each component writes
    /// only its own window.
    pub fn root_test(
        &mut self,
        sd: &StateData<'_>,
        roots: &mut [f64],
        mode: &SolverMode,
    ) -> DstResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.load_root_sizes(mode);
        let (root_offset, own_roots) = match self.offsets.get(mode) {
            Some(rec) => (rec.root_offset, rec.local.total_roots()),
            None => (NULL_LOCATION, 0),
        };
        if own_roots > 0 {
            let loc = self.resolve_locations(sd, mode)?;
            let own = window_mut(roots, root_offset, own_roots);
            self.model.root_test(sd, &loc, own, mode);
        }
        for child in &mut self.children {
            if child.flags.separate_processing {
                continue;
            }
            if child.root_size(mode) > 0 {
                child.root_test(sd, roots, mode)?;
            }
        }
        Ok(())
    }

    /// Notify models whose root functions crossed, per the solver's mask
    /// over the flat root vector.
    pub fn root_trigger(&mut self, time: f64, mask: &[bool], mode: &SolverMode) {
        if !self.enabled {
            return;
        }
        self.load_root_sizes(mode);
        let (root_offset, own_roots) = match self.offsets.get(mode) {
            Some(rec) => (rec.root_offset, rec.local.total_roots()),
            None => (NULL_LOCATION, 0),
        };
        if own_roots > 0 && root_offset < mask.len() {
            let end = root_offset.saturating_add(own_roots).min(mask.len());
            trace!(component = %self.name, offset = root_offset, "root trigger window");
            self.model.root_trigger(time, &mask[root_offset..end], mode);
        }
        for child in &mut self.children {
            if child.flags.separate_processing {
                continue;
            }
            if child.root_size(mode) > 0 {
                child.root_trigger(time, mask, mode);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::tests::leaf;
    use crate::component::ComponentFlags;
    use crate::locations::Locations;
    use crate::model::ComponentModel;
    use crate::offsets::{RootCount, StateSizes};
    use dst_sparse::TripletList;
    use std::sync::{Arc, Mutex};

    /// root
    /// ├── child1 (2 alg)
    /// │   └── gc1 (1 alg)
    /// └── child2 (1 alg, 1 diff)
    ///     └── gc2 (1 alg)
    fn sample_tree() -> Component {
        let mut root = Component::container("root");
        let mut child1 = leaf("child1", 2, 0);
        child1.add_child(leaf("gc1", 1, 0)).unwrap();
        let mut child2 = leaf("child2", 1, 1);
        child2.add_child(leaf("gc2", 1, 0)).unwrap();
        root.add_child(child1).unwrap();
        root.add_child(child2).unwrap();
        root
    }

    #[test]
    fn test_tree_sizes_load_on_first_query() {
        let mut root = sample_tree();
        let dae = SolverMode::dae(2);
        assert_eq!(root.state_size(&dae), 6);
        assert_eq!(root.alg_size(&dae), 5);
        assert_eq!(root.diff_size(&dae), 1);

        let pf = SolverMode::power_flow(1);
        assert_eq!(root.state_size(&pf), 5);
        assert_eq!(root.diff_size(&pf), 0);
    }

    #[test]
    fn test_offset_assignment_tiles_depth_first() {
        let mut root = sample_tree();
        let dae = SolverMode::dae(2);
        root.set_offset(0, &dae);

        let child1 = root.child("child1").unwrap();
        assert_eq!(child1.alg_offset(&dae), 0);
        assert_eq!(child1.child("gc1").unwrap().alg_offset(&dae), 2);
        let child2 = root.child("child2").unwrap();
        assert_eq!(child2.alg_offset(&dae), 3);
        assert_eq!(child2.child("gc2").unwrap().alg_offset(&dae), 4);
        // the single differential state lands after the algebraic region
        assert_eq!(child2.diff_offset(&dae), 5);
        assert_eq!(root.get_offsets(&dae).max_index(), 6);
    }

    #[test]
    fn test_offset_blocks_do_not_overlap() {
        let mut root = sample_tree();
        let dae = SolverMode::dae(2);
        root.set_offset(0, &dae);

        fn collect(c: &Component, mode: &SolverMode, out: &mut Vec<(usize, usize)>) {
            if let Some(rec) = c.offsets.get(mode) {
                if rec.local.alg > 0 {
                    out.push((rec.alg_offset, rec.local.alg));
                }
            }
            for child in c.children() {
                collect(child, mode, out);
            }
        }
        let mut blocks = Vec::new();
        collect(&root, &dae, &mut blocks);
        blocks.sort_unstable();
        for pair in blocks.windows(2) {
            assert!(pair[0].0 + pair[0].1 <= pair[1].0, "blocks overlap: {pair:?}");
        }
    }

    #[test]
    fn test_structural_change_nulls_offsets_until_reassigned() {
        let mut root = sample_tree();
        let dae = SolverMode::dae(2);
        root.set_offset(0, &dae);
        assert_eq!(root.alg_offset(&dae), 0);

        root.child_mut("child1")
            .unwrap()
            .add_child(leaf("gc1b", 2, 0))
            .unwrap();
        assert!(!root.is_state_loaded(&dae));
        assert_eq!(root.alg_offset(&dae), NULL_LOCATION);

        root.set_offset(0, &dae);
        assert_eq!(root.state_size_cached(&dae), 8);
        assert_eq!(root.child("child2").unwrap().alg_offset(&dae), 5);
    }

    #[test]
    fn test_set_and_guess_state_round_trip() {
        let mut c = leaf("l", 1, 1);
        let dae = SolverMode::dae(2);
        c.set_offset(0, &dae);

        let state = [2.0, 3.0];
        let dstate = [0.0, 0.5];
        c.set_state(1.5, &state, &dstate, &dae);
        assert_eq!(c.prev_time, 1.5);
        assert_eq!(c.state, vec![2.0, 3.0]);
        assert_eq!(c.dstate_dt[1], 0.5);

        let mut out_state = [0.0; 2];
        let mut out_dstate = [0.0; 2];
        c.guess_state(1.5, &mut out_state, &mut out_dstate, &dae);
        assert_eq!(out_state, state);
        assert_eq!(out_dstate, dstate);
    }

    #[test]
    fn test_differential_only_state_parks_after_local_algebraic() {
        let mut c = leaf("l", 1, 1);
        let dd = SolverMode::dynamic_differential(4);
        c.set_offset(0, &dd);

        let state = [7.0];
        let dstate = [0.7];
        c.set_state(0.0, &state, &dstate, &dd);
        assert_eq!(c.state, vec![0.0, 7.0]);
        assert_eq!(c.dstate_dt[1], 0.7);

        let mut out = [0.0];
        let mut outd = [0.0];
        c.guess_state(0.0, &mut out, &mut outd, &dd);
        assert_eq!(out, [7.0]);
        assert_eq!(outd, [0.7]);
    }

    struct Named;

    impl ComponentModel for Named {
        fn kind(&self) -> &str {
            "named"
        }

        fn local_state_sizes(&self, _flags: &ComponentFlags, _mode: &SolverMode) -> StateSizes {
            StateSizes {
                alg: 1,
                diff: 1,
                ..StateSizes::default()
            }
        }

        fn state_names(&self) -> Vec<String> {
            vec!["flux".to_string(), "speed".to_string()]
        }
    }

    #[test]
    fn test_state_names_mix_model_and_fallback_labels() {
        let mut root = Component::container("root");
        root.add_child(Component::new("m", Box::new(Named))).unwrap();
        root.add_child(leaf("plain", 1, 0)).unwrap();
        let dae = SolverMode::dae(2);
        root.set_offset(0, &dae);

        let names = root.state_names(&dae);
        assert_eq!(names.len(), 3);
        assert_eq!(names[0], "root:m:flux");
        assert_eq!(names[1], "root:plain:alg_state_0");
        assert_eq!(names[2], "root:m:speed");
    }

    #[test]
    fn test_find_index_positional_and_named() {
        let mut root = Component::container("root");
        root.add_child(Component::new("m", Box::new(Named))).unwrap();
        root.add_child(leaf("plain", 1, 0)).unwrap();
        let dae = SolverMode::dae(2);
        root.set_offset(0, &dae);
        root.load_state_sizes(&SolverMode::local());

        assert_eq!(root.find_index("alg1", &dae), 1);
        assert_eq!(root.find_index("state2", &dae), 2);
        assert_eq!(root.find_index("flux", &dae), 0);
        assert_eq!(root.find_index("speed", &dae), 2);
        assert_eq!(root.find_index("missing", &dae), INVALID_LOCATION);
        assert_eq!(root.find_index("alg9", &dae), INVALID_LOCATION);
    }

    #[test]
    fn test_variable_types_mark_partitions() {
        let mut root = sample_tree();
        let dae = SolverMode::dae(2);
        root.set_offset(0, &dae);

        let mut types = [0.5; 6];
        root.variable_types(&mut types, &dae);
        assert_eq!(types, [0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    /// Writes a constant through whichever destination window the mode
    /// resolves, and stamps the diagonal during Jacobian assembly.
    struct Stamp {
        alg: usize,
        diff: usize,
        value: f64,
    }

    impl ComponentModel for Stamp {
        fn kind(&self) -> &str {
            "stamp"
        }

        fn local_state_sizes(&self, _flags: &ComponentFlags, _mode: &SolverMode) -> StateSizes {
            StateSizes {
                alg: self.alg,
                diff: self.diff,
                ..StateSizes::default()
            }
        }

        fn residual(&self, _sd: &StateData<'_>, loc: &mut Locations<'_>, _mode: &SolverMode) {
            if let Some(dest) = loc.dest_alg.as_deref_mut() {
                for x in dest.iter_mut() {
                    *x = self.value;
                }
            }
        }

        fn derivative(&self, _sd: &StateData<'_>, loc: &mut Locations<'_>, _mode: &SolverMode) {
            if let Some(dest) = loc.dest_diff.as_deref_mut() {
                for x in dest.iter_mut() {
                    *x = self.value;
                }
            }
        }

        fn algebraic_update(
            &self,
            _sd: &StateData<'_>,
            loc: &mut Locations<'_>,
            _mode: &SolverMode,
            alpha: f64,
        ) {
            if let Some(dest) = loc.dest_alg.as_deref_mut() {
                for x in dest.iter_mut() {
                    *x = alpha;
                }
            }
        }

        fn jacobian_elements(
            &self,
            _sd: &StateData<'_>,
            loc: &Locations<'_>,
            md: &mut dyn Accumulator,
            _mode: &SolverMode,
        ) {
            md.assign(loc.alg_offset, loc.alg_offset, self.value);
        }
    }

    fn stamp(name: &str, alg: usize, diff: usize, value: f64) -> Component {
        Component::new(name, Box::new(Stamp { alg, diff, value }))
    }

    #[test]
    fn test_residual_writes_through_resolved_windows() {
        let mut root = Component::container("root");
        root.add_child(stamp("a", 2, 0, 1.0)).unwrap();
        root.add_child(stamp("b", 1, 0, 2.0)).unwrap();
        let pf = SolverMode::power_flow(1);
        root.set_offset(0, &pf);

        let state = [0.0; 3];
        let sd = StateData::new(0.0).with_state(&state);
        let mut resid = [9.0; 3];
        root.residual(&sd, &mut resid, &pf).unwrap();
        assert_eq!(resid, [1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_evaluation_skips_separate_and_disabled_children() {
        let mut root = Component::container("root");
        root.add_child(stamp("a", 1, 0, 1.0)).unwrap();
        root.add_child(stamp("b", 1, 0, 2.0)).unwrap();
        root.add_child(stamp("c", 1, 0, 3.0)).unwrap();
        root.child_mut("b").unwrap().set_separate_processing(true);
        root.child_mut("c").unwrap().set_enabled(false);
        let pf = SolverMode::power_flow(1);
        root.set_offset(0, &pf);

        let state = [0.0; 2];
        let sd = StateData::new(0.0).with_state(&state);
        let mut resid = [0.0; 2];
        root.residual(&sd, &mut resid, &pf).unwrap();
        assert_eq!(resid, [1.0, 0.0]);
    }

    #[test]
    fn test_derivative_targets_differential_block() {
        let mut root = Component::container("root");
        root.add_child(stamp("a", 1, 2, 4.0)).unwrap();
        let dae = SolverMode::dae(2);
        root.set_offset(0, &dae);

        let state = [0.0; 3];
        let dstate = [0.0; 3];
        let sd = StateData::new(0.0).with_state(&state).with_dstate(&dstate);
        let mut deriv = [0.0; 3];
        root.derivative(&sd, &mut deriv, &dae).unwrap();
        assert_eq!(deriv, [0.0, 4.0, 4.0]);
    }

    #[test]
    fn test_algebraic_update_passes_alpha() {
        let mut root = Component::container("root");
        root.add_child(stamp("a", 1, 0, 0.0)).unwrap();
        let pf = SolverMode::power_flow(1);
        root.set_offset(0, &pf);

        let state = [0.0; 1];
        let sd = StateData::new(0.0).with_state(&state);
        let mut update = [0.0; 1];
        root.algebraic_update(&sd, &mut update, &pf, 0.25).unwrap();
        assert_eq!(update, [0.25]);
    }

    #[test]
    fn test_jacobian_elements_accumulate_at_offsets() {
        let mut root = Component::container("root");
        root.add_child(stamp("a", 1, 0, 2.0)).unwrap();
        root.add_child(stamp("b", 1, 0, 3.0)).unwrap();
        let pf = SolverMode::power_flow(1);
        root.set_offset(0, &pf);

        let state = [0.0; 2];
        let sd = StateData::new(0.0).with_state(&state);
        let mut md = TripletList::new(2, 2);
        root.jacobian_elements(&sd, &mut md, &pf).unwrap();
        assert_eq!(md.size(), 2);
        assert_eq!(md.at(0, 0), 2.0);
        assert_eq!(md.at(1, 1), 3.0);
    }

    /// Fills its root window with a marker and records the trigger mask it
    /// receives.
    struct Rooter {
        roots: usize,
        mark: f64,
        seen: Arc<Mutex<Vec<bool>>>,
    }

    impl ComponentModel for Rooter {
        fn kind(&self) -> &str {
            "rooter"
        }

        fn local_state_sizes(&self, _flags: &ComponentFlags, _mode: &SolverMode) -> StateSizes {
            StateSizes {
                alg: 1,
                ..StateSizes::default()
            }
        }

        fn local_root_count(&self, _mode: &SolverMode) -> RootCount {
            RootCount::new(self.roots, 0)
        }

        fn root_test(
            &self,
            _sd: &StateData<'_>,
            _loc: &Locations<'_>,
            roots: &mut [f64],
            _mode: &SolverMode,
        ) {
            for r in roots.iter_mut() {
                *r = self.mark;
            }
        }

        fn root_trigger(&mut self, _time: f64, mask: &[bool], _mode: &SolverMode) {
            *self.seen.lock().unwrap() = mask.to_vec();
        }
    }

    #[test]
    fn test_root_test_and_trigger_window_per_component() {
        let seen_a = Arc::new(Mutex::new(Vec::new()));
        let seen_b = Arc::new(Mutex::new(Vec::new()));
        let mut root = Component::container("root");
        root.add_child(Component::new(
            "a",
            Box::new(Rooter {
                roots: 1,
                mark: 1.0,
                seen: Arc::clone(&seen_a),
            }),
        ))
        .unwrap();
        root.add_child(Component::new(
            "b",
            Box::new(Rooter {
                roots: 2,
                mark: 2.0,
                seen: Arc::clone(&seen_b),
            }),
        ))
        .unwrap();
        let dae = SolverMode::dae(2);
        root.set_offset(0, &dae);
        root.set_root_offset(0, &dae);
        assert_eq!(root.root_size(&dae), 3);

        let state = [0.0; 2];
        let dstate = [0.0; 2];
        let sd = StateData::new(0.0).with_state(&state).with_dstate(&dstate);
        let mut roots = [0.0; 3];
        root.root_test(&sd, &mut roots, &dae).unwrap();
        assert_eq!(roots, [1.0, 2.0, 2.0]);

        root.root_trigger(0.0, &[false, true, false], &dae);
        assert_eq!(*seen_a.lock().unwrap(), vec![false]);
        assert_eq!(*seen_b.lock().unwrap(), vec![true, false]);
    }
}
