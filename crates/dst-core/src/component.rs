//! The component tree.
//!
//! A [`Component`] owns its children outright and delegates leaf behavior
//! to a boxed [`ComponentModel`]. There are no parent back-pointers:
//! staleness flows upward through revision arithmetic instead. Every
//! component keeps three monotonic counters (state, root, Jacobian); a
//! cached size record stores the subtree's counter sum at load time, and
//! is current exactly while that sum is unchanged. Any structural change
//! below a component therefore invalidates every record above it without
//! a single notification.
//!
//! Size loading and offset assignment both recurse depth-first over
//! enabled children. Offsets tile sibling subtrees left to right with a
//! running cursor per block, so sibling ranges never overlap and appear
//! in child order.

use crate::mode::SolverMode;
use crate::model::{ComponentModel, ContainerModel};
use crate::offsets::{LoadStamps, OffsetTable, SolverOffsets, StateSizes};
use crate::NULL_LOCATION;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, trace};

/// Structural errors raised synchronously by tree edits
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComponentError {
    /// The parent's model refused the child kind.
    #[error("component '{parent}' does not accept children of kind '{kind}'")]
    ChildRejected { parent: String, kind: String },

    #[error("duplicate child name '{0}'")]
    DuplicateName(String),

    #[error("no child named '{0}'")]
    ChildNotFound(String),
}

/// Operational flags gating a component's participation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentFlags {
    /// Measurement-style component: no states under dynamic modes, and
    /// skipped entirely in subtree aggregation.
    pub sampled_only: bool,
    /// Contributes nothing under non-dynamic modes.
    pub no_powerflow_operations: bool,
    /// Handled by a separate pass; evaluation recursions skip it.
    pub separate_processing: bool,
}

/// Categories of structural change, for targeted invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureChange {
    /// State variable counts changed.
    StateCount,
    /// Root function counts changed.
    RootCount,
    /// Jacobian entry counts changed.
    JacobianCount,
    /// Children added, removed, enabled, or disabled.
    ObjectCount,
}

/// Monotonic structure counters, one per size category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Revisions {
    pub state: u64,
    pub root: u64,
    pub jacobian: u64,
}

impl Revisions {
    fn new() -> Self {
        Self {
            state: 1,
            root: 1,
            jacobian: 1,
        }
    }

    fn absorb(&mut self, other: Revisions) {
        self.state += other.state;
        self.root += other.root;
        self.jacobian += other.jacobian;
    }
}

/// One node of the simulation tree.
pub struct Component {
    pub(crate) name: String,
    pub(crate) enabled: bool,
    pub(crate) flags: ComponentFlags,
    pub(crate) offsets: OffsetTable,
    /// Private storage, laid out `[algebraic | differential]` by the
    /// local-mode sizes.
    pub(crate) state: Vec<f64>,
    pub(crate) dstate_dt: Vec<f64>,
    pub(crate) prev_time: f64,
    pub(crate) revisions: Revisions,
    pub(crate) children: Vec<Component>,
    pub(crate) model: Box<dyn ComponentModel>,
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("kind", &self.model.kind())
            .field("enabled", &self.enabled)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl Component {
    pub fn new(name: impl Into<String>, model: Box<dyn ComponentModel>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            flags: ComponentFlags::default(),
            offsets: OffsetTable::new(),
            state: Vec::new(),
            dstate_dt: Vec::new(),
            prev_time: 0.0,
            revisions: Revisions::new(),
            children: Vec::new(),
            model,
        }
    }

    /// Pure grouping node with no model behavior.
    pub fn container(name: impl Into<String>) -> Self {
        Self::new(name, Box::new(ContainerModel))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn flags(&self) -> &ComponentFlags {
        &self.flags
    }

    pub fn model(&self) -> &dyn ComponentModel {
        self.model.as_ref()
    }

    pub fn children(&self) -> &[Component] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&Component> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Component> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Depth-first lookup by name, this component included.
    pub fn find_descendant(&self, name: &str) -> Option<&Component> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_descendant(name))
    }

    /// Attach a child, gated by the model and by name uniqueness.
    pub fn add_child(&mut self, child: Component) -> Result<(), ComponentError> {
        if self.children.iter().any(|c| c.name == child.name) {
            return Err(ComponentError::DuplicateName(child.name.clone()));
        }
        if !self.model.accepts_child(child.model.kind()) {
            return Err(ComponentError::ChildRejected {
                parent: self.name.clone(),
                kind: child.model.kind().to_string(),
            });
        }
        debug!(parent = %self.name, child = %child.name, "adding child");
        self.children.push(child);
        self.invalidate(StructureChange::ObjectCount);
        Ok(())
    }

    /// Detach and return the named child.
    pub fn remove_child(&mut self, name: &str) -> Option<Component> {
        let pos = self.children.iter().position(|c| c.name == name)?;
        let child = self.children.remove(pos);
        debug!(parent = %self.name, child = %child.name, "removing child");
        // fold the departed subtree's counters in so revision sums never
        // move backwards
        self.revisions.absorb(child.subtree_revisions());
        self.invalidate(StructureChange::ObjectCount);
        Some(child)
    }

    /// Swap the named child for `replacement`, returning the old one.
    pub fn replace_child(
        &mut self,
        name: &str,
        replacement: Component,
    ) -> Result<Component, ComponentError> {
        if !self.model.accepts_child(replacement.model.kind()) {
            return Err(ComponentError::ChildRejected {
                parent: self.name.clone(),
                kind: replacement.model.kind().to_string(),
            });
        }
        let pos = self
            .children
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| ComponentError::ChildNotFound(name.to_string()))?;
        let old = std::mem::replace(&mut self.children[pos], replacement);
        self.revisions.absorb(old.subtree_revisions());
        self.invalidate(StructureChange::ObjectCount);
        Ok(old)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.invalidate(StructureChange::ObjectCount);
        }
    }

    pub fn set_sampled_only(&mut self, value: bool) {
        if self.flags.sampled_only != value {
            self.flags.sampled_only = value;
            self.invalidate(StructureChange::StateCount);
        }
    }

    pub fn set_no_powerflow_operations(&mut self, value: bool) {
        if self.flags.no_powerflow_operations != value {
            self.flags.no_powerflow_operations = value;
            self.invalidate(StructureChange::StateCount);
        }
    }

    /// No size impact: evaluation recursions consult this flag directly.
    pub fn set_separate_processing(&mut self, value: bool) {
        self.flags.separate_processing = value;
    }

    /// Record a structural change of the given category.
    ///
    /// Bumps the matching revision counters and drops this component's own
    /// cached records. Ancestors need no notification: their stored stamps
    /// stop matching the new subtree sums on their own.
    pub fn invalidate(&mut self, change: StructureChange) {
        debug!(component = %self.name, ?change, "structure changed");
        match change {
            StructureChange::StateCount => {
                self.revisions.state += 1;
                self.revisions.jacobian += 1;
                self.offsets.state_unload(false);
                self.offsets.jacobian_unload(true);
            }
            StructureChange::RootCount => {
                self.revisions.root += 1;
                self.offsets.root_unload(true);
            }
            StructureChange::JacobianCount => {
                self.revisions.jacobian += 1;
                self.offsets.jacobian_unload(true);
            }
            StructureChange::ObjectCount => {
                self.revisions.state += 1;
                self.revisions.root += 1;
                self.revisions.jacobian += 1;
                self.offsets.state_unload(false);
                self.offsets.root_unload(true);
                self.offsets.jacobian_unload(true);
            }
        }
    }

    /// Counter sums over this component and everything below it.
    pub(crate) fn subtree_revisions(&self) -> Revisions {
        let mut sum = self.revisions;
        for child in &self.children {
            sum.absorb(child.subtree_revisions());
        }
        sum
    }

    /// Load (or reuse) the state size record for `mode`.
    pub fn load_state_sizes(&mut self, mode: &SolverMode) {
        if mode.offset_index == NULL_LOCATION {
            return;
        }
        let rev = self.subtree_revisions();
        if self
            .offsets
            .get(mode)
            .is_some_and(|rec| rec.is_state_loaded(rev.state))
        {
            return;
        }
        trace!(component = %self.name, slot = mode.offset_index, "loading state sizes");

        if !self.enabled {
            let rec = self.offsets.get_mut(mode);
            rec.local.reset();
            rec.total.reset();
            rec.stamps = LoadStamps {
                state: rev.state,
                root: rev.root,
                jacobian: rev.jacobian,
            };
            return;
        }
        if !mode.is_dynamic() && self.flags.no_powerflow_operations {
            let rec = self.offsets.get_mut(mode);
            rec.local.reset_state();
            rec.total.reset_state();
            rec.stamps.state = rev.state;
            return;
        }
        if mode.is_dynamic() && self.flags.sampled_only {
            let rec = self.offsets.get_mut(mode);
            rec.local.reset_state();
            rec.total.reset_state();
            rec.stamps.state = rev.state;
            return;
        }

        if !mode.is_local() {
            let rec = self.offsets.get_mut(mode);
            rec.local.reset_state();
            rec.total.reset_state();
        }
        let self_sizes = self.model.local_state_sizes(&self.flags, mode);
        {
            let rec = self.offsets.get_mut(mode);
            if mode.has_algebraic() {
                rec.local.a = self_sizes.a;
                rec.local.v = self_sizes.v;
                rec.local.alg = self_sizes.alg;
            }
            if mode.has_differential() {
                rec.local.diff = self_sizes.diff;
            }
        }
        if self.flags.sampled_only {
            if mode.is_local() {
                for child in &mut self.children {
                    child.set_sampled_only(true);
                }
            } else {
                // a sampled subtree holds no global states in any solve
                let rec = self.offsets.get_mut(mode);
                rec.local.reset_state();
                rec.total.reset_state();
                rec.stamps.state = rev.state;
                return;
            }
        }

        if self.children.is_empty() {
            let rec = self.offsets.get_mut(mode);
            rec.local_state_load();
            rec.stamps.state = rev.state;
        } else {
            let mut aggregate = StateSizes::default();
            for child in &mut self.children {
                if !child.enabled {
                    continue;
                }
                child.load_state_sizes(mode);
                if child.flags.sampled_only {
                    continue;
                }
                if let Some(child_rec) = child.offsets.get(mode) {
                    aggregate.add_state(&child_rec.total);
                }
            }
            let rec = self.offsets.get_mut(mode);
            rec.local_state_load();
            rec.total.add_state(&aggregate);
            rec.stamps.state = rev.state;
        }
    }

    /// Load (or reuse) the root count record for `mode`.
    ///
    /// Roots only exist under dynamic modes; everything else loads zero.
    pub fn load_root_sizes(&mut self, mode: &SolverMode) {
        if mode.offset_index == NULL_LOCATION {
            return;
        }
        let rev = self.subtree_revisions();
        if self
            .offsets
            .get(mode)
            .is_some_and(|rec| rec.is_root_loaded(rev.root))
        {
            return;
        }
        trace!(component = %self.name, slot = mode.offset_index, "loading root sizes");

        if !self.enabled || !mode.is_dynamic() {
            let rec = self.offsets.get_mut(mode);
            rec.local.reset_roots();
            rec.total.reset_roots();
            rec.stamps.root = rev.root;
            return;
        }

        let counts = self.model.local_root_count(mode);
        {
            let rec = self.offsets.get_mut(mode);
            rec.local.alg_roots = counts.alg;
            rec.local.diff_roots = counts.diff;
        }
        let mut aggregate = StateSizes::default();
        for child in &mut self.children {
            if !child.enabled {
                continue;
            }
            child.load_root_sizes(mode);
            if child.flags.sampled_only {
                continue;
            }
            if let Some(child_rec) = child.offsets.get(mode) {
                aggregate.add_roots(&child_rec.total);
            }
        }
        let rec = self.offsets.get_mut(mode);
        rec.local_root_load();
        rec.total.add_roots(&aggregate);
        rec.stamps.root = rev.root;
    }

    /// Load (or reuse) the Jacobian count record for `mode`.
    pub fn load_jacobian_sizes(&mut self, mode: &SolverMode) {
        if mode.offset_index == NULL_LOCATION {
            return;
        }
        let rev = self.subtree_revisions();
        if self
            .offsets
            .get(mode)
            .is_some_and(|rec| rec.is_jacobian_loaded(rev.jacobian))
        {
            return;
        }
        trace!(component = %self.name, slot = mode.offset_index, "loading jacobian sizes");

        if !self.enabled {
            let rec = self.offsets.get_mut(mode);
            rec.local.reset_jacobian();
            rec.total.reset_jacobian();
            rec.stamps.jacobian = rev.jacobian;
            return;
        }

        let count = self.model.local_jacobian_count(mode);
        {
            let rec = self.offsets.get_mut(mode);
            rec.local.jac = count;
        }
        let mut aggregate = StateSizes::default();
        for child in &mut self.children {
            if !child.enabled {
                continue;
            }
            child.load_jacobian_sizes(mode);
            if child.flags.sampled_only {
                continue;
            }
            if let Some(child_rec) = child.offsets.get(mode) {
                aggregate.add_jacobian(&child_rec.total);
            }
        }
        let rec = self.offsets.get_mut(mode);
        rec.local_jacobian_load();
        rec.total.add_jacobian(&aggregate);
        rec.stamps.jacobian = rev.jacobian;
    }

    /// Assign block offsets from a seed record.
    ///
    /// The component takes the seed's offsets for its own record first,
    /// then tiles enabled children with a running cursor: seeded past the
    /// component's own sizes, advanced past each child subtree in order.
    /// Algebraic and differential cursors move independently.
    pub fn set_offsets(&mut self, seed: &SolverOffsets, mode: &SolverMode) {
        self.load_state_sizes(mode);
        {
            let rec = self.offsets.get_mut(mode);
            rec.set_block_offsets(seed);
        }
        let mut cursor = seed.clone();
        if let Some(own) = self.offsets.get(mode) {
            cursor.local_increment(own);
        }
        for child in &mut self.children {
            if !child.enabled {
                continue;
            }
            child.set_offsets(&cursor, mode);
            if let Some(child_rec) = child.offsets.get(mode) {
                cursor.increment(child_rec);
            }
        }
    }

    /// Assign offsets from a single base index.
    ///
    /// Lays the subtree's regions out contiguously from `base` (angle,
    /// voltage, algebraic, differential) and tiles the tree from there.
    pub fn set_offset(&mut self, base: usize, mode: &SolverMode) {
        debug!(component = %self.name, base, slot = mode.offset_index, "assigning offsets");
        self.load_state_sizes(mode);
        let seed = {
            let rec = self.offsets.get_mut(mode);
            rec.set_base(base);
            rec.clone()
        };
        self.set_offsets(&seed, mode);
    }

    /// Assign root indices from `base`: own roots first, then each enabled
    /// child subtree in order.
    pub fn set_root_offset(&mut self, base: usize, mode: &SolverMode) {
        self.load_root_sizes(mode);
        {
            let rec = self.offsets.get_mut(mode);
            rec.root_offset = base;
        }
        let mut cursor = base
            + self
                .offsets
                .get(mode)
                .map_or(0, |rec| rec.local.total_roots());
        for child in &mut self.children {
            if !child.enabled {
                continue;
            }
            child.set_root_offset(cursor, mode);
            cursor += child
                .offsets
                .get(mode)
                .map_or(0, |rec| rec.total.total_roots());
        }
    }

    /// Size private storage to the local-mode layout.
    pub(crate) fn ensure_private_storage(&mut self) {
        self.load_state_sizes(&SolverMode::local());
        let rec = self.offsets.local();
        let n = rec.local.alg + rec.local.diff;
        if self.state.len() != n {
            self.state.resize(n, 0.0);
            self.dstate_dt.resize(n, 0.0);
        }
    }
}
