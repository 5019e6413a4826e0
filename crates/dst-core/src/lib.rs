//! # dst-core: Component Tree and Solver Layout Core
//!
//! Provides the hierarchical component tree that simulation objects live in
//! and the offset machinery that maps each component's states into the flat
//! vectors external DAE and algebraic solvers operate on.
//!
//! ## Design Philosophy
//!
//! Simulated equipment forms a **tree of components**, each owning:
//! - A behavior model (the [`ComponentModel`] trait) that declares local
//!   state, root, and Jacobian counts and evaluates equations
//! - An [`OffsetTable`] caching, per solver mode, where the component's
//!   state blocks sit inside the global vectors
//! - Private state storage used by the local mode and as staging for
//!   state transfer
//!
//! Sizes and offsets are computed lazily and cached per [`SolverMode`].
//! Structural edits (adding or removing children, enabling or disabling a
//! subtree) bump revision counters; a cached record whose stamp no longer
//! matches the subtree's revision sum is stale and reloads on next use.
//! No notification walks are needed: ancestors notice staleness through
//! the sums alone.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dst_core::*;
//!
//! // A model with two algebraic states and one differential state.
//! struct Machine;
//!
//! impl ComponentModel for Machine {
//!     fn kind(&self) -> &str {
//!         "machine"
//!     }
//!
//!     fn local_state_sizes(&self, _flags: &ComponentFlags, _mode: &SolverMode) -> StateSizes {
//!         StateSizes {
//!             alg: 2,
//!             diff: 1,
//!             ..StateSizes::default()
//!         }
//!     }
//! }
//!
//! let mut root = Component::container("grid");
//! root.add_child(Component::new("m1", Box::new(Machine))).unwrap();
//! root.add_child(Component::new("m2", Box::new(Machine))).unwrap();
//!
//! // Lay out a DAE solver's view: all algebraic states first, then all
//! // differential states.
//! let dae = SolverMode::dae(2);
//! root.set_offset(0, &dae);
//! assert_eq!(root.state_size(&dae), 6);
//!
//! // Move the solver's vectors into private storage before evaluation.
//! let state = vec![0.0; 6];
//! let dstate = vec![0.0; 6];
//! root.set_state(0.0, &state, &dstate, &dae);
//! ```
//!
//! ## Core Data Structures
//!
//! - [`Component`] - A tree node owning a model, children, and cached layouts
//! - [`ComponentModel`] - Behavior hooks a leaf implementation provides
//! - [`SolverMode`] - Which partitions a solver sees, and its cache slot
//! - [`OffsetTable`] / [`SolverOffsets`] - Per-mode layout records
//! - [`StateData`] / [`Locations`] - Borrowed solver vectors and the
//!   per-component windows resolved out of them
//!
//! ## Modules
//!
//! - [`component`] - Tree structure, revision tracking, size loading
//! - [`locations`] - Window resolution against solver buffers
//! - [`solver`] - Size queries, state transfer, evaluation recursion
//! - [`model`] - The model trait and the kind registry
//!
//! ## Integration with dst-sparse
//!
//! Jacobian assembly feeds a [`dst_sparse::Accumulator`], so any of that
//! crate's collectors (triplet lists, bucketed compactors) can sit behind
//! [`Component::jacobian_elements`].

pub mod component;
pub mod error;
pub mod locations;
pub mod mode;
pub mod model;
pub mod offsets;
pub mod solver;
pub mod state;

pub use component::{Component, ComponentError, ComponentFlags, StructureChange};
pub use error::{DstError, DstResult};
pub use locations::{LocationError, Locations};
pub use mode::{SolverMode, DEFAULT_MODE_SLOTS, LOCAL_MODE_INDEX};
pub use model::{ComponentModel, ContainerModel, ModelRegistry, RegistryError};
pub use offsets::{LoadStamps, OffsetTable, RootCount, SolverOffsets, StateSizes};
pub use solver::{ALGEBRAIC_VARIABLE, DIFFERENTIAL_VARIABLE};
pub use state::StateData;

/// Offset value for "not assigned"; arithmetic on it stays null.
pub const NULL_LOCATION: usize = usize::MAX;

/// Lookup result for "searched and absent", distinct from unassigned.
pub const INVALID_LOCATION: usize = usize::MAX - 1;
