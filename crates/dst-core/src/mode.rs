//! Solver mode descriptors.
//!
//! A mode names which state partitions a solver works with (algebraic,
//! differential, or both), whether it runs dynamic calculations, and which
//! slot of each component's offset table caches the layout computed for
//! it. Components answer every size and offset question relative to a
//! mode.
//!
//! Five standard flavors exist: local (private per-component storage),
//! power flow, DAE, and the algebraic/differential halves of a partitioned
//! dynamic solve. The two halves can be paired so that each resolves the
//! partition it lacks through the other's layout.

use crate::NULL_LOCATION;
use serde::{Deserialize, Serialize};

/// Offset-table slot reserved for the local mode.
pub const LOCAL_MODE_INDEX: usize = 0;

/// Offset-table slots preallocated for the standard mode set.
pub const DEFAULT_MODE_SLOTS: usize = 5;

/// Identifies one solver's view of the state vector.
///
/// The identity of a mode is its flag set: two modes with equal flags
/// describe the same layout even when their container slots differ. The
/// slot fields say where that layout is cached, not what it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverMode {
    /// Dynamic calculation; time derivatives are meaningful.
    pub dynamic: bool,
    /// The mode carries the algebraic partition.
    pub algebraic: bool,
    /// The mode carries the differential partition.
    pub differential: bool,
    /// Private per-component storage instead of a global state vector.
    pub local: bool,
    /// Extended-state variant (no standard slot).
    pub extended_state: bool,
    /// Offset-table slot holding this mode's cached layout.
    pub offset_index: usize,
    /// Slot of the paired mode that supplies the missing partition, for
    /// single-partition dynamic modes.
    pub paired_offset_index: Option<usize>,
}

impl SolverMode {
    /// Private storage on every component; both partitions.
    pub fn local() -> Self {
        Self {
            dynamic: false,
            algebraic: true,
            differential: true,
            local: true,
            extended_state: false,
            offset_index: LOCAL_MODE_INDEX,
            paired_offset_index: None,
        }
    }

    /// Blank mode: matches nothing, addresses nothing.
    pub fn empty() -> Self {
        Self {
            dynamic: false,
            algebraic: false,
            differential: false,
            local: false,
            extended_state: false,
            offset_index: NULL_LOCATION,
            paired_offset_index: None,
        }
    }

    /// Steady-state algebraic solve.
    pub fn power_flow(offset_index: usize) -> Self {
        Self {
            dynamic: false,
            algebraic: true,
            differential: false,
            local: false,
            extended_state: false,
            offset_index,
            paired_offset_index: None,
        }
    }

    /// Combined differential-algebraic solve.
    pub fn dae(offset_index: usize) -> Self {
        Self {
            dynamic: true,
            algebraic: true,
            differential: true,
            local: false,
            extended_state: false,
            offset_index,
            paired_offset_index: None,
        }
    }

    /// Algebraic half of a partitioned dynamic solve.
    pub fn dynamic_algebraic(offset_index: usize) -> Self {
        Self {
            dynamic: true,
            algebraic: true,
            differential: false,
            local: false,
            extended_state: false,
            offset_index,
            paired_offset_index: None,
        }
    }

    /// Differential half of a partitioned dynamic solve.
    pub fn dynamic_differential(offset_index: usize) -> Self {
        Self {
            dynamic: true,
            algebraic: false,
            differential: true,
            local: false,
            extended_state: false,
            offset_index,
            paired_offset_index: None,
        }
    }

    /// Pair with the slot that supplies the missing partition.
    pub fn with_paired(mut self, index: usize) -> Self {
        self.paired_offset_index = Some(index);
        self
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn has_algebraic(&self) -> bool {
        self.algebraic
    }

    pub fn has_differential(&self) -> bool {
        self.differential
    }

    /// Both partitions in one dynamic solve.
    pub fn is_dae(&self) -> bool {
        self.dynamic && self.algebraic && self.differential
    }

    pub fn is_algebraic_only(&self) -> bool {
        self.algebraic && !self.differential
    }

    pub fn is_differential_only(&self) -> bool {
        self.differential && !self.algebraic
    }

    /// Flag-set identity; container slots do not participate.
    pub fn same_identity(&self, other: &SolverMode) -> bool {
        self.dynamic == other.dynamic
            && self.local == other.local
            && self.algebraic == other.algebraic
            && self.differential == other.differential
            && self.extended_state == other.extended_state
    }
}

impl Default for SolverMode {
    fn default() -> Self {
        Self::local()
    }
}
