//! Borrowed solver buffers for one evaluation call.

/// Read-only view of a solver's working buffers.
///
/// Every buffer is optional: a solver hands over only what its mode owns
/// and the location resolver covers the rest from private storage or a
/// paired mode's buffers. A carrier without a `state` buffer is empty and
/// makes every resolution fall back to private storage.
#[derive(Debug, Clone, Copy)]
pub struct StateData<'a> {
    /// Solver time for this evaluation.
    pub time: f64,
    /// Evaluation sequence number; equal numbers mean unchanged buffers.
    pub seq_id: u64,
    /// Derivative weighting factor supplied by implicit integrators.
    pub cj: f64,
    /// The mode's own state vector.
    pub state: Option<&'a [f64]>,
    /// Time derivatives aligned with the differential block.
    pub dstate_dt: Option<&'a [f64]>,
    /// Complete combined state, when a partitioned solve keeps one.
    pub full_state: Option<&'a [f64]>,
    /// Differential partition kept by the paired mode.
    pub diff_state: Option<&'a [f64]>,
    /// Algebraic partition kept by the paired mode.
    pub alg_state: Option<&'a [f64]>,
    /// Offset-table slot of the paired mode's layout.
    pub pair_index: Option<usize>,
    /// Time of the paired partition's last update.
    pub alt_time: f64,
}

impl Default for StateData<'_> {
    fn default() -> Self {
        Self {
            time: 0.0,
            seq_id: 0,
            cj: 1.0,
            state: None,
            dstate_dt: None,
            full_state: None,
            diff_state: None,
            alg_state: None,
            pair_index: None,
            alt_time: 0.0,
        }
    }
}

impl<'a> StateData<'a> {
    pub fn new(time: f64) -> Self {
        Self {
            time,
            ..Self::default()
        }
    }

    /// No state buffer at all; resolution falls back to private storage.
    pub fn is_empty(&self) -> bool {
        self.state.is_none()
    }

    pub fn with_state(mut self, state: &'a [f64]) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_dstate(mut self, dstate_dt: &'a [f64]) -> Self {
        self.dstate_dt = Some(dstate_dt);
        self
    }

    pub fn with_full_state(mut self, full_state: &'a [f64]) -> Self {
        self.full_state = Some(full_state);
        self
    }

    pub fn with_diff_state(mut self, diff_state: &'a [f64]) -> Self {
        self.diff_state = Some(diff_state);
        self
    }

    pub fn with_alg_state(mut self, alg_state: &'a [f64]) -> Self {
        self.alg_state = Some(alg_state);
        self
    }

    /// Point single-partition resolution at the paired mode's slot.
    pub fn with_pair(mut self, index: usize) -> Self {
        self.pair_index = Some(index);
        self
    }

    pub fn with_cj(mut self, cj: f64) -> Self {
        self.cj = cj;
        self
    }

    pub fn with_seq_id(mut self, seq_id: u64) -> Self {
        self.seq_id = seq_id;
        self
    }
}
