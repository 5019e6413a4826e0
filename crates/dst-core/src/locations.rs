//! Per-call resolution of state buffer views.
//!
//! Leaf models never track their own global offsets. Each evaluation call
//! hands them a [`Locations`]: borrowed slices over the caller's flat
//! buffers (or the component's private storage), already positioned at the
//! component's blocks for the active mode. Views are rebuilt on every call
//! and never cached; offsets move whenever the tree is relaid.
//!
//! Resolution branches on the mode:
//!
//! * local mode, or no state buffer supplied: views fall back to the
//!   component's private storage, laid out `[algebraic | differential]`,
//!   with offsets defaulting to that layout when unassigned
//! * full DAE: both partitions and the derivative slice into the caller's
//!   buffers at the record's offsets
//! * algebraic-only: the algebraic view resolves normally; the
//!   differential view comes from the paired mode's record when the state
//!   data names one, and from private storage otherwise
//! * differential-only: the mirror image
//!
//! Destination views exist only for the partitions the mode carries, so a
//! write to the missing partition is unrepresentable rather than silently
//! misdirected.

use crate::component::Component;
use crate::mode::SolverMode;
use crate::offsets::SolverOffsets;
use crate::state::StateData;
use crate::NULL_LOCATION;
use thiserror::Error;

/// A buffer the mode requires was not supplied in the state data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("state data is missing the required '{0}' buffer")]
    MissingBuffer(&'static str),
}

/// Resolved views for one component under one mode.
#[derive(Debug)]
pub struct Locations<'a> {
    /// Evaluation time; the component's last known time when resolving
    /// against private storage.
    pub time: f64,
    /// Flat index of the subtree's algebraic block.
    pub alg_offset: usize,
    /// Flat index of the subtree's differential block.
    pub diff_offset: usize,
    pub alg_size: usize,
    pub diff_size: usize,
    /// Algebraic states, sliced to the subtree's block.
    pub alg_state: &'a [f64],
    /// Differential states.
    pub diff_state: &'a [f64],
    /// Derivatives of the differential states.
    pub dstate: &'a [f64],
    /// Write target for algebraic output; absent when the mode carries no
    /// algebraic partition.
    pub dest_alg: Option<&'a mut [f64]>,
    /// Write target for differential output.
    pub dest_diff: Option<&'a mut [f64]>,
}

impl Default for Locations<'_> {
    fn default() -> Self {
        Self {
            time: 0.0,
            alg_offset: NULL_LOCATION,
            diff_offset: NULL_LOCATION,
            alg_size: 0,
            diff_size: 0,
            alg_state: &[],
            diff_state: &[],
            dstate: &[],
            dest_alg: None,
            dest_diff: None,
        }
    }
}

/// Slice `len` values starting at `offset`, clipped to the buffer.
///
/// A [`NULL_LOCATION`] or out-of-range offset yields an empty view, which
/// reads as zero contribution downstream.
pub(crate) fn window(buf: &[f64], offset: usize, len: usize) -> &[f64] {
    if offset >= buf.len() {
        return &[];
    }
    let end = offset.saturating_add(len).min(buf.len());
    &buf[offset..end]
}

pub(crate) fn window_mut(buf: &mut [f64], offset: usize, len: usize) -> &mut [f64] {
    if offset >= buf.len() {
        return &mut [];
    }
    let end = offset.saturating_add(len).min(buf.len());
    &mut buf[offset..end]
}

/// Carve two disjoint mutable windows out of one destination buffer.
///
/// The layout guarantees the algebraic and differential blocks never
/// overlap; if a malformed record says otherwise, the earlier window is
/// clipped at the later one's start.
fn split_windows(
    dest: &mut [f64],
    alg: (usize, usize),
    diff: (usize, usize),
) -> (&mut [f64], &mut [f64]) {
    let (alg_off, alg_len) = alg;
    let (diff_off, diff_len) = diff;
    if alg_off >= dest.len() || alg_len == 0 {
        return (&mut [], window_mut(dest, diff_off, diff_len));
    }
    if diff_off >= dest.len() || diff_len == 0 {
        return (window_mut(dest, alg_off, alg_len), &mut []);
    }
    if alg_off <= diff_off {
        let (lo, hi) = dest.split_at_mut(diff_off);
        (window_mut(lo, alg_off, alg_len), window_mut(hi, 0, diff_len))
    } else {
        let (lo, hi) = dest.split_at_mut(alg_off);
        (window_mut(hi, 0, alg_len), window_mut(lo, diff_off, diff_len))
    }
}

fn private_alg_start(rec: &SolverOffsets) -> usize {
    if rec.alg_offset != NULL_LOCATION {
        rec.alg_offset
    } else {
        0
    }
}

fn private_diff_start(rec: &SolverOffsets) -> usize {
    if rec.diff_offset != NULL_LOCATION {
        rec.diff_offset
    } else {
        rec.total.alg
    }
}

impl Component {
    /// Read-only views for `mode`. See the module docs for the branch
    /// rules.
    pub fn resolve_locations<'a>(
        &'a self,
        sd: &StateData<'a>,
        mode: &SolverMode,
    ) -> Result<Locations<'a>, LocationError> {
        let Some(rec) = self.offsets.get(mode) else {
            // untouched slot: zero contribution
            return Ok(Locations::default());
        };
        let mut loc = Locations {
            alg_offset: rec.alg_offset,
            diff_offset: rec.diff_offset,
            alg_size: rec.total.alg,
            diff_size: rec.total.diff,
            ..Locations::default()
        };

        if mode.is_local() || sd.is_empty() {
            self.resolve_private(&mut loc);
        } else if mode.is_dae() {
            loc.time = sd.time;
            let state = sd.state.ok_or(LocationError::MissingBuffer("state"))?;
            let dstate = sd
                .dstate_dt
                .ok_or(LocationError::MissingBuffer("dstate_dt"))?;
            loc.alg_state = window(state, loc.alg_offset, loc.alg_size);
            loc.diff_state = window(state, loc.diff_offset, loc.diff_size);
            loc.dstate = window(dstate, loc.diff_offset, loc.diff_size);
        } else if mode.has_algebraic() {
            loc.time = sd.time;
            let state = sd
                .state
                .or(sd.alg_state)
                .ok_or(LocationError::MissingBuffer("state"))?;
            loc.alg_state = window(state, loc.alg_offset, loc.alg_size);
            match sd.pair_index {
                Some(pair) if mode.is_dynamic() => {
                    let (pair_diff, pair_len) = self
                        .offsets
                        .slot(pair)
                        .map_or((NULL_LOCATION, 0), |p| (p.diff_offset, p.total.diff));
                    if let Some(diff_src) = sd.diff_state.or(sd.full_state) {
                        loc.diff_state = window(diff_src, pair_diff, pair_len);
                    }
                    let dstate = sd
                        .dstate_dt
                        .ok_or(LocationError::MissingBuffer("dstate_dt"))?;
                    loc.dstate = window(dstate, pair_diff, pair_len);
                }
                _ => {
                    let local_rec = self.offsets.local();
                    let start = private_diff_start(local_rec);
                    let len = local_rec.total.diff;
                    loc.diff_state = window(&self.state, start, len);
                    loc.dstate = window(&self.dstate_dt, start, len);
                }
            }
        } else if mode.has_differential() {
            loc.time = sd.time;
            let state = sd
                .state
                .or(sd.diff_state)
                .ok_or(LocationError::MissingBuffer("state"))?;
            let dstate = sd
                .dstate_dt
                .ok_or(LocationError::MissingBuffer("dstate_dt"))?;
            loc.diff_state = window(state, loc.diff_offset, loc.diff_size);
            loc.dstate = window(dstate, loc.diff_offset, loc.diff_size);
            if let Some(pair) = sd.pair_index {
                let (pair_alg, pair_len) = self
                    .offsets
                    .slot(pair)
                    .map_or((NULL_LOCATION, 0), |p| (p.alg_offset, p.total.alg));
                let alg_src = sd
                    .alg_state
                    .or(sd.full_state)
                    .ok_or(LocationError::MissingBuffer("alg_state"))?;
                loc.alg_state = window(alg_src, pair_alg, pair_len);
            } else {
                let local_rec = self.offsets.local();
                let start = private_alg_start(local_rec);
                loc.alg_state = window(&self.state, start, local_rec.total.alg);
            }
        } else {
            self.resolve_private(&mut loc);
        }
        Ok(loc)
    }

    /// Views plus destination windows carved from `dest`.
    pub fn resolve_locations_mut<'a>(
        &'a self,
        sd: &StateData<'a>,
        dest: &'a mut [f64],
        mode: &SolverMode,
    ) -> Result<Locations<'a>, LocationError> {
        let mut loc = self.resolve_locations(sd, mode)?;
        if mode.is_local() || sd.is_empty() {
            wire_private_dest(&mut loc, dest);
        } else if mode.is_dae() {
            let (alg, diff) = split_windows(
                dest,
                (loc.alg_offset, loc.alg_size),
                (loc.diff_offset, loc.diff_size),
            );
            loc.dest_alg = Some(alg);
            loc.dest_diff = Some(diff);
        } else if mode.has_algebraic() {
            loc.dest_alg = Some(window_mut(dest, loc.alg_offset, loc.alg_size));
        } else if mode.has_differential() {
            loc.dest_diff = Some(window_mut(dest, loc.diff_offset, loc.diff_size));
        } else {
            wire_private_dest(&mut loc, dest);
        }
        Ok(loc)
    }

    /// Point the views at private storage, with layout-default offsets.
    fn resolve_private<'a>(&'a self, loc: &mut Locations<'a>) {
        loc.time = self.prev_time;
        let boundary = loc.alg_size.min(self.state.len());
        loc.alg_state = &self.state[..boundary];
        loc.diff_state = window(&self.state, boundary, loc.diff_size);
        loc.dstate = window(&self.dstate_dt, boundary, loc.diff_size);
        if loc.alg_offset == NULL_LOCATION {
            loc.alg_offset = 0;
        }
        if loc.diff_offset == NULL_LOCATION {
            loc.diff_offset = loc.alg_size;
        }
    }
}

/// Destination laid out `[algebraic | differential]` from the start of
/// `dest`, mirroring the private storage layout.
fn wire_private_dest<'a>(loc: &mut Locations<'a>, dest: &'a mut [f64]) {
    let boundary = loc.alg_size.min(dest.len());
    let (alg, diff) = dest.split_at_mut(boundary);
    let diff_len = loc.diff_size.min(diff.len());
    loc.dest_alg = Some(alg);
    loc.dest_diff = Some(&mut diff[..diff_len]);
}
