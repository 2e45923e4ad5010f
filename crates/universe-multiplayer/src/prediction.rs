//! Client-side prediction and reconciliation for the locally controlled actor.
//!
//! Each movement input is applied to the local mirror at once and kept in an
//! [`InputBuffer`] until the server acknowledges it. An acknowledgement resets
//! the mirror to the authoritative state and replays the inputs still pending,
//! so the prediction converges without waiting a round trip.

use std::collections::VecDeque;

use glam::DVec2;
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default maximum number of unacknowledged inputs kept for replay.
pub const DEFAULT_BUFFER_SIZE: usize = 128;

// ---------------------------------------------------------------------------
// Shared simulation
// ---------------------------------------------------------------------------

/// Applies one movement input. Server and client both call this, so a
/// prediction matches the authoritative result unless the world intervenes.
///
/// Inputs longer than `max_move` (or not finite) are rejected and leave the
/// position unchanged.
pub fn simulate_input(pos: DVec2, delta: DVec2, max_move: f64) -> DVec2 {
    if delta.length() <= max_move {
        pos + delta
    } else {
        pos
    }
}

// ---------------------------------------------------------------------------
// InputBuffer
// ---------------------------------------------------------------------------

/// One input awaiting acknowledgement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputRecord {
    /// Sequence number sent with the input.
    pub seq: u64,
    /// Requested displacement.
    pub delta: DVec2,
    /// Predicted position right after this input.
    pub predicted: DVec2,
}

/// Bounded FIFO of [`InputRecord`]s in sequence order. The oldest record is
/// evicted when full.
#[derive(Debug)]
pub struct InputBuffer {
    entries: VecDeque<InputRecord>,
    max_size: usize,
}

impl InputBuffer {
    /// Creates a buffer holding at most `max_size` records.
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Appends a record, evicting the oldest if at capacity.
    pub fn push(&mut self, record: InputRecord) {
        if self.entries.len() >= self.max_size {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    /// Drops every record with `seq <= seq`.
    pub fn discard_up_to(&mut self, seq: u64) {
        while self.entries.front().is_some_and(|r| r.seq <= seq) {
            self.entries.pop_front();
        }
    }

    /// Records in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = &InputRecord> {
        self.entries.iter()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut InputRecord> {
        self.entries.iter_mut()
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Predictor
// ---------------------------------------------------------------------------

/// Position and motion of the controlled actor.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PredictedState {
    pub pos: DVec2,
    pub motion: DVec2,
}

/// Whether inputs are awaiting acknowledgement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredictionPhase {
    /// Nothing pending; the mirror equals the last authoritative state.
    Idle,
    /// At least one input is unacknowledged.
    Predicting,
}

/// Prediction state machine for one locally controlled actor.
#[derive(Debug)]
pub struct Predictor {
    buffer: InputBuffer,
    next_seq: u64,
    last_acked: Option<u64>,
    authoritative: PredictedState,
    predicted: PredictedState,
    max_move: f64,
}

impl Predictor {
    /// Predictor starting at `pos` with the default buffer size.
    pub fn new(pos: DVec2, max_move: f64) -> Self {
        Self::with_capacity(pos, max_move, DEFAULT_BUFFER_SIZE)
    }

    /// Predictor with an explicit buffer size.
    pub fn with_capacity(pos: DVec2, max_move: f64, capacity: usize) -> Self {
        let state = PredictedState {
            pos,
            motion: DVec2::ZERO,
        };
        Self {
            buffer: InputBuffer::new(capacity),
            next_seq: 1,
            last_acked: None,
            authoritative: state,
            predicted: state,
            max_move,
        }
    }

    /// Snaps both mirrors to `pos` and forgets pending inputs. Sequence
    /// numbering continues.
    pub fn reset(&mut self, pos: DVec2) {
        let state = PredictedState {
            pos,
            motion: DVec2::ZERO,
        };
        self.authoritative = state;
        self.predicted = state;
        self.buffer = InputBuffer::new(self.buffer.max_size);
    }

    /// Records a local input and applies it to the mirror. The returned
    /// record carries the sequence number to transmit.
    pub fn pend_input(&mut self, delta: DVec2) -> InputRecord {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.predicted.pos = simulate_input(self.predicted.pos, delta, self.max_move);
        let record = InputRecord {
            seq,
            delta,
            predicted: self.predicted.pos,
        };
        self.buffer.push(record);
        trace!(seq, pending = self.buffer.len(), "input predicted");
        record
    }

    /// Reconciles against an acknowledgement for inputs up to `seq`.
    ///
    /// Returns `false` for a stale acknowledgement (older than one already
    /// applied), which leaves the mirror untouched.
    pub fn apply_ack(&mut self, seq: u64, state: PredictedState) -> bool {
        if self.last_acked.is_some_and(|last| seq < last) {
            debug!(seq, last = ?self.last_acked, "ignoring stale input ack");
            return false;
        }
        self.last_acked = Some(seq);
        self.buffer.discard_up_to(seq);
        self.authoritative = state;

        let max_move = self.max_move;
        let mut pos = state.pos;
        for record in self.buffer.iter_mut() {
            pos = simulate_input(pos, record.delta, max_move);
            record.predicted = pos;
        }
        self.predicted = PredictedState {
            pos,
            motion: state.motion,
        };
        true
    }

    /// Current phase.
    pub fn phase(&self) -> PredictionPhase {
        if self.buffer.is_empty() {
            PredictionPhase::Idle
        } else {
            PredictionPhase::Predicting
        }
    }

    /// Locally predicted state.
    pub fn predicted(&self) -> PredictedState {
        self.predicted
    }

    /// Last acknowledged authoritative state.
    pub fn authoritative(&self) -> PredictedState {
        self.authoritative
    }

    /// Inputs awaiting acknowledgement.
    pub fn pending(&self) -> &InputBuffer {
        &self.buffer
    }

    /// Highest acknowledged sequence.
    pub fn last_acked(&self) -> Option<u64> {
        self.last_acked
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn state(x: f64, y: f64) -> PredictedState {
        PredictedState {
            pos: DVec2::new(x, y),
            motion: DVec2::ZERO,
        }
    }

    #[test]
    fn test_input_applies_immediately() {
        let mut p = Predictor::new(DVec2::ZERO, 1.0);
        assert_eq!(p.phase(), PredictionPhase::Idle);
        let record = p.pend_input(DVec2::new(0.5, 0.0));
        assert_eq!(record.seq, 1);
        assert_eq!(p.predicted().pos, DVec2::new(0.5, 0.0));
        assert_eq!(p.phase(), PredictionPhase::Predicting);
    }

    #[test]
    fn test_full_ack_converges_exactly() {
        let mut p = Predictor::new(DVec2::ZERO, 1.0);
        for _ in 0..5 {
            p.pend_input(DVec2::new(0.25, 0.5));
        }
        let server = PredictedState {
            pos: DVec2::new(1.0, 2.5),
            motion: DVec2::new(0.1, 0.0),
        };
        assert!(p.apply_ack(5, server));
        assert_eq!(p.predicted(), server);
        assert_eq!(p.phase(), PredictionPhase::Idle);
    }

    #[test]
    fn test_partial_ack_replays_pending() {
        let mut p = Predictor::new(DVec2::ZERO, 1.0);
        p.pend_input(DVec2::new(1.0, 0.0));
        p.pend_input(DVec2::new(0.0, 1.0));
        p.pend_input(DVec2::new(0.0, 1.0));

        // Server blocked the first move.
        assert!(p.apply_ack(1, state(0.0, 0.0)));
        assert_eq!(p.pending().len(), 2);
        assert_eq!(p.predicted().pos, DVec2::new(0.0, 2.0));
        let replayed: Vec<DVec2> = p.pending().iter().map(|r| r.predicted).collect();
        assert_eq!(replayed, vec![DVec2::new(0.0, 1.0), DVec2::new(0.0, 2.0)]);
    }

    #[test]
    fn test_stale_ack_is_ignored() {
        let mut p = Predictor::new(DVec2::ZERO, 1.0);
        for _ in 0..3 {
            p.pend_input(DVec2::X);
        }
        assert!(p.apply_ack(2, state(2.0, 0.0)));
        let before = p.predicted();
        assert!(!p.apply_ack(1, state(-9.0, -9.0)));
        assert_eq!(p.predicted(), before);
        assert_eq!(p.last_acked(), Some(2));
    }

    #[test]
    fn test_repeated_ack_reapplies_state() {
        let mut p = Predictor::new(DVec2::ZERO, 1.0);
        p.pend_input(DVec2::X);
        assert!(p.apply_ack(1, state(1.0, 0.0)));
        // Knockback after the last input: same seq, new state.
        assert!(p.apply_ack(1, state(1.75, 0.0)));
        assert_eq!(p.predicted().pos, DVec2::new(1.75, 0.0));
    }

    #[test]
    fn test_oversized_input_predicts_no_movement() {
        let mut p = Predictor::new(DVec2::new(3.0, 3.0), 1.0);
        p.pend_input(DVec2::new(5.0, 0.0));
        assert_eq!(p.predicted().pos, DVec2::new(3.0, 3.0));
        assert_eq!(simulate_input(DVec2::ZERO, DVec2::new(f64::NAN, 0.0), 1.0), DVec2::ZERO);
    }

    #[test]
    fn test_buffer_size_is_bounded() {
        let mut p = Predictor::with_capacity(DVec2::ZERO, 1.0, 4);
        for _ in 0..10 {
            p.pend_input(DVec2::X);
        }
        assert_eq!(p.pending().len(), 4);
        assert_eq!(p.pending().iter().next().map(|r| r.seq), Some(7));
    }

    #[test]
    fn test_reset_clears_pending_but_keeps_numbering() {
        let mut p = Predictor::new(DVec2::ZERO, 1.0);
        p.pend_input(DVec2::X);
        p.reset(DVec2::new(4.0, 4.0));
        assert_eq!(p.phase(), PredictionPhase::Idle);
        assert_eq!(p.predicted().pos, DVec2::new(4.0, 4.0));
        assert_eq!(p.pend_input(DVec2::ZERO).seq, 2);
    }
}
