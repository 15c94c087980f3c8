// SPDX-License-Identifier: CEPL-1.0
//! Frame pacing: which frame-in-flight slot is current and where in the
//! `Idle -> Recording -> Submitted -> Idle` cycle it is.
//!
//! The pacer owns no Vulkan objects, so the cycle rules live here and are
//! tested without a device.

use crate::config::MAX_FRAMES_IN_FLIGHT;

/// Result of a frame step. `OutOfDate` asks the caller to run the resize
/// protocol: wait idle, wait for a non-zero window, `resize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum FrameStatus<T> {
    Ready(T),
    OutOfDate,
}

impl<T> FrameStatus<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            FrameStatus::Ready(value) => Some(value),
            FrameStatus::OutOfDate => None,
        }
    }

    pub fn is_out_of_date(&self) -> bool {
        matches!(self, FrameStatus::OutOfDate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Recording,
    Submitted,
}

#[derive(Debug, Clone)]
pub struct FramePacer {
    frames_in_flight: usize,
    slot: usize,
    state: FrameState,
}

impl FramePacer {
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(
            (1..=MAX_FRAMES_IN_FLIGHT).contains(&frames_in_flight),
            "frames in flight must be within 1..={MAX_FRAMES_IN_FLIGHT}, got {frames_in_flight}"
        );
        FramePacer {
            frames_in_flight,
            slot: 0,
            state: FrameState::Idle,
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == FrameState::Recording
    }

    /// Panics unless the pacer is between frames.
    pub fn ensure_idle(&self) {
        assert!(
            self.state == FrameState::Idle,
            "frame slot {} is {:?}; end the current frame first",
            self.slot,
            self.state
        );
    }

    pub fn start_recording(&mut self) {
        self.ensure_idle();
        self.state = FrameState::Recording;
    }

    /// Leaves `Recording`. Panics when no frame was begun.
    pub fn finish_recording(&mut self) {
        assert!(
            self.state == FrameState::Recording,
            "end_frame called without a matching begin_frame"
        );
        self.state = FrameState::Submitted;
    }

    /// Moves to the next slot and back to `Idle`, whatever the frame's
    /// outcome was.
    pub fn advance(&mut self) {
        self.slot = (self.slot + 1) % self.frames_in_flight;
        self.state = FrameState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_frame(pacer: &mut FramePacer) {
        pacer.start_recording();
        assert!(pacer.is_recording());
        pacer.finish_recording();
        assert_eq!(pacer.state(), FrameState::Submitted);
        pacer.advance();
    }

    #[test]
    fn slot_returns_home_after_n_frames() {
        for n in [2, 3] {
            let mut pacer = FramePacer::new(n);
            let start = pacer.slot();
            let mut seen = Vec::new();
            for _ in 0..n {
                seen.push(pacer.slot());
                run_frame(&mut pacer);
            }
            assert_eq!(pacer.slot(), start, "n = {n}");
            assert_eq!(seen, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn advance_without_submit_still_cycles() {
        let mut pacer = FramePacer::new(2);
        pacer.start_recording();
        pacer.finish_recording();
        pacer.advance();
        pacer.advance();
        assert_eq!(pacer.slot(), 0);
        assert_eq!(pacer.state(), FrameState::Idle);
    }

    #[test]
    #[should_panic(expected = "end the current frame first")]
    fn second_begin_without_end_panics() {
        let mut pacer = FramePacer::new(2);
        pacer.start_recording();
        pacer.start_recording();
    }

    #[test]
    #[should_panic(expected = "without a matching begin_frame")]
    fn end_without_begin_panics() {
        FramePacer::new(2).finish_recording();
    }

    #[test]
    #[should_panic(expected = "frames in flight")]
    fn too_many_frames_in_flight_rejected() {
        FramePacer::new(MAX_FRAMES_IN_FLIGHT + 1);
    }

    #[test]
    fn status_helpers() {
        assert_eq!(FrameStatus::Ready(7).ready(), Some(7));
        assert!(FrameStatus::<()>::OutOfDate.is_out_of_date());
        assert_eq!(FrameStatus::<u8>::OutOfDate.ready(), None);
    }
}
