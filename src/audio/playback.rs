//! # Playback Scheduler
//!
//! Turns decoded response chunks into gapless sequential playback on the
//! output's clock.
//!
//! ## Scheduling Rule:
//! One scalar, `next_start_time`, tracks where the queue ends. Each unit
//! starts at `max(next_start_time, now)`:
//! - chunks arriving faster than they play are queued back to back
//! - a chunk arriving after the queue drained starts immediately
//!
//! ## Interruption:
//! Every unit in the active set is stopped, started or not, the set is
//! cleared, and `next_start_time` goes back to the clock's current time.

use crate::audio::codec::AudioFrame;
use crate::audio::device::{PlaybackHandle, PlaybackOutput};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A decoded chunk placed on the playback clock.
#[derive(Debug, Clone)]
pub struct PlaybackUnit {
    pub samples: Arc<[f32]>,
    /// Start offset on the playback clock, in seconds
    pub start: f64,
    /// Length in seconds
    pub duration: f64,
}

impl PlaybackUnit {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// What the caller needs to know about a unit it just queued.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledUnit {
    pub handle: PlaybackHandle,
    pub start: f64,
    pub duration: f64,
}

pub struct PlaybackScheduler {
    output: Box<dyn PlaybackOutput>,
    next_start_time: f64,
    active: BTreeMap<PlaybackHandle, PlaybackUnit>,
}

impl PlaybackScheduler {
    pub fn new(output: Box<dyn PlaybackOutput>) -> Self {
        let next_start_time = output.now();
        Self {
            output,
            next_start_time,
            active: BTreeMap::new(),
        }
    }

    /// Current position of the playback clock.
    pub fn now(&self) -> f64 {
        self.output.now()
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Queue a decoded frame right after everything already scheduled.
    pub fn enqueue(&mut self, frame: AudioFrame) -> ScheduledUnit {
        let duration = frame.duration_secs();
        let start = self.next_start_time.max(self.output.now());
        let unit = PlaybackUnit {
            samples: Arc::from(frame.into_samples()),
            start,
            duration,
        };
        self.next_start_time = unit.end();

        let handle = self.output.schedule_buffer(Arc::clone(&unit.samples), start);
        self.active.insert(handle, unit);

        ScheduledUnit { handle, start, duration }
    }

    /// Drop a finished unit from the active set.
    ///
    /// Returns `false` when the handle was already gone (flushed by an
    /// interruption, or completed twice).
    pub fn complete(&mut self, handle: PlaybackHandle) -> bool {
        self.active.remove(&handle).is_some()
    }

    /// Stop every scheduled unit and restart the queue at the current time.
    /// Returns how many units were cut off.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.stop_all();
        self.next_start_time = self.output.now();
        debug!(stopped, next_start_time = self.next_start_time, "Playback flushed");
        stopped
    }

    /// Stop and forget every scheduled unit.
    pub fn stop_all(&mut self) -> usize {
        let units = std::mem::take(&mut self.active);
        for handle in units.keys() {
            self.output.stop(*handle);
        }
        units.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::PlaybackDevice;
    use crate::testing::ManualPlayback;

    fn chunk(seconds: f64) -> AudioFrame {
        let rate = 24_000;
        AudioFrame::new(vec![0.1; (seconds * rate as f64) as usize], rate)
    }

    fn scheduler(playback: &ManualPlayback) -> PlaybackScheduler {
        PlaybackScheduler::new(playback.open(24_000).unwrap())
    }

    #[test]
    fn test_fast_arrivals_are_back_to_back() {
        let playback = ManualPlayback::default();
        let mut scheduler = scheduler(&playback);

        let a = scheduler.enqueue(chunk(0.5));
        let b = scheduler.enqueue(chunk(0.25));
        let c = scheduler.enqueue(chunk(0.5));

        assert_eq!(a.start, 0.0);
        assert_eq!(b.start, a.start + a.duration);
        assert_eq!(c.start, b.start + b.duration);
        assert_eq!(scheduler.next_start_time(), c.start + c.duration);
        assert_eq!(scheduler.active_len(), 3);
    }

    #[test]
    fn test_late_arrival_starts_now() {
        let playback = ManualPlayback::default();
        let mut scheduler = scheduler(&playback);

        let a = scheduler.enqueue(chunk(0.5));
        playback.advance(2.0);
        let b = scheduler.enqueue(chunk(0.5));

        assert!(b.start >= a.start + a.duration);
        assert_eq!(b.start, 2.0);
    }

    #[test]
    fn test_interrupt_stops_everything_and_resets_to_now() {
        let playback = ManualPlayback::default();
        let mut scheduler = scheduler(&playback);

        scheduler.enqueue(chunk(1.0));
        scheduler.enqueue(chunk(1.0));
        scheduler.enqueue(chunk(1.0));
        playback.advance(0.4);

        assert_eq!(scheduler.interrupt(), 3);
        assert_eq!(scheduler.active_len(), 0);
        assert_eq!(scheduler.next_start_time(), 0.4);
        assert_eq!(playback.stopped().len(), 3);

        let next = scheduler.enqueue(chunk(0.5));
        assert_eq!(next.start, 0.4);
    }

    #[test]
    fn test_complete_is_idempotent() {
        let playback = ManualPlayback::default();
        let mut scheduler = scheduler(&playback);

        let unit = scheduler.enqueue(chunk(0.1));
        assert!(scheduler.complete(unit.handle));
        assert!(!scheduler.complete(unit.handle));
        assert_eq!(scheduler.active_len(), 0);
    }

    #[test]
    fn test_completion_after_interrupt_is_ignored() {
        let playback = ManualPlayback::default();
        let mut scheduler = scheduler(&playback);

        let unit = scheduler.enqueue(chunk(0.1));
        scheduler.interrupt();
        assert!(!scheduler.complete(unit.handle));
    }
}
