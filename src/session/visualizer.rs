//! # Level Visualizer
//!
//! Cosmetic amplitude bars for the UI. Bar heights follow the loudness of
//! the latest captured frame, shaped by a slowly moving wave so the meter
//! animates even when the level is steady.

use std::f32::consts::TAU;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualizerConfig {
    pub bars: usize,
    pub interval: Duration,
    /// Lowest bar value (inclusive)
    pub floor: u32,
    /// Highest bar value (exclusive)
    pub ceiling: u32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            bars: 20,
            interval: Duration::from_millis(100),
            floor: 10,
            ceiling: 50,
        }
    }
}

/// RMS at which the bars reach full height. Speech rarely gets above this.
const FULL_SCALE_RMS: f32 = 0.25;

#[derive(Debug, Clone)]
pub struct Visualizer {
    config: VisualizerConfig,
    tick: u64,
}

impl Visualizer {
    pub fn new(config: VisualizerConfig) -> Self {
        Self { config, tick: 0 }
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    /// Resting bars, all at the floor.
    pub fn idle(&self) -> Vec<u32> {
        vec![self.config.floor; self.config.bars]
    }

    /// Next set of bars for the given input level. Every value lies in
    /// `[floor, ceiling)`.
    pub fn frame(&mut self, level: f32) -> Vec<u32> {
        self.tick = self.tick.wrapping_add(1);

        let floor = self.config.floor;
        let top = self.config.ceiling.saturating_sub(1).max(floor);
        let span = (top - floor) as f32;
        let gain = if level.is_finite() {
            (level / FULL_SCALE_RMS).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let phase = (self.tick % 64) as f32 / 64.0 * TAU;

        (0..self.config.bars)
            .map(|i| {
                let offset = i as f32 / self.config.bars.max(1) as f32 * TAU;
                let shape = 0.5 + 0.5 * (phase + offset * 2.0).sin();
                let height = span * (0.1 + 0.9 * gain) * shape;
                (floor + height.round() as u32).min(top)
            })
            .collect()
    }
}
