//! Output pacing for both pipelines.
//!
//! Neither pacer owns any data. They look at queue depth, the age of the
//! oldest entry and the time of the last output, and tell the caller
//! whether polling `output` now is worthwhile.

use crate::config::{DecodePacing, EncodePacing};

/// Pacing verdict of the encode path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingSignal {
    NotReady,
    Ready,
}

impl PacingSignal {
    pub fn is_ready(self) -> bool {
        self == PacingSignal::Ready
    }
}

/// Pacing verdict of the decode path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DecodeSignal {
    NotReady,
    /// Backlog above the low threshold; drain at roughly real time.
    ReadyNormal,
    /// Backlog above the high threshold; drain at roughly twice real time.
    ReadyUrgent,
}

impl DecodeSignal {
    pub fn is_ready(self) -> bool {
        self != DecodeSignal::NotReady
    }
}

#[derive(Debug, Clone)]
pub struct EncodePacer {
    config: EncodePacing,
    last_output_ms: Option<u64>,
}

impl EncodePacer {
    pub fn new(config: EncodePacing) -> Self {
        Self {
            config,
            last_output_ms: None,
        }
    }

    /// Minimum spacing of two outputs: `max(frame_ms - slack, floor)`.
    pub fn min_interval_ms(&self, frame_ms: f32) -> u64 {
        (frame_ms as u64)
            .saturating_sub(self.config.interval_slack_ms)
            .max(self.config.min_interval_ms)
    }

    pub fn signal(&self, now_ms: u64, depth: usize, frame_ms: f32) -> PacingSignal {
        if depth == 0 || depth < self.config.ready_depth {
            return PacingSignal::NotReady;
        }
        match self.last_output_ms {
            Some(last) if now_ms < last + self.min_interval_ms(frame_ms) => PacingSignal::NotReady,
            _ => PacingSignal::Ready,
        }
    }

    pub fn record_output(&mut self, now_ms: u64) {
        self.last_output_ms = Some(now_ms);
    }

    pub fn last_output_ms(&self) -> Option<u64> {
        self.last_output_ms
    }

    pub fn reset(&mut self) {
        self.last_output_ms = None;
    }
}

/// Hysteresis pacer of the jitter queue.
///
/// Two thresholds, each met by either the age of the oldest packet or the
/// queue depth. Above the low one an output is allowed every
/// `normal_factor` frames, above the high one every `urgent_factor` frames.
#[derive(Debug, Clone)]
pub struct DecodePacer {
    config: DecodePacing,
    last_output_ms: Option<u64>,
    last_frame_ms: f64,
}

impl DecodePacer {
    pub fn new(config: DecodePacing) -> Self {
        let last_frame_ms = config.nominal_frame_ms;
        Self {
            config,
            last_output_ms: None,
            last_frame_ms,
        }
    }

    pub fn config(&self) -> &DecodePacing {
        &self.config
    }

    /// Frame duration the thresholds are computed from.
    pub fn frame_ms(&self) -> u64 {
        (self.last_frame_ms.round().max(0.0) as u64).max(self.config.min_frame_ms.max(1))
    }

    pub fn low_age_ms(&self) -> u64 {
        self.config.low_age_ms
    }

    pub fn high_age_ms(&self) -> u64 {
        self.config.low_age_ms + self.config.high_extra_frames * self.frame_ms()
    }

    pub fn signal(&self, now_ms: u64, depth: usize, oldest_age_ms: Option<u64>) -> DecodeSignal {
        let Some(age) = oldest_age_ms else {
            return DecodeSignal::NotReady;
        };
        if depth == 0 {
            return DecodeSignal::NotReady;
        }

        let frame_ms = self.frame_ms();
        let elapsed = self
            .last_output_ms
            .map_or(f64::INFINITY, |last| now_ms.saturating_sub(last) as f64);
        let reached = |age_bound: u64| age >= age_bound || depth as u64 >= age_bound / frame_ms;

        if reached(self.high_age_ms()) && elapsed >= self.config.urgent_factor * frame_ms as f64 {
            return DecodeSignal::ReadyUrgent;
        }
        if reached(self.low_age_ms()) && elapsed >= self.config.normal_factor * frame_ms as f64 {
            return DecodeSignal::ReadyNormal;
        }
        DecodeSignal::NotReady
    }

    /// Records an output and the duration of the audio it carried.
    pub fn record_output(&mut self, now_ms: u64, frame_ms: f64) {
        self.last_output_ms = Some(now_ms);
        if frame_ms.is_finite() && frame_ms > 0.0 {
            self.last_frame_ms = frame_ms;
        }
    }

    pub fn last_output_ms(&self) -> Option<u64> {
        self.last_output_ms
    }
}
