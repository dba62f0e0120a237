//! Residual buffer that turns irregular PCM chunks into fixed-size frames.

use crate::audio::frame::SampleBlock;

/// Accumulates interleaved samples and hands out blocks of exactly
/// `frame_samples` once enough have arrived. The remainder stays buffered
/// for the next call. A chunk may end in the middle of an interleaved
/// frame; the dangling samples wait for the rest of their frame.
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    residual: SampleBlock,
    /// Fewer than `channels` samples cut off by the last chunk boundary.
    partial: Vec<i16>,
    frame_samples: usize,
}

impl FrameAccumulator {
    pub fn new(frame_samples: usize, channels: usize) -> Self {
        Self {
            residual: SampleBlock::empty(channels),
            partial: Vec::with_capacity(channels),
            frame_samples,
        }
    }

    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    pub fn channels(&self) -> usize {
        self.residual.channels()
    }

    pub fn buffered(&self) -> usize {
        self.residual.len() + self.partial.len()
    }

    /// Changes the frame geometry. Buffered samples are kept unless the
    /// channel count changes.
    pub fn reset(&mut self, frame_samples: usize, channels: usize) {
        if channels != self.residual.channels() {
            self.residual = SampleBlock::empty(channels);
            self.partial.clear();
        }
        self.frame_samples = frame_samples;
    }

    pub fn push(&mut self, samples: &[i16], time_ms: u64) {
        let channels = self.residual.channels();
        if self.partial.is_empty() && samples.len() % channels == 0 {
            self.residual.extend(samples, time_ms);
            return;
        }

        self.partial.extend_from_slice(samples);
        let whole = self.partial.len() - self.partial.len() % channels;
        let dangling = self.partial.split_off(whole);
        let complete = std::mem::replace(&mut self.partial, dangling);
        self.residual.extend(&complete, time_ms);
    }

    /// Splits off the oldest full frame, if one is available.
    pub fn pop_frame(&mut self) -> Option<SampleBlock> {
        if self.frame_samples == 0 || self.residual.len() < self.frame_samples {
            return None;
        }
        Some(self.residual.split_front(self.frame_samples))
    }

    pub fn clear(&mut self) {
        self.residual.clear();
        self.partial.clear();
    }
}
