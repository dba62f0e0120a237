//! PCM in, encoded frames out.
//!
//! Input of any chunk size is collected in a residual buffer at the caller's
//! format. Every full frame is split off and converted to the codec's native
//! format. Rate conversion does not map one input frame onto exactly one
//! codec frame, so converted samples gather in a second residual that is cut
//! into codec frames and queued. `output` encodes one queued frame at a time.

use anyhow::Context;
use tracing::{debug, info, warn};

use super::pacing::{EncodePacer, PacingSignal};
use crate::audio::buffers::{BoundedQueue, FrameAccumulator};
use crate::audio::codec::{Codec, Encoder, NativeFormat, frame_samples};
use crate::audio::frame::SampleBlock;
use crate::audio::resampler::{Conversion, SampleRateConverter, StreamFormat};
use crate::config::{CodecConfig, EncodePacing};
use crate::error::Result;

pub struct EncodePipeline {
    encoder: Encoder,
    converter: SampleRateConverter,
    accumulator: FrameAccumulator,
    /// Converted samples at the native format, short of a full codec frame.
    converted: FrameAccumulator,
    ready: BoundedQueue<SampleBlock>,
    pacer: EncodePacer,
    input_format: Option<StreamFormat>,
}

impl EncodePipeline {
    pub fn new(codec: &CodecConfig, pacing: EncodePacing) -> anyhow::Result<Self> {
        let encoder = Encoder::new(codec).context("Failed to create encode pipeline")?;
        let native = encoder.format();
        Ok(Self {
            accumulator: FrameAccumulator::new(native.frame_samples(), native.channels),
            converted: FrameAccumulator::new(native.frame_samples(), native.channels),
            ready: BoundedQueue::new(pacing.queue_capacity),
            pacer: EncodePacer::new(pacing),
            converter: SampleRateConverter::new(),
            input_format: None,
            encoder,
        })
    }

    pub fn codec(&self) -> Codec {
        self.encoder.codec()
    }

    pub fn native_format(&self) -> NativeFormat {
        self.encoder.format()
    }

    /// Frames converted and waiting for `output`.
    pub fn queued(&self) -> usize {
        self.ready.len()
    }

    /// Frames dropped because the ready queue was full.
    pub fn evicted(&self) -> u64 {
        self.ready.evicted()
    }

    /// Samples held in the residual buffer, at the input format.
    pub fn residual(&self) -> usize {
        self.accumulator.buffered()
    }

    /// Converted samples waiting for a full codec frame, at the native format.
    pub fn converted_residual(&self) -> usize {
        self.converted.buffered()
    }

    /// Replaces the codec. Everything buffered for the old codec is dropped.
    pub fn set_codec(&mut self, codec: &CodecConfig) -> anyhow::Result<()> {
        let encoder = Encoder::new(codec).context("Failed to reconfigure encode pipeline")?;
        let native = encoder.format();
        self.encoder = encoder;
        self.input_format = None;
        self.accumulator.clear();
        self.converted.reset(native.frame_samples(), native.channels);
        self.converted.clear();
        self.ready.clear();
        self.pacer.reset();
        Ok(())
    }

    pub fn set_bitrate(&mut self, bitrate: i32) {
        self.encoder.set_bitrate(bitrate);
    }

    pub fn set_complexity(&mut self, complexity: i32) {
        self.encoder.set_complexity(complexity);
    }

    /// Accepts a chunk of interleaved PCM captured at `capture_time_ms`.
    ///
    /// `capture_time_ms` also serves as the pacing clock. An unsupported
    /// input format is rejected before anything is buffered. A converter
    /// failure drops the residual; the pipeline accepts the next chunk.
    pub fn input(
        &mut self,
        samples: &[i16],
        capture_time_ms: u64,
        sample_rate: u32,
        channels: usize,
    ) -> Result<PacingSignal> {
        let format = StreamFormat::new(sample_rate, channels).validate()?;
        if self.input_format != Some(format) {
            self.reconfigure_input(format)?;
        }

        self.accumulator.push(samples, capture_time_ms);
        while let Some(block) = self.accumulator.pop_frame() {
            if let Err(e) = self.enqueue(block) {
                self.accumulator.clear();
                self.converted.clear();
                return Err(e);
            }
        }

        Ok(self.pacing_signal(capture_time_ms))
    }

    fn reconfigure_input(&mut self, format: StreamFormat) -> Result<()> {
        let native = self.encoder.format();
        self.converter.configure(
            format.sample_rate,
            format.channels,
            native.sample_rate,
            native.channels,
        )?;

        let frame = frame_samples(format.sample_rate, format.channels, native.frame_ms);
        self.accumulator.reset(frame, format.channels);
        self.accumulator.clear();
        self.converted.clear();
        self.input_format = Some(format);

        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            frame_samples = frame,
            mode = ?self.converter.mode(),
            "EncodePipeline: input format changed"
        );
        Ok(())
    }

    fn enqueue(&mut self, block: SampleBlock) -> Result<()> {
        let time_ms = block.first_time_ms();
        match self.converter.push(block.data())? {
            Conversion::NotNeeded => self.converted.push(block.data(), time_ms),
            Conversion::Produced(samples) => self.converted.push(samples, time_ms),
        }

        while let Some(frame) = self.converted.pop_frame() {
            if self.ready.push(frame).is_some() {
                debug!(
                    "EncodePipeline: ready queue full ({}), dropped oldest frame",
                    self.ready.capacity()
                );
            }
        }
        Ok(())
    }

    pub fn pacing_signal(&self, now_ms: u64) -> PacingSignal {
        self.pacer
            .signal(now_ms, self.ready.len(), self.encoder.format().frame_ms)
    }

    /// Encodes the oldest queued frame.
    ///
    /// Returns `Ok(None)` when nothing is queued. Every queued frame holds
    /// exactly the codec's frame size. A codec failure drops the frame.
    pub fn output(&mut self, now_ms: u64) -> Result<Option<Vec<u8>>> {
        let Some(block) = self.ready.pop() else {
            return Ok(None);
        };

        match self.encoder.encode(block.data()) {
            Ok(packet) => {
                self.pacer.record_output(now_ms);
                Ok(Some(packet))
            }
            Err(e) => {
                warn!(
                    codec = %self.encoder.codec(),
                    samples = block.len(),
                    "EncodePipeline: {e}"
                );
                Err(e)
            }
        }
    }
}
