//! Encoded packets in, PCM at the caller's format out.
//!
//! Packets wait in an arrival-ordered queue. The pacer turns queue depth and
//! age into a [`DecodeSignal`]; `output` decodes the oldest packet and
//! converts it to whatever format the caller asks for.

use anyhow::Context;
use tracing::{info, warn};

use super::pacing::{DecodePacer, DecodeSignal};
use crate::audio::buffers::PacketQueue;
use crate::audio::codec::{Codec, Decoder};
use crate::audio::resampler::{Conversion, SampleRateConverter, StreamFormat};
use crate::config::DecodePacing;
use crate::error::Result;

/// One decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAudio {
    /// Interleaved samples.
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl DecodedAudio {
    /// Duration in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        if self.channels == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        (self.samples.len() / self.channels) as f64 / (self.sample_rate as f64 / 1000.0)
    }
}

pub struct DecodePipeline {
    decoder: Decoder,
    converter: SampleRateConverter,
    queue: PacketQueue,
    pacer: DecodePacer,
}

impl DecodePipeline {
    pub fn new(
        codec: Codec,
        sample_rate: u32,
        channels: usize,
        pacing: DecodePacing,
    ) -> anyhow::Result<Self> {
        let decoder = Decoder::new(codec, sample_rate, channels)
            .with_context(|| format!("Failed to create {codec} decode pipeline"))?;
        Ok(Self {
            queue: PacketQueue::new(pacing.queue_capacity, pacing.max_age_ms),
            pacer: DecodePacer::new(pacing),
            converter: SampleRateConverter::new(),
            decoder,
        })
    }

    pub fn codec(&self) -> Codec {
        self.decoder.codec()
    }

    pub fn native_format(&self) -> StreamFormat {
        StreamFormat::new(self.decoder.sample_rate(), self.decoder.channels())
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Packets dropped by the count or age ceiling.
    pub fn evicted(&self) -> u64 {
        self.queue.evicted()
    }

    /// Frame duration the pacer currently assumes.
    pub fn frame_ms(&self) -> u64 {
        self.pacer.frame_ms()
    }

    /// Queues one encoded payload received at `now_ms`.
    pub fn input(&mut self, payload: &[u8], now_ms: u64) -> DecodeSignal {
        self.queue.push(payload.to_vec(), now_ms);
        self.pacing_signal(now_ms)
    }

    pub fn pacing_signal(&self, now_ms: u64) -> DecodeSignal {
        self.pacer
            .signal(now_ms, self.queue.len(), self.queue.oldest_age_ms(now_ms))
    }

    /// Resolves the format `output` would produce for a request.
    ///
    /// `(0, 0)` asks for the codec's native format. Anything else must be a
    /// supported format and is produced as requested. The converter is
    /// configured as a side effect.
    pub fn output_format(&mut self, sample_rate: u32, channels: usize) -> Result<StreamFormat> {
        let native = self.native_format();
        let target = if sample_rate == 0 && channels == 0 {
            native
        } else {
            StreamFormat::new(sample_rate, channels).validate()?
        };

        if self.converter.output_format() != Some(target)
            || self.converter.input_format() != Some(native)
        {
            self.converter.configure(
                native.sample_rate,
                native.channels,
                target.sample_rate,
                target.channels,
            )?;
            info!(
                codec = %self.decoder.codec(),
                sample_rate = target.sample_rate,
                channels = target.channels,
                "DecodePipeline: output format changed"
            );
        }
        Ok(target)
    }

    /// Decodes the oldest packet and converts it to the requested format.
    ///
    /// Returns `Ok(None)` when the queue is empty. An invalid format leaves
    /// the queue untouched; a decode or converter failure drops the packet.
    pub fn output(
        &mut self,
        now_ms: u64,
        sample_rate: u32,
        channels: usize,
    ) -> Result<Option<DecodedAudio>> {
        if self.queue.is_empty() {
            return Ok(None);
        }
        let target = self.output_format(sample_rate, channels)?;
        let Some(packet) = self.queue.pop() else {
            return Ok(None);
        };

        let decoded = self.decoder.decode(&packet.payload).inspect_err(|e| {
            warn!(
                bytes = packet.payload.len(),
                tag = packet.tag,
                "DecodePipeline: {e}"
            );
        })?;

        let samples = match self.converter.push(&decoded) {
            Ok(Conversion::NotNeeded) => decoded,
            Ok(Conversion::Produced(converted)) => converted.to_vec(),
            Err(e) => {
                warn!(
                    samples = decoded.len(),
                    "DecodePipeline: output conversion failed: {e}"
                );
                return Err(e);
            }
        };

        let audio = DecodedAudio {
            samples,
            sample_rate: target.sample_rate,
            channels: target.channels,
        };
        self.pacer.record_output(now_ms, audio.duration_ms());
        Ok(Some(audio))
    }
}
