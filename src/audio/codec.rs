//! Codec adapters.
//!
//! An [`Encoder`] or [`Decoder`] wraps exactly one external encode/decode
//! function behind a uniform contract. The backend is picked once, at
//! construction, from the [`Codec`] identifier; reconfiguring a stream builds
//! a new adapter instead of mutating this one. Adapters own no buffering.

use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::g711::{self, Law};
use super::opus::{MAX_OPUS_PACKET_SIZE, OpusDecoderState, OpusEncoderState};
use crate::config::CodecConfig;
use crate::error::PipelineError;

/// Codec identifiers. Numeric ids follow the wire protocol of the control
/// plane: 1 = opus, 2 = pcma, 3 = pcmu, anything else is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Opus,
    Pcma,
    Pcmu,
    #[serde(other)]
    Unknown,
}

/// Read-only name table, indexed by numeric codec id.
const CODEC_NAMES: [&str; 4] = ["unknown", "opus", "pcma", "pcmu"];

impl Codec {
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => Codec::Opus,
            2 => Codec::Pcma,
            3 => Codec::Pcmu,
            _ => Codec::Unknown,
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Codec::Unknown => 0,
            Codec::Opus => 1,
            Codec::Pcma => 2,
            Codec::Pcmu => 3,
        }
    }

    pub fn name(self) -> &'static str {
        CODEC_NAMES[self.id() as usize]
    }

    pub fn is_valid(self) -> bool {
        self != Codec::Unknown
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sample rate, channel count and frame duration a codec works at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeFormat {
    pub sample_rate: u32,
    pub channels: usize,
    pub frame_ms: f32,
}

impl NativeFormat {
    fn for_config(config: &CodecConfig) -> Self {
        match config.codec {
            Codec::Pcma | Codec::Pcmu => Self {
                sample_rate: g711::SAMPLE_RATE,
                channels: g711::CHANNELS,
                frame_ms: config.frame_ms,
            },
            _ => Self {
                sample_rate: config.sample_rate,
                channels: config.channels,
                frame_ms: config.frame_ms,
            },
        }
    }

    /// Interleaved samples in one frame of `frame_ms` at this format.
    pub fn frame_samples(&self) -> usize {
        frame_samples(self.sample_rate, self.channels, self.frame_ms)
    }
}

/// Interleaved sample count of one `frame_ms` frame, always a multiple of `channels`.
pub fn frame_samples(sample_rate: u32, channels: usize, frame_ms: f32) -> usize {
    let per_channel = (sample_rate as f64 / 1000.0 * frame_ms as f64) as usize;
    per_channel * channels
}

enum EncoderBackend {
    Opus(OpusEncoderState),
    G711(Law),
    Null,
}

pub struct Encoder {
    codec: Codec,
    format: NativeFormat,
    bitrate: i32,
    backend: EncoderBackend,
}

impl Encoder {
    /// Builds the adapter for `config.codec`. Unknown codecs yield a null
    /// adapter whose `encode` always fails.
    pub fn new(config: &CodecConfig) -> Result<Self> {
        let format = NativeFormat::for_config(config);
        let backend = match config.codec {
            Codec::Opus => EncoderBackend::Opus(OpusEncoderState::new(config)?),
            Codec::Pcma => EncoderBackend::G711(Law::A),
            Codec::Pcmu => EncoderBackend::G711(Law::Mu),
            Codec::Unknown => {
                warn!("Unknown codec, encoder will drop every frame");
                EncoderBackend::Null
            }
        };

        info!(
            codec = %config.codec,
            frame_ms = config.frame_ms,
            sample_rate = format.sample_rate,
            channels = format.channels,
            bitrate = config.bitrate,
            voip = config.voip,
            "Encoder created"
        );

        Ok(Self {
            codec: config.codec,
            format,
            bitrate: config.bitrate,
            backend,
        })
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn format(&self) -> NativeFormat {
        self.format
    }

    /// Interleaved samples the codec consumes per frame.
    pub fn frame_samples(&self) -> usize {
        self.format.frame_samples()
    }

    /// Upper bound of one encoded frame, used to size the output buffer.
    pub fn max_encoded_size(&self) -> usize {
        match self.backend {
            EncoderBackend::Opus(_) => opus_max_encoded_size(self.bitrate, self.format.frame_ms),
            _ => self.frame_samples() * 8,
        }
    }

    pub fn set_bitrate(&mut self, bitrate: i32) {
        self.bitrate = bitrate;
        if let EncoderBackend::Opus(state) = &mut self.backend
            && let Err(e) = state.set_bitrate(bitrate)
        {
            warn!(codec = %self.codec, bitrate, "Failed to set bitrate: {e:#}");
        }
    }

    /// Opus only; other codecs have nothing to tune.
    pub fn set_complexity(&mut self, complexity: i32) {
        if let EncoderBackend::Opus(state) = &mut self.backend
            && let Err(e) = state.set_complexity(complexity)
        {
            warn!(codec = %self.codec, complexity, "Failed to set complexity: {e:#}");
        }
    }

    /// Encodes exactly one frame. `samples` must hold `frame_samples()` samples.
    pub fn encode(&mut self, samples: &[i16]) -> Result<Vec<u8>, PipelineError> {
        let max_size = self.max_encoded_size();
        let encoded = match &mut self.backend {
            EncoderBackend::Opus(state) => state
                .encode(samples, max_size)
                .map(<[u8]>::to_vec)
                .map_err(|e| PipelineError::codec(self.codec, format!("{e:#}")))?,
            EncoderBackend::G711(law) => law.encode(samples),
            EncoderBackend::Null => {
                return Err(PipelineError::codec(self.codec, "no encoder for codec"));
            }
        };

        if encoded.is_empty() {
            return Err(PipelineError::codec(
                self.codec,
                format!("empty output for {} samples", samples.len()),
            ));
        }
        Ok(encoded)
    }
}

/// Twice the bytes expected at `bitrate`, rounded up to whole 10 ms blocks.
/// An unbounded bitrate falls back to the largest legal Opus packet.
fn opus_max_encoded_size(bitrate: i32, frame_ms: f32) -> usize {
    if bitrate <= 0 {
        return MAX_OPUS_PACKET_SIZE;
    }
    let bytes_per_ms = bitrate as usize / 8000 + 1;
    let blocks_of_10ms = ((frame_ms / 10.0).ceil() as usize).max(1);
    (2 * blocks_of_10ms * 10 * bytes_per_ms).min(MAX_OPUS_PACKET_SIZE)
}

enum DecoderBackend {
    Opus(OpusDecoderState),
    G711(Law),
    Null,
}

pub struct Decoder {
    codec: Codec,
    sample_rate: u32,
    channels: usize,
    backend: DecoderBackend,
}

impl Decoder {
    pub fn new(codec: Codec, sample_rate: u32, channels: usize) -> Result<Self> {
        let (sample_rate, channels) = match codec {
            Codec::Pcma | Codec::Pcmu => (g711::SAMPLE_RATE, g711::CHANNELS),
            _ => (sample_rate, channels),
        };
        let backend = match codec {
            Codec::Opus => DecoderBackend::Opus(OpusDecoderState::new(sample_rate, channels)?),
            Codec::Pcma => DecoderBackend::G711(Law::A),
            Codec::Pcmu => DecoderBackend::G711(Law::Mu),
            Codec::Unknown => {
                warn!("Unknown codec, decoder will drop every packet");
                DecoderBackend::Null
            }
        };

        info!(codec = %codec, sample_rate, channels, "Decoder created");

        Ok(Self {
            codec,
            sample_rate,
            channels,
            backend,
        })
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// 120 ms of native-rate samples, the longest frame any supported codec emits.
    pub fn max_decoded_size(&self) -> usize {
        frame_samples(self.sample_rate, self.channels, 120.0)
    }

    /// Decodes one packet into interleaved native-format samples.
    pub fn decode(&mut self, packet: &[u8]) -> Result<Vec<i16>, PipelineError> {
        let max_size = self.max_decoded_size();
        let decoded = match &mut self.backend {
            DecoderBackend::Opus(state) => state
                .decode(packet, max_size)
                .map(<[i16]>::to_vec)
                .map_err(|e| PipelineError::codec(self.codec, format!("{e:#}")))?,
            DecoderBackend::G711(law) => law.decode(packet),
            DecoderBackend::Null => {
                return Err(PipelineError::codec(self.codec, "no decoder for codec"));
            }
        };

        if decoded.is_empty() {
            return Err(PipelineError::codec(
                self.codec,
                format!("no samples from {} byte packet", packet.len()),
            ));
        }
        Ok(decoded)
    }
}
