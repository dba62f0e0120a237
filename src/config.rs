//! Per-stream configuration.
//!
//! All structs deserialize from JSON with every field optional; missing
//! fields fall back to the `Default` impls below.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::codec::Codec;

/// Codec selection and native format of one encode or decode path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub codec: Codec,
    /// Frame duration in milliseconds (2.5, 5, 10, 20, 40 or 60 for Opus).
    pub frame_ms: f32,
    pub sample_rate: u32,
    pub channels: usize,
    /// Target bitrate in bits per second. Zero or negative selects the codec maximum.
    pub bitrate: i32,
    /// Tune the encoder for speech rather than general audio.
    pub voip: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            codec: Codec::Opus,
            frame_ms: 20.0,
            sample_rate: 48000,
            channels: 1,
            bitrate: 32000,
            voip: true,
        }
    }
}

impl CodecConfig {
    pub fn opus(sample_rate: u32, channels: usize, frame_ms: f32) -> Self {
        Self {
            sample_rate,
            channels,
            frame_ms,
            ..Self::default()
        }
    }

    /// G711 always runs at 8 kHz mono; only the frame duration is free.
    pub fn g711(codec: Codec, frame_ms: f32) -> Self {
        Self {
            codec,
            frame_ms,
            sample_rate: 8000,
            channels: 1,
            bitrate: 64000,
            voip: true,
        }
    }
}

/// Output pacing of the encode path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodePacing {
    /// Ready-to-encode blocks kept before the oldest is evicted.
    pub queue_capacity: usize,
    /// Queue depth at which `Ready` may be reported.
    pub ready_depth: usize,
    /// Subtracted from the frame duration to get the minimum output interval.
    pub interval_slack_ms: u64,
    /// Floor of the minimum output interval.
    pub min_interval_ms: u64,
}

impl Default for EncodePacing {
    fn default() -> Self {
        Self {
            queue_capacity: 250,
            ready_depth: 1,
            interval_slack_ms: 3,
            min_interval_ms: 5,
        }
    }
}

/// Jitter pacing of the decode path.
///
/// The defaults are empirical; none of them has a derivation behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodePacing {
    /// Absolute count ceiling of the packet queue.
    pub queue_capacity: usize,
    /// Packets older than this are evicted on the next input.
    pub max_age_ms: u64,
    /// Age of the oldest packet that opens the low threshold.
    pub low_age_ms: u64,
    /// The high threshold sits this many frames above the low one.
    pub high_extra_frames: u64,
    /// Fraction of a frame that must elapse between outputs at the low threshold.
    pub normal_factor: f64,
    /// Fraction of a frame that must elapse between outputs at the high threshold.
    pub urgent_factor: f64,
    /// Lower clamp of the frame duration used for pacing.
    pub min_frame_ms: u64,
    /// Frame duration assumed before the first packet has been decoded.
    pub nominal_frame_ms: f64,
}

impl Default for DecodePacing {
    fn default() -> Self {
        Self {
            queue_capacity: 250,
            max_age_ms: 3000,
            low_age_ms: 100,
            high_extra_frames: 2,
            normal_factor: 0.8,
            urgent_factor: 0.4,
            min_frame_ms: 10,
            nominal_frame_ms: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStreamConfig {
    pub codec: CodecConfig,
    pub pacing: EncodePacing,
    pub ssrc: u32,
    pub payload_type: u8,
    pub initial_sequence: u16,
}

impl Default for LocalStreamConfig {
    fn default() -> Self {
        Self {
            codec: CodecConfig::default(),
            pacing: EncodePacing::default(),
            ssrc: 0,
            payload_type: 111,
            initial_sequence: 1000,
        }
    }
}

/// One entry of the remote payload-type table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadRegistration {
    pub payload_type: u8,
    pub codec: Codec,
    pub sample_rate: u32,
    pub channels: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteStreamConfig {
    pub payload_types: Vec<PayloadRegistration>,
    pub output_sample_rate: u32,
    pub output_channels: usize,
    pub pacing: DecodePacing,
}

impl Default for RemoteStreamConfig {
    fn default() -> Self {
        Self {
            payload_types: Vec::new(),
            output_sample_rate: 48000,
            output_channels: 1,
            pacing: DecodePacing::default(),
        }
    }
}

/// Both directions of one call leg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub local: LocalStreamConfig,
    pub remote: RemoteStreamConfig,
}

impl BridgeConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse bridge configuration")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let pacing = DecodePacing::default();
        assert_eq!(pacing.max_age_ms, 3000);
        assert_eq!(pacing.low_age_ms, 100);
        assert_eq!(pacing.normal_factor, 0.8);
        assert_eq!(pacing.urgent_factor, 0.4);

        let local = LocalStreamConfig::default();
        assert_eq!(local.initial_sequence, 1000);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = BridgeConfig::from_json_str(
            r#"{
                "local": { "ssrc": 1234, "codec": { "codec": "pcmu", "sample_rate": 8000 } },
                "remote": {
                    "payload_types": [
                        { "payload_type": 0, "codec": "pcmu", "sample_rate": 8000, "channels": 1 }
                    ]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.local.ssrc, 1234);
        assert_eq!(config.local.codec.codec, Codec::Pcmu);
        assert_eq!(config.local.codec.frame_ms, 20.0);
        assert_eq!(config.local.payload_type, 111);
        assert_eq!(config.remote.payload_types.len(), 1);
        assert_eq!(config.remote.pacing, DecodePacing::default());
    }

    #[test]
    fn test_invalid_json_is_reported() {
        assert!(BridgeConfig::from_json_str("{ not json").is_err());
    }
}
