//! Outgoing RTP stream: one encode pipeline plus RTP framing state.

use anyhow::Context;
use tracing::{info, warn};

use crate::audio::codec::NativeFormat;
use crate::audio::sample::{f32_slice_to_i16, interleave_planar_f32};
use crate::clock;
use crate::config::{CodecConfig, LocalStreamConfig};
use crate::error::Result;
use crate::network::rtp::{RTP_HEADER_LEN, RtpHeader};
use crate::network::timestamp::RtpTimestamp;
use crate::pipeline::{EncodePipeline, PacingSignal};

/// RTP clock ticks per frame: per-channel samples at the native rate.
fn rtp_samples_per_frame(format: NativeFormat) -> u32 {
    (format.sample_rate as f64 / 1000.0 * format.frame_ms as f64) as u32
}

pub struct LocalStream {
    pipeline: EncodePipeline,
    codec: CodecConfig,
    ssrc: u32,
    payload_type: u8,
    sequence: u16,
    timestamp: RtpTimestamp,
    packets_sent: u64,
}

impl LocalStream {
    pub fn new(config: LocalStreamConfig) -> anyhow::Result<Self> {
        if !config.codec.codec.is_valid() {
            anyhow::bail!("Cannot create local stream for codec {}", config.codec.codec);
        }
        let pipeline = EncodePipeline::new(&config.codec, config.pacing.clone())
            .context("Failed to create local stream")?;
        let native = pipeline.native_format();

        info!(
            ssrc = config.ssrc,
            payload_type = config.payload_type,
            codec = %config.codec.codec,
            "LocalStream created"
        );

        Ok(Self {
            timestamp: RtpTimestamp::new(native.frame_ms, rtp_samples_per_frame(native)),
            pipeline,
            codec: config.codec,
            ssrc: config.ssrc,
            payload_type: config.payload_type & 0x7F,
            sequence: config.initial_sequence,
            packets_sent: 0,
        })
    }

    pub fn codec_config(&self) -> &CodecConfig {
        &self.codec
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    /// Sequence number the next packet will carry.
    pub fn next_sequence(&self) -> u16 {
        self.sequence
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    pub fn pipeline(&self) -> &EncodePipeline {
        &self.pipeline
    }

    /// Swaps the codec. An invalid codec is rejected and the current one kept.
    pub fn set_codec_parameters(&mut self, codec: CodecConfig) -> anyhow::Result<()> {
        if !codec.codec.is_valid() {
            warn!("LocalStream: invalid codec {}, keeping {}", codec.codec, self.codec.codec);
            anyhow::bail!("Invalid codec {}", codec.codec);
        }
        self.pipeline.set_codec(&codec)?;
        let native = self.pipeline.native_format();
        let samples_per_frame = rtp_samples_per_frame(native);
        self.timestamp.set_frame(native.frame_ms, samples_per_frame);

        info!(
            codec = %codec.codec,
            frame_ms = native.frame_ms,
            samples_per_frame,
            "LocalStream: codec changed"
        );
        self.codec = codec;
        Ok(())
    }

    pub fn set_bitrate(&mut self, bitrate: i32) {
        info!("LocalStream: set bitrate={}", bitrate);
        self.codec.bitrate = bitrate;
        self.pipeline.set_bitrate(bitrate);
    }

    pub fn set_complexity(&mut self, complexity: i32) {
        info!("LocalStream: set complexity={}", complexity);
        self.pipeline.set_complexity(complexity);
    }

    pub fn set_rtp_parameters(&mut self, ssrc: u32, payload_type: u8) {
        if payload_type > 0x7F {
            warn!("LocalStream: payload type {} truncated to 7 bits", payload_type);
        }
        info!("LocalStream: set rtp ssrc={}, ptype={}", ssrc, payload_type);
        self.ssrc = ssrc;
        self.payload_type = payload_type & 0x7F;
    }

    /// Interleaved 16-bit PCM captured at `capture_time_ms`.
    pub fn input(
        &mut self,
        samples: &[i16],
        capture_time_ms: u64,
        sample_rate: u32,
        channels: usize,
    ) -> Result<PacingSignal> {
        self.pipeline
            .input(samples, capture_time_ms, sample_rate, channels)
    }

    /// Interleaved float PCM in [-1.0, 1.0]; out-of-range values are clipped.
    pub fn input_f32(
        &mut self,
        samples: &[f32],
        capture_time_ms: u64,
        sample_rate: u32,
        channels: usize,
    ) -> Result<PacingSignal> {
        let samples = f32_slice_to_i16(samples);
        self.input(&samples, capture_time_ms, sample_rate, channels)
    }

    /// One float slice per channel.
    pub fn input_planar_f32(
        &mut self,
        planes: &[&[f32]],
        capture_time_ms: u64,
        sample_rate: u32,
    ) -> Result<PacingSignal> {
        let samples = interleave_planar_f32(planes);
        self.input(&samples, capture_time_ms, sample_rate, planes.len())
    }

    pub fn pacing_signal(&self, now_ms: u64) -> PacingSignal {
        self.pipeline.pacing_signal(now_ms)
    }

    /// Next RTP packet, stamped with the wall clock.
    pub fn output(&mut self) -> Result<Option<Vec<u8>>> {
        self.output_at(clock::now_ms())
    }

    /// Next RTP packet: 12-byte header followed by one encoded frame.
    pub fn output_at(&mut self, now_ms: u64) -> Result<Option<Vec<u8>>> {
        let Some(payload) = self.pipeline.output(now_ms)? else {
            return Ok(None);
        };

        let header = RtpHeader {
            marker: false,
            payload_type: self.payload_type,
            sequence: self.sequence,
            timestamp: self.timestamp.next(now_ms),
            ssrc: self.ssrc,
        };
        self.sequence = self.sequence.wrapping_add(1);
        self.packets_sent += 1;

        let mut packet = Vec::with_capacity(RTP_HEADER_LEN + payload.len());
        packet.extend_from_slice(&header.to_bytes());
        packet.extend_from_slice(&payload);
        Ok(Some(packet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::Codec;
    use crate::config::EncodePacing;
    use crate::network::rtp::parse_header;

    fn pcmu_stream(initial_sequence: u16) -> LocalStream {
        LocalStream::new(LocalStreamConfig {
            codec: CodecConfig::g711(Codec::Pcmu, 20.0),
            pacing: EncodePacing::default(),
            ssrc: 0xABCD,
            payload_type: 0,
            initial_sequence,
        })
        .unwrap()
    }

    #[test]
    fn test_packet_layout() {
        let mut stream = pcmu_stream(1000);
        stream.input(&[0; 160], 0, 8000, 1).unwrap();
        let packet = stream.output_at(0).unwrap().unwrap();
        assert_eq!(packet.len(), 12 + 160);

        let header = parse_header(&packet).unwrap();
        assert_eq!(header.payload_type, 0);
        assert_eq!(header.sequence, 1000);
        assert_eq!(header.ssrc, 0xABCD);
        assert_eq!(header.header_len, 12);
    }

    #[test]
    fn test_sequence_and_timestamp_progression() {
        let mut stream = pcmu_stream(65534);
        let mut headers = Vec::new();
        for i in 0..4u64 {
            stream.input(&[0; 160], i * 20, 8000, 1).unwrap();
            let packet = stream.output_at(i * 20).unwrap().unwrap();
            headers.push(parse_header(&packet).unwrap());
        }

        let sequences: Vec<u16> = headers.iter().map(|h| h.sequence).collect();
        assert_eq!(sequences, vec![65534, 65535, 0, 1]);
        for pair in headers.windows(2) {
            assert_eq!(pair[1].timestamp.wrapping_sub(pair[0].timestamp), 160);
        }
        assert_eq!(stream.packets_sent(), 4);
    }

    #[test]
    fn test_no_output_without_input() {
        let mut stream = pcmu_stream(1000);
        assert!(stream.output_at(0).unwrap().is_none());
        assert_eq!(stream.next_sequence(), 1000);
    }

    #[test]
    fn test_float_input_is_clipped() {
        let mut stream = pcmu_stream(1000);
        let loud = vec![1.5f32; 160];
        stream.input_f32(&loud, 0, 8000, 1).unwrap();
        let packet = stream.output_at(0).unwrap().unwrap();
        // µ-law code for full-scale positive.
        assert!(packet[12..].iter().all(|&b| b == 0x80));
    }

    #[test]
    fn test_planar_input() {
        let mut stream = pcmu_stream(1000);
        let left = vec![0.25f32; 160];
        let right = vec![-0.25f32; 160];
        let signal = stream
            .input_planar_f32(&[&left, &right], 0, 8000)
            .unwrap();
        assert_eq!(signal, PacingSignal::Ready);
    }

    #[test]
    fn test_invalid_codec_keeps_current() {
        let mut stream = pcmu_stream(1000);
        let bad = CodecConfig {
            codec: Codec::Unknown,
            ..CodecConfig::default()
        };
        assert!(stream.set_codec_parameters(bad).is_err());
        assert_eq!(stream.codec_config().codec, Codec::Pcmu);

        stream
            .set_codec_parameters(CodecConfig::opus(48000, 2, 10.0))
            .unwrap();
        assert_eq!(stream.codec_config().codec, Codec::Opus);
        stream.set_rtp_parameters(7, 111);
        assert_eq!(stream.payload_type(), 111);
        assert_eq!(stream.ssrc(), 7);
    }

    #[test]
    fn test_unknown_codec_rejected_at_creation() {
        let config = LocalStreamConfig {
            codec: CodecConfig {
                codec: Codec::Unknown,
                ..CodecConfig::default()
            },
            ..LocalStreamConfig::default()
        };
        assert!(LocalStream::new(config).is_err());
    }

    #[test]
    fn test_stereo_input_split_at_odd_boundaries() {
        let mut stream = LocalStream::new(LocalStreamConfig {
            codec: CodecConfig::opus(48000, 2, 10.0),
            ..LocalStreamConfig::default()
        })
        .unwrap();
        stream.set_complexity(5);

        for i in 0..320u64 {
            stream.input(&[1, 2, 3], i / 32, 48000, 2).unwrap();
        }
        let packet = stream.output_at(10).unwrap().unwrap();
        assert!(packet.len() > 12);
    }
}
