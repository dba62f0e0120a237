//! Incoming RTP stream: payload-type demultiplexing onto decode pipelines.
//!
//! Each registered payload type owns its own [`DecodePipeline`]. Output
//! always comes from the pipeline that most recently received a packet.

use std::collections::HashMap;

use anyhow::Context;
use tracing::{debug, info};

use crate::audio::codec::Codec;
use crate::audio::resampler::StreamFormat;
use crate::audio::sample::{deinterleave_to_f32, i16_slice_to_f32};
use crate::clock;
use crate::config::{DecodePacing, PayloadRegistration, RemoteStreamConfig};
use crate::error::Result;
use crate::network::rtp::parse_header;
use crate::pipeline::{DecodePipeline, DecodeSignal, DecodedAudio};

struct RegisteredDecoder {
    generation: u64,
    pipeline: DecodePipeline,
}

/// Key of the most recently active decoder. The generation makes a key
/// that outlived a re-registration resolve to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveDecoder {
    payload_type: u8,
    generation: u64,
}

pub struct RemoteStream {
    decoders: HashMap<u8, RegisteredDecoder>,
    last_active: Option<ActiveDecoder>,
    next_generation: u64,
    pacing: DecodePacing,
    output_sample_rate: u32,
    output_channels: usize,
    malformed: u64,
    unregistered: u64,
}

impl RemoteStream {
    pub fn new(config: RemoteStreamConfig) -> anyhow::Result<Self> {
        let mut stream = Self {
            decoders: HashMap::new(),
            last_active: None,
            next_generation: 0,
            pacing: config.pacing,
            output_sample_rate: 0,
            output_channels: 0,
            malformed: 0,
            unregistered: 0,
        };
        stream
            .set_output_parameters(config.output_sample_rate, config.output_channels)
            .context("Invalid remote stream output format")?;
        for registration in &config.payload_types {
            stream.register(registration)?;
        }
        Ok(stream)
    }

    /// Binds `registration.payload_type` to a new decode pipeline, replacing
    /// any previous one. The previous pipeline's queued packets are dropped.
    pub fn register(&mut self, registration: &PayloadRegistration) -> anyhow::Result<()> {
        let payload_type = registration.payload_type;
        if payload_type > 0x7F {
            anyhow::bail!("Payload type {} out of range", payload_type);
        }
        if !registration.codec.is_valid() {
            anyhow::bail!(
                "Cannot register payload type {} for codec {}",
                payload_type,
                registration.codec
            );
        }

        let pipeline = DecodePipeline::new(
            registration.codec,
            registration.sample_rate,
            registration.channels,
            self.pacing.clone(),
        )?;

        let generation = self.next_generation;
        self.next_generation += 1;
        let replaced = self
            .decoders
            .insert(
                payload_type,
                RegisteredDecoder {
                    generation,
                    pipeline,
                },
            )
            .is_some();

        if self
            .last_active
            .is_some_and(|active| active.payload_type == payload_type)
        {
            self.last_active = None;
        }

        info!(
            payload_type,
            codec = %registration.codec,
            sample_rate = registration.sample_rate,
            channels = registration.channels,
            replaced,
            "RemoteStream: payload type registered"
        );
        Ok(())
    }

    /// Removes a payload type. Returns whether it was registered.
    pub fn unregister(&mut self, payload_type: u8) -> bool {
        let removed = self.decoders.remove(&payload_type).is_some();
        if removed
            && self
                .last_active
                .is_some_and(|active| active.payload_type == payload_type)
        {
            self.last_active = None;
        }
        removed
    }

    pub fn is_registered(&self, payload_type: u8) -> bool {
        self.decoders.contains_key(&payload_type)
    }

    pub fn codec_for(&self, payload_type: u8) -> Option<Codec> {
        self.decoders
            .get(&payload_type)
            .map(|entry| entry.pipeline.codec())
    }

    /// Payload type of the decoder `output` reads from.
    pub fn active_payload_type(&self) -> Option<u8> {
        let active = self.last_active?;
        let entry = self.decoders.get(&active.payload_type)?;
        (entry.generation == active.generation).then_some(active.payload_type)
    }

    /// Sets the format `output` converts to. `(0, 0)` keeps each codec's
    /// native format.
    pub fn set_output_parameters(&mut self, sample_rate: u32, channels: usize) -> Result<()> {
        if !(sample_rate == 0 && channels == 0) {
            StreamFormat::new(sample_rate, channels).validate()?;
        }
        info!(
            "RemoteStream: set output parameters: {}/{}",
            sample_rate, channels
        );
        self.output_sample_rate = sample_rate;
        self.output_channels = channels;
        Ok(())
    }

    /// Packets rejected as not being RTP.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// RTP packets whose payload type had no decoder.
    pub fn unregistered(&self) -> u64 {
        self.unregistered
    }

    /// Routes one received datagram, stamped with the wall clock.
    pub fn input(&mut self, data: &[u8]) -> Result<DecodeSignal> {
        self.input_at(data, clock::now_ms())
    }

    /// Routes one received datagram to the decoder of its payload type.
    ///
    /// Non-RTP bytes (RTCP included) are a `MalformedPacket` error. RTP with
    /// an unregistered payload type is ignored and reports `NotReady`.
    pub fn input_at(&mut self, data: &[u8], now_ms: u64) -> Result<DecodeSignal> {
        let header = match parse_header(data) {
            Ok(header) => header,
            Err(e) => {
                self.malformed += 1;
                debug!("RemoteStream: ignoring {} bytes: {}", data.len(), e);
                return Err(e.into());
            }
        };

        let Some(entry) = self.decoders.get_mut(&header.payload_type) else {
            self.unregistered += 1;
            debug!(
                "RemoteStream: no decoder for payload type {}",
                header.payload_type
            );
            return Ok(DecodeSignal::NotReady);
        };

        let signal = entry.pipeline.input(header.payload(data), now_ms);
        self.last_active = Some(ActiveDecoder {
            payload_type: header.payload_type,
            generation: entry.generation,
        });
        Ok(signal)
    }

    fn active_pipeline(&mut self) -> Option<&mut DecodePipeline> {
        let active = self.last_active?;
        let entry = self.decoders.get_mut(&active.payload_type)?;
        if entry.generation != active.generation {
            return None;
        }
        Some(&mut entry.pipeline)
    }

    pub fn pacing_signal(&mut self, now_ms: u64) -> DecodeSignal {
        self.active_pipeline()
            .map_or(DecodeSignal::NotReady, |pipeline| pipeline.pacing_signal(now_ms))
    }

    pub fn output(&mut self) -> Result<Option<DecodedAudio>> {
        self.output_at(clock::now_ms())
    }

    /// Decodes the next packet of the most recently active payload type.
    pub fn output_at(&mut self, now_ms: u64) -> Result<Option<DecodedAudio>> {
        let (sample_rate, channels) = (self.output_sample_rate, self.output_channels);
        match self.active_pipeline() {
            Some(pipeline) => pipeline.output(now_ms, sample_rate, channels),
            None => Ok(None),
        }
    }

    /// Like [`output_at`](Self::output_at), as interleaved floats.
    pub fn output_f32(&mut self, now_ms: u64) -> Result<Option<(Vec<f32>, StreamFormat)>> {
        Ok(self.output_at(now_ms)?.map(|audio| {
            let format = StreamFormat::new(audio.sample_rate, audio.channels);
            (i16_slice_to_f32(&audio.samples), format)
        }))
    }

    /// Like [`output_at`](Self::output_at), one float plane per channel.
    pub fn output_planar_f32(
        &mut self,
        now_ms: u64,
    ) -> Result<Option<(Vec<Vec<f32>>, StreamFormat)>> {
        Ok(self.output_at(now_ms)?.map(|audio| {
            let format = StreamFormat::new(audio.sample_rate, audio.channels);
            (deinterleave_to_f32(&audio.samples, audio.channels), format)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::g711::Law;
    use crate::error::{PipelineError, RtpParseError};
    use crate::network::rtp::build_header;

    fn registration(payload_type: u8, codec: Codec) -> PayloadRegistration {
        PayloadRegistration {
            payload_type,
            codec,
            sample_rate: 8000,
            channels: 1,
        }
    }

    fn rtp(payload_type: u8, seq: u16, payload: &[u8]) -> Vec<u8> {
        let mut packet = build_header(seq, seq as u32 * 160, 42, payload_type, false).to_vec();
        packet.extend_from_slice(payload);
        packet
    }

    fn stream() -> RemoteStream {
        RemoteStream::new(RemoteStreamConfig {
            payload_types: vec![registration(0, Codec::Pcmu), registration(8, Codec::Pcma)],
            output_sample_rate: 0,
            output_channels: 0,
            pacing: DecodePacing::default(),
        })
        .unwrap()
    }

    #[test]
    fn test_routes_by_payload_type() {
        let mut stream = stream();
        let pcmu = Law::Mu.encode(&[1000; 160]);
        stream.input_at(&rtp(0, 1, &pcmu), 0).unwrap();
        assert_eq!(stream.active_payload_type(), Some(0));

        let audio = stream.output_at(0).unwrap().unwrap();
        assert_eq!(audio.samples.len(), 160);
        assert_eq!(audio.sample_rate, 8000);

        let pcma = Law::A.encode(&[1000; 160]);
        stream.input_at(&rtp(8, 2, &pcma), 20).unwrap();
        assert_eq!(stream.active_payload_type(), Some(8));
    }

    #[test]
    fn test_unregistered_payload_type_is_ignored() {
        let mut stream = stream();
        let signal = stream.input_at(&rtp(96, 1, &[1, 2, 3]), 0).unwrap();
        assert_eq!(signal, DecodeSignal::NotReady);
        assert_eq!(stream.unregistered(), 1);
        assert_eq!(stream.active_payload_type(), None);
        assert!(stream.output_at(0).unwrap().is_none());
    }

    #[test]
    fn test_malformed_and_rtcp_rejected() {
        let mut stream = stream();
        assert!(matches!(
            stream.input_at(&[0x80, 0, 1], 0),
            Err(PipelineError::MalformedPacket(RtpParseError::TooShort(3)))
        ));
        let sender_report = [0x80, 200, 0, 6, 0, 0, 0, 42, 0, 0, 0, 0];
        assert!(matches!(
            stream.input_at(&sender_report, 0),
            Err(PipelineError::MalformedPacket(RtpParseError::Rtcp(200)))
        ));
        assert_eq!(stream.malformed(), 2);
    }

    #[test]
    fn test_reregistration_clears_last_active() {
        let mut stream = stream();
        let pcmu = Law::Mu.encode(&[0; 160]);
        stream.input_at(&rtp(0, 1, &pcmu), 0).unwrap();
        assert_eq!(stream.active_payload_type(), Some(0));

        stream.register(&registration(0, Codec::Pcma)).unwrap();
        assert_eq!(stream.active_payload_type(), None);
        assert_eq!(stream.codec_for(0), Some(Codec::Pcma));
        assert!(stream.output_at(0).unwrap().is_none());

        // Registering another type leaves the active one alone.
        stream.input_at(&rtp(0, 2, &pcmu), 0).unwrap();
        stream.register(&registration(9, Codec::Pcmu)).unwrap();
        assert_eq!(stream.active_payload_type(), Some(0));
    }

    #[test]
    fn test_output_parameters_apply() {
        let mut stream = stream();
        stream.set_output_parameters(16000, 2).unwrap();
        assert!(stream.set_output_parameters(16000, 4).is_err());

        let pcmu = Law::Mu.encode(&[0; 160]);
        stream.input_at(&rtp(0, 1, &pcmu), 0).unwrap();
        let (planes, format) = stream.output_planar_f32(0).unwrap().unwrap();
        assert_eq!(format, StreamFormat::new(16000, 2));
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[0].len(), 320);
    }

    #[test]
    fn test_extension_header_is_skipped() {
        let mut stream = stream();
        let payload = Law::Mu.encode(&[0; 160]);
        let mut packet = build_header(1, 0, 42, 0, false).to_vec();
        packet[0] |= 0x10;
        packet.extend_from_slice(&[0xBE, 0xDE, 0x00, 0x01, 0, 0, 0, 0]);
        packet.extend_from_slice(&payload);

        stream.input_at(&packet, 0).unwrap();
        let audio = stream.output_at(0).unwrap().unwrap();
        assert_eq!(audio.samples.len(), 160);
    }

    #[test]
    fn test_padding_is_stripped_before_decoding() {
        let mut stream = stream();
        let mut packet = rtp(0, 1, &Law::Mu.encode(&[0; 160]));
        packet[0] |= 0x20;
        packet.extend_from_slice(&[0, 0, 0, 4]);

        stream.input_at(&packet, 0).unwrap();
        let audio = stream.output_at(0).unwrap().unwrap();
        assert_eq!(audio.samples.len(), 160);
    }

    #[test]
    fn test_invalid_registration() {
        let mut stream = stream();
        assert!(stream.register(&registration(200, Codec::Pcmu)).is_err());
        assert!(stream.register(&registration(5, Codec::Unknown)).is_err());
        assert!(stream.unregister(8));
        assert!(!stream.unregister(8));
    }
}
