//! Opus codec backend.
//!
//! Thin state wrappers around the `opus` crate. Both own a reusable output
//! buffer and hand out slices into it, so a result has to be copied out
//! before the next call.

use anyhow::{Context, Result};
use opus::{Application, Bitrate, Channels, Decoder, Encoder};

use crate::config::CodecConfig;

/// Largest packet libopus will ever produce.
pub const MAX_OPUS_PACKET_SIZE: usize = 4000;

const SUPPORTED_SAMPLE_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

fn channels_to_opus(channels: usize) -> Result<Channels> {
    match channels {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        _ => anyhow::bail!("Opus only supports 1 or 2 channels, got {}", channels),
    }
}

fn check_sample_rate(sample_rate: u32) -> Result<()> {
    if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
        anyhow::bail!(
            "Opus does not support {} Hz, expected one of {:?}",
            sample_rate,
            SUPPORTED_SAMPLE_RATES
        );
    }
    Ok(())
}

fn bitrate_to_opus(bitrate: i32) -> Bitrate {
    if bitrate <= 0 {
        Bitrate::Max
    } else {
        Bitrate::Bits(bitrate)
    }
}

pub struct OpusEncoderState {
    encoder: Encoder,
    output_buffer: Vec<u8>,
}

impl OpusEncoderState {
    pub fn new(config: &CodecConfig) -> Result<Self> {
        check_sample_rate(config.sample_rate)?;
        let channels = channels_to_opus(config.channels)?;
        let application = if config.voip {
            Application::Voip
        } else {
            Application::Audio
        };

        let mut encoder = Encoder::new(config.sample_rate, channels, application)
            .context("Failed to create Opus encoder")?;

        encoder
            .set_bitrate(bitrate_to_opus(config.bitrate))
            .context("Failed to set bitrate")?;

        Ok(Self {
            encoder,
            output_buffer: vec![0u8; MAX_OPUS_PACKET_SIZE],
        })
    }

    pub fn set_bitrate(&mut self, bitrate: i32) -> Result<()> {
        self.encoder
            .set_bitrate(bitrate_to_opus(bitrate))
            .context("Failed to set bitrate")
    }

    /// Trades CPU for quality, 0 (cheapest) to 10.
    pub fn set_complexity(&mut self, complexity: i32) -> Result<()> {
        self.encoder
            .set_complexity(complexity)
            .context("Failed to set complexity")
    }

    pub fn complexity(&mut self) -> Result<i32> {
        self.encoder
            .get_complexity()
            .context("Failed to read complexity")
    }

    /// Encodes one frame into at most `max_size` bytes.
    pub fn encode(&mut self, pcm: &[i16], max_size: usize) -> Result<&[u8]> {
        let max_size = max_size.min(self.output_buffer.len());
        let len = self
            .encoder
            .encode(pcm, &mut self.output_buffer[..max_size])
            .context("Opus encoding failed")?;

        Ok(&self.output_buffer[..len])
    }
}

pub struct OpusDecoderState {
    decoder: Decoder,
    channels: usize,
    output_buffer: Vec<i16>,
}

impl OpusDecoderState {
    pub fn new(sample_rate: u32, channels: usize) -> Result<Self> {
        check_sample_rate(sample_rate)?;
        let opus_channels = channels_to_opus(channels)?;

        let decoder =
            Decoder::new(sample_rate, opus_channels).context("Failed to create Opus decoder")?;

        Ok(Self {
            decoder,
            channels,
            output_buffer: Vec::new(),
        })
    }

    /// Decodes one packet into at most `max_samples` interleaved samples.
    pub fn decode(&mut self, opus_data: &[u8], max_samples: usize) -> Result<&[i16]> {
        if self.output_buffer.len() < max_samples {
            self.output_buffer.resize(max_samples, 0);
        }

        let samples_per_channel = self
            .decoder
            .decode(opus_data, &mut self.output_buffer[..max_samples], false)
            .context("Opus decoding failed")?;

        let total_samples = samples_per_channel * self.channels;
        Ok(&self.output_buffer[..total_samples])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opus_roundtrip() {
        let config = CodecConfig::opus(48000, 2, 20.0);
        let mut encoder = OpusEncoderState::new(&config).unwrap();
        let mut decoder = OpusDecoderState::new(48000, 2).unwrap();

        let samples: Vec<i16> = (0..960 * 2).map(|i| (i as i16) % 1000).collect();

        let encoded = encoder.encode(&samples, MAX_OPUS_PACKET_SIZE).unwrap().to_vec();
        assert!(encoded.len() < samples.len() * 2);

        let decoded = decoder.decode(&encoded, 48 * 120 * 2).unwrap();
        assert_eq!(decoded.len(), samples.len());
    }

    #[test]
    fn test_unsupported_sample_rate_rejected() {
        let config = CodecConfig::opus(44100, 1, 20.0);
        assert!(OpusEncoderState::new(&config).is_err());
        assert!(OpusDecoderState::new(22050, 1).is_err());
    }

    #[test]
    fn test_unsupported_channels_rejected() {
        let config = CodecConfig::opus(48000, 3, 20.0);
        assert!(OpusEncoderState::new(&config).is_err());
    }

    #[test]
    fn test_truncated_packet_rejected() {
        let mut decoder = OpusDecoderState::new(16000, 1).unwrap();
        // TOC byte for code 3 (arbitrary frame count) without the count byte.
        assert!(decoder.decode(&[0x03], 16 * 120).is_err());
    }

    #[test]
    fn test_complexity_applied() {
        let config = CodecConfig::opus(48000, 1, 20.0);
        let mut encoder = OpusEncoderState::new(&config).unwrap();
        encoder.set_complexity(3).unwrap();
        assert_eq!(encoder.complexity().unwrap(), 3);
        assert!(encoder.set_complexity(11).is_err());
        assert_eq!(encoder.complexity().unwrap(), 3);
    }

    #[test]
    fn test_bitrate_max_accepted() {
        let config = CodecConfig::opus(16000, 1, 20.0);
        let mut encoder = OpusEncoderState::new(&config).unwrap();
        assert!(encoder.set_bitrate(0).is_ok());
        assert!(encoder.set_bitrate(24000).is_ok());
    }
}
