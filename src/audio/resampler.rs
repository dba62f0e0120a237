//! Sample rate and channel layout conversion.
//!
//! The converter picks one of four strategies from its endpoint formats and
//! rebuilds its state whenever either endpoint changes. Rate conversion is
//! delegated to rubato; only the channel folding is done here.

use rubato::{FftFixedIn, Resampler};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

pub const MIN_SAMPLE_RATE: u32 = 8000;
pub const MAX_SAMPLE_RATE: u32 = 96000;

/// One side of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: usize,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn validate(self) -> Result<Self> {
        let rate_ok = (MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate);
        let channels_ok = matches!(self.channels, 1 | 2);
        if rate_ok && channels_ok {
            Ok(self)
        } else {
            Err(PipelineError::InvalidParameters {
                sample_rate: self.sample_rate,
                channels: self.channels,
            })
        }
    }
}

/// Which strategy the converter currently runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterMode {
    Passthrough,
    MonoToStereo,
    StereoToMono,
    RateConvert,
}

/// Result of one [`SampleRateConverter::push`].
#[derive(Debug, PartialEq, Eq)]
pub enum Conversion<'a> {
    /// Input and output formats match; use the input as is.
    NotNeeded,
    /// Converted samples, borrowed from the converter until the next push.
    Produced(&'a [i16]),
}

struct RateState {
    resampler: FftFixedIn<f32>,
    channels: usize,
    in_rate: u64,
    out_rate: u64,
    /// Planar input waiting for a full resampler chunk.
    pending_in: Vec<Vec<f32>>,
    /// Interleaved resampler output not yet handed out.
    pending_out: Vec<i16>,
    /// Remainder of `frames * out_rate / in_rate` carried between pushes.
    frac: u64,
}

impl RateState {
    fn new(in_rate: u32, out_rate: u32, channels: usize) -> Result<Self> {
        // Chunks of 10 ms keep the added latency below one codec frame.
        let chunk = (in_rate / 100).max(1) as usize;
        let resampler =
            FftFixedIn::<f32>::new(in_rate as usize, out_rate as usize, chunk, 2, channels)
                .map_err(|e| PipelineError::ConverterFailure(e.to_string()))?;

        Ok(Self {
            resampler,
            channels,
            in_rate: in_rate as u64,
            out_rate: out_rate as u64,
            pending_in: vec![Vec::with_capacity(chunk * 2); channels],
            pending_out: Vec::new(),
            frac: 0,
        })
    }

    fn clear(&mut self) {
        self.resampler.reset();
        for plane in &mut self.pending_in {
            plane.clear();
        }
        self.pending_out.clear();
        self.frac = 0;
    }

    /// Resamples interleaved input already at `self.channels` and writes
    /// exactly the proportional number of output frames into `output`.
    fn process(&mut self, input: &[i16], output: &mut Vec<i16>) -> Result<()> {
        for frame in input.chunks_exact(self.channels) {
            for (plane, &sample) in self.pending_in.iter_mut().zip(frame) {
                plane.push(sample as f32 / 32768.0);
            }
        }

        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending_in[0].len() < needed {
                break;
            }
            let chunk: Vec<Vec<f32>> = self
                .pending_in
                .iter_mut()
                .map(|plane| plane.drain(..needed).collect())
                .collect();

            let resampled = match self.resampler.process(&chunk, None) {
                Ok(resampled) => resampled,
                Err(e) => {
                    self.clear();
                    return Err(PipelineError::ConverterFailure(e.to_string()));
                }
            };

            let out_frames = resampled[0].len();
            for frame_idx in 0..out_frames {
                for plane in &resampled {
                    let scaled = (plane[frame_idx] * 32768.0).round();
                    self.pending_out
                        .push(scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16);
                }
            }
        }

        let in_frames = (input.len() / self.channels) as u64;
        self.frac += in_frames * self.out_rate;
        let want = (self.frac / self.in_rate) as usize * self.channels;
        self.frac %= self.in_rate;

        output.clear();
        let available = self.pending_out.len().min(want);
        // Startup latency of the filter: pad with silence in front.
        output.resize(want - available, 0);
        output.extend(self.pending_out.drain(..available));
        Ok(())
    }
}

enum ConverterState {
    Passthrough,
    MonoToStereo,
    StereoToMono,
    RateConvert(Box<RateState>),
}

impl ConverterState {
    fn mode(&self) -> ConverterMode {
        match self {
            ConverterState::Passthrough => ConverterMode::Passthrough,
            ConverterState::MonoToStereo => ConverterMode::MonoToStereo,
            ConverterState::StereoToMono => ConverterMode::StereoToMono,
            ConverterState::RateConvert(_) => ConverterMode::RateConvert,
        }
    }
}

pub struct SampleRateConverter {
    input: Option<StreamFormat>,
    output: Option<StreamFormat>,
    state: ConverterState,
    /// Channel-normalized input for the rate path.
    scratch: Vec<i16>,
    buffer: Vec<i16>,
}

impl Default for SampleRateConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleRateConverter {
    /// An unconfigured converter passes everything through.
    pub fn new() -> Self {
        Self {
            input: None,
            output: None,
            state: ConverterState::Passthrough,
            scratch: Vec::new(),
            buffer: Vec::new(),
        }
    }

    pub fn mode(&self) -> ConverterMode {
        self.state.mode()
    }

    pub fn input_format(&self) -> Option<StreamFormat> {
        self.input
    }

    pub fn output_format(&self) -> Option<StreamFormat> {
        self.output
    }

    /// Selects the conversion strategy for `in → out`.
    ///
    /// Rejects channel counts other than 1 or 2 and rates outside
    /// 8–96 kHz without touching the current state. Calling with the
    /// current formats is a no-op; any change replaces the state.
    pub fn configure(
        &mut self,
        in_rate: u32,
        in_channels: usize,
        out_rate: u32,
        out_channels: usize,
    ) -> Result<()> {
        let input = StreamFormat::new(in_rate, in_channels).validate()?;
        let output = StreamFormat::new(out_rate, out_channels).validate()?;

        if self.input == Some(input) && self.output == Some(output) {
            return Ok(());
        }

        let state = if in_rate != out_rate {
            ConverterState::RateConvert(Box::new(RateState::new(in_rate, out_rate, out_channels)?))
        } else if in_channels == out_channels {
            ConverterState::Passthrough
        } else if in_channels == 1 {
            ConverterState::MonoToStereo
        } else {
            ConverterState::StereoToMono
        };

        debug!(
            in_rate,
            in_channels,
            out_rate,
            out_channels,
            mode = ?state.mode(),
            "Converter configured"
        );

        self.input = Some(input);
        self.output = Some(output);
        self.state = state;
        self.buffer.clear();
        Ok(())
    }

    /// Converts one block of interleaved input.
    ///
    /// The returned slice borrows the converter's single output buffer, so
    /// it must be consumed before the next call. A failure drops the block
    /// and resets the filter history; the converter stays usable.
    pub fn push(&mut self, samples: &[i16]) -> Result<Conversion<'_>> {
        match &mut self.state {
            ConverterState::Passthrough => Ok(Conversion::NotNeeded),
            ConverterState::MonoToStereo => {
                self.buffer.clear();
                mono_to_stereo(samples, &mut self.buffer);
                Ok(Conversion::Produced(&self.buffer))
            }
            ConverterState::StereoToMono => {
                self.buffer.clear();
                stereo_to_mono(samples, &mut self.buffer);
                Ok(Conversion::Produced(&self.buffer))
            }
            ConverterState::RateConvert(rate) => {
                let in_channels = self.input.map_or(rate.channels, |f| f.channels);
                let normalized: &[i16] = if in_channels == rate.channels {
                    samples
                } else {
                    self.scratch.clear();
                    if in_channels == 1 {
                        mono_to_stereo(samples, &mut self.scratch);
                    } else {
                        stereo_to_mono(samples, &mut self.scratch);
                    }
                    &self.scratch
                };

                if let Err(e) = rate.process(normalized, &mut self.buffer) {
                    warn!("Converter dropped {} samples: {e}", samples.len());
                    self.buffer.clear();
                    return Err(e);
                }
                Ok(Conversion::Produced(&self.buffer))
            }
        }
    }

    /// Output capacity to reserve for `src_len` input samples: the exact
    /// ratio rounded up, doubled.
    pub fn expected_capacity(&self, src_len: usize) -> usize {
        match (self.input, self.output) {
            (Some(input), Some(output)) => {
                let num = src_len as u64 * output.sample_rate as u64 * output.channels as u64;
                let den = input.sample_rate as u64 * input.channels as u64;
                (num.div_ceil(den) * 2) as usize
            }
            _ => src_len * 2,
        }
    }
}

fn mono_to_stereo(samples: &[i16], out: &mut Vec<i16>) {
    out.reserve(samples.len() * 2);
    for &s in samples {
        out.push(s);
        out.push(s);
    }
}

/// Floor average of each pair.
fn stereo_to_mono(samples: &[i16], out: &mut Vec<i16>) {
    out.reserve(samples.len() / 2);
    for pair in samples.chunks_exact(2) {
        out.push(((pair[0] as i32 + pair[1] as i32) >> 1) as i16);
    }
}
