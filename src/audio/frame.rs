use anyhow::Result;

/// A run of interleaved PCM with the capture times of its first and last sample.
///
/// The sample count is always a multiple of the channel count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBlock {
    samples: Vec<i16>,
    channels: usize,
    first_time_ms: u64,
    last_time_ms: u64,
}

impl SampleBlock {
    /// Create a block from raw samples captured at `time_ms`.
    ///
    /// Returns an error if the data length is not a multiple of the channel count.
    pub fn new(samples: Vec<i16>, channels: usize, time_ms: u64) -> Result<Self> {
        if channels == 0 {
            anyhow::bail!("Channel count must be at least 1");
        }
        if samples.len() % channels != 0 {
            anyhow::bail!(
                "Data length {} must be a multiple of channels {}",
                samples.len(),
                channels
            );
        }
        Ok(Self {
            samples,
            channels,
            first_time_ms: time_ms,
            last_time_ms: time_ms,
        })
    }

    pub fn empty(channels: usize) -> Self {
        Self {
            samples: Vec::new(),
            channels: channels.max(1),
            first_time_ms: 0,
            last_time_ms: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn samples_per_channel(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn first_time_ms(&self) -> u64 {
        self.first_time_ms
    }

    pub fn last_time_ms(&self) -> u64 {
        self.last_time_ms
    }

    pub fn data(&self) -> &[i16] {
        &self.samples
    }

    pub fn into_inner(self) -> Vec<i16> {
        self.samples
    }

    /// Appends samples captured at `time_ms`. Trailing samples that do not
    /// fill a whole frame are dropped; `FrameAccumulator` carries them over
    /// instead.
    pub fn extend(&mut self, samples: &[i16], time_ms: u64) {
        let whole = samples.len() - samples.len() % self.channels;
        if whole == 0 {
            return;
        }
        if self.samples.is_empty() {
            self.first_time_ms = time_ms;
        }
        self.samples.extend_from_slice(&samples[..whole]);
        self.last_time_ms = time_ms;
    }

    /// Splits off the oldest `count` samples (rounded down to whole frames).
    ///
    /// Both halves keep the capture time of the block they came from.
    pub fn split_front(&mut self, count: usize) -> SampleBlock {
        let count = count.min(self.samples.len());
        let count = count - count % self.channels;
        let rest = self.samples.split_off(count);
        let front = std::mem::replace(&mut self.samples, rest);
        let block = SampleBlock {
            samples: front,
            channels: self.channels,
            first_time_ms: self.first_time_ms,
            last_time_ms: self.last_time_ms,
        };
        if self.samples.is_empty() {
            self.first_time_ms = self.last_time_ms;
        }
        block
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Iterator over the samples of one channel.
    pub fn iter_channel(&self, channel_idx: usize) -> impl Iterator<Item = &i16> {
        self.samples.iter().skip(channel_idx).step_by(self.channels)
    }
}
