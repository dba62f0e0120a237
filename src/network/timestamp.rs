//! RTP timestamp generation for one outgoing stream.

use rand::Rng;
use tracing::{debug, info};

/// Top two bits stay clear so the first value never sits near wrap-around.
const RANDOM_TIMESTAMP_MAX: u32 = 0x3FFF_FFFF;

/// Gap, in frames, after which the timestamp catches up with wall-clock time.
pub const STALL_FRAMES: u64 = 250;

/// Media clock of one stream.
///
/// The first packet gets a random 30-bit timestamp. Each following packet
/// advances by one frame, unless the caller stalled for at least
/// [`STALL_FRAMES`] frames, in which case it advances by the number of
/// frames that fit into the gap.
#[derive(Debug, Clone)]
pub struct RtpTimestamp {
    current: Option<u32>,
    last_time_ms: u64,
    frame_ms: f32,
    samples_per_frame: u32,
}

impl RtpTimestamp {
    /// `samples_per_frame` is per channel, the RTP clock unit.
    pub fn new(frame_ms: f32, samples_per_frame: u32) -> Self {
        Self {
            current: None,
            last_time_ms: 0,
            frame_ms,
            samples_per_frame,
        }
    }

    /// Starts from `initial` instead of a random value.
    pub fn with_initial(frame_ms: f32, samples_per_frame: u32, initial: u32) -> Self {
        Self {
            current: Some(initial),
            ..Self::new(frame_ms, samples_per_frame)
        }
    }

    /// Changes the frame geometry. The running timestamp is kept.
    pub fn set_frame(&mut self, frame_ms: f32, samples_per_frame: u32) {
        self.frame_ms = frame_ms;
        self.samples_per_frame = samples_per_frame;
    }

    pub fn current(&self) -> Option<u32> {
        self.current
    }

    /// Timestamp for a packet emitted at `now_ms`.
    pub fn next(&mut self, now_ms: u64) -> u32 {
        let ts = match self.current {
            None => {
                let ts = rand::thread_rng().gen_range(1..=RANDOM_TIMESTAMP_MAX);
                info!("RtpTimestamp: first timestamp={}", ts);
                ts
            }
            Some(last) if self.last_time_ms == 0 => {
                last.wrapping_add(self.samples_per_frame)
            }
            Some(last) => {
                let delta = self.frames_elapsed(now_ms);
                last.wrapping_add((delta as u32).wrapping_mul(self.samples_per_frame))
            }
        };
        self.current = Some(ts);
        self.last_time_ms = now_ms;
        ts
    }

    fn frames_elapsed(&self, now_ms: u64) -> u64 {
        let frame_ms = self.frame_ms as f64;
        if frame_ms <= 0.0 {
            return 1;
        }
        let stall_ms = (frame_ms * STALL_FRAMES as f64) as u64;
        if now_ms < self.last_time_ms + stall_ms {
            return 1;
        }
        let gap = now_ms - self.last_time_ms;
        let delta = ((gap as f64 / frame_ms) as u64).max(1);
        debug!(
            "RtpTimestamp: {}ms stall, advancing {} frames",
            gap, delta
        );
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_timestamp_is_30_bit() {
        for _ in 0..100 {
            let mut ts = RtpTimestamp::new(20.0, 960);
            let first = ts.next(1000);
            assert!((1..=RANDOM_TIMESTAMP_MAX).contains(&first));
        }
    }

    #[test]
    fn test_advances_one_frame_per_packet() {
        let mut ts = RtpTimestamp::with_initial(20.0, 160, 5000);
        assert_eq!(ts.next(1000), 5160);
        assert_eq!(ts.next(1020), 5320);
        // Bursty output inside the stall window still counts one frame.
        assert_eq!(ts.next(1021), 5480);
        assert_eq!(ts.next(1022 + 4000), 5640);
    }

    #[test]
    fn test_stall_compensation() {
        let mut ts = RtpTimestamp::new(20.0, 160);
        let first = ts.next(10_000);
        // 250 frames of 20 ms is 5000 ms; a 6000 ms gap is 300 frames.
        let second = ts.next(16_000);
        assert_eq!(second, first.wrapping_add(300 * 160));
        let third = ts.next(16_020);
        assert_eq!(third, second.wrapping_add(160));
    }

    #[test]
    fn test_wraps_at_32_bits() {
        let mut ts = RtpTimestamp::with_initial(20.0, 960, u32::MAX - 100);
        assert_eq!(ts.next(0), 859);
    }
}
