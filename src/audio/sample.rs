//! Sample format conversion at the float boundary of the pipelines.
//!
//! Everything inside the crate runs on interleaved `i16`. Float audio is
//! normalized to [-1.0, 1.0]; planar audio is one slice per channel.

/// Converts one normalized float sample to 16-bit PCM.
///
/// Out-of-range input is clamped. Negative values scale by 32768 and
/// positive values by 32767 so that both ends of the range are reachable.
pub fn f32_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
    scaled.round() as i16
}

pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

pub fn f32_slice_to_i16(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| f32_to_i16(s)).collect()
}

pub fn i16_slice_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| i16_to_f32(s)).collect()
}

/// Interleaves planar float channels into 16-bit PCM.
///
/// The shortest channel decides the frame count.
pub fn interleave_planar_f32(planes: &[&[f32]]) -> Vec<i16> {
    let frames = planes.iter().map(|p| p.len()).min().unwrap_or(0);
    let mut interleaved = Vec::with_capacity(frames * planes.len());
    for frame_idx in 0..frames {
        for plane in planes {
            interleaved.push(f32_to_i16(plane[frame_idx]));
        }
    }
    interleaved
}

/// Splits interleaved 16-bit PCM into one float plane per channel.
pub fn deinterleave_to_f32(samples: &[i16], channels: usize) -> Vec<Vec<f32>> {
    if channels == 0 {
        return Vec::new();
    }
    let frames = samples.len() / channels;
    let mut planes = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (plane, &sample) in planes.iter_mut().zip(frame) {
            plane.push(i16_to_f32(sample));
        }
    }
    planes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_i16_clamps() {
        assert_eq!(f32_to_i16(1.5), 32767);
        assert_eq!(f32_to_i16(-2.0), -32768);
        assert_eq!(f32_to_i16(1.0), 32767);
        assert_eq!(f32_to_i16(-1.0), -32768);
        assert_eq!(f32_to_i16(0.0), 0);
    }

    #[test]
    fn test_f32_to_i16_rounds() {
        assert_eq!(f32_to_i16(0.5), 16384);
        assert_eq!(f32_to_i16(-0.5), -16384);
    }

    #[test]
    fn test_interleave_planar() {
        let left = [0.0, 0.5];
        let right = [-0.5, 1.0, 1.0];
        let interleaved = interleave_planar_f32(&[&left, &right]);
        assert_eq!(interleaved, vec![0, -16384, 16384, 32767]);
    }

    #[test]
    fn test_deinterleave() {
        let planes = deinterleave_to_f32(&[0, -16384, 16384, -32768], 2);
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[0], vec![0.0, 0.5]);
        assert_eq!(planes[1], vec![-0.5, -1.0]);
    }
}
