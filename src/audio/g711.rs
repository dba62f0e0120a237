//! G.711 A-law / µ-law companding (ITU-T G.711), 16-bit linear PCM in and out.

/// G.711 always runs at 8 kHz.
pub const SAMPLE_RATE: u32 = 8000;
/// G.711 is mono only.
pub const CHANNELS: usize = 1;

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 8159;

const SEG_ALAW_END: [i32; 8] = [0x1F, 0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF];
const SEG_ULAW_END: [i32; 8] = [0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF, 0x1FFF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Law {
    /// PCMA
    A,
    /// PCMU
    Mu,
}

impl Law {
    pub fn encode(self, samples: &[i16]) -> Vec<u8> {
        match self {
            Law::A => samples.iter().map(|&s| linear_to_alaw(s)).collect(),
            Law::Mu => samples.iter().map(|&s| linear_to_ulaw(s)).collect(),
        }
    }

    pub fn decode(self, payload: &[u8]) -> Vec<i16> {
        match self {
            Law::A => payload.iter().map(|&a| alaw_to_linear(a)).collect(),
            Law::Mu => payload.iter().map(|&u| ulaw_to_linear(u)).collect(),
        }
    }
}

fn segment(value: i32, table: &[i32; 8]) -> usize {
    table.iter().position(|&end| value <= end).unwrap_or(8)
}

pub fn linear_to_alaw(sample: i16) -> u8 {
    let mut pcm = (sample as i32) >> 3;
    let mask = if pcm >= 0 {
        0xD5
    } else {
        pcm = -pcm - 1;
        0x55
    };

    let seg = segment(pcm, &SEG_ALAW_END);
    if seg >= 8 {
        return 0x7F ^ mask;
    }

    let mut aval = (seg as i32) << 4;
    if seg < 2 {
        aval |= (pcm >> 1) & 0x0F;
    } else {
        aval |= (pcm >> seg) & 0x0F;
    }
    (aval as u8) ^ mask
}

pub fn alaw_to_linear(alaw: u8) -> i16 {
    let a = (alaw ^ 0x55) as i32;
    let mut value = (a & 0x0F) << 4;
    let seg = (a & 0x70) >> 4;
    match seg {
        0 => value += 8,
        1 => value += 0x108,
        _ => {
            value += 0x108;
            value <<= seg - 1;
        }
    }
    if a & 0x80 != 0 { value as i16 } else { -value as i16 }
}

pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut pcm = (sample as i32) >> 2;
    let mask = if pcm < 0 {
        pcm = -pcm;
        0x7F
    } else {
        0xFF
    };
    pcm = pcm.min(ULAW_CLIP) + (ULAW_BIAS >> 2);

    let seg = segment(pcm, &SEG_ULAW_END);
    if seg >= 8 {
        return 0x7F ^ mask;
    }

    let uval = ((seg as i32) << 4) | ((pcm >> (seg + 1)) & 0x0F);
    (uval as u8) ^ mask
}

pub fn ulaw_to_linear(ulaw: u8) -> i16 {
    let u = !ulaw as i32;
    let mut value = ((u & 0x0F) << 3) + ULAW_BIAS;
    value <<= (u & 0x70) >> 4;
    if u & 0x80 != 0 {
        (ULAW_BIAS - value) as i16
    } else {
        (value - ULAW_BIAS) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_codes() {
        assert_eq!(linear_to_ulaw(0), 0xFF);
        assert_eq!(linear_to_alaw(0), 0xD5);
        assert_eq!(ulaw_to_linear(0xFF), 0);
        assert_eq!(alaw_to_linear(0xD5), 8);
    }

    #[test]
    fn test_extremes_do_not_overflow() {
        for law in [Law::A, Law::Mu] {
            let encoded = law.encode(&[i16::MAX, i16::MIN]);
            let decoded = law.decode(&encoded);
            assert!(decoded[0] > 30000, "{:?}: {}", law, decoded[0]);
            assert!(decoded[1] < -30000, "{:?}: {}", law, decoded[1]);
        }
    }

    #[test]
    fn test_companding_error_is_bounded() {
        for law in [Law::A, Law::Mu] {
            for sample in (-32000i32..32000).step_by(97) {
                let sample = sample as i16;
                let restored = law.decode(&law.encode(&[sample]))[0];
                let error = (sample as i32 - restored as i32).abs();
                // Quantisation step is at most 1/16 of the segment magnitude.
                let bound = (sample as i32).abs() / 16 + 16;
                assert!(
                    error <= bound,
                    "{:?}: {} -> {} (error {})",
                    law,
                    sample,
                    restored,
                    error
                );
            }
        }
    }

    #[test]
    fn test_sign_is_preserved() {
        for law in [Law::A, Law::Mu] {
            let decoded = law.decode(&law.encode(&[1000, -1000]));
            assert!(decoded[0] > 0);
            assert!(decoded[1] < 0);
        }
    }
}
