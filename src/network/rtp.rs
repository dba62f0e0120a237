//! RTP/RTCP header layout (RFC 3550).
//!
//! Stateless. Building always emits a plain 12-byte header (no padding, no
//! extension, no CSRC); parsing accepts all three.

use crate::error::RtpParseError;

pub const RTP_VERSION: u8 = 2;
pub const RTP_HEADER_LEN: usize = 12;
pub const MIN_RTCP_PACKET_LEN: usize = 4;

/// RTCP packet types share the RTP version bits and occupy this range of
/// the second byte (ignoring the marker bit).
const RTCP_TYPE_RANGE: std::ops::Range<u8> = 64..96;
const RTCP_TYPE_SDES: u8 = 202;

const FLAGS_OFFSET: usize = 0;
const PAYLOAD_TYPE_OFFSET: usize = 1;
const SEQ_OFFSET: usize = 2;
const TIMESTAMP_OFFSET: usize = 4;
const SSRC_OFFSET: usize = 8;

/// Fields of an outgoing header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeader {
    pub fn to_bytes(&self) -> [u8; RTP_HEADER_LEN] {
        build_header(
            self.sequence,
            self.timestamp,
            self.ssrc,
            self.payload_type,
            self.marker,
        )
    }
}

/// Fields of a received header plus its full length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedHeader {
    pub marker: bool,
    pub padding: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    /// Fixed header + CSRC list + extension block.
    pub header_len: usize,
    /// Trailing padding bytes, including the count byte itself.
    pub padding_len: usize,
}

impl ParsedHeader {
    pub fn header(&self) -> RtpHeader {
        RtpHeader {
            marker: self.marker,
            payload_type: self.payload_type,
            sequence: self.sequence,
            timestamp: self.timestamp,
            ssrc: self.ssrc,
        }
    }

    /// Payload of `data` with header and padding removed. `data` must be the
    /// packet this header was parsed from.
    pub fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let end = data.len().saturating_sub(self.padding_len);
        data.get(self.header_len..end).unwrap_or_default()
    }
}

fn flags(padding: bool, extension: bool, csrc_count: u8) -> u8 {
    (RTP_VERSION << 6) | ((padding as u8) << 5) | ((extension as u8) << 4) | (csrc_count & 0x0F)
}

fn be16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn be32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

pub fn build_header(
    sequence: u16,
    timestamp: u32,
    ssrc: u32,
    payload_type: u8,
    marker: bool,
) -> [u8; RTP_HEADER_LEN] {
    let mut header = [0u8; RTP_HEADER_LEN];
    header[FLAGS_OFFSET] = flags(false, false, 0);
    header[PAYLOAD_TYPE_OFFSET] = ((marker as u8) << 7) | (payload_type & 0x7F);
    header[SEQ_OFFSET..SEQ_OFFSET + 2].copy_from_slice(&sequence.to_be_bytes());
    header[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 4].copy_from_slice(&timestamp.to_be_bytes());
    header[SSRC_OFFSET..SSRC_OFFSET + 4].copy_from_slice(&ssrc.to_be_bytes());
    header
}

/// Length of the header including CSRCs and the extension block.
pub fn header_len(data: &[u8]) -> Result<usize, RtpParseError> {
    if data.len() < RTP_HEADER_LEN {
        return Err(RtpParseError::TooShort(data.len()));
    }
    let csrc_count = data[FLAGS_OFFSET] & 0x0F;
    let mut len = RTP_HEADER_LEN + csrc_count as usize * 4;
    if data.len() < len {
        return Err(RtpParseError::TruncatedCsrc(csrc_count));
    }

    if data[FLAGS_OFFSET] & 0x10 != 0 {
        if data.len() < len + 4 {
            return Err(RtpParseError::TruncatedExtension);
        }
        // Extension length counts 32-bit words after the 4-byte extension header.
        len += (be16(data, len + 2) as usize + 1) * 4;
        if data.len() < len {
            return Err(RtpParseError::TruncatedExtension);
        }
    }
    Ok(len)
}

pub fn parse_header(data: &[u8]) -> Result<ParsedHeader, RtpParseError> {
    if data.len() < RTP_HEADER_LEN {
        return Err(RtpParseError::TooShort(data.len()));
    }

    let b0 = data[FLAGS_OFFSET];
    let b1 = data[PAYLOAD_TYPE_OFFSET];

    let version = b0 >> 6;
    if version != RTP_VERSION {
        return Err(RtpParseError::UnsupportedVersion(version));
    }
    if RTCP_TYPE_RANGE.contains(&(b1 & 0x7F)) {
        return Err(RtpParseError::Rtcp(b1));
    }

    let header_len = header_len(data)?;
    let padding = b0 & 0x20 != 0;
    let padding_len = if padding {
        // The last byte counts the padding, itself included.
        let count = data[data.len() - 1];
        if count == 0 || header_len + count as usize > data.len() {
            return Err(RtpParseError::InvalidPadding(count));
        }
        count as usize
    } else {
        0
    };

    Ok(ParsedHeader {
        marker: b1 & 0x80 != 0,
        padding,
        payload_type: b1 & 0x7F,
        sequence: be16(data, SEQ_OFFSET),
        timestamp: be32(data, TIMESTAMP_OFFSET),
        ssrc: be32(data, SSRC_OFFSET),
        header_len,
        padding_len,
    })
}

/// Version bits say RTP and the packet holds at least a fixed header.
///
/// RTCP passes this check too; use [`is_rtcp_packet`] to tell them apart.
pub fn is_rtp_packet(data: &[u8]) -> bool {
    data.len() >= RTP_HEADER_LEN && data[0] & 0xC0 == 0x80
}

pub fn is_rtcp_packet(data: &[u8]) -> bool {
    data.len() >= MIN_RTCP_PACKET_LEN
        && data[0] & 0xC0 == 0x80
        && RTCP_TYPE_RANGE.contains(&(data[1] & 0x7F))
}

pub fn rtcp_packet_type(data: &[u8]) -> Option<u8> {
    (data.len() >= MIN_RTCP_PACKET_LEN).then(|| data[PAYLOAD_TYPE_OFFSET])
}

/// SSRC of the first RTCP packet in `data`. SDES is not supported.
pub fn rtcp_ssrc(data: &[u8]) -> Option<u32> {
    if data.len() < MIN_RTCP_PACKET_LEN + 4 {
        return None;
    }
    if rtcp_packet_type(data)? == RTCP_TYPE_SDES {
        return None;
    }
    Some(be32(data, 4))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_layout() {
        let header = build_header(0x1234, 0xDEADBEEF, 0x01020304, 111, true);
        assert_eq!(
            header,
            [0x80, 0x80 | 111, 0x12, 0x34, 0xDE, 0xAD, 0xBE, 0xEF, 1, 2, 3, 4]
        );
        let header = build_header(0, 0, 0, 0, false);
        assert_eq!(header[0], 0x80);
        assert_eq!(header[1], 0);
    }

    #[test]
    fn test_roundtrip_at_boundaries() {
        for pt in [0u8, 1, 63, 96, 111, 127] {
            for (seq, ts) in [(0u16, 0u32), (0xFFFF, 0xFFFF_FFFF), (1, 0x8000_0000)] {
                let bytes = build_header(seq, ts, 0xCAFEBABE, pt, false);
                let parsed = parse_header(&bytes).unwrap();
                assert_eq!(parsed.payload_type, pt);
                assert_eq!(parsed.sequence, seq);
                assert_eq!(parsed.timestamp, ts);
                assert_eq!(parsed.ssrc, 0xCAFEBABE);
                assert_eq!(parsed.header_len, 12);
            }
        }
    }

    #[test]
    fn test_rtcp_payload_types_are_not_rtp() {
        // 72 | 0x80 == 200, the RTCP sender report type.
        let bytes = build_header(1, 1, 1, 72, true);
        assert_eq!(parse_header(&bytes), Err(RtpParseError::Rtcp(200)));
        assert!(is_rtcp_packet(&bytes));
        assert!(is_rtp_packet(&bytes));
    }

    #[test]
    fn test_rejects_short_and_wrong_version() {
        assert_eq!(parse_header(&[0x80; 11]), Err(RtpParseError::TooShort(11)));
        let mut bytes = build_header(1, 1, 1, 0, false);
        bytes[0] = 0x40;
        assert_eq!(parse_header(&bytes), Err(RtpParseError::UnsupportedVersion(1)));
        assert!(!is_rtp_packet(&bytes));
    }

    #[test]
    fn test_header_len_with_csrc_and_extension() {
        let mut packet = build_header(1, 2, 3, 0, false).to_vec();
        packet[0] = flags(false, true, 2);
        packet.extend_from_slice(&[0; 8]); // two CSRCs
        packet.extend_from_slice(&[0xBE, 0xDE, 0x00, 0x01]); // one extension word
        packet.extend_from_slice(&[0; 4]);
        packet.extend_from_slice(&[9, 9, 9]);

        let parsed = parse_header(&packet).unwrap();
        assert_eq!(parsed.header_len, 12 + 8 + 4 + 4);
        assert_eq!(&packet[parsed.header_len..], &[9, 9, 9]);
    }

    #[test]
    fn test_padding_is_excluded_from_payload() {
        let mut packet = build_header(1, 2, 3, 0, false).to_vec();
        packet[0] = flags(true, false, 0);
        packet.extend_from_slice(&[7, 7, 0, 0, 3]);

        let parsed = parse_header(&packet).unwrap();
        assert!(parsed.padding);
        assert_eq!(parsed.padding_len, 3);
        assert_eq!(parsed.payload(&packet), &[7, 7]);

        let last = packet.len() - 1;
        packet[last] = 0;
        assert_eq!(parse_header(&packet), Err(RtpParseError::InvalidPadding(0)));
        packet[last] = 6;
        assert_eq!(parse_header(&packet), Err(RtpParseError::InvalidPadding(6)));
    }

    #[test]
    fn test_truncated_csrc_and_extension() {
        let mut packet = build_header(1, 2, 3, 0, false).to_vec();
        packet[0] = flags(false, false, 3);
        packet.extend_from_slice(&[0; 4]);
        assert_eq!(header_len(&packet), Err(RtpParseError::TruncatedCsrc(3)));

        let mut packet = build_header(1, 2, 3, 0, false).to_vec();
        packet[0] = flags(false, true, 0);
        packet.extend_from_slice(&[0xBE, 0xDE, 0x00, 0x02, 0, 0, 0, 0]);
        assert_eq!(header_len(&packet), Err(RtpParseError::TruncatedExtension));
    }

    #[test]
    fn test_rtcp_helpers() {
        let receiver_report = [0x81, 201, 0x00, 0x07, 0x11, 0x22, 0x33, 0x44];
        assert!(is_rtcp_packet(&receiver_report));
        assert_eq!(rtcp_packet_type(&receiver_report), Some(201));
        assert_eq!(rtcp_ssrc(&receiver_report), Some(0x11223344));

        let sdes = [0x81, 202, 0x00, 0x07, 0x11, 0x22, 0x33, 0x44];
        assert_eq!(rtcp_ssrc(&sdes), None);
        assert!(!is_rtcp_packet(&[0x80, 200]));
    }
}
