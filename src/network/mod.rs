//! RTP framing. No sockets live here; bytes come in and go out as slices.
//!
//! - [`rtp`] - Header layout, parsing and RTCP detection
//! - [`timestamp`] - Media clock of an outgoing stream

pub mod rtp;
pub mod timestamp;

pub use rtp::{ParsedHeader, RtpHeader, build_header, is_rtcp_packet, is_rtp_packet, parse_header};
pub use timestamp::RtpTimestamp;
