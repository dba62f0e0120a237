//! Error taxonomy shared by the converter, the pipelines and the stream layer.
//!
//! Every failure here is local: the component that reports it stays usable
//! for the next call. Queue overflow is not an error; evictions are counted
//! and logged.

use thiserror::Error;

use crate::audio::codec::Codec;

/// Why a byte buffer was rejected as RTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RtpParseError {
    #[error("packet too short: {0} bytes")]
    TooShort(usize),
    #[error("unsupported RTP version {0}")]
    UnsupportedVersion(u8),
    #[error("RTCP packet type {0} on the RTP path")]
    Rtcp(u8),
    #[error("CSRC list truncated (count {0})")]
    TruncatedCsrc(u8),
    #[error("header extension truncated")]
    TruncatedExtension,
    #[error("invalid padding length {0}")]
    InvalidPadding(u8),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unsupported sample rate / channel combination. No state was changed.
    #[error("invalid parameters: {sample_rate} Hz / {channels} ch")]
    InvalidParameters { sample_rate: u32, channels: usize },

    /// The rate-conversion engine rejected a block. The block was dropped.
    #[error("converter failure: {0}")]
    ConverterFailure(String),

    /// The codec adapter produced nothing usable. The block or packet was dropped.
    #[error("{codec} codec failure: {reason}")]
    CodecFailure { codec: Codec, reason: String },

    /// Bytes that are not a well-formed RTP packet. They were ignored.
    #[error("malformed packet: {0}")]
    MalformedPacket(#[from] RtpParseError),
}

impl PipelineError {
    pub(crate) fn codec(codec: Codec, reason: impl Into<String>) -> Self {
        Self::CodecFailure {
            codec,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
