//! PCM ⇄ RTP audio transport.
//!
//! Raw PCM goes into a [`LocalStream`], which buffers it, converts it to the
//! codec's format, encodes it and frames it as RTP. Received RTP goes into a
//! [`RemoteStream`], which routes it by payload type to a jitter-paced
//! decode pipeline and converts the decoded audio to the caller's format.
//!
//! Everything is single-threaded and synchronous. Sockets are left to the
//! caller.

pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod network;
pub mod party;
pub mod pipeline;

pub use audio::codec::Codec;
pub use config::{BridgeConfig, CodecConfig, LocalStreamConfig, RemoteStreamConfig};
pub use error::{PipelineError, RtpParseError};
pub use party::{LocalStream, RemoteStream};
pub use pipeline::{DecodeSignal, DecodedAudio, PacingSignal};
