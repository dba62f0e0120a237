//! Encode and decode pipelines.
//!
//! - [`EncodePipeline`] - PCM chunks to paced, encoded frames
//! - [`DecodePipeline`] - Received payloads to paced PCM at any format
//! - [`pacing`] - The pacers both pipelines report through

pub mod decode;
pub mod encode;
pub mod pacing;

pub use decode::{DecodePipeline, DecodedAudio};
pub use encode::EncodePipeline;
pub use pacing::{DecodeSignal, PacingSignal};
