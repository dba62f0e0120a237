//! Audio data types, codecs and format conversion.
//!
//! # Data Types
//! - [`frame::SampleBlock`] - Interleaved PCM tagged with capture times
//! - [`sample`] - Float/int16 and planar/interleaved conversion
//!
//! # Codecs
//! - [`codec`] - Codec identifiers and the encoder/decoder adapters
//! - [`opus`] - Opus backend
//! - [`g711`] - A-law / µ-law backend
//!
//! # Conversion
//! - [`resampler::SampleRateConverter`] - Rate and channel conversion
//!
//! # Buffers
//! - [`buffers::BoundedQueue`], [`buffers::FrameAccumulator`], [`buffers::PacketQueue`]

pub mod buffers;
pub mod codec;
pub mod frame;
pub mod g711;
pub mod opus;
pub mod resampler;
pub mod sample;

pub use codec::{Codec, Decoder, Encoder, NativeFormat};
pub use frame::SampleBlock;
pub use resampler::{Conversion, ConverterMode, SampleRateConverter};
