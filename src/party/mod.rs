//! RTP stream endpoints.
//!
//! - [`LocalStream`] - Encode pipeline plus RTP framing for one outgoing stream
//! - [`RemoteStream`] - Payload-type registry of decode pipelines for one incoming stream

pub mod local;
pub mod remote;

pub use local::LocalStream;
pub use remote::RemoteStream;
