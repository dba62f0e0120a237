//! Buffer types shared by the encode and decode paths.
//!
//! - [`BoundedQueue`] - Drop-oldest FIFO with an eviction counter
//! - [`FrameAccumulator`] - Residual buffer producing fixed-size frames
//! - [`PacketQueue`] - Count- and age-bounded queue of received packets

pub mod bounded_queue;
pub mod frame_accumulator;
pub mod packet_queue;

pub use bounded_queue::BoundedQueue;
pub use frame_accumulator::FrameAccumulator;
pub use packet_queue::{IncomingPacket, PacketQueue};
