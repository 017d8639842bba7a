//! Framed, typed channels between nodes.

mod asymmetric;
pub mod codec;

pub use asymmetric::{Channel, Error, Receiver, Sender};
pub use codec::FrameCodec;
