//! Protocol module containing message types, the wire codec and sequence numbering.

pub mod codec;
pub mod messages;
pub mod sequence;
pub mod wire;

pub use codec::{decode_message, decode_request, encode_message, encode_request, ProtocolError};
pub use messages::*;
pub use sequence::SequenceCounter;
