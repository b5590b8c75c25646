//! Protocol module containing message types, the binary codec, and the
//! sequence counter.
//!
//! Every message is one length-prefixed frame: an 8-byte header (version,
//! type code, payload length) followed by a message-specific payload. The
//! `codec` sub-module provides both slice-level `encode_message` /
//! `decode_message` functions and [`codec::WireCodec`] for
//! `tokio_util::codec::Framed` transports.

pub mod codec;
pub mod messages;
pub mod sequence;

pub use codec::{decode_message, encode_message, ProtocolError, WireCodec};
pub use messages::*;
pub use sequence::SequenceCounter;
