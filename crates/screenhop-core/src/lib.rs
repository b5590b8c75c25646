//! # screenhop-core
//!
//! Shared library for screenhop containing the network protocol codec and the
//! screen-topology domain logic.
//!
//! This crate is used by the server and by anything that needs to speak the
//! wire protocol (test harnesses, future client work). It has zero
//! dependencies on OS APIs or network sockets.
//!
//! screenhop is a software KVM: one machine (the *primary*) owns the physical
//! keyboard, mouse, and clipboard; other machines (*secondaries*) connect
//! over TCP and receive forwarded input whenever the user's cursor crosses
//! onto their screen. This crate defines:
//!
//! - **`protocol`** – How bytes travel over the network: a length-prefixed
//!   binary frame format, typed message structs, and the sequence counter
//!   that linearizes clipboard ownership.
//!
//! - **`domain`** – Pure routing logic: screen shapes in a shared virtual
//!   coordinate space, the user-configured edge map, jump-zone detection,
//!   and cursor projection across screen edges.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `screenhop_core::WireMessage` instead of the full path.
pub use domain::geometry::ScreenShape;
pub use domain::topology::{
    jump_direction, leave_direction, project, validate, Direction, EdgeMap, Projection,
    ShapeSource, TopologyError, TopologyIssue,
};
pub use protocol::codec::{decode_message, encode_message, ProtocolError, WireCodec};
pub use protocol::messages::{
    ButtonId, ClipboardId, EnterMessage, InfoMessage, KeyId, ModifierMask, WireMessage,
};
pub use protocol::sequence::SequenceCounter;
