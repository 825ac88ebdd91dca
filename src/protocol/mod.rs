//! PostgreSQL v2 frontend/backend wire protocol.
//!
//! Unlike protocol v3, most v2 messages have no length prefix: a single
//! tag byte is followed by a message-specific payload, frequently built
//! from NUL-terminated strings. Framing is therefore done per message
//! type against the connection's input buffer.

pub mod backend;
pub mod codec;
pub mod frontend;

/// PostgreSQL Object Identifier (OID)
pub type Oid = u32;

/// Protocol major version sent in the startup packet.
pub const PROTOCOL_MAJOR: i16 = 2;

/// Protocol minor version sent in the startup packet.
pub const PROTOCOL_MINOR: i16 = 0;
