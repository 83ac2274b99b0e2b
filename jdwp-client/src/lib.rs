// JDWP client library for Java debugging
//
// Implements the core of the JDWP wire protocol:
// - Packet encoding and reply decoding
// - Command/reply correlation over one connection
// - TCP transport with handshake and framing
// - A small session facade (attach, initialize, detach)

pub mod commands;
pub mod config;
pub mod connection;
pub mod endian;
pub mod engine;
pub mod protocol;
pub mod reader;
pub mod transport;
pub mod types;
pub mod vm;

#[cfg(test)]
mod testing;

pub use config::JdwpConfig;
pub use connection::JdwpConnection;
pub use engine::{ConnectionState, JdwpEngine, PendingReply};
pub use protocol::{JdwpError, JdwpResult};
pub use reader::ReplyPacketParser;
pub use types::{ClassData, ClassInfo, IdSizes, VmVersion};
