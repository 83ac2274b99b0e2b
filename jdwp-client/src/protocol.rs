// JDWP protocol definitions and packet handling
//
// Reference: https://docs.oracle.com/javase/8/docs/platform/jpda/jdwp/jdwp-protocol.html

use crate::commands::Command;
use bytes::{BufMut, BytesMut};
use std::io;
use std::sync::Arc;
use thiserror::Error;

// JDWP uses big-endian (network byte order) for all multi-byte values
// This is architecture-independent (works on Intel, ARM M1/M2/M3, etc.)

pub type JdwpResult<T> = Result<T, JdwpError>;

#[derive(Debug, Error)]
pub enum JdwpError {
    /// The VM closed the socket instead of answering the handshake
    #[error("VM is not accepting connections from the debugger")]
    VmUnavailable,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Transport fault. Shared because one disconnect resolves many operations.
    #[error("Socket error: {0}")]
    SocketError(#[source] Arc<io::Error>),

    #[error("Failed to connect: {0}")]
    ConnectFailure(#[source] io::Error),

    #[error("Failed to send bytes: {0}")]
    SendFailure(#[source] io::Error),

    #[error("JDWP error. Id: {id} Error Code: {error_code} ({})", code_name(.error_code))]
    CommandFailure { id: u32, error_code: u16 },

    #[error("IDSizes was not initialized")]
    FailedToInitialize,

    #[error("IDSizes was already set for this connection")]
    IdSizesAlreadySet,

    #[error("Operation cancelled")]
    Cancelled,
}

impl JdwpError {
    pub fn socket(err: io::Error) -> Self {
        JdwpError::SocketError(Arc::new(err))
    }
}

// JDWP handshake string
pub const JDWP_HANDSHAKE: &[u8] = b"JDWP-Handshake";

// Packet structure:
// length (4 bytes) - includes header
// id (4 bytes)
// flags (1 byte) - 0x00 = command, 0x80 = reply
// [Command packet: command set (1 byte) + command (1 byte)]
// [Reply packet: error code (2 bytes)]
// data (variable)

pub const HEADER_SIZE: usize = 11;
pub const REPLY_FLAG: u8 = 0x80;
pub const FLAGS_OFFSET: usize = 8;

/// (command set, command) pair identifying a JDWP command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId {
    pub command_set: u8,
    pub command: u8,
}

impl CommandId {
    pub const fn new(command_set: u8, command: u8) -> Self {
        Self {
            command_set,
            command,
        }
    }
}

/// A command bound to the packet id it will travel under
#[derive(Debug, Clone)]
pub struct CommandPacket<C> {
    id: u32,
    command: C,
}

impl<C: Command> CommandPacket<C> {
    pub fn new(id: u32, command: C) -> Self {
        Self { id, command }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn command(&self) -> &C {
        &self.command
    }

    pub fn into_command(self) -> C {
        self.command
    }

    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let payload = self.command.encode_payload();
        let length = HEADER_SIZE + payload.len();
        let mut buf = BytesMut::with_capacity(length);

        buf.put_u32(length as u32);
        buf.put_u32(self.id);
        buf.put_u8(0x00); // command flag
        buf.put_u8(C::ID.command_set);
        buf.put_u8(C::ID.command);
        buf.put_slice(&payload);

        buf.to_vec()
    }
}

/// Encode a reply frame (the VM side of the exchange)
pub fn encode_reply(id: u32, error_code: u16, payload: &[u8]) -> Vec<u8> {
    let length = HEADER_SIZE + payload.len();
    let mut buf = BytesMut::with_capacity(length);

    buf.put_u32(length as u32);
    buf.put_u32(id);
    buf.put_u8(REPLY_FLAG);
    buf.put_u16(error_code);
    buf.put_slice(payload);

    buf.to_vec()
}

/// Write a JDWP string (4-byte length prefix + UTF-8 bytes)
pub fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

fn code_name(error_code: &u16) -> &'static str {
    error_name(*error_code)
}

pub fn error_name(error_code: u16) -> &'static str {
    match error_code {
        0 => "NONE",
        10 => "INVALID_THREAD",
        11 => "INVALID_THREAD_GROUP",
        12 => "INVALID_PRIORITY",
        13 => "THREAD_NOT_SUSPENDED",
        14 => "THREAD_SUSPENDED",
        15 => "THREAD_NOT_ALIVE",
        20 => "INVALID_OBJECT",
        21 => "INVALID_CLASS",
        22 => "CLASS_NOT_PREPARED",
        23 => "INVALID_METHODID",
        24 => "INVALID_LOCATION",
        25 => "INVALID_FIELDID",
        30 => "INVALID_FRAMEID",
        31 => "NO_MORE_FRAMES",
        32 => "OPAQUE_FRAME",
        33 => "NOT_CURRENT_FRAME",
        34 => "TYPE_MISMATCH",
        35 => "INVALID_SLOT",
        40 => "DUPLICATE",
        41 => "NOT_FOUND",
        50 => "INVALID_MONITOR",
        51 => "NOT_MONITOR_OWNER",
        52 => "INTERRUPT",
        60 => "INVALID_CLASS_FORMAT",
        61 => "CIRCULAR_CLASS_DEFINITION",
        62 => "FAILS_VERIFICATION",
        63 => "ADD_METHOD_NOT_IMPLEMENTED",
        64 => "SCHEMA_CHANGE_NOT_IMPLEMENTED",
        65 => "INVALID_TYPESTATE",
        66 => "HIERARCHY_CHANGE_NOT_IMPLEMENTED",
        67 => "DELETE_METHOD_NOT_IMPLEMENTED",
        68 => "UNSUPPORTED_VERSION",
        69 => "NAMES_DONT_MATCH",
        70 => "CLASS_MODIFIERS_CHANGE_NOT_IMPLEMENTED",
        71 => "METHOD_MODIFIERS_CHANGE_NOT_IMPLEMENTED",
        99 => "NOT_IMPLEMENTED",
        100 => "NULL_POINTER",
        101 => "ABSENT_INFORMATION",
        102 => "INVALID_EVENT_TYPE",
        103 => "ILLEGAL_ARGUMENT",
        110 => "OUT_OF_MEMORY",
        111 => "ACCESS_DENIED",
        112 => "VM_DEAD",
        113 => "INTERNAL",
        115 => "UNATTACHED_THREAD",
        500 => "INVALID_TAG",
        502 => "ALREADY_INVOKING",
        503 => "INVALID_INDEX",
        504 => "INVALID_LENGTH",
        506 => "INVALID_STRING",
        507 => "INVALID_CLASS_LOADER",
        508 => "INVALID_ARRAY",
        509 => "TRANSPORT_LOAD",
        510 => "TRANSPORT_INIT",
        511 => "NATIVE_METHOD",
        512 => "INVALID_COUNT",
        _ => "UNKNOWN_ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{ClassesBySignatureCommand, VersionCommand};

    #[test]
    fn test_command_packet_encode() {
        let packet = CommandPacket::new(1, VersionCommand::default());
        let encoded = packet.to_wire_bytes();

        assert_eq!(encoded.len(), HEADER_SIZE);
        assert_eq!(&encoded[0..4], &[0, 0, 0, 11]); // length (big-endian)
        assert_eq!(&encoded[4..8], &[0, 0, 0, 1]); // id (big-endian)
        assert_eq!(encoded[8], 0x00); // command flag
        assert_eq!(encoded[9], 1); // command set
        assert_eq!(encoded[10], 1); // command
    }

    #[test]
    fn test_big_endian_encoding() {
        // ID should be encoded as big-endian: 0x12345678
        let packet = CommandPacket::new(0x12345678, VersionCommand::default());
        let encoded = packet.to_wire_bytes();

        assert_eq!(&encoded[4..8], &[0x12, 0x34, 0x56, 0x78]);
        assert_ne!(&encoded[4..8], &[0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_length_covers_payload() {
        let signature = "Ljava/lang/String;";
        let packet = CommandPacket::new(7, ClassesBySignatureCommand::new(signature));
        let encoded = packet.to_wire_bytes();

        let payload_len = 4 + signature.len();
        assert_eq!(encoded.len(), HEADER_SIZE + payload_len);
        assert_eq!(
            u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]) as usize,
            HEADER_SIZE + payload_len
        );
        assert_eq!(&encoded[9..11], &[1, 2]);
        assert_eq!(&encoded[HEADER_SIZE + 4..], signature.as_bytes());
    }

    #[test]
    fn test_encode_reply_header() {
        let reply = encode_reply(9, 41, &[1, 2, 3]);

        assert_eq!(&reply[0..4], &[0, 0, 0, 14]);
        assert_eq!(&reply[4..8], &[0, 0, 0, 9]);
        assert_eq!(reply[8], REPLY_FLAG);
        assert_eq!(&reply[9..11], &[0, 41]);
        assert_eq!(&reply[11..], &[1, 2, 3]);
    }

    #[test]
    fn test_command_failure_display_names_code() {
        let err = JdwpError::CommandFailure {
            id: 3,
            error_code: 20,
        };
        let text = err.to_string();
        assert!(text.contains("Id: 3"));
        assert!(text.contains("INVALID_OBJECT"));
        assert_eq!(error_name(9999), "UNKNOWN_ERROR");
    }
}
