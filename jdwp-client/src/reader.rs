// Reply packet parsing
//
// Decodes a reply frame header and reads typed JDWP values from its payload.
// Running off the end of the payload is always an error, never a short read.

use crate::endian::{u16_from_be_bytes, u32_from_be_bytes, u64_from_be_bytes};
use crate::protocol::{JdwpError, JdwpResult, HEADER_SIZE};
use crate::types::{IdSizes, ReferenceTypeId};
use bytes::{Buf, Bytes};

#[derive(Debug)]
pub struct ReplyPacketParser {
    buf: Bytes,
    id_sizes: IdSizes,
    size: u32,
    id: u32,
    error_code: u16,
}

impl ReplyPacketParser {
    /// Parse the header of a raw reply frame. The cursor is left at the
    /// start of the payload.
    pub fn new(frame: impl Into<Bytes>, id_sizes: IdSizes) -> JdwpResult<Self> {
        let buf = frame.into();
        if buf.len() < HEADER_SIZE {
            return Err(JdwpError::InvalidResponse(format!(
                "reply packet too short: {} bytes",
                buf.len()
            )));
        }

        let mut parser = Self {
            buf,
            id_sizes,
            size: 0,
            id: 0,
            error_code: 0,
        };

        parser.size = parser.read_u32()?;
        parser.id = parser.read_u32()?;
        parser.read_byte()?; // flags
        parser.error_code = parser.read_u16()?;

        Ok(parser)
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn error_code(&self) -> u16 {
        self.error_code
    }

    pub fn succeeded(&self) -> bool {
        self.error_code == 0
    }

    /// Unread payload bytes
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn take(&mut self, n: usize) -> JdwpResult<Bytes> {
        if self.buf.remaining() < n {
            return Err(JdwpError::InvalidResponse(format!(
                "reply payload underflow: need {} bytes, have {}",
                n,
                self.buf.remaining()
            )));
        }
        Ok(self.buf.split_to(n))
    }

    pub fn read_u32(&mut self) -> JdwpResult<u32> {
        let bytes = self.take(4)?;
        u32_from_be_bytes(&bytes)
    }

    pub fn read_u16(&mut self) -> JdwpResult<u16> {
        let bytes = self.take(2)?;
        u16_from_be_bytes(&bytes)
    }

    pub fn read_byte(&mut self) -> JdwpResult<u8> {
        let bytes = self.take(1)?;
        Ok(bytes[0])
    }

    /// Read a JDWP string (4-byte length prefix + UTF-8 bytes)
    pub fn read_string(&mut self) -> JdwpResult<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;

        String::from_utf8(bytes.to_vec())
            .map_err(|e| JdwpError::InvalidResponse(format!("Invalid UTF-8 in string: {}", e)))
    }

    /// Read a reference type id using the negotiated width
    pub fn read_reference_type_id(&mut self) -> JdwpResult<ReferenceTypeId> {
        let width = self.id_sizes.reference_type_id_size()?;
        let bytes = self.take(width)?;
        u64_from_be_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_reply, put_string};
    use bytes::BytesMut;

    fn sizes(reference_type_id_size: u32) -> IdSizes {
        IdSizes::new(8, 8, 8, reference_type_id_size, 8)
    }

    #[test]
    fn test_reply_header_success() {
        let frame = encode_reply(42, 0, &[]);
        let parser = ReplyPacketParser::new(frame, IdSizes::default()).unwrap();

        assert_eq!(parser.size(), 11);
        assert_eq!(parser.id(), 42);
        assert!(parser.succeeded());
        assert_eq!(parser.remaining(), 0);
    }

    #[test]
    fn test_reply_header_failure() {
        let frame = encode_reply(7, 41, &[]);
        let parser = ReplyPacketParser::new(frame, IdSizes::default()).unwrap();

        assert_eq!(parser.id(), 7);
        assert!(!parser.succeeded());
        assert_eq!(parser.error_code(), 41);
    }

    #[test]
    fn test_short_frame_is_rejected() {
        let result = ReplyPacketParser::new(vec![0, 0, 0, 11, 0, 0], IdSizes::default());
        assert!(matches!(result, Err(JdwpError::InvalidResponse(_))));
    }

    #[test]
    fn test_string_round_trip() {
        for original in ["", "x", "héllo wörld ☕"] {
            let mut payload = BytesMut::new();
            put_string(&mut payload, original);
            let frame = encode_reply(1, 0, &payload);

            let mut parser = ReplyPacketParser::new(frame, IdSizes::default()).unwrap();
            assert_eq!(parser.read_string().unwrap(), original);
            assert_eq!(parser.remaining(), 0);
        }
    }

    #[test]
    fn test_string_longer_than_payload_fails() {
        // Declares 10 bytes, carries 3
        let frame = encode_reply(1, 0, &[0, 0, 0, 10, b'a', b'b', b'c']);
        let mut parser = ReplyPacketParser::new(frame, IdSizes::default()).unwrap();
        assert!(matches!(
            parser.read_string(),
            Err(JdwpError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_read_fixed_width_values() {
        let frame = encode_reply(1, 0, &[0xAA, 0xBB, 0xCC, 0xDD, 0x01, 0x02, 0x7F]);
        let mut parser = ReplyPacketParser::new(frame, IdSizes::default()).unwrap();

        assert_eq!(parser.read_u32().unwrap(), 0xAABBCCDD);
        assert_eq!(parser.read_u16().unwrap(), 0x0102);
        assert_eq!(parser.read_byte().unwrap(), 0x7F);
        assert!(parser.read_byte().is_err());
    }

    #[test]
    fn test_reference_type_id_width_8() {
        let frame = encode_reply(1, 0, &[0, 0, 0, 0, 0, 0, 0, 1]);
        let mut parser = ReplyPacketParser::new(frame, sizes(8)).unwrap();
        assert_eq!(parser.read_reference_type_id().unwrap(), 1);
    }

    #[test]
    fn test_reference_type_id_width_4() {
        let frame = encode_reply(1, 0, &[0, 0, 0, 1]);
        let mut parser = ReplyPacketParser::new(frame, sizes(4)).unwrap();
        assert_eq!(parser.read_reference_type_id().unwrap(), 1);
    }

    #[test]
    fn test_reference_type_id_requires_sizes() {
        let frame = encode_reply(1, 0, &[0, 0, 0, 0, 0, 0, 0, 1]);
        let mut parser = ReplyPacketParser::new(frame, IdSizes::default()).unwrap();
        assert!(matches!(
            parser.read_reference_type_id(),
            Err(JdwpError::FailedToInitialize)
        ));
    }
}
