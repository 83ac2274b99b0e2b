// Big-endian helpers for JDWP numeric fields
//
// JDWP uses network byte order for every multi-byte value. Identifier widths
// are negotiated per VM (IDSizes), so ids are decoded from 1-8 bytes.

use crate::protocol::{JdwpError, JdwpResult};

/// Encode a u32 as 4 big-endian bytes
pub fn be_bytes_from_u32(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

/// Encode a u16 as 2 big-endian bytes
pub fn be_bytes_from_u16(value: u16) -> [u8; 2] {
    value.to_be_bytes()
}

/// Decode exactly 4 big-endian bytes
pub fn u32_from_be_bytes(bytes: &[u8]) -> JdwpResult<u32> {
    let arr: [u8; 4] = bytes.try_into().map_err(|_| {
        JdwpError::InvalidResponse(format!("expected 4 bytes for u32, got {}", bytes.len()))
    })?;
    Ok(u32::from_be_bytes(arr))
}

/// Decode exactly 2 big-endian bytes
pub fn u16_from_be_bytes(bytes: &[u8]) -> JdwpResult<u16> {
    let arr: [u8; 2] = bytes.try_into().map_err(|_| {
        JdwpError::InvalidResponse(format!("expected 2 bytes for u16, got {}", bytes.len()))
    })?;
    Ok(u16::from_be_bytes(arr))
}

/// Decode a 1-8 byte big-endian identifier, left-padded with zeros to 64 bits
pub fn u64_from_be_bytes(bytes: &[u8]) -> JdwpResult<u64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return Err(JdwpError::InvalidResponse(format!(
            "invalid id width: {}",
            bytes.len()
        )));
    }

    let mut padded = [0u8; 8];
    padded[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(u64::from_be_bytes(padded))
}
