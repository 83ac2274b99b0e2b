// JDWP type definitions
//
// Common types used across the JDWP protocol

use crate::protocol::{JdwpError, JdwpResult};
use serde::{Deserialize, Serialize};

// Identifiers are opaque handles whose width the VM negotiates (IDSizes).
// They are widened to 64 bits on decode.
pub type ObjectId = u64;
pub type ReferenceTypeId = u64;
pub type ClassId = ReferenceTypeId;
pub type MethodId = u64;
pub type FieldId = u64;
pub type FrameId = u64;

/// Byte widths of the VM's identifier kinds
///
/// All zero means "not negotiated yet"; every accessor fails with
/// [`JdwpError::FailedToInitialize`] until the IDSizes reply has been applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdSizes {
    field_id_size: u32,
    method_id_size: u32,
    object_id_size: u32,
    reference_type_id_size: u32,
    frame_id_size: u32,
}

impl IdSizes {
    pub fn new(
        field_id_size: u32,
        method_id_size: u32,
        object_id_size: u32,
        reference_type_id_size: u32,
        frame_id_size: u32,
    ) -> Self {
        Self {
            field_id_size,
            method_id_size,
            object_id_size,
            reference_type_id_size,
            frame_id_size,
        }
    }

    pub fn field_id_size(&self) -> JdwpResult<usize> {
        Self::checked(self.field_id_size)
    }

    pub fn method_id_size(&self) -> JdwpResult<usize> {
        Self::checked(self.method_id_size)
    }

    pub fn object_id_size(&self) -> JdwpResult<usize> {
        Self::checked(self.object_id_size)
    }

    pub fn reference_type_id_size(&self) -> JdwpResult<usize> {
        Self::checked(self.reference_type_id_size)
    }

    pub fn frame_id_size(&self) -> JdwpResult<usize> {
        Self::checked(self.frame_id_size)
    }

    fn checked(size: u32) -> JdwpResult<usize> {
        if size == 0 {
            return Err(JdwpError::FailedToInitialize);
        }
        Ok(size as usize)
    }
}

/// JVM version information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmVersion {
    pub description: String,
    pub jdwp_major: u32,
    pub jdwp_minor: u32,
    pub vm_version: String,
    pub vm_name: String,
}

/// Loaded class as reported by AllClassesWithGeneric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassData {
    pub ref_type_tag: u8, // 1=class, 2=interface, 3=array
    pub type_id: ReferenceTypeId,
    pub signature: String,
    pub generic_signature: String,
    pub status: u32,
}

/// Class information from ClassesBySignature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub ref_type_tag: u8,
    pub type_id: ReferenceTypeId,
    pub signature: String,
    pub status: u32,
}
