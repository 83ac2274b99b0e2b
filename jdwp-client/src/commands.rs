// JDWP command implementations
//
// Command Sets:
// 1 = VirtualMachine
// 15 = EventRequest
//
// Each command knows its (command set, command) pair, builds its own payload
// and decodes its own reply.

use crate::protocol::{put_string, CommandId, JdwpResult};
use crate::reader::ReplyPacketParser;
use crate::types::{ClassData, ClassInfo, IdSizes, VmVersion};
use bytes::BytesMut;

// Command set IDs
pub mod command_sets {
    pub const VIRTUAL_MACHINE: u8 = 1;
    pub const EVENT_REQUEST: u8 = 15;
}

// VirtualMachine commands (set 1)
pub mod vm_commands {
    pub const VERSION: u8 = 1;
    pub const CLASSES_BY_SIGNATURE: u8 = 2;
    pub const ALL_CLASSES: u8 = 3;
    pub const ALL_THREADS: u8 = 4;
    pub const TOP_LEVEL_THREAD_GROUPS: u8 = 5;
    pub const DISPOSE: u8 = 6;
    pub const ID_SIZES: u8 = 7;
    pub const SUSPEND: u8 = 8;
    pub const RESUME: u8 = 9;
    pub const EXIT: u8 = 10;
    pub const CREATE_STRING: u8 = 11;
    pub const CAPABILITIES: u8 = 12;
    pub const CLASS_PATHS: u8 = 13;
    pub const DISPOSE_OBJECTS: u8 = 14;
    pub const HOLD_EVENTS: u8 = 15;
    pub const RELEASE_EVENTS: u8 = 16;
    pub const CAPABILITIES_NEW: u8 = 17;
    pub const REDEFINE_CLASSES: u8 = 18;
    pub const SET_DEFAULT_STRATUM: u8 = 19;
    pub const ALL_CLASSES_WITH_GENERIC: u8 = 20;
    pub const INSTANCE_COUNTS: u8 = 21;
}

// EventRequest commands (set 15)
pub mod event_commands {
    pub const SET: u8 = 1;
    pub const CLEAR: u8 = 2;
    pub const CLEAR_ALL_BREAKPOINTS: u8 = 3;
}

/// A JDWP command sent from the debugger to the VM
///
/// Commands with arguments override [`Command::encode_payload`]; commands
/// whose replies carry data override [`Command::decode_success`] and hand the
/// decoded value out through [`Command::into_reply`].
pub trait Command: Send + 'static {
    type Reply: Send + 'static;

    const ID: CommandId;

    fn encode_payload(&self) -> Vec<u8> {
        Vec::new()
    }

    fn decode_success(&mut self, _reply: &mut ReplyPacketParser) -> JdwpResult<()> {
        Ok(())
    }

    fn decode_failure(&mut self, _reply: &mut ReplyPacketParser) -> JdwpResult<()> {
        Ok(())
    }

    fn into_reply(self) -> Self::Reply;
}

const fn vm(command: u8) -> CommandId {
    CommandId::new(command_sets::VIRTUAL_MACHINE, command)
}

/// VirtualMachine.Version
#[derive(Debug, Default)]
pub struct VersionCommand {
    reply: VmVersion,
}

impl Command for VersionCommand {
    type Reply = VmVersion;
    const ID: CommandId = vm(vm_commands::VERSION);

    fn decode_success(&mut self, reply: &mut ReplyPacketParser) -> JdwpResult<()> {
        let description = reply.read_string()?;
        let jdwp_major = reply.read_u32()?;
        let jdwp_minor = reply.read_u32()?;
        let vm_version = reply.read_string()?;
        let vm_name = reply.read_string()?;

        self.reply = VmVersion {
            description,
            jdwp_major,
            jdwp_minor,
            vm_version,
            vm_name,
        };
        Ok(())
    }

    fn into_reply(self) -> VmVersion {
        self.reply
    }
}

/// VirtualMachine.IDSizes
#[derive(Debug, Default)]
pub struct IdSizesCommand {
    reply: IdSizes,
}

impl Command for IdSizesCommand {
    type Reply = IdSizes;
    const ID: CommandId = vm(vm_commands::ID_SIZES);

    fn decode_success(&mut self, reply: &mut ReplyPacketParser) -> JdwpResult<()> {
        let field_id_size = reply.read_u32()?;
        let method_id_size = reply.read_u32()?;
        let object_id_size = reply.read_u32()?;
        let reference_type_id_size = reply.read_u32()?;
        let frame_id_size = reply.read_u32()?;

        self.reply = IdSizes::new(
            field_id_size,
            method_id_size,
            object_id_size,
            reference_type_id_size,
            frame_id_size,
        );
        Ok(())
    }

    fn into_reply(self) -> IdSizes {
        self.reply
    }
}

/// VirtualMachine.AllClassesWithGeneric
#[derive(Debug, Default)]
pub struct AllClassesWithGenericCommand {
    classes: Vec<ClassData>,
}

impl Command for AllClassesWithGenericCommand {
    type Reply = Vec<ClassData>;
    const ID: CommandId = vm(vm_commands::ALL_CLASSES_WITH_GENERIC);

    fn decode_success(&mut self, reply: &mut ReplyPacketParser) -> JdwpResult<()> {
        let count = reply.read_u32()? as usize;

        // Every entry is at least tag + id + two empty strings + status
        let mut classes = Vec::with_capacity(count.min(reply.remaining() / 14));
        for _ in 0..count {
            let ref_type_tag = reply.read_byte()?;
            let type_id = reply.read_reference_type_id()?;
            let signature = reply.read_string()?;
            let generic_signature = reply.read_string()?;
            let status = reply.read_u32()?;

            classes.push(ClassData {
                ref_type_tag,
                type_id,
                signature,
                generic_signature,
                status,
            });
        }

        self.classes = classes;
        Ok(())
    }

    fn into_reply(self) -> Vec<ClassData> {
        self.classes
    }
}

/// VirtualMachine.ClassesBySignature
/// Signature format: "Lcom/example/MyClass;" for classes
#[derive(Debug)]
pub struct ClassesBySignatureCommand {
    signature: String,
    classes: Vec<ClassInfo>,
}

impl ClassesBySignatureCommand {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            classes: Vec::new(),
        }
    }
}

impl Command for ClassesBySignatureCommand {
    type Reply = Vec<ClassInfo>;
    const ID: CommandId = vm(vm_commands::CLASSES_BY_SIGNATURE);

    fn encode_payload(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(4 + self.signature.len());
        put_string(&mut buf, &self.signature);
        buf.to_vec()
    }

    fn decode_success(&mut self, reply: &mut ReplyPacketParser) -> JdwpResult<()> {
        let count = reply.read_u32()? as usize;

        let mut classes = Vec::with_capacity(count.min(reply.remaining() / 6));
        for _ in 0..count {
            let ref_type_tag = reply.read_byte()?;
            let type_id = reply.read_reference_type_id()?;
            let status = reply.read_u32()?;

            classes.push(ClassInfo {
                ref_type_tag,
                type_id,
                signature: self.signature.clone(),
                status,
            });
        }

        self.classes = classes;
        Ok(())
    }

    fn into_reply(self) -> Vec<ClassInfo> {
        self.classes
    }
}

/// VirtualMachine.Dispose - detach from the VM. No payload either way.
#[derive(Debug, Default)]
pub struct DisposeCommand;

impl Command for DisposeCommand {
    type Reply = ();
    const ID: CommandId = vm(vm_commands::DISPOSE);

    fn into_reply(self) {}
}

/// VirtualMachine.Suspend
#[derive(Debug, Default)]
pub struct SuspendCommand;

impl Command for SuspendCommand {
    type Reply = ();
    const ID: CommandId = vm(vm_commands::SUSPEND);

    fn into_reply(self) {}
}

/// VirtualMachine.Resume
#[derive(Debug, Default)]
pub struct ResumeCommand;

impl Command for ResumeCommand {
    type Reply = ();
    const ID: CommandId = vm(vm_commands::RESUME);

    fn into_reply(self) {}
}
