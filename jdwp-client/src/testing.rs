// VM-side helpers for in-memory protocol tests

use crate::protocol::{HEADER_SIZE, JDWP_HANDSHAKE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A command packet as seen by the VM
#[derive(Debug)]
pub struct VmCommand {
    pub id: u32,
    pub command_set: u8,
    pub command: u8,
    pub payload: Vec<u8>,
}

/// Answer the debugger's handshake
pub async fn accept_handshake<S>(vm: &mut S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; JDWP_HANDSHAKE.len()];
    vm.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf[..], JDWP_HANDSHAKE);
    vm.write_all(JDWP_HANDSHAKE).await.unwrap();
}

/// Read one command packet written by the engine
pub async fn read_command<S>(vm: &mut S) -> VmCommand
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    vm.read_exact(&mut header).await.unwrap();

    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    assert_eq!(header[8], 0, "expected a command packet");

    let mut payload = vec![0u8; length - HEADER_SIZE];
    vm.read_exact(&mut payload).await.unwrap();

    VmCommand {
        id: u32::from_be_bytes([header[4], header[5], header[6], header[7]]),
        command_set: header[9],
        command: header[10],
        payload,
    }
}
