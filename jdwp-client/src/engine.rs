// JDWP protocol engine
//
// Correlates command packets with their replies. Callers register a pending
// operation under the packet id before the bytes hit the wire; the read loop
// resolves it when the reply arrives, or a disconnect resolves everything.

use crate::commands::Command;
use crate::config::JdwpConfig;
use crate::protocol::{
    CommandPacket, JdwpError, JdwpResult, FLAGS_OFFSET, HEADER_SIZE, REPLY_FLAG,
};
use crate::reader::ReplyPacketParser;
use crate::transport::{FrameHandler, Transport};
use crate::types::IdSizes;
use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Ready,
    Closed,
}

/// An in-flight command waiting for its reply
trait PendingOperation: Send {
    fn complete(self: Box<Self>, reply: &mut ReplyPacketParser);
    fn abort(self: Box<Self>, error: JdwpError);
}

struct WaitingOperation<C: Command> {
    command: C,
    reply_tx: oneshot::Sender<JdwpResult<C::Reply>>,
}

impl<C: Command> PendingOperation for WaitingOperation<C> {
    fn complete(self: Box<Self>, reply: &mut ReplyPacketParser) {
        let WaitingOperation {
            mut command,
            reply_tx,
        } = *self;

        let result = if reply.succeeded() {
            match command.decode_success(reply) {
                Ok(()) => Ok(command.into_reply()),
                Err(e) => {
                    warn!("Failed to decode reply id={}: {}", reply.id(), e);
                    Err(e)
                }
            }
        } else {
            if let Err(e) = command.decode_failure(reply) {
                debug!("Failed to decode error reply id={}: {}", reply.id(), e);
            }
            Err(JdwpError::CommandFailure {
                id: reply.id(),
                error_code: reply.error_code(),
            })
        };

        // The caller may have dropped its PendingReply
        let _ = reply_tx.send(result);
    }

    fn abort(self: Box<Self>, error: JdwpError) {
        let _ = self.reply_tx.send(Err(error));
    }
}

/// Resolves with the decoded reply of one command
#[derive(Debug)]
pub struct PendingReply<T> {
    packet_id: u32,
    reply_rx: oneshot::Receiver<JdwpResult<T>>,
}

impl<T> PendingReply<T> {
    pub fn packet_id(&self) -> u32 {
        self.packet_id
    }
}

impl<T> Future for PendingReply<T> {
    type Output = JdwpResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.reply_rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(JdwpError::Cancelled)))
    }
}

/// State shared between callers and the read loop
struct Shared {
    pending: Mutex<HashMap<u32, Box<dyn PendingOperation>>>,
    id_sizes: OnceLock<IdSizes>,
    next_id: AtomicU32,
    closed: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            id_sizes: OnceLock::new(),
            next_id: AtomicU32::new(1),
            closed: AtomicBool::new(false),
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<u32, Box<dyn PendingOperation>>> {
        // Nothing panics while holding this lock; recover rather than cascade.
        self.pending.lock().unwrap_or_else(|poisoned| {
            error!("pending operation table poisoned; continuing with recovered guard");
            poisoned.into_inner()
        })
    }

    fn next_packet_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn id_sizes(&self) -> IdSizes {
        self.id_sizes.get().copied().unwrap_or_default()
    }

    fn register(&self, packet_id: u32, operation: Box<dyn PendingOperation>) {
        self.lock_pending().insert(packet_id, operation);
    }

    fn take(&self, packet_id: u32) -> Option<Box<dyn PendingOperation>> {
        self.lock_pending().remove(&packet_id)
    }

    fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Resolve every outstanding operation. The lock is released before any
    /// operation is resolved.
    fn drain(&self, cause: Option<Arc<io::Error>>) {
        let drained: Vec<_> = {
            let mut pending = self.lock_pending();
            pending.drain().collect()
        };

        if !drained.is_empty() {
            info!("Aborting {} pending operations", drained.len());
        }

        for (_, operation) in drained {
            let error = match &cause {
                Some(cause) => JdwpError::SocketError(cause.clone()),
                None => JdwpError::Cancelled,
            };
            operation.abort(error);
        }
    }

    fn on_reply_received(&self, frame: Bytes) {
        let mut reply = match ReplyPacketParser::new(frame, self.id_sizes()) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Failed to decode reply header: {}", e);
                return;
            }
        };

        debug!(
            "Received reply id={} error_code={}",
            reply.id(),
            reply.error_code()
        );

        match self.take(reply.id()) {
            Some(operation) => operation.complete(&mut reply),
            // Possible after abandon(); never fatal to the read loop
            None => warn!("Received reply for unknown command id={}", reply.id()),
        }
    }

    fn on_command_received(&self, frame: Bytes) {
        // VM -> debugger command packets (composite events) are not decoded
        debug!(
            "Ignoring VM command packet set={} command={} len={}",
            frame[9],
            frame[10],
            frame.len()
        );
    }
}

impl FrameHandler for Shared {
    fn on_frame_received(&self, frame: Bytes) {
        if frame.len() < HEADER_SIZE {
            warn!("Dropping frame shorter than header: {} bytes", frame.len());
            return;
        }

        if frame[FLAGS_OFFSET] & REPLY_FLAG != 0 {
            self.on_reply_received(frame);
        } else {
            self.on_command_received(frame);
        }
    }

    fn on_disconnect(&self, cause: Option<io::Error>) {
        match &cause {
            Some(e) => error!("JDWP connection lost: {}", e),
            None => info!("JDWP connection closed by VM"),
        }
        self.closed.store(true, Ordering::SeqCst);
        self.drain(cause.map(Arc::new));
    }
}

/// Command/reply engine over one JDWP connection
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct JdwpEngine {
    shared: Arc<Shared>,
    transport: Arc<Transport>,
}

impl std::fmt::Debug for JdwpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JdwpEngine")
            .field("state", &self.state())
            .field("pending", &self.shared.pending_count())
            .field("id_sizes", &self.shared.id_sizes.get())
            .finish()
    }
}

impl JdwpEngine {
    /// Connect to host:port, handshake, and start reading replies
    pub async fn attach(host: &str, port: u16, config: &JdwpConfig) -> JdwpResult<Self> {
        let shared = Arc::new(Shared::new());
        let transport = Transport::open(host, port, shared.clone(), config).await?;

        Ok(Self {
            shared,
            transport: Arc::new(transport),
        })
    }

    /// Run the protocol over an already connected stream
    pub async fn attach_stream<S>(stream: S, config: &JdwpConfig) -> JdwpResult<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared::new());
        let transport = Transport::attach(stream, shared.clone(), config).await?;

        Ok(Self {
            shared,
            transport: Arc::new(transport),
        })
    }

    /// Allocate the next packet id (monotonic, starts at 1)
    pub fn next_packet_id(&self) -> u32 {
        self.shared.next_packet_id()
    }

    /// Send a command; the returned future resolves with its decoded reply
    pub async fn send_command_async<C: Command>(
        &self,
        command: C,
    ) -> JdwpResult<PendingReply<C::Reply>> {
        let packet = CommandPacket::new(self.next_packet_id(), command);
        self.send_packet_async(packet).await
    }

    /// Send a command whose packet id was allocated by [`Self::next_packet_id`]
    pub async fn send_packet_async<C: Command>(
        &self,
        packet: CommandPacket<C>,
    ) -> JdwpResult<PendingReply<C::Reply>> {
        let packet_id = packet.id();
        let bytes = packet.to_wire_bytes();
        let (reply_tx, reply_rx) = oneshot::channel();

        // Register before sending: the reply may beat us back otherwise
        self.shared.register(
            packet_id,
            Box::new(WaitingOperation {
                command: packet.into_command(),
                reply_tx,
            }),
        );

        // on_disconnect marks the engine closed before draining, so anything
        // registered after that drain is caught here
        if self.shared.closed.load(Ordering::SeqCst) {
            self.shared.take(packet_id);
            debug!("Refusing command id={} on a closed connection", packet_id);
            return Err(JdwpError::SendFailure(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection is closed",
            )));
        }

        debug!("Sending command id={} len={}", packet_id, bytes.len());
        if let Err(e) = self.transport.send(&bytes).await {
            error!("Failed to write command id={}: {}", packet_id, e);
            self.shared.take(packet_id);
            return Err(e);
        }

        Ok(PendingReply {
            packet_id,
            reply_rx,
        })
    }

    /// Send a command and wait for its reply
    pub async fn send_command<C: Command>(&self, command: C) -> JdwpResult<C::Reply> {
        self.send_command_async(command).await?.await
    }

    /// Forget an in-flight command. Its future resolves with `Cancelled`;
    /// a reply that still arrives is dropped. Returns false if the operation
    /// was already resolved.
    pub fn abandon(&self, packet_id: u32) -> bool {
        match self.shared.take(packet_id) {
            Some(operation) => {
                debug!("Abandoning command id={}", packet_id);
                operation.abort(JdwpError::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Apply the VM's identifier widths. Must be called once, before any
    /// command whose reply carries identifiers.
    pub fn set_id_sizes(&self, id_sizes: IdSizes) -> JdwpResult<()> {
        self.shared
            .id_sizes
            .set(id_sizes)
            .map_err(|_| JdwpError::IdSizesAlreadySet)?;
        debug!("ID sizes set: {:?}", id_sizes);
        Ok(())
    }

    pub fn id_sizes(&self) -> IdSizes {
        self.shared.id_sizes()
    }

    pub fn id_sizes_set(&self) -> bool {
        self.shared.id_sizes.get().is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending_count()
    }

    pub fn state(&self) -> ConnectionState {
        if self.shared.closed.load(Ordering::SeqCst) || self.transport.is_closed() {
            ConnectionState::Closed
        } else {
            ConnectionState::Ready
        }
    }

    /// Close the transport and cancel everything still pending. Idempotent.
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.transport.close().await;
        self.shared.drain(None);
    }
}
