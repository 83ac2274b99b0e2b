// JDWP transport
//
// Owns the socket: connect, handshake, a single background task that cuts the
// byte stream into frames, and raw sends.

use crate::config::JdwpConfig;
use crate::endian::u32_from_be_bytes;
use crate::protocol::{JdwpError, JdwpResult, HEADER_SIZE, JDWP_HANDSHAKE};
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

/// Receiver of everything the read loop produces
///
/// Both callbacks run on the read task; a slow handler stalls the socket.
pub trait FrameHandler: Send + Sync + 'static {
    /// A complete frame, length field included
    fn on_frame_received(&self, frame: Bytes);

    /// The connection ended without `close()`. `None` for an orderly peer close.
    fn on_disconnect(&self, cause: Option<io::Error>);
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct Transport {
    writer: Mutex<Option<BoxedWriter>>,
    quit: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Transport {
    /// Connect over TCP, handshake, and start the read loop
    pub async fn open(
        host: &str,
        port: u16,
        handler: Arc<dyn FrameHandler>,
        config: &JdwpConfig,
    ) -> JdwpResult<Self> {
        info!("Connecting to JDWP at {}:{}", host, port);
        let mut stream = connect_tcp(host, port, config).await?;

        handshake(&mut stream).await?;

        Ok(Self::start(stream, handler, config))
    }

    /// Handshake over an already connected stream, then start the read loop
    pub async fn attach<S>(
        mut stream: S,
        handler: Arc<dyn FrameHandler>,
        config: &JdwpConfig,
    ) -> JdwpResult<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        handshake(&mut stream).await?;
        Ok(Self::start(stream, handler, config))
    }

    fn start<S>(stream: S, handler: Arc<dyn FrameHandler>, config: &JdwpConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let quit = Arc::new(AtomicBool::new(false));
        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(read_loop(
            reader,
            handler,
            quit.clone(),
            shutdown_rx,
            config.max_frame_size,
        ));

        Self {
            writer: Mutex::new(Some(Box::new(writer))),
            quit,
            shutdown,
        }
    }

    /// Write one complete buffer to the socket
    pub async fn send(&self, bytes: &[u8]) -> JdwpResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| {
            JdwpError::SendFailure(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport is closed",
            ))
        })?;

        writer.write_all(bytes).await.map_err(JdwpError::SendFailure)?;
        writer.flush().await.map_err(JdwpError::SendFailure)?;
        Ok(())
    }

    /// Stop the read loop and close the socket. Idempotent.
    pub async fn close(&self) {
        if self.quit.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Closing JDWP transport");
        let _ = self.shutdown.send(true);

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Socket shutdown failed: {}", e);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }
}

async fn connect_tcp(host: &str, port: u16, config: &JdwpConfig) -> JdwpResult<TcpStream> {
    let result = match config.connect_timeout {
        Some(limit) => tokio::time::timeout(limit, resolve_and_connect(host, port, config))
            .await
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))),
        None => resolve_and_connect(host, port, config).await,
    };

    result.map_err(JdwpError::ConnectFailure)
}

async fn resolve_and_connect(host: &str, port: u16, config: &JdwpConfig) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in lookup_host((host, port)).await? {
        match connect_addr(addr, config).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("Connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
    }))
}

async fn connect_addr(addr: SocketAddr, config: &JdwpConfig) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_send_buffer_size(config.send_buffer_size)?;
    socket.set_recv_buffer_size(config.recv_buffer_size)?;
    socket.set_linger(config.linger)?;

    let stream = socket.connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Perform JDWP handshake
pub(crate) async fn handshake<S>(stream: &mut S) -> JdwpResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!("Performing JDWP handshake");

    stream
        .write_all(JDWP_HANDSHAKE)
        .await
        .map_err(JdwpError::socket)?;
    stream.flush().await.map_err(JdwpError::socket)?;

    let mut buf = [0u8; JDWP_HANDSHAKE.len()];
    let received = read_full(stream, &mut buf)
        .await
        .map_err(JdwpError::socket)?;

    if received == 0 {
        warn!("VM closed the connection during handshake");
        return Err(JdwpError::VmUnavailable);
    }

    if buf[..received] != *JDWP_HANDSHAKE {
        warn!("Invalid handshake response: {:?}", &buf[..received]);
        return Err(JdwpError::InvalidResponse(format!(
            "invalid handshake reply: {:?}",
            String::from_utf8_lossy(&buf[..received])
        )));
    }

    info!("JDWP handshake successful");
    Ok(())
}

/// Read until `buf` is full or the peer closes; returns the bytes read
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Read one frame. `Ok(None)` means the peer closed cleanly between frames.
async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> io::Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    // The first four bytes are the size of the whole packet
    let mut length_bytes = [0u8; 4];
    match read_full(reader, &mut length_bytes).await? {
        0 => return Ok(None),
        4 => {}
        n => {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection closed after {} bytes of a frame length", n),
            ))
        }
    }

    let length = u32_from_be_bytes(&length_bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?
        as usize;

    if length < HEADER_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid packet length: {}", length),
        ));
    }

    if length > max_frame_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Packet too large: {} bytes (max: {} bytes)",
                length, max_frame_size
            ),
        ));
    }

    let mut frame = BytesMut::with_capacity(length);
    frame.put_slice(&length_bytes);
    frame.resize(length, 0);
    reader.read_exact(&mut frame[4..]).await?;

    Ok(Some(frame.freeze()))
}

async fn read_loop<R>(
    mut reader: R,
    handler: Arc<dyn FrameHandler>,
    quit: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
    max_frame_size: usize,
) where
    R: AsyncRead + Unpin,
{
    info!("Read loop started");

    let cause = loop {
        let result = tokio::select! {
            _ = shutdown.changed() => break None,
            res = read_frame(&mut reader, max_frame_size) => res,
        };

        if quit.load(Ordering::SeqCst) {
            break None;
        }

        match result {
            Ok(Some(frame)) => {
                debug!("Received frame, len={}", frame.len());
                handler.on_frame_received(frame);
            }
            Ok(None) => {
                info!("VM closed the connection");
                break None;
            }
            Err(e) => {
                error!("Failed to read packet: {}", e);
                break Some(e);
            }
        }
    };

    if !quit.load(Ordering::SeqCst) {
        handler.on_disconnect(cause);
    }

    info!("Read loop shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_reply;
    use std::sync::Mutex as StdMutex;
    use tokio::io::duplex;

    #[derive(Default)]
    struct Recorder {
        frames: StdMutex<Vec<Bytes>>,
        disconnects: StdMutex<Vec<Option<io::ErrorKind>>>,
    }

    impl FrameHandler for Recorder {
        fn on_frame_received(&self, frame: Bytes) {
            self.frames.lock().unwrap().push(frame);
        }

        fn on_disconnect(&self, cause: Option<io::Error>) {
            self.disconnects
                .lock()
                .unwrap()
                .push(cause.map(|e| e.kind()));
        }
    }

    async fn run_loop(
        reader: impl AsyncRead + Unpin,
        recorder: Arc<Recorder>,
    ) -> watch::Sender<bool> {
        let (tx, rx) = watch::channel(false);
        read_loop(
            reader,
            recorder,
            Arc::new(AtomicBool::new(false)),
            rx,
            1024,
        )
        .await;
        tx
    }

    #[tokio::test]
    async fn test_handshake_success() {
        let (mut client, mut vm) = duplex(64);
        let vm_side = async {
            let mut buf = [0u8; 14];
            vm.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, JDWP_HANDSHAKE);
            vm.write_all(JDWP_HANDSHAKE).await.unwrap();
        };

        let (result, _) = tokio::join!(handshake(&mut client), vm_side);
        result.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_refused() {
        let (mut client, mut vm) = duplex(64);
        let vm_side = async move {
            let mut buf = [0u8; 14];
            vm.read_exact(&mut buf).await.unwrap();
            drop(vm);
        };

        let (result, _) = tokio::join!(handshake(&mut client), vm_side);
        assert!(matches!(result, Err(JdwpError::VmUnavailable)));
    }

    #[tokio::test]
    async fn test_handshake_mismatch() {
        let (mut client, mut vm) = duplex(64);
        let vm_side = async {
            let mut buf = [0u8; 14];
            vm.read_exact(&mut buf).await.unwrap();
            vm.write_all(b"JDWP-Handshak!").await.unwrap();
        };

        let (result, _) = tokio::join!(handshake(&mut client), vm_side);
        assert!(matches!(result, Err(JdwpError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_handshake_short_reply() {
        let (mut client, mut vm) = duplex(64);
        let vm_side = async move {
            let mut buf = [0u8; 14];
            vm.read_exact(&mut buf).await.unwrap();
            vm.write_all(b"JDWP").await.unwrap();
            drop(vm);
        };

        let (result, _) = tokio::join!(handshake(&mut client), vm_side);
        assert!(matches!(result, Err(JdwpError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_read_loop_delivers_frames_then_orderly_close() {
        let (client, mut vm) = duplex(1024);
        let first = encode_reply(1, 0, &[1, 2, 3]);
        let second = encode_reply(2, 0, &[]);
        vm.write_all(&first).await.unwrap();
        vm.write_all(&second).await.unwrap();
        drop(vm);

        let recorder = Arc::new(Recorder::default());
        run_loop(client, recorder.clone()).await;

        let frames = recorder.frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], &first[..]);
        assert_eq!(&frames[1][..], &second[..]);
        assert_eq!(*recorder.disconnects.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn test_read_loop_rejects_undersized_length() {
        let (client, mut vm) = duplex(1024);
        vm.write_all(&[0, 0, 0, 5, 0, 0, 0, 0, 0]).await.unwrap();

        let recorder = Arc::new(Recorder::default());
        run_loop(client, recorder.clone()).await;

        assert!(recorder.frames.lock().unwrap().is_empty());
        assert_eq!(
            *recorder.disconnects.lock().unwrap(),
            vec![Some(io::ErrorKind::InvalidData)]
        );
    }

    #[tokio::test]
    async fn test_read_loop_rejects_oversized_length() {
        let (client, mut vm) = duplex(1024);
        vm.write_all(&[0, 0, 0x10, 0]).await.unwrap();

        let recorder = Arc::new(Recorder::default());
        run_loop(client, recorder.clone()).await;

        assert_eq!(
            *recorder.disconnects.lock().unwrap(),
            vec![Some(io::ErrorKind::InvalidData)]
        );
    }

    #[tokio::test]
    async fn test_read_loop_truncated_frame_is_a_fault() {
        let (client, mut vm) = duplex(1024);
        let frame = encode_reply(1, 0, &[9, 9, 9, 9]);
        vm.write_all(&frame[..frame.len() - 2]).await.unwrap();
        drop(vm);

        let recorder = Arc::new(Recorder::default());
        run_loop(client, recorder.clone()).await;

        assert!(recorder.frames.lock().unwrap().is_empty());
        assert_eq!(
            *recorder.disconnects.lock().unwrap(),
            vec![Some(io::ErrorKind::UnexpectedEof)]
        );
    }

    #[tokio::test]
    async fn test_close_suppresses_disconnect() {
        let (client, mut vm) = duplex(1024);
        let recorder = Arc::new(Recorder::default());
        let handler: Arc<dyn FrameHandler> = recorder.clone();

        let transport = Transport::start(client, handler, &JdwpConfig::default());
        transport.send(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        vm.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        transport.close().await;
        transport.close().await;
        assert!(transport.is_closed());

        // Writer half shut down: the VM side sees EOF
        let mut rest = Vec::new();
        vm.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        tokio::task::yield_now().await;
        assert!(recorder.disconnects.lock().unwrap().is_empty());
        assert!(matches!(
            transport.send(b"late").await,
            Err(JdwpError::SendFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_applies_linger_setting() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let lingering = JdwpConfig::default();
        let stream = connect_addr(addr, &lingering).await.unwrap();
        assert_eq!(
            stream.linger().unwrap(),
            Some(std::time::Duration::from_secs(30))
        );
        assert!(stream.nodelay().unwrap());

        let non_blocking_close = JdwpConfig {
            linger: None,
            ..JdwpConfig::default()
        };
        let stream = connect_addr(addr, &non_blocking_close).await.unwrap();
        assert_eq!(stream.linger().unwrap(), None);
    }
}
