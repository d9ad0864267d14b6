//! Presence channel: the framed duplex link to the Discord client's IPC endpoint.
//!
//! ## Lifecycle
//!
//! 1. `connect` tries `discord-ipc-0` through `discord-ipc-9`; first success wins
//! 2. Handshake (opcode 0) is written and exactly one reply frame is awaited
//! 3. Each `send` is one opcode 1 frame followed by one blocking reply read
//! 4. Any transport or framing failure drops the stream for good; the owner
//!    must connect a fresh channel
//!
//! The transport differs per platform (Unix domain socket vs. named pipe) but
//! everything above `IpcEndpoints` is written once.

use crate::error::{ChannelError, ConnectError};
use flrp_presence_protocol::{
    encode_frame, read_frame, write_frame, Frame, FrameError, Handshake, Opcode, PresenceMessage,
    PresenceResponse,
};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

pub const ENDPOINT_COUNT: u8 = 10;
pub const ENDPOINT_PREFIX: &str = "discord-ipc-";
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);
const PUMP_CHUNK_BYTES: usize = 4096;

pub trait IpcStream: Read + Write + Send {
    /// Bounds blocking reads (and writes where the transport allows it).
    /// A zero duration means "block forever".
    fn set_io_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

#[cfg(unix)]
impl IpcStream for std::os::unix::net::UnixStream {
    fn set_io_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        let timeout = (!timeout.is_zero()).then_some(timeout);
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }
}

/// A duplex stream whose reads go through a helper thread, so a read can give
/// up after a timeout even when the handle itself only supports blocking I/O
/// (synchronous named pipes).
///
/// On timeout the helper stays parked in its blocking read until the peer
/// writes or closes; it never touches the stream again once the owner is gone.
pub struct PumpedStream<W> {
    writer: W,
    chunks: Receiver<io::Result<Vec<u8>>>,
    pending: Vec<u8>,
    offset: usize,
    timeout: Option<Duration>,
    eof: bool,
}

impl<W: Write + Send> PumpedStream<W> {
    /// `reader` and `writer` are two handles to the same duplex transport.
    pub fn spawn<R: Read + Send + 'static>(mut reader: R, writer: W) -> io::Result<Self> {
        let (tx, chunks) = mpsc::channel();
        thread::Builder::new()
            .name("ipc-reader".to_string())
            .spawn(move || loop {
                let mut buffer = vec![0u8; PUMP_CHUNK_BYTES];
                match reader.read(&mut buffer) {
                    Ok(0) => {
                        let _ = tx.send(Ok(Vec::new()));
                        break;
                    }
                    Ok(read) => {
                        buffer.truncate(read);
                        if tx.send(Ok(buffer)).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        let _ = tx.send(Err(err));
                        break;
                    }
                }
            })?;

        Ok(Self {
            writer,
            chunks,
            pending: Vec::new(),
            offset: 0,
            timeout: None,
            eof: false,
        })
    }

    fn next_chunk(&mut self) -> io::Result<()> {
        let received = match self.timeout {
            Some(timeout) => self.chunks.recv_timeout(timeout),
            None => self.chunks.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(Ok(chunk)) if chunk.is_empty() => {
                self.eof = true;
                Ok(())
            }
            Ok(Ok(chunk)) => {
                self.pending = chunk;
                self.offset = 0;
                Ok(())
            }
            Ok(Err(err)) => {
                self.eof = true;
                Err(err)
            }
            Err(RecvTimeoutError::Timeout) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "no reply from IPC endpoint",
            )),
            Err(RecvTimeoutError::Disconnected) => {
                self.eof = true;
                Ok(())
            }
        }
    }
}

impl<W: Write + Send> Read for PumpedStream<W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.offset >= self.pending.len() {
            if self.eof {
                return Ok(0);
            }
            self.next_chunk()?;
        }
        let available = &self.pending[self.offset..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.offset += count;
        Ok(count)
    }
}

impl<W: Write + Send> Write for PumpedStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl<W: Write + Send> IpcStream for PumpedStream<W> {
    fn set_io_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        Ok(())
    }
}

/// The set of well-known local addresses the Discord client may listen on.
pub trait IpcEndpoints: Send {
    type Stream: IpcStream;

    fn open(&self, index: u8) -> io::Result<Self::Stream>;

    fn describe(&self, index: u8) -> String;
}

#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct UnixSocketEndpoints {
    dir: PathBuf,
}

#[cfg(unix)]
impl UnixSocketEndpoints {
    /// Uses the first of `XDG_RUNTIME_DIR`, `TMPDIR`, `TMP`, `TEMP`, else `/tmp`.
    pub fn from_env() -> Self {
        let dir = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
            .iter()
            .filter_map(|key| std::env::var_os(key))
            .map(PathBuf::from)
            .find(|path| !path.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("/tmp"));
        Self { dir }
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn endpoint_path(&self, index: u8) -> PathBuf {
        self.dir.join(format!("{}{}", ENDPOINT_PREFIX, index))
    }
}

#[cfg(unix)]
impl IpcEndpoints for UnixSocketEndpoints {
    type Stream = std::os::unix::net::UnixStream;

    fn open(&self, index: u8) -> io::Result<Self::Stream> {
        std::os::unix::net::UnixStream::connect(self.endpoint_path(index))
    }

    fn describe(&self, index: u8) -> String {
        self.endpoint_path(index).display().to_string()
    }
}

#[cfg(windows)]
#[derive(Debug, Clone, Default)]
pub struct NamedPipeEndpoints;

#[cfg(windows)]
impl IpcEndpoints for NamedPipeEndpoints {
    type Stream = PumpedStream<std::fs::File>;

    fn open(&self, index: u8) -> io::Result<Self::Stream> {
        let pipe = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.describe(index))?;
        let reader = pipe.try_clone()?;
        PumpedStream::spawn(reader, pipe)
    }

    fn describe(&self, index: u8) -> String {
        format!(r"\\.\pipe\{}{}", ENDPOINT_PREFIX, index)
    }
}

#[cfg(unix)]
pub type PlatformEndpoints = UnixSocketEndpoints;
#[cfg(windows)]
pub type PlatformEndpoints = NamedPipeEndpoints;

#[cfg(unix)]
pub fn platform_endpoints() -> PlatformEndpoints {
    UnixSocketEndpoints::from_env()
}

#[cfg(windows)]
pub fn platform_endpoints() -> PlatformEndpoints {
    NamedPipeEndpoints
}

fn close_reason(frame: &Frame) -> String {
    frame
        .parse_json::<serde_json::Value>()
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "no reason given".to_string())
}

/// One open, handshaken link to an IPC endpoint.
pub struct PresenceChannel<S: IpcStream> {
    stream: Option<S>,
    endpoint: String,
}

impl<S: IpcStream> PresenceChannel<S> {
    pub fn connect<E>(endpoints: &E, client_id: &str, timeout: Duration) -> Result<Self, ConnectError>
    where
        E: IpcEndpoints<Stream = S>,
    {
        for index in 0..ENDPOINT_COUNT {
            let mut stream = match endpoints.open(index) {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::trace!(endpoint = %endpoints.describe(index), error = %err, "IPC endpoint unavailable");
                    continue;
                }
            };
            if let Err(err) = stream.set_io_timeout(timeout) {
                tracing::debug!(error = %err, "Failed to set IPC timeouts");
            }
            tracing::debug!(endpoint = %endpoints.describe(index), "IPC endpoint accepted connection");
            return Self::handshake(stream, endpoints.describe(index), client_id);
        }

        Err(ConnectError::NoEndpoint {
            attempts: ENDPOINT_COUNT,
        })
    }

    /// Performs the opcode 0 handshake on an already-open stream.
    pub fn handshake(mut stream: S, endpoint: String, client_id: &str) -> Result<Self, ConnectError> {
        let frame = Frame::json(Opcode::Handshake, &Handshake::new(client_id))?;
        write_frame(&mut stream, &frame)?;

        let reply = read_frame(&mut stream)?;
        if reply.opcode == Opcode::Close {
            return Err(ConnectError::HandshakeRejected {
                reason: close_reason(&reply),
            });
        }
        let response: PresenceResponse = reply.parse_json()?;
        if let Some(reason) = response.error_message() {
            return Err(ConnectError::HandshakeRejected { reason });
        }

        Ok(Self {
            stream: Some(stream),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Sends one command and blocks for its reply.
    ///
    /// Transport and framing failures close the channel; later calls return
    /// `ChannelError::Closed`. A command rejected by the endpoint, or one too
    /// large to frame, leaves the channel open.
    pub fn send(&mut self, message: &PresenceMessage) -> Result<PresenceResponse, ChannelError> {
        let result = self.round_trip(message);
        if let Err(err) = &result {
            if !matches!(err, ChannelError::Rejected(_) | ChannelError::Unencodable(_)) {
                self.stream = None;
            }
        }
        result
    }

    fn round_trip(&mut self, message: &PresenceMessage) -> Result<PresenceResponse, ChannelError> {
        let stream = self.stream.as_mut().ok_or(ChannelError::Closed)?;

        // Encoded up front so an oversized command never reaches the wire.
        let frame = Frame::json(Opcode::Frame, message)?;
        let bytes = encode_frame(frame.opcode, &frame.payload).map_err(ChannelError::Unencodable)?;
        stream.write_all(&bytes).map_err(FrameError::from)?;
        stream.flush().map_err(FrameError::from)?;

        loop {
            let reply = read_frame(stream)?;
            match reply.opcode {
                Opcode::Frame | Opcode::Handshake => {
                    let response: PresenceResponse = reply.parse_json()?;
                    if let Some(message) = response.error_message() {
                        return Err(ChannelError::Rejected(message));
                    }
                    return Ok(response);
                }
                Opcode::Close => {
                    return Err(ChannelError::ClosedByPeer {
                        reason: close_reason(&reply),
                    });
                }
                Opcode::Ping => {
                    write_frame(stream, &Frame::new(Opcode::Pong, reply.payload))?;
                }
                Opcode::Pong => {}
            }
        }
    }

    /// Releases the transport. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let frame = Frame::new(Opcode::Close, b"{}".to_vec());
            if let Err(err) = write_frame(&mut stream, &frame) {
                tracing::trace!(error = %err, "Close frame not delivered");
            }
            tracing::debug!(endpoint = %self.endpoint, "Presence channel closed");
        }
    }
}

impl<S: IpcStream> Drop for PresenceChannel<S> {
    fn drop(&mut self) {
        self.close();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Connector seam
// ═══════════════════════════════════════════════════════════════════════════════

/// An open link the sync loop can push commands through.
pub trait PresenceLink: Send {
    fn send(&mut self, message: &PresenceMessage) -> Result<PresenceResponse, ChannelError>;

    fn close(&mut self);
}

/// Produces fresh links. Each call is a new transport and a new handshake.
pub trait PresenceConnector: Send {
    type Link: PresenceLink;

    fn connect(&mut self) -> Result<Self::Link, ConnectError>;
}

impl<S: IpcStream> PresenceLink for PresenceChannel<S> {
    fn send(&mut self, message: &PresenceMessage) -> Result<PresenceResponse, ChannelError> {
        PresenceChannel::send(self, message)
    }

    fn close(&mut self) {
        PresenceChannel::close(self)
    }
}

pub struct IpcConnector<E: IpcEndpoints> {
    endpoints: E,
    client_id: String,
    timeout: Duration,
}

impl<E: IpcEndpoints> IpcConnector<E> {
    pub fn new(endpoints: E, client_id: impl Into<String>) -> Self {
        Self {
            endpoints,
            client_id: client_id.into(),
            timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<E: IpcEndpoints> PresenceConnector for IpcConnector<E> {
    type Link = PresenceChannel<E::Stream>;

    fn connect(&mut self) -> Result<Self::Link, ConnectError> {
        PresenceChannel::connect(&self.endpoints, &self.client_id, self.timeout)
    }
}

impl From<FrameError> for ConnectError {
    fn from(err: FrameError) -> Self {
        ConnectError::HandshakeRejected {
            reason: err.to_string(),
        }
    }
}
