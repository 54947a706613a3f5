//! Session operations and connection lifecycle
//!
//! `SessionOps` abstracts plain TCP and TLS I/O so that everything above it
//! is transport-agnostic. `SocketSession` owns exactly one such connection
//! at a time and drives it through
//! `Disconnected -> Connecting -> Connected`, with `close` returning to
//! `Disconnected` from any state.

use super::tls::TlsConfig;
use super::{Error, Result};
use crate::config::ConnectionSettings;
use crate::net;
use log::debug;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

/// Session operations trait
///
/// This trait defines the operations that can be performed on a session,
/// abstracting over plain TCP and TLS connections.
pub trait SessionOps: Send {
    /// Poll the session for events
    ///
    /// Returns true if the session is ready for the requested operation
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool>;

    /// Read data from the session
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write data to the session
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Flush buffered output
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Bound each blocking read on the underlying socket
    ///
    /// Only needed where a readable fd does not guarantee a non-blocking
    /// read, as with TLS records arriving in pieces.
    fn set_read_timeout(&mut self, _timeout: Option<Duration>) -> Result<()> {
        Ok(())
    }

    /// Close the session
    fn close(&mut self) -> Result<()>;

    /// Protocol selected by ALPN, if any
    fn negotiated_alpn(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
    Both,
}

/// Wait for `events` on `fd`; `None` waits forever
pub(crate) fn poll_fd(fd: RawFd, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
            PollEvents::Both => POLLIN | POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout
        .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1); // -1 = infinite

    loop {
        let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::Io(err));
        }

        return Ok(result > 0);
    }
}

/// Plain file descriptor session operations
pub struct FdSessionOps {
    stream: TcpStream,
}

impl FdSessionOps {
    /// Create a new FD session operations from a TCP stream
    pub fn new(stream: TcpStream) -> Self {
        FdSessionOps { stream }
    }

    /// Get a reference to the underlying stream
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl SessionOps for FdSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        poll_fd(self.stream.as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf).map_err(Error::from)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(Error::from)
    }

    fn close(&mut self) -> Result<()> {
        self.stream.shutdown(Shutdown::Both).map_err(Error::from)
    }
}

/// Connection state of a `SocketSession`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// One target connection, plain or TLS
///
/// The socket is opened lazily by `ensure_connected`, replaced by
/// `reconnect`, and released by `close` or on drop.
pub struct SocketSession {
    settings: ConnectionSettings,
    tls: Option<TlsConfig>,
    ops: Option<Box<dyn SessionOps>>,
    state: SessionState,
    timeout: Option<Duration>,
}

impl SocketSession {
    /// Create a disconnected session
    ///
    /// For TLS targets the OpenSSL context (including any client
    /// certificate) is built here, so misconfiguration fails immediately.
    pub fn new(settings: ConnectionSettings) -> Result<Self> {
        Self::with_alpn(settings, &[])
    }

    /// Create a disconnected session that offers `alpn` protocols over TLS
    pub fn with_alpn(settings: ConnectionSettings, alpn: &[&str]) -> Result<Self> {
        let tls = if settings.use_tls {
            Some(TlsConfig::from_settings(&settings, alpn)?)
        } else {
            None
        };

        Ok(SocketSession {
            settings,
            tls,
            ops: None,
            state: SessionState::Disconnected,
            timeout: None,
        })
    }

    /// Settings this session was built with
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a socket is open
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Set the per-read timeout; `None` blocks indefinitely
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Get the per-read timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Open a fresh connection, closing any current one first
    ///
    /// Failures are connection-setup errors (`Error::Network` or
    /// `Error::Tls`) and leave the session disconnected.
    pub fn connect(&mut self) -> Result<()> {
        self.close();
        self.state = SessionState::Connecting;

        match self.open() {
            Ok(ops) => {
                self.ops = Some(ops);
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Connect unless already connected
    pub fn ensure_connected(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.connect()
    }

    /// Drop the current socket and connect again
    pub fn reconnect(&mut self) -> Result<()> {
        debug!(
            "Re-creating connection to {}:{}",
            self.settings.target_host, self.settings.target_port
        );
        self.connect()
    }

    fn open(&self) -> Result<Box<dyn SessionOps>> {
        let stream = net::connect(&self.settings.target_host, self.settings.target_port)?;

        match &self.tls {
            Some(tls) => Ok(Box::new(tls.connect(stream)?)),
            None => Ok(Box::new(FdSessionOps::new(stream))),
        }
    }

    /// Release the socket, if any
    pub fn close(&mut self) {
        if let Some(mut ops) = self.ops.take() {
            if let Err(e) = ops.close() {
                // Peer may already have gone away
                debug!("Error closing socket: {}", e);
            }
        }
        self.state = SessionState::Disconnected;
    }

    /// Read once, waiting at most the per-read timeout for data
    ///
    /// Returns 0 when the peer has closed the connection.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let ops = self.ops.as_mut().ok_or(Error::ConnectionClosed)?;

        ops.set_read_timeout(self.timeout).map_err(receive_error)?;
        if !ops.poll(PollEvents::Read, self.timeout).map_err(receive_error)? {
            return Err(Error::Timeout(self.timeout.unwrap_or_default()));
        }

        ops.read(buf).map_err(receive_error)
    }

    /// Write the whole buffer
    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let ops = self.ops.as_mut().ok_or(Error::ConnectionClosed)?;

        let mut written = 0;
        while written < buf.len() {
            let n = ops.write(&buf[written..]).map_err(send_error)?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            written += n;
        }

        ops.flush().map_err(send_error)
    }

    /// Protocol selected by ALPN on the current connection
    pub fn negotiated_alpn(&self) -> Option<Vec<u8>> {
        self.ops.as_ref().and_then(|ops| ops.negotiated_alpn())
    }
}

impl Drop for SocketSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn receive_error(e: Error) -> Error {
    match e {
        Error::Io(e) => Error::Receive(e),
        other => other,
    }
}

fn send_error(e: Error) -> Error {
    match e {
        Error::Io(e) => Error::Send(e),
        other => other,
    }
}
