//! TLS session operations
//!
//! This module implements the SessionOps trait for TLS connections,
//! enabling transparent switching between plain TCP and TLS I/O.

use super::config::{TlsConfig, TlsError};
use crate::http::session::{poll_fd, PollEvents, SessionOps};
use crate::http::{Error, Result as HttpResult};
use openssl::ssl::{Ssl, SslStream};
use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Duration;

/// TLS session operations
///
/// Wraps an OpenSSL SslStream and provides poll/read/write/close operations.
pub struct TlsSessionOps {
    stream: SslStream<TcpStream>,
    failed: bool,
    read_timeout: Option<Duration>,
}

impl TlsSessionOps {
    /// Create a client TLS connection (perform handshake)
    pub fn connect(tcp_stream: TcpStream, config: &TlsConfig) -> Result<Self, TlsError> {
        let mut ssl = Ssl::new(&config.ctx)?;

        if let Some(ref servername) = config.servername {
            match servername.parse::<IpAddr>() {
                // No SNI for address literals
                Ok(ip) => {
                    if config.verify_peer {
                        ssl.param_mut().set_ip(ip)?;
                    }
                }
                Err(_) => {
                    ssl.set_hostname(servername)?;
                    if config.verify_peer {
                        ssl.param_mut().set_host(servername)?;
                    }
                }
            }
        }

        // Blocking handshake
        let ssl_stream = ssl
            .connect(tcp_stream)
            .map_err(|e| TlsError::HandshakeFailed(format!("Connection failed: {}", e)))?;

        Ok(TlsSessionOps {
            stream: ssl_stream,
            failed: false,
            read_timeout: None,
        })
    }
}

impl SessionOps for TlsSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> HttpResult<bool> {
        // Decrypted bytes already buffered by OpenSSL never show up on the fd
        if events != PollEvents::Write && self.stream.ssl().pending() > 0 {
            return Ok(true);
        }

        poll_fd(self.stream.get_ref().as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> HttpResult<usize> {
        // A readable fd may hold only part of a record, so the socket
        // itself carries the timeout and SSL_read can give up mid-record
        self.stream.read(buf).map_err(|e| {
            self.failed = true;
            match e.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                    Error::Timeout(self.read_timeout.unwrap_or_default())
                }
                _ => Error::Io(e),
            }
        })
    }

    fn write(&mut self, buf: &[u8]) -> HttpResult<usize> {
        self.stream.write(buf).map_err(|e| {
            self.failed = true;
            Error::Io(e)
        })
    }

    fn flush(&mut self) -> HttpResult<()> {
        self.stream.flush().map_err(|e| {
            self.failed = true;
            Error::Io(e)
        })
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> HttpResult<()> {
        if self.read_timeout == timeout {
            return Ok(());
        }
        // A zero timeout is rejected by the socket
        let socket_timeout = timeout.map(|t| t.max(Duration::from_millis(1)));
        self.stream.get_ref().set_read_timeout(socket_timeout)?;
        self.read_timeout = timeout;
        Ok(())
    }

    fn close(&mut self) -> HttpResult<()> {
        // Perform SSL shutdown if not failed
        if !self.failed {
            let _ = self.stream.shutdown();
        }

        self.stream
            .get_mut()
            .shutdown(Shutdown::Both)
            .map_err(Error::from)
    }

    fn negotiated_alpn(&self) -> Option<Vec<u8>> {
        self.stream.ssl().selected_alpn_protocol().map(<[u8]>::to_vec)
    }
}
