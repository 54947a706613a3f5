//! Network utilities
//!
//! TCP connection establishment and the process-wide send throttle.

pub mod throttle;

pub use throttle::Throttle;

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("no address found for {0}")]
    NoAddress(String),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("socket error: {0}")]
    Socket(#[from] io::Error),
}

/// Open a blocking TCP connection to `host:port`
///
/// Every resolved address is tried in order; the last connect error is
/// returned if none succeeds.
pub fn connect(host: &str, port: u16) -> Result<TcpStream, Error> {
    let addrs = (host, port).to_socket_addrs().map_err(|source| Error::Resolve {
        host: host.to_string(),
        source,
    })?;

    let mut last_err = None;
    for addr in addrs {
        match connect_addr(addr) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| Error::NoAddress(format!("{}:{}", host, port))))
}

fn connect_addr(addr: SocketAddr) -> Result<TcpStream, Error> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nodelay(true)?;
    socket
        .connect(&addr.into())
        .map_err(|source| Error::Connect { addr, source })?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_connect_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = connect("127.0.0.1", port).unwrap();
        assert!(stream.nodelay().unwrap());
        assert_eq!(stream.peer_addr().unwrap().port(), port);
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to get a port with nothing listening
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = connect("127.0.0.1", port).unwrap_err();
        assert!(matches!(err, Error::Connect { .. }));
        assert!(err.to_string().contains(&port.to_string()));
    }
}
