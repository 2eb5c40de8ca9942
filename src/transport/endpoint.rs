//! Target address parsing and connection establishment.

use super::traits::{Connection, SocketOptions, TransportError};
use std::fmt;
use std::io;
use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

/// Port used when the target omits one.
pub const DEFAULT_PORT: u16 = 10000;

/// Where the remote server lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`, or a bare host on [`DEFAULT_PORT`].
    Tcp { host: String, port: u16 },
    /// `unix:/path/to/socket`
    Unix(PathBuf),
    /// `-`: the process's already-connected stdin/stdout.
    Stdio,
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TransportError::InvalidAddress {
            addr: s.to_string(),
            reason: reason.to_string(),
        };

        if s == "-" {
            return Ok(Endpoint::Stdio);
        }
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(invalid("empty socket path"));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }
        if s.is_empty() {
            return Err(invalid("empty address"));
        }

        // [v6]:port, [v6], host:port, host
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unterminated '['"))?;
            match tail {
                "" => (host, None),
                _ => match tail.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => return Err(invalid("unexpected text after ']'")),
                },
            }
        } else {
            match s.rsplit_once(':') {
                Some((host, port)) if !host.contains(':') => (host, Some(port)),
                Some(_) => return Err(invalid("IPv6 addresses must be bracketed")),
                None => (s, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port = match port {
            Some(p) => p.parse::<u16>().map_err(|_| invalid("bad port"))?,
            None => DEFAULT_PORT,
        };
        Ok(Endpoint::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Stdio => f.write_str("-"),
        }
    }
}

impl Endpoint {
    /// Establish the connection.
    pub fn connect(&self, options: SocketOptions) -> Result<Connection, TransportError> {
        info!(target: "hyperfuse::transport", endpoint = %self, "connecting");
        let conn = match self {
            Endpoint::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).map_err(|e| {
                    if e.kind() == io::ErrorKind::ConnectionRefused {
                        TransportError::ConnectionRefused(self.to_string())
                    } else {
                        TransportError::Io(e)
                    }
                })?;
                stream.set_write_timeout(options.write_timeout)?;
                Connection::tcp(stream)?
            }
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path).map_err(|e| {
                    if e.kind() == io::ErrorKind::ConnectionRefused {
                        TransportError::ConnectionRefused(self.to_string())
                    } else {
                        TransportError::Io(e)
                    }
                })?;
                stream.set_write_timeout(options.write_timeout)?;
                Connection::unix(stream)?
            }
            Endpoint::Stdio => Connection::stdio(),
        };
        debug!(target: "hyperfuse::transport", peer = conn.peer(), "connected");
        Ok(conn)
    }
}
