use std::{io, net::SocketAddr, path::PathBuf, string::FromUtf8Error, time::Duration};

use thiserror::Error;

/// Errors while reading or writing a single protocol frame.
///
/// Any of these on an established connection abandons that connection only.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("bad magic byte {found:#04x} (expected {expected:#04x})")]
    BadMagic { found: u8, expected: u8 },

    #[error("connection closed by peer")]
    Closed,

    #[error("frame ended before its declared length")]
    Incomplete,

    #[error("command is {0} bytes long, a frame holds at most 65535")]
    CommandTooLong(usize),

    #[error("peer did not take the response within {0:?}")]
    WriteTimeout(Duration),

    #[error("command text is not valid UTF-8")]
    InvalidUtf8(#[from] FromUtf8Error),

    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => ProtocolError::Closed,
            _ => ProtocolError::Io(e),
        }
    }
}

/// Setup-phase failures. These stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot resolve listen address {address}: {source}")]
    Resolve { address: String, source: io::Error },

    #[error("listen address {0} resolved to nothing")]
    NoAddress(String),

    #[error("cannot bind {address}: {source}")]
    Bind { address: SocketAddr, source: io::Error },

    #[error("cannot listen on {address}: {source}")]
    Listen { address: SocketAddr, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("cannot encode settings: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("history capacity must be at least 1")]
    ZeroCapacity,
}
