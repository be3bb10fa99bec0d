use std::os::unix::io::RawFd;

/// Errors that can occur while setting up or operating a pipe socket.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create a connected socket pair.
    #[error("failed to create socket pair: {0}")]
    Pair(std::io::Error),

    /// Failed to switch a socket into nonblocking mode.
    #[error("failed to set nonblocking mode on fd {fd}: {source}")]
    Nonblocking { fd: RawFd, source: std::io::Error },

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
