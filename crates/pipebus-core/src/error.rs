/// Errors surfaced by the message bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The configured buffer size cannot hold a header plus one payload byte.
    #[error("invalid buffer size ({size} bytes, min {min})")]
    InvalidBufferSize { size: usize, min: usize },

    /// The fairness limit must allow at least one chunk per read.
    #[error("max_recv_chunk_count must be at least 1")]
    InvalidChunkLimit,

    /// The payload exceeds what the header's length field can describe.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The injected allocator returned null.
    #[error("allocation of {size} bytes failed")]
    AllocationFailed { size: usize },

    /// The peer closed the pipe socket.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The kernel accepted fewer bytes than one whole record.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },

    /// A datagram chunk arrived for an unknown message without a BEGIN mark.
    #[error("abnormal pipeline data (msg_id={msg_id})")]
    AbnormalChunk { msg_id: u64 },

    /// A fatal socket error.
    #[error("bus I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BusError>;
