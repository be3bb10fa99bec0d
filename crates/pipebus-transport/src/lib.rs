//! Nonblocking socket facade consumed by the pipebus message bus.
//!
//! The bus never touches descriptors directly; it drives the [`BusSocket`]
//! contract (peek, read, scatter/gather I/O) and reacts to errors through
//! the two classification tables ([`classify_read_error`],
//! [`classify_write_error`]). Concrete facades wrap connected Unix stream and
//! datagram sockets; tests substitute scripted fakes.

pub mod error;
pub mod socket;
pub mod traits;

pub use error::{Result, TransportError};
pub use socket::{dgram_pair, stream_pair, DgramSocket, PipeSocket};
pub use traits::{
    classify_read_error, classify_write_error, writev_full, BusSocket, EventWriter, ReadControl,
    WriteControl,
};
