//! Chunk-capable inter-process message bus over pipe sockets.
//!
//! The bus ferries typed `[DataHead | payload]` records between a reactor
//! thread and worker processes. Payloads larger than one record are split
//! into a chunk series sharing a `msg_id` and reassembled on the receiver
//! through a pool of allocator-backed buffers; a fair-share chunk budget
//! bounds how much one flow can consume per read invocation.
//!
//! One bus instance belongs to one reactor thread. All I/O is nonblocking
//! and goes through the [`pipebus_transport::BusSocket`] facade; the
//! allocator and message-id generator are injected so tests and
//! shared-memory deployments can substitute their own.

mod alloc;
mod buffer;
mod bus;
mod config;
mod error;
mod id;
mod packet;
mod pool;
mod reader;
mod writer;

pub use alloc::{BusAllocator, SystemAllocator};
pub use bus::MessageBus;
pub use config::{
    BusConfig, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_RECV_CHUNK_COUNT, FALLBACK_CHUNK_SIZE,
};
pub use error::{BusError, Result};
pub use id::{MonotonicMsgId, MsgIdGenerator};
pub use packet::{Packet, PacketBuffer};
pub use reader::ReadStatus;
pub use writer::SendData;
