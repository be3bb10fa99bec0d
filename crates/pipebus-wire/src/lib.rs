//! Fixed-layout framing header for the pipebus message bus.
//!
//! Every record on a pipe socket is `[DataHead | payload]`. A logical message
//! is either a single non-chunked record or a series of chunked records that
//! share a `msg_id` and carry `BEGIN`/`END` markers. This crate defines only
//! the header and its flag vocabulary; reassembly and socket I/O live in
//! `pipebus-core` and `pipebus-transport`.

pub mod head;

pub use head::{
    now_seconds, DataHead, FLAG_BEGIN, FLAG_CHUNK, FLAG_DATA_OBJ_PTR, FLAG_DATA_PTR, FLAG_END,
    HEAD_LEN,
};
