use bytes::Bytes;
use pipebus_transport::{classify_write_error, writev_full, BusSocket, WriteControl};
use pipebus_wire::{DataHead, FLAG_BEGIN, FLAG_CHUNK, FLAG_END, HEAD_LEN};
use tracing::{debug, trace};
use zerocopy::{AsBytes, FromZeroes};

use crate::bus::MessageBus;
use crate::config::FALLBACK_CHUNK_SIZE;
use crate::error::{BusError, Result};

/// One outbound message: a header template plus the payload bytes.
///
/// The writer fills in `msg_id`, `flags`, and `len`; every other header
/// field (`fd`, `type_tag`, `reactor_id`, `server_fd`, `ext_flags`, `time`)
/// travels as the caller set it.
#[derive(Debug, Clone)]
pub struct SendData {
    pub info: DataHead,
    pub payload: Bytes,
}

impl SendData {
    /// Message with a fresh stamped header carrying only a type tag.
    pub fn new(type_tag: u8, payload: impl Into<Bytes>) -> Self {
        let mut info = DataHead::new_zeroed();
        info.type_tag = type_tag;
        info.stamp();
        Self {
            info,
            payload: payload.into(),
        }
    }

    pub fn with_info(info: DataHead, payload: impl Into<Bytes>) -> Self {
        Self {
            info,
            payload: payload.into(),
        }
    }
}

impl MessageBus {
    /// Transmit one logical message, fragmenting it into chunks when it does
    /// not fit a single record.
    ///
    /// A kernel rejection of the record size (ENOBUFS/EMSGSIZE class) drops
    /// the chunk cap to the 8 KiB fallback and retries; any other write
    /// error is surfaced. When an `EventWriter` is installed the records are
    /// enqueued on the reactor's write path instead of written synchronously.
    pub fn write(&mut self, sock: &dyn BusSocket, task: &SendData) -> Result<()> {
        if task.payload.len() > u32::MAX as usize {
            return Err(BusError::PayloadTooLarge {
                size: task.payload.len(),
                max: u32::MAX as usize,
            });
        }

        let mut info = task.info.clone();
        info.msg_id = self.id_generator.next_id();
        let payload = &task.payload;
        let mut max_chunk = self.config.max_chunk_payload();

        if payload.is_empty() {
            info.flags = 0;
            info.len = 0;
            let written = self
                .send_record(sock, info.as_bytes(), &[])
                .map_err(BusError::Io)?;
            if written != HEAD_LEN {
                return Err(BusError::ShortWrite {
                    written,
                    expected: HEAD_LEN,
                });
            }
            return Ok(());
        }

        if !self.config.always_chunked_transfer && payload.len() <= max_chunk {
            info.flags = 0;
            info.len = payload.len() as u32;
            match self.send_record(sock, info.as_bytes(), payload) {
                Ok(written) if written == HEAD_LEN + payload.len() => return Ok(()),
                Ok(written) => {
                    return Err(BusError::ShortWrite {
                        written,
                        expected: HEAD_LEN + payload.len(),
                    })
                }
                Err(err) => match classify_write_error(&err) {
                    WriteControl::ReduceSize if max_chunk > FALLBACK_CHUNK_SIZE => {
                        debug!(
                            fd = sock.raw_fd(),
                            len = payload.len(),
                            "record rejected as too large, switching to chunked transfer"
                        );
                        max_chunk = FALLBACK_CHUNK_SIZE;
                    }
                    _ => return Err(BusError::Io(err)),
                },
            }
        }

        info.flags = FLAG_CHUNK | FLAG_BEGIN;
        info.len = payload.len() as u32;
        let mut offset = 0usize;

        while offset < payload.len() {
            let remaining = payload.len() - offset;
            let copy_n = if remaining > max_chunk {
                max_chunk
            } else {
                info.flags |= FLAG_END;
                remaining
            };

            trace!(msg_id = info.msg_id, chunk = copy_n, offset, "sending chunk");

            if let Err(err) = self.send_record(sock, info.as_bytes(), &payload[offset..offset + copy_n]) {
                match classify_write_error(&err) {
                    WriteControl::ReduceSize if max_chunk > FALLBACK_CHUNK_SIZE => {
                        debug!(
                            fd = sock.raw_fd(),
                            max_chunk = FALLBACK_CHUNK_SIZE,
                            "chunk rejected as too large, lowering chunk size"
                        );
                        max_chunk = FALLBACK_CHUNK_SIZE;
                        // This iteration is no longer guaranteed final.
                        info.flags &= !FLAG_END;
                        continue;
                    }
                    WriteControl::Retry => continue,
                    _ => return Err(BusError::Io(err)),
                }
            }

            info.flags &= !FLAG_BEGIN;
            offset += copy_n;
        }

        Ok(())
    }

    fn send_record(&self, sock: &dyn BusSocket, head: &[u8], body: &[u8]) -> std::io::Result<usize> {
        match &self.event_writer {
            Some(writer) => writer.writev_async(sock, head, body),
            None => writev_full(sock, head, body),
        }
    }
}
