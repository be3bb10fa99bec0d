use std::io::IoSliceMut;

use pipebus_transport::{classify_read_error, BusSocket, ReadControl};
use pipebus_wire::{FLAG_DATA_OBJ_PTR, HEAD_LEN};
use tracing::{trace, warn};
use zerocopy::AsBytes;

use crate::bus::MessageBus;
use crate::error::{BusError, Result};

/// Outcome of one reader invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// No complete message right now: the socket would block, the chunk
    /// budget forced a yield, or an orphan record was dropped. Re-arm the
    /// readability event and come back.
    Idle,
    /// A message is deliverable through `get_packet`; the value is the byte
    /// count of the final record consumed.
    Ready(usize),
}

/// Continuation decision after one chunk has been absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkProgress {
    Ready,
    Continue,
    Yield,
}

impl MessageBus {
    /// Drive reads on a stream pipe socket until a message completes, the
    /// socket runs dry, or the fair-share chunk budget is spent.
    ///
    /// The header is peeked first so a record for an unknown chunk series
    /// can be dropped without desynchronizing the stream. Calling this
    /// invalidates the previous packet view.
    pub fn read(&mut self, sock: &dyn BusSocket) -> Result<ReadStatus> {
        self.passed = None;
        let mut recv_chunk_count = 0usize;

        loop {
            let peeked = match sock.peek(self.buffer.info.as_bytes_mut()) {
                Ok(n) => n,
                Err(err) => match classify_read_error(&err) {
                    ReadControl::Wait => return Ok(ReadStatus::Idle),
                    ReadControl::Retry => continue,
                    ReadControl::Fatal => return Err(BusError::Io(err)),
                },
            };
            if peeked == 0 {
                warn!(fd = sock.raw_fd(), "pipe socket closed by peer");
                return Err(BusError::ConnectionClosed);
            }
            if peeked < HEAD_LEN {
                // Header still in flight; wait for the rest.
                return Ok(ReadStatus::Idle);
            }

            if !self.buffer.info.is_chunked() {
                return self.read_inline(sock);
            }

            let info = self.buffer.info.clone();
            let entry = match self.pool.get_or_create(&info)? {
                Some(entry) => entry,
                None => {
                    self.abnormal_packets += 1;
                    warn!(
                        code = "ABNORMAL_PIPE_DATA",
                        msg_id = info.msg_id,
                        pipe_fd = sock.raw_fd(),
                        reactor_id = info.reactor_id,
                        "chunk without a begin mark for an unknown message, dropping record"
                    );
                    // Consume the offending header to resync the socket.
                    let _ = sock.read(self.buffer.info.as_bytes_mut());
                    return Ok(ReadStatus::Idle);
                }
            };

            let remain = (info.len as usize).saturating_sub(entry.len());
            let want = remain.min(self.config.max_chunk_payload());
            let mut iovs = [
                IoSliceMut::new(self.buffer.info.as_bytes_mut()),
                IoSliceMut::new(entry.tail_mut(want)),
            ];
            let received = match sock.read_vectored(&mut iovs) {
                Ok(0) => {
                    warn!(
                        fd = sock.raw_fd(),
                        reactor_id = info.reactor_id,
                        "pipe socket closed mid-series"
                    );
                    return Err(BusError::ConnectionClosed);
                }
                Ok(n) => n,
                Err(err) => match classify_read_error(&err) {
                    ReadControl::Wait => return Ok(ReadStatus::Idle),
                    ReadControl::Retry => continue,
                    ReadControl::Fatal => return Err(BusError::Io(err)),
                },
            };

            let appended = received.saturating_sub(HEAD_LEN);
            entry.advance(appended);
            trace!(msg_id = info.msg_id, appended, "chunk absorbed");

            match self.prepare_packet(&mut recv_chunk_count) {
                ChunkProgress::Ready => return Ok(ReadStatus::Ready(received)),
                ChunkProgress::Continue => continue,
                ChunkProgress::Yield => return Ok(ReadStatus::Idle),
            }
        }
    }

    /// Non-chunked fast path: one exact read of header plus payload into the
    /// chunk buffer. The pool is never touched.
    fn read_inline(&mut self, sock: &dyn BusSocket) -> Result<ReadStatus> {
        let len = (self.buffer.info.len as usize).min(self.buffer.data_capacity());
        loop {
            let (head, data) = self.buffer.split_mut();
            let mut iovs = [IoSliceMut::new(head), IoSliceMut::new(&mut data[..len])];
            match sock.read_vectored(&mut iovs) {
                Ok(0) => {
                    warn!(fd = sock.raw_fd(), "pipe socket closed by peer");
                    return Err(BusError::ConnectionClosed);
                }
                Ok(n) => return Ok(ReadStatus::Ready(n)),
                Err(err) => match classify_read_error(&err) {
                    ReadControl::Wait => return Ok(ReadStatus::Idle),
                    ReadControl::Retry => continue,
                    ReadControl::Fatal => return Err(BusError::Io(err)),
                },
            }
        }
    }

    /// Datagram variant: every receive yields one whole record, either a
    /// complete message or one chunk. No peek is needed and there is no
    /// resync path: an orphan chunk is fatal because its datagram is
    /// already consumed.
    pub fn read_with_buffer(&mut self, sock: &dyn BusSocket) -> Result<ReadStatus> {
        self.passed = None;
        let mut recv_chunk_count = 0usize;

        loop {
            let received = {
                let (head, data) = self.buffer.split_mut();
                let mut iovs = [IoSliceMut::new(head), IoSliceMut::new(data)];
                match sock.read_vectored(&mut iovs) {
                    Ok(n) => n,
                    Err(err) => match classify_read_error(&err) {
                        ReadControl::Wait => return Ok(ReadStatus::Idle),
                        ReadControl::Retry => continue,
                        ReadControl::Fatal => return Err(BusError::Io(err)),
                    },
                }
            };
            if received == 0 {
                warn!(fd = sock.raw_fd(), "pipe socket closed by peer");
                return Err(BusError::ConnectionClosed);
            }
            if received < HEAD_LEN {
                self.abnormal_packets += 1;
                warn!(
                    code = "ABNORMAL_PIPE_DATA",
                    fd = sock.raw_fd(),
                    received,
                    "datagram shorter than a header, dropping"
                );
                return Ok(ReadStatus::Idle);
            }

            if !self.buffer.info.is_chunked() {
                return Ok(ReadStatus::Ready(received));
            }

            let info = self.buffer.info.clone();
            let payload_len = received - HEAD_LEN;
            let entry = match self.pool.get_or_create(&info)? {
                Some(entry) => entry,
                None => {
                    self.abnormal_packets += 1;
                    warn!(
                        code = "ABNORMAL_PIPE_DATA",
                        msg_id = info.msg_id,
                        pipe_fd = sock.raw_fd(),
                        reactor_id = info.reactor_id,
                        "chunk without a begin mark for an unknown message"
                    );
                    return Err(BusError::AbnormalChunk { msg_id: info.msg_id });
                }
            };

            if !entry.append(&self.buffer.data_region()[..payload_len]) {
                return Err(BusError::AllocationFailed { size: payload_len });
            }
            trace!(msg_id = info.msg_id, appended = payload_len, "chunk absorbed");

            match self.prepare_packet(&mut recv_chunk_count) {
                ChunkProgress::Ready => return Ok(ReadStatus::Ready(received)),
                ChunkProgress::Continue => continue,
                ChunkProgress::Yield => return Ok(ReadStatus::Idle),
            }
        }
    }

    /// Account one absorbed chunk and decide how the read loop continues.
    ///
    /// Caps the chunks consumed per invocation so a single fast flow cannot
    /// pin the worker; on yield the reactor re-arms and other flows get
    /// their turn. On the final chunk the buffer is annotated so
    /// `get_packet` resolves the reassembled payload.
    pub(crate) fn prepare_packet(&mut self, recv_chunk_count: &mut usize) -> ChunkProgress {
        *recv_chunk_count += 1;
        if !self.buffer.info.is_end() {
            if *recv_chunk_count >= self.config.max_recv_chunk_count {
                trace!(
                    chunks = *recv_chunk_count,
                    "chunk budget spent, yielding to the event loop"
                );
                return ChunkProgress::Yield;
            }
            return ChunkProgress::Continue;
        }

        self.buffer.info.flags |= FLAG_DATA_OBJ_PTR;
        trace!(
            msg_id = self.buffer.info.msg_id,
            len = self.buffer.info.len,
            "message reassembled"
        );
        ChunkProgress::Ready
    }
}
