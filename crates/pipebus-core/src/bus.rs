use std::os::unix::io::RawFd;
use std::sync::Arc;

use bytes::Bytes;
use pipebus_transport::{EventWriter, PipeSocket};
use pipebus_wire::{DataHead, FLAG_DATA_OBJ_PTR, FLAG_DATA_PTR};

use crate::alloc::{BusAllocator, SystemAllocator};
use crate::buffer::PipeBuffer;
use crate::config::BusConfig;
use crate::error::{BusError, Result};
use crate::id::{MonotonicMsgId, MsgIdGenerator};
use crate::packet::{Packet, PacketBuffer};
use crate::pool::PacketPool;
use crate::writer::SendData;

/// Chunk-capable message bus over pipe sockets.
///
/// One instance per reactor thread: the bus is single-threaded-cooperative
/// and carries no internal locking. `read` and `write` must not be invoked
/// concurrently on the same instance.
///
/// Allocator and id generator are injected at construction so multiple buses
/// coexist in one process and tests substitute fakes; the bus never reaches
/// for process globals.
pub struct MessageBus {
    pub(crate) config: BusConfig,
    pub(crate) buffer: PipeBuffer,
    pub(crate) pool: PacketPool,
    pub(crate) passed: Option<Bytes>,
    pub(crate) abnormal_packets: u64,
    allocator: Arc<dyn BusAllocator>,
    pub(crate) id_generator: Arc<dyn MsgIdGenerator>,
    pub(crate) event_writer: Option<Arc<dyn EventWriter>>,
    pipe_sockets: Vec<Option<PipeSocket>>,
}

impl MessageBus {
    /// Bus with default configuration, heap allocator, and monotonic ids.
    pub fn new() -> Result<Self> {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Result<Self> {
        Self::with_parts(
            config,
            Arc::new(SystemAllocator),
            Arc::new(MonotonicMsgId::new()),
        )
    }

    /// Fully injected constructor.
    pub fn with_parts(
        config: BusConfig,
        allocator: Arc<dyn BusAllocator>,
        id_generator: Arc<dyn MsgIdGenerator>,
    ) -> Result<Self> {
        config.validate()?;
        let buffer =
            PipeBuffer::alloc(config.buffer_size, &allocator).ok_or(BusError::AllocationFailed {
                size: config.buffer_size,
            })?;
        let pool = PacketPool::new(allocator.clone());
        Ok(Self {
            config,
            buffer,
            pool,
            passed: None,
            abnormal_packets: 0,
            allocator,
            id_generator,
            event_writer: None,
            pipe_sockets: Vec::new(),
        })
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// The allocator this bus places its buffers with.
    pub fn allocator(&self) -> &Arc<dyn BusAllocator> {
        &self.allocator
    }

    /// Header of the most recently received (or passed) record.
    pub fn info(&self) -> &DataHead {
        &self.buffer.info
    }

    /// Install the reactor's asynchronous write capability. While installed,
    /// `write` enqueues records on the reactor instead of writing
    /// synchronously.
    pub fn set_event_writer(&mut self, writer: Arc<dyn EventWriter>) {
        self.event_writer = Some(writer);
    }

    pub fn clear_event_writer(&mut self) {
        self.event_writer = None;
    }

    /// View of the current packet after a `Ready` read.
    ///
    /// Dispatches on the receiver-local flags: a passed payload, a
    /// reassembled pool buffer, or the inline region of the chunk buffer.
    /// The view is valid until the next `read` on this bus; call
    /// [`move_packet`](Self::move_packet) to keep the payload longer.
    pub fn get_packet(&self) -> Packet<'_> {
        let flags = self.buffer.info.flags;
        if flags & FLAG_DATA_PTR != 0 {
            Packet::Passed(self.passed.as_deref().unwrap_or(&[]))
        } else if flags & FLAG_DATA_OBJ_PTR != 0 {
            match self.pool.get(self.buffer.info.msg_id) {
                Some(buffer) => Packet::Assembled(buffer.as_slice()),
                None => Packet::Assembled(&[]),
            }
        } else {
            Packet::Inline(self.buffer.payload())
        }
    }

    /// Take ownership of the current reassembled payload, detaching it from
    /// the pool. Returns `None` when the current packet has no pool entry
    /// (non-chunked, passed, or already moved).
    pub fn move_packet(&mut self) -> Option<PacketBuffer> {
        self.pool.take(self.buffer.info.msg_id)
    }

    /// Same-process zero-copy hand-off: deliver `task` to this bus without
    /// touching a socket. The payload is shared by reference count and
    /// marked with the receiver-local DATA_PTR flag.
    pub fn pass(&mut self, task: &SendData) {
        self.buffer.info = task.info.clone();
        if task.payload.is_empty() {
            self.passed = None;
        } else {
            self.buffer.info.flags = FLAG_DATA_PTR;
            self.buffer.info.len = task.payload.len() as u32;
            self.passed = Some(task.payload.clone());
        }
    }

    /// In-flight reassembly storage plus the chunk buffer, in bytes.
    pub fn memory_size(&self) -> usize {
        self.config.buffer_size + self.pool.bytes_in_flight()
    }

    /// Number of reassembly entries currently in flight.
    pub fn pending_messages(&self) -> usize {
        self.pool.len()
    }

    /// Records dropped because a chunk arrived for an unknown message
    /// without a BEGIN mark.
    pub fn abnormal_packet_count(&self) -> u64 {
        self.abnormal_packets
    }

    /// Register a worker pipe descriptor owned by the caller. The table is
    /// grown to cover `fd`; the installed facade is nonblocking with an
    /// unbounded buffer limit and never closes the descriptor.
    ///
    /// The descriptor must stay open for as long as it is registered.
    pub fn init_pipe_socket(&mut self, fd: RawFd) -> Result<()> {
        let index = usize::try_from(fd).map_err(|_| {
            BusError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "negative pipe fd",
            ))
        })?;
        if index >= self.pipe_sockets.len() {
            self.pipe_sockets.resize_with(index + 1, || None);
        }
        // SAFETY: the caller keeps fd open while it is registered; the
        // borrowed facade never closes it.
        let socket = unsafe { PipeSocket::from_borrowed_fd(fd) }
            .map_err(|err| BusError::Io(std::io::Error::other(err.to_string())))?;
        self.pipe_sockets[index] = Some(socket);
        Ok(())
    }

    /// Look up a registered pipe socket facade.
    pub fn pipe_socket(&self, fd: RawFd) -> Option<&PipeSocket> {
        let index = usize::try_from(fd).ok()?;
        self.pipe_sockets.get(index)?.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;

    use pipebus_transport::BusSocket;
    use pipebus_wire::HEAD_LEN;
    use zerocopy::FromZeroes;

    use super::*;

    #[test]
    fn constructor_rejects_undersized_buffers() {
        let cfg = BusConfig {
            buffer_size: HEAD_LEN,
            ..BusConfig::default()
        };
        assert!(matches!(
            MessageBus::with_config(cfg),
            Err(BusError::InvalidBufferSize { .. })
        ));
    }

    #[test]
    fn fresh_bus_reports_inline_empty_packet() {
        let bus = MessageBus::new().unwrap();
        let packet = bus.get_packet();
        assert!(matches!(packet, Packet::Inline(_)));
        assert!(packet.is_empty());
    }

    #[test]
    fn pass_installs_a_zero_copy_packet() {
        let mut bus = MessageBus::new().unwrap();
        let mut info = DataHead::new_zeroed();
        info.fd = 12;
        info.type_tag = 4;
        let task = SendData::with_info(info, Bytes::from_static(b"in-process"));

        bus.pass(&task);

        assert_eq!(bus.info().fd, 12);
        assert_eq!(bus.info().type_tag, 4);
        assert_eq!(bus.info().flags, FLAG_DATA_PTR);
        assert_eq!(bus.info().len, 10);
        match bus.get_packet() {
            Packet::Passed(bytes) => assert_eq!(bytes, b"in-process"),
            other => panic!("expected passed packet, got {other:?}"),
        }
    }

    #[test]
    fn pass_with_empty_payload_stays_inline() {
        let mut bus = MessageBus::new().unwrap();
        let task = SendData::with_info(DataHead::new_zeroed(), Bytes::new());
        bus.pass(&task);
        assert_eq!(bus.info().flags, 0);
        assert!(bus.get_packet().is_empty());
    }

    #[test]
    fn memory_size_counts_buffer_and_pool() {
        let bus = MessageBus::new().unwrap();
        assert_eq!(bus.memory_size(), bus.config().buffer_size);
    }

    #[test]
    fn registry_grows_and_resolves_by_fd() {
        let mut bus = MessageBus::new().unwrap();
        let (left, _right) = UnixStream::pair().unwrap();
        let fd = left.as_raw_fd();

        bus.init_pipe_socket(fd).unwrap();

        let sock = bus.pipe_socket(fd).expect("fd should be registered");
        assert_eq!(sock.raw_fd(), fd);
        assert!(bus.pipe_socket(fd + 1000).is_none());
    }

    #[test]
    fn dropping_the_bus_leaves_registered_fds_open() {
        let (mut left, right) = UnixStream::pair().unwrap();
        {
            let mut bus = MessageBus::new().unwrap();
            bus.init_pipe_socket(right.as_raw_fd()).unwrap();
        }

        // The registered end must survive the bus.
        left.write_all(b"alive").unwrap();
        let wrapped = PipeSocket::from_stream(right).unwrap();
        let mut buf = [0u8; 8];
        let n = wrapped.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"alive");
    }

    #[test]
    fn init_pipe_socket_rejects_negative_fds() {
        let mut bus = MessageBus::new().unwrap();
        assert!(bus.init_pipe_socket(-1).is_err());
    }
}
