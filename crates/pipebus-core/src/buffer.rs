use std::sync::Arc;

use pipebus_wire::{DataHead, HEAD_LEN};
use zerocopy::{AsBytes, FromZeroes};

use crate::alloc::BusAllocator;
use crate::packet::PacketBuffer;

/// The unit of one socket read or write: a header followed by an inline data
/// region of bounded capacity.
///
/// The region is allocator-backed like the reassembly buffers, so the chunk
/// buffer can also live in shared memory. A record is observably chunked
/// when `info.flags` carries the CHUNK bit.
pub(crate) struct PipeBuffer {
    pub(crate) info: DataHead,
    data: PacketBuffer,
}

impl PipeBuffer {
    /// Allocate a buffer of `buffer_size` total capacity (header included).
    /// Returns `None` when the allocator is exhausted.
    pub(crate) fn alloc(buffer_size: usize, alloc: &Arc<dyn BusAllocator>) -> Option<Self> {
        let data = PacketBuffer::with_capacity(buffer_size - HEAD_LEN, alloc.clone())?;
        Some(Self {
            info: DataHead::new_zeroed(),
            data,
        })
    }

    /// Capacity of the inline data region.
    pub(crate) fn data_capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Inline payload of a non-chunked record: the first `info.len` bytes of
    /// the data region, capped at the region capacity.
    pub(crate) fn payload(&self) -> &[u8] {
        let len = (self.info.len as usize).min(self.data.capacity());
        &self.data.region()[..len]
    }

    /// Full inline data region, for datagram receives.
    pub(crate) fn data_region(&self) -> &[u8] {
        self.data.region()
    }

    /// Header bytes and full data region as two writable slices, the iovec
    /// pair for one scatter read.
    pub(crate) fn split_mut(&mut self) -> (&mut [u8], &mut [u8]) {
        (self.info.as_bytes_mut(), self.data.region_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::SystemAllocator;

    fn alloc() -> Arc<dyn BusAllocator> {
        Arc::new(SystemAllocator)
    }

    #[test]
    fn capacity_excludes_header() {
        let buf = PipeBuffer::alloc(128, &alloc()).unwrap();
        assert_eq!(buf.data_capacity(), 128 - HEAD_LEN);
    }

    #[test]
    fn payload_is_bounded_by_info_len() {
        let mut buf = PipeBuffer::alloc(128, &alloc()).unwrap();
        {
            let (_, data) = buf.split_mut();
            data[..5].copy_from_slice(b"hello");
        }
        buf.info.len = 5;
        assert_eq!(buf.payload(), b"hello");
    }

    #[test]
    fn payload_never_exceeds_the_region() {
        let mut buf = PipeBuffer::alloc(64, &alloc()).unwrap();
        buf.info.len = 10_000;
        assert_eq!(buf.payload().len(), 64 - HEAD_LEN);
    }

    #[test]
    fn split_gives_header_sized_first_slice() {
        let mut buf = PipeBuffer::alloc(256, &alloc()).unwrap();
        let (head, data) = buf.split_mut();
        assert_eq!(head.len(), HEAD_LEN);
        assert_eq!(data.len(), 256 - HEAD_LEN);
    }
}
