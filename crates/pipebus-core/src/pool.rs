use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use pipebus_wire::DataHead;

use crate::alloc::BusAllocator;
use crate::error::{BusError, Result};
use crate::packet::PacketBuffer;

/// Receiver-side mapping from `msg_id` to the growing buffer accumulating a
/// logical message.
///
/// Entries are created on the first chunk of a series, which must carry the
/// BEGIN mark, and removed when the caller takes the payload out or the bus
/// is dropped. The mapping survives across reader invocations; chunk streams
/// for different ids interleave freely.
pub(crate) struct PacketPool {
    entries: HashMap<u64, PacketBuffer>,
    alloc: Arc<dyn BusAllocator>,
}

impl PacketPool {
    pub(crate) fn new(alloc: Arc<dyn BusAllocator>) -> Self {
        Self {
            entries: HashMap::new(),
            alloc,
        }
    }

    /// Look up the buffer for `info.msg_id`, creating it sized to the total
    /// message length when this is the first chunk of a series.
    ///
    /// Returns `Ok(None)` when no entry exists and the chunk lacks the BEGIN
    /// mark, meaning a lost or duplicated initial chunk; the caller must drop the
    /// offending record to resync. Allocation failure leaves the pool
    /// untouched: insertion is the last step.
    pub(crate) fn get_or_create(&mut self, info: &DataHead) -> Result<Option<&mut PacketBuffer>> {
        match self.entries.entry(info.msg_id) {
            Entry::Occupied(entry) => Ok(Some(entry.into_mut())),
            Entry::Vacant(slot) => {
                if !info.is_begin() {
                    return Ok(None);
                }
                let size = info.len as usize;
                let buffer = PacketBuffer::with_capacity(size, self.alloc.clone())
                    .ok_or(BusError::AllocationFailed { size })?;
                Ok(Some(slot.insert(buffer)))
            }
        }
    }

    pub(crate) fn get(&self, msg_id: u64) -> Option<&PacketBuffer> {
        self.entries.get(&msg_id)
    }

    /// Transfer ownership of a completed buffer to the caller and remove the
    /// entry.
    pub(crate) fn take(&mut self, msg_id: u64) -> Option<PacketBuffer> {
        self.entries.remove(&msg_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Total reassembly storage currently held, for memory accounting.
    pub(crate) fn bytes_in_flight(&self) -> usize {
        self.entries.values().map(PacketBuffer::capacity).sum()
    }
}

#[cfg(test)]
mod tests {
    use pipebus_wire::{FLAG_BEGIN, FLAG_CHUNK};
    use zerocopy::FromZeroes;

    use super::*;
    use crate::alloc::SystemAllocator;

    fn pool() -> PacketPool {
        PacketPool::new(Arc::new(SystemAllocator))
    }

    fn chunk_head(msg_id: u64, len: u32, flags: u8) -> DataHead {
        let mut head = DataHead::new_zeroed();
        head.msg_id = msg_id;
        head.len = len;
        head.flags = FLAG_CHUNK | flags;
        head
    }

    #[test]
    fn begin_chunk_creates_an_entry_sized_to_the_message() {
        let mut pool = pool();
        let head = chunk_head(9, 100, FLAG_BEGIN);

        let buf = pool.get_or_create(&head).unwrap().unwrap();
        assert_eq!(buf.capacity(), 100);
        assert!(pool.get(9).is_some());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn missing_begin_yields_the_sentinel() {
        let mut pool = pool();
        let head = chunk_head(99, 100, 0);

        assert!(pool.get_or_create(&head).unwrap().is_none());
        assert!(pool.get(99).is_none());
    }

    #[test]
    fn later_chunks_reuse_the_entry() {
        let mut pool = pool();
        let first = chunk_head(5, 10, FLAG_BEGIN);
        pool.get_or_create(&first).unwrap().unwrap().append(b"abcde");

        let next = chunk_head(5, 10, 0);
        let buf = pool.get_or_create(&next).unwrap().unwrap();
        assert_eq!(buf.len(), 5);
        buf.append(b"fghij");
        assert_eq!(buf.as_slice(), b"abcdefghij");
    }

    #[test]
    fn take_transfers_ownership_and_empties_the_pool() {
        let mut pool = pool();
        let head = chunk_head(3, 4, FLAG_BEGIN);
        pool.get_or_create(&head).unwrap().unwrap().append(b"data");

        let owned = pool.take(3).unwrap();
        assert_eq!(owned.as_slice(), b"data");
        assert!(pool.get(3).is_none());
        assert!(pool.take(3).is_none());
    }

    #[test]
    fn bytes_in_flight_sums_capacities() {
        let mut pool = pool();
        pool.get_or_create(&chunk_head(1, 64, FLAG_BEGIN)).unwrap();
        pool.get_or_create(&chunk_head(2, 256, FLAG_BEGIN)).unwrap();
        assert_eq!(pool.bytes_in_flight(), 320);
    }

    struct ExhaustedAllocator;

    impl BusAllocator for ExhaustedAllocator {
        fn allocate(&self, _size: usize) -> *mut u8 {
            std::ptr::null_mut()
        }

        fn allocate_zeroed(&self, _size: usize) -> *mut u8 {
            std::ptr::null_mut()
        }

        unsafe fn grow(&self, _ptr: *mut u8, _old: usize, _new: usize) -> *mut u8 {
            std::ptr::null_mut()
        }

        unsafe fn release(&self, _ptr: *mut u8, _size: usize) {}
    }

    #[test]
    fn allocation_failure_leaves_no_partial_entry() {
        let mut pool = PacketPool::new(Arc::new(ExhaustedAllocator));
        let head = chunk_head(7, 128, FLAG_BEGIN);

        let err = pool.get_or_create(&head).unwrap_err();
        assert!(matches!(err, BusError::AllocationFailed { size: 128 }));
        assert!(pool.get(7).is_none());
        assert_eq!(pool.len(), 0);
    }
}
