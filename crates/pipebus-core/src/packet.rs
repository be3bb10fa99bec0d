use std::fmt;
use std::sync::Arc;

use crate::alloc::BusAllocator;

/// Owned growing byte buffer backing one reassembly entry.
///
/// The region comes from the injected allocator and is returned to it on
/// drop, so a shared-memory allocator makes the payload visible to the peer
/// process. Regions are allocated zeroed; every byte in `0..capacity` is
/// always initialized.
///
/// Exactly one owner exists at a time: the pool while the message is in
/// flight, then the caller after `move_packet` transfers the handle out.
pub struct PacketBuffer {
    ptr: *mut u8,
    len: usize,
    cap: usize,
    alloc: Arc<dyn BusAllocator>,
}

// SAFETY: the region is uniquely owned by this handle and carries no
// thread affinity; the allocator is Send + Sync by trait bound.
unsafe impl Send for PacketBuffer {}

impl PacketBuffer {
    /// Allocate a buffer of fixed capacity. Returns `None` when the
    /// allocator is exhausted. A zero capacity allocates nothing.
    pub(crate) fn with_capacity(cap: usize, alloc: Arc<dyn BusAllocator>) -> Option<Self> {
        if cap == 0 {
            return Some(Self {
                ptr: std::ptr::null_mut(),
                len: 0,
                cap: 0,
                alloc,
            });
        }
        let ptr = alloc.allocate_zeroed(cap);
        if ptr.is_null() {
            return None;
        }
        Some(Self {
            ptr,
            len: 0,
            cap,
            alloc,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Bytes accumulated so far.
    pub fn as_slice(&self) -> &[u8] {
        if self.ptr.is_null() {
            return &[];
        }
        // SAFETY: ptr covers cap initialized bytes and len <= cap.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Whole region, `capacity` bytes. Valid because regions are zeroed at
    /// allocation.
    pub(crate) fn region(&self) -> &[u8] {
        if self.ptr.is_null() {
            return &[];
        }
        // SAFETY: ptr covers cap initialized bytes.
        unsafe { std::slice::from_raw_parts(self.ptr, self.cap) }
    }

    pub(crate) fn region_mut(&mut self) -> &mut [u8] {
        if self.ptr.is_null() {
            return &mut [];
        }
        // SAFETY: ptr covers cap initialized bytes and the borrow is unique.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.cap) }
    }

    /// Writable tail of at most `max` bytes past the accumulated length.
    pub(crate) fn tail_mut(&mut self, max: usize) -> &mut [u8] {
        let n = (self.cap - self.len).min(max);
        if n == 0 {
            return &mut [];
        }
        // SAFETY: len + n <= cap, the region is initialized, and the borrow
        // is unique.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.add(self.len), n) }
    }

    /// Mark `n` tail bytes as accumulated after an external write into
    /// [`tail_mut`](Self::tail_mut).
    pub(crate) fn advance(&mut self, n: usize) {
        self.len = (self.len + n).min(self.cap);
    }

    /// Append bytes, growing the region if needed. Returns false when the
    /// allocator is exhausted; the buffer is unchanged in that case.
    pub(crate) fn append(&mut self, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return true;
        }
        let need = self.len + bytes.len();
        if need > self.cap && !self.reserve(need) {
            return false;
        }
        // SAFETY: reserve guaranteed len + bytes.len() <= cap and the two
        // regions cannot overlap (the source is a caller slice).
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(self.len), bytes.len());
        }
        self.len += bytes.len();
        true
    }

    fn reserve(&mut self, need: usize) -> bool {
        let new_cap = need.max(self.cap.saturating_mul(2)).max(64);
        let new_ptr = if self.ptr.is_null() {
            self.alloc.allocate_zeroed(new_cap)
        } else {
            // SAFETY: ptr came from this allocator with size cap.
            unsafe { self.alloc.grow(self.ptr, self.cap, new_cap) }
        };
        if new_ptr.is_null() {
            return false;
        }
        // Zero the grown tail so region() stays fully initialized.
        // SAFETY: new_ptr covers new_cap bytes and cap <= new_cap.
        unsafe {
            std::ptr::write_bytes(new_ptr.add(self.cap), 0, new_cap - self.cap);
        }
        self.ptr = new_ptr;
        self.cap = new_cap;
        true
    }
}

impl Drop for PacketBuffer {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: ptr came from this allocator with size cap and is
            // dropped exactly once.
            unsafe { self.alloc.release(self.ptr, self.cap) }
        }
    }
}

impl fmt::Debug for PacketBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBuffer")
            .field("len", &self.len)
            .field("cap", &self.cap)
            .finish()
    }
}

/// Receiver-side view of one delivered message.
///
/// The wire never carries the distinction; it is a receiver-local annotation
/// describing where the payload lives after delivery. The view is valid
/// until the next successful `read` on the same bus, unless the caller takes
/// ownership with `move_packet`.
#[derive(Debug, Clone, Copy)]
pub enum Packet<'a> {
    /// Payload sits inline in the chunk buffer (non-chunked message).
    Inline(&'a [u8]),
    /// Payload was reassembled into a pool buffer (chunked message).
    Assembled(&'a [u8]),
    /// Payload was handed over in-process by `pass` without copying.
    Passed(&'a [u8]),
}

impl<'a> Packet<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        match *self {
            Packet::Inline(b) | Packet::Assembled(b) | Packet::Passed(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::alloc::SystemAllocator;

    fn system() -> Arc<dyn BusAllocator> {
        Arc::new(SystemAllocator)
    }

    #[test]
    fn append_accumulates_bytes() {
        let mut buf = PacketBuffer::with_capacity(16, system()).unwrap();
        assert!(buf.append(b"hello "));
        assert!(buf.append(b"world"));
        assert_eq!(buf.as_slice(), b"hello world");
        assert_eq!(buf.len(), 11);
        assert_eq!(buf.capacity(), 16);
    }

    #[test]
    fn append_grows_past_capacity() {
        let mut buf = PacketBuffer::with_capacity(4, system()).unwrap();
        assert!(buf.append(b"0123456789"));
        assert_eq!(buf.as_slice(), b"0123456789");
        assert!(buf.capacity() >= 10);
    }

    #[test]
    fn tail_write_then_advance() {
        let mut buf = PacketBuffer::with_capacity(8, system()).unwrap();
        let tail = buf.tail_mut(5);
        assert_eq!(tail.len(), 5);
        tail.copy_from_slice(b"abcde");
        buf.advance(5);
        assert_eq!(buf.as_slice(), b"abcde");

        // Tail is bounded by the remaining capacity.
        assert_eq!(buf.tail_mut(100).len(), 3);
    }

    #[test]
    fn zero_capacity_allocates_nothing() {
        let buf = PacketBuffer::with_capacity(0, system()).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 0);
        assert!(buf.as_slice().is_empty());
    }

    #[test]
    fn packet_views_expose_bytes() {
        let inline = Packet::Inline(b"abc");
        assert_eq!(inline.bytes(), b"abc");
        assert_eq!(inline.len(), 3);
        assert!(!inline.is_empty());

        let empty = Packet::Assembled(&[]);
        assert!(empty.is_empty());
    }

    /// Allocator that counts live regions, to prove buffers return their
    /// storage on drop.
    struct CountingAllocator {
        live: AtomicUsize,
    }

    impl BusAllocator for CountingAllocator {
        fn allocate(&self, size: usize) -> *mut u8 {
            let ptr = SystemAllocator.allocate(size);
            if !ptr.is_null() {
                self.live.fetch_add(1, Ordering::SeqCst);
            }
            ptr
        }

        fn allocate_zeroed(&self, size: usize) -> *mut u8 {
            let ptr = SystemAllocator.allocate_zeroed(size);
            if !ptr.is_null() {
                self.live.fetch_add(1, Ordering::SeqCst);
            }
            ptr
        }

        unsafe fn grow(&self, ptr: *mut u8, old_size: usize, new_size: usize) -> *mut u8 {
            SystemAllocator.grow(ptr, old_size, new_size)
        }

        unsafe fn release(&self, ptr: *mut u8, size: usize) {
            self.live.fetch_sub(1, Ordering::SeqCst);
            SystemAllocator.release(ptr, size);
        }
    }

    #[test]
    fn drop_releases_through_the_allocator() {
        let alloc = Arc::new(CountingAllocator {
            live: AtomicUsize::new(0),
        });
        {
            let mut buf = PacketBuffer::with_capacity(32, alloc.clone()).unwrap();
            assert!(buf.append(&[0xAB; 32]));
            assert_eq!(alloc.live.load(Ordering::SeqCst), 1);
        }
        assert_eq!(alloc.live.load(Ordering::SeqCst), 0);
    }

    /// Allocator that always fails, for exhaustion paths.
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
    fn exhausted_allocator_fails_construction() {
        assert!(PacketBuffer::with_capacity(8, Arc::new(ExhaustedAllocator)).is_none());
    }
}
