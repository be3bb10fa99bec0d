use std::alloc::Layout;

/// Allocator capability injected into the bus.
///
/// Reassembly buffers and the chunk buffer go through this interface so
/// callers can place them in shared memory visible to a peer process. The
/// four operations mirror malloc / calloc / realloc / free. Implementations
/// must be thread-safe only if one allocator is shared across buses.
pub trait BusAllocator: Send + Sync {
    /// Allocate `size` bytes. Returns null on exhaustion. `size` must be
    /// nonzero.
    fn allocate(&self, size: usize) -> *mut u8;

    /// Allocate `size` zeroed bytes. Returns null on exhaustion. `size` must
    /// be nonzero.
    fn allocate_zeroed(&self, size: usize) -> *mut u8;

    /// Resize a region previously returned by this allocator. Returns null
    /// on exhaustion, in which case the original region is untouched.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this allocator with size `old_size`, and
    /// `new_size` must be nonzero.
    unsafe fn grow(&self, ptr: *mut u8, old_size: usize, new_size: usize) -> *mut u8;

    /// Release a region previously returned by this allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this allocator with size `size` and must not be
    /// used afterwards.
    unsafe fn release(&self, ptr: *mut u8, size: usize);
}

/// Process-heap allocator used when the caller injects nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

fn byte_layout(size: usize) -> Option<Layout> {
    if size == 0 {
        return None;
    }
    Layout::array::<u8>(size).ok()
}

impl BusAllocator for SystemAllocator {
    fn allocate(&self, size: usize) -> *mut u8 {
        match byte_layout(size) {
            // SAFETY: the layout has nonzero size.
            Some(layout) => unsafe { std::alloc::alloc(layout) },
            None => std::ptr::null_mut(),
        }
    }

    fn allocate_zeroed(&self, size: usize) -> *mut u8 {
        match byte_layout(size) {
            // SAFETY: the layout has nonzero size.
            Some(layout) => unsafe { std::alloc::alloc_zeroed(layout) },
            None => std::ptr::null_mut(),
        }
    }

    unsafe fn grow(&self, ptr: *mut u8, old_size: usize, new_size: usize) -> *mut u8 {
        match byte_layout(old_size) {
            Some(layout) if new_size > 0 => std::alloc::realloc(ptr, layout, new_size),
            _ => std::ptr::null_mut(),
        }
    }

    unsafe fn release(&self, ptr: *mut u8, size: usize) {
        if let Some(layout) = byte_layout(size) {
            std::alloc::dealloc(ptr, layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_release() {
        let alloc = SystemAllocator;
        let ptr = alloc.allocate(64);
        assert!(!ptr.is_null());
        // SAFETY: ptr came from allocate(64) just above.
        unsafe { alloc.release(ptr, 64) };
    }

    #[test]
    fn allocate_zeroed_is_zeroed() {
        let alloc = SystemAllocator;
        let ptr = alloc.allocate_zeroed(32);
        assert!(!ptr.is_null());
        // SAFETY: ptr came from allocate_zeroed(32) just above.
        unsafe {
            for i in 0..32 {
                assert_eq!(*ptr.add(i), 0);
            }
            alloc.release(ptr, 32);
        }
    }

    #[test]
    fn grow_preserves_contents() {
        let alloc = SystemAllocator;
        let ptr = alloc.allocate_zeroed(8);
        assert!(!ptr.is_null());
        // SAFETY: ptr came from allocate_zeroed(8); grow contract is upheld.
        unsafe {
            *ptr = 0xAB;
            let bigger = alloc.grow(ptr, 8, 128);
            assert!(!bigger.is_null());
            assert_eq!(*bigger, 0xAB);
            alloc.release(bigger, 128);
        }
    }

    #[test]
    fn zero_size_requests_return_null() {
        let alloc = SystemAllocator;
        assert!(alloc.allocate(0).is_null());
        assert!(alloc.allocate_zeroed(0).is_null());
    }
}
