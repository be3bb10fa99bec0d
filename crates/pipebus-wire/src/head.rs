use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// The record is one slice of a larger logical message.
pub const FLAG_CHUNK: u8 = 1 << 0;

/// First record of a chunk series.
pub const FLAG_BEGIN: u8 = 1 << 1;

/// Last record of a chunk series.
pub const FLAG_END: u8 = 1 << 2;

/// Receiver-local: the payload is a same-process hand-off installed by
/// `pass`. Never sent on the wire.
pub const FLAG_DATA_PTR: u8 = 1 << 3;

/// Receiver-local: the payload lives in a completed reassembly buffer.
/// Never sent on the wire.
pub const FLAG_DATA_OBJ_PTR: u8 = 1 << 4;

/// Wire size of [`DataHead`].
pub const HEAD_LEN: usize = std::mem::size_of::<DataHead>();

/// Fixed-size prefix carried by every record on a pipe socket.
///
/// Layout is `#[repr(C)]` with an explicit reserved gap so the struct has no
/// implicit padding: 40 bytes, stable on a single host. No cross-host wire
/// compatibility is promised; reactor and workers always share one machine.
///
/// `len` is always the **total** payload length of the logical message, not
/// the length of one chunk; the per-chunk size is visible only as the record
/// length on the socket.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct DataHead {
    /// Caller-defined connection id.
    pub fd: i64,
    /// Reassembly key, unique per in-flight message on a receiver.
    pub msg_id: u64,
    /// Total payload length of the logical message.
    pub len: u32,
    /// Origin worker/reactor id.
    pub reactor_id: i16,
    /// Opaque tag interpreted by the caller.
    pub type_tag: u8,
    /// Bitmask of the `FLAG_*` constants.
    pub flags: u8,
    /// Auxiliary caller id.
    pub server_fd: u16,
    /// Extension field for callers.
    pub ext_flags: u16,
    reserved: [u8; 4],
    /// Wall-clock seconds set by the sender.
    pub time: f64,
}

// Compile-time layout guard. If this fails, the record format has changed.
assert_eq_size!(DataHead, [u8; 40]);

impl DataHead {
    pub fn is_chunked(&self) -> bool {
        self.flags & FLAG_CHUNK != 0
    }

    pub fn is_begin(&self) -> bool {
        self.flags & FLAG_BEGIN != 0
    }

    pub fn is_end(&self) -> bool {
        self.flags & FLAG_END != 0
    }

    /// Set the sender timestamp to the current wall clock.
    pub fn stamp(&mut self) {
        self.time = now_seconds();
    }

    /// Render every field for diagnostics. The exact format is not a
    /// contract; all named fields appear.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "fd={} msg_id={} len={} reactor_id={} type={} flags={:#04x} \
             server_fd={} ext_flags={:#06x} time={:.6}",
            self.fd,
            self.msg_id,
            self.len,
            self.reactor_id,
            self.type_tag,
            self.flags,
            self.server_fd,
            self.ext_flags,
            self.time,
        );
        out
    }
}

/// Current wall clock as fractional seconds since the epoch.
pub fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
