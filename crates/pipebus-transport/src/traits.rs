use std::io::{self, IoSlice, IoSliceMut};
use std::os::unix::io::RawFd;

/// Contract the bus consumes from a nonblocking pipe socket.
///
/// Nonblocking mode is a precondition: implementations set it when the socket
/// is constructed or registered. Short reads and short writes are allowed;
/// callers classify errors with [`classify_read_error`] and
/// [`classify_write_error`].
pub trait BusSocket {
    /// Read without consuming from the socket buffer (`MSG_PEEK`).
    fn peek(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Consume up to `buf.len()` bytes.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Scatter-read into the given buffers.
    fn read_vectored(&self, bufs: &mut [IoSliceMut<'_>]) -> io::Result<usize>;

    /// Gather-write the given buffers.
    fn write_vectored(&self, bufs: &[IoSlice<'_>]) -> io::Result<usize>;

    /// Underlying descriptor, for diagnostics only.
    fn raw_fd(&self) -> RawFd;
}

/// How the bus should react to a failed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadControl {
    /// Nothing available on a nonblocking socket; re-arm and come back.
    Wait,
    /// Interrupted by a signal; issue the same read again.
    Retry,
    /// Unrecoverable; tear the connection down.
    Fatal,
}

/// How the bus should react to a failed pipe write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteControl {
    /// The kernel rejected the record as too large; lower the chunk size.
    ReduceSize,
    /// Interrupted by a signal; issue the same write again.
    Retry,
    /// Unrecoverable; surface to the caller.
    Fatal,
}

pub fn classify_read_error(err: &io::Error) -> ReadControl {
    match err.kind() {
        io::ErrorKind::WouldBlock => ReadControl::Wait,
        io::ErrorKind::Interrupted => ReadControl::Retry,
        _ => ReadControl::Fatal,
    }
}

pub fn classify_write_error(err: &io::Error) -> WriteControl {
    match err.raw_os_error() {
        Some(libc::ENOBUFS) | Some(libc::EMSGSIZE) => WriteControl::ReduceSize,
        _ if err.kind() == io::ErrorKind::Interrupted => WriteControl::Retry,
        _ => WriteControl::Fatal,
    }
}

/// Reactor write capability. When installed on a bus, outbound records are
/// handed to the reactor's write path instead of being written synchronously;
/// the handoff must not block and is treated as complete on return.
pub trait EventWriter: Send + Sync {
    fn writev_async(&self, sock: &dyn BusSocket, head: &[u8], body: &[u8]) -> io::Result<usize>;
}

/// Synchronous gather-write of one `[head | body]` record.
///
/// Retries interrupts, would-block, and short writes until the whole record
/// has been accepted. The first hard error is returned untouched so the
/// caller can classify it.
pub fn writev_full(sock: &dyn BusSocket, head: &[u8], body: &[u8]) -> io::Result<usize> {
    let total = head.len() + body.len();
    let mut written = 0usize;

    while written < total {
        let result = if written < head.len() {
            let bufs = [IoSlice::new(&head[written..]), IoSlice::new(body)];
            sock.write_vectored(&bufs)
        } else {
            let bufs = [IoSlice::new(&body[written - head.len()..])];
            sock.write_vectored(&bufs)
        };

        match result {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "socket accepted zero bytes",
                ))
            }
            Ok(n) => written += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
            Err(err) => return Err(err),
        }
    }

    Ok(total)
}
