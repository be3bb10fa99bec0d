use std::io::{self, IoSlice, IoSliceMut, Read, Write};
use std::mem::ManuallyDrop;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::net::{UnixDatagram, UnixStream};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::BusSocket;

/// Stream-oriented pipe socket facade.
///
/// Wraps one end of a connected `UnixStream` in nonblocking mode. The wrapper
/// either owns the descriptor (closing it on drop) or borrows it from the
/// caller, in which case drop leaves the descriptor open; this is how the
/// bus registry wraps worker pipe fds it does not own.
pub struct PipeSocket {
    stream: ManuallyDrop<UnixStream>,
    owned: bool,
    buffer_limit: usize,
}

impl PipeSocket {
    /// Take ownership of a stream and switch it to nonblocking mode.
    pub fn from_stream(stream: UnixStream) -> Result<Self> {
        let sock = Self {
            stream: ManuallyDrop::new(stream),
            owned: true,
            buffer_limit: usize::MAX,
        };
        sock.set_nonblocking()?;
        Ok(sock)
    }

    /// Wrap a descriptor owned by someone else and switch it to nonblocking
    /// mode. Dropping the wrapper does not close the descriptor.
    ///
    /// # Safety
    ///
    /// `fd` must be an open Unix stream socket that stays open for the
    /// lifetime of the returned wrapper.
    pub unsafe fn from_borrowed_fd(fd: RawFd) -> Result<Self> {
        let sock = Self {
            stream: ManuallyDrop::new(UnixStream::from_raw_fd(fd)),
            owned: false,
            buffer_limit: usize::MAX,
        };
        sock.set_nonblocking()?;
        Ok(sock)
    }

    fn set_nonblocking(&self) -> Result<()> {
        self.stream
            .set_nonblocking(true)
            .map_err(|source| TransportError::Nonblocking {
                fd: self.stream.as_raw_fd(),
                source,
            })
    }

    /// Soft cap on buffered outbound bytes, for callers that meter their own
    /// write queues. The facade itself does not enforce it.
    pub fn buffer_limit(&self) -> usize {
        self.buffer_limit
    }

    pub fn set_buffer_limit(&mut self, limit: usize) {
        self.buffer_limit = limit;
    }
}

impl BusSocket for PipeSocket {
    fn peek(&self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: `buf` is a valid, writable byte buffer for the duration of
        // the call, and the descriptor is open for the lifetime of `self`.
        let n = unsafe {
            libc::recv(
                self.stream.as_raw_fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
                libc::MSG_PEEK,
            )
        };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&*self.stream).read(buf)
    }

    fn read_vectored(&self, bufs: &mut [IoSliceMut<'_>]) -> io::Result<usize> {
        (&*self.stream).read_vectored(bufs)
    }

    fn write_vectored(&self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        (&*self.stream).write_vectored(bufs)
    }

    fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

impl Drop for PipeSocket {
    fn drop(&mut self) {
        if self.owned {
            // SAFETY: the stream was constructed exactly once and is dropped
            // exactly once, only on the owning path.
            unsafe { ManuallyDrop::drop(&mut self.stream) }
        }
    }
}

impl std::fmt::Debug for PipeSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeSocket")
            .field("fd", &self.raw_fd())
            .field("owned", &self.owned)
            .finish()
    }
}

/// Datagram pipe socket facade.
///
/// Each read consumes one whole datagram, which is either a complete message
/// or one chunk; record boundaries come from the kernel.
pub struct DgramSocket {
    socket: UnixDatagram,
}

impl DgramSocket {
    /// Take ownership of a datagram socket and switch it to nonblocking mode.
    pub fn from_datagram(socket: UnixDatagram) -> Result<Self> {
        socket
            .set_nonblocking(true)
            .map_err(|source| TransportError::Nonblocking {
                fd: socket.as_raw_fd(),
                source,
            })?;
        Ok(Self { socket })
    }
}

impl BusSocket for DgramSocket {
    fn peek(&self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: `buf` is a valid, writable byte buffer for the duration of
        // the call, and the descriptor is open for the lifetime of `self`.
        let n = unsafe {
            libc::recv(
                self.socket.as_raw_fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
                libc::MSG_PEEK,
            )
        };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf)
    }

    fn read_vectored(&self, bufs: &mut [IoSliceMut<'_>]) -> io::Result<usize> {
        // SAFETY: `IoSliceMut` is ABI-compatible with `iovec` on Unix and the
        // descriptor is open for the lifetime of `self`.
        let n = unsafe {
            libc::readv(
                self.socket.as_raw_fd(),
                bufs.as_mut_ptr().cast::<libc::iovec>(),
                bufs.len() as libc::c_int,
            )
        };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn write_vectored(&self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        // SAFETY: `IoSlice` is ABI-compatible with `iovec` on Unix and the
        // descriptor is open for the lifetime of `self`.
        let n = unsafe {
            libc::writev(
                self.socket.as_raw_fd(),
                bufs.as_ptr().cast::<libc::iovec>(),
                bufs.len() as libc::c_int,
            )
        };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

impl std::fmt::Debug for DgramSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DgramSocket")
            .field("fd", &self.raw_fd())
            .finish()
    }
}

/// Connected nonblocking stream pair, for tests and loopback pumps.
pub fn stream_pair() -> Result<(PipeSocket, PipeSocket)> {
    let (a, b) = UnixStream::pair().map_err(TransportError::Pair)?;
    debug!(fd_a = a.as_raw_fd(), fd_b = b.as_raw_fd(), "created stream pipe pair");
    Ok((PipeSocket::from_stream(a)?, PipeSocket::from_stream(b)?))
}

/// Connected nonblocking datagram pair.
pub fn dgram_pair() -> Result<(DgramSocket, DgramSocket)> {
    let (a, b) = UnixDatagram::pair().map_err(TransportError::Pair)?;
    debug!(fd_a = a.as_raw_fd(), fd_b = b.as_raw_fd(), "created dgram pipe pair");
    Ok((DgramSocket::from_datagram(a)?, DgramSocket::from_datagram(b)?))
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn stream_pair_round_trip() {
        let (tx, rx) = stream_pair().unwrap();

        let bufs = [IoSlice::new(b"he"), IoSlice::new(b"llo")];
        let written = tx.write_vectored(&bufs).unwrap();
        assert_eq!(written, 5);

        let mut buf = [0u8; 8];
        let n = rx.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn peek_does_not_consume() {
        let (tx, rx) = stream_pair().unwrap();
        tx.write_vectored(&[IoSlice::new(b"abc")]).unwrap();

        let mut peeked = [0u8; 3];
        assert_eq!(rx.peek(&mut peeked).unwrap(), 3);
        assert_eq!(&peeked, b"abc");

        let mut read = [0u8; 3];
        assert_eq!(rx.read(&mut read).unwrap(), 3);
        assert_eq!(&read, b"abc");
    }

    #[test]
    fn empty_nonblocking_read_would_block() {
        let (_tx, rx) = stream_pair().unwrap();
        let mut buf = [0u8; 4];
        let err = rx.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn scatter_read_splits_across_buffers() {
        let (tx, rx) = stream_pair().unwrap();
        tx.write_vectored(&[IoSlice::new(b"headbody")]).unwrap();

        let mut head = [0u8; 4];
        let mut body = [0u8; 4];
        let mut bufs = [IoSliceMut::new(&mut head), IoSliceMut::new(&mut body)];
        assert_eq!(rx.read_vectored(&mut bufs).unwrap(), 8);
        assert_eq!(&head, b"head");
        assert_eq!(&body, b"body");
    }

    #[test]
    fn dgram_preserves_record_boundaries() {
        let (tx, rx) = dgram_pair().unwrap();
        tx.write_vectored(&[IoSlice::new(b"first")]).unwrap();
        tx.write_vectored(&[IoSlice::new(b"second")]).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(rx.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"first");
        assert_eq!(rx.read(&mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"second");
    }

    #[test]
    fn borrowed_fd_is_not_closed_on_drop() {
        let (mut raw_tx, raw_rx) = UnixStream::pair().unwrap();

        // SAFETY: raw_rx outlives the wrapper below.
        let wrapper = unsafe { PipeSocket::from_borrowed_fd(raw_rx.as_raw_fd()) }.unwrap();
        drop(wrapper);

        // The original socket must still be usable after the wrapper is gone.
        raw_tx.write_all(b"still-open").unwrap();
        let wrapped = PipeSocket::from_stream(raw_rx).unwrap();
        let mut buf = [0u8; 16];
        let n = wrapped.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"still-open");
    }

    #[test]
    fn buffer_limit_defaults_unbounded() {
        let (tx, _rx) = stream_pair().unwrap();
        assert_eq!(tx.buffer_limit(), usize::MAX);
    }
}
