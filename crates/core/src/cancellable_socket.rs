//! A TCP socket (listener or connected stream) that can be woken out of
//! a blocking wait by another thread, via a self-pipe and `select(2)`.
//!
//! `std::net::TcpListener`/`TcpStream` have no portable way to abort a
//! blocking `accept`/`recv` from another thread. The accept loop and
//! each client's request loop need exactly that, to shut down cleanly
//! when [`RtspServer::stop`](crate::server::RtspServer::stop) or a
//! per-client teardown is requested. `libc` is used narrowly here for
//! `pipe(2)`, `select(2)`, `read(2)` and `write(2)`; the rest of the
//! crate stays on `std::net`.

use std::net::{TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};

use crate::error::RtspError;

/// Wraps a raw fd-bearing socket (listener or stream) together with a
/// self-pipe that [`interrupt`](Self::interrupt) writes to, waking a
/// concurrent [`wait_readable`](Self::wait_readable) call.
pub struct CancellableSocket<S> {
    inner: S,
    read_pipe: RawFd,
    write_pipe: RawFd,
}

impl<S: AsRawFd> CancellableSocket<S> {
    fn wrap(inner: S) -> std::io::Result<Self> {
        let mut fds = [0 as RawFd; 2];
        // SAFETY: `fds` is a valid pointer to two ints, as `pipe(2)` requires.
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(Self {
            inner,
            read_pipe: fds[0],
            write_pipe: fds[1],
        })
    }

    /// Wakes any thread currently blocked in [`wait_readable`](Self::wait_readable).
    ///
    /// Safe to call from a different thread than the one waiting;
    /// idempotent enough to call multiple times (each call writes one
    /// more byte, which is simply drained on the next wakeup).
    pub fn interrupt(&self) {
        let byte = [b'x'];
        // SAFETY: `write_pipe` is a valid, open fd owned by this struct.
        unsafe {
            libc::write(self.write_pipe, byte.as_ptr() as *const libc::c_void, 1);
        }
    }

    /// Blocks until either the wrapped socket becomes readable or
    /// [`interrupt`](Self::interrupt) is called, whichever happens first.
    ///
    /// Returns `Ok(())` if the socket is readable, or
    /// `Err(RtspError::Interrupted)` if woken by `interrupt`.
    pub fn wait_readable(&self) -> Result<(), RtspError> {
        let socket_fd = self.inner.as_raw_fd();
        // SAFETY: FD_ZERO/FD_SET initialize a stack-local fd_set before use.
        unsafe {
            let mut read_fds: libc::fd_set = std::mem::zeroed();
            libc::FD_ZERO(&mut read_fds);
            libc::FD_SET(socket_fd, &mut read_fds);
            libc::FD_SET(self.read_pipe, &mut read_fds);

            let max_fd = socket_fd.max(self.read_pipe) + 1;
            let rc = libc::select(
                max_fd,
                &mut read_fds,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            );
            if rc < 0 {
                return Err(RtspError::Io(std::io::Error::last_os_error()));
            }

            if libc::FD_ISSET(self.read_pipe, &read_fds) {
                let mut buf = [0u8; 1];
                libc::read(self.read_pipe, buf.as_mut_ptr() as *mut libc::c_void, 1);
                return Err(RtspError::Interrupted);
            }

            if libc::FD_ISSET(socket_fd, &read_fds) {
                return Ok(());
            }
        }
        Err(RtspError::Interrupted)
    }

    /// The wrapped socket.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S> Drop for CancellableSocket<S> {
    fn drop(&mut self) {
        // SAFETY: both fds were opened by `pipe(2)` in `wrap` and are
        // owned exclusively by this struct.
        unsafe {
            libc::close(self.read_pipe);
            libc::close(self.write_pipe);
        }
    }
}

impl CancellableSocket<TcpListener> {
    /// Binds and listens on `addr`, wrapped for cancellable accept.
    pub fn bind(addr: std::net::SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Self::wrap(listener)
    }

    /// Waits for a pending connection, then accepts it. Returns
    /// `Err(RtspError::Interrupted)` if [`interrupt`](Self::interrupt)
    /// was called first.
    pub fn accept(&self) -> Result<(TcpStream, std::net::SocketAddr), RtspError> {
        self.wait_readable()?;
        self.inner.accept().map_err(RtspError::Io)
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.inner.local_addr()
    }
}

impl CancellableSocket<TcpStream> {
    /// Wraps an already-accepted client stream for cancellable reads.
    pub fn from_stream(stream: TcpStream) -> std::io::Result<Self> {
        Self::wrap(stream)
    }

    /// Waits for the stream to become readable, then reads into `buf`.
    /// Returns the number of bytes read (`0` means the peer closed the
    /// connection).
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, RtspError> {
        use std::io::Read;
        self.wait_readable()?;
        (&self.inner)
            .read(buf)
            .map_err(RtspError::Io)
    }

    pub fn write_all(&self, buf: &[u8]) -> Result<(), RtspError> {
        use std::io::Write;
        (&self.inner).write_all(buf).map_err(RtspError::Io)
    }

    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.inner.peer_addr()
    }

    pub fn try_clone(&self) -> std::io::Result<TcpStream> {
        self.inner.try_clone()
    }
}
