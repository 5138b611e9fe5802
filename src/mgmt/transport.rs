//! Management socket transport
//!
//! Owns the Unix stream socket. The socket starts out blocking so the welcome
//! banner can be read in one go, then switches to non-blocking for the rest
//! of the session, where the drain loop relies on `poll()` instead.

use super::MgmtError;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout};
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_BANNER_SIZE: usize = 1024;
const DEFAULT_GREETING_TIMEOUT_SECS: u64 = 5;

/// Socket I/O mode. Only ever moves from `Blocking` to `NonBlocking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketMode {
    Blocking,
    NonBlocking,
}

pub struct Connection {
    path: PathBuf,
    stream: Option<UnixStream>,
    /// The banner has been consumed
    greeted: bool,
    mode: SocketMode,
    banner_size: usize,
    greeting_timeout: Duration,
}

impl Connection {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            stream: None,
            greeted: false,
            mode: SocketMode::Blocking,
            banner_size: DEFAULT_BANNER_SIZE,
            greeting_timeout: Duration::from_secs(DEFAULT_GREETING_TIMEOUT_SECS),
        }
    }

    /// Override how the welcome banner is consumed
    pub fn with_greeting(mut self, banner_size: usize, timeout: Duration) -> Self {
        self.banner_size = banner_size.max(1);
        self.greeting_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> SocketMode {
        self.mode
    }

    /// Socket open and greeting consumed
    pub fn is_connected(&self) -> bool {
        self.greeted && self.stream.is_some()
    }

    /// Socket open, greeting not necessarily read yet
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Open the socket and throw away the greeting
    pub fn connect(&mut self) -> Result<(), MgmtError> {
        if self.is_connected() {
            debug!("Already connected to {}", self.path.display());
            return Ok(());
        }
        self.open()?;
        self.handshake()
    }

    /// Open the Unix socket, still blocking, without reading anything
    pub fn open(&mut self) -> Result<(), MgmtError> {
        if self.is_open() {
            return Ok(());
        }
        info!("Connecting to management socket {}", self.path.display());
        let stream = UnixStream::connect(&self.path).map_err(|e| self.connect_error(e))?;
        self.stream = Some(stream);
        self.greeted = false;
        Ok(())
    }

    /// Consume the greeting, then switch the socket to non-blocking
    ///
    /// OpenVPN sends a `>INFO:OpenVPN Management Interface ...` line on
    /// connect. Nothing in it is useful to us. On failure the socket is
    /// closed again.
    pub fn handshake(&mut self) -> Result<(), MgmtError> {
        if self.greeted {
            return Ok(());
        }
        match self.read_greeting() {
            Ok(()) => {
                self.greeted = true;
                self.mode = SocketMode::NonBlocking;
                Ok(())
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    fn read_greeting(&self) -> Result<(), MgmtError> {
        let stream = self.stream.as_ref().ok_or(MgmtError::NotConnected)?;

        // A zero Duration is rejected by set_read_timeout; treat it as "wait forever".
        let timeout = Some(self.greeting_timeout).filter(|t| !t.is_zero());
        stream
            .set_read_timeout(timeout)
            .map_err(|e| self.connect_error(e))?;

        let mut banner = vec![0u8; self.banner_size];
        let n = (&*stream)
            .read(&mut banner)
            .map_err(|e| self.connect_error(e))?;
        if n == 0 {
            return Err(self.connect_error(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before greeting",
            )));
        }
        debug!(
            "Discarded greeting: {}",
            String::from_utf8_lossy(&banner[..n]).trim_end()
        );

        stream
            .set_nonblocking(true)
            .map_err(|e| self.connect_error(e))
    }

    /// Shut down both directions and release the socket. Never fails.
    pub fn close(&mut self) {
        self.greeted = false;
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("Socket shutdown: {} (ignored)", e);
            }
            info!("Disconnected from {}", self.path.display());
        }
    }

    /// Write one CRLF-terminated command line
    pub fn write_line(&mut self, line: &str) -> Result<(), MgmtError> {
        let stream = self.stream.as_mut().ok_or(MgmtError::NotConnected)?;
        let mut buf = Vec::with_capacity(line.len() + 2);
        buf.extend_from_slice(line.as_bytes());
        buf.extend_from_slice(b"\r\n");
        stream.write_all(&buf)?;
        Ok(())
    }

    /// Wait up to `timeout` for the socket to become readable
    ///
    /// Returns `false` on timeout. Hangup counts as readable so the
    /// following read can observe EOF.
    pub fn wait_readable(&self, timeout: Duration) -> Result<bool, MgmtError> {
        let stream = self.stream.as_ref().ok_or(MgmtError::NotConnected)?;
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        let timeout = PollTimeout::try_from(timeout_ms).unwrap_or(PollTimeout::MAX);

        loop {
            let mut poll_fd = [PollFd::new(stream.as_fd(), PollFlags::POLLIN)];
            match nix::poll::poll(&mut poll_fd, timeout) {
                Ok(0) => return Ok(false),
                Ok(_) => {
                    let revents = poll_fd[0].revents().unwrap_or(PollFlags::empty());
                    return Ok(revents
                        .intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR));
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(MgmtError::Transmission(io::Error::from(e))),
            }
        }
    }

    /// Read whatever is available without blocking
    ///
    /// `Ok(0)` means either the peer closed the stream or nothing was
    /// actually pending; both end the current reply.
    pub fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, MgmtError> {
        let stream = self.stream.as_mut().ok_or(MgmtError::NotConnected)?;
        loop {
            match stream.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn connect_error(&self, source: io::Error) -> MgmtError {
        MgmtError::Connect {
            path: self.path.clone(),
            source,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
