//! Buffered socket I/O for the v2 wire protocol.
//!
//! Protocol v2 backend messages carry no length prefix, so the connection
//! reads the stream through an owned input buffer that serves two
//! primitives: read exactly N bytes, and read up to a delimiter byte.

use std::io::{self, Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::error::{Error, Result};

const RECV_CHUNK: usize = 4096;

/// Stream wrapper for TCP or Unix-domain connections.
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    /// Read into `buf`, retrying on interrupted system calls.
    ///
    /// Returns the number of bytes read; 0 means the peer closed the
    /// connection.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let result = match self {
                Stream::Tcp(s) => s.read(buf),
                #[cfg(unix)]
                Stream::Unix(s) => s.read(buf),
            };
            match result {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                other => return other,
            }
        }
    }

    /// Send all of `buf`. `write_all` retries interrupted system calls and
    /// loops until every byte is transmitted.
    pub fn send(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            Stream::Tcp(s) => s.write_all(buf)?,
            #[cfg(unix)]
            Stream::Unix(s) => s.write_all(buf)?,
        }
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.set_read_timeout(timeout),
            #[cfg(unix)]
            Stream::Unix(s) => s.set_read_timeout(timeout),
        }
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.set_nonblocking(nonblocking),
            #[cfg(unix)]
            Stream::Unix(s) => s.set_nonblocking(nonblocking),
        }
    }
}

/// Input buffer over a [`Stream`].
///
/// Bytes are pulled from the socket in chunks and consumed from the front.
#[derive(Default)]
pub struct ReadBuffer {
    data: Vec<u8>,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no unconsumed bytes remain.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Pull one chunk from the socket into the buffer.
    ///
    /// A receive of zero bytes is a closed connection.
    fn fill(&mut self, stream: &mut Stream) -> Result<()> {
        let mut chunk = [0u8; RECV_CHUNK];
        let n = stream.recv(&mut chunk)?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        self.data.extend_from_slice(&chunk[..n]);
        Ok(())
    }

    /// Pull one chunk, waiting at most `timeout` for the first byte.
    ///
    /// `None` blocks indefinitely; a zero duration polls once. Returns
    /// `Ok(false)` when the deadline expired with nothing received.
    pub fn fill_within(&mut self, stream: &mut Stream, timeout: Option<Duration>) -> Result<bool> {
        let Some(timeout) = timeout else {
            self.fill(stream)?;
            return Ok(true);
        };

        let mut chunk = [0u8; RECV_CHUNK];
        let received = if timeout.is_zero() {
            stream.set_nonblocking(true)?;
            let result = stream.recv(&mut chunk);
            stream.set_nonblocking(false)?;
            result
        } else {
            stream.set_read_timeout(Some(timeout))?;
            let result = stream.recv(&mut chunk);
            stream.set_read_timeout(None)?;
            result
        };

        match received {
            Ok(0) => Err(Error::ConnectionClosed),
            Ok(n) => {
                self.data.extend_from_slice(&chunk[..n]);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Read exactly `n` bytes, pulling from the socket as needed.
    pub fn read_exact(&mut self, stream: &mut Stream, n: usize) -> Result<Vec<u8>> {
        while self.data.len() < n {
            self.fill(stream)?;
        }
        let rest = self.data.split_off(n);
        Ok(std::mem::replace(&mut self.data, rest))
    }

    /// Read up to (but not including) the next `delim` byte; the delimiter
    /// itself is consumed.
    pub fn read_until(&mut self, stream: &mut Stream, delim: u8) -> Result<Vec<u8>> {
        let mut searched = 0;
        loop {
            if let Some(pos) = memchr::memchr(delim, &self.data[searched..]) {
                let pos = searched + pos;
                let rest = self.data.split_off(pos + 1);
                let mut head = std::mem::replace(&mut self.data, rest);
                head.pop();
                return Ok(head);
            }
            searched = self.data.len();
            self.fill(stream)?;
        }
    }
}
