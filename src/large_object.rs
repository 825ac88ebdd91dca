//! File-like access to server-side large objects.
//!
//! Large objects are server-managed blobs identified by an OID and
//! manipulated through server functions (`lo_open`, `loread`, ...). The
//! functions' own OIDs are resolved from `pg_proc` on first use by the
//! owning [`Conn`](crate::Conn).

use bitflags::bitflags;

use crate::conn::Conn;
use crate::error::{Error, Result};
use crate::protocol::codec::read_i32;
use crate::protocol::frontend::FuncArg;

bitflags! {
    /// Open/create mode for a large object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LoMode: i32 {
        /// `INV_WRITE`
        const WRITE = 0x0002_0000;
        /// `INV_READ`
        const READ = 0x0004_0000;
    }
}

/// Origin for [`LargeObject::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Whence {
    /// From the start of the object.
    Set = 0,
    /// From the current position.
    Cur = 1,
    /// From the end of the object.
    End = 2,
}

/// An open large object.
///
/// Borrows the owning connection for its whole lifetime, so the
/// connection cannot be closed while a descriptor is live. Dropping the
/// handle closes the server-side descriptor on a best-effort basis;
/// [`close`](Self::close) reports the outcome.
pub struct LargeObject<'conn> {
    conn: &'conn mut Conn,
    fd: i32,
    closed: bool,
}

impl<'conn> LargeObject<'conn> {
    pub(crate) fn new(conn: &'conn mut Conn, fd: i32) -> Self {
        Self {
            conn,
            fd,
            closed: false,
        }
    }

    /// The backend-assigned descriptor number.
    pub fn fd(&self) -> i32 {
        self.fd
    }

    /// Read up to `len` bytes from the current position.
    pub fn read(&mut self, len: i32) -> Result<Vec<u8>> {
        let response = self
            .conn
            .lo_funcall("loread", &[FuncArg::Int(self.fd), FuncArg::Int(len)])?;
        Ok(response.unwrap_or_default())
    }

    /// Write `data` at the current position; returns the number of bytes
    /// the server reports written.
    pub fn write(&mut self, data: &[u8]) -> Result<i32> {
        let response = self
            .conn
            .lo_funcall("lowrite", &[FuncArg::Int(self.fd), FuncArg::from(data)])?;
        decode_i32(response.as_deref())
    }

    /// Reposition the descriptor.
    pub fn seek(&mut self, offset: i32, whence: Whence) -> Result<()> {
        self.conn.lo_funcall(
            "lo_lseek",
            &[
                FuncArg::Int(self.fd),
                FuncArg::Int(offset),
                FuncArg::Int(whence as i32),
            ],
        )?;
        Ok(())
    }

    /// Current position within the object.
    pub fn tell(&mut self) -> Result<i32> {
        let response = self.conn.lo_funcall("lo_tell", &[FuncArg::Int(self.fd)])?;
        decode_i32(response.as_deref())
    }

    /// Close the descriptor on the server.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.conn.lo_funcall("lo_close", &[FuncArg::Int(self.fd)])?;
        Ok(())
    }
}

impl Drop for LargeObject<'_> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.conn.lo_funcall("lo_close", &[FuncArg::Int(self.fd)]);
        }
    }
}

fn decode_i32(payload: Option<&[u8]>) -> Result<i32> {
    let payload =
        payload.ok_or_else(|| Error::Interface("function returned no result".into()))?;
    let (value, _) = read_i32(payload)?;
    Ok(value)
}
