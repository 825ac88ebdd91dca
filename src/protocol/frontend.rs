//! Frontend (client → server) packets.

use crate::protocol::codec::{
    MessageBuilder, write_bytes, write_cstr, write_i16, write_i32, write_padded, write_u8,
    write_u32,
};
use crate::protocol::{Oid, PROTOCOL_MAJOR, PROTOCOL_MINOR};

/// Frontend packet tag bytes. Startup and password packets are untagged.
pub mod msg_type {
    /// Query (simple query protocol)
    pub const QUERY: u8 = b'Q';
    /// Function call (with a NUL filler byte)
    pub const FUNCTION_CALL: u8 = b'F';
    /// Terminate
    pub const TERMINATE: u8 = b'X';
}

/// Total size of the v2 startup packet, including its own length field.
pub const STARTUP_PACKET_LEN: i32 = 296;

/// Write a v2 StartupPacket.
///
/// Fixed 296-byte layout: length, protocol version 2.0, then NUL-padded
/// database (64), user (32), options (64) and two unused 64-byte blocks.
pub fn write_startup(buf: &mut Vec<u8>, database: &str, user: &str, options: &str) {
    write_i32(buf, STARTUP_PACKET_LEN);
    write_i16(buf, PROTOCOL_MAJOR);
    write_i16(buf, PROTOCOL_MINOR);
    write_padded(buf, database, 64);
    write_padded(buf, user, 32);
    write_padded(buf, options, 64);
    write_padded(buf, "", 64);
    write_padded(buf, "", 64);
}

/// Write a password response packet (cleartext or MD5-hashed payload).
///
/// Untagged in protocol v2: a length prefix followed by the
/// NUL-terminated password text.
pub fn write_password(buf: &mut Vec<u8>, password: &str) {
    let mut msg = MessageBuilder::length_prefixed(buf);
    msg.write_cstr(password);
    msg.finish();
}

/// Compute the MD5 password response payload.
///
/// PostgreSQL MD5 password format: `"md5" + md5(md5(password + username) + salt)`
pub fn md5_password(username: &str, password: &str, salt: &[u8; 4]) -> String {
    use md5::{Digest, Md5};

    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(username.as_bytes());
    let first_hash_hex = format!("{:x}", hasher.finalize());

    let mut hasher = Md5::new();
    hasher.update(first_hash_hex.as_bytes());
    hasher.update(salt);
    format!("md5{:x}", hasher.finalize())
}

/// Write a Query packet: tag `Q` and the NUL-terminated SQL text.
pub fn write_query(buf: &mut Vec<u8>, query: &str) {
    write_u8(buf, msg_type::QUERY);
    write_cstr(buf, query);
}

/// One argument of a function call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuncArg {
    /// Signed 32-bit integer, sent as length 4 + i32.
    Int(i32),
    /// Unsigned 32-bit integer (OIDs and other non-negative identifiers),
    /// sent as length 4 + u32.
    Oid(Oid),
    /// Raw bytes, sent as length + payload.
    Bytes(Vec<u8>),
}

impl From<i32> for FuncArg {
    fn from(v: i32) -> Self {
        FuncArg::Int(v)
    }
}

impl From<Oid> for FuncArg {
    fn from(v: Oid) -> Self {
        FuncArg::Oid(v)
    }
}

impl From<Vec<u8>> for FuncArg {
    fn from(v: Vec<u8>) -> Self {
        FuncArg::Bytes(v)
    }
}

impl From<&[u8]> for FuncArg {
    fn from(v: &[u8]) -> Self {
        FuncArg::Bytes(v.to_vec())
    }
}

/// Write a FunctionCall packet: `F`, a NUL filler byte, the function OID,
/// the argument count, then each argument as an i32 length and its bytes.
pub fn write_function_call(buf: &mut Vec<u8>, oid: Oid, args: &[FuncArg]) {
    write_u8(buf, msg_type::FUNCTION_CALL);
    write_u8(buf, 0);
    write_u32(buf, oid);
    write_i32(buf, args.len() as i32);
    for arg in args {
        match arg {
            FuncArg::Int(n) => {
                write_i32(buf, 4);
                write_i32(buf, *n);
            }
            FuncArg::Oid(n) => {
                write_i32(buf, 4);
                write_u32(buf, *n);
            }
            FuncArg::Bytes(data) => {
                write_i32(buf, data.len() as i32);
                write_bytes(buf, data);
            }
        }
    }
}

/// Write a Terminate packet: the single byte `X`.
pub fn write_terminate(buf: &mut Vec<u8>) {
    write_u8(buf, msg_type::TERMINATE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_is_exactly_296_bytes() {
        let mut buf = Vec::new();
        write_startup(&mut buf, "mydb", "jake", "");
        assert_eq!(buf.len(), 296);
        assert_eq!(&buf[0..4], &296_i32.to_be_bytes());
        assert_eq!(&buf[4..6], &2_i16.to_be_bytes());
        assert_eq!(&buf[6..8], &0_i16.to_be_bytes());
        assert_eq!(&buf[8..12], b"mydb");
        assert_eq!(buf[12], 0);
        assert_eq!(&buf[72..76], b"jake");
    }

    #[test]
    fn password_packet_shape() {
        let mut buf = Vec::new();
        write_password(&mut buf, "secret");
        // len(pw) + 5 = 4-byte length + password + NUL
        assert_eq!(&buf[0..4], &11_i32.to_be_bytes());
        assert_eq!(&buf[4..], b"secret\0");
    }

    #[test]
    fn md5_password_shape() {
        let hashed = md5_password("postgres", "password", &[0x01, 0x02, 0x03, 0x04]);
        assert!(hashed.starts_with("md5"));
        assert_eq!(hashed.len(), 35); // "md5" + 32 hex chars
    }

    #[test]
    fn query_packet() {
        let mut buf = Vec::new();
        write_query(&mut buf, "SELECT 1");
        assert_eq!(buf, b"QSELECT 1\0");
    }

    #[test]
    fn function_call_packet() {
        let mut buf = Vec::new();
        write_function_call(&mut buf, 952, &[FuncArg::Oid(17001), FuncArg::Int(-1)]);
        assert_eq!(&buf[0..2], b"F\0");
        assert_eq!(&buf[2..6], &952_u32.to_be_bytes());
        assert_eq!(&buf[6..10], &2_i32.to_be_bytes());
        assert_eq!(&buf[10..14], &4_i32.to_be_bytes());
        assert_eq!(&buf[14..18], &17001_u32.to_be_bytes());
        assert_eq!(&buf[18..22], &4_i32.to_be_bytes());
        assert_eq!(&buf[22..26], &(-1_i32).to_be_bytes());
    }

    #[test]
    fn terminate_is_one_byte() {
        let mut buf = Vec::new();
        write_terminate(&mut buf);
        assert_eq!(buf, b"X");
    }
}
