//! Backend (server → client) packets.
//!
//! Only the fixed-layout payload tails are declared here; variable parts
//! (NUL-terminated strings, row fields) are pulled straight from the
//! connection's input buffer by the dispatch loop.

use zerocopy::byteorder::big_endian::{I16 as I16BE, I32 as I32BE, U32 as U32BE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::Oid;

/// Backend packet tag bytes.
pub mod msg_type {
    /// Startup/authentication response
    pub const AUTHENTICATION: u8 = b'R';
    /// BackendKeyData
    pub const BACKEND_KEY_DATA: u8 = b'K';
    /// ReadyForQuery
    pub const READY_FOR_QUERY: u8 = b'Z';
    /// RowDescription
    pub const ROW_DESCRIPTION: u8 = b'T';
    /// AsciiRow
    pub const ASCII_ROW: u8 = b'D';
    /// BinaryRow
    pub const BINARY_ROW: u8 = b'B';
    /// CommandComplete
    pub const COMMAND_COMPLETE: u8 = b'C';
    /// EmptyQueryResponse
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    /// ErrorResponse
    pub const ERROR_RESPONSE: u8 = b'E';
    /// NoticeResponse
    pub const NOTICE_RESPONSE: u8 = b'N';
    /// NotificationResponse
    pub const NOTIFICATION_RESPONSE: u8 = b'A';
    /// CursorResponse
    pub const CURSOR_RESPONSE: u8 = b'P';
    /// CopyInResponse
    pub const COPY_IN_RESPONSE: u8 = b'G';
    /// CopyOutResponse
    pub const COPY_OUT_RESPONSE: u8 = b'H';
    /// FunctionResponse
    pub const FUNCTION_RESPONSE: u8 = b'V';
}

/// Authentication request codes carried by an `R` packet.
pub mod auth_code {
    pub const OK: i32 = 0;
    pub const KERBEROS_V4: i32 = 1;
    pub const KERBEROS_V5: i32 = 2;
    pub const CLEARTEXT_PASSWORD: i32 = 3;
    pub const CRYPT_PASSWORD: i32 = 4;
    pub const MD5_PASSWORD: i32 = 5;
}

/// Sub-tags inside a FunctionResponse (`V`) packet.
pub mod func_response {
    /// Inline result: i32 length + payload follow.
    pub const RESULT: u8 = b'G';
    /// End of the function response.
    pub const DONE: u8 = b'0';
}

/// BackendKeyData payload - process ID and secret key for cancellation.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct BackendKeyData {
    pid: I32BE,
    secret_key: I32BE,
}

impl BackendKeyData {
    /// Parse from the 8 payload bytes.
    pub fn parse(payload: &[u8]) -> Result<&Self> {
        Self::ref_from_bytes(payload)
            .map_err(|e| Error::Interface(format!("BackendKeyData: {e:?}")))
    }

    /// Process ID of the backend.
    pub fn process_id(&self) -> i32 {
        self.pid.get()
    }

    /// Secret key for cancellation.
    pub fn secret(&self) -> i32 {
        self.secret_key.get()
    }
}

/// Fixed-size tail of a v2 field description (10 bytes, after the
/// NUL-terminated field name).
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct FieldDescriptionTail {
    type_oid: U32BE,
    type_size: I16BE,
    type_modifier: I32BE,
}

impl FieldDescriptionTail {
    /// Parse from the 10 bytes following a field name.
    pub fn parse(payload: &[u8]) -> Result<&Self> {
        Self::ref_from_bytes(payload)
            .map_err(|e| Error::Interface(format!("FieldDescription tail: {e:?}")))
    }

    /// Data type OID.
    pub fn type_oid(&self) -> Oid {
        self.type_oid.get()
    }

    /// Type size (-1 for variable length).
    pub fn type_size(&self) -> i16 {
        self.type_size.get()
    }

    /// Type modifier (type-specific).
    pub fn type_modifier(&self) -> i32 {
        self.type_modifier.get()
    }
}

/// Number of bytes in the null bitmap prefixing a row of `num_fields`.
pub fn null_bitmap_len(num_fields: usize) -> usize {
    num_fields.div_ceil(8)
}

/// Whether `field` carries data according to the MSB-first null bitmap.
///
/// A set bit means the field is present; a clear bit means SQL NULL.
pub fn bitmap_field_present(bitmap: &[u8], field: usize) -> bool {
    let byte = field / 8;
    let mask = 0x80_u8 >> (field % 8);
    bitmap.get(byte).is_some_and(|b| b & mask != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_data_round_trip() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1234_i32.to_be_bytes());
        payload.extend_from_slice(&(-99_i32).to_be_bytes());
        let key = BackendKeyData::parse(&payload).unwrap();
        assert_eq!(key.process_id(), 1234);
        assert_eq!(key.secret(), -99);
    }

    #[test]
    fn field_tail_layout() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&23_u32.to_be_bytes());
        payload.extend_from_slice(&4_i16.to_be_bytes());
        payload.extend_from_slice(&(-1_i32).to_be_bytes());
        let tail = FieldDescriptionTail::parse(&payload).unwrap();
        assert_eq!(tail.type_oid(), 23);
        assert_eq!(tail.type_size(), 4);
        assert_eq!(tail.type_modifier(), -1);
    }

    #[test]
    fn bitmap_sizing() {
        assert_eq!(null_bitmap_len(0), 0);
        assert_eq!(null_bitmap_len(1), 1);
        assert_eq!(null_bitmap_len(8), 1);
        assert_eq!(null_bitmap_len(9), 2);
        assert_eq!(null_bitmap_len(33), 5);
    }

    #[test]
    fn bitmap_is_msb_first() {
        // 0b0100_0000: field 0 null, field 1 present
        let bitmap = [0x40_u8];
        assert!(!bitmap_field_present(&bitmap, 0));
        assert!(bitmap_field_present(&bitmap, 1));
        assert!(!bitmap_field_present(&bitmap, 7));
    }

    #[test]
    fn bitmap_spans_bytes() {
        let bitmap = [0xFF_u8, 0x80];
        assert!(bitmap_field_present(&bitmap, 7));
        assert!(bitmap_field_present(&bitmap, 8));
        assert!(!bitmap_field_present(&bitmap, 9));
    }
}
