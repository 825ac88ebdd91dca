//! Per-statement result assembly.

use crate::protocol::Oid;
use crate::types::{Decoder, TypeCategory, TypeRegistry};
use crate::value::Value;

/// Description of one result field, combining the wire-level row
/// description with the registry's view of its type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescription {
    /// Field name
    pub name: String,
    /// Category of the field's type (unknown OIDs decode as text)
    pub category: TypeCategory,
    /// Data type OID
    pub type_oid: Oid,
    /// Type size (-1 for variable length)
    pub type_size: i16,
    /// Type modifier (type-specific)
    pub type_modifier: i32,
}

/// Field metadata as it appears on the wire, before registry resolution.
#[derive(Debug, Clone)]
pub struct WireField {
    pub name: String,
    pub type_oid: Oid,
    pub type_size: i16,
    pub type_modifier: i32,
}

/// Result bundle for one statement of a batch.
///
/// Exactly one of `error` / `completed` is set once the statement
/// finishes; `columns` and `rows` stay `None` for statements that never
/// produce a row description.
#[derive(Debug, Default)]
pub struct ResultSet {
    /// Field descriptions, set by the row description packet.
    pub columns: Option<Vec<FieldDescription>>,
    /// Decoded rows, in server emission order.
    pub rows: Option<Vec<Vec<Value>>>,
    /// Completion tag (e.g. `SELECT`, `INSERT 0 1`).
    pub completed: Option<String>,
    /// Server error message, if the statement failed.
    pub error: Option<String>,
    /// Notice messages collected while the statement ran.
    pub messages: Vec<String>,
    pub(crate) decoders: Vec<Decoder>,
    pub(crate) null_bitmap_len: usize,
}

impl ResultSet {
    /// Number of fields declared by the row description (0 before it).
    pub fn num_fields(&self) -> usize {
        self.decoders.len()
    }

    /// Install the row description, resolving per-field decoders and the
    /// null bitmap size from the registry.
    pub(crate) fn set_description(&mut self, fields: Vec<WireField>, registry: &TypeRegistry) {
        self.null_bitmap_len = crate::protocol::backend::null_bitmap_len(fields.len());
        self.decoders = fields
            .iter()
            .map(|f| registry.decoder(f.type_oid))
            .collect();
        self.columns = Some(
            fields
                .into_iter()
                .map(|f| FieldDescription {
                    category: registry.get_type(f.type_oid).category,
                    name: f.name,
                    type_oid: f.type_oid,
                    type_size: f.type_size,
                    type_modifier: f.type_modifier,
                })
                .collect(),
        );
        self.rows = Some(Vec::new());
    }
}

/// Result of one [`execute`](crate::Conn::execute) call: the first result
/// bundle of the batch, plus the expanded SQL that was sent.
#[derive(Debug, Default)]
pub struct QueryResult {
    /// Field descriptions (empty for commands without a result set).
    pub columns: Vec<FieldDescription>,
    /// Decoded rows.
    pub rows: Vec<Vec<Value>>,
    /// Notice messages collected during the statement.
    pub messages: Vec<String>,
    /// Completion tag reported by the server.
    pub completed: Option<String>,
    /// The SQL actually sent, after parameter expansion.
    pub query: String,
}

impl QueryResult {
    pub(crate) fn from_set(set: ResultSet, query: String) -> Self {
        Self {
            columns: set.columns.unwrap_or_default(),
            rows: set.rows.unwrap_or_default(),
            messages: set.messages,
            completed: set.completed,
            query,
        }
    }
}
