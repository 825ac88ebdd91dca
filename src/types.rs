//! Mapping between PostgreSQL types and host values.
//!
//! Each connection owns a [`TypeRegistry`] cloned from a process-wide
//! default, so OID bindings discovered by one connection's bootstrap
//! never leak into another.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::protocol::Oid;
use crate::value::{Value, ValueKind};

/// Decoder from server field bytes (after null-bitmap handling) to a host
/// value.
pub type Decoder = fn(&[u8]) -> Result<Value>;

/// Encoder from a host value to an SQL literal fragment.
pub type LiteralEncoder = fn(&Value) -> String;

/// Broad category of a PostgreSQL type, exposed in result descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    String,
    Binary,
    Number,
    Rowid,
    Bool,
    Datetime,
    /// No decoder registered; fields pass through as UTF-8 text.
    Unknown,
}

/// Descriptor of one PostgreSQL type.
#[derive(Debug, Clone)]
pub struct PgType {
    /// PostgreSQL type name (`pg_type.typname`).
    pub name: String,
    /// Category tag for result descriptions.
    pub category: TypeCategory,
    /// OID bound by the bootstrap `pg_type` query, if any.
    pub oid: Option<Oid>,
    decoder: Decoder,
}

impl PgType {
    fn unknown(name: &str) -> Self {
        Self {
            name: name.to_string(),
            category: TypeCategory::Unknown,
            oid: None,
            decoder: decode_text,
        }
    }

    /// Decode field bytes with this type's decoder.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        (self.decoder)(bytes)
    }
}

/// Bidirectional mapping among type names, OIDs, field decoders, and
/// host-value literal encoders.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    by_name: HashMap<String, PgType>,
    by_oid: HashMap<Oid, PgType>,
    literal_encoders: HashMap<ValueKind, LiteralEncoder>,
}

impl TypeRegistry {
    /// An empty registry with no registrations at all.
    pub fn empty() -> Self {
        Self {
            by_name: HashMap::new(),
            by_oid: HashMap::new(),
            literal_encoders: HashMap::new(),
        }
    }

    /// A registry with the standard registrations.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register_by_name(&["char", "varchar", "text"], decode_text, TypeCategory::String);
        registry.register_by_name(&["bytea"], decode_bytea, TypeCategory::Binary);
        registry.register_by_name(&["int2", "int4"], decode_int4, TypeCategory::Number);
        registry.register_by_name(&["int8"], decode_int8, TypeCategory::Number);
        registry.register_by_name(&["float4", "float8"], decode_float8, TypeCategory::Number);
        registry.register_by_name(&["numeric"], decode_numeric, TypeCategory::Number);
        registry.register_by_name(&["oid"], decode_oid, TypeCategory::Rowid);
        registry.register_by_name(&["bool"], decode_bool, TypeCategory::Bool);
        registry.register_by_name(&["date"], decode_date, TypeCategory::Datetime);
        registry.register_literal_encoder(ValueKind::Date, date_literal);
        registry
    }

    /// Install a decoder under one or more PostgreSQL type names.
    ///
    /// If a name already carries an OID from a previous
    /// [`register_oid`](Self::register_oid), the OID index is rewritten to
    /// point at the new descriptor.
    pub fn register_by_name(&mut self, names: &[&str], decoder: Decoder, category: TypeCategory) {
        for name in names {
            let oid = self.by_name.get(*name).and_then(|t| t.oid);
            let pg_type = PgType {
                name: name.to_string(),
                category,
                oid,
                decoder,
            };
            if let Some(oid) = oid {
                self.by_oid.insert(oid, pg_type.clone());
            }
            self.by_name.insert(name.to_string(), pg_type);
        }
    }

    /// Bind an OID to the descriptor known under `name`, creating a
    /// default "unknown" descriptor if the name has none.
    pub fn register_oid(&mut self, oid: Oid, name: &str) {
        let pg_type = self
            .by_name
            .entry(name.to_string())
            .or_insert_with(|| PgType::unknown(name));
        pg_type.oid = Some(oid);
        let bound = pg_type.clone();
        self.by_oid.insert(oid, bound);
    }

    /// Install a literal encoder for host values of the given kind.
    pub fn register_literal_encoder(&mut self, kind: ValueKind, encoder: LiteralEncoder) {
        self.literal_encoders.insert(kind, encoder);
    }

    /// Descriptor for an OID; unregistered OIDs get the default
    /// "unknown" descriptor (UTF-8 text decode). Never fails.
    pub fn get_type(&self, oid: Oid) -> PgType {
        self.by_oid
            .get(&oid)
            .cloned()
            .unwrap_or_else(|| PgType::unknown("unknown"))
    }

    /// Decoder for an OID, or the default UTF-8 text decoder.
    pub fn decoder(&self, oid: Oid) -> Decoder {
        self.by_oid.get(&oid).map_or(decode_text, |t| t.decoder)
    }

    /// Render a host value as an SQL literal fragment.
    ///
    /// Registered encoders win; otherwise NULL becomes `NULL`, text is
    /// single-quoted with backslash escaping of `\` and `'`, and anything
    /// else is stringified as-is. Raw bytes pass through unquoted, which
    /// is lossy; callers embedding `bytea` must quote themselves.
    pub fn encode_literal(&self, value: &Value) -> String {
        if let Some(encoder) = self.literal_encoders.get(&value.kind()) {
            return encoder(value);
        }
        match value {
            Value::Null => "NULL".to_string(),
            Value::Text(s) => quote_string(s),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Int(n) => n.to_string(),
            Value::BigInt(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Numeric(d) => d.to_string(),
            Value::Oid(n) => n.to_string(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Value::Date(d) => format!("'{}'::date", d.format("%Y-%m-%d")),
        }
    }
}

/// Single-quote a string, escaping backslashes and embedded quotes.
fn quote_string(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

// Encoders are looked up by the value's own kind, so only Date reaches this.
fn date_literal(value: &Value) -> String {
    match value {
        Value::Date(d) => format!("'{}'::date", d.format("%Y-%m-%d")),
        _ => "NULL".to_string(),
    }
}

static DEFAULT_REGISTRY: LazyLock<Mutex<TypeRegistry>> =
    LazyLock::new(|| Mutex::new(TypeRegistry::with_defaults()));

fn default_registry() -> std::sync::MutexGuard<'static, TypeRegistry> {
    match DEFAULT_REGISTRY.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Snapshot of the process-wide default registry, taken per connection.
pub fn default_registry_snapshot() -> TypeRegistry {
    default_registry().clone()
}

/// Install a decoder in the process-wide default registry.
///
/// Only affects connections opened afterwards.
pub fn register_type(names: &[&str], decoder: Decoder, category: TypeCategory) {
    default_registry().register_by_name(names, decoder, category);
}

/// Install a literal encoder in the process-wide default registry.
///
/// Only affects connections opened afterwards.
pub fn register_literal_encoder(kind: ValueKind, encoder: LiteralEncoder) {
    default_registry().register_literal_encoder(kind, encoder);
}

// === Default decoders ===

fn utf8(bytes: &[u8]) -> Result<&str> {
    simdutf8::compat::from_utf8(bytes).map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e)))
}

fn decode_text(bytes: &[u8]) -> Result<Value> {
    Ok(Value::Text(utf8(bytes)?.to_string()))
}

fn decode_bytea(bytes: &[u8]) -> Result<Value> {
    Ok(Value::Bytes(bytes.to_vec()))
}

fn decode_int4(bytes: &[u8]) -> Result<Value> {
    let n = utf8(bytes)?
        .parse()
        .map_err(|e| Error::Decode(format!("invalid integer: {}", e)))?;
    Ok(Value::Int(n))
}

fn decode_int8(bytes: &[u8]) -> Result<Value> {
    let n = utf8(bytes)?
        .parse()
        .map_err(|e| Error::Decode(format!("invalid bigint: {}", e)))?;
    Ok(Value::BigInt(n))
}

fn decode_float8(bytes: &[u8]) -> Result<Value> {
    let f = utf8(bytes)?
        .parse()
        .map_err(|e| Error::Decode(format!("invalid float: {}", e)))?;
    Ok(Value::Float(f))
}

fn decode_numeric(bytes: &[u8]) -> Result<Value> {
    let d: Decimal = utf8(bytes)?
        .parse()
        .map_err(|e| Error::Decode(format!("invalid numeric: {}", e)))?;
    Ok(Value::Numeric(d))
}

fn decode_oid(bytes: &[u8]) -> Result<Value> {
    let n = utf8(bytes)?
        .parse()
        .map_err(|e| Error::Decode(format!("invalid oid: {}", e)))?;
    Ok(Value::Oid(n))
}

fn decode_bool(bytes: &[u8]) -> Result<Value> {
    match bytes {
        b"t" => Ok(Value::Bool(true)),
        b"f" => Ok(Value::Bool(false)),
        other => Err(Error::Decode(format!(
            "boolean came across as unknown value [{}]",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn decode_date(bytes: &[u8]) -> Result<Value> {
    let d = NaiveDate::parse_from_str(utf8(bytes)?, "%Y-%m-%d")
        .map_err(|e| Error::Decode(format!("invalid date: {}", e)))?;
    Ok(Value::Date(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_oid_gets_default_descriptor() {
        let registry = TypeRegistry::with_defaults();
        let pg_type = registry.get_type(99999);
        assert_eq!(pg_type.category, TypeCategory::Unknown);
        assert_eq!(pg_type.decode(b"abc").unwrap(), Value::Text("abc".into()));
    }

    #[test]
    fn register_oid_then_decode() {
        let mut registry = TypeRegistry::with_defaults();
        registry.register_oid(23, "int4");
        assert_eq!(registry.decoder(23)(b"42").unwrap(), Value::Int(42));
        assert_eq!(registry.get_type(23).category, TypeCategory::Number);
    }

    #[test]
    fn register_by_name_rewrites_oid_index() {
        let mut registry = TypeRegistry::empty();
        registry.register_oid(700, "float4");
        // float4 was created as "unknown"; a later name registration must
        // retarget the existing OID binding.
        registry.register_by_name(&["float4"], decode_float8, TypeCategory::Number);
        assert_eq!(registry.get_type(700).category, TypeCategory::Number);
        assert_eq!(registry.decoder(700)(b"1.5").unwrap(), Value::Float(1.5));
    }

    #[test]
    fn registry_clone_is_independent() {
        let mut base = TypeRegistry::with_defaults();
        let clone = base.clone();
        base.register_oid(16, "bool");
        assert_eq!(base.get_type(16).category, TypeCategory::Bool);
        assert_eq!(clone.get_type(16).category, TypeCategory::Unknown);
    }

    #[test]
    fn literal_null_and_string() {
        let registry = TypeRegistry::with_defaults();
        assert_eq!(registry.encode_literal(&Value::Null), "NULL");
        assert_eq!(
            registry.encode_literal(&Value::from("O'Reilly")),
            "'O\\'Reilly'"
        );
        assert_eq!(
            registry.encode_literal(&Value::from("a\\b")),
            "'a\\\\b'"
        );
    }

    #[test]
    fn literal_date() {
        let registry = TypeRegistry::with_defaults();
        let date = NaiveDate::from_ymd_opt(2008, 5, 17).unwrap();
        assert_eq!(
            registry.encode_literal(&Value::from(date)),
            "'2008-05-17'::date"
        );
    }

    #[test]
    fn literal_numbers_pass_through() {
        let registry = TypeRegistry::with_defaults();
        assert_eq!(registry.encode_literal(&Value::Int(-5)), "-5");
        assert_eq!(registry.encode_literal(&Value::Bool(true)), "TRUE");
    }

    #[test]
    fn bool_decoder_rejects_garbage() {
        assert!(matches!(decode_bool(b"x"), Err(Error::Decode(_))));
        assert_eq!(decode_bool(b"t").unwrap(), Value::Bool(true));
        assert_eq!(decode_bool(b"f").unwrap(), Value::Bool(false));
    }

    #[test]
    fn numeric_decoder_keeps_precision() {
        let value = decode_numeric(b"12345.6789").unwrap();
        assert_eq!(value, Value::Numeric("12345.6789".parse().unwrap()));
    }
}
