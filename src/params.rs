//! Textual parameter substitution.
//!
//! Protocol v2 has no out-of-band bind step: parameter values are encoded
//! as SQL literals and substituted into the query text before it is sent.
//! Markers are positional `%s` or named `%(name)s`; `%%` is a literal
//! percent sign. String values are quoted and escaped by the registry's
//! literal encoder, but the substitution is still plain text: any query
//! built this way carries its values in-band.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::TypeRegistry;
use crate::value::Value;

/// Query parameters.
#[derive(Debug, Clone, Default)]
pub enum Params {
    /// No substitution; the query text is sent verbatim.
    #[default]
    None,
    /// Values for `%s` markers, in order.
    Positional(Vec<Value>),
    /// Values for `%(name)s` markers.
    Named(HashMap<String, Value>),
}

impl Params {
    /// Positional parameters from anything convertible to [`Value`].
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }

    /// Named parameters from `(name, value)` pairs.
    pub fn named<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Params::Named(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<Value> for Params {
    fn from(v: Value) -> Self {
        Params::Positional(vec![v])
    }
}

/// Expand `%s` / `%(name)s` markers in `sql` using the registry's literal
/// encoder.
///
/// With [`Params::None`] the text passes through untouched, percent signs
/// included.
pub fn expand_query(sql: &str, params: &Params, registry: &TypeRegistry) -> Result<String> {
    let (mut positional, named) = match params {
        Params::None => return Ok(sql.to_string()),
        Params::Positional(values) => (Some(values.iter()), None),
        Params::Named(map) => (None, Some(map)),
    };

    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => {
                let values = positional.as_mut().ok_or_else(|| {
                    Error::Programming("positional %s marker with named parameters".into())
                })?;
                let value = values
                    .next()
                    .ok_or_else(|| Error::Programming("not enough parameters for query".into()))?;
                out.push_str(&registry.encode_literal(value));
            }
            Some('(') => {
                let map = named.ok_or_else(|| {
                    Error::Programming("named %(name)s marker with positional parameters".into())
                })?;
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some(')') => break,
                        Some(c) => name.push(c),
                        None => {
                            return Err(Error::Programming(
                                "unterminated %(name)s marker".into(),
                            ));
                        }
                    }
                }
                if chars.next() != Some('s') {
                    return Err(Error::Programming(format!(
                        "%({})... marker must end in 's'",
                        name
                    )));
                }
                let value = map.get(&name).ok_or_else(|| {
                    Error::Programming(format!("no parameter named '{}'", name))
                })?;
                out.push_str(&registry.encode_literal(value));
            }
            other => {
                return Err(Error::Programming(format!(
                    "unsupported format marker: %{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }

    if let Some(mut values) = positional
        && values.next().is_some()
    {
        return Err(Error::Programming(
            "not all parameters were consumed by the query".into(),
        ));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::with_defaults()
    }

    #[test]
    fn positional_substitution_quotes_strings() {
        let sql =
            expand_query("SELECT %s", &Params::positional(["O'Reilly"]), &registry()).unwrap();
        assert_eq!(sql, "SELECT 'O\\'Reilly'");
    }

    #[test]
    fn named_substitution() {
        let params = Params::named([("id", Value::Int(7)), ("name", Value::from("x"))]);
        let sql = expand_query(
            "UPDATE t SET name=%(name)s WHERE id=%(id)s",
            &params,
            &registry(),
        )
        .unwrap();
        assert_eq!(sql, "UPDATE t SET name='x' WHERE id=7");
    }

    #[test]
    fn double_percent_is_literal() {
        let sql = expand_query(
            "SELECT '10%%' || %s",
            &Params::positional([Value::Int(1)]),
            &registry(),
        )
        .unwrap();
        assert_eq!(sql, "SELECT '10%' || 1");
    }

    #[test]
    fn none_leaves_percents_alone() {
        let sql = expand_query("SELECT '100%'", &Params::None, &registry()).unwrap();
        assert_eq!(sql, "SELECT '100%'");
    }

    #[test]
    fn null_parameter() {
        let sql = expand_query(
            "SELECT %s",
            &Params::positional([Value::Null]),
            &registry(),
        )
        .unwrap();
        assert_eq!(sql, "SELECT NULL");
    }

    #[test]
    fn parameter_count_mismatch() {
        assert!(matches!(
            expand_query("SELECT %s, %s", &Params::positional([1_i32]), &registry()),
            Err(Error::Programming(_))
        ));
        assert!(matches!(
            expand_query("SELECT %s", &Params::positional([1_i32, 2_i32]), &registry()),
            Err(Error::Programming(_))
        ));
    }

    #[test]
    fn unknown_named_parameter() {
        assert!(matches!(
            expand_query("SELECT %(missing)s", &Params::named([("id", 1_i32)]), &registry()),
            Err(Error::Programming(_))
        ));
    }
}
