//! Fetch-oriented adapter over a connection's per-query results.

use crate::conn::Conn;
use crate::error::{Error, Result};
use crate::params::Params;
use crate::resultset::FieldDescription;
use crate::value::Value;

/// How [`Cursor::scroll`] interprets its offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollMode {
    /// Offset from the current position.
    Relative,
    /// Absolute target position.
    Absolute,
}

/// A cursor over buffered query results.
///
/// Cursors from the same connection are not isolated: they share the
/// session, so changes made through one are immediately visible to the
/// others.
pub struct Cursor<'conn> {
    conn: &'conn mut Conn,
    /// Number of rows returned by `fetchmany` when no size is given.
    pub arraysize: usize,
    rows: Option<Vec<Vec<Value>>>,
    columns: Vec<FieldDescription>,
    messages: Vec<String>,
    position: usize,
    query: String,
}

impl<'conn> Cursor<'conn> {
    /// Create a cursor on a connection.
    pub fn new(conn: &'conn mut Conn) -> Self {
        Self {
            conn,
            arraysize: 1,
            rows: None,
            columns: Vec::new(),
            messages: Vec::new(),
            position: 0,
            query: String::new(),
        }
    }

    /// Execute a query, buffering its result set in the cursor.
    pub fn execute(&mut self, sql: &str, params: &Params) -> Result<()> {
        self.rows = None;
        self.columns = Vec::new();
        self.messages = Vec::new();
        self.position = 0;

        let result = self.conn.execute_params(sql, params)?;
        self.columns = result.columns;
        self.messages = result.messages;
        self.query = result.query;
        self.rows = Some(result.rows);
        Ok(())
    }

    /// Execute a query once per parameter set.
    pub fn executemany<I>(&mut self, sql: &str, param_sets: I) -> Result<()>
    where
        I: IntoIterator<Item = Params>,
    {
        for params in param_sets {
            self.execute(sql, &params)?;
        }
        Ok(())
    }

    /// Field descriptions of the current result set.
    pub fn description(&self) -> &[FieldDescription] {
        &self.columns
    }

    /// Notices collected while the current query ran.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// The SQL sent for the current result set, after parameter expansion.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Total number of rows in the current result set.
    pub fn rowcount(&self) -> Option<usize> {
        self.rows.as_ref().map(Vec::len)
    }

    /// Zero-based position of the next row to fetch.
    pub fn rownumber(&self) -> Option<usize> {
        self.rows.as_ref().map(|_| self.position)
    }

    fn require_rows(&self) -> Result<&Vec<Vec<Value>>> {
        self.rows
            .as_ref()
            .ok_or_else(|| Error::Programming("no result set available".into()))
    }

    /// Fetch the next row, or `None` when the result set is exhausted.
    pub fn fetchone(&mut self) -> Result<Option<Vec<Value>>> {
        let rows = self.require_rows()?;
        let row = rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }

    /// Fetch up to `size` rows (default [`arraysize`](Self::arraysize)).
    pub fn fetchmany(&mut self, size: Option<usize>) -> Result<Vec<Vec<Value>>> {
        let size = size.unwrap_or(self.arraysize);
        let rows = self.require_rows()?;
        let end = (self.position + size).min(rows.len());
        let batch = rows[self.position..end].to_vec();
        self.position = end;
        Ok(batch)
    }

    /// Fetch all remaining rows.
    pub fn fetchall(&mut self) -> Result<Vec<Vec<Value>>> {
        let rows = self.require_rows()?;
        let remaining = rows.len() - self.position;
        self.fetchmany(Some(remaining))
    }

    /// Move the cursor within the result set.
    ///
    /// A target outside `0..rowcount` leaves the position unchanged and
    /// fails with a [`Error::Programming`] error.
    pub fn scroll(&mut self, offset: isize, mode: ScrollMode) -> Result<()> {
        let rows = self.require_rows()?;
        let target = match mode {
            ScrollMode::Relative => self.position as isize + offset,
            ScrollMode::Absolute => offset,
        };
        if target < 0 || target as usize >= rows.len() {
            return Err(Error::Programming(format!(
                "scroll target position {} outside of range 0..{}",
                target,
                rows.len()
            )));
        }
        self.position = target as usize;
        Ok(())
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<Vec<Value>>;

    /// Iterate over the remaining rows of the current result set.
    fn next(&mut self) -> Option<Self::Item> {
        match self.fetchone() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
