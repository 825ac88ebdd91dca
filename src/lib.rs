//! A synchronous PostgreSQL client speaking the legacy v2 wire protocol.
//!
//! # Features
//!
//! - **Simple queries**: one `Q` packet per batch, typed result sets
//! - **Type mapping**: per-connection registry of OID-to-decoder bindings,
//!   bootstrapped from the server's `pg_type` catalog
//! - **COPY streams**: bulk record transfer in both directions with `\.`
//!   sentinel handling
//! - **Server functions and large objects**: `fastpath` function calls and
//!   a file-like large-object handle
//! - **Notifications**: `LISTEN`/`NOTIFY` delivery with deadline support
//!
//! # Example
//!
//! ```no_run
//! use legacy_postgres::{Conn, Params};
//!
//! fn main() -> legacy_postgres::Result<()> {
//!     let mut conn = Conn::new("host=127.0.0.1 dbname=mydb user=jake")?;
//!
//!     let result = conn.execute_params(
//!         "SELECT name FROM users WHERE id = %s",
//!         &Params::positional([42_i32]),
//!     )?;
//!     for row in &result.rows {
//!         println!("{:?}", row);
//!     }
//!
//!     conn.close()?;
//!     Ok(())
//! }
//! ```
//!
//! # Caveats
//!
//! Parameter values are substituted into the SQL text (protocol v2 has no
//! out-of-band bind); the registry's literal encoder quotes and escapes
//! strings, but raw byte values pass through unquoted. The newer extended
//! query protocol, SSL, and connection pooling are out of scope.

// private
mod conn;
mod cursor;
mod error;
mod large_object;
mod opts;
mod params;
mod resultset;
mod stream;

// pub
pub mod protocol;
pub mod types;
pub mod value;

pub use conn::{Conn, Notification};
pub use cursor::{Cursor, ScrollMode};
pub use error::{Error, Result};
pub use large_object::{LargeObject, LoMode, Whence};
pub use opts::{DEFAULT_HOST, Opts};
pub use params::Params;
pub use protocol::Oid;
pub use protocol::frontend::FuncArg;
pub use resultset::{FieldDescription, QueryResult, ResultSet};
pub use types::{TypeCategory, TypeRegistry, register_literal_encoder, register_type};
pub use value::{Value, ValueKind};

/// Connect to a PostgreSQL database.
///
/// The DSN is in the format used by the libpq C library: one or more
/// `keyword=value` pairs separated by spaces, where single-quoted values
/// may contain spaces and whitespace around `=` is ignored. Recognized
/// keywords are `host`, `port`, `dbname`, `user`, `password`, and
/// `options`. A `postgres://` URL is accepted as well.
///
/// ```no_run
/// let conn = legacy_postgres::connect("host=127.0.0.1 dbname=mydb user=jake")?;
/// # Ok::<(), legacy_postgres::Error>(())
/// ```
pub fn connect(dsn: &str) -> Result<Conn> {
    Conn::new(dsn)
}
