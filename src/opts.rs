//! Connection options.

use url::Url;

use crate::error::Error;

/// Default server endpoint when no host is given.
///
/// On POSIX platforms the postmaster listens on a well-known Unix socket
/// path; on Windows only TCP is available.
#[cfg(unix)]
pub const DEFAULT_HOST: &str = "/tmp/.s.PGSQL.5432";
#[cfg(not(unix))]
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Connection options for PostgreSQL.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Hostname, IP address, or Unix socket path (a value starting with `/`
    /// is treated as a socket path).
    ///
    /// Default: `None`, resolved to [`DEFAULT_HOST`] at connect time.
    pub host: Option<String>,

    /// Port number for the PostgreSQL server. Ignored for Unix sockets.
    ///
    /// Default: `5432`
    pub port: u16,

    /// Username for authentication.
    ///
    /// Default: `""`; an empty user is resolved from the `USER` /
    /// `USERNAME` environment variables at connect time.
    pub user: String,

    /// Password for authentication.
    ///
    /// Default: `""`
    pub password: String,

    /// Database name to use.
    ///
    /// Default: `""` (the server then uses the username)
    pub database: String,

    /// Command-line options passed in the startup packet.
    ///
    /// Default: `""`
    pub options: String,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            host: None,
            port: 5432,
            user: String::new(),
            password: String::new(),
            database: String::new(),
            options: String::new(),
        }
    }
}

impl Opts {
    /// Merge a libpq-style DSN string into these options.
    ///
    /// The DSN is one or more `keyword=value` pairs separated by spaces;
    /// values may be single-quoted to include spaces, and whitespace around
    /// `=` is permitted:
    ///
    /// ```text
    /// host=127.0.0.1 dbname=mydb user=jake password='se cret'
    /// ```
    ///
    /// Recognized keywords are `host`, `port`, `dbname`, `user`,
    /// `password`, and `options`; they override the corresponding fields.
    /// Unrecognized keywords are ignored.
    pub fn apply_dsn(&mut self, dsn: &str) -> Result<(), Error> {
        for (keyword, value) in parse_dsn(dsn) {
            match keyword.as_str() {
                "host" => self.host = Some(value),
                "port" => {
                    self.port = value
                        .parse()
                        .map_err(|_| Error::Interface(format!("Invalid port: {}", value)))?;
                }
                "dbname" => self.database = value,
                "user" => self.user = value,
                "password" => self.password = value,
                "options" => self.options = value,
                other => {
                    tracing::debug!("ignoring unrecognized DSN keyword: {}", other);
                }
            }
        }
        Ok(())
    }
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a PostgreSQL connection URL.
    ///
    /// Format: `postgres://[user[:password]@]host[:port][/database]`
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        if !["postgres", "pg"].contains(&url.scheme()) {
            return Err(Error::Interface(format!(
                "Invalid scheme: expected 'postgres://' or 'pg://', got '{}://'",
                url.scheme()
            )));
        }

        let mut opts = Opts {
            host: url.host_str().map(|s| s.to_string()),
            port: url.port().unwrap_or(5432),
            user: url.username().to_string(),
            password: url.password().unwrap_or_default().to_string(),
            database: url
                .path()
                .strip_prefix('/')
                .unwrap_or_default()
                .to_string(),
            ..Opts::default()
        };

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "options" => opts.options = value.to_string(),
                other => {
                    tracing::debug!("ignoring unrecognized URL parameter: {}", other);
                }
            }
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    /// Parse either a `postgres://` URL or a libpq-style DSN string.
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        if s.starts_with("postgres://") || s.starts_with("pg://") {
            let url =
                Url::parse(s).map_err(|e| Error::Interface(format!("Invalid URL: {}", e)))?;
            Self::try_from(&url)
        } else {
            let mut opts = Opts::default();
            opts.apply_dsn(s)?;
            Ok(opts)
        }
    }
}

/// Tokenize a libpq-style DSN into `(keyword, value)` pairs.
///
/// Returns an empty vector for an empty string. Malformed trailing input
/// (a keyword with no `=`) is dropped.
fn parse_dsn(s: &str) -> Vec<(String, String)> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Keyword,
        AfterEquals,
        QuotedValue,
        BareValue,
    }

    let mut result = Vec::new();
    let mut state = State::Keyword;
    let mut keyword = String::new();
    let mut buf = String::new();

    for ch in s.trim().chars() {
        match state {
            State::Keyword => {
                if ch == '=' {
                    keyword = buf.trim().to_string();
                    buf.clear();
                    state = State::AfterEquals;
                } else {
                    buf.push(ch);
                }
            }
            State::AfterEquals => {
                if ch == '\'' {
                    state = State::QuotedValue;
                } else if ch != ' ' {
                    buf.push(ch);
                    state = State::BareValue;
                }
            }
            State::QuotedValue => {
                if ch == '\'' {
                    result.push((keyword.clone(), buf.clone()));
                    buf.clear();
                    state = State::Keyword;
                } else {
                    buf.push(ch);
                }
            }
            State::BareValue => {
                if ch == ' ' {
                    result.push((keyword.clone(), buf.clone()));
                    buf.clear();
                    state = State::Keyword;
                } else {
                    buf.push(ch);
                }
            }
        }
    }
    if state == State::BareValue {
        result.push((keyword, buf));
    }
    result
}
