//! Synchronous PostgreSQL connection speaking protocol v2.

use std::collections::{HashMap, VecDeque};
use std::io::{self, BufRead, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::large_object::{LargeObject, LoMode, Whence};
use crate::opts::{DEFAULT_HOST, Opts};
use crate::params::{Params, expand_query};
use crate::protocol::Oid;
use crate::protocol::backend::{
    self, BackendKeyData, FieldDescriptionTail, auth_code, func_response, msg_type,
};
use crate::protocol::codec::{read_i16, read_i32, read_u32};
use crate::protocol::frontend::{self, FuncArg};
use crate::resultset::{QueryResult, ResultSet, WireField};
use crate::stream::{ReadBuffer, Stream};
use crate::types::{self, TypeRegistry};
use crate::value::Value;

/// Asynchronous notification produced by another session's `NOTIFY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Channel name given to `NOTIFY`.
    pub channel: String,
    /// Pid of the backend that processed the `NOTIFY`.
    pub pid: i32,
}

/// A live session with a PostgreSQL backend.
///
/// A connection is single-threaded with respect to its caller: it holds no
/// internal locks, and every operation below may block on the socket.
/// Closing (or dropping) the connection sends a Terminate packet.
pub struct Conn {
    stream: Stream,
    buf: ReadBuffer,
    types: TypeRegistry,
    user: String,
    password: String,
    backend_pid: Option<i32>,
    backend_secret: Option<i32>,
    authenticated: bool,
    ready: bool,
    results: Option<Vec<ResultSet>>,
    notify_queue: VecDeque<Notification>,
    func_result: Option<Vec<u8>>,
    lo_funcs: HashMap<String, Oid>,
    copy_source: Option<Box<dyn BufRead + Send>>,
    copy_sink: Option<Box<dyn Write + Send>>,
    terminated: bool,
}

impl Conn {
    /// Connect using a DSN (`keyword=value` pairs) or a `postgres://` URL.
    pub fn new(dsn: &str) -> Result<Self> {
        Self::connect(Opts::try_from(dsn)?)
    }

    /// Connect to a PostgreSQL server.
    ///
    /// Opens the socket (Unix-domain when the host starts with `/`),
    /// completes startup and authentication, then bootstraps the
    /// connection: the client encoding is set to UNICODE and the server's
    /// `pg_type` catalog is read to bind type OIDs to decoders.
    pub fn connect(mut opts: Opts) -> Result<Self> {
        if opts.user.is_empty() {
            // Fall back to the user this process runs as.
            if let Ok(user) = std::env::var("USER").or_else(|_| std::env::var("USERNAME")) {
                opts.user = user;
            }
        }

        let host = opts.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string());
        let stream = open_socket(&host, opts.port)?;

        let mut conn = Self {
            stream,
            buf: ReadBuffer::new(),
            types: types::default_registry_snapshot(),
            user: opts.user.clone(),
            password: opts.password.clone(),
            backend_pid: None,
            backend_secret: None,
            authenticated: false,
            ready: false,
            results: None,
            notify_queue: VecDeque::new(),
            func_result: None,
            lo_funcs: HashMap::new(),
            copy_source: None,
            copy_sink: None,
            terminated: false,
        };

        let mut packet = Vec::new();
        frontend::write_startup(&mut packet, &opts.database, &opts.user, &opts.options);
        conn.stream.send(&packet)?;
        while !conn.ready {
            conn.read_packet()?;
        }
        if !conn.authenticated {
            return Err(Error::Interface(
                "server became ready without completing authentication".into(),
            ));
        }

        conn.bootstrap()?;
        Ok(conn)
    }

    /// Pid of the backend process serving this connection.
    pub fn backend_pid(&self) -> Option<i32> {
        self.backend_pid
    }

    /// Cancellation secret reported by the backend (cancellation itself is
    /// not implemented).
    pub fn backend_secret(&self) -> Option<i32> {
        self.backend_secret
    }

    /// This connection's type registry.
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Mutable access to this connection's type registry.
    ///
    /// Registrations made here affect only this connection.
    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    /// Replace the input used by COPY ... FROM STDIN (default: process
    /// stdin). Reading stops at end of input or at a `\.` line.
    pub fn set_copy_source<R: BufRead + Send + 'static>(&mut self, source: R) {
        self.copy_source = Some(Box::new(source));
    }

    /// Replace the output used by COPY ... TO STDOUT (default: process
    /// stdout).
    pub fn set_copy_sink<W: Write + Send + 'static>(&mut self, sink: W) {
        self.copy_sink = Some(Box::new(sink));
    }

    /// Execute a query (one or more statements) and return the first
    /// statement's results.
    ///
    /// A server error reported for the first statement raises
    /// [`Error::Database`]. Results of statements after the first are
    /// discarded; use [`execute_all`](Self::execute_all) to keep them.
    pub fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        self.execute_params(sql, &Params::None)
    }

    /// Like [`execute`](Self::execute), with `%s` / `%(name)s` parameter
    /// substitution.
    ///
    /// Values are encoded as SQL literals and travel inside the query
    /// text; there is no out-of-band bind in protocol v2.
    pub fn execute_params(&mut self, sql: &str, params: &Params) -> Result<QueryResult> {
        let expanded = expand_query(sql, params, &self.types)?;
        let mut sets = self.run_query(&expanded)?;
        let first = if sets.is_empty() {
            ResultSet::default()
        } else {
            sets.swap_remove(0)
        };
        if let Some(error) = first.error {
            return Err(Error::Database(error));
        }
        Ok(QueryResult::from_set(first, expanded))
    }

    /// Execute a query and return every statement's result bundle, errors
    /// included.
    pub fn execute_all(&mut self, sql: &str, params: &Params) -> Result<Vec<ResultSet>> {
        let expanded = expand_query(sql, params, &self.types)?;
        self.run_query(&expanded)
    }

    /// Get a new cursor using this connection.
    pub fn cursor(&mut self) -> crate::cursor::Cursor<'_> {
        crate::cursor::Cursor::new(self)
    }

    /// Issue a literal `COMMIT`.
    pub fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT").map(|_| ())
    }

    /// Issue a literal `ROLLBACK`.
    pub fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK").map(|_| ())
    }

    /// Low-level call to a server-side function by OID.
    ///
    /// Returns the raw response payload, or `None` for a void result.
    pub fn funcall(&mut self, oid: Oid, args: &[FuncArg]) -> Result<Option<Vec<u8>>> {
        if !self.ready {
            return Err(Error::Interface(
                "connection is not ready for a function call".into(),
            ));
        }
        tracing::debug!("funcall oid {} ({} args)", oid, args.len());

        self.ready = false;
        self.func_result = None;
        let mut packet = Vec::new();
        frontend::write_function_call(&mut packet, oid, args);
        self.stream.send(&packet)?;

        let mut failure = None;
        while !self.ready {
            match self.read_packet() {
                Ok(()) => {}
                Err(e @ Error::Database(_)) => {
                    // Keep draining to ReadyForQuery so the connection
                    // stays consumable.
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(self.func_result.take()),
        }
    }

    /// Wait for an asynchronous notification.
    ///
    /// `timeout` of `None` blocks indefinitely; a zero duration polls
    /// once. The deadline only covers the wait for the first byte of a
    /// packet: once one begins, it is read to completion. Notifications
    /// are returned in arrival order.
    pub fn wait_for_notify(&mut self, timeout: Option<Duration>) -> Result<Notification> {
        loop {
            if let Some(notification) = self.notify_queue.pop_front() {
                return Ok(notification);
            }
            if self.buf.is_empty() && !self.buf.fill_within(&mut self.stream, timeout)? {
                return Err(Error::Timeout);
            }
            self.read_packet()?;
        }
    }

    /// Close the connection, sending a Terminate packet.
    ///
    /// Dropping the connection does the same; `close` surfaces the I/O
    /// result.
    pub fn close(mut self) -> Result<()> {
        self.terminated = true;
        let mut packet = Vec::new();
        frontend::write_terminate(&mut packet);
        self.stream.send(&packet)
    }

    // === Large objects ===

    /// Create a new large object and return its OID.
    pub fn lo_create(&mut self, mode: LoMode) -> Result<Oid> {
        let response = self.lo_funcall("lo_creat", &[FuncArg::Int(mode.bits())])?;
        decode_oid_response(response.as_deref())
    }

    /// Open the large object with the given OID as a file-like handle,
    /// positioned at offset 0.
    pub fn lo_open(&mut self, oid: Oid, mode: LoMode) -> Result<LargeObject<'_>> {
        let response = self.lo_funcall("lo_open", &[FuncArg::Oid(oid), FuncArg::Int(mode.bits())])?;
        let fd = decode_i32_response(response.as_deref())?;
        let mut object = LargeObject::new(self, fd);
        object.seek(0, Whence::Set)?;
        Ok(object)
    }

    /// Delete the large object with the given OID.
    pub fn lo_unlink(&mut self, oid: Oid) -> Result<()> {
        self.lo_funcall("lo_unlink", &[FuncArg::Oid(oid)])?;
        Ok(())
    }

    /// Call a large-object support function by name, resolving its OID
    /// from `pg_proc` on first use.
    pub(crate) fn lo_funcall(&mut self, name: &str, args: &[FuncArg]) -> Result<Option<Vec<u8>>> {
        if self.lo_funcs.is_empty() {
            self.lo_init()?;
        }
        let oid = *self.lo_funcs.get(name).ok_or_else(|| {
            Error::Interface(format!("server has no function named '{}'", name))
        })?;
        self.funcall(oid, args)
    }

    // Resolve OIDs for the lo_* family. The LIKE pattern can match
    // unrelated functions; extra entries are harmless.
    fn lo_init(&mut self) -> Result<()> {
        let result = self.execute("SELECT proname, oid FROM pg_proc WHERE proname LIKE 'lo%'")?;
        for row in &result.rows {
            if let (Some(name), Some(oid)) = (
                row.first().and_then(Value::as_str),
                row.get(1).and_then(Value::as_oid),
            ) {
                self.lo_funcs.insert(name.to_string(), oid);
            }
        }
        Ok(())
    }

    // === Batch execution ===

    fn run_query(&mut self, sql: &str) -> Result<Vec<ResultSet>> {
        if !self.ready {
            return Err(Error::Interface("connection is not ready for a query".into()));
        }
        tracing::debug!("execute: {}", sql);

        self.ready = false;
        self.results = Some(vec![ResultSet::default()]);
        let mut packet = Vec::new();
        frontend::write_query(&mut packet, sql);
        self.stream.send(&packet)?;

        while !self.ready {
            self.read_packet()?;
        }

        let mut sets = self.results.take().unwrap_or_default();
        // Drop the fresh bundle opened by the last completion or error.
        sets.pop();
        Ok(sets)
    }

    fn bootstrap(&mut self) -> Result<()> {
        self.execute("SET CLIENT_ENCODING to 'UNICODE'")?;
        let result = self.execute("SELECT oid, typname FROM pg_type")?;
        for row in &result.rows {
            if let (Some(oid), Some(name)) = (
                row.first().and_then(Value::as_oid),
                row.get(1).and_then(Value::as_str),
            ) {
                self.types.register_oid(oid, name);
            }
        }
        Ok(())
    }

    // === Packet dispatch ===

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.buf.read_exact(&mut self.stream, n)
    }

    /// Read a NUL-terminated wire string, lossily decoded.
    fn read_string(&mut self) -> Result<String> {
        let bytes = self.buf.read_until(&mut self.stream, 0)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.read_bytes(4)?;
        let (value, _) = read_i32(&bytes)?;
        Ok(value)
    }

    /// Read one packet and dispatch on its tag byte.
    fn read_packet(&mut self) -> Result<()> {
        let tag = self.read_bytes(1)?[0];
        tracing::trace!("packet tag: {:?}", tag as char);
        match tag {
            msg_type::AUTHENTICATION => self.handle_authentication(),
            msg_type::BACKEND_KEY_DATA => self.handle_key_data(),
            msg_type::READY_FOR_QUERY => {
                self.ready = true;
                Ok(())
            }
            msg_type::ROW_DESCRIPTION => self.handle_row_description(),
            msg_type::ASCII_ROW => self.handle_row(true),
            msg_type::BINARY_ROW => self.handle_row(false),
            msg_type::COMMAND_COMPLETE => self.handle_command_complete(),
            msg_type::EMPTY_QUERY_RESPONSE => self.handle_empty_query(),
            msg_type::ERROR_RESPONSE => self.handle_error(),
            msg_type::NOTICE_RESPONSE => self.handle_notice(),
            msg_type::NOTIFICATION_RESPONSE => self.handle_notification(),
            msg_type::CURSOR_RESPONSE => self.handle_cursor(),
            msg_type::COPY_IN_RESPONSE => self.handle_copy_in(),
            msg_type::COPY_OUT_RESPONSE => self.handle_copy_out(),
            msg_type::FUNCTION_RESPONSE => self.handle_function_response(),
            other => Err(Error::Interface(format!(
                "Unrecognized packet type from server: {:?}",
                other as char
            ))),
        }
    }

    fn current_result(&mut self) -> Result<&mut ResultSet> {
        self.results
            .as_mut()
            .and_then(|sets| sets.last_mut())
            .ok_or_else(|| Error::Interface("result packet outside a query batch".into()))
    }

    fn new_result(&mut self) {
        if let Some(sets) = self.results.as_mut() {
            sets.push(ResultSet::default());
        }
    }

    fn handle_authentication(&mut self) -> Result<()> {
        let code = self.read_i32()?;
        match code {
            auth_code::OK => {
                self.authenticated = true;
                Ok(())
            }
            auth_code::KERBEROS_V4 => Err(Error::Interface(
                "Kerberos V4 authentication is required by the server, \
                 but not supported by this client"
                    .into(),
            )),
            auth_code::KERBEROS_V5 => Err(Error::Interface(
                "Kerberos V5 authentication is required by the server, \
                 but not supported by this client"
                    .into(),
            )),
            auth_code::CLEARTEXT_PASSWORD => {
                let mut packet = Vec::new();
                frontend::write_password(&mut packet, &self.password);
                self.stream.send(&packet)
            }
            auth_code::CRYPT_PASSWORD => {
                let _salt = self.read_bytes(2)?;
                Err(Error::Interface(
                    "crypt authentication is required by the server, \
                     but no crypt(3) support is available"
                        .into(),
                ))
            }
            auth_code::MD5_PASSWORD => {
                let salt_bytes = self.read_bytes(4)?;
                let salt: [u8; 4] = salt_bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Interface("MD5 authentication: missing salt".into()))?;
                let hashed = frontend::md5_password(&self.user, &self.password, &salt);
                let mut packet = Vec::new();
                frontend::write_password(&mut packet, &hashed);
                self.stream.send(&packet)
            }
            other => Err(Error::Interface(format!(
                "Unknown startup response code: R{} (unknown password encryption?)",
                other
            ))),
        }
    }

    fn handle_key_data(&mut self) -> Result<()> {
        let bytes = self.read_bytes(8)?;
        let key = BackendKeyData::parse(&bytes)?;
        self.backend_pid = Some(key.process_id());
        self.backend_secret = Some(key.secret());
        Ok(())
    }

    fn handle_row_description(&mut self) -> Result<()> {
        let count_bytes = self.read_bytes(2)?;
        let (num_fields, _) = read_i16(&count_bytes)?;

        let mut fields = Vec::with_capacity(num_fields as usize);
        for _ in 0..num_fields {
            let name = self.read_string()?;
            let tail_bytes = self.read_bytes(10)?;
            let tail = FieldDescriptionTail::parse(&tail_bytes)?;
            fields.push(WireField {
                name,
                type_oid: tail.type_oid(),
                type_size: tail.type_size(),
                type_modifier: tail.type_modifier(),
            });
        }

        let Self { results, types, .. } = self;
        let set = results
            .as_mut()
            .and_then(|sets| sets.last_mut())
            .ok_or_else(|| Error::Interface("row description outside a query batch".into()))?;
        set.set_description(fields, types);
        Ok(())
    }

    fn handle_row(&mut self, ascii: bool) -> Result<()> {
        let (num_fields, bitmap_len, decoders) = {
            let set = self.current_result()?;
            if set.columns.is_none() {
                return Err(Error::Interface("data row before row description".into()));
            }
            (set.num_fields(), set.null_bitmap_len, set.decoders.clone())
        };

        let bitmap = if bitmap_len > 0 {
            self.read_bytes(bitmap_len)?
        } else {
            Vec::new()
        };

        let mut row = Vec::with_capacity(num_fields);
        for field in 0..num_fields {
            if backend::bitmap_field_present(&bitmap, field) {
                let mut size = self.read_i32()?;
                if ascii {
                    // AsciiRow lengths include the 4 length bytes.
                    size -= 4;
                }
                let size = usize::try_from(size).map_err(|_| {
                    Error::Interface(format!("invalid field length: {}", size))
                })?;
                let data = self.read_bytes(size)?;
                row.push(decoders[field](&data)?);
            } else {
                row.push(Value::Null);
            }
        }

        if let Some(rows) = self.current_result()?.rows.as_mut() {
            rows.push(row);
        }
        Ok(())
    }

    fn handle_command_complete(&mut self) -> Result<()> {
        let tag = self.read_string()?;
        self.current_result()?.completed = Some(tag);
        // A multi-statement query may produce further result sets.
        self.new_result();
        Ok(())
    }

    fn handle_empty_query(&mut self) -> Result<()> {
        let text = self.read_string()?;
        tracing::debug!("empty query: {:?}", text);
        Ok(())
    }

    fn handle_error(&mut self) -> Result<()> {
        let message = self.read_string()?;
        match self.results.as_mut().and_then(|sets| sets.last_mut()) {
            Some(set) => {
                set.error = Some(message);
                self.new_result();
                Ok(())
            }
            // Outside a batch (startup, function call) there is no bundle
            // to record the error on.
            None => Err(Error::Database(message)),
        }
    }

    fn handle_notice(&mut self) -> Result<()> {
        let message = self.read_string()?;
        tracing::debug!("notice: {}", message);
        match self.results.as_mut().and_then(|sets| sets.last_mut()) {
            Some(set) => set.messages.push(message),
            None => tracing::info!("notice outside a query batch: {}", message),
        }
        Ok(())
    }

    fn handle_notification(&mut self) -> Result<()> {
        let pid = self.read_i32()?;
        let channel = self.read_string()?;
        tracing::debug!("notification on {:?} from pid {}", channel, pid);
        self.notify_queue.push_back(Notification { channel, pid });
        Ok(())
    }

    fn handle_cursor(&mut self) -> Result<()> {
        let name = self.read_string()?;
        tracing::debug!("cursor response: {:?}", name);
        Ok(())
    }

    fn handle_copy_in(&mut self) -> Result<()> {
        match self.copy_source.take() {
            Some(mut source) => {
                let result = copy_in(&mut self.stream, source.as_mut());
                self.copy_source = Some(source);
                result
            }
            None => {
                let stdin = io::stdin();
                let mut lock = stdin.lock();
                copy_in(&mut self.stream, &mut lock)
            }
        }
    }

    fn handle_copy_out(&mut self) -> Result<()> {
        match self.copy_sink.take() {
            Some(mut sink) => {
                let result = copy_out(&mut self.stream, &mut self.buf, sink.as_mut());
                self.copy_sink = Some(sink);
                result
            }
            None => {
                let stdout = io::stdout();
                let mut lock = stdout.lock();
                copy_out(&mut self.stream, &mut self.buf, &mut lock)
            }
        }
    }

    fn handle_function_response(&mut self) -> Result<()> {
        self.func_result = None;
        loop {
            let sub = self.read_bytes(1)?[0];
            match sub {
                func_response::DONE => return Ok(()),
                func_response::RESULT => {
                    let size = self.read_i32()?;
                    let size = usize::try_from(size).map_err(|_| {
                        Error::Interface(format!("invalid function result length: {}", size))
                    })?;
                    self.func_result = Some(self.read_bytes(size)?);
                }
                other => {
                    return Err(Error::Interface(format!(
                        "Unexpected byte {:?} in function call response",
                        other as char
                    )));
                }
            }
        }
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        if !self.terminated {
            let mut packet = Vec::new();
            frontend::write_terminate(&mut packet);
            let _ = self.stream.send(&packet);
        }
    }
}

/// Open the stream socket: Unix-domain when the host is a path, TCP
/// otherwise.
fn open_socket(host: &str, port: u16) -> Result<Stream> {
    if host.starts_with('/') {
        #[cfg(unix)]
        return Ok(Stream::Unix(UnixStream::connect(host)?));
        #[cfg(not(unix))]
        return Err(Error::Interface(format!(
            "Unix socket path '{}' is not supported on this platform",
            host
        )));
    }
    let tcp = TcpStream::connect((host, port))?;
    tcp.set_nodelay(true)?;
    Ok(Stream::Tcp(tcp))
}

/// Stream caller records to the server until end of input or a `\.` line.
///
/// The `\.` terminator line is always sent, even when the input already
/// ended with one; the server treats the duplicate as end of copy either
/// way.
fn copy_in(stream: &mut Stream, source: &mut dyn BufRead) -> Result<()> {
    let mut ended_with_newline = true;
    loop {
        let mut line = Vec::new();
        let n = source.read_until(b'\n', &mut line)?;
        if n == 0 || line == b"\\.\n" {
            break;
        }
        stream.send(&line)?;
        ended_with_newline = line.ends_with(b"\n");
    }
    if !ended_with_newline {
        stream.send(b"\n")?;
    }
    stream.send(b"\\.\n")
}

/// Stream newline-terminated records from the server to the caller's sink
/// until the `\.` sentinel, which is not written.
fn copy_out(stream: &mut Stream, buf: &mut ReadBuffer, sink: &mut dyn Write) -> Result<()> {
    loop {
        let line = buf.read_until(stream, b'\n')?;
        if line == b"\\." {
            break;
        }
        sink.write_all(&line)?;
        sink.write_all(b"\n")?;
    }
    sink.flush()?;
    Ok(())
}

fn decode_i32_response(payload: Option<&[u8]>) -> Result<i32> {
    let payload = payload
        .ok_or_else(|| Error::Interface("function returned no result".into()))?;
    let (value, _) = read_i32(payload)?;
    Ok(value)
}

fn decode_oid_response(payload: Option<&[u8]>) -> Result<Oid> {
    let payload = payload
        .ok_or_else(|| Error::Interface("function returned no result".into()))?;
    let (value, _) = read_u32(payload)?;
    Ok(value)
}
