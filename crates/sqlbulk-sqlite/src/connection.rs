//! SQLite connection implementation.
//!
//! This module provides safe wrappers around SQLite's C API and implements
//! the Connection trait from sqlbulk-core.
//!
//! Parameters are bound by name: SQLite understands `@name` placeholders
//! natively, so the `@param_<column>_<index>` names generated by the bulk
//! builders are looked up directly. A command text may hold several
//! `;`-terminated statements; they are prepared and stepped one after the
//! other and their rows are concatenated.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::result_large_err)] // Error type is defined in sqlbulk-core
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers
#![allow(clippy::if_not_else)] // Clearer for error handling

use crate::ffi;
use crate::types;
use sqlbulk_core::{
    ColumnInfo, ConnectionError, ConnectionErrorKind, Connection, Cx, Error, Outcome, Parameter,
    QueryError, QueryErrorKind, Row, TransactionError, TransactionErrorKind, TransactionOps, Value,
};
use std::collections::HashMap;
use std::ffi::{CStr, CString, c_char, c_int};
use std::future::Future;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open in multi-thread mode (connections not shared between threads).
    pub no_mutex: bool,
    /// Open in serialized mode (connections can be shared).
    pub full_mutex: bool,
    /// Enable shared cache mode.
    pub shared_cache: bool,
    /// Disable shared cache mode.
    pub private_cache: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.no_mutex {
            flags |= ffi::SQLITE_OPEN_NOMUTEX;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }
        if self.shared_cache {
            flags |= ffi::SQLITE_OPEN_SHAREDCACHE;
        }
        if self.private_cache {
            flags |= ffi::SQLITE_OPEN_PRIVATECACHE;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

/// Inner state of the SQLite connection, protected by a mutex for thread safety.
struct SqliteInner {
    db: *mut ffi::sqlite3,
    in_transaction: bool,
}

// SAFETY: SQLite handles can be safely sent between threads when using
// SQLITE_OPEN_FULLMUTEX (serialized mode) or when properly synchronized.
// We use a Mutex to ensure synchronization.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
///
/// This is a thread-safe wrapper around a SQLite database handle.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

// SqliteConnection is Send + Sync because all access goes through the Mutex
unsafe impl Send for SqliteConnection {}
unsafe impl Sync for SqliteConnection {}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self, Error> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if !db.is_null() {
                // SAFETY: db is valid, errmsg returns a valid C string
                unsafe {
                    let err_ptr = ffi::sqlite3_errmsg(db);
                    let msg = CStr::from_ptr(err_ptr).to_string_lossy().into_owned();
                    ffi::sqlite3_close(db);
                    msg
                }
            } else {
                ffi::error_string(rc).to_string()
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database: {}", msg),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        tracing::debug!(path = %config.path, "Opened SQLite database");

        Ok(Self {
            inner: Mutex::new(SqliteInner {
                db,
                in_transaction: false,
            }),
            path: config.path.clone(),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, Error> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self, Error> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute SQL directly without parameters (DDL, fixtures, ...).
    pub fn execute_raw(&self, sql: &str) -> Result<(), Error> {
        let inner = self.lock();
        exec(inner.db, sql)
    }

    /// Whether a transaction is open on this connection.
    pub fn in_transaction(&self) -> bool {
        self.lock().in_transaction
    }

    /// Run every statement of `sql`, returning all rows and the number of
    /// rows changed by the writing statements.
    fn run_sync(&self, sql: &str, params: &[Parameter]) -> Result<(Vec<Row>, u64), Error> {
        let inner = self.lock();
        let c_sql = CString::new(sql).map_err(|_| null_byte(sql))?;
        let by_name: HashMap<&str, &Value> =
            params.iter().map(|p| (p.name.as_str(), &p.value)).collect();

        let mut rows = Vec::new();
        let mut changed = 0_u64;
        let mut statements = 0_usize;

        let start = c_sql.as_ptr();
        let total = c_sql.as_bytes().len();
        let mut offset = 0_usize;
        while offset < total {
            let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
            let mut tail: *const c_char = ptr::null();

            // SAFETY: start + offset stays within the NUL-terminated buffer
            let rc = unsafe {
                ffi::sqlite3_prepare_v2(
                    inner.db,
                    start.add(offset),
                    (total - offset) as c_int,
                    &mut stmt,
                    &mut tail,
                )
            };
            if rc != ffi::SQLITE_OK {
                return Err(sqlite_error(inner.db, sql));
            }

            offset = if tail.is_null() {
                total
            } else {
                // SAFETY: tail points into the same buffer, past start
                unsafe { tail.offset_from(start) as usize }
            };

            // Whitespace or a comment after the last statement.
            if stmt.is_null() {
                continue;
            }

            statements += 1;
            let result = step_statement(inner.db, stmt, sql, &by_name, params, &mut rows);
            // SAFETY: stmt is valid
            unsafe { ffi::sqlite3_finalize(stmt) };
            changed += result?;
        }

        tracing::trace!(
            statements = statements,
            rows = rows.len(),
            changed = changed,
            "SQLite command executed"
        );
        Ok((rows, changed))
    }

    fn query_sync(&self, sql: &str, params: &[Parameter]) -> Result<Vec<Row>, Error> {
        self.run_sync(sql, params).map(|(rows, _)| rows)
    }

    fn execute_sync(&self, sql: &str, params: &[Parameter]) -> Result<u64, Error> {
        self.run_sync(sql, params).map(|(_, changed)| changed)
    }

    fn begin_sync(&self) -> Result<(), Error> {
        let mut inner = self.lock();
        if inner.in_transaction {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::NestedNotSupported,
                message: "Already in a transaction".to_string(),
            }));
        }
        exec(inner.db, "BEGIN IMMEDIATE")
            .map_err(|e| transaction_error(TransactionErrorKind::Begin, &e))?;
        inner.in_transaction = true;
        tracing::trace!("BEGIN");
        Ok(())
    }

    fn commit_sync(&self) -> Result<(), Error> {
        self.finish_sync("COMMIT", TransactionErrorKind::Commit)
    }

    fn rollback_sync(&self) -> Result<(), Error> {
        self.finish_sync("ROLLBACK", TransactionErrorKind::Rollback)
    }

    fn finish_sync(&self, sql: &str, kind: TransactionErrorKind) -> Result<(), Error> {
        let mut inner = self.lock();
        if !inner.in_transaction {
            return Err(Error::Transaction(TransactionError {
                kind,
                message: "Not in a transaction".to_string(),
            }));
        }
        let result = exec(inner.db, sql);
        // A failed COMMIT leaves the transaction open; roll it back so the
        // connection stays usable.
        if result.is_err() && kind == TransactionErrorKind::Commit {
            let _ = exec(inner.db, "ROLLBACK");
        }
        inner.in_transaction = false;
        tracing::trace!("{}", sql);
        result.map_err(|e| transaction_error(kind, &e))
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.lock();
        if !inner.db.is_null() {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_close_v2(inner.db);
            }
        }
    }
}

/// A SQLite transaction.
pub struct SqliteTransaction<'conn> {
    conn: &'conn SqliteConnection,
    finished: bool,
}

impl<'conn> SqliteTransaction<'conn> {
    fn new(conn: &'conn SqliteConnection) -> Self {
        Self {
            conn,
            finished: false,
        }
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            // Auto-rollback on drop if not committed
            let _ = self.conn.rollback_sync();
        }
    }
}

impl Connection for SqliteConnection {
    type Tx<'conn>
        = SqliteTransaction<'conn>
    where
        Self: 'conn;

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Parameter],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self.query_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Parameter],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.execute_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn begin(&self, _cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        let result = self.begin_sync().map(|()| SqliteTransaction::new(self));
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn ping(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let result = self.query_sync("SELECT 1", &[]).map(|_| ());
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }
}

impl TransactionOps for SqliteTransaction<'_> {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Parameter],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self.conn.query_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Parameter],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.conn.execute_sync(sql, params);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn commit(mut self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.finished = true;
        let result = self.conn.commit_sync();
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn rollback(mut self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        self.finished = true; // Prevent double rollback in drop
        let result = self.conn.rollback_sync();
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }
}

// Helper functions

/// Bind, step and collect one prepared statement. Returns rows changed.
fn step_statement(
    db: *mut ffi::sqlite3,
    stmt: *mut ffi::sqlite3_stmt,
    sql: &str,
    by_name: &HashMap<&str, &Value>,
    params: &[Parameter],
    rows: &mut Vec<Row>,
) -> Result<u64, Error> {
    // SAFETY: stmt is valid
    let param_count = unsafe { ffi::sqlite3_bind_parameter_count(stmt) };
    for index in 1..=param_count {
        // SAFETY: stmt is valid, index is 1-based and in range
        let name = unsafe { types::parameter_name(stmt, index) };
        let value = match &name {
            Some(name) => by_name.get(name.as_str()).copied(),
            // Positional `?` placeholders take the parameters in order.
            None => params.get(index as usize - 1).map(|p| &p.value),
        };
        let Some(value) = value else {
            return Err(missing_parameter(sql, name.as_deref(), index));
        };
        // SAFETY: stmt is valid, index is 1-based and in range
        let rc = unsafe { types::bind_value(stmt, index, value) };
        if rc != ffi::SQLITE_OK {
            return Err(bind_error(db, sql, index));
        }
    }

    // SAFETY: stmt is valid
    let col_count = unsafe { ffi::sqlite3_column_count(stmt) };
    let columns = (col_count > 0).then(|| {
        let names = (0..col_count)
            // SAFETY: stmt is valid, i is in range
            .map(|i| unsafe { types::column_name(stmt, i) }.unwrap_or_else(|| format!("col{}", i)))
            .collect();
        Arc::new(ColumnInfo::new(names))
    });

    loop {
        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt) };
        match rc {
            ffi::SQLITE_ROW => {
                if let Some(columns) = &columns {
                    let values = (0..col_count)
                        // SAFETY: stmt is valid, we just got SQLITE_ROW
                        .map(|i| unsafe { types::read_column(stmt, i) })
                        .collect();
                    rows.push(Row::with_columns(Arc::clone(columns), values));
                }
            }
            ffi::SQLITE_DONE => break,
            _ => return Err(sqlite_error(db, sql)),
        }
    }

    // SAFETY: stmt is valid
    let read_only = unsafe { ffi::sqlite3_stmt_readonly(stmt) } != 0;
    if read_only {
        Ok(0)
    } else {
        // SAFETY: db is valid
        Ok(unsafe { ffi::sqlite3_changes(db) } as u64)
    }
}

fn exec(db: *mut ffi::sqlite3, sql: &str) -> Result<(), Error> {
    let c_sql = CString::new(sql).map_err(|_| null_byte(sql))?;
    let mut errmsg: *mut c_char = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };

    if rc != ffi::SQLITE_OK {
        let msg = if !errmsg.is_null() {
            // SAFETY: errmsg is valid
            let msg = unsafe { CStr::from_ptr(errmsg).to_string_lossy().into_owned() };
            // SAFETY: errmsg was allocated by sqlite3_exec
            unsafe { ffi::sqlite3_free(errmsg.cast()) };
            msg
        } else {
            ffi::error_string(rc).to_string()
        };

        return Err(Error::Query(QueryError {
            kind: error_code_to_kind(rc),
            sql: Some(sql.to_string()),
            sqlstate: Some(rc.to_string()),
            message: msg,
            source: None,
        }));
    }

    Ok(())
}

fn null_byte(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        sqlstate: None,
        message: "SQL contains null byte".to_string(),
        source: None,
    })
}

fn transaction_error(kind: TransactionErrorKind, cause: &Error) -> Error {
    Error::Transaction(TransactionError {
        kind,
        message: cause.to_string(),
    })
}

fn errmsg(db: *mut ffi::sqlite3) -> (String, c_int) {
    // SAFETY: db is valid
    unsafe {
        let ptr = ffi::sqlite3_errmsg(db);
        let msg = CStr::from_ptr(ptr).to_string_lossy().into_owned();
        (msg, ffi::sqlite3_errcode(db))
    }
}

fn sqlite_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    let (message, code) = errmsg(db);
    Error::Query(QueryError {
        kind: error_code_to_kind(code),
        sql: Some(sql.to_string()),
        sqlstate: Some(code.to_string()),
        message,
        source: None,
    })
}

fn bind_error(db: *mut ffi::sqlite3, sql: &str, param_index: c_int) -> Error {
    let (msg, _) = errmsg(db);
    Error::Query(QueryError {
        kind: QueryErrorKind::Database,
        sql: Some(sql.to_string()),
        sqlstate: None,
        message: format!("Failed to bind parameter {}: {}", param_index, msg),
        source: None,
    })
}

fn missing_parameter(sql: &str, name: Option<&str>, index: c_int) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Database,
        sql: Some(sql.to_string()),
        sqlstate: None,
        message: match name {
            Some(name) => format!("No value supplied for parameter {}", name),
            None => format!("No value supplied for parameter {}", index),
        },
        source: None,
    })
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    // Extended codes carry the primary code in the low byte.
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Deadlock,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        ffi::SQLITE_INTERRUPT => QueryErrorKind::Cancelled,
        ffi::SQLITE_ERROR => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}
