//! SQLite driver for sqlbulk.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate implements the `Connection` trait from sqlbulk-core on top of
//! a statically linked libsqlite3, so the bulk engine can run against a
//! real database without a server.
//!
//! # Features
//!
//! - Named `@param` binding, matching the placeholders the bulk builders emit
//! - Multi-statement command texts (one `update` per element, sent at once)
//! - `RETURNING` rows collected across every statement of a command
//! - In-memory and file-based databases
//! - Configurable open flags and busy timeout
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlbulk_sqlite::SqliteConnection;
//! use sqlbulk_core::{Connection, Cx, Outcome, Parameter};
//!
//! let conn = SqliteConnection::open_memory().unwrap();
//! conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
//!
//! let cx = Cx::for_testing();
//! let params = [Parameter::new("@param_name_0", "Alice")];
//! match conn.query(&cx, "insert into \"users\" (\"name\") values (@param_name_0) returning \"id\";", &params).await {
//!     Outcome::Ok(rows) => println!("Inserted user with id: {:?}", rows[0].get_named::<i64>("id")),
//!     Outcome::Err(e) => eprintln!("Error: {}", e),
//!     _ => {}
//! }
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite Type |
//! |-------|-------------|
//! | `Bool` | INTEGER (0/1) |
//! | `TinyInt` .. `BigInt` | INTEGER |
//! | `Float`, `Double` | REAL |
//! | `Text`, `Decimal` | TEXT |
//! | `Bytes` | BLOB |
//! | `Null` | NULL |
//! | `Date`, `Timestamp` | TEXT (ISO-8601) |
//! | `Uuid` | BLOB (16 bytes) |
//! | `Json` | TEXT |
//!
//! # Thread Safety
//!
//! `SqliteConnection` is both `Send` and `Sync`, using internal mutex
//! synchronization to protect the underlying SQLite handle.

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection, SqliteTransaction};

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_version() {
        let version = sqlite_version();
        assert!(
            version.starts_with('3'),
            "Expected SQLite 3.x, got {}",
            version
        );
    }

    #[test]
    fn test_sqlite_supports_returning() {
        let num = sqlite_version_number();
        assert!(
            num >= 3_035_000,
            "RETURNING needs SQLite 3.35 or newer, got {}",
            num
        );
    }
}
