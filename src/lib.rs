//! Core dispatch, lifecycle, statement-cache, and bridge layer for a
//! Python-to-SQLite binding: thin, safe Rust plumbing around the SQLite
//! C API that a higher-level (e.g. PyO3) binding sits on top of.
//!
//! Credit to the sqlite_dispatch_core project, whose module layout and low-level
//! FFI conventions this crate is built on.

#![allow(clippy::redundant_closure_call)]

pub use libsqlite3_sys as ffi;

use std::default::Default;
use std::ffi::{CStr, CString};
use std::fmt;
use std::os::raw::{c_char, c_int};
use std::path::Path;
use std::result;

use crate::util::SmallCString;

#[macro_use]
mod error;

pub mod types;

mod raw_statement;
mod stmt_cache;
mod unlock_notify;
mod util;
mod version;

pub mod bindings;
pub mod busy;
pub mod column;
pub mod config;
pub mod connection;
pub mod context;
pub mod cursor;
pub mod dispatch;
pub mod inner_connection;
pub mod params;
pub mod pragma;
pub mod row;
pub mod statement;
pub mod transaction;

#[cfg(feature = "backup")]
pub mod backup;
#[cfg(feature = "blob")]
pub mod blob;
#[cfg(feature = "collation")]
pub mod collation;
#[cfg(feature = "functions")]
pub mod functions;
#[cfg(feature = "hooks")]
pub mod hooks;
#[cfg(feature = "limits")]
pub mod limits;
#[cfg(feature = "trace")]
pub mod trace;
#[cfg(feature = "vfs")]
pub mod vfs;
#[cfg(feature = "vtab")]
pub mod vtab;

pub use crate::bindings::{BoundValue, Bindings};
pub use crate::column::Column;
pub use crate::config::DbConfig;
pub use crate::connection::{CachedStatement, Connection};
pub use crate::cursor::{Cursor, ExecTracer, RowTracer};
pub use crate::dispatch::set_unraiseable_hook;
pub use crate::error::{Error, ErrorKind};
pub use crate::ffi::ErrorCode;
pub use crate::inner_connection::InnerConnection;
pub use crate::params::{params_from_iter, Params, ParamsFromIter};
pub use crate::row::{AndThenRows, Map, MappedRows, Row, Rows};
pub use crate::statement::Statement;
pub use crate::stmt_cache::{CacheStats, StmtCache};
pub use crate::transaction::{DropBehavior, Savepoint, Transaction, TransactionBehavior, TransactionState};
pub use crate::types::ToSql;
pub use crate::version::{version, version_number};

#[cfg(feature = "functions")]
pub use crate::functions::{Context, FunctionFlags};
#[cfg(feature = "hooks")]
pub use crate::hooks::Action;

/// A typedef of the result returned by many methods.
pub type Result<T, E = Error> = result::Result<T, E>;

unsafe fn errmsg_to_string(errmsg: *const c_char) -> String {
    CStr::from_ptr(errmsg).to_string_lossy().into_owned()
}

fn str_to_cstring(s: &str) -> Result<SmallCString> {
    Ok(SmallCString::new(s)?)
}

/// Converts the given `s` into a C-compatible string, and returns the
/// pointer, length, and destructor type that should be passed to a
/// `sqlite3_bind_text`/`sqlite3_result_text`-family call. SQLite interprets
/// a zero-length pointer as `NULL`, so an empty slice is passed as a static
/// `""` rather than a null `s.as_ptr()`.
fn str_for_sqlite(s: &[u8]) -> Result<(*const c_char, c_int, ffi::sqlite3_destructor_type)> {
    let len = len_as_c_int(s.len())?;
    let (ptr, dtor_info) = if len != 0 {
        (s.as_ptr().cast::<c_char>(), ffi::SQLITE_TRANSIENT())
    } else {
        (b"".as_ptr().cast::<c_char>(), ffi::SQLITE_STATIC())
    };
    Ok((ptr, len, dtor_info))
}

/// `usize` lengths are fine in Rust but SQLite's `c_int` is only 32 bits:
/// reject anything that would truncate instead of silently wrapping.
fn len_as_c_int(len: usize) -> Result<c_int> {
    if len >= (c_int::MAX as usize) {
        Err(Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_TOOBIG),
            None,
        ))
    } else {
        Ok(len as c_int)
    }
}

#[cfg(unix)]
fn path_to_cstring(p: &Path) -> Result<CString> {
    use std::os::unix::ffi::OsStrExt;
    Ok(CString::new(p.as_os_str().as_bytes())?)
}

#[cfg(not(unix))]
fn path_to_cstring(p: &Path) -> Result<CString> {
    let s = p.to_str().ok_or_else(|| Error::InvalidPath(p.to_owned()))?;
    Ok(CString::new(s)?)
}

/// Name for a database within a connection, e.g. for `ATTACH`ed databases or
/// for specifying the ON CONFLICT resolution database for a pragma.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DatabaseName<'a> {
    /// The main database.
    Main,
    /// The temporary database (e.g., any "CREATE TEMPORARY TABLE" tables).
    Temp,
    /// A database that has been attached via "ATTACH DATABASE ...".
    Attached(&'a str),
}

/// Shorthand for [`DatabaseName::Main`].
pub const MAIN_DB: DatabaseName<'static> = DatabaseName::Main;

/// Shorthand for [`DatabaseName::Temp`].
pub const TEMP_DB: DatabaseName<'static> = DatabaseName::Temp;

impl DatabaseName<'_> {
    fn as_cstring(&self) -> Result<SmallCString> {
        use self::DatabaseName::{Attached, Main, Temp};
        match *self {
            Main => str_to_cstring("main"),
            Temp => str_to_cstring("temp"),
            Attached(s) => str_to_cstring(s),
        }
    }
}

impl fmt::Display for DatabaseName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseName::Main => f.write_str("main"),
            DatabaseName::Temp => f.write_str("temp"),
            DatabaseName::Attached(s) => f.write_str(s),
        }
    }
}

bitflags::bitflags! {
    /// Flags for opening SQLite database connections. See
    /// [`sqlite3_open_v2`](https://www.sqlite.org/c3ref/open.html) for details.
    #[repr(C)]
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct OpenFlags: ::std::os::raw::c_int {
        /// The database is opened in read-only mode, if the file exists.
        const SQLITE_OPEN_READ_ONLY = ffi::SQLITE_OPEN_READONLY;
        /// The database is opened for reading and writing if possible.
        const SQLITE_OPEN_READ_WRITE = ffi::SQLITE_OPEN_READWRITE;
        /// The database is created if it does not already exist.
        const SQLITE_OPEN_CREATE = ffi::SQLITE_OPEN_CREATE;
        /// The filename can be interpreted as a URI.
        const SQLITE_OPEN_URI = ffi::SQLITE_OPEN_URI;
        /// The database is opened as an in-memory database.
        const SQLITE_OPEN_MEMORY = ffi::SQLITE_OPEN_MEMORY;
        /// The new database connection does not use a mutex (unsafe unless
        /// the caller ensures single-threaded access).
        const SQLITE_OPEN_NO_MUTEX = ffi::SQLITE_OPEN_NOMUTEX;
        /// The new database connection uses a full mutex.
        const SQLITE_OPEN_FULL_MUTEX = ffi::SQLITE_OPEN_FULLMUTEX;
        /// The database is opened with shared cache enabled.
        const SQLITE_OPEN_SHARED_CACHE = ffi::SQLITE_OPEN_SHAREDCACHE;
        /// The database is opened with shared cache disabled.
        const SQLITE_OPEN_PRIVATE_CACHE = ffi::SQLITE_OPEN_PRIVATECACHE;
        /// The database filename is not allowed to be a symbolic link. 3.31.0
        const SQLITE_OPEN_NOFOLLOW = ffi::SQLITE_OPEN_NOFOLLOW;
        /// Extended result codes are enabled on the connection by default. 3.37.0
        const SQLITE_OPEN_EXRESCODE = ffi::SQLITE_OPEN_EXRESCODE;
        /// Reserved for use by the VFS layer.
        const SQLITE_OPEN_DELETE_ON_CLOSE = ffi::SQLITE_OPEN_DELETEONCLOSE;
        /// Reserved for use by the VFS layer.
        const SQLITE_OPEN_EXCLUSIVE = ffi::SQLITE_OPEN_EXCLUSIVE;
    }
}

impl Default for OpenFlags {
    fn default() -> OpenFlags {
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI
    }
}

/// Allows interrupting a long-running computation from another thread,
/// including from a signal handler. See [`Connection::get_interrupt_handle`].
pub struct InterruptHandle {
    pub(crate) db_lock: std::sync::Arc<std::sync::Mutex<*mut ffi::sqlite3>>,
}

unsafe impl Send for InterruptHandle {}
unsafe impl Sync for InterruptHandle {}

impl InterruptHandle {
    pub(crate) fn new(db_lock: std::sync::Arc<std::sync::Mutex<*mut ffi::sqlite3>>) -> Self {
        InterruptHandle { db_lock }
    }

    /// Interrupts the query currently executing on the connection this
    /// handle was obtained from. A no-op if no query is currently running.
    ///
    /// If the connection has since been closed, this does nothing.
    pub fn interrupt(&self) {
        let db_handle = self.db_lock.lock().unwrap();
        if !db_handle.is_null() {
            unsafe { ffi::sqlite3_interrupt(*db_handle) }
        }
    }
}

/// Deprecated alias for an empty parameter list. Prefer `()` or
/// `sqlite_dispatch_core::params![]`.
#[deprecated = "Use an empty &[] slice instead, which now implements Params"]
pub const NO_PARAMS: &[&dyn ToSql] = &[];

/// A trait for converting raw SQLite statement results into Rust values,
/// for call sites that want to bail out of an `Option`-shaped query with a
/// plain `QueryReturnedNoRows` turned into `None`.
pub trait OptionalExtension<T> {
    /// Converts a `Result<T>` into a `Result<Option<T>>`, mapping
    /// `Error::QueryReturnedNoRows` to `Ok(None)`.
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExtension<T> for Result<T> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Array of values to be bound as positional parameters, accepting
/// arbitrary-length argument lists without the arity-indexed tuple
/// impls `Params` provides for small counts.
///
/// ```rust,no_run
/// # use sqlite_dispatch_core::{Connection, Result, params_from_iter};
/// fn thing(conn: &Connection, ids: &[i32]) -> Result<()> {
///     conn.execute("DELETE FROM thing WHERE id IN rarray(?)", params_from_iter(ids))?;
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! params {
    () => {
        &[] as &[&dyn $crate::types::ToSql]
    };
    ($($param:expr),+ $(,)?) => {
        &[$(&$param as &dyn $crate::types::ToSql),+] as &[&dyn $crate::types::ToSql]
    };
}

/// Constructs a `&[(&str, &dyn ToSql)]` from named-parameter `name: value`
/// pairs, for use with [`Connection::execute`] and friends.
#[macro_export]
macro_rules! named_params {
    () => {
        &[] as &[(&str, &dyn $crate::types::ToSql)]
    };
    ($($param_name:literal: $param_val:expr),+ $(,)?) => {
        &[$(($param_name, &$param_val as &dyn $crate::types::ToSql)),+] as &[(&str, &dyn $crate::types::ToSql)]
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn open_flags_default_matches_sqlite_default() {
        let flags = OpenFlags::default();
        assert!(flags.contains(OpenFlags::SQLITE_OPEN_READ_WRITE));
        assert!(flags.contains(OpenFlags::SQLITE_OPEN_CREATE));
    }

    #[test]
    fn database_name_display() {
        assert_eq!(MAIN_DB.to_string(), "main");
        assert_eq!(TEMP_DB.to_string(), "temp");
        assert_eq!(DatabaseName::Attached("aux").to_string(), "aux");
    }

    #[test]
    fn optional_extension_maps_no_rows_to_none() {
        let db = Connection::open_in_memory().unwrap();
        let result: Result<i64> = db.query_row("SELECT 1 WHERE 0", [], |r| r.get(0));
        assert_eq!(result.optional().unwrap(), None);
    }
}
