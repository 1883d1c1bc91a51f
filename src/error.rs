use crate::types::FromSqlError;
use crate::types::Type;
use crate::{errmsg_to_string, ffi};
use std::error;
use std::fmt;
use std::os::raw::c_int;
use std::path::PathBuf;
use std::str;

/// Enum listing possible errors from this crate.
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
#[non_exhaustive]
pub enum Error {
    /// An error from an underlying SQLite call.
    SqliteFailure(ffi::Error, Option<String>),

    /// Error reported when attempting to open a connection when SQLite was
    /// configured to allow single-threaded use only.
    SqliteSingleThreadedMode,

    /// Error when the value of a particular column is requested, but it cannot
    /// be converted to the requested Rust type.
    FromSqlConversionFailure(usize, Type, Box<dyn error::Error + Send + Sync + 'static>),

    /// Error when SQLite gives us an integral value outside the range of the
    /// requested type (e.g., trying to get the value 1000 into a `u8`).
    /// The associated `usize` is the column index,
    /// and the associated `i64` is the value returned by SQLite.
    IntegralValueOutOfRange(usize, i64),

    /// Error converting a string to UTF-8.
    Utf8Error(str::Utf8Error),

    /// Error converting a string to a C-compatible string because it contained
    /// an embedded nul.
    NulError(::std::ffi::NulError),

    /// Error when using SQL named parameters and passing a parameter name not
    /// present in the SQL.
    InvalidParameterName(String),

    /// Error converting a file path to a string.
    InvalidPath(PathBuf),

    /// Error returned when an `execute` call returns rows.
    ExecuteReturnedResults,

    /// Error when a query that was expected to return at least one row (e.g.,
    /// for `query_row`) did not return any.
    QueryReturnedNoRows,

    /// Error when the value of a particular column is requested, but the index
    /// is out of range for the statement.
    InvalidColumnIndex(usize),

    /// Error when the value of a named column is requested, but no column
    /// matches the name for the statement.
    InvalidColumnName(String),

    /// Error when the value of a particular column is requested, but the type
    /// of the result in that column cannot be converted to the requested
    /// Rust type.
    InvalidColumnType(usize, String, Type),

    /// Error when a query that was expected to insert one row did not insert
    /// any or insert many.
    StatementChangedRows(usize),

    /// Error returned by `functions::Context::get` when the function argument
    /// cannot be converted to the requested type.
    #[cfg(feature = "functions")]
    InvalidFunctionParameterType(usize, Type),
    /// Error returned by `vtab::Values::get` when the filter argument cannot
    /// be converted to the requested type.
    #[cfg(feature = "vtab")]
    InvalidFilterParameterType(usize, Type),

    /// An error case available for implementors of custom user functions (e.g.,
    /// `create_scalar_function`).
    #[cfg(feature = "functions")]
    #[allow(dead_code)]
    UserFunctionError(Box<dyn error::Error + Send + Sync + 'static>),

    /// Error available for the implementors of the `ToSql` trait.
    ToSqlConversionFailure(Box<dyn error::Error + Send + Sync + 'static>),

    /// Error when the SQL is not a `SELECT`, is not read-only.
    InvalidQuery,

    /// An error case available for implementors of custom modules (e.g.,
    /// `create_module`).
    #[cfg(feature = "vtab")]
    #[allow(dead_code)]
    ModuleError(String),

    #[cfg(feature = "functions")]
    UnwindingPanic,

    /// An error returned when `Context::get_aux` attempts to retrieve data
    /// of a different type than what had been stored using `Context::set_aux`.
    #[cfg(feature = "functions")]
    GetAuxWrongType,

    /// Error when the SQL contains multiple statements.
    MultipleStatement,
    /// Error when the number of bound parameters does not match the number of
    /// parameters in the query. The first `usize` is how many parameters were
    /// given, the 2nd is how many were expected.
    InvalidParameterCount(usize, usize),

    /// A bindings value did not carry exactly as many elements as the
    /// statement had positional parameters, or a mapping/sequence mismatch
    /// was detected while resolving [`Bindings`](crate::bindings::Bindings).
    BindingsError(String),

    /// A Cursor still has unread rows, or a multi-statement SQL's next
    /// sub-statement was requested before the previous one finished
    /// stepping.
    IncompleteExecutionError,

    /// An execution tracer returned `false`, vetoing the statement.
    ExecTraceAbort,

    /// The statement's description (column metadata) was requested after
    /// the cursor had already been fully drained and reset.
    ExecutionCompleteError,

    /// Any operation attempted on a `Connection` after `close()`.
    ConnectionClosedError,

    /// Any operation attempted on a `Cursor` after `close()`.
    CursorClosedError,

    /// Any operation attempted on a VFS file after `xClose`.
    VFSFileClosedError,

    /// A second thread attempted to use a `Connection` while an operation
    /// from another thread was already in flight on it.
    ThreadingViolationError,

    /// A `Connection` (or a dependent of one) created before a `fork()` was
    /// used for the first time in the child process.
    ForkingViolationError,

    /// Failure while resolving a symbol/library through the
    /// xDlOpen/xDlSym chain of a custom VFS.
    ExtensionLoadingError(String),

    /// A base VFS call was forwarded through a `delegate` but the inherited
    /// VFS does not implement that method.
    VFSNotImplementedError(&'static str),
}

/// Coarse-grained error category, independent of the exact
/// [`Error`](crate::Error) variant, used by
/// [`exception_for`](crate::exception_for) and by callback dispatch when
/// mapping a captured host error back onto a SQLite result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// One of SQLite's own primary result codes (Busy, Locked, Constraint,
    /// ...).
    Database,
    /// TypeError / ValueError / OverflowError-shaped usage mistake.
    Usage,
    /// Bindings arity or shape mismatch.
    Binding,
    /// Cursor/statement draining rule violated.
    Execution,
    /// Use of a Connection/Cursor/VFS file after close.
    Lifecycle,
    /// Cross-thread or cross-fork misuse.
    Concurrency,
    /// Extension loading failure.
    Extension,
    /// Called-but-unimplemented base VFS method.
    VfsNotImplemented,
}

impl Error {
    /// Returns the coarse [`ErrorKind`] category for this error.
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::SqliteFailure(..) => ErrorKind::Database,
            Error::SqliteSingleThreadedMode => ErrorKind::Concurrency,
            Error::BindingsError(_) | Error::InvalidParameterCount(..) => ErrorKind::Binding,
            Error::IncompleteExecutionError
            | Error::ExecTraceAbort
            | Error::ExecutionCompleteError => ErrorKind::Execution,
            Error::ConnectionClosedError
            | Error::CursorClosedError
            | Error::VFSFileClosedError => ErrorKind::Lifecycle,
            Error::ThreadingViolationError | Error::ForkingViolationError => {
                ErrorKind::Concurrency
            }
            Error::ExtensionLoadingError(_) => ErrorKind::Extension,
            Error::VFSNotImplementedError(_) => ErrorKind::VfsNotImplemented,
            _ => ErrorKind::Usage,
        }
    }
}

/// Maps a raw SQLite primary result code to the [`ErrorKind`] category an
/// equivalent `Error::SqliteFailure` would report. Every primary SQLite
/// result code surfaces as [`ErrorKind::Database`]; the finer-grained
/// categories (`Usage`, `Binding`, ...) only ever arise from this crate's
/// own validation, never directly from a raw code.
pub fn exception_for(_code: c_int) -> ErrorKind {
    ErrorKind::Database
}

impl PartialEq for Error {
    fn eq(&self, other: &Error) -> bool {
        match (self, other) {
            (Error::SqliteFailure(e1, s1), Error::SqliteFailure(e2, s2)) => e1 == e2 && s1 == s2,
            (Error::SqliteSingleThreadedMode, Error::SqliteSingleThreadedMode) => true,
            (Error::IntegralValueOutOfRange(i1, n1), Error::IntegralValueOutOfRange(i2, n2)) => {
                i1 == i2 && n1 == n2
            }
            (Error::Utf8Error(e1), Error::Utf8Error(e2)) => e1 == e2,
            (Error::NulError(e1), Error::NulError(e2)) => e1 == e2,
            (Error::InvalidParameterName(n1), Error::InvalidParameterName(n2)) => n1 == n2,
            (Error::InvalidPath(p1), Error::InvalidPath(p2)) => p1 == p2,
            (Error::ExecuteReturnedResults, Error::ExecuteReturnedResults) => true,
            (Error::QueryReturnedNoRows, Error::QueryReturnedNoRows) => true,
            (Error::InvalidColumnIndex(i1), Error::InvalidColumnIndex(i2)) => i1 == i2,
            (Error::InvalidColumnName(n1), Error::InvalidColumnName(n2)) => n1 == n2,
            (Error::InvalidColumnType(i1, n1, t1), Error::InvalidColumnType(i2, n2, t2)) => {
                i1 == i2 && t1 == t2 && n1 == n2
            }
            (Error::StatementChangedRows(n1), Error::StatementChangedRows(n2)) => n1 == n2,
            #[cfg(feature = "functions")]
            (
                Error::InvalidFunctionParameterType(i1, t1),
                Error::InvalidFunctionParameterType(i2, t2),
            ) => i1 == i2 && t1 == t2,
            #[cfg(feature = "vtab")]
            (
                Error::InvalidFilterParameterType(i1, t1),
                Error::InvalidFilterParameterType(i2, t2),
            ) => i1 == i2 && t1 == t2,
            (Error::InvalidQuery, Error::InvalidQuery) => true,
            #[cfg(feature = "vtab")]
            (Error::ModuleError(s1), Error::ModuleError(s2)) => s1 == s2,
            #[cfg(feature = "functions")]
            (Error::UnwindingPanic, Error::UnwindingPanic) => true,
            #[cfg(feature = "functions")]
            (Error::GetAuxWrongType, Error::GetAuxWrongType) => true,
            (Error::InvalidParameterCount(i1, n1), Error::InvalidParameterCount(i2, n2)) => {
                i1 == i2 && n1 == n2
            }
            (Error::BindingsError(s1), Error::BindingsError(s2)) => s1 == s2,
            (Error::IncompleteExecutionError, Error::IncompleteExecutionError) => true,
            (Error::ExecTraceAbort, Error::ExecTraceAbort) => true,
            (Error::ExecutionCompleteError, Error::ExecutionCompleteError) => true,
            (Error::ConnectionClosedError, Error::ConnectionClosedError) => true,
            (Error::CursorClosedError, Error::CursorClosedError) => true,
            (Error::VFSFileClosedError, Error::VFSFileClosedError) => true,
            (Error::ThreadingViolationError, Error::ThreadingViolationError) => true,
            (Error::ForkingViolationError, Error::ForkingViolationError) => true,
            (Error::ExtensionLoadingError(s1), Error::ExtensionLoadingError(s2)) => s1 == s2,
            (Error::VFSNotImplementedError(s1), Error::VFSNotImplementedError(s2)) => s1 == s2,
            (..) => false,
        }
    }
}

impl From<str::Utf8Error> for Error {
    fn from(err: str::Utf8Error) -> Error {
        Error::Utf8Error(err)
    }
}

impl From<::std::ffi::NulError> for Error {
    fn from(err: ::std::ffi::NulError) -> Error {
        Error::NulError(err)
    }
}

const UNKNOWN_COLUMN: usize = std::usize::MAX;

/// The conversion isn't precise, but it's convenient to have it
/// to allow use of `get_raw(…).as_…()?` in callbacks that take `Error`.
impl From<FromSqlError> for Error {
    fn from(err: FromSqlError) -> Error {
        // The error type requires index and type fields, but they aren't known in this
        // context.
        match err {
            FromSqlError::OutOfRange(val) => Error::IntegralValueOutOfRange(UNKNOWN_COLUMN, val),
            #[cfg(feature = "i128_blob")]
            FromSqlError::InvalidI128Size(_) => {
                Error::FromSqlConversionFailure(UNKNOWN_COLUMN, Type::Blob, Box::new(err))
            }
            #[cfg(feature = "uuid")]
            FromSqlError::InvalidUuidSize(_) => {
                Error::FromSqlConversionFailure(UNKNOWN_COLUMN, Type::Blob, Box::new(err))
            }
            FromSqlError::Other(source) => {
                Error::FromSqlConversionFailure(UNKNOWN_COLUMN, Type::Null, source)
            }
            _ => Error::FromSqlConversionFailure(UNKNOWN_COLUMN, Type::Null, Box::new(err)),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::SqliteFailure(ref err, None) => err.fmt(f),
            Error::SqliteFailure(_, Some(ref s)) => write!(f, "{}", s),
            Error::SqliteSingleThreadedMode => write!(
                f,
                "SQLite was compiled or configured for single-threaded use only"
            ),
            Error::FromSqlConversionFailure(i, ref t, ref err) => {
                if i != UNKNOWN_COLUMN {
                    write!(
                        f,
                        "Conversion error from type {} at index: {}, {}",
                        t, i, err
                    )
                } else {
                    err.fmt(f)
                }
            }
            Error::IntegralValueOutOfRange(col, val) => {
                if col != UNKNOWN_COLUMN {
                    write!(f, "Integer {} out of range at index {}", val, col)
                } else {
                    write!(f, "Integer {} out of range", val)
                }
            }
            Error::Utf8Error(ref err) => err.fmt(f),
            Error::NulError(ref err) => err.fmt(f),
            Error::InvalidParameterName(ref name) => write!(f, "Invalid parameter name: {}", name),
            Error::InvalidPath(ref p) => write!(f, "Invalid path: {}", p.to_string_lossy()),
            Error::ExecuteReturnedResults => {
                write!(f, "Execute returned results - did you mean to call query?")
            }
            Error::QueryReturnedNoRows => write!(f, "Query returned no rows"),
            Error::InvalidColumnIndex(i) => write!(f, "Invalid column index: {}", i),
            Error::InvalidColumnName(ref name) => write!(f, "Invalid column name: {}", name),
            Error::InvalidColumnType(i, ref name, ref t) => write!(
                f,
                "Invalid column type {} at index: {}, name: {}",
                t, i, name
            ),
            Error::InvalidParameterCount(i1, n1) => write!(
                f,
                "Wrong number of parameters passed to query. Got {}, needed {}",
                i1, n1
            ),
            Error::StatementChangedRows(i) => write!(f, "Query changed {} rows", i),

            #[cfg(feature = "functions")]
            Error::InvalidFunctionParameterType(i, ref t) => {
                write!(f, "Invalid function parameter type {} at index {}", t, i)
            }
            #[cfg(feature = "vtab")]
            Error::InvalidFilterParameterType(i, ref t) => {
                write!(f, "Invalid filter parameter type {} at index {}", t, i)
            }
            #[cfg(feature = "functions")]
            Error::UserFunctionError(ref err) => err.fmt(f),
            Error::ToSqlConversionFailure(ref err) => err.fmt(f),
            Error::InvalidQuery => write!(f, "Query is not read-only"),
            #[cfg(feature = "vtab")]
            Error::ModuleError(ref desc) => write!(f, "{}", desc),
            #[cfg(feature = "functions")]
            Error::UnwindingPanic => write!(f, "unwinding panic"),
            #[cfg(feature = "functions")]
            Error::GetAuxWrongType => write!(f, "get_aux called with wrong type"),
            Error::MultipleStatement => write!(f, "Multiple statements provided"),
            Error::BindingsError(ref msg) => write!(f, "Bindings error: {}", msg),
            Error::IncompleteExecutionError => {
                write!(f, "Cursor has unread rows or a pending sub-statement")
            }
            Error::ExecTraceAbort => write!(f, "Execution tracer vetoed the statement"),
            Error::ExecutionCompleteError => {
                write!(f, "Description requested after the cursor was drained")
            }
            Error::ConnectionClosedError => write!(f, "Connection is closed"),
            Error::CursorClosedError => write!(f, "Cursor is closed"),
            Error::VFSFileClosedError => write!(f, "VFS file is closed"),
            Error::ThreadingViolationError => {
                write!(f, "Connection used concurrently from another thread")
            }
            Error::ForkingViolationError => {
                write!(f, "Connection used in a child process after fork()")
            }
            Error::ExtensionLoadingError(ref msg) => write!(f, "Extension loading error: {}", msg),
            Error::VFSNotImplementedError(name) => {
                write!(f, "base VFS does not implement {}", name)
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::SqliteFailure(ref err, _) => Some(err),
            Error::Utf8Error(ref err) => Some(err),
            Error::NulError(ref err) => Some(err),

            Error::IntegralValueOutOfRange(..)
            | Error::SqliteSingleThreadedMode
            | Error::InvalidParameterName(_)
            | Error::ExecuteReturnedResults
            | Error::QueryReturnedNoRows
            | Error::InvalidColumnIndex(_)
            | Error::InvalidColumnName(_)
            | Error::InvalidColumnType(..)
            | Error::InvalidPath(_)
            | Error::InvalidParameterCount(..)
            | Error::StatementChangedRows(_)
            | Error::InvalidQuery
            | Error::MultipleStatement => None,

            #[cfg(feature = "functions")]
            Error::InvalidFunctionParameterType(..) => None,
            #[cfg(feature = "vtab")]
            Error::InvalidFilterParameterType(..) => None,

            #[cfg(feature = "functions")]
            Error::UserFunctionError(ref err) => Some(&**err),

            Error::FromSqlConversionFailure(_, _, ref err)
            | Error::ToSqlConversionFailure(ref err) => Some(&**err),

            #[cfg(feature = "vtab")]
            Error::ModuleError(_) => None,

            #[cfg(feature = "functions")]
            Error::UnwindingPanic => None,

            #[cfg(feature = "functions")]
            Error::GetAuxWrongType => None,

            Error::BindingsError(_)
            | Error::IncompleteExecutionError
            | Error::ExecTraceAbort
            | Error::ExecutionCompleteError
            | Error::ConnectionClosedError
            | Error::CursorClosedError
            | Error::VFSFileClosedError
            | Error::ThreadingViolationError
            | Error::ForkingViolationError
            | Error::ExtensionLoadingError(_)
            | Error::VFSNotImplementedError(_) => None,
        }
    }
}

// These are public but not re-exported by lib.rs, so only visible within crate.

pub fn error_from_sqlite_code(code: c_int, message: Option<String>) -> Error {
    Error::SqliteFailure(ffi::Error::new(code), message)
}

pub unsafe fn error_from_handle(db: *mut ffi::sqlite3, code: c_int) -> Error {
    let message = if db.is_null() {
        None
    } else {
        Some(errmsg_to_string(ffi::sqlite3_errmsg(db)))
    };
    error_from_sqlite_code(code, message)
}

/// As [`error_from_handle`], but for prepare-time failures: appends the
/// byte offset SQLite reports into `sql`, when it reports one, so a syntax
/// error points at the exact sub-statement of a multi-statement script.
pub unsafe fn error_with_offset(db: *mut ffi::sqlite3, code: c_int, sql: &str) -> Error {
    if db.is_null() {
        error_from_sqlite_code(code, None)
    } else {
        let extended_code = ffi::sqlite3_extended_errcode(db);
        let message = errmsg_to_string(ffi::sqlite3_errmsg(db));
        let offset = ffi::sqlite3_error_offset(db);
        let message = if offset >= 0 && (offset as usize) < sql.len() {
            format!("{message} in {sql} at offset {offset}")
        } else {
            message
        };
        Error::SqliteFailure(ffi::Error::new(extended_code), Some(message))
    }
}

/// As the `check!` macro, but as a plain function for call sites that
/// already have a `Result`-returning function to return from directly.
pub fn check(code: c_int) -> Result<(), Error> {
    if code != crate::ffi::SQLITE_OK {
        Err(error_from_sqlite_code(code, None))
    } else {
        Ok(())
    }
}

macro_rules! check {
    ($funcall:expr) => {{
        let rc = $funcall;
        if rc != crate::ffi::SQLITE_OK {
            return Err(crate::error::error_from_sqlite_code(rc, None).into());
        }
    }};
}
