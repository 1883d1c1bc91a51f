#![allow(non_snake_case)]

extern crate libc;

pub use self::bindgen::*;
pub use self::error::*;

use std::mem;
use libc::c_int;

mod bindgen;
mod error;

// Authorizer action codes (2nd argument of the xAuth callback).
pub const SQLITE_CREATE_INDEX       : c_int =  1;
pub const SQLITE_CREATE_TABLE       : c_int =  2;
pub const SQLITE_CREATE_TEMP_INDEX  : c_int =  3;
pub const SQLITE_CREATE_TEMP_TABLE  : c_int =  4;
pub const SQLITE_CREATE_TEMP_TRIGGER: c_int =  5;
pub const SQLITE_CREATE_TEMP_VIEW   : c_int =  6;
pub const SQLITE_CREATE_TRIGGER     : c_int =  7;
pub const SQLITE_CREATE_VIEW        : c_int =  8;
pub const SQLITE_DELETE             : c_int =  9;
pub const SQLITE_DROP_INDEX         : c_int = 10;
pub const SQLITE_DROP_TABLE         : c_int = 11;
pub const SQLITE_DROP_TEMP_INDEX    : c_int = 12;
pub const SQLITE_DROP_TEMP_TABLE    : c_int = 13;
pub const SQLITE_DROP_TEMP_TRIGGER  : c_int = 14;
pub const SQLITE_DROP_TEMP_VIEW     : c_int = 15;
pub const SQLITE_DROP_TRIGGER       : c_int = 16;
pub const SQLITE_DROP_VIEW          : c_int = 17;
pub const SQLITE_INSERT             : c_int = 18;
pub const SQLITE_PRAGMA             : c_int = 19;
pub const SQLITE_READ               : c_int = 20;
pub const SQLITE_SELECT             : c_int = 21;
pub const SQLITE_TRANSACTION        : c_int = 22;
pub const SQLITE_UPDATE             : c_int = 23;
pub const SQLITE_ATTACH             : c_int = 24;
pub const SQLITE_DETACH             : c_int = 25;
pub const SQLITE_ALTER_TABLE        : c_int = 26;
pub const SQLITE_REINDEX            : c_int = 27;
pub const SQLITE_ANALYZE            : c_int = 28;
pub const SQLITE_CREATE_VTABLE      : c_int = 29;
pub const SQLITE_DROP_VTABLE        : c_int = 30;
pub const SQLITE_FUNCTION           : c_int = 31;
pub const SQLITE_SAVEPOINT          : c_int = 32;
pub const SQLITE_RECURSIVE          : c_int = 33;

// Authorizer xAuth return codes, distinct from the primary result codes above.
pub const SQLITE_DENY   : c_int = 1;
pub const SQLITE_IGNORE : c_int = 2;

// sqlite3_limit() id argument.
pub const SQLITE_LIMIT_LENGTH             : c_int =  0;
pub const SQLITE_LIMIT_SQL_LENGTH         : c_int =  1;
pub const SQLITE_LIMIT_COLUMN             : c_int =  2;
pub const SQLITE_LIMIT_EXPR_DEPTH         : c_int =  3;
pub const SQLITE_LIMIT_COMPOUND_SELECT    : c_int =  4;
pub const SQLITE_LIMIT_VDBE_OP            : c_int =  5;
pub const SQLITE_LIMIT_FUNCTION_ARG       : c_int =  6;
pub const SQLITE_LIMIT_ATTACHED           : c_int =  7;
pub const SQLITE_LIMIT_LIKE_PATTERN_LENGTH: c_int =  8;
pub const SQLITE_LIMIT_VARIABLE_NUMBER    : c_int =  9;
pub const SQLITE_LIMIT_TRIGGER_DEPTH      : c_int = 10;
pub const SQLITE_LIMIT_WORKER_THREADS     : c_int = 11;

/// `sqlite3_limit()`/`sqlite3_set_limit()` id argument, as a closed enum
/// instead of a bare `c_int`.
#[repr(i32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
#[allow(non_camel_case_types)]
pub enum Limit {
    SQLITE_LIMIT_LENGTH = SQLITE_LIMIT_LENGTH,
    SQLITE_LIMIT_SQL_LENGTH = SQLITE_LIMIT_SQL_LENGTH,
    SQLITE_LIMIT_COLUMN = SQLITE_LIMIT_COLUMN,
    SQLITE_LIMIT_EXPR_DEPTH = SQLITE_LIMIT_EXPR_DEPTH,
    SQLITE_LIMIT_COMPOUND_SELECT = SQLITE_LIMIT_COMPOUND_SELECT,
    SQLITE_LIMIT_VDBE_OP = SQLITE_LIMIT_VDBE_OP,
    SQLITE_LIMIT_FUNCTION_ARG = SQLITE_LIMIT_FUNCTION_ARG,
    SQLITE_LIMIT_ATTACHED = SQLITE_LIMIT_ATTACHED,
    SQLITE_LIMIT_LIKE_PATTERN_LENGTH = SQLITE_LIMIT_LIKE_PATTERN_LENGTH,
    SQLITE_LIMIT_VARIABLE_NUMBER = SQLITE_LIMIT_VARIABLE_NUMBER,
    SQLITE_LIMIT_TRIGGER_DEPTH = SQLITE_LIMIT_TRIGGER_DEPTH,
    SQLITE_LIMIT_WORKER_THREADS = SQLITE_LIMIT_WORKER_THREADS,
}

// sqlite3_open_v2() flags.
pub const SQLITE_OPEN_READONLY      : c_int = 0x0000_0001;
pub const SQLITE_OPEN_READWRITE     : c_int = 0x0000_0002;
pub const SQLITE_OPEN_CREATE        : c_int = 0x0000_0004;
pub const SQLITE_OPEN_DELETEONCLOSE : c_int = 0x0000_0008;
pub const SQLITE_OPEN_EXCLUSIVE     : c_int = 0x0000_0010;
pub const SQLITE_OPEN_AUTOPROXY     : c_int = 0x0000_0020;
pub const SQLITE_OPEN_URI           : c_int = 0x0000_0040;
pub const SQLITE_OPEN_MEMORY        : c_int = 0x0000_0080;
pub const SQLITE_OPEN_MAIN_DB       : c_int = 0x0000_0100;
pub const SQLITE_OPEN_TEMP_DB       : c_int = 0x0000_0200;
pub const SQLITE_OPEN_TRANSIENT_DB  : c_int = 0x0000_0400;
pub const SQLITE_OPEN_MAIN_JOURNAL  : c_int = 0x0000_0800;
pub const SQLITE_OPEN_TEMP_JOURNAL  : c_int = 0x0000_1000;
pub const SQLITE_OPEN_SUBJOURNAL    : c_int = 0x0000_2000;
pub const SQLITE_OPEN_SUPER_JOURNAL : c_int = 0x0000_4000;
pub const SQLITE_OPEN_NOMUTEX       : c_int = 0x0000_8000;
pub const SQLITE_OPEN_FULLMUTEX     : c_int = 0x0001_0000;
pub const SQLITE_OPEN_SHAREDCACHE   : c_int = 0x0002_0000;
pub const SQLITE_OPEN_PRIVATECACHE  : c_int = 0x0004_0000;
pub const SQLITE_OPEN_WAL           : c_int = 0x0008_0000;
pub const SQLITE_OPEN_NOFOLLOW      : c_int = 0x0100_0000;
pub const SQLITE_OPEN_EXRESCODE     : c_int = 0x0200_0000;

// sqlite3_prepare_v3() prepFlags bits.
pub const SQLITE_PREPARE_PERSISTENT: ::libc::c_uint = 0x01;
pub const SQLITE_PREPARE_NORMALIZE : ::libc::c_uint = 0x02;
pub const SQLITE_PREPARE_NO_VTAB   : ::libc::c_uint = 0x04;

// sqlite3_trace_v2() uMask bits / event kind passed to the trace callback.
pub const SQLITE_TRACE_STMT   : ::libc::c_uint = 0x01;
pub const SQLITE_TRACE_PROFILE: ::libc::c_uint = 0x02;
pub const SQLITE_TRACE_ROW    : ::libc::c_uint = 0x04;
pub const SQLITE_TRACE_CLOSE  : ::libc::c_uint = 0x08;

// sqlite3_txn_state() return values.
pub const SQLITE_TXN_NONE : c_int = 0;
pub const SQLITE_TXN_READ : c_int = 1;
pub const SQLITE_TXN_WRITE: c_int = 2;

// SQLite datatype constants.
pub const SQLITE_INTEGER : c_int = 1;
pub const SQLITE_FLOAT   : c_int = 2;
pub const SQLITE_TEXT    : c_int = 3;
pub const SQLITE_BLOB    : c_int = 4;
pub const SQLITE_NULL    : c_int = 5;

pub fn SQLITE_STATIC() -> sqlite3_destructor_type {
    Some(unsafe { mem::transmute(0isize) })
}

pub fn SQLITE_TRANSIENT() -> sqlite3_destructor_type {
    Some(unsafe { mem::transmute(-1isize) })
}

// sqlite3_config() verbs (subset).
pub const SQLITE_CONFIG_SINGLETHREAD: c_int = 1;
pub const SQLITE_CONFIG_MULTITHREAD: c_int = 2;
pub const SQLITE_CONFIG_SERIALIZED: c_int = 3;
pub const SQLITE_CONFIG_MEMSTATUS: c_int = 9;
pub const SQLITE_CONFIG_LOG: c_int = 16;
pub const SQLITE_CONFIG_URI: c_int = 17;

pub const SQLITE_UTF8  : c_int = 1;
pub const SQLITE_DETERMINISTIC  : c_int = 0x000000800;
pub const SQLITE_DIRECTONLY     : c_int = 0x000080000;
pub const SQLITE_SUBTYPE        : c_int = 0x000100000;
pub const SQLITE_INNOCUOUS      : c_int = 0x000200000;

// sqlite3_file locking levels (xLock/xUnlock argument, xCheckReservedLock result).
pub const SQLITE_LOCK_NONE     : c_int = 0;
pub const SQLITE_LOCK_SHARED   : c_int = 1;
pub const SQLITE_LOCK_RESERVED : c_int = 2;
pub const SQLITE_LOCK_PENDING  : c_int = 3;
pub const SQLITE_LOCK_EXCLUSIVE: c_int = 4;

// xAccess() flags argument.
pub const SQLITE_ACCESS_EXISTS   : c_int = 0;
pub const SQLITE_ACCESS_READWRITE: c_int = 1;
pub const SQLITE_ACCESS_READ     : c_int = 2;

// xDeviceCharacteristics() return bits (subset).
pub const SQLITE_IOCAP_ATOMIC               : c_int = 0x0000_0001;
pub const SQLITE_IOCAP_SAFE_APPEND          : c_int = 0x0000_0200;
pub const SQLITE_IOCAP_SEQUENTIAL           : c_int = 0x0000_0400;
pub const SQLITE_IOCAP_UNDELETABLE_WHEN_OPEN: c_int = 0x0000_0800;
pub const SQLITE_IOCAP_POWERSAFE_OVERWRITE  : c_int = 0x0000_1000;
pub const SQLITE_IOCAP_IMMUTABLE            : c_int = 0x0000_2000;

// xSync() flags argument (subset).
pub const SQLITE_SYNC_NORMAL  : c_int = 0x0000_0002;
pub const SQLITE_SYNC_FULL    : c_int = 0x0000_0003;
pub const SQLITE_SYNC_DATAONLY: c_int = 0x0000_0010;

// xFileControl() op argument (subset actually consulted by this crate).
pub const SQLITE_FCNTL_SIZE_HINT    : c_int = 5;
pub const SQLITE_FCNTL_CHUNK_SIZE   : c_int = 6;
pub const SQLITE_FCNTL_FILE_POINTER : c_int = 7;
pub const SQLITE_FCNTL_PERSIST_WAL  : c_int = 10;
pub const SQLITE_FCNTL_POWERSAFE_OVERWRITE: c_int = 13;
pub const SQLITE_FCNTL_VFSNAME      : c_int = 31;
