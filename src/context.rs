//! Code related to `sqlite3_context` common to `functions` and `vtab` modules.

use std::os::raw::{c_int, c_void};
use std::slice;

use crate::ffi;
use crate::types::{ToSqlOutput, ValueRef};
use crate::{str_to_cstring, Error};

impl<'a> ValueRef<'a> {
    pub(crate) unsafe fn from_value(value: *mut ffi::sqlite3_value) -> ValueRef<'a> {
        match ffi::sqlite3_value_type(value) {
            ffi::SQLITE_NULL => ValueRef::Null,
            ffi::SQLITE_INTEGER => ValueRef::Integer(ffi::sqlite3_value_int64(value)),
            ffi::SQLITE_FLOAT => ValueRef::Real(ffi::sqlite3_value_double(value)),
            ffi::SQLITE_TEXT => {
                let text = ffi::sqlite3_value_text(value);
                let len = ffi::sqlite3_value_bytes(value);
                debug_assert!(len >= 0, "unexpected negative sqlite3_value_bytes");
                if text.is_null() {
                    ValueRef::Text(&[])
                } else {
                    ValueRef::Text(slice::from_raw_parts(text as *const u8, len as usize))
                }
            }
            ffi::SQLITE_BLOB => {
                let (blob, len) = (
                    ffi::sqlite3_value_blob(value),
                    ffi::sqlite3_value_bytes(value),
                );
                debug_assert!(len >= 0, "unexpected negative sqlite3_value_bytes");
                if len > 0 {
                    debug_assert!(!blob.is_null());
                    ValueRef::Blob(slice::from_raw_parts(blob as *const u8, len as usize))
                } else {
                    ValueRef::Blob(&[])
                }
            }
            _ => unreachable!("sqlite3_value_type returned invalid value"),
        }
    }
}

/// Sets the result of an FFI-level scalar/aggregate/window function call from
/// a `ToSqlOutput`. `ZeroBlob` is honored here too: a function returning a
/// zero-filled blob goes through `sqlite3_result_zeroblob64` directly.
pub(crate) unsafe fn set_result(ctx: *mut ffi::sqlite3_context, result: &ToSqlOutput<'_>) {
    let value = match *result {
        ToSqlOutput::Borrowed(v) => v,
        ToSqlOutput::Owned(ref v) => ValueRef::from(v),
        #[cfg(feature = "blob")]
        ToSqlOutput::ZeroBlob(len) => return ffi::sqlite3_result_zeroblob(ctx, len),
    };

    match value {
        ValueRef::Null => ffi::sqlite3_result_null(ctx),
        ValueRef::Integer(i) => ffi::sqlite3_result_int64(ctx, i),
        ValueRef::Real(r) => ffi::sqlite3_result_double(ctx, r),
        ValueRef::Text(s) => {
            let length = s.len();
            if length > i32::MAX as usize {
                ffi::sqlite3_result_error_toobig(ctx);
                return;
            }
            match str_to_cstring(&String::from_utf8_lossy(s)) {
                Ok(c_str) => {
                    let destructor = if length > 0 {
                        ffi::SQLITE_TRANSIENT()
                    } else {
                        ffi::SQLITE_STATIC()
                    };
                    ffi::sqlite3_result_text(ctx, c_str.as_ptr(), length as c_int, destructor);
                }
                Err(_) => ffi::sqlite3_result_error_code(ctx, ffi::SQLITE_MISUSE),
            }
        }
        ValueRef::Blob(b) => {
            let length = b.len();
            if length > i32::MAX as usize {
                ffi::sqlite3_result_error_toobig(ctx);
            } else if length == 0 {
                ffi::sqlite3_result_zeroblob(ctx, 0)
            } else {
                ffi::sqlite3_result_blob(
                    ctx,
                    b.as_ptr() as *const c_void,
                    length as c_int,
                    ffi::SQLITE_TRANSIENT(),
                );
            }
        }
    }
}

/// Reports a Rust-side `Error` back to SQLite as the result of a user
/// callback. Extended result codes are used when available so the caller
/// sees the precise primary/extended pair rather than a generic
/// `SQLITE_ERROR`.
pub(crate) unsafe fn report_error(ctx: *mut ffi::sqlite3_context, err: &Error) {
    match *err {
        Error::SqliteFailure(ref err, ref s) => {
            ffi::sqlite3_result_error_code(ctx, err.extended_code);
            if let Some(Ok(cstr)) = s.as_ref().map(|s| str_to_cstring(s)) {
                ffi::sqlite3_result_error(ctx, cstr.as_ptr(), -1);
            }
        }
        _ => {
            ffi::sqlite3_result_error_code(ctx, ffi::SQLITE_ERROR);
            if let Ok(cstr) = str_to_cstring(&err.to_string()) {
                ffi::sqlite3_result_error(ctx, cstr.as_ptr(), -1);
            }
        }
    }
}
