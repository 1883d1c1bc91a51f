//! Tracing, profiling, and the process-wide error/warning log.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{catch_unwind, RefUnwindSafe};
use std::ptr;
use std::time::Duration;

use crate::ffi;
use crate::inner_connection::InnerConnection;
use crate::{Connection, Result};

/// Sets up the process-wide SQLite error/warning log.
///
/// # Safety
///
/// This function is not threadsafe: no other SQLite call may run while
/// `config_log` runs, and `config_log` itself may not be called
/// concurrently from multiple threads. `callback` must not itself invoke
/// any SQLite calls, and must be threadsafe if SQLite is used from more than
/// one thread.
///
/// See [the SQLite error/warning log docs](http://sqlite.org/errlog.html).
pub unsafe fn config_log(callback: Option<fn(c_int, &str)>) -> Result<()> {
    extern "C" fn log_callback(p_arg: *mut c_void, err: c_int, msg: *const c_char) {
        let c_slice = unsafe { CStr::from_ptr(msg) }.to_bytes();
        let callback: fn(c_int, &str) = unsafe { std::mem::transmute(p_arg) };
        if let Ok(s) = std::str::from_utf8(c_slice) {
            callback(err, s);
        }
    }

    let rc = match callback {
        Some(f) => {
            let p_arg = f as *mut c_void;
            ffi::sqlite3_config(ffi::SQLITE_CONFIG_LOG, Some(log_callback), p_arg)
        }
        None => ffi::sqlite3_config(ffi::SQLITE_CONFIG_LOG, ptr::null_mut::<c_void>(), ptr::null_mut::<c_void>()),
    };
    crate::error::check(rc)
}

/// Writes a message into the error/warning log established by
/// [`config_log`].
pub fn log(err_code: c_int, msg: &str) {
    let msg = CString::new(msg).expect("SQLite log messages cannot contain embedded zeroes");
    unsafe { ffi::sqlite3_log(err_code, msg.as_ptr()) }
}

unsafe extern "C" fn trace_trampoline<F>(p_arg: *mut c_void, z_sql: *const c_char)
where
    F: FnMut(&str) + Send,
{
    let _ = catch_unwind(|| {
        let sql = CStr::from_ptr(z_sql).to_string_lossy();
        let boxed_hook: *mut F = p_arg.cast::<F>();
        (*boxed_hook)(&sql);
    });
}

unsafe extern "C" fn profile_trampoline<F>(p_arg: *mut c_void, z_sql: *const c_char, nanoseconds: u64)
where
    F: FnMut(&str, Duration) + Send,
{
    let _ = catch_unwind(|| {
        let sql = CStr::from_ptr(z_sql).to_string_lossy();
        let boxed_hook: *mut F = p_arg.cast::<F>();
        (*boxed_hook)(&sql, Duration::from_nanos(nanoseconds));
    });
}

unsafe fn free_boxed_hook<F>(p: *mut c_void) {
    drop(Box::from_raw(p.cast::<F>()));
}

impl Connection {
    /// Registers or clears a callback invoked as each statement is about to
    /// execute, with its SQL text (placeholders already bound). Only one
    /// tracer may be active at a time; setting a new one clears the old one.
    pub fn trace<F>(&self, trace_fn: Option<F>)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.db.borrow_mut().trace(trace_fn);
    }

    /// Registers or clears a callback invoked after each statement finishes
    /// executing, with its SQL text and wall-clock duration.
    pub fn profile<F>(&self, profile_fn: Option<F>)
    where
        F: FnMut(&str, Duration) + Send + 'static,
    {
        self.db.borrow_mut().profile(profile_fn);
    }
}

impl InnerConnection {
    pub(crate) fn remove_trace_hooks(&mut self) {
        self.trace(None::<fn(&str)>);
        self.profile(None::<fn(&str, Duration)>);
    }

    fn trace<F>(&mut self, trace_fn: Option<F>)
    where
        F: FnMut(&str) + Send + 'static,
    {
        let free_trace_hook = trace_fn
            .is_some()
            .then_some(free_boxed_hook::<F> as unsafe fn(*mut c_void));
        let previous = match trace_fn {
            Some(f) => {
                let boxed: *mut F = Box::into_raw(Box::new(f));
                unsafe { ffi::sqlite3_trace(self.db(), Some(trace_trampoline::<F>), boxed.cast()) }
            }
            None => unsafe { ffi::sqlite3_trace(self.db(), None, ptr::null_mut()) },
        };
        if !previous.is_null() {
            if let Some(free) = self.free_trace_hook {
                unsafe { free(previous) };
            }
        }
        self.free_trace_hook = free_trace_hook;
    }

    fn profile<F>(&mut self, profile_fn: Option<F>)
    where
        F: FnMut(&str, Duration) + Send + 'static,
    {
        let free_profile_hook = profile_fn
            .is_some()
            .then_some(free_boxed_hook::<F> as unsafe fn(*mut c_void));
        let previous = match profile_fn {
            Some(f) => {
                let boxed: *mut F = Box::into_raw(Box::new(f));
                unsafe {
                    ffi::sqlite3_profile(self.db(), Some(profile_trampoline::<F>), boxed.cast())
                }
            }
            None => unsafe { ffi::sqlite3_profile(self.db(), None, ptr::null_mut()) },
        };
        if !previous.is_null() {
            if let Some(free) = self.free_profile_hook {
                unsafe { free(previous) };
            }
        }
        self.free_profile_hook = free_profile_hook;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn profile_is_invoked_per_statement() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let db = Connection::open_in_memory().unwrap();
        db.profile(Some(move |_sql: &str, _d: Duration| {
            counted.fetch_add(1, Ordering::SeqCst);
        }));
        db.execute_batch("PRAGMA application_id = 1").unwrap();
        assert!(calls.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn clearing_trace_stops_callbacks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let db = Connection::open_in_memory().unwrap();
        db.trace(Some(move |_sql: &str| {
            counted.fetch_add(1, Ordering::SeqCst);
        }));
        db.execute_batch("SELECT 1").unwrap();
        db.trace(None::<fn(&str)>);
        let before = calls.load(Ordering::SeqCst);
        db.execute_batch("SELECT 1").unwrap();
        assert_eq!(before, calls.load(Ordering::SeqCst));
    }
}
