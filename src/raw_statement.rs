use std::ffi::CStr;
use std::os::raw::c_int;
use std::ptr;
use std::sync::Arc;

use super::ffi;
use super::unlock_notify;

/// Private newtype for raw `sqlite3_stmt*` that finalizes itself when
/// dropped. Also carries the bookkeeping the [`StmtCache`](crate::stmt_cache::StmtCache)
/// needs to find its way back into the map on release: the cache key it was
/// prepared under (`None` if `can_cache` was false) and the `prepare_flags`
/// it was compiled with.
#[derive(Debug)]
pub struct RawStatement {
    ptr: *mut ffi::sqlite3_stmt,
    tail: usize,
    cache_key: Option<Arc<str>>,
    prepare_flags: c_int,
    cache_generation: u64,
}

impl RawStatement {
    #[inline]
    pub unsafe fn new(stmt: *mut ffi::sqlite3_stmt, tail: usize) -> RawStatement {
        RawStatement {
            ptr: stmt,
            tail,
            cache_key: None,
            prepare_flags: 0,
            cache_generation: 0,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    #[inline]
    pub unsafe fn ptr(&self) -> *mut ffi::sqlite3_stmt {
        self.ptr
    }

    /// Number of bytes of the original SQL text consumed by this statement;
    /// a nonzero value means trailing SQL remains to be prepared.
    #[inline]
    pub fn tail(&self) -> usize {
        self.tail
    }

    #[inline]
    pub fn statement_cache_key(&self) -> Option<Arc<str>> {
        self.cache_key.clone()
    }

    #[inline]
    pub fn set_statement_cache_key(&mut self, key: impl Into<Option<Arc<str>>>) {
        self.cache_key = key.into();
    }

    #[inline]
    pub fn prepare_flags(&self) -> c_int {
        self.prepare_flags
    }

    #[inline]
    pub fn set_prepare_flags(&mut self, flags: c_int) {
        self.prepare_flags = flags;
    }

    #[inline]
    pub fn statement_cache_generation(&self) -> u64 {
        self.cache_generation
    }

    #[inline]
    pub fn set_statement_cache_generation(&mut self, generation: u64) {
        self.cache_generation = generation;
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        unsafe { ffi::sqlite3_column_count(self.ptr) as usize }
    }

    #[inline]
    pub fn column_type(&self, idx: usize) -> c_int {
        unsafe { ffi::sqlite3_column_type(self.ptr, idx as c_int) }
    }

    /// `None` if SQLite failed to allocate the name (e.g. OOM) or `idx` is
    /// out of range.
    #[inline]
    pub fn column_name(&self, idx: usize) -> Option<&CStr> {
        unsafe {
            let name = ffi::sqlite3_column_name(self.ptr, idx as c_int);
            if name.is_null() {
                None
            } else {
                Some(CStr::from_ptr(name))
            }
        }
    }

    #[inline]
    pub fn column_decltype(&self, idx: usize) -> Option<&CStr> {
        unsafe {
            let decltype = ffi::sqlite3_column_decltype(self.ptr, idx as c_int);
            if decltype.is_null() {
                None
            } else {
                Some(CStr::from_ptr(decltype))
            }
        }
    }

    pub fn step(&self) -> c_int {
        if cfg!(feature = "unlock_notify") {
            let db = unsafe { ffi::sqlite3_db_handle(self.ptr) };
            let mut rc;
            loop {
                rc = unsafe { ffi::sqlite3_step(self.ptr) };
                if !unlock_notify::is_locked(db, rc) {
                    break;
                }
                rc = unlock_notify::wait_for_unlock_notify(db);
                if rc != ffi::SQLITE_OK {
                    break;
                }
                self.reset();
            }
            rc
        } else {
            unsafe { ffi::sqlite3_step(self.ptr) }
        }
    }

    #[inline]
    pub fn reset(&self) -> c_int {
        unsafe { ffi::sqlite3_reset(self.ptr) }
    }

    #[inline]
    pub fn bind_parameter_count(&self) -> usize {
        unsafe { ffi::sqlite3_bind_parameter_count(self.ptr) as usize }
    }

    pub fn bind_parameter_index(&self, name: &CStr) -> Option<usize> {
        let r = unsafe { ffi::sqlite3_bind_parameter_index(self.ptr, name.as_ptr()) };
        match r {
            0 => None,
            i => Some(i as usize),
        }
    }

    #[inline]
    pub fn clear_bindings(&self) -> c_int {
        unsafe { ffi::sqlite3_clear_bindings(self.ptr) }
    }

    #[inline]
    pub fn sql(&self) -> &CStr {
        unsafe { CStr::from_ptr(ffi::sqlite3_sql(self.ptr)) }
    }

    /// The same statement text with every bound parameter substituted with
    /// `format_sql_value`-equivalent SQL literals, or `None` if SQLite
    /// declines (a literal exceeded `SQLITE_LIMIT_LENGTH`, or the bundled
    /// SQLite was compiled without it).
    pub fn expanded_sql(&self) -> Option<String> {
        unsafe {
            let ptr = ffi::sqlite3_expanded_sql(self.ptr);
            if ptr.is_null() {
                None
            } else {
                let s = CStr::from_ptr(ptr).to_string_lossy().to_string();
                ffi::sqlite3_free(ptr as *mut std::os::raw::c_void);
                Some(s)
            }
        }
    }

    #[inline]
    pub fn readonly(&self) -> bool {
        unsafe { ffi::sqlite3_stmt_readonly(self.ptr) != 0 }
    }

    /// 0 = not EXPLAIN, 1 = EXPLAIN, 2 = EXPLAIN QUERY PLAN.
    #[inline]
    pub fn is_explain(&self) -> c_int {
        unsafe { ffi::sqlite3_stmt_isexplain(self.ptr) }
    }

    #[inline]
    pub fn finalize(mut self) -> c_int {
        self.finalize_()
    }

    fn finalize_(&mut self) -> c_int {
        let r = unsafe { ffi::sqlite3_finalize(self.ptr) };
        self.ptr = ptr::null_mut();
        r
    }
}

impl Drop for RawStatement {
    fn drop(&mut self) {
        self.finalize_();
    }
}
