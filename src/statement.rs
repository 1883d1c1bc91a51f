use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::{fmt, mem, ptr};

use super::ffi;
use super::str_to_cstring;
use super::{Connection, Error, Params, RawStatement, Result};
use crate::bindings::{BoundValue, Bindings};
use crate::row::{Row, Rows};
use crate::types::{ToSql, ToSqlOutput, Value, ValueRef};

/// A prepared statement borrowed from, or about to be returned to, the
/// owning `Connection`'s `StmtCache`. Column introspection lives in
/// `column.rs`; row iteration in `row.rs`; this module owns parameter
/// binding and stepping.
pub struct Statement<'conn> {
    pub(crate) conn: &'conn Connection,
    pub(crate) stmt: RawStatement,
}

impl<'conn> Statement<'conn> {
    pub(crate) fn new(conn: &'conn Connection, stmt: RawStatement) -> Statement<'conn> {
        Statement { conn, stmt }
    }

    pub fn parameter_count(&self) -> usize {
        self.stmt.bind_parameter_count()
    }

    pub fn parameter_index(&self, name: &str) -> Result<Option<usize>> {
        let c_name = str_to_cstring(name)?;
        Ok(self.stmt.bind_parameter_index(&c_name))
    }

    /// The name SQLite compiled for the `idx`th (1-based) `?`-parameter,
    /// including its `:`/`$`/`@` sigil, or `None` for an anonymous `?`.
    pub(crate) fn parameter_name(&self, idx: usize) -> Option<String> {
        unsafe {
            let ptr = ffi::sqlite3_bind_parameter_name(self.stmt.ptr(), idx as c_int);
            if ptr.is_null() {
                None
            } else {
                Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
            }
        }
    }

    pub(crate) fn bind(&mut self, bindings: &Bindings) -> Result<()> {
        bindings.bind_in(self)
    }

    pub(crate) fn bind_bound_value(&mut self, col: usize, value: &BoundValue) -> Result<()> {
        match value {
            BoundValue::Value(v) => self.bind_value(col, ValueRef::from(v)),
            #[cfg(feature = "blob")]
            BoundValue::ZeroBlob(len) => self.bind_zeroblob(col, *len),
        }
    }

    pub(crate) fn bind_value(&self, col: usize, value: ValueRef<'_>) -> Result<()> {
        let ptr = unsafe { self.stmt.ptr() };
        self.conn.decode_result(match value {
            ValueRef::Null => unsafe { ffi::sqlite3_bind_null(ptr, col as c_int) },
            ValueRef::Integer(i) => unsafe { ffi::sqlite3_bind_int64(ptr, col as c_int, i) },
            ValueRef::Real(r) => unsafe { ffi::sqlite3_bind_double(ptr, col as c_int, r) },
            ValueRef::Text(s) => unsafe {
                let length = s.len();
                if length > i32::MAX as usize {
                    ffi::SQLITE_TOOBIG
                } else {
                    let destructor = if length > 0 {
                        ffi::SQLITE_TRANSIENT()
                    } else {
                        ffi::SQLITE_STATIC()
                    };
                    ffi::sqlite3_bind_text(
                        ptr,
                        col as c_int,
                        s.as_ptr() as *const c_char,
                        length as c_int,
                        destructor,
                    )
                }
            },
            ValueRef::Blob(b) => unsafe {
                let length = b.len();
                if length > i32::MAX as usize {
                    ffi::SQLITE_TOOBIG
                } else if length == 0 {
                    ffi::sqlite3_bind_zeroblob(ptr, col as c_int, 0)
                } else {
                    ffi::sqlite3_bind_blob(
                        ptr,
                        col as c_int,
                        b.as_ptr() as *const c_void,
                        length as c_int,
                        ffi::SQLITE_TRANSIENT(),
                    )
                }
            },
        })
    }

    #[cfg(feature = "blob")]
    pub(crate) fn bind_zeroblob(&self, col: usize, len: i32) -> Result<()> {
        let ptr = unsafe { self.stmt.ptr() };
        self.conn
            .decode_result(unsafe { ffi::sqlite3_bind_zeroblob(ptr, col as c_int, len) })
    }

    /// Binds a single `?`-positional parameter directly, for scalar-function
    /// and vtab-bridge callers that already hold a `ToSqlOutput`.
    pub(crate) fn bind_output(&self, col: usize, value: &ToSqlOutput<'_>) -> Result<()> {
        match value {
            ToSqlOutput::Borrowed(v) => self.bind_value(col, *v),
            ToSqlOutput::Owned(v) => self.bind_value(col, ValueRef::from(v)),
            #[cfg(feature = "blob")]
            ToSqlOutput::ZeroBlob(len) => self.bind_zeroblob(col, *len),
        }
    }

    pub(crate) fn clear_bindings(&self) {
        self.stmt.clear_bindings();
    }

    /// Executes the statement, returning the number of rows changed.
    ///
    /// ## Failure
    ///
    /// Returns `Error::ExecuteReturnedResults` if the statement produced rows
    /// (use `query` for `SELECT`-shaped SQL instead).
    pub fn execute<P: Params>(&mut self, params: P) -> Result<usize> {
        params.bind_in(self)?;
        self.execute_with_bound_parameters()
    }

    fn execute_with_bound_parameters(&mut self) -> Result<usize> {
        let r = self.stmt.step();
        self.stmt.reset();
        match r {
            ffi::SQLITE_DONE => Ok(self.conn.changes() as usize),
            ffi::SQLITE_ROW => Err(Error::ExecuteReturnedResults),
            _ => Err(self.conn.decode_result(r).unwrap_err()),
        }
    }

    /// Executes the statement and returns a handle to the resulting rows.
    pub fn query<P: Params>(&mut self, params: P) -> Result<Rows<'_>> {
        self.reset();
        params.bind_in(self)?;
        Ok(Rows::new(self))
    }

    /// Executes the statement and calls `f` with the first (and expected
    /// only) resulting row.
    ///
    /// ## Failure
    ///
    /// Returns `Error::QueryReturnedNoRows` if the query produced no rows.
    pub fn query_row<T, P, F>(&mut self, params: P, f: F) -> Result<T>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> Result<T>,
    {
        let mut rows = self.query(params)?;
        let row = rows.get_expected_row()?;
        f(row)
    }

    /// Binds a positional `ToSql` parameter list, used by the blanket
    /// `Params` impls for slices and fixed-size arrays.
    pub(crate) fn bind_parameters<P>(&mut self, params: P) -> Result<()>
    where
        P: IntoIterator,
        P::Item: ToSql,
    {
        let mut index = 0;
        for value in params {
            index += 1;
            self.bind_output(index, &value.to_sql()?)?;
        }
        if index != self.parameter_count() {
            return Err(Error::InvalidParameterCount(index, self.parameter_count()));
        }
        Ok(())
    }

    /// Binds a named `ToSql` parameter list by stripped-sigil name, used by
    /// the blanket `Params` impl for `&[(&str, &dyn ToSql)]`.
    pub(crate) fn bind_parameters_named(&mut self, params: &[(&str, &dyn ToSql)]) -> Result<()> {
        for &(name, value) in params {
            if let Some(i) = self.parameter_index(name)? {
                self.bind_output(i, &value.to_sql()?)?;
            } else {
                return Err(Error::InvalidParameterName(name.into()));
            }
        }
        Ok(())
    }

    pub(crate) fn step(&self) -> Result<bool> {
        match self.stmt.step() {
            ffi::SQLITE_ROW => Ok(true),
            ffi::SQLITE_DONE => Ok(false),
            code => Err(self.conn.decode_result(code).unwrap_err()),
        }
    }

    pub(crate) fn reset(&self) {
        self.stmt.reset();
    }

    /// Extracts the value of column `col` of the current row. Panics if
    /// there is no current row; callers only reach this after `step`
    /// returned `Ok(true)`.
    pub(crate) fn value_ref(&self, col: usize) -> ValueRef<'_> {
        let raw = unsafe { self.stmt.ptr() };
        match self.stmt.column_type(col) {
            ffi::SQLITE_NULL => ValueRef::Null,
            ffi::SQLITE_INTEGER => {
                ValueRef::Integer(unsafe { ffi::sqlite3_column_int64(raw, col as c_int) })
            }
            ffi::SQLITE_FLOAT => {
                ValueRef::Real(unsafe { ffi::sqlite3_column_double(raw, col as c_int) })
            }
            ffi::SQLITE_TEXT => unsafe {
                let text = ffi::sqlite3_column_text(raw, col as c_int);
                let len = ffi::sqlite3_column_bytes(raw, col as c_int);
                debug_assert!(len >= 0);
                if text.is_null() {
                    ValueRef::Text(&[])
                } else {
                    ValueRef::Text(std::slice::from_raw_parts(text as *const u8, len as usize))
                }
            },
            ffi::SQLITE_BLOB => unsafe {
                let blob = ffi::sqlite3_column_blob(raw, col as c_int);
                let len = ffi::sqlite3_column_bytes(raw, col as c_int);
                debug_assert!(len >= 0);
                if len > 0 {
                    ValueRef::Blob(std::slice::from_raw_parts(blob as *const u8, len as usize))
                } else {
                    ValueRef::Blob(&[])
                }
            },
            _ => unreachable!("sqlite3_column_type returned invalid value"),
        }
    }

    pub(crate) fn value(&self, col: usize) -> Value {
        Value::from(self.value_ref(col))
    }

    pub fn readonly(&self) -> bool {
        self.stmt.readonly()
    }

    /// 0 = not EXPLAIN, 1 = EXPLAIN, 2 = EXPLAIN QUERY PLAN.
    pub fn is_explain(&self) -> i32 {
        self.stmt.is_explain()
    }

    pub fn expanded_sql(&self) -> Option<String> {
        self.stmt.expanded_sql()
    }

    pub fn sql(&self) -> &str {
        self.stmt.sql().to_str().unwrap_or("")
    }

    /// Number of bytes of the original multi-statement SQL text not yet
    /// consumed by this prepare.
    pub(crate) fn tail(&self) -> usize {
        self.stmt.tail()
    }

    /// Consumes the statement, finalizing it immediately rather than
    /// returning it to the cache.
    pub fn finalize(mut self) -> Result<()> {
        self.finalize_()
    }

    fn finalize_(&mut self) -> Result<()> {
        let mut stmt = unsafe { RawStatement::new(ptr::null_mut(), 0) };
        mem::swap(&mut stmt, &mut self.stmt);
        self.conn.decode_result(stmt.finalize())
    }
}

impl From<Statement<'_>> for RawStatement {
    fn from(mut stmt: Statement<'_>) -> RawStatement {
        let mut raw = unsafe { RawStatement::new(ptr::null_mut(), 0) };
        mem::swap(&mut raw, &mut stmt.stmt);
        raw
    }
}

impl fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql())
            .finish()
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        let _ = self.finalize_();
    }
}

#[cfg(test)]
mod test {
    use crate::bindings::Bindings;
    use crate::Connection;

    #[test]
    fn bind_positional_arity_mismatch() {
        let db = Connection::open_in_memory().unwrap();
        let mut stmt = db.prepare("SELECT ?1, ?2").unwrap();
        let bindings = Bindings::positional(vec![1i64]);
        assert!(stmt.bind(&bindings).is_err());
    }

    #[test]
    fn bind_named_missing_key_is_null() {
        let db = Connection::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE t(x, y)").unwrap();
        let mut stmt = db
            .prepare("INSERT INTO t (x, y) VALUES (:x, :y)")
            .unwrap();
        let bindings = Bindings::named(vec![("x", "one".to_string())]);
        stmt.bind(&bindings).unwrap();
        stmt.step().unwrap();

        let mut check = db.prepare("SELECT y FROM t").unwrap();
        check.step().unwrap();
        assert_eq!(check.value_ref(0), crate::types::ValueRef::Null);
    }
}
