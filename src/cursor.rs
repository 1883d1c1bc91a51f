//! `Cursor`: one prepared statement plus its execution/row tracers and its
//! multi-statement-script bookkeeping. Generalizes the Rust-native
//! `Statement`/`Rows`/`Row` machinery into the dynamically typed
//! execute/fetch surface the dispatch layer presents to callbacks and
//! extension code.

use std::os::raw::c_int;

use crate::bindings::Bindings;
use crate::connection::{CachedStatement, DependentGuard};
use crate::types::Value;
use crate::{Connection, Error, Result};

/// A row tracer may veto or replace a fetched row. Returning `Ok(None)` skips
/// the row entirely.
pub type RowTracer<'conn> = Box<dyn FnMut(&[Value]) -> Result<Option<Vec<Value>>> + 'conn>;

/// An execution tracer sees the about-to-run SQL and its bindings; returning
/// `Ok(false)` aborts the execute with `Error::ExecTraceAbort`.
pub type ExecTracer<'conn> = Box<dyn FnMut(&str, &Bindings) -> Result<bool> + 'conn>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum CursorState {
    /// No live statement, or the previous one ran to completion.
    Idle,
    /// A statement is bound and ready, but has not yet produced a row.
    Ready,
    /// At least one row has been fetched and more may remain.
    Iterating,
}

/// One prepared-statement execution in progress.
///
/// Borrows a [`CachedStatement`] from the owning [`Connection`] for the
/// duration of one `execute`; `close` (or drop) always returns it to the
/// connection's cache.
pub struct Cursor<'conn> {
    conn: &'conn Connection,
    stmt: Option<CachedStatement<'conn>>,
    /// SQL text not yet prepared, from a multi-statement `execute` call.
    remaining_sql: String,
    state: CursorState,
    exec_tracer: Option<ExecTracer<'conn>>,
    row_tracer: Option<RowTracer<'conn>>,
    _dependent: DependentGuard<'conn>,
}

impl<'conn> Cursor<'conn> {
    pub(crate) fn new(conn: &'conn Connection) -> Cursor<'conn> {
        Cursor {
            conn,
            stmt: None,
            remaining_sql: String::new(),
            state: CursorState::Idle,
            exec_tracer: None,
            row_tracer: None,
            _dependent: DependentGuard::new(conn),
        }
    }

    pub fn set_exec_tracer(&mut self, tracer: Option<ExecTracer<'conn>>) {
        self.exec_tracer = tracer;
    }

    pub fn set_row_tracer(&mut self, tracer: Option<RowTracer<'conn>>) {
        self.row_tracer = tracer;
    }

    /// Prepares (via the connection's statement cache, unless
    /// `can_cache = false`) and binds `sql`, leaving the cursor ready to
    /// [`fetch_one`](Self::fetch_one)/[`fetch_all`](Self::fetch_all).
    ///
    /// Fails with `Error::IncompleteExecutionError` if a previous statement
    /// on this cursor is still mid-iteration.
    pub fn execute<B: Into<Bindings>>(
        &mut self,
        sql: &str,
        bindings: B,
        can_cache: bool,
        prepare_flags: c_int,
    ) -> Result<&mut Cursor<'conn>> {
        if self.state == CursorState::Iterating {
            return Err(Error::IncompleteExecutionError);
        }
        let bindings = bindings.into();
        if let Some(tracer) = self.exec_tracer.as_mut() {
            if !tracer(sql, &bindings)? {
                return Err(Error::ExecTraceAbort);
            }
        }
        let mut stmt = self.conn.prepare_cached_with(sql, prepare_flags, can_cache)?;
        let tail = stmt.tail();
        bindings.bind_in(&mut stmt)?;
        self.remaining_sql = if tail == 0 || tail >= sql.len() {
            String::new()
        } else {
            sql[tail..].to_string()
        };
        self.stmt = Some(stmt);
        self.state = CursorState::Ready;
        Ok(self)
    }

    /// As [`execute`](Self::execute), but runs `sql` once per entry of
    /// `bindings_seq`, stepping every execution to completion (no rows are
    /// retrievable afterwards).
    pub fn execute_many<B, I>(&mut self, sql: &str, bindings_seq: I) -> Result<&mut Cursor<'conn>>
    where
        B: Into<Bindings>,
        I: IntoIterator<Item = B>,
    {
        if self.state == CursorState::Iterating {
            return Err(Error::IncompleteExecutionError);
        }
        for bindings in bindings_seq {
            self.execute(sql, bindings, true, 0)?;
            while self.fetch_one()?.is_some() {}
        }
        Ok(self)
    }

    /// Steps to the next row, or `Ok(None)` once the statement is exhausted.
    pub fn fetch_one(&mut self) -> Result<Option<Vec<Value>>> {
        loop {
            let stmt = match self.stmt.as_ref() {
                Some(stmt) => stmt,
                None => return Ok(None),
            };
            if !stmt.step()? {
                self.state = CursorState::Idle;
                return Ok(None);
            }
            self.state = CursorState::Iterating;
            let n = stmt.column_count();
            let row: Vec<Value> = (0..n).map(|i| stmt.value(i)).collect();
            match self.row_tracer.as_mut() {
                Some(tracer) => {
                    if let Some(row) = tracer(&row)? {
                        return Ok(Some(row));
                    }
                    // tracer vetoed this row; keep stepping
                }
                None => return Ok(Some(row)),
            }
        }
    }

    /// Drains every remaining row.
    pub fn fetch_all(&mut self) -> Result<Vec<Vec<Value>>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_one()? {
            rows.push(row);
        }
        Ok(rows)
    }

    fn active_stmt(&self) -> Result<&CachedStatement<'conn>> {
        self.stmt.as_ref().ok_or(Error::ExecutionCompleteError)
    }

    /// `[(column_name, decltype)]` for the active statement's result set.
    pub fn get_description(&self) -> Result<Vec<(String, Option<String>)>> {
        let stmt = self.active_stmt()?;
        #[cfg(feature = "column_decltype")]
        {
            Ok(stmt
                .columns()
                .into_iter()
                .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
                .collect())
        }
        #[cfg(not(feature = "column_decltype"))]
        {
            Ok(stmt
                .column_names()
                .into_iter()
                .map(|name| (name.to_string(), None))
                .collect())
        }
    }

    /// `[(name, decltype, database, table, origin)]`, available only when
    /// SQLite was built with column-metadata support.
    #[cfg(feature = "column_metadata")]
    pub fn get_description_full(
        &self,
    ) -> Result<Vec<(String, Option<String>, Option<String>, Option<String>, Option<String>)>> {
        use crate::ffi;
        use std::ffi::CStr;

        let cached = self.active_stmt()?;
        let stmt: &crate::statement::Statement<'_> = cached;
        let n = stmt.column_count();
        let raw = unsafe { stmt.stmt.ptr() };
        let to_opt_string = |p: *const std::os::raw::c_char| -> Option<String> {
            if p.is_null() {
                None
            } else {
                Some(unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned())
            }
        };
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let idx = i as std::os::raw::c_int;
            let name = stmt.column_name(i)?.to_string();
            let decltype = stmt
                .stmt
                .column_decltype(i)
                .map(|s| s.to_string_lossy().into_owned());
            let database = to_opt_string(unsafe { ffi::sqlite3_column_database_name(raw, idx) });
            let table = to_opt_string(unsafe { ffi::sqlite3_column_table_name(raw, idx) });
            let origin = to_opt_string(unsafe { ffi::sqlite3_column_origin_name(raw, idx) });
            out.push((name, decltype, database, table, origin));
        }
        Ok(out)
    }

    #[inline]
    pub fn is_readonly(&self) -> Result<bool> {
        Ok(self.active_stmt()?.readonly())
    }

    #[inline]
    pub fn is_explain(&self) -> Result<i32> {
        Ok(self.active_stmt()?.is_explain())
    }

    #[inline]
    pub fn expanded_sql(&self) -> Result<Option<String>> {
        Ok(self.active_stmt()?.expanded_sql())
    }

    /// Releases the checked-out statement back to the connection's cache
    /// (or discards it if `force`, e.g. because the caller mutated schema
    /// the statement depends on).
    pub fn close(&mut self, force: bool) {
        if let Some(stmt) = self.stmt.take() {
            if force {
                stmt.discard();
            }
            // else: dropping `stmt` here returns it to the cache.
        }
        self.state = CursorState::Idle;
        self.remaining_sql.clear();
    }
}

impl<'conn> Iterator for Cursor<'conn> {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.fetch_one() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl Connection {
    /// Opens a fresh [`Cursor`] against this connection, passing it through
    /// [`set_cursor_factory`](Self::set_cursor_factory)'s hook (if any)
    /// before returning it.
    pub fn cursor(&self) -> Cursor<'_> {
        self.run_cursor_factory(Cursor::new(self))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::Value;

    #[test]
    fn execute_and_fetch_all() {
        let db = Connection::open_in_memory().unwrap();
        let mut cursor = db.cursor();
        cursor.execute("CREATE TABLE t(x)", (), true, 0).unwrap();
        cursor.execute("INSERT INTO t VALUES (1), (2), (3)", (), true, 0).unwrap();
        cursor.execute("SELECT x FROM t ORDER BY x", (), true, 0).unwrap();
        let rows = cursor.fetch_all().unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Value::Integer(1)],
                vec![Value::Integer(2)],
                vec![Value::Integer(3)],
            ]
        );
    }

    #[test]
    fn mid_iteration_execute_is_rejected() {
        let db = Connection::open_in_memory().unwrap();
        let mut cursor = db.cursor();
        cursor.execute("CREATE TABLE t(x)", (), true, 0).unwrap();
        cursor.execute("INSERT INTO t VALUES (1), (2)", (), true, 0).unwrap();
        cursor.execute("SELECT x FROM t", (), true, 0).unwrap();
        cursor.fetch_one().unwrap();
        let err = cursor.execute("SELECT 1", (), true, 0).unwrap_err();
        assert!(matches!(err, Error::IncompleteExecutionError));
    }

    #[test]
    fn row_tracer_can_skip_rows() {
        let db = Connection::open_in_memory().unwrap();
        let mut cursor = db.cursor();
        cursor.execute("SELECT 1 UNION ALL SELECT 2 UNION ALL SELECT 3", (), true, 0).unwrap();
        cursor.set_row_tracer(Some(Box::new(|row: &[Value]| {
            if row == [Value::Integer(2)] {
                Ok(None)
            } else {
                Ok(Some(row.to_vec()))
            }
        })));
        let rows = cursor.fetch_all().unwrap();
        assert_eq!(rows, vec![vec![Value::Integer(1)], vec![Value::Integer(3)]]);
    }

    #[test]
    fn exec_tracer_can_abort() {
        let db = Connection::open_in_memory().unwrap();
        let mut cursor = db.cursor();
        cursor.set_exec_tracer(Some(Box::new(|_sql, _bindings| Ok(false))));
        let err = cursor.execute("SELECT 1", (), true, 0).unwrap_err();
        assert!(matches!(err, Error::ExecTraceAbort));
    }
}
