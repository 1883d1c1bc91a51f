//! The `Connection` type: an open handle to one SQLite database, its
//! prepared-statement cache, and every callback slot a caller may register
//! on it.

use std::cell::{Cell, RefCell};
use std::ffi::CStr;
use std::fmt;
use std::os::raw::{c_char, c_int};
use std::path::Path;
use std::ptr;

use super::ffi;
use super::inner_connection::InnerConnection;
use super::raw_statement::RawStatement;
use super::statement::Statement;
use super::stmt_cache::StmtCache;
use super::{str_for_sqlite, str_to_cstring, DatabaseName, Error, InterruptHandle, OpenFlags, Params, Result};
use crate::cursor::Cursor;
use crate::error::error_with_offset;
use crate::row::Row;
use crate::transaction::{Savepoint, Transaction, TransactionBehavior};

/// Default capacity of a freshly opened `Connection`'s statement cache;
/// `0` disables caching entirely.
const DEFAULT_STMT_CACHE_CAPACITY: usize = 16;

/// A caller-supplied hook consulted by [`Connection::cursor`] to wrap (or
/// replace) every freshly constructed [`Cursor`] before handing it back.
pub(crate) type CursorFactory = Box<dyn for<'c> Fn(Cursor<'c>) -> Cursor<'c>>;

/// An open connection to a SQLite database.
///
/// Internally this is a thin `RefCell<InnerConnection>` around the raw
/// `sqlite3*`, split between `Connection` (the safe, `Send`-but-not-`Sync`
/// handle callers hold) and `InnerConnection` (the actual FFI state,
/// borrowed mutably only for the duration of one operation).
pub struct Connection {
    pub(crate) db: RefCell<InnerConnection>,
    cache: StmtCache,
    /// pid captured at `open` time; compared against the current pid on
    /// first use after a `fork()` so a child process gets a clear error
    /// instead of corrupting the parent's connection.
    owner_pid: libc::pid_t,
    /// Set once `close(force = true)` has run, or a non-force `close` has
    /// succeeded. Every other method checks this first so a closed handle
    /// fails fast with `Error::ConnectionClosedError` rather than touching a
    /// freed `sqlite3*`.
    closed: Cell<bool>,
    /// Count of live `Cursor`/`Blob`/`Backup` values borrowing this
    /// connection, tracked via [`DependentGuard`]. Rust's own borrow checker
    /// already rules out a dangling dependent for directly-held Rust
    /// references; this count exists for embeddings (e.g. a higher-level
    /// binding) that hand dependents to callers without preserving
    /// lifetimes, where `close` needs a runtime answer instead of a
    /// compile-time one.
    dependents: Cell<u32>,
    cursor_factory: RefCell<Option<CursorFactory>>,
}

unsafe impl Send for Connection {}

/// RAII registration of one live dependent (`Cursor`, `Blob`, or `Backup`)
/// against the `Connection` it borrows from. Held for the dependent's
/// entire lifetime so [`Connection::close`] can refuse (absent `force`) or
/// the dependent count can be inspected.
pub(crate) struct DependentGuard<'c> {
    conn: &'c Connection,
}

impl<'c> DependentGuard<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        conn.dependents.set(conn.dependents.get() + 1);
        DependentGuard { conn }
    }
}

impl Drop for DependentGuard<'_> {
    fn drop(&mut self) {
        self.conn.dependents.set(self.conn.dependents.get().saturating_sub(1));
    }
}

impl Connection {
    /// Opens a connection to a SQLite database file.
    ///
    /// If `path` does not exist, it is created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
        let flags = OpenFlags::default();
        Connection::open_with_flags(path, flags)
    }

    /// Opens an in-memory SQLite database.
    #[inline]
    pub fn open_in_memory() -> Result<Connection> {
        let flags = OpenFlags::default();
        Connection::open_in_memory_with_flags(flags)
    }

    /// Opens a connection to a SQLite database file using the specified
    /// flags.
    pub fn open_with_flags<P: AsRef<Path>>(path: P, flags: OpenFlags) -> Result<Connection> {
        let c_path = super::path_to_cstring(path.as_ref())?;
        Connection::open_raw(&c_path, flags, None)
    }

    /// Opens an in-memory SQLite database using the specified flags.
    #[inline]
    pub fn open_in_memory_with_flags(flags: OpenFlags) -> Result<Connection> {
        let c_memory = str_to_cstring(":memory:")?;
        Connection::open_raw(&c_memory, flags, None)
    }

    /// Opens a connection to a SQLite database using the specified flags and
    /// an explicit VFS name, failing with `Error::SqliteFailure` /
    /// `ffi::ErrorCode::CannotOpen` if `vfs` names an unregistered VFS.
    pub fn open_with_flags_and_vfs<P: AsRef<Path>>(
        path: P,
        flags: OpenFlags,
        vfs: &str,
    ) -> Result<Connection> {
        let c_path = super::path_to_cstring(path.as_ref())?;
        let c_vfs = str_to_cstring(vfs)?;
        Connection::open_raw(&c_path, flags, Some(&c_vfs))
    }

    /// Opens an in-memory SQLite database using the specified flags and an
    /// explicit VFS name.
    #[inline]
    pub fn open_in_memory_with_flags_and_vfs(flags: OpenFlags, vfs: &str) -> Result<Connection> {
        let c_memory = str_to_cstring(":memory:")?;
        let c_vfs = str_to_cstring(vfs)?;
        Connection::open_raw(&c_memory, flags, Some(&c_vfs))
    }

    fn open_raw(
        c_path: &CStr,
        flags: OpenFlags,
        vfs: Option<&CStr>,
    ) -> Result<Connection> {
        let db = InnerConnection::open_with_flags(c_path, flags, vfs)?;
        Ok(Connection {
            db: RefCell::new(db),
            cache: StmtCache::with_capacity(DEFAULT_STMT_CACHE_CAPACITY),
            owner_pid: unsafe { libc::getpid() },
            closed: Cell::new(false),
            dependents: Cell::new(0),
            cursor_factory: RefCell::new(None),
        })
    }

    /// Fails every subsequent operation with `Error::ForkingViolationError`
    /// if called from a process that is not the one that opened this
    /// connection (e.g. after `fork()` without `exec()`): a forked child
    /// inherits the parent's `sqlite3*`, but SQLite's own locking and
    /// mutexes aren't fork-safe, so the first post-fork use is rejected
    /// outright rather than risking silent corruption.
    fn check_fork(&self) -> Result<()> {
        if unsafe { libc::getpid() } != self.owner_pid {
            return Err(Error::ForkingViolationError);
        }
        Ok(())
    }

    /// Fails with `Error::ConnectionClosedError` once `close` has run.
    fn check_closed(&self) -> Result<()> {
        if self.closed.get() {
            return Err(Error::ConnectionClosedError);
        }
        Ok(())
    }

    /// Combines [`check_closed`](Self::check_closed) and
    /// [`check_fork`](Self::check_fork); every method that touches the
    /// underlying `sqlite3*` calls this first.
    fn check_usable(&self) -> Result<()> {
        self.check_closed()?;
        self.check_fork()?;
        Ok(())
    }

    /// Registers a [`cursor_factory`](Self::cursor) hook, consulted by
    /// [`cursor`](Self::cursor) to wrap or replace every `Cursor` it
    /// constructs. `None` removes a previously set factory.
    ///
    /// `execute`/`execute_many` intentionally do not consult this: they bind
    /// parameters straight onto a `Statement` via the typed `Params` trait
    /// and never construct a `Cursor` value, so there is nothing for the
    /// factory to wrap on that path.
    pub fn set_cursor_factory<F>(&self, factory: Option<F>)
    where
        F: for<'c> Fn(Cursor<'c>) -> Cursor<'c> + 'static,
    {
        *self.cursor_factory.borrow_mut() = factory.map(|f| Box::new(f) as CursorFactory);
    }

    pub(crate) fn run_cursor_factory<'c>(&self, cursor: Cursor<'c>) -> Cursor<'c> {
        match self.cursor_factory.borrow().as_ref() {
            Some(factory) => factory(cursor),
            None => cursor,
        }
    }

    /// Convenience method to run multiple SQL statements (that cannot take
    /// any parameters) at once, via `sqlite3_exec`-equivalent looped
    /// `execute`. Whitespace-only SQL and a trailing semicolon are accepted
    /// and yield no rows.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.check_usable()?;
        let mut sql = sql;
        while !sql.is_empty() {
            let stmt = self.prepare(sql)?;
            let tail = stmt.tail();
            if !stmt.stmt.is_null() {
                stmt.step_to_completion()?;
            }
            if tail == 0 || tail >= sql.len() {
                break;
            }
            sql = &sql[tail..];
        }
        Ok(())
    }

    /// Executes a single SQL statement, returning the number of rows
    /// changed.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.check_usable()?;
        self.prepare(sql)?.execute(params)
    }

    /// Prepares, binds, and executes `sql` once per entry of `params_seq`.
    pub fn execute_many<P, I>(&self, sql: &str, params_seq: I) -> Result<usize>
    where
        P: Params,
        I: IntoIterator<Item = P>,
    {
        self.check_usable()?;
        let mut stmt = self.prepare(sql)?;
        let mut total = 0;
        for params in params_seq {
            total += stmt.execute(params)?;
        }
        Ok(total)
    }

    /// Compiles the first SQL statement in `sql` into a fresh [`Statement`],
    /// ignoring the statement cache entirely.
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>> {
        self.check_usable()?;
        self.db.borrow_mut().prepare(self, sql)
    }

    /// Compiles `sql` with the given `sqlite3_prepare_v3` `prepFlags`,
    /// bypassing `InnerConnection::prepare`'s fixed `sqlite3_prepare_v2`
    /// path; used by [`StmtCache::get`](crate::stmt_cache::StmtCache::get)
    /// on both the hit and miss paths.
    pub(crate) fn prepare_with_flags(&self, sql: &str, prepare_flags: c_int) -> Result<RawStatement> {
        self.check_usable()?;
        let db = self.db.borrow();
        let (c_sql, len, _) = str_for_sqlite(sql.as_bytes())?;
        let mut c_stmt = ptr::null_mut();
        let mut c_tail = ptr::null();
        let r = if prepare_flags == 0 {
            unsafe {
                ffi::sqlite3_prepare_v2(
                    db.db(),
                    c_sql,
                    len,
                    &mut c_stmt as *mut *mut ffi::sqlite3_stmt,
                    &mut c_tail as *mut *const c_char,
                )
            }
        } else {
            unsafe {
                ffi::sqlite3_prepare_v3(
                    db.db(),
                    c_sql,
                    len,
                    prepare_flags as u32,
                    &mut c_stmt as *mut *mut ffi::sqlite3_stmt,
                    &mut c_tail as *mut *const c_char,
                )
            }
        };
        if r != ffi::SQLITE_OK {
            return Err(unsafe { error_with_offset(db.db(), r, sql) });
        }
        let tail = if c_tail.is_null() {
            0
        } else {
            let n = (c_tail as isize) - (c_sql as isize);
            if n <= 0 || n >= len as isize {
                0
            } else {
                n as usize
            }
        };
        Ok(unsafe { RawStatement::new(c_stmt, tail) })
    }

    /// Borrows a statement from the connection's cache, preparing a fresh
    /// one (with `can_cache = true`, `prepare_flags = 0`) on a miss.
    pub fn prepare_cached(&self, sql: &str) -> Result<CachedStatement<'_>> {
        self.prepare_cached_with(sql, 0, true)
    }

    /// As [`prepare_cached`](Self::prepare_cached), with explicit
    /// `prepare_flags`/`can_cache` control over SQLite's prepare flags and
    /// whether the resulting statement is returned to the cache on drop.
    pub fn prepare_cached_with(
        &self,
        sql: &str,
        prepare_flags: c_int,
        can_cache: bool,
    ) -> Result<CachedStatement<'_>> {
        self.check_usable()?;
        let raw = self.prepare_cached_raw(sql, prepare_flags, can_cache)?;
        Ok(CachedStatement::new(Statement::new(self, raw), self))
    }

    pub(crate) fn stmt_cache(&self) -> &StmtCache {
        &self.cache
    }

    /// Runs `sql` (with `params`) and calls `f` with the single expected
    /// result row.
    pub fn query_row<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<T>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> Result<T>,
    {
        self.prepare(sql)?.query_row(params, f)
    }

    /// As [`query_row`](Self::query_row), but `f` may return any error type
    /// that `Error` converts into, for callers folding query extraction into
    /// their own error type.
    pub fn query_row_and_then<T, E, P, F>(&self, sql: &str, params: P, f: F) -> std::result::Result<T, E>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut stmt = self.prepare(sql).map_err(E::from)?;
        let mut rows = stmt.query(params).map_err(E::from)?;
        let row = rows.get_expected_row().map_err(E::from)?;
        f(row)
    }

    /// Begins a new top-level (`DEFERRED`) transaction; taking `&mut self`
    /// statically rules out nesting two at once on the same connection.
    #[inline]
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Transaction::new(self, TransactionBehavior::Deferred)
    }

    #[inline]
    pub fn transaction_with_behavior(&mut self, behavior: TransactionBehavior) -> Result<Transaction<'_>> {
        Transaction::new(self, behavior)
    }

    /// Begins a new savepoint (nestable, unlike [`transaction`](Self::transaction)).
    #[inline]
    pub fn savepoint(&mut self) -> Result<Savepoint<'_>> {
        Savepoint::new(self)
    }

    #[inline]
    pub fn savepoint_with_name<T: Into<String>>(&mut self, name: T) -> Result<Savepoint<'_>> {
        Savepoint::with_name(self, name)
    }

    /// Closes the connection.
    ///
    /// If any `Cursor`, `Blob`, or `Backup` registered against this
    /// connection is still live, a non-force close fails with
    /// `Error::IncompleteExecutionError` and the connection remains open and
    /// usable. With `force = true`, the underlying `sqlite3*` is closed
    /// regardless; any still-live dependent's next operation then fails
    /// with its own closed-handle error (`Error::CursorClosedError`,
    /// `Error::VFSFileClosedError`, ...) instead of touching freed memory.
    ///
    /// Closing an already-closed connection is a no-op that returns `Ok(())`.
    pub fn close(&self, force: bool) -> Result<()> {
        if self.closed.get() {
            return Ok(());
        }
        if !force && self.dependents.get() > 0 {
            return Err(Error::IncompleteExecutionError);
        }
        self.db.borrow_mut().close()?;
        self.closed.set(true);
        Ok(())
    }

    #[inline]
    pub(crate) fn decode_result(&self, code: c_int) -> Result<()> {
        self.db.borrow().decode_result(code)
    }

    #[inline]
    pub fn last_insert_rowid(&self) -> i64 {
        self.db.borrow().last_insert_rowid()
    }

    #[inline]
    pub fn changes(&self) -> u64 {
        self.db.borrow().changes()
    }

    #[inline]
    pub fn is_autocommit(&self) -> bool {
        self.db.borrow().is_autocommit()
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        self.db.borrow().is_busy()
    }

    #[inline]
    pub fn db_readonly(&self, db_name: DatabaseName<'_>) -> Result<bool> {
        self.db.borrow().db_readonly(db_name)
    }

    #[cfg(feature = "modern_sqlite")]
    #[inline]
    pub fn txn_state(
        &self,
        db_name: Option<DatabaseName<'_>>,
    ) -> Result<crate::transaction::TransactionState> {
        self.db.borrow().txn_state(db_name)
    }

    #[inline]
    pub fn cache_flush(&self) -> Result<()> {
        self.db.borrow_mut().cache_flush()
    }

    #[cfg(feature = "release_memory")]
    #[inline]
    pub fn release_memory(&self) -> Result<()> {
        self.db.borrow().release_memory()
    }

    /// Returns a handle that can interrupt this connection's currently
    /// running operation from another thread, even after this `Connection`
    /// itself has been dropped.
    #[inline]
    pub fn get_interrupt_handle(&self) -> InterruptHandle {
        self.db.borrow().get_interrupt_handle()
    }

    /// Flushes the prepared-statement cache, finalizing every idle entry.
    #[inline]
    pub fn flush_prepared_statement_cache_now(&self) {
        self.cache.flush()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.db.borrow().db())
            .finish_non_exhaustive()
    }
}

impl Statement<'_> {
    /// Steps a statement with no caller-visible rows to completion, used by
    /// [`Connection::execute_batch`] on every sub-statement of a
    /// multi-statement script.
    fn step_to_completion(&self) -> Result<()> {
        while self.step()? {}
        Ok(())
    }
}

/// A `Statement` checked out of a [`Connection`]'s [`StmtCache`]. Returned to
/// the cache (rather than finalized) on drop, unless it was prepared with
/// `can_cache = false` or the cache has since been invalidated — see
/// [`StmtCache::release`](crate::stmt_cache::StmtCache::release).
pub struct CachedStatement<'conn> {
    stmt: Option<Statement<'conn>>,
    conn: &'conn Connection,
}

impl<'conn> CachedStatement<'conn> {
    fn new(stmt: Statement<'conn>, conn: &'conn Connection) -> CachedStatement<'conn> {
        CachedStatement {
            stmt: Some(stmt),
            conn,
        }
    }

    /// Discards this statement instead of returning it to the cache on
    /// drop, e.g. because a caller mutated schema objects it depends on.
    #[inline]
    pub fn discard(mut self) {
        self.stmt.take();
    }
}

impl<'conn> std::ops::Deref for CachedStatement<'conn> {
    type Target = Statement<'conn>;

    #[inline]
    fn deref(&self) -> &Statement<'conn> {
        self.stmt.as_ref().unwrap()
    }
}

impl<'conn> std::ops::DerefMut for CachedStatement<'conn> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Statement<'conn> {
        self.stmt.as_mut().unwrap()
    }
}

impl Drop for CachedStatement<'_> {
    fn drop(&mut self) {
        if let Some(stmt) = self.stmt.take() {
            let raw: RawStatement = stmt.into();
            self.conn.release_cached_raw(raw);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn open_and_query_row() {
        let db = Connection::open_in_memory().unwrap();
        let x: i64 = db.query_row("SELECT 1", [], |r| r.get(0)).unwrap();
        assert_eq!(x, 1);
    }

    #[test]
    fn execute_batch_runs_every_statement() {
        let db = Connection::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE t(x); INSERT INTO t VALUES (1); INSERT INTO t VALUES (2);")
            .unwrap();
        let n: i64 = db.query_row("SELECT count(*) FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn execute_many_runs_once_per_row() {
        let db = Connection::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE t(x)").unwrap();
        let rows = db
            .execute_many("INSERT INTO t (x) VALUES (?1)", vec![vec![1i64], vec![2i64], vec![3i64]])
            .unwrap();
        assert_eq!(rows, 3);
    }

    #[test]
    fn prepare_cached_returns_the_same_statement_cache_key() {
        let db = Connection::open_in_memory().unwrap();
        {
            let mut stmt = db.prepare_cached("SELECT 1").unwrap();
            stmt.query_row([], |r| r.get::<_, i64>(0)).unwrap();
        }
        let (stats, _) = db.cache_stats(false);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn close_then_use_fails() {
        let db = Connection::open_in_memory().unwrap();
        db.close(false).unwrap();
        assert!(matches!(
            db.execute_batch("SELECT 1"),
            Err(Error::ConnectionClosedError)
        ));
    }

    #[test]
    fn close_is_idempotent() {
        let db = Connection::open_in_memory().unwrap();
        db.close(false).unwrap();
        db.close(false).unwrap();
    }

    #[test]
    fn non_force_close_refuses_with_live_dependent() {
        let db = Connection::open_in_memory().unwrap();
        let cursor = db.cursor();
        assert!(matches!(
            db.close(false),
            Err(Error::IncompleteExecutionError)
        ));
        drop(cursor);
        db.close(false).unwrap();
    }

    #[test]
    fn force_close_succeeds_with_live_dependent() {
        let db = Connection::open_in_memory().unwrap();
        let _cursor = db.cursor();
        db.close(true).unwrap();
    }
}
