//! Create virtual tables.
//!
//! Follow these steps to create your own virtual table:
//! 1. Write implementations of `VTab` and `VTabCursor` (and `UpdateVTab` if
//!    the table is writable).
//! 2. Build a `Module` from those implementations with `read_only_module`,
//!    `eponymous_only_module`, or `update_module`.
//! 3. Register it with `Connection::create_module`.
//! 4. Run a `CREATE VIRTUAL TABLE` statement naming the module.
//!
//! (See [SQLite doc](http://sqlite.org/vtab.html))
use std::borrow::Cow::{self, Borrowed, Owned};
use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::slice;
use std::str;

use crate::context::set_result;
use crate::error::error_from_sqlite_code;
use crate::ffi;
pub use crate::ffi::{sqlite3_vtab, sqlite3_vtab_cursor};
use crate::types::{FromSql, FromSqlError, ToSql, ValueRef};
use crate::{str_to_cstring, Connection, Error, InnerConnection, Result};

// conn.create_module("module", &module, aux);
// conn.execute("CREATE VIRTUAL TABLE foo USING module(...)");
// \-> Module::xcreate -> VTab::connect -> conn.declare_vtab("CREATE TABLE foo (...)")
// stmt.query() -> VTab::best_index -> VTab::open -> VTabCursor::filter/next/eof/column/rowid

/// Virtual table module: the `sqlite3_module` vtable plus the Rust type it
/// dispatches to.
///
/// (See [SQLite doc](https://sqlite.org/c3ref/module.html))
#[repr(C)]
pub struct Module<T: VTab> {
    base: ffi::sqlite3_module,
    phantom: PhantomData<T>,
}

unsafe impl<T: VTab> Sync for Module<T> {}

/// Creates a read-only virtual table implementation: no `xUpdate`, no
/// transaction methods.
pub fn read_only_module<T: CreateVTab>(version: c_int) -> Module<T> {
    // xConnect and xCreate do the same thing, but they must be distinct
    // functions or the table is treated as eponymous.
    let ffi_module = ffi::sqlite3_module {
        iVersion: version,
        xCreate: Some(rust_create::<T>),
        xConnect: Some(rust_connect::<T>),
        xBestIndex: Some(rust_best_index::<T>),
        xDisconnect: Some(rust_disconnect::<T>),
        xDestroy: Some(rust_destroy::<T>),
        xOpen: Some(rust_open::<T>),
        xClose: Some(rust_close::<T::Cursor>),
        xFilter: Some(rust_filter::<T::Cursor>),
        xNext: Some(rust_next::<T::Cursor>),
        xEof: Some(rust_eof::<T::Cursor>),
        xColumn: Some(rust_column::<T::Cursor>),
        xRowid: Some(rust_rowid::<T::Cursor>),
        xUpdate: None,
        xBegin: None,
        xSync: None,
        xCommit: None,
        xRollback: None,
        xFindFunction: Some(rust_find_function::<T>),
        xRename: None,
        xSavepoint: None,
        xRelease: None,
        xRollbackTo: None,
    };
    Module {
        base: ffi_module,
        phantom: PhantomData::<T>,
    }
}

/// Creates an eponymous-only virtual table implementation: usable directly
/// as a table name with no `CREATE VIRTUAL TABLE` statement required.
pub fn eponymous_only_module<T: VTab>(version: c_int) -> Module<T> {
    let ffi_module = ffi::sqlite3_module {
        iVersion: version,
        xCreate: None,
        xConnect: Some(rust_connect::<T>),
        xBestIndex: Some(rust_best_index::<T>),
        xDisconnect: Some(rust_disconnect::<T>),
        xDestroy: None,
        xOpen: Some(rust_open::<T>),
        xClose: Some(rust_close::<T::Cursor>),
        xFilter: Some(rust_filter::<T::Cursor>),
        xNext: Some(rust_next::<T::Cursor>),
        xEof: Some(rust_eof::<T::Cursor>),
        xColumn: Some(rust_column::<T::Cursor>),
        xRowid: Some(rust_rowid::<T::Cursor>),
        xUpdate: None,
        xBegin: None,
        xSync: None,
        xCommit: None,
        xRollback: None,
        xFindFunction: Some(rust_find_function::<T>),
        xRename: None,
        xSavepoint: None,
        xRelease: None,
        xRollbackTo: None,
    };
    Module {
        base: ffi_module,
        phantom: PhantomData::<T>,
    }
}

/// Creates a writable virtual table implementation: `xUpdate`, the
/// transaction methods, and `xRename` are all wired to `T`'s `UpdateVTab`
/// impl (each with a default no-op unless overridden).
pub fn update_module<T: UpdateVTab>(version: c_int) -> Module<T> {
    let ffi_module = ffi::sqlite3_module {
        iVersion: version,
        xCreate: Some(rust_create::<T>),
        xConnect: Some(rust_connect::<T>),
        xBestIndex: Some(rust_best_index::<T>),
        xDisconnect: Some(rust_disconnect::<T>),
        xDestroy: Some(rust_destroy::<T>),
        xOpen: Some(rust_open::<T>),
        xClose: Some(rust_close::<T::Cursor>),
        xFilter: Some(rust_filter::<T::Cursor>),
        xNext: Some(rust_next::<T::Cursor>),
        xEof: Some(rust_eof::<T::Cursor>),
        xColumn: Some(rust_column::<T::Cursor>),
        xRowid: Some(rust_rowid::<T::Cursor>),
        xUpdate: Some(rust_update::<T>),
        xBegin: Some(rust_begin::<T>),
        xSync: Some(rust_sync::<T>),
        xCommit: Some(rust_commit::<T>),
        xRollback: Some(rust_rollback::<T>),
        xFindFunction: Some(rust_find_function::<T>),
        xRename: Some(rust_rename::<T>),
        xSavepoint: Some(rust_savepoint::<T>),
        xRelease: Some(rust_release::<T>),
        xRollbackTo: Some(rust_rollback_to::<T>),
    };
    Module {
        base: ffi_module,
        phantom: PhantomData::<T>,
    }
}

/// The `sqlite3*` handle a `VTab::connect`/`create` implementation is
/// handed; only used to call back into `declare_vtab`-adjacent APIs.
pub struct VTabConnection(*mut ffi::sqlite3);

impl VTabConnection {
    /// Raw access to the underlying connection handle.
    ///
    /// # Safety
    ///
    /// The caller must not do anything that would violate the invariants
    /// the owning `Connection` otherwise upholds (e.g. closing it).
    pub unsafe fn handle(&mut self) -> *mut ffi::sqlite3 {
        self.0
    }
}

/// Virtual table instance trait.
///
/// Implementations must be laid out like:
/// ```rust,ignore
/// #[repr(C)]
/// struct MyTab {
///    base: ffi::sqlite3_vtab, // must be first
///    // additional fields
/// }
/// ```
///
/// (See [SQLite doc](https://sqlite.org/c3ref/vtab.html))
pub trait VTab: Sized {
    type Aux;
    type Cursor: VTabCursor;

    /// Establishes a new connection to an existing virtual table.
    /// (See [SQLite doc](https://sqlite.org/vtab.html#the_xconnect_method))
    fn connect(
        db: &mut VTabConnection,
        aux: Option<&Self::Aux>,
        args: &[&[u8]],
    ) -> Result<(String, Self)>;

    /// Determines the best way to access the virtual table.
    /// (See [SQLite doc](https://sqlite.org/vtab.html#the_xbestindex_method))
    fn best_index(&self, info: &mut IndexInfo) -> Result<()>;

    /// Creates a new cursor used for accessing the virtual table.
    /// (See [SQLite doc](https://sqlite.org/vtab.html#the_xopen_method))
    fn open(&self) -> Result<Self::Cursor>;

    /// Overloads `fn_name`/`n_arg` for rows produced by this table.
    /// Returning `None` leaves SQLite's normal function resolution in
    /// place.
    /// (See [SQLite doc](https://sqlite.org/vtab.html#the_xfindfunction_method))
    fn find_function(
        &self,
        _fn_name: &str,
        _n_arg: c_int,
    ) -> Option<unsafe extern "C" fn(*mut ffi::sqlite3_context, c_int, *mut *mut ffi::sqlite3_value)>
    {
        None
    }
}

/// Non-eponymous virtual table instance trait.
///
/// (See [SQLite doc](https://sqlite.org/c3ref/vtab.html))
pub trait CreateVTab: VTab {
    /// Creates a new instance of a virtual table in response to a `CREATE
    /// VIRTUAL TABLE` statement. Calls `connect` by default.
    /// (See [SQLite doc](https://sqlite.org/vtab.html#the_xcreate_method))
    fn create(
        db: &mut VTabConnection,
        aux: Option<&Self::Aux>,
        args: &[&[u8]],
    ) -> Result<(String, Self)> {
        Self::connect(db, aux, args)
    }

    /// Destroys the underlying table implementation, undoing `create`. Does
    /// nothing by default.
    /// (See [SQLite doc](https://sqlite.org/vtab.html#the_xdestroy_method))
    fn destroy(&self) -> Result<()> {
        Ok(())
    }
}

/// A writable virtual table. `delete`/`insert`/`update` implement the three
/// shapes of `xUpdate`; `rename`/`begin`/`sync`/`commit`/`rollback` default
/// to no-ops and only need overriding when the table participates in those
/// protocols.
pub trait UpdateVTab: CreateVTab {
    /// Deletes the row with the given rowid.
    fn delete(&mut self, rowid: i64) -> Result<()>;

    /// Inserts a new row. `rowid` is the caller-supplied rowid, if any (a
    /// bare `INSERT` with no explicit rowid column leaves this `None`,
    /// meaning "auto-assign"). Returns the rowid of the inserted row.
    fn insert(&mut self, rowid: Option<i64>, args: &Values<'_>) -> Result<i64>;

    /// Updates the row currently keyed by `old_rowid`. If `new_rowid !=
    /// old_rowid` the row is re-keyed.
    fn update(&mut self, old_rowid: i64, new_rowid: i64, args: &Values<'_>) -> Result<()>;

    fn rename(&mut self, _new_name: &str) -> Result<()> {
        Ok(())
    }
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    fn savepoint(&mut self, _savepoint: c_int) -> Result<()> {
        Ok(())
    }
    fn release(&mut self, _savepoint: c_int) -> Result<()> {
        Ok(())
    }
    fn rollback_to(&mut self, _savepoint: c_int) -> Result<()> {
        Ok(())
    }
}

bitflags::bitflags! {
    /// Index constraint operator.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    #[repr(C)]
    pub struct IndexConstraintOp: std::os::raw::c_uchar {
        const SQLITE_INDEX_CONSTRAINT_EQ    = 2;
        const SQLITE_INDEX_CONSTRAINT_GT    = 4;
        const SQLITE_INDEX_CONSTRAINT_LE    = 8;
        const SQLITE_INDEX_CONSTRAINT_LT    = 16;
        const SQLITE_INDEX_CONSTRAINT_GE    = 32;
        const SQLITE_INDEX_CONSTRAINT_MATCH = 64;
    }
}

/// Passes information into, and receives the reply from, `VTab::best_index`.
///
/// (See [SQLite doc](http://sqlite.org/c3ref/index_info.html))
pub struct IndexInfo(*mut ffi::sqlite3_index_info);

impl IndexInfo {
    /// WHERE-clause constraints.
    pub fn constraints(&self) -> IndexConstraintIter<'_> {
        let constraints =
            unsafe { slice::from_raw_parts((*self.0).aConstraint, (*self.0).nConstraint as usize) };
        IndexConstraintIter {
            iter: constraints.iter(),
        }
    }

    /// ORDER BY clause terms.
    pub fn order_bys(&self) -> OrderByIter<'_> {
        let order_bys =
            unsafe { slice::from_raw_parts((*self.0).aOrderBy, (*self.0).nOrderBy as usize) };
        OrderByIter {
            iter: order_bys.iter(),
        }
    }

    /// Number of terms in the ORDER BY clause.
    pub fn num_of_order_by(&self) -> usize {
        unsafe { (*self.0).nOrderBy as usize }
    }

    pub fn constraint_usage(&mut self, constraint_idx: usize) -> IndexConstraintUsage<'_> {
        let constraint_usages = unsafe {
            slice::from_raw_parts_mut((*self.0).aConstraintUsage, (*self.0).nConstraint as usize)
        };
        IndexConstraintUsage(&mut constraint_usages[constraint_idx])
    }

    /// Sets the number used to identify the index.
    pub fn set_idx_num(&mut self, idx_num: c_int) {
        unsafe {
            (*self.0).idxNum = idx_num;
        }
    }

    /// Marks output as already ordered.
    pub fn set_order_by_consumed(&mut self, order_by_consumed: bool) {
        unsafe {
            (*self.0).orderByConsumed = c_int::from(order_by_consumed);
        }
    }

    /// Sets the estimated cost of using this index.
    pub fn set_estimated_cost(&mut self, estimated_cost: f64) {
        unsafe {
            (*self.0).estimatedCost = estimated_cost;
        }
    }

}

pub struct IndexConstraintIter<'a> {
    iter: slice::Iter<'a, ffi::Struct_sqlite3_index_constraint>,
}

impl<'a> Iterator for IndexConstraintIter<'a> {
    type Item = IndexConstraint<'a>;

    fn next(&mut self) -> Option<IndexConstraint<'a>> {
        self.iter.next().map(IndexConstraint)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

/// WHERE clause constraint.
pub struct IndexConstraint<'a>(&'a ffi::Struct_sqlite3_index_constraint);

impl IndexConstraint<'_> {
    /// Column constrained; -1 for ROWID.
    pub fn column(&self) -> c_int {
        self.0.iColumn
    }

    /// Constraint operator.
    pub fn operator(&self) -> IndexConstraintOp {
        IndexConstraintOp::from_bits_truncate(self.0.op)
    }

    /// True if this constraint is usable.
    pub fn is_usable(&self) -> bool {
        self.0.usable != 0
    }
}

/// Tells SQLite which parameters to pass to `VTabCursor::filter`.
pub struct IndexConstraintUsage<'a>(&'a mut ffi::Struct_sqlite3_index_constraint_usage);

impl IndexConstraintUsage<'_> {
    /// If `argv_index > 0`, this constraint is part of `argv` passed to
    /// `VTabCursor::filter`.
    pub fn set_argv_index(&mut self, argv_index: c_int) {
        self.0.argvIndex = argv_index;
    }

    /// If `omit`, SQLite need not re-check this constraint itself.
    pub fn set_omit(&mut self, omit: bool) {
        self.0.omit = u8::from(omit);
    }
}

pub struct OrderByIter<'a> {
    iter: slice::Iter<'a, ffi::Struct_sqlite3_index_orderby>,
}

impl<'a> Iterator for OrderByIter<'a> {
    type Item = OrderBy<'a>;

    fn next(&mut self) -> Option<OrderBy<'a>> {
        self.iter.next().map(OrderBy)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

/// A column of the ORDER BY clause.
pub struct OrderBy<'a>(&'a ffi::Struct_sqlite3_index_orderby);

impl OrderBy<'_> {
    pub fn column(&self) -> c_int {
        self.0.iColumn
    }

    /// True for DESC, false for ASC.
    pub fn is_order_by_desc(&self) -> bool {
        self.0.desc != 0
    }
}

/// Virtual table cursor trait.
///
/// Implementations must be laid out like:
/// ```rust,ignore
/// #[repr(C)]
/// struct MyTabCursor {
///    base: ffi::sqlite3_vtab_cursor, // must be first
///    // additional fields
/// }
/// ```
///
/// (See [SQLite doc](https://sqlite.org/c3ref/vtab_cursor.html))
pub trait VTabCursor: Sized {
    /// Begins a search of the virtual table.
    /// (See [SQLite doc](https://sqlite.org/vtab.html#the_xfilter_method))
    fn filter(&mut self, idx_num: c_int, idx_str: Option<&str>, args: &Values<'_>) -> Result<()>;

    /// Advances the cursor to the next row of the result set started by
    /// `filter`.
    fn next(&mut self) -> Result<()>;

    /// `true` once the cursor has moved past the last row.
    fn eof(&self) -> bool;

    /// Finds the value of the `i`-th column (zero-based) of the current row.
    fn column(&self, ctx: &mut Context, i: c_int) -> Result<()>;

    /// Returns the rowid of the row the cursor currently points at.
    fn rowid(&self) -> Result<i64>;
}

/// Used by `VTabCursor::column` to set the cell value.
pub struct Context(*mut ffi::sqlite3_context);

impl Context {
    pub fn set_result<T: ToSql>(&mut self, value: &T) -> Result<()> {
        let t = value.to_sql()?;
        unsafe { set_result(self.0, &t) };
        Ok(())
    }
}

/// Wraps `VTabCursor::filter`'s `args`, the values `VTab::best_index` asked
/// to receive, and the column values an `UpdateVTab::insert`/`update` call
/// is given.
pub struct Values<'a> {
    args: &'a [*mut ffi::sqlite3_value],
}

impl Values<'_> {
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn get<T: FromSql>(&self, idx: usize) -> Result<T> {
        let arg = self.args[idx];
        let value = unsafe { ValueRef::from_value(arg) };
        FromSql::column_result(value).map_err(|err| match err {
            FromSqlError::InvalidType => Error::InvalidFilterParameterType(idx, value.data_type()),
            FromSqlError::OutOfRange(i) => Error::IntegralValueOutOfRange(idx, i),
            FromSqlError::Other(err) => {
                Error::FromSqlConversionFailure(idx, value.data_type(), err)
            }
            FromSqlError::InvalidBlobSize { .. } => {
                Error::FromSqlConversionFailure(idx, value.data_type(), Box::new(err))
            }
        })
    }

    pub fn iter(&self) -> ValueIter<'_> {
        ValueIter {
            iter: self.args.iter(),
        }
    }
}

impl<'a> IntoIterator for &'a Values<'a> {
    type IntoIter = ValueIter<'a>;
    type Item = ValueRef<'a>;

    fn into_iter(self) -> ValueIter<'a> {
        self.iter()
    }
}

pub struct ValueIter<'a> {
    iter: slice::Iter<'a, *mut ffi::sqlite3_value>,
}

impl<'a> Iterator for ValueIter<'a> {
    type Item = ValueRef<'a>;

    fn next(&mut self) -> Option<ValueRef<'a>> {
        self.iter
            .next()
            .map(|&raw| unsafe { ValueRef::from_value(raw) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

impl Connection {
    /// Registers a virtual table module.
    pub fn create_module<T: VTab>(
        &self,
        module_name: &str,
        module: &Module<T>,
        aux: Option<T::Aux>,
    ) -> Result<()> {
        self.db.borrow_mut().create_module(module_name, module, aux)
    }
}

impl InnerConnection {
    fn create_module<T: VTab>(
        &mut self,
        module_name: &str,
        module: &Module<T>,
        aux: Option<T::Aux>,
    ) -> Result<()> {
        let c_name = str_to_cstring(module_name)?;
        let r = match aux {
            Some(aux) => {
                let boxed_aux: *mut T::Aux = Box::into_raw(Box::new(aux));
                unsafe {
                    ffi::sqlite3_create_module_v2(
                        self.db(),
                        c_name.as_ptr(),
                        &module.base,
                        boxed_aux.cast(),
                        Some(free_boxed_value::<T::Aux>),
                    )
                }
            }
            None => unsafe {
                ffi::sqlite3_create_module_v2(
                    self.db(),
                    c_name.as_ptr(),
                    &module.base,
                    ptr::null_mut(),
                    None,
                )
            },
        };
        self.decode_result(r)
    }
}

/// Escapes double-quote (`"`) occurrences by doubling them.
pub fn escape_double_quote(identifier: &str) -> Cow<'_, str> {
    if identifier.contains('"') {
        Owned(identifier.replace('"', "\"\""))
    } else {
        Borrowed(identifier)
    }
}

/// Strips a single layer of matching quotes, if present.
pub fn dequote(s: &str) -> &str {
    if s.len() < 2 {
        return s;
    }
    match s.bytes().next() {
        Some(b) if b == b'"' || b == b'\'' => match s.bytes().next_back() {
            Some(e) if e == b => &s[1..s.len() - 1],
            _ => s,
        },
        _ => s,
    }
}

/// Parses one of `1/0`, `yes/no`, `on/off`, `true/false` (case-insensitive).
pub fn parse_boolean(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("yes")
        || s.eq_ignore_ascii_case("on")
        || s.eq_ignore_ascii_case("true")
        || s == "1"
    {
        Some(true)
    } else if s.eq_ignore_ascii_case("no")
        || s.eq_ignore_ascii_case("off")
        || s.eq_ignore_ascii_case("false")
        || s == "0"
    {
        Some(false)
    } else {
        None
    }
}

unsafe extern "C" fn free_boxed_value<T>(p: *mut c_void) {
    drop(Box::from_raw(p.cast::<T>()));
}

unsafe extern "C" fn rust_create<T>(
    db: *mut ffi::sqlite3,
    aux: *mut c_void,
    argc: c_int,
    argv: *const *const c_char,
    pp_vtab: *mut *mut ffi::sqlite3_vtab,
    err_msg: *mut *mut c_char,
) -> c_int
where
    T: CreateVTab,
{
    let mut conn = VTabConnection(db);
    let aux = aux.cast::<T::Aux>();
    let args = slice::from_raw_parts(argv, argc as usize);
    let vec = args
        .iter()
        .map(|&cs| CStr::from_ptr(cs).to_bytes())
        .collect::<Vec<_>>();
    match T::create(&mut conn, aux.as_ref(), &vec[..]) {
        Ok((sql, vtab)) => match CString::new(sql) {
            Ok(c_sql) => {
                let rc = ffi::sqlite3_declare_vtab(db, c_sql.as_ptr());
                if rc == ffi::SQLITE_OK {
                    let boxed_vtab: *mut T = Box::into_raw(Box::new(vtab));
                    *pp_vtab = boxed_vtab.cast();
                    ffi::SQLITE_OK
                } else {
                    let err = error_from_sqlite_code(rc, None);
                    *err_msg = mprintf(&err.to_string());
                    rc
                }
            }
            Err(err) => {
                *err_msg = mprintf(&err.to_string());
                ffi::SQLITE_ERROR
            }
        },
        Err(Error::SqliteFailure(err, s)) => {
            if let Some(s) = s {
                *err_msg = mprintf(&s);
            }
            err.extended_code
        }
        Err(err) => {
            *err_msg = mprintf(&err.to_string());
            ffi::SQLITE_ERROR
        }
    }
}

unsafe extern "C" fn rust_connect<T>(
    db: *mut ffi::sqlite3,
    aux: *mut c_void,
    argc: c_int,
    argv: *const *const c_char,
    pp_vtab: *mut *mut ffi::sqlite3_vtab,
    err_msg: *mut *mut c_char,
) -> c_int
where
    T: VTab,
{
    let mut conn = VTabConnection(db);
    let aux = aux.cast::<T::Aux>();
    let args = slice::from_raw_parts(argv, argc as usize);
    let vec = args
        .iter()
        .map(|&cs| CStr::from_ptr(cs).to_bytes())
        .collect::<Vec<_>>();
    match T::connect(&mut conn, aux.as_ref(), &vec[..]) {
        Ok((sql, vtab)) => match CString::new(sql) {
            Ok(c_sql) => {
                let rc = ffi::sqlite3_declare_vtab(db, c_sql.as_ptr());
                if rc == ffi::SQLITE_OK {
                    let boxed_vtab: *mut T = Box::into_raw(Box::new(vtab));
                    *pp_vtab = boxed_vtab.cast();
                    ffi::SQLITE_OK
                } else {
                    let err = error_from_sqlite_code(rc, None);
                    *err_msg = mprintf(&err.to_string());
                    rc
                }
            }
            Err(err) => {
                *err_msg = mprintf(&err.to_string());
                ffi::SQLITE_ERROR
            }
        },
        Err(Error::SqliteFailure(err, s)) => {
            if let Some(s) = s {
                *err_msg = mprintf(&s);
            }
            err.extended_code
        }
        Err(err) => {
            *err_msg = mprintf(&err.to_string());
            ffi::SQLITE_ERROR
        }
    }
}

unsafe extern "C" fn rust_best_index<T>(
    vtab: *mut ffi::sqlite3_vtab,
    info: *mut ffi::sqlite3_index_info,
) -> c_int
where
    T: VTab,
{
    let vt = vtab.cast::<T>();
    let mut idx_info = IndexInfo(info);
    vtab_result(vtab, (*vt).best_index(&mut idx_info))
}

unsafe extern "C" fn rust_disconnect<T>(vtab: *mut ffi::sqlite3_vtab) -> c_int
where
    T: VTab,
{
    if vtab.is_null() {
        return ffi::SQLITE_OK;
    }
    drop(Box::from_raw(vtab.cast::<T>()));
    ffi::SQLITE_OK
}

unsafe extern "C" fn rust_destroy<T>(vtab: *mut ffi::sqlite3_vtab) -> c_int
where
    T: CreateVTab,
{
    if vtab.is_null() {
        return ffi::SQLITE_OK;
    }
    let vt = vtab.cast::<T>();
    match (*vt).destroy() {
        Ok(()) => {
            drop(Box::from_raw(vt));
            ffi::SQLITE_OK
        }
        Err(Error::SqliteFailure(err, s)) => {
            if let Some(err_msg) = s {
                set_err_msg(vtab, &err_msg);
            }
            err.extended_code
        }
        Err(err) => {
            set_err_msg(vtab, &err.to_string());
            ffi::SQLITE_ERROR
        }
    }
}

unsafe extern "C" fn rust_open<T>(
    vtab: *mut ffi::sqlite3_vtab,
    pp_cursor: *mut *mut ffi::sqlite3_vtab_cursor,
) -> c_int
where
    T: VTab,
{
    let vt = vtab.cast::<T>();
    match (*vt).open() {
        Ok(cursor) => {
            let boxed_cursor: *mut T::Cursor = Box::into_raw(Box::new(cursor));
            *pp_cursor = boxed_cursor.cast();
            ffi::SQLITE_OK
        }
        Err(Error::SqliteFailure(err, s)) => {
            if let Some(err_msg) = s {
                set_err_msg(vtab, &err_msg);
            }
            err.extended_code
        }
        Err(err) => {
            set_err_msg(vtab, &err.to_string());
            ffi::SQLITE_ERROR
        }
    }
}

unsafe extern "C" fn rust_close<C>(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int
where
    C: VTabCursor,
{
    drop(Box::from_raw(cursor.cast::<C>()));
    ffi::SQLITE_OK
}

unsafe extern "C" fn rust_filter<C>(
    cursor: *mut ffi::sqlite3_vtab_cursor,
    idx_num: c_int,
    idx_str: *const c_char,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) -> c_int
where
    C: VTabCursor,
{
    let idx_name = if idx_str.is_null() {
        None
    } else {
        Some(str::from_utf8_unchecked(CStr::from_ptr(idx_str).to_bytes()))
    };
    let args = slice::from_raw_parts_mut(argv, argc as usize);
    let values = Values { args };
    let cr = cursor.cast::<C>();
    cursor_error(cursor, (*cr).filter(idx_num, idx_name, &values))
}

unsafe extern "C" fn rust_next<C>(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int
where
    C: VTabCursor,
{
    let cr = cursor.cast::<C>();
    cursor_error(cursor, (*cr).next())
}

unsafe extern "C" fn rust_eof<C>(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int
where
    C: VTabCursor,
{
    let cr = cursor.cast::<C>();
    c_int::from((*cr).eof())
}

unsafe extern "C" fn rust_column<C>(
    cursor: *mut ffi::sqlite3_vtab_cursor,
    ctx: *mut ffi::sqlite3_context,
    i: c_int,
) -> c_int
where
    C: VTabCursor,
{
    let cr = cursor.cast::<C>();
    let mut ctxt = Context(ctx);
    result_error(ctx, (*cr).column(&mut ctxt, i))
}

unsafe extern "C" fn rust_rowid<C>(
    cursor: *mut ffi::sqlite3_vtab_cursor,
    p_rowid: *mut ffi::sqlite3_int64,
) -> c_int
where
    C: VTabCursor,
{
    let cr = cursor.cast::<C>();
    match (*cr).rowid() {
        Ok(rowid) => {
            *p_rowid = rowid;
            ffi::SQLITE_OK
        }
        err => cursor_error(cursor, err),
    }
}

unsafe extern "C" fn rust_update<T>(
    vtab: *mut ffi::sqlite3_vtab,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
    p_rowid: *mut ffi::sqlite3_int64,
) -> c_int
where
    T: UpdateVTab,
{
    let vt = vtab.cast::<T>();
    let args = slice::from_raw_parts(argv, argc as usize);
    let result: Result<Option<i64>> = if argc == 1 {
        (*vt)
            .delete(ffi::sqlite3_value_int64(args[0]))
            .map(|()| None)
    } else {
        let values = Values { args: &args[2..] };
        if ffi::sqlite3_value_type(args[0]) == ffi::SQLITE_NULL {
            let rowid_hint = if ffi::sqlite3_value_type(args[1]) == ffi::SQLITE_NULL {
                None
            } else {
                Some(ffi::sqlite3_value_int64(args[1]))
            };
            (*vt).insert(rowid_hint, &values).map(Some)
        } else {
            let old_rowid = ffi::sqlite3_value_int64(args[0]);
            let new_rowid = ffi::sqlite3_value_int64(args[1]);
            (*vt)
                .update(old_rowid, new_rowid, &values)
                .map(|()| None)
        }
    };
    match result {
        Ok(rowid) => {
            if let Some(rowid) = rowid {
                *p_rowid = rowid;
            }
            ffi::SQLITE_OK
        }
        Err(Error::SqliteFailure(err, s)) => {
            if let Some(msg) = s {
                set_err_msg(vtab, &msg);
            }
            err.extended_code
        }
        Err(err) => {
            set_err_msg(vtab, &err.to_string());
            ffi::SQLITE_ERROR
        }
    }
}

unsafe extern "C" fn rust_begin<T: UpdateVTab>(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    vtab_result(vtab, (*vtab.cast::<T>()).begin())
}

unsafe extern "C" fn rust_sync<T: UpdateVTab>(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    vtab_result(vtab, (*vtab.cast::<T>()).sync())
}

unsafe extern "C" fn rust_commit<T: UpdateVTab>(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    vtab_result(vtab, (*vtab.cast::<T>()).commit())
}

unsafe extern "C" fn rust_rollback<T: UpdateVTab>(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    vtab_result(vtab, (*vtab.cast::<T>()).rollback())
}

unsafe extern "C" fn rust_rename<T: UpdateVTab>(
    vtab: *mut ffi::sqlite3_vtab,
    z_new: *const c_char,
) -> c_int {
    let name = CStr::from_ptr(z_new).to_string_lossy();
    vtab_result(vtab, (*vtab.cast::<T>()).rename(&name))
}

unsafe extern "C" fn rust_savepoint<T: UpdateVTab>(
    vtab: *mut ffi::sqlite3_vtab,
    savepoint: c_int,
) -> c_int {
    vtab_result(vtab, (*vtab.cast::<T>()).savepoint(savepoint))
}

unsafe extern "C" fn rust_release<T: UpdateVTab>(
    vtab: *mut ffi::sqlite3_vtab,
    savepoint: c_int,
) -> c_int {
    vtab_result(vtab, (*vtab.cast::<T>()).release(savepoint))
}

unsafe extern "C" fn rust_rollback_to<T: UpdateVTab>(
    vtab: *mut ffi::sqlite3_vtab,
    savepoint: c_int,
) -> c_int {
    vtab_result(vtab, (*vtab.cast::<T>()).rollback_to(savepoint))
}

unsafe extern "C" fn rust_find_function<T: VTab>(
    vtab: *mut ffi::sqlite3_vtab,
    n_arg: c_int,
    z_name: *const c_char,
    px_func: *mut Option<
        unsafe extern "C" fn(*mut ffi::sqlite3_context, c_int, *mut *mut ffi::sqlite3_value),
    >,
    _pp_arg: *mut *mut c_void,
) -> c_int {
    let vt = &*vtab.cast::<T>();
    let name = CStr::from_ptr(z_name).to_string_lossy();
    match vt.find_function(&name, n_arg) {
        Some(func) => {
            *px_func = Some(func);
            1
        }
        None => 0,
    }
}

/// Virtual table methods set an error message by assigning `zErrMsg`.
unsafe fn set_err_msg(vtab: *mut ffi::sqlite3_vtab, err_msg: &str) {
    if !(*vtab).zErrMsg.is_null() {
        ffi::sqlite3_free((*vtab).zErrMsg.cast());
    }
    (*vtab).zErrMsg = mprintf(err_msg);
}

/// Maps a `Result` from a table-level method (not cursor- or
/// context-scoped) to the `sqlite3_vtab`-style error-reporting protocol.
unsafe fn vtab_result<T>(vtab: *mut ffi::sqlite3_vtab, result: Result<T>) -> c_int {
    match result {
        Ok(_) => ffi::SQLITE_OK,
        Err(Error::SqliteFailure(err, s)) => {
            if let Some(err_msg) = s {
                set_err_msg(vtab, &err_msg);
            }
            err.extended_code
        }
        Err(err) => {
            set_err_msg(vtab, &err.to_string());
            ffi::SQLITE_ERROR
        }
    }
}

/// Virtual table cursors set an error message the same way, scoped to the
/// cursor's owning vtab.
unsafe fn cursor_error<T>(cursor: *mut ffi::sqlite3_vtab_cursor, result: Result<T>) -> c_int {
    vtab_result((*cursor).pVtab, result)
}

/// `column` raises an error by setting the error message on the active
/// `sqlite3_context` and returning the error code.
unsafe fn result_error<T>(ctx: *mut ffi::sqlite3_context, result: Result<T>) -> c_int {
    match result {
        Ok(_) => ffi::SQLITE_OK,
        Err(Error::SqliteFailure(err, s)) => {
            match err.extended_code {
                ffi::SQLITE_TOOBIG => ffi::sqlite3_result_error_toobig(ctx),
                ffi::SQLITE_NOMEM => ffi::sqlite3_result_error_nomem(ctx),
                code => {
                    ffi::sqlite3_result_error_code(ctx, code);
                    if let Some(Ok(cstr)) = s.map(|s| str_to_cstring(&s)) {
                        ffi::sqlite3_result_error(ctx, cstr.as_ptr(), -1);
                    }
                }
            };
            err.extended_code
        }
        Err(err) => {
            ffi::sqlite3_result_error_code(ctx, ffi::SQLITE_ERROR);
            if let Ok(cstr) = str_to_cstring(&err.to_string()) {
                ffi::sqlite3_result_error(ctx, cstr.as_ptr(), -1);
            }
            ffi::SQLITE_ERROR
        }
    }
}

// Space for this error message must come from an SQLite memory allocator.
fn mprintf(err_msg: &str) -> *mut c_char {
    let c_format = CString::new("%s").unwrap();
    let c_err = CString::new(err_msg.replace('\0', "")).unwrap();
    unsafe { ffi::sqlite3_mprintf(c_format.as_ptr(), c_err.as_ptr()) }
}

#[cfg(test)]
mod test {
    #[test]
    fn test_dequote() {
        assert_eq!("", super::dequote(""));
        assert_eq!("'", super::dequote("'"));
        assert_eq!("\"", super::dequote("\""));
        assert_eq!("'\"", super::dequote("'\""));
        assert_eq!("", super::dequote("''"));
        assert_eq!("", super::dequote("\"\""));
        assert_eq!("x", super::dequote("'x'"));
        assert_eq!("x", super::dequote("\"x\""));
        assert_eq!("x", super::dequote("x"));
    }

    #[test]
    fn test_parse_boolean() {
        assert_eq!(None, super::parse_boolean(""));
        assert_eq!(Some(true), super::parse_boolean("1"));
        assert_eq!(Some(true), super::parse_boolean("yes"));
        assert_eq!(Some(true), super::parse_boolean("on"));
        assert_eq!(Some(true), super::parse_boolean("true"));
        assert_eq!(Some(false), super::parse_boolean("0"));
        assert_eq!(Some(false), super::parse_boolean("no"));
        assert_eq!(Some(false), super::parse_boolean("off"));
        assert_eq!(Some(false), super::parse_boolean("false"));
    }
}
