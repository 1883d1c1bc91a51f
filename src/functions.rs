//! Scalar, aggregate, and window SQL function registration.
//!
//! Every callback shape here is a trampoline around a boxed Rust closure or
//! trait object, following the same boxed-closure/`xDestroy` pattern
//! `hooks.rs` and `collation.rs` use for their own registrations. Panics
//! crossing the FFI boundary are caught by [`crate::dispatch::guarded`].

use std::os::raw::{c_int, c_void};
use std::panic::{catch_unwind, RefUnwindSafe};
use std::ptr;
use std::slice;

use crate::context::{report_error, set_result};
use crate::dispatch::guarded;
use crate::types::{FromSql, FromSqlError, ToSql, ValueRef};
use crate::{ffi, str_to_cstring, Connection, Error, InnerConnection, Result};

bitflags::bitflags! {
    /// Flags passed to `sqlite3_create_function_v2`/`sqlite3_create_window_function`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FunctionFlags: c_int {
        /// The function always returns the same result for the same
        /// arguments within one statement. Enables constant folding.
        const SQLITE_DETERMINISTIC = ffi::SQLITE_DETERMINISTIC;
        /// The function may only be invoked from top-level SQL, not from
        /// triggers, views, or schema-bound expressions.
        const SQLITE_DIRECTONLY = ffi::SQLITE_DIRECTONLY;
        /// The function is believed to be free of side effects even when
        /// driven by untrusted input, such as a CHECK constraint.
        const SQLITE_INNOCUOUS = ffi::SQLITE_INNOCUOUS;
    }
}

impl Default for FunctionFlags {
    fn default() -> Self {
        FunctionFlags::empty()
    }
}

/// One scalar/step/value/inverse call's worth of SQL arguments.
pub struct Context<'a> {
    ctx: *mut ffi::sqlite3_context,
    args: &'a [*mut ffi::sqlite3_value],
}

impl Context<'_> {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Borrowed access to argument `idx` without any conversion.
    pub fn get_raw(&self, idx: usize) -> ValueRef<'_> {
        unsafe { ValueRef::from_value(self.args[idx]) }
    }

    /// Converts argument `idx` to `T`, mapping a conversion failure to
    /// `Error::InvalidFunctionParameterType` (except when `T::column_result`
    /// raised `FromSqlError::Other`, whose cause is preserved as-is).
    pub fn get<T: FromSql>(&self, idx: usize) -> Result<T> {
        let value = self.get_raw(idx);
        T::column_result(value).map_err(|err| match err {
            FromSqlError::Other(err) => Error::UserFunctionError(err),
            _ => Error::InvalidFunctionParameterType(idx, value.data_type()),
        })
    }

    #[must_use]
    pub fn as_ptr(&self) -> *mut ffi::sqlite3_context {
        self.ctx
    }
}

unsafe fn context_args<'a>(
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) -> &'a [*mut ffi::sqlite3_value] {
    if argc == 0 {
        &[]
    } else {
        slice::from_raw_parts(argv, argc as usize)
    }
}

/// Per-invocation scratch state for an aggregate or window function.
///
/// Backed by `sqlite3_aggregate_context`'s zero-initialized buffer, sized
/// only to hold a pointer; the pointed-to `A` is lazily heap-allocated on
/// first use and freed when `finalize`/`value` tears it down. This avoids
/// relying on `Option<A>`'s niche layout, which isn't guaranteed for an
/// arbitrary `A`.
struct AggregateState<A> {
    ctx: *mut ffi::sqlite3_context,
    _marker: std::marker::PhantomData<A>,
}

impl<A: Default> AggregateState<A> {
    unsafe fn slot(ctx: *mut ffi::sqlite3_context) -> *mut *mut A {
        let p = ffi::sqlite3_aggregate_context(ctx, std::mem::size_of::<*mut A>() as c_int);
        p.cast::<*mut A>()
    }

    /// Returns the live state, allocating a fresh `A::default()` on the
    /// first call for this group.
    unsafe fn get_or_init(ctx: *mut ffi::sqlite3_context) -> &'static mut A {
        let slot = Self::slot(ctx);
        assert!(!slot.is_null(), "sqlite3_aggregate_context: out of memory");
        if (*slot).is_null() {
            *slot = Box::into_raw(Box::new(A::default()));
        }
        &mut **slot
    }

    /// Takes ownership of the state (if `step` ever ran), clearing the slot.
    unsafe fn take(ctx: *mut ffi::sqlite3_context) -> Option<A> {
        let slot = Self::slot(ctx);
        if slot.is_null() || (*slot).is_null() {
            return None;
        }
        let state = Box::from_raw(*slot);
        *slot = ptr::null_mut();
        Some(*state)
    }
}

/// A scalar SQL function: one call, one result, no carried state.
pub trait ScalarFunction: Send + RefUnwindSafe {
    fn call(&self, ctx: &Context<'_>) -> Result<Box<dyn ToSql>>;
}

impl<F> ScalarFunction for F
where
    F: Fn(&Context<'_>) -> Result<Box<dyn ToSql>> + Send + RefUnwindSafe,
{
    fn call(&self, ctx: &Context<'_>) -> Result<Box<dyn ToSql>> {
        self(ctx)
    }
}

/// An aggregate SQL function: `step` folds one row into `A`, `finalize`
/// reduces the (possibly absent, for an empty group) accumulated state to a
/// result.
pub trait AggregateFunction<A: Default>: Send + RefUnwindSafe {
    fn step(&self, ctx: &Context<'_>, state: &mut A) -> Result<()>;
    fn finalize(&self, state: Option<A>) -> Result<Box<dyn ToSql>>;
}

/// A window function additionally supports `value` (read the current
/// result without finalizing) and `inverse` (undo a row sliding out of the
/// window frame). Requires `sqlite3_create_window_function` (SQLite 3.25+).
#[cfg(feature = "window")]
pub trait WindowFunction<A: Default>: AggregateFunction<A> {
    fn value(&self, state: Option<&mut A>) -> Result<Box<dyn ToSql>>;
    fn inverse(&self, ctx: &Context<'_>, state: &mut A) -> Result<()>;
}

unsafe extern "C" fn call_scalar<F>(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) where
    F: ScalarFunction,
{
    guarded((), || {
        let f = &*(ffi::sqlite3_user_data(ctx).cast::<F>());
        let args = Context {
            ctx,
            args: context_args(argc, argv),
        };
        match catch_unwind(|| f.call(&args)) {
            Ok(Ok(value)) => match value.to_sql() {
                Ok(out) => set_result(ctx, &out),
                Err(err) => report_error(ctx, &err),
            },
            Ok(Err(err)) => report_error(ctx, &err),
            Err(_) => report_error(ctx, &Error::UnwindingPanic),
        }
    })
}

unsafe extern "C" fn step_aggregate<A, F>(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) where
    A: Default,
    F: AggregateFunction<A>,
{
    guarded((), || {
        let f = &*(ffi::sqlite3_user_data(ctx).cast::<F>());
        let args = Context {
            ctx,
            args: context_args(argc, argv),
        };
        let state = AggregateState::<A>::get_or_init(ctx);
        match catch_unwind(std::panic::AssertUnwindSafe(|| f.step(&args, state))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => report_error(ctx, &err),
            Err(_) => report_error(ctx, &Error::UnwindingPanic),
        }
    })
}

unsafe extern "C" fn finalize_aggregate<A, F>(ctx: *mut ffi::sqlite3_context)
where
    A: Default,
    F: AggregateFunction<A>,
{
    guarded((), || {
        let f = &*(ffi::sqlite3_user_data(ctx).cast::<F>());
        let state = AggregateState::<A>::take(ctx);
        match catch_unwind(std::panic::AssertUnwindSafe(|| f.finalize(state))) {
            Ok(Ok(value)) => match value.to_sql() {
                Ok(out) => set_result(ctx, &out),
                Err(err) => report_error(ctx, &err),
            },
            Ok(Err(err)) => report_error(ctx, &err),
            Err(_) => report_error(ctx, &Error::UnwindingPanic),
        }
    })
}

#[cfg(feature = "window")]
unsafe extern "C" fn value_window<A, F>(ctx: *mut ffi::sqlite3_context)
where
    A: Default,
    F: WindowFunction<A>,
{
    guarded((), || {
        let f = &*(ffi::sqlite3_user_data(ctx).cast::<F>());
        let slot = AggregateState::<A>::slot(ctx);
        let state = if slot.is_null() || (*slot).is_null() {
            None
        } else {
            Some(&mut **slot)
        };
        match catch_unwind(std::panic::AssertUnwindSafe(|| f.value(state))) {
            Ok(Ok(value)) => match value.to_sql() {
                Ok(out) => set_result(ctx, &out),
                Err(err) => report_error(ctx, &err),
            },
            Ok(Err(err)) => report_error(ctx, &err),
            Err(_) => report_error(ctx, &Error::UnwindingPanic),
        }
    })
}

#[cfg(feature = "window")]
unsafe extern "C" fn inverse_window<A, F>(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) where
    A: Default,
    F: WindowFunction<A>,
{
    guarded((), || {
        let f = &*(ffi::sqlite3_user_data(ctx).cast::<F>());
        let args = Context {
            ctx,
            args: context_args(argc, argv),
        };
        let state = AggregateState::<A>::get_or_init(ctx);
        match catch_unwind(std::panic::AssertUnwindSafe(|| f.inverse(&args, state))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => report_error(ctx, &err),
            Err(_) => report_error(ctx, &Error::UnwindingPanic),
        }
    })
}

unsafe extern "C" fn free_boxed_value<T>(p: *mut c_void) {
    drop(Box::from_raw(p.cast::<T>()));
}

impl Connection {
    /// Registers (or, with `func = None`, unregisters) a scalar function.
    ///
    /// Re-registering the same `(name, n_arg)` pair replaces the previous
    /// definition. Fails with a busy-style error ([`Error::SqliteFailure`]
    /// carrying `SQLITE_BUSY`) if a query currently executing calls this
    /// function.
    pub fn create_scalar_function<F>(
        &self,
        name: &str,
        n_arg: c_int,
        flags: FunctionFlags,
        func: Option<F>,
    ) -> Result<()>
    where
        F: ScalarFunction + 'static,
    {
        self.db
            .borrow_mut()
            .create_scalar_function(name, n_arg, flags, func)
    }

    /// Registers (or unregisters) an aggregate function.
    pub fn create_aggregate_function<A, F>(
        &self,
        name: &str,
        n_arg: c_int,
        flags: FunctionFlags,
        func: Option<F>,
    ) -> Result<()>
    where
        A: Default,
        F: AggregateFunction<A> + 'static,
    {
        self.db
            .borrow_mut()
            .create_aggregate_function(name, n_arg, flags, func)
    }

    /// Registers (or unregisters) a window function, usable both as a
    /// `GROUP BY` aggregate and over an `OVER (...)` window.
    #[cfg(feature = "window")]
    pub fn create_window_function<A, F>(
        &self,
        name: &str,
        n_arg: c_int,
        flags: FunctionFlags,
        func: Option<F>,
    ) -> Result<()>
    where
        A: Default,
        F: WindowFunction<A> + 'static,
    {
        self.db
            .borrow_mut()
            .create_window_function(name, n_arg, flags, func)
    }
}

impl InnerConnection {
    fn create_scalar_function<F>(
        &mut self,
        name: &str,
        n_arg: c_int,
        flags: FunctionFlags,
        func: Option<F>,
    ) -> Result<()>
    where
        F: ScalarFunction + 'static,
    {
        let c_name = str_to_cstring(name)?;
        let text_rep = ffi::SQLITE_UTF8 | flags.bits();
        let (p_app, x_func, x_destroy) = match func {
            Some(func) => (
                Box::into_raw(Box::new(func)).cast::<c_void>(),
                Some(call_scalar::<F> as unsafe extern "C" fn(_, _, _)),
                Some(free_boxed_value::<F> as unsafe extern "C" fn(_)),
            ),
            None => (ptr::null_mut(), None, None),
        };
        let r = unsafe {
            ffi::sqlite3_create_function_v2(
                self.db(),
                c_name.as_ptr(),
                n_arg,
                text_rep,
                p_app,
                x_func,
                None,
                None,
                x_destroy,
            )
        };
        self.decode_result(r)
    }

    fn create_aggregate_function<A, F>(
        &mut self,
        name: &str,
        n_arg: c_int,
        flags: FunctionFlags,
        func: Option<F>,
    ) -> Result<()>
    where
        A: Default,
        F: AggregateFunction<A> + 'static,
    {
        let c_name = str_to_cstring(name)?;
        let text_rep = ffi::SQLITE_UTF8 | flags.bits();
        let (p_app, x_step, x_final, x_destroy) = match func {
            Some(func) => (
                Box::into_raw(Box::new(func)).cast::<c_void>(),
                Some(step_aggregate::<A, F> as unsafe extern "C" fn(_, _, _)),
                Some(finalize_aggregate::<A, F> as unsafe extern "C" fn(_)),
                Some(free_boxed_value::<F> as unsafe extern "C" fn(_)),
            ),
            None => (ptr::null_mut(), None, None, None),
        };
        let r = unsafe {
            ffi::sqlite3_create_function_v2(
                self.db(),
                c_name.as_ptr(),
                n_arg,
                text_rep,
                p_app,
                None,
                x_step,
                x_final,
                x_destroy,
            )
        };
        self.decode_result(r)
    }

    #[cfg(feature = "window")]
    fn create_window_function<A, F>(
        &mut self,
        name: &str,
        n_arg: c_int,
        flags: FunctionFlags,
        func: Option<F>,
    ) -> Result<()>
    where
        A: Default,
        F: WindowFunction<A> + 'static,
    {
        let c_name = str_to_cstring(name)?;
        let text_rep = ffi::SQLITE_UTF8 | flags.bits();
        let (p_app, x_step, x_final, x_value, x_inverse, x_destroy) = match func {
            Some(func) => (
                Box::into_raw(Box::new(func)).cast::<c_void>(),
                Some(step_aggregate::<A, F> as unsafe extern "C" fn(_, _, _)),
                Some(finalize_aggregate::<A, F> as unsafe extern "C" fn(_)),
                Some(value_window::<A, F> as unsafe extern "C" fn(_)),
                Some(inverse_window::<A, F> as unsafe extern "C" fn(_, _, _)),
                Some(free_boxed_value::<F> as unsafe extern "C" fn(_)),
            ),
            None => (ptr::null_mut(), None, None, None, None, None),
        };
        let r = unsafe {
            ffi::sqlite3_create_window_function(
                self.db(),
                c_name.as_ptr(),
                n_arg,
                text_rep,
                p_app,
                x_step,
                x_final,
                x_value,
                x_inverse,
                x_destroy,
            )
        };
        self.decode_result(r)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::Value;

    struct AlwaysSeven;
    impl ScalarFunction for AlwaysSeven {
        fn call(&self, _ctx: &Context<'_>) -> Result<Box<dyn ToSql>> {
            Ok(Box::new(7i64))
        }
    }

    #[test]
    fn scalar_function_runs_per_row() {
        let db = Connection::open_in_memory().unwrap();
        db.create_scalar_function(
            "ilove7",
            0,
            FunctionFlags::SQLITE_DETERMINISTIC,
            Some(AlwaysSeven),
        )
        .unwrap();
        let mut cursor = db.cursor();
        cursor
            .execute(
                "select ilove7(), rowid from (values (1),(2),(3))",
                (),
                true,
                0,
            )
            .unwrap();
        let rows = cursor.fetch_all().unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Value::Integer(7), Value::Integer(1)],
                vec![Value::Integer(7), Value::Integer(2)],
                vec![Value::Integer(7), Value::Integer(3)],
            ]
        );
    }

    #[test]
    fn null_func_unregisters() {
        let db = Connection::open_in_memory().unwrap();
        db.create_scalar_function(
            "ilove7",
            0,
            FunctionFlags::empty(),
            Some(AlwaysSeven),
        )
        .unwrap();
        db.create_scalar_function("ilove7", 0, FunctionFlags::empty(), None::<AlwaysSeven>)
            .unwrap();
        let mut cursor = db.cursor();
        let err = cursor.execute("select ilove7()", (), true, 0).unwrap_err();
        assert!(matches!(err, Error::SqliteFailure(..)));
    }

    struct Sum;
    impl AggregateFunction<i64> for Sum {
        fn step(&self, ctx: &Context<'_>, state: &mut i64) -> Result<()> {
            *state += ctx.get::<i64>(0)?;
            Ok(())
        }
        fn finalize(&self, state: Option<i64>) -> Result<Box<dyn ToSql>> {
            Ok(Box::new(state.unwrap_or(0)))
        }
    }

    #[test]
    fn aggregate_function_sums_rows() {
        let db = Connection::open_in_memory().unwrap();
        db.create_aggregate_function("my_sum", 1, FunctionFlags::empty(), Some(Sum))
            .unwrap();
        let mut cursor = db.cursor();
        cursor
            .execute(
                "select my_sum(x) from (values (1),(2),(3)) as t(x)",
                (),
                true,
                0,
            )
            .unwrap();
        let rows = cursor.fetch_all().unwrap();
        assert_eq!(rows, vec![vec![Value::Integer(6)]]);
    }

    #[test]
    fn aggregate_function_on_empty_group_still_finalizes() {
        let db = Connection::open_in_memory().unwrap();
        db.create_aggregate_function("my_sum", 1, FunctionFlags::empty(), Some(Sum))
            .unwrap();
        let mut cursor = db.cursor();
        cursor
            .execute(
                "select my_sum(x) from (values (1)) as t(x) where x = 0",
                (),
                true,
                0,
            )
            .unwrap();
        let rows = cursor.fetch_all().unwrap();
        assert_eq!(rows, vec![vec![Value::Integer(0)]]);
    }

    #[cfg(feature = "window")]
    impl WindowFunction<i64> for Sum {
        fn value(&self, state: Option<&mut i64>) -> Result<Box<dyn ToSql>> {
            Ok(Box::new(state.map(|s| *s).unwrap_or(0)))
        }
        fn inverse(&self, ctx: &Context<'_>, state: &mut i64) -> Result<()> {
            *state -= ctx.get::<i64>(0)?;
            Ok(())
        }
    }

    #[cfg(feature = "window")]
    #[test]
    fn window_function_runs_over_a_frame() {
        let db = Connection::open_in_memory().unwrap();
        db.create_window_function("win_sum", 1, FunctionFlags::empty(), Some(Sum))
            .unwrap();
        let mut cursor = db.cursor();
        cursor
            .execute(
                "select win_sum(x) over (order by x rows between 1 preceding and current row) \
                 from (values (1),(2),(3)) as t(x)",
                (),
                true,
                0,
            )
            .unwrap();
        let rows = cursor.fetch_all().unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Value::Integer(1)],
                vec![Value::Integer(3)],
                vec![Value::Integer(5)],
            ]
        );
    }
}
