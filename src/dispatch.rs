//! Shared machinery for invoking host callbacks from inside a SQLite
//! up-call: re-entrancy detection, error capture/re-raise, and the
//! process-wide sink for exceptions SQLite has no way to accept.
//!
//! Every callback family (hooks, functions, collations, vtab, VFS) goes
//! through the same small set of primitives here instead of re-deriving
//! its own `catch_unwind`/error-stash dance, following the boxed-closure
//! trampoline pattern already used by `hooks.rs`'s `commit_hook` et al.

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, UnwindSafe};
use std::sync::{Mutex, OnceLock};

use crate::Error;

/// Per-`Connection` re-entrancy marker plus the most recent error raised by
/// a host callback still pending re-raise on the driving call's return.
#[derive(Default)]
pub(crate) struct Dispatch {
    in_callback: Cell<bool>,
    stashed_error: RefCell<Option<Error>>,
}

/// RAII guard held for the duration of one up-call into host code. Clears
/// the re-entrancy marker on drop, including on unwind.
pub(crate) struct CallbackScope<'a> {
    dispatch: &'a Dispatch,
}

impl Drop for CallbackScope<'_> {
    fn drop(&mut self) {
        self.dispatch.in_callback.set(false);
    }
}

impl Dispatch {
    /// Enters a callback critical section, failing with
    /// `Error::ThreadingViolationError` if a callback on this same
    /// Connection is already in flight (e.g. registering a new hook from
    /// within that hook's own firing).
    pub(crate) fn enter(&self) -> Result<CallbackScope<'_>, Error> {
        if self.in_callback.replace(true) {
            return Err(Error::ThreadingViolationError);
        }
        Ok(CallbackScope { dispatch: self })
    }

    /// Stashes `err` to be re-raised from the driving call, unless an
    /// error is already stashed — the first callback to fail wins (e.g. a
    /// failing aggregate `step` outranks a subsequent failing `final`).
    pub(crate) fn stash_error(&self, err: Error) {
        let mut slot = self.stashed_error.borrow_mut();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    /// Takes the stashed error, if any, clearing the slot for the next
    /// round of callbacks.
    pub(crate) fn take_error(&self) -> Option<Error> {
        self.stashed_error.borrow_mut().take()
    }
}

type UnraiseableHook = Box<dyn Fn(&Error) + Send + Sync>;

static UNRAISEABLE_HOOK: OnceLock<Mutex<Option<UnraiseableHook>>> = OnceLock::new();

fn unraiseable_slot() -> &'static Mutex<Option<UnraiseableHook>> {
    UNRAISEABLE_HOOK.get_or_init(|| Mutex::new(None))
}

/// Installs the process-wide sink for exceptions raised somewhere SQLite
/// cannot accept an error return (a rollback hook, a destructor, VFS
/// `xClose` run from a finalizer). `None` restores the default, which
/// writes to stderr via [`eprintln!`].
pub fn set_unraiseable_hook<F>(hook: Option<F>)
where
    F: Fn(&Error) + Send + Sync + 'static,
{
    *unraiseable_slot().lock().unwrap() = hook.map(|f| Box::new(f) as UnraiseableHook);
}

/// Reports `err` to the unraiseable sink instead of silently dropping it.
pub(crate) fn report_unraiseable(err: &Error) {
    let guard = unraiseable_slot().lock().unwrap();
    match &*guard {
        Some(hook) => hook(err),
        None => eprintln!("unraiseable exception in SQLite callback: {err}"),
    }
}

/// Reports a raw panic payload (no `Error` value exists for an unwind) to
/// stderr, since the unraiseable hook is typed over `Error` and a panic
/// message doesn't fit any variant.
fn report_unraiseable_panic(payload: &(dyn std::any::Any + Send)) {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "callback panicked with a non-string payload".to_string());
    eprintln!("unraiseable panic in SQLite callback: {msg}");
}

/// Runs `f`, catching a panic and reporting it instead of letting it cross
/// the FFI boundary (which is undefined behavior). Returns `default` if
/// `f` panicked.
pub(crate) fn guarded<F, T>(default: T, f: F) -> T
where
    F: FnOnce() -> T + UnwindSafe,
{
    match catch_unwind(f) {
        Ok(v) => v,
        Err(payload) => {
            report_unraiseable_panic(&*payload);
            default
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn reentrant_enter_fails() {
        let dispatch = Dispatch::default();
        let _outer = dispatch.enter().unwrap();
        assert!(matches!(
            dispatch.enter(),
            Err(Error::ThreadingViolationError)
        ));
    }

    #[test]
    fn scope_drop_clears_marker() {
        let dispatch = Dispatch::default();
        {
            let _scope = dispatch.enter().unwrap();
        }
        assert!(dispatch.enter().is_ok());
    }

    #[test]
    fn first_stashed_error_wins() {
        let dispatch = Dispatch::default();
        dispatch.stash_error(Error::ExecutionCompleteError);
        dispatch.stash_error(Error::CursorClosedError);
        assert!(matches!(
            dispatch.take_error(),
            Some(Error::ExecutionCompleteError)
        ));
        assert!(dispatch.take_error().is_none());
    }

    #[test]
    fn unraiseable_hook_is_invoked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        set_unraiseable_hook(Some(move |_err: &Error| {
            counted.fetch_add(1, Ordering::SeqCst);
        }));
        report_unraiseable(&Error::ConnectionClosedError);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        set_unraiseable_hook(None::<fn(&Error)>);
    }
}
