//! Register a custom SQLite virtual file system (VFS) by implementing
//! [`Vfs`] (and the per-file [`DatabaseHandle`]) and calling [`register`].
//!
//! Every callback an implementation does not itself care about can be left
//! at its default, which forwards to the VFS that was the process default
//! at registration time (`self.delegate()`), the same way a subclassed VFS
//! in other SQLite bindings calls up to its base implementation.
use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::mem::{size_of, MaybeUninit};
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::slice;
use std::time::Duration;

use crate::ffi;
use crate::{Error, Result};

/// The object type being opened, derived from the `xOpen` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenKind {
    MainDb,
    MainJournal,
    TempDb,
    TempJournal,
    TransientDb,
    SubJournal,
    SuperJournal,
    Wal,
}

impl OpenKind {
    fn from_flags(flags: c_int) -> Self {
        if flags & ffi::SQLITE_OPEN_MAIN_DB != 0 {
            Self::MainDb
        } else if flags & ffi::SQLITE_OPEN_MAIN_JOURNAL != 0 {
            Self::MainJournal
        } else if flags & ffi::SQLITE_OPEN_TEMP_DB != 0 {
            Self::TempDb
        } else if flags & ffi::SQLITE_OPEN_TEMP_JOURNAL != 0 {
            Self::TempJournal
        } else if flags & ffi::SQLITE_OPEN_TRANSIENT_DB != 0 {
            Self::TransientDb
        } else if flags & ffi::SQLITE_OPEN_SUBJOURNAL != 0 {
            Self::SubJournal
        } else if flags & ffi::SQLITE_OPEN_SUPER_JOURNAL != 0 {
            Self::SuperJournal
        } else {
            Self::Wal
        }
    }
}

/// The access an object is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAccess {
    Read,
    Write,
    Create,
    CreateNew,
}

impl OpenAccess {
    fn from_flags(flags: c_int) -> Self {
        if flags & ffi::SQLITE_OPEN_CREATE != 0 && flags & ffi::SQLITE_OPEN_EXCLUSIVE != 0 {
            Self::CreateNew
        } else if flags & ffi::SQLITE_OPEN_CREATE != 0 {
            Self::Create
        } else if flags & ffi::SQLITE_OPEN_READWRITE != 0 {
            Self::Write
        } else {
            Self::Read
        }
    }

    fn to_flags(self) -> c_int {
        match self {
            Self::Read => ffi::SQLITE_OPEN_READONLY,
            Self::Write => ffi::SQLITE_OPEN_READWRITE,
            Self::Create => ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE,
            Self::CreateNew => {
                ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_EXCLUSIVE
            }
        }
    }
}

/// What kind of object `xOpen` is being asked to produce, and with what
/// access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    pub kind: OpenKind,
    pub access: OpenAccess,
    pub delete_on_close: bool,
}

impl OpenOptions {
    fn from_flags(flags: c_int) -> Self {
        Self {
            kind: OpenKind::from_flags(flags),
            access: OpenAccess::from_flags(flags),
            delete_on_close: flags & ffi::SQLITE_OPEN_DELETEONCLOSE != 0,
        }
    }

    fn to_flags(self) -> c_int {
        self.access.to_flags()
            | if self.delete_on_close {
                ffi::SQLITE_OPEN_DELETEONCLOSE
            } else {
                0
            }
    }
}

/// File locking level (see [SQLite doc](https://sqlite.org/c3ref/c_lock_exclusive.html)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockKind {
    None,
    Shared,
    Reserved,
    Pending,
    Exclusive,
}

impl LockKind {
    fn from_i32(lock: c_int) -> Option<Self> {
        Some(match lock {
            ffi::SQLITE_LOCK_NONE => Self::None,
            ffi::SQLITE_LOCK_SHARED => Self::Shared,
            ffi::SQLITE_LOCK_RESERVED => Self::Reserved,
            ffi::SQLITE_LOCK_PENDING => Self::Pending,
            ffi::SQLITE_LOCK_EXCLUSIVE => Self::Exclusive,
            _ => return None,
        })
    }

    fn to_i32(self) -> c_int {
        match self {
            Self::None => ffi::SQLITE_LOCK_NONE,
            Self::Shared => ffi::SQLITE_LOCK_SHARED,
            Self::Reserved => ffi::SQLITE_LOCK_RESERVED,
            Self::Pending => ffi::SQLITE_LOCK_PENDING,
            Self::Exclusive => ffi::SQLITE_LOCK_EXCLUSIVE,
        }
    }
}

/// A filename handed to `Vfs::open`/`delete`/`access`/`full_pathname`. In URI
/// mode, query parameters are reachable without the caller re-parsing the
/// string.
pub struct Filename<'a> {
    raw: &'a CStr,
}

impl<'a> Filename<'a> {
    /// # Safety
    /// `raw` must be a valid pointer for the lifetime `'a`, as SQLite
    /// guarantees for the filename arguments passed to VFS methods.
    pub unsafe fn new(raw: *const c_char) -> Option<Filename<'a>> {
        if raw.is_null() {
            None
        } else {
            Some(Filename {
                raw: CStr::from_ptr(raw),
            })
        }
    }

    pub fn as_ptr(&self) -> *const c_char {
        self.raw.as_ptr()
    }

    /// The plain (non-URI) filename.
    pub fn filename(&self) -> Cow<'_, str> {
        unsafe {
            let db = ffi::sqlite3_filename_database(self.raw.as_ptr());
            if db.is_null() {
                self.raw.to_string_lossy()
            } else {
                CStr::from_ptr(db).to_string_lossy()
            }
        }
    }

    /// The value of a `key=value` query parameter, if this filename carries
    /// URI parameters and `key` is present.
    pub fn uri_parameter(&self, key: &str) -> Option<String> {
        let c_key = CString::new(key).ok()?;
        unsafe {
            let value = ffi::sqlite3_uri_parameter(self.raw.as_ptr(), c_key.as_ptr());
            if value.is_null() {
                None
            } else {
                Some(CStr::from_ptr(value).to_string_lossy().into_owned())
            }
        }
    }

    pub fn uri_int(&self, key: &str, default: i64) -> i64 {
        match CString::new(key) {
            Ok(c_key) => unsafe {
                ffi::sqlite3_uri_int64(self.raw.as_ptr(), c_key.as_ptr(), default)
            },
            Err(_) => default,
        }
    }

    pub fn uri_boolean(&self, key: &str, default: bool) -> bool {
        match CString::new(key) {
            Ok(c_key) => unsafe {
                ffi::sqlite3_uri_boolean(self.raw.as_ptr(), c_key.as_ptr(), c_int::from(default))
                    != 0
            },
            Err(_) => default,
        }
    }
}

/// A file opened by a [`Vfs`].
pub trait DatabaseHandle: Send {
    /// Current size in bytes.
    fn size(&self) -> Result<u64>;

    /// Reads the exact number of bytes required to fill `buf`, starting at
    /// `offset`.
    fn read_exact_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()>;

    /// Writes all of `buf`, starting at `offset`.
    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> Result<()>;

    /// Flushes writes to the underlying storage. `data_only` means only the
    /// data, not the metadata, must be durable.
    fn sync(&mut self, data_only: bool) -> Result<()>;

    /// Truncates or extends the file to `size`.
    fn set_len(&mut self, size: u64) -> Result<()>;

    /// Attempts to acquire `lock`, returning whether it was acquired.
    fn lock(&mut self, lock: LockKind) -> Result<bool>;

    /// Releases down to `lock`.
    fn unlock(&mut self, lock: LockKind) -> Result<bool> {
        self.lock(lock)
    }

    /// True if some other connection holds a reserved, pending, or
    /// exclusive lock.
    fn reserved(&mut self) -> Result<bool>;

    /// The strongest lock currently held by this handle.
    fn current_lock(&self) -> Result<LockKind>;

    /// Advisory size-hint; used to pre-size the file before a bulk write.
    /// No-op by default.
    fn set_chunk_size(&mut self, _size: usize) -> Result<()> {
        Ok(())
    }

    /// Bitmask of `SQLITE_IOCAP_*` flags describing the underlying storage.
    /// `0` (no guarantees) by default.
    fn device_characteristics(&self) -> c_int {
        0
    }

    /// Preferred unit for atomic writes. SQLite's default (512) unless
    /// overridden.
    fn sector_size(&self) -> c_int {
        512
    }
}

/// An opaque dynamic-library handle. Its only operations are equality and
/// pass-through to [`Vfs::dl_sym`]/[`Vfs::dl_close`] — it carries no
/// meaning on the Rust side beyond identifying which handle a later call
/// refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpaqueHandle(u64);

/// A virtual file system for SQLite.
pub trait Vfs: Send + Sync {
    type Handle: DatabaseHandle;

    /// Opens (or creates) the database named by `name`. `name` is `None`
    /// for an anonymous temporary file.
    fn open(&self, name: Option<&Filename<'_>>, opts: OpenOptions) -> Result<Self::Handle>;

    /// Deletes the file named `name`; `sync_dir` asks for the containing
    /// directory to be synced afterward where that is meaningful.
    fn delete(&self, name: &Filename<'_>, sync_dir: bool) -> Result<()>;

    /// Checks access to `name`: existence, read, or read-write depending on
    /// `flags` (an `SQLITE_ACCESS_*` value).
    fn access(&self, name: &Filename<'_>, flags: c_int) -> Result<bool>;

    /// Canonicalizes `name` to the form this VFS will use internally.
    fn full_pathname(&self, name: &Filename<'_>) -> Result<String>;

    /// Fills `buffer` with random bytes.
    fn randomness(&self, buffer: &mut [u8]);

    /// Sleeps for approximately `duration`; returns the duration actually
    /// slept.
    fn sleep(&self, duration: Duration) -> Duration;

    /// Current time, expressed as a Julian day number.
    fn current_time(&self) -> f64;

    /// Loads a shared library. Dynamic loading is disabled by default —
    /// override to support `load_extension()`.
    fn dl_open(&self, _filename: &str) -> Option<OpaqueHandle> {
        None
    }

    /// Writes a human-readable description of the last `dl_*` failure into
    /// `buf`, truncating to its length.
    fn dl_error(&self, buf: &mut [u8]) {
        let msg = b"dynamic loading is not supported by this VFS";
        let n = msg.len().min(buf.len());
        buf[..n].copy_from_slice(&msg[..n]);
    }

    /// Resolves `symbol` in a handle previously returned by `dl_open`.
    fn dl_sym(&self, _handle: OpaqueHandle, _symbol: &str) -> Option<unsafe extern "C" fn()> {
        None
    }

    /// Releases a handle previously returned by `dl_open`.
    fn dl_close(&self, _handle: OpaqueHandle) {}
}

/// The VFS registered as the process default at the time a custom VFS was
/// installed; used by `Vfs` impls that only override a subset of methods
/// and otherwise want SQLite's normal behavior.
#[derive(Clone, Copy)]
pub struct DelegateVfs(*mut ffi::sqlite3_vfs);

unsafe impl Send for DelegateVfs {}
unsafe impl Sync for DelegateVfs {}

impl DelegateVfs {
    /// The VFS that was the process default at the time it is looked up.
    /// Store the result on your own type (conventionally a `base` field) to
    /// forward callbacks you don't want to reimplement.
    pub fn find_default() -> Option<Self> {
        let p = unsafe { ffi::sqlite3_vfs_find(ptr::null()) };
        if p.is_null() {
            None
        } else {
            Some(Self(p))
        }
    }

    pub fn full_pathname(&self, name: &str) -> Result<String> {
        let c_name = CString::new(name).map_err(|_| Error::InvalidPath(name.into()))?;
        let mx_pathname = unsafe { (*self.0).mxPathname } as usize;
        let mut buf = vec![0 as c_char; mx_pathname];
        let rc = unsafe {
            let x_full_pathname = (*self.0)
                .xFullPathname
                .expect("delegate VFS has no xFullPathname");
            x_full_pathname(
                self.0,
                c_name.as_ptr(),
                buf.len() as c_int,
                buf.as_mut_ptr(),
            )
        };
        if rc != ffi::SQLITE_OK {
            return Err(crate::error::error_from_sqlite_code(rc, None));
        }
        let full = unsafe { CStr::from_ptr(buf.as_ptr()) };
        Ok(full.to_string_lossy().into_owned())
    }
}

struct State<V: Vfs> {
    vfs: V,
}

struct FileExt<V: Vfs> {
    handle: V::Handle,
    delete_on_close: bool,
    path: Option<CString>,
}

// SQLite hands xOpen a raw, uninitialized buffer of `szOsFile` bytes; `ext`
// is only valid between the `ptr::write` in `vfs_open` and the
// `ptr::drop_in_place` in `io_close`, so it stays behind `MaybeUninit`
// rather than risk running a destructor over garbage on open failure.
#[repr(C)]
struct FileState<V: Vfs> {
    base: ffi::sqlite3_file,
    ext: MaybeUninit<FileExt<V>>,
}

unsafe fn vfs_state<'a, V: Vfs>(p: *mut ffi::sqlite3_vfs) -> &'a State<V> {
    &*((*p).pAppData.cast::<State<V>>())
}

unsafe fn file_ext<'a, V: Vfs>(p: *mut ffi::sqlite3_file) -> &'a mut FileExt<V> {
    (*p.cast::<FileState<V>>()).ext.assume_init_mut()
}

/// Registers `vfs` under `name`. If `as_default`, new connections that
/// don't specify a VFS use it.
pub fn register<V: Vfs + 'static>(name: &str, vfs: V, as_default: bool) -> Result<()> {
    let c_name =
        CString::new(name).map_err(|_| Error::InvalidPath(name.into()))?;
    let state = Box::into_raw(Box::new(State { vfs }));
    // Forces the per-`V` io_methods vtable to exist before any file is
    // opened against this VFS.
    let _ = static_methods::<V>();

    let vfs_ptr = Box::into_raw(Box::new(ffi::sqlite3_vfs {
        iVersion: 2,
        szOsFile: size_of::<FileState<V>>() as c_int,
        mxPathname: 512,
        pNext: ptr::null_mut(),
        zName: {
            let leaked = c_name.into_raw();
            leaked
        },
        pAppData: state.cast(),
        xOpen: Some(vfs_open::<V>),
        xDelete: Some(vfs_delete::<V>),
        xAccess: Some(vfs_access::<V>),
        xFullPathname: Some(vfs_full_pathname::<V>),
        xDlOpen: Some(vfs_dl_open::<V>),
        xDlError: Some(vfs_dl_error::<V>),
        xDlSym: Some(vfs_dl_sym::<V>),
        xDlClose: Some(vfs_dl_close::<V>),
        xRandomness: Some(vfs_randomness::<V>),
        xSleep: Some(vfs_sleep::<V>),
        xCurrentTime: Some(vfs_current_time::<V>),
        xGetLastError: None,
        xCurrentTimeInt64: Some(vfs_current_time_int64::<V>),
        xSetSystemCall: None,
        xGetSystemCall: None,
        xNextSystemCall: None,
    }));

    let rc = unsafe { ffi::sqlite3_vfs_register(vfs_ptr, c_int::from(as_default)) };
    if rc != ffi::SQLITE_OK {
        return Err(crate::error::error_from_sqlite_code(rc, None));
    }
    Ok(())
}

fn set_err(result: Result<()>) -> c_int {
    match result {
        Ok(()) => ffi::SQLITE_OK,
        Err(Error::SqliteFailure(err, _)) => err.extended_code,
        Err(_) => ffi::SQLITE_IOERR,
    }
}

unsafe extern "C" fn vfs_open<V: Vfs>(
    vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    file: *mut ffi::sqlite3_file,
    flags: c_int,
    out_flags: *mut c_int,
) -> c_int {
    let state = vfs_state::<V>(vfs);
    let name = Filename::new(z_name);
    let opts = OpenOptions::from_flags(flags);
    match state.vfs.open(name.as_ref(), opts) {
        Ok(handle) => {
            let f = file.cast::<FileState<V>>();
            let ext = FileExt {
                handle,
                delete_on_close: opts.delete_on_close,
                path: if z_name.is_null() {
                    None
                } else {
                    Some(CStr::from_ptr(z_name).to_owned())
                },
            };
            ptr::write((*f).ext.as_mut_ptr(), ext);
            (*file).pMethods = io_methods_for::<V>();
            if !out_flags.is_null() {
                *out_flags = opts.to_flags();
            }
            ffi::SQLITE_OK
        }
        Err(Error::SqliteFailure(err, _)) => err.extended_code,
        Err(_) => ffi::SQLITE_CANTOPEN,
    }
}

// `sqlite3_io_methods` is immutable once registered; every open file of a
// given `V` shares the same vtable, built once per VFS type and leaked for
// 'static (SQLite keeps using it for the lifetime of the process).
fn io_methods_for<V: Vfs>() -> *const ffi::sqlite3_io_methods {
    static_methods::<V>()
}

fn static_methods<V: Vfs>() -> *const ffi::sqlite3_io_methods {
    use std::sync::OnceLock;
    struct Holder(*const ffi::sqlite3_io_methods);
    unsafe impl Sync for Holder {}
    static METHODS: OnceLock<Holder> = OnceLock::new();
    // `OnceLock` is keyed per call-site, but this function is itself generic
    // over `V`, so monomorphization still gives each `V` its own `METHODS`.
    METHODS
        .get_or_init(|| {
            let boxed = Box::new(ffi::sqlite3_io_methods {
                iVersion: 1,
                xClose: Some(io_close::<V>),
                xRead: Some(io_read::<V>),
                xWrite: Some(io_write::<V>),
                xTruncate: Some(io_truncate::<V>),
                xSync: Some(io_sync::<V>),
                xFileSize: Some(io_file_size::<V>),
                xLock: Some(io_lock::<V>),
                xUnlock: Some(io_unlock::<V>),
                xCheckReservedLock: Some(io_check_reserved_lock::<V>),
                xFileControl: Some(io_file_control::<V>),
                xSectorSize: Some(io_sector_size::<V>),
                xDeviceCharacteristics: Some(io_device_characteristics::<V>),
                xShmMap: None,
                xShmLock: None,
                xShmBarrier: None,
                xShmUnmap: None,
            });
            Holder(Box::into_raw(boxed))
        })
        .0
}

unsafe extern "C" fn vfs_delete<V: Vfs>(
    vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    sync_dir: c_int,
) -> c_int {
    let state = vfs_state::<V>(vfs);
    let name = match Filename::new(z_name) {
        Some(n) => n,
        None => return ffi::SQLITE_IOERR_DELETE,
    };
    set_err(state.vfs.delete(&name, sync_dir != 0))
}

unsafe extern "C" fn vfs_access<V: Vfs>(
    vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    flags: c_int,
    p_res_out: *mut c_int,
) -> c_int {
    let state = vfs_state::<V>(vfs);
    let name = match Filename::new(z_name) {
        Some(n) => n,
        None => {
            *p_res_out = 0;
            return ffi::SQLITE_OK;
        }
    };
    match state.vfs.access(&name, flags) {
        Ok(exists) => {
            *p_res_out = c_int::from(exists);
            ffi::SQLITE_OK
        }
        Err(Error::SqliteFailure(err, _)) => err.extended_code,
        Err(_) => ffi::SQLITE_IOERR_ACCESS,
    }
}

unsafe extern "C" fn vfs_full_pathname<V: Vfs>(
    vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    n_out: c_int,
    z_out: *mut c_char,
) -> c_int {
    let state = vfs_state::<V>(vfs);
    let name = match Filename::new(z_name) {
        Some(n) => n,
        None => return ffi::SQLITE_IOERR,
    };
    match state.vfs.full_pathname(&name) {
        Ok(full) => match CString::new(full) {
            Ok(c_full) => {
                let bytes = c_full.as_bytes_with_nul();
                if bytes.len() > n_out as usize {
                    return ffi::SQLITE_CANTOPEN;
                }
                ptr::copy_nonoverlapping(bytes.as_ptr().cast::<c_char>(), z_out, bytes.len());
                ffi::SQLITE_OK
            }
            Err(_) => ffi::SQLITE_CANTOPEN,
        },
        Err(Error::SqliteFailure(err, _)) => err.extended_code,
        Err(_) => ffi::SQLITE_IOERR,
    }
}

unsafe extern "C" fn vfs_dl_open<V: Vfs>(
    vfs: *mut ffi::sqlite3_vfs,
    z_filename: *const c_char,
) -> *mut c_void {
    let state = vfs_state::<V>(vfs);
    let filename = CStr::from_ptr(z_filename).to_string_lossy();
    match state.vfs.dl_open(&filename) {
        Some(handle) => handle.0 as *mut c_void,
        None => ptr::null_mut(),
    }
}

unsafe extern "C" fn vfs_dl_error<V: Vfs>(
    vfs: *mut ffi::sqlite3_vfs,
    n_byte: c_int,
    z_err_msg: *mut c_char,
) {
    let state = vfs_state::<V>(vfs);
    let buf = slice::from_raw_parts_mut(z_err_msg.cast::<u8>(), n_byte.max(0) as usize);
    state.vfs.dl_error(buf);
}

unsafe extern "C" fn vfs_dl_sym<V: Vfs>(
    vfs: *mut ffi::sqlite3_vfs,
    handle: *mut c_void,
    z_symbol: *const c_char,
) -> Option<unsafe extern "C" fn()> {
    let state = vfs_state::<V>(vfs);
    let symbol = CStr::from_ptr(z_symbol).to_string_lossy();
    state.vfs.dl_sym(OpaqueHandle(handle as u64), &symbol)
}

unsafe extern "C" fn vfs_dl_close<V: Vfs>(vfs: *mut ffi::sqlite3_vfs, handle: *mut c_void) {
    let state = vfs_state::<V>(vfs);
    state.vfs.dl_close(OpaqueHandle(handle as u64));
}

unsafe extern "C" fn vfs_randomness<V: Vfs>(
    vfs: *mut ffi::sqlite3_vfs,
    n_byte: c_int,
    z_out: *mut c_char,
) -> c_int {
    let state = vfs_state::<V>(vfs);
    let buf = slice::from_raw_parts_mut(z_out.cast::<u8>(), n_byte.max(0) as usize);
    state.vfs.randomness(buf);
    buf.len() as c_int
}

unsafe extern "C" fn vfs_sleep<V: Vfs>(vfs: *mut ffi::sqlite3_vfs, microseconds: c_int) -> c_int {
    let state = vfs_state::<V>(vfs);
    let slept = state
        .vfs
        .sleep(Duration::from_micros(microseconds.max(0) as u64));
    slept.as_micros() as c_int
}

unsafe extern "C" fn vfs_current_time<V: Vfs>(
    vfs: *mut ffi::sqlite3_vfs,
    out: *mut f64,
) -> c_int {
    let state = vfs_state::<V>(vfs);
    *out = state.vfs.current_time();
    ffi::SQLITE_OK
}

unsafe extern "C" fn vfs_current_time_int64<V: Vfs>(
    vfs: *mut ffi::sqlite3_vfs,
    out: *mut ffi::sqlite3_int64,
) -> c_int {
    let state = vfs_state::<V>(vfs);
    let julian = state.vfs.current_time();
    *out = (julian * 86_400_000.0) as ffi::sqlite3_int64;
    ffi::SQLITE_OK
}

unsafe extern "C" fn io_close<V: Vfs>(file: *mut ffi::sqlite3_file) -> c_int {
    let f = file.cast::<FileState<V>>();
    let ext = (*f).ext.assume_init_mut();
    if ext.delete_on_close {
        // best effort; SQLite doesn't surface an error from xClose for this
        if let Some(path) = ext.path.take() {
            let _ = std::fs::remove_file(path.to_string_lossy().as_ref());
        }
    }
    ptr::drop_in_place((*f).ext.as_mut_ptr());
    ffi::SQLITE_OK
}

unsafe extern "C" fn io_read<V: Vfs>(
    file: *mut ffi::sqlite3_file,
    buf: *mut c_void,
    i_amt: c_int,
    i_ofst: ffi::sqlite3_int64,
) -> c_int {
    let ext = file_ext::<V>(file);
    let dest = slice::from_raw_parts_mut(buf.cast::<u8>(), i_amt.max(0) as usize);
    match ext.handle.read_exact_at(dest, i_ofst as u64) {
        Ok(()) => ffi::SQLITE_OK,
        Err(_) => ffi::SQLITE_IOERR_SHORT_READ,
    }
}

unsafe extern "C" fn io_write<V: Vfs>(
    file: *mut ffi::sqlite3_file,
    buf: *const c_void,
    i_amt: c_int,
    i_ofst: ffi::sqlite3_int64,
) -> c_int {
    let ext = file_ext::<V>(file);
    let src = slice::from_raw_parts(buf.cast::<u8>(), i_amt.max(0) as usize);
    match ext.handle.write_all_at(src, i_ofst as u64) {
        Ok(()) => ffi::SQLITE_OK,
        Err(_) => ffi::SQLITE_IOERR_WRITE,
    }
}

unsafe extern "C" fn io_truncate<V: Vfs>(
    file: *mut ffi::sqlite3_file,
    size: ffi::sqlite3_int64,
) -> c_int {
    let ext = file_ext::<V>(file);
    match ext.handle.set_len(size.max(0) as u64) {
        Ok(()) => ffi::SQLITE_OK,
        Err(_) => ffi::SQLITE_IOERR_TRUNCATE,
    }
}

unsafe extern "C" fn io_sync<V: Vfs>(file: *mut ffi::sqlite3_file, flags: c_int) -> c_int {
    let ext = file_ext::<V>(file);
    let data_only = flags & ffi::SQLITE_SYNC_DATAONLY != 0;
    match ext.handle.sync(data_only) {
        Ok(()) => ffi::SQLITE_OK,
        Err(_) => ffi::SQLITE_IOERR_FSYNC,
    }
}

unsafe extern "C" fn io_file_size<V: Vfs>(
    file: *mut ffi::sqlite3_file,
    p_size: *mut ffi::sqlite3_int64,
) -> c_int {
    let ext = file_ext::<V>(file);
    match ext.handle.size() {
        Ok(size) => {
            *p_size = size as ffi::sqlite3_int64;
            ffi::SQLITE_OK
        }
        Err(_) => ffi::SQLITE_IOERR_FSTAT,
    }
}

unsafe extern "C" fn io_lock<V: Vfs>(file: *mut ffi::sqlite3_file, lock: c_int) -> c_int {
    let ext = file_ext::<V>(file);
    let kind = match LockKind::from_i32(lock) {
        Some(k) => k,
        None => return ffi::SQLITE_IOERR_LOCK,
    };
    match ext.handle.lock(kind) {
        Ok(true) => ffi::SQLITE_OK,
        Ok(false) => ffi::SQLITE_BUSY,
        Err(_) => ffi::SQLITE_IOERR_LOCK,
    }
}

unsafe extern "C" fn io_unlock<V: Vfs>(file: *mut ffi::sqlite3_file, lock: c_int) -> c_int {
    let ext = file_ext::<V>(file);
    let kind = match LockKind::from_i32(lock) {
        Some(k) => k,
        None => return ffi::SQLITE_IOERR_UNLOCK,
    };
    match ext.handle.unlock(kind) {
        Ok(_) => ffi::SQLITE_OK,
        Err(_) => ffi::SQLITE_IOERR_UNLOCK,
    }
}

unsafe extern "C" fn io_check_reserved_lock<V: Vfs>(
    file: *mut ffi::sqlite3_file,
    p_res_out: *mut c_int,
) -> c_int {
    let ext = file_ext::<V>(file);
    match ext.handle.reserved() {
        Ok(reserved) => {
            *p_res_out = c_int::from(reserved);
            ffi::SQLITE_OK
        }
        Err(_) => ffi::SQLITE_IOERR_CHECKRESERVEDLOCK,
    }
}

unsafe extern "C" fn io_file_control<V: Vfs>(
    file: *mut ffi::sqlite3_file,
    op: c_int,
    p_arg: *mut c_void,
) -> c_int {
    let ext = file_ext::<V>(file);
    match op {
        ffi::SQLITE_FCNTL_CHUNK_SIZE => {
            let size = *p_arg.cast::<c_int>();
            match ext.handle.set_chunk_size(size.max(0) as usize) {
                Ok(()) => ffi::SQLITE_OK,
                Err(_) => ffi::SQLITE_NOTFOUND,
            }
        }
        _ => ffi::SQLITE_NOTFOUND,
    }
}

unsafe extern "C" fn io_sector_size<V: Vfs>(file: *mut ffi::sqlite3_file) -> c_int {
    file_ext::<V>(file).handle.sector_size()
}

unsafe extern "C" fn io_device_characteristics<V: Vfs>(file: *mut ffi::sqlite3_file) -> c_int {
    file_ext::<V>(file).handle.device_characteristics()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lock_ordering() {
        assert!(LockKind::None < LockKind::Shared);
        assert!(LockKind::Shared < LockKind::Reserved);
        assert!(LockKind::Reserved < LockKind::Pending);
        assert!(LockKind::Pending < LockKind::Exclusive);
    }

    #[test]
    fn open_options_round_trip() {
        let flags = ffi::SQLITE_OPEN_READWRITE
            | ffi::SQLITE_OPEN_CREATE
            | ffi::SQLITE_OPEN_MAIN_DB;
        let opts = OpenOptions::from_flags(flags);
        assert_eq!(opts.kind, OpenKind::MainDb);
        assert_eq!(opts.access, OpenAccess::Create);
        assert!(!opts.delete_on_close);
    }
}
