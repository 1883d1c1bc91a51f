//! End-to-end coverage for a custom VFS that XORs every byte on the way
//! to and from disk, demonstrating the file really is obfuscated on
//! disk and transparently readable again through the same VFS.
#![cfg(feature = "vfs")]

extern crate sqlite_dispatch_core;

use std::fs;
use std::os::raw::c_int;
use std::os::unix::fs::FileExt;
use std::time::Duration;

use sqlite_dispatch_core::ffi;
use sqlite_dispatch_core::vfs::{
    self, DatabaseHandle, Filename, LockKind, OpenOptions, Vfs,
};
use sqlite_dispatch_core::{Connection, Error, OpenFlags, Result};

const XOR_KEY: u8 = 0xA5;

fn xor_in_place(buf: &mut [u8]) {
    for b in buf.iter_mut() {
        *b ^= XOR_KEY;
    }
}

fn io_err(e: std::io::Error) -> Error {
    Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_IOERR), Some(e.to_string()))
}

struct ObfuscatedFile {
    file: fs::File,
    lock: LockKind,
}

impl DatabaseHandle for ObfuscatedFile {
    fn size(&self) -> Result<u64> {
        Ok(self.file.metadata().map_err(io_err)?.len())
    }

    fn read_exact_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        self.file.read_exact_at(buf, offset).map_err(io_err)?;
        xor_in_place(buf);
        Ok(())
    }

    fn write_all_at(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        let mut scratch = buf.to_vec();
        xor_in_place(&mut scratch);
        self.file.write_all_at(&scratch, offset).map_err(io_err)
    }

    fn sync(&mut self, _data_only: bool) -> Result<()> {
        self.file.sync_all().map_err(io_err)
    }

    fn set_len(&mut self, size: u64) -> Result<()> {
        self.file.set_len(size).map_err(io_err)
    }

    fn lock(&mut self, lock: LockKind) -> Result<bool> {
        self.lock = lock;
        Ok(true)
    }

    fn reserved(&mut self) -> Result<bool> {
        Ok(self.lock >= LockKind::Reserved)
    }

    fn current_lock(&self) -> Result<LockKind> {
        Ok(self.lock)
    }
}

struct ObfuscatingVfs;

impl Vfs for ObfuscatingVfs {
    type Handle = ObfuscatedFile;

    fn open(&self, name: Option<&Filename<'_>>, opts: OpenOptions) -> Result<Self::Handle> {
        let path = name
            .map(|n| n.filename().into_owned())
            .ok_or_else(|| Error::InvalidPath("anonymous temp file".into()))?;
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(matches!(
                opts.access,
                vfs::OpenAccess::Create | vfs::OpenAccess::CreateNew
            ))
            .open(&path)
            .map_err(io_err)?;
        Ok(ObfuscatedFile {
            file,
            lock: LockKind::None,
        })
    }

    fn delete(&self, name: &Filename<'_>, _sync_dir: bool) -> Result<()> {
        fs::remove_file(name.filename().as_ref()).or(Ok(()))
    }

    fn access(&self, name: &Filename<'_>, _flags: c_int) -> Result<bool> {
        Ok(fs::metadata(name.filename().as_ref()).is_ok())
    }

    fn full_pathname(&self, name: &Filename<'_>) -> Result<String> {
        Ok(name.filename().into_owned())
    }

    fn randomness(&self, buffer: &mut [u8]) {
        for (i, b) in buffer.iter_mut().enumerate() {
            *b = i as u8;
        }
    }

    fn sleep(&self, duration: Duration) -> Duration {
        duration
    }

    fn current_time(&self) -> f64 {
        2_440_587.5
    }
}

#[test]
fn obfuscating_vfs_round_trips_through_itself_but_not_the_raw_file() {
    let dir = std::env::temp_dir().join(format!(
        "sqlite_dispatch_core_vfs_scenario_{}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).unwrap();
    let db_path = dir.join("obfuscated.db");
    let _ = fs::remove_file(&db_path);

    vfs::register("obfuscate", ObfuscatingVfs, false).unwrap();

    {
        let db = Connection::open_with_flags_and_vfs(
            &db_path,
            OpenFlags::default(),
            "obfuscate",
        )
        .unwrap();
        db.execute_batch("CREATE TABLE t(x, y); INSERT INTO t VALUES (1, 'hello')")
            .unwrap();
    }

    let raw = fs::read(&db_path).unwrap();
    let mut unxored = raw.clone();
    xor_in_place(&mut unxored);
    assert_eq!(&unxored[0..16], b"SQLite format 3\0");
    assert_ne!(&raw[0..16], b"SQLite format 3\0");

    let db = Connection::open_with_flags_and_vfs(&db_path, OpenFlags::default(), "obfuscate")
        .unwrap();
    let value: String = db
        .prepare("SELECT y FROM t WHERE x = 1")
        .unwrap()
        .query([])
        .unwrap()
        .mapped(|row| row.get(0))
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(value, "hello");

    let _ = fs::remove_dir_all(&dir);
}
