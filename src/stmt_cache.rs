//! Bounded prepared-statement cache keyed by `(SQL text, prepare_flags)`.
//!
//! A [`Cursor`](crate::cursor::Cursor) checks a statement out with [`StmtCache::get`]
//! and returns it with [`StmtCache::release`]; while checked out an entry is
//! absent from the LRU map, which is what makes it impossible to evict a
//! statement a live Cursor still holds.

use std::cell::RefCell;
use std::os::raw::c_int;
use std::sync::Arc;

use hashlink::LruCache;

use crate::raw_statement::RawStatement;
use crate::{Connection, Result};

/// Default bound on the SQL text length of a cacheable statement, used until
/// `Connection::open` asks SQLite for `SQLITE_LIMIT_SQL_LENGTH`.
const DEFAULT_MAX_CACHEABLE_BYTES: usize = 1_000_000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Configured maximum number of idle entries.
    pub size: usize,
    /// Number of entries currently idle in the cache.
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub too_big: u64,
    pub no_cache: u64,
    pub max_cacheable_bytes: usize,
}

/// One idle entry enumerated by `cache_stats(include_entries = true)`.
#[derive(Debug, Clone)]
pub struct CacheEntryInfo {
    pub sql: Arc<str>,
    pub prepare_flags: c_int,
}

type Key = (Arc<str>, c_int);

struct Inner {
    map: LruCache<Key, RawStatement>,
    generation: u64,
    hits: u64,
    misses: u64,
    too_big: u64,
    no_cache: u64,
    max_cacheable_bytes: usize,
}

/// Prepared-statement LRU cache for one `Connection`.
#[derive(Debug)]
pub struct StmtCache(RefCell<Inner>);

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("len", &self.map.len())
            .field("capacity", &self.map.capacity())
            .field("generation", &self.generation)
            .finish()
    }
}

impl StmtCache {
    pub fn with_capacity(capacity: usize) -> StmtCache {
        StmtCache(RefCell::new(Inner {
            map: LruCache::new(capacity),
            generation: 0,
            hits: 0,
            misses: 0,
            too_big: 0,
            no_cache: 0,
            max_cacheable_bytes: DEFAULT_MAX_CACHEABLE_BYTES,
        }))
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.0.borrow_mut().map.set_capacity(capacity);
    }

    pub fn set_max_cacheable_bytes(&self, max_cacheable_bytes: usize) {
        self.0.borrow_mut().max_cacheable_bytes = max_cacheable_bytes;
    }

    /// Look up `(sql, prepare_flags)`, re-preparing on a miss.
    ///
    /// `can_cache = false` always prepares fresh and returns a statement
    /// with no cache key set, so [`release`](Self::release) finalizes it
    /// instead of inserting it back.
    pub fn get(
        &self,
        conn: &Connection,
        sql: &str,
        prepare_flags: c_int,
        can_cache: bool,
    ) -> Result<RawStatement> {
        let trimmed = sql.trim();
        let mut inner = self.0.borrow_mut();

        if !can_cache {
            inner.no_cache += 1;
            drop(inner);
            return conn.prepare_with_flags(trimmed, prepare_flags);
        }
        if trimmed.len() > inner.max_cacheable_bytes {
            inner.too_big += 1;
            drop(inner);
            return conn.prepare_with_flags(trimmed, prepare_flags);
        }

        let key: Key = (Arc::from(trimmed), prepare_flags);
        let generation = inner.generation;
        if let Some(mut stmt) = inner.map.remove(&key) {
            if stmt.statement_cache_generation() == generation {
                inner.hits += 1;
                return Ok(stmt);
            }
            // Stale: the cache was invalidated since this entry was inserted.
            stmt.set_statement_cache_key(None::<Arc<str>>);
        }
        inner.misses += 1;
        drop(inner);

        let mut stmt = conn.prepare_with_flags(trimmed, prepare_flags)?;
        stmt.set_statement_cache_key(key.0.clone());
        stmt.set_prepare_flags(prepare_flags);
        stmt.set_statement_cache_generation(self.0.borrow().generation);
        Ok(stmt)
    }

    /// Return a statement previously obtained from [`get`](Self::get). Finalized
    /// immediately if it has no cache key (came from a `can_cache = false`
    /// call), is null, or the cache has since been invalidated.
    pub fn release(&self, mut stmt: RawStatement) {
        if stmt.is_null() {
            return;
        }
        let mut inner = self.0.borrow_mut();
        let key = match stmt.statement_cache_key() {
            Some(sql) if stmt.statement_cache_generation() == inner.generation => {
                (sql, stmt.prepare_flags())
            }
            _ => return, // dropped here, finalizing via RawStatement::drop
        };
        stmt.clear_bindings();
        stmt.reset();
        if inner.map.capacity() == 0 {
            return;
        }
        inner.map.insert(key, stmt);
    }

    /// Finalizes every idle entry and bumps the generation counter so any
    /// statement currently checked out is finalized (not reinserted) on its
    /// next `release`.
    pub fn invalidate_all(&self) {
        let mut inner = self.0.borrow_mut();
        inner.map.clear();
        inner.generation += 1;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.0.borrow();
        CacheStats {
            size: inner.map.capacity(),
            entries: inner.map.len(),
            hits: inner.hits,
            misses: inner.misses,
            too_big: inner.too_big,
            no_cache: inner.no_cache,
            max_cacheable_bytes: inner.max_cacheable_bytes,
        }
    }

    pub fn cache_stats(&self, include_entries: bool) -> (CacheStats, Option<Vec<CacheEntryInfo>>) {
        let stats = self.stats();
        if !include_entries {
            return (stats, None);
        }
        let inner = self.0.borrow();
        let entries = inner
            .map
            .iter()
            .map(|((sql, flags), _)| CacheEntryInfo {
                sql: sql.clone(),
                prepare_flags: *flags,
            })
            .collect();
        (stats, Some(entries))
    }

    pub fn flush(&self) {
        self.0.borrow_mut().map.clear();
    }
}

impl Connection {
    /// Borrow a statement for `sql` from this connection's cache, preparing a
    /// fresh one on a miss. See [`StmtCache::get`].
    pub fn prepare_cached_raw(
        &self,
        sql: &str,
        prepare_flags: c_int,
        can_cache: bool,
    ) -> Result<RawStatement> {
        self.stmt_cache().get(self, sql, prepare_flags, can_cache)
    }

    /// Return a statement obtained from [`prepare_cached_raw`](Self::prepare_cached_raw).
    pub fn release_cached_raw(&self, stmt: RawStatement) {
        self.stmt_cache().release(stmt)
    }

    pub fn flush_prepared_statement_cache(&self) {
        self.stmt_cache().flush()
    }

    pub fn set_prepared_statement_cache_capacity(&self, capacity: usize) {
        self.stmt_cache().set_capacity(capacity)
    }

    pub fn cache_stats(&self, include_entries: bool) -> (CacheStats, Option<Vec<CacheEntryInfo>>) {
        self.stmt_cache().cache_stats(include_entries)
    }
}

#[cfg(test)]
mod test {
    use crate::Connection;
    use fallible_iterator::FallibleIterator;

    #[test]
    fn test_cache_hit_and_miss() {
        let db = Connection::open_in_memory().unwrap();
        let sql = "PRAGMA schema_version";
        {
            let mut cursor = db.prepare_cached(sql).unwrap();
            assert_eq!(0, cursor.query_row((), |r| r.get::<_, i64>(0)).unwrap());
        }
        let (stats, _) = db.cache_stats(false);
        assert_eq!(1, stats.entries);
        assert_eq!(1, stats.misses);

        {
            let mut cursor = db.prepare_cached(sql).unwrap();
            assert_eq!(0, cursor.query_row((), |r| r.get::<_, i64>(0)).unwrap());
        }
        let (stats, _) = db.cache_stats(false);
        assert_eq!(1, stats.entries);
        assert_eq!(1, stats.hits);
    }

    #[test]
    fn test_set_capacity() {
        let db = Connection::open_in_memory().unwrap();
        let sql = "PRAGMA schema_version";
        db.prepare_cached(sql).unwrap();
        db.set_prepared_statement_cache_capacity(0);
        let (stats, _) = db.cache_stats(false);
        assert_eq!(0, stats.entries);
    }

    #[test]
    fn test_too_big() {
        let db = Connection::open_in_memory().unwrap();
        db.stmt_cache().set_max_cacheable_bytes(4);
        db.prepare_cached("select 1").unwrap();
        let (stats, _) = db.cache_stats(false);
        assert_eq!(1, stats.too_big);
        assert_eq!(0, stats.entries);
    }

    #[test]
    fn test_invalidate_all() {
        let db = Connection::open_in_memory().unwrap();
        let sql = "select 1";
        db.prepare_cached(sql).unwrap();
        let (stats, _) = db.cache_stats(false);
        assert_eq!(1, stats.entries);

        db.stmt_cache().invalidate_all();
        let (stats, _) = db.cache_stats(false);
        assert_eq!(0, stats.entries);

        // A fresh lookup after invalidation is a miss, not a stale hit.
        db.prepare_cached(sql).unwrap();
        let (stats, _) = db.cache_stats(false);
        assert_eq!(1, stats.entries);
    }
}
