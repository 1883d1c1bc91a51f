//! End-to-end coverage for a read-only virtual table over a fixed
//! in-memory row set, exercising `xBestIndex` constraint/order-by
//! push-down.
#![cfg(feature = "vtab")]

extern crate sqlite_dispatch_core;

use std::os::raw::c_int;

use sqlite_dispatch_core::vtab::{
    read_only_module, sqlite3_vtab, sqlite3_vtab_cursor, Context, CreateVTab, IndexConstraintOp,
    IndexInfo, VTab, VTabConnection, VTabCursor, Values,
};
use sqlite_dispatch_core::{Connection, Result};

#[derive(Clone, Copy)]
struct Row {
    rowid: i64,
    name: &'static str,
    size: i64,
}

const ROWS: &[Row] = &[
    Row { rowid: 1, name: "a", size: 10 },
    Row { rowid: 2, name: "b", size: 20 },
    Row { rowid: 3, name: "c", size: 30 },
];

const SIZE_COLUMN: c_int = 1;

#[repr(C)]
struct FilesTab {
    base: sqlite3_vtab,
}

impl VTab for FilesTab {
    type Aux = ();
    type Cursor = FilesCursor;

    fn connect(
        _db: &mut VTabConnection,
        _aux: Option<&()>,
        _args: &[&[u8]],
    ) -> Result<(String, Self)> {
        Ok((
            "CREATE TABLE x(name TEXT, size INTEGER)".to_owned(),
            FilesTab {
                base: unsafe { std::mem::zeroed() },
            },
        ))
    }

    fn best_index(&self, info: &mut IndexInfo) -> Result<()> {
        let mut min_size_argv = None;
        for (i, constraint) in info.constraints().enumerate() {
            if constraint.is_usable()
                && constraint.column() == SIZE_COLUMN
                && constraint.operator() == IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_GT
            {
                min_size_argv = Some(i);
            }
        }
        if let Some(i) = min_size_argv {
            info.constraint_usage(i).set_argv_index(1);
            info.constraint_usage(i).set_omit(true);
            info.set_idx_num(1);
        } else {
            info.set_idx_num(0);
        }

        let ordered_by_size = info.num_of_order_by() == 1
            && info
                .order_bys()
                .next()
                .is_some_and(|ob| ob.column() == SIZE_COLUMN && !ob.is_order_by_desc());
        info.set_order_by_consumed(ordered_by_size);
        info.set_estimated_cost(ROWS.len() as f64);
        Ok(())
    }

    fn open(&self) -> Result<FilesCursor> {
        Ok(FilesCursor {
            base: unsafe { std::mem::zeroed() },
            pos: 0,
            min_size: None,
        })
    }
}

impl CreateVTab for FilesTab {}

#[repr(C)]
struct FilesCursor {
    base: sqlite3_vtab_cursor,
    pos: usize,
    min_size: Option<i64>,
}

impl FilesCursor {
    fn row(&self) -> Row {
        ROWS[self.pos]
    }
}

impl VTabCursor for FilesCursor {
    fn filter(&mut self, idx_num: c_int, _idx_str: Option<&str>, args: &Values<'_>) -> Result<()> {
        self.min_size = if idx_num == 1 { Some(args.get::<i64>(0)?) } else { None };
        self.pos = 0;
        while !self.eof() && !self.matches() {
            self.pos += 1;
        }
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        self.pos += 1;
        while !self.eof() && !self.matches() {
            self.pos += 1;
        }
        Ok(())
    }

    fn eof(&self) -> bool {
        self.pos >= ROWS.len()
    }

    fn column(&self, ctx: &mut Context, i: c_int) -> Result<()> {
        let row = self.row();
        match i {
            0 => ctx.set_result(&row.name),
            1 => ctx.set_result(&row.size),
            _ => Ok(()),
        }
    }

    fn rowid(&self) -> Result<i64> {
        Ok(self.row().rowid)
    }
}

impl FilesCursor {
    fn matches(&self) -> bool {
        match self.min_size {
            Some(min) => self.row().size > min,
            None => true,
        }
    }
}

#[test]
fn pushes_down_the_size_constraint_and_order_by() {
    let db = Connection::open_in_memory().unwrap();
    db.create_module("files_module", &read_only_module::<FilesTab>(1), None)
        .unwrap();
    db.execute_batch("CREATE VIRTUAL TABLE files USING files_module()")
        .unwrap();

    let mut stmt = db
        .prepare("SELECT name FROM files WHERE size > 15 ORDER BY size")
        .unwrap();
    let names: Vec<String> = stmt
        .query([])
        .unwrap()
        .mapped(|row| row.get(0))
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(names, vec!["b".to_owned(), "c".to_owned()]);
}
