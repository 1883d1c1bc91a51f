// Internal utilities
mod small_cstr;
mod sqlite_string;
pub(crate) use small_cstr::SmallCString;
pub(crate) use sqlite_string::SqliteMallocString;
