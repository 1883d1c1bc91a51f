//! `Bindings`: the single dynamic parameter set accepted by `Cursor::execute`
//! and `Connection::execute`.
//!
//! Rust callers with statically-known parameter lists should prefer the
//! generic [`Params`](crate::params::Params) machinery (`conn.execute(sql,
//! params![...])`); `Bindings` exists for call sites that only learn at
//! runtime whether they hold a positional sequence or a named mapping — the
//! same distinction APSW makes by checking for the `Mapping` protocol rather
//! than duck-typing `__getitem__`. Here that check is pushed to construction
//! time: a `Bindings` is built as either `Positional` or `Named`, never
//! inferred later from shape.

use std::convert::TryFrom;

use crate::types::Value;
#[cfg(feature = "blob")]
use crate::types::ZeroBlob;
use crate::{Error, Result};

/// One bound value: any ordinary SQLite value, or the `zeroblob` marker.
/// `zeroblob` is legal only as a *bound parameter*, never as the return value
/// of a scalar function.
#[derive(Clone, Debug, PartialEq)]
pub enum BoundValue {
    Value(Value),
    #[cfg(feature = "blob")]
    ZeroBlob(i32),
}

impl From<Value> for BoundValue {
    #[inline]
    fn from(v: Value) -> Self {
        BoundValue::Value(v)
    }
}

#[cfg(feature = "blob")]
impl From<ZeroBlob> for BoundValue {
    #[inline]
    fn from(z: ZeroBlob) -> Self {
        BoundValue::ZeroBlob(z.0)
    }
}

macro_rules! bound_value_from(
    ($t:ty) => {
        impl From<$t> for BoundValue {
            #[inline]
            fn from(v: $t) -> Self {
                BoundValue::Value(Value::from(v))
            }
        }
    }
);
bound_value_from!(bool);
bound_value_from!(i64);
bound_value_from!(f64);
bound_value_from!(String);
bound_value_from!(Vec<u8>);

impl From<i32> for BoundValue {
    #[inline]
    fn from(v: i32) -> Self {
        BoundValue::Value(Value::Integer(i64::from(v)))
    }
}

/// A 64-bit signed integer that did not fit, caught before it ever reaches
/// SQLite. Mirrors the `u64::to_sql` overflow path in `types::to_sql`.
pub fn integer_from_u64(v: u64) -> Result<BoundValue> {
    i64::try_from(v)
        .map(|i| BoundValue::Value(Value::Integer(i)))
        .map_err(|e| Error::ToSqlConversionFailure(Box::new(e)))
}

impl<T> From<Option<T>> for BoundValue
where
    BoundValue: From<T>,
{
    #[inline]
    fn from(v: Option<T>) -> Self {
        match v {
            None => BoundValue::Value(Value::Null),
            Some(v) => BoundValue::from(v),
        }
    }
}

/// The dynamic parameter set passed to one statement execution.
///
/// Classified once, at construction (`Bindings::positional`/`Bindings::named`
/// or the `From` impls below) — never reclassified later by inspecting its
/// shape.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Bindings {
    #[default]
    None,
    Positional(Vec<BoundValue>),
    /// Key is the bare parameter name with no `:`/`$`/`@` sigil; the same
    /// entry resolves whichever sigil the prepared statement actually used.
    Named(Vec<(String, BoundValue)>),
}

impl Bindings {
    pub fn positional<I, T>(values: I) -> Bindings
    where
        I: IntoIterator<Item = T>,
        BoundValue: From<T>,
    {
        Bindings::Positional(values.into_iter().map(BoundValue::from).collect())
    }

    pub fn named<I, S, T>(values: I) -> Bindings
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        BoundValue: From<T>,
    {
        Bindings::Named(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), BoundValue::from(v)))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Bindings::None => true,
            Bindings::Positional(v) => v.is_empty(),
            Bindings::Named(v) => v.is_empty(),
        }
    }
}

impl From<()> for Bindings {
    #[inline]
    fn from(_: ()) -> Self {
        Bindings::None
    }
}

impl<T> From<Vec<T>> for Bindings
where
    BoundValue: From<T>,
{
    #[inline]
    fn from(values: Vec<T>) -> Self {
        Bindings::positional(values)
    }
}

impl<T, S> From<Vec<(S, T)>> for Bindings
where
    BoundValue: From<T>,
    S: Into<String>,
{
    #[inline]
    fn from(values: Vec<(S, T)>) -> Self {
        Bindings::named(values)
    }
}

/// Strips a leading `:`, `$`, or `@` sigil, matching how SQLite reports bind
/// parameter names and how APSW's bindings dictionaries key them.
pub(crate) fn strip_sigil(name: &str) -> &str {
    let mut chars = name.chars();
    match chars.next() {
        Some(':') | Some('$') | Some('@') => chars.as_str(),
        _ => name,
    }
}

impl Bindings {
    /// Binds every slot of `stmt`: positional arity must match exactly,
    /// missing named keys bind NULL, and any value type is already
    /// restricted to `BoundValue`'s variants by construction.
    pub(crate) fn bind_in(&self, stmt: &mut crate::statement::Statement<'_>) -> Result<()> {
        let expected = stmt.parameter_count();
        match self {
            Bindings::None => {
                if expected != 0 {
                    return Err(Error::InvalidParameterCount(0, expected));
                }
                Ok(())
            }
            Bindings::Positional(values) => {
                if values.len() != expected {
                    return Err(Error::InvalidParameterCount(values.len(), expected));
                }
                for (i, v) in values.iter().enumerate() {
                    stmt.bind_bound_value(i + 1, v)?;
                }
                Ok(())
            }
            Bindings::Named(values) => {
                for i in 1..=expected {
                    let name = match stmt.parameter_name(i) {
                        Some(n) => n,
                        None => continue, // an anonymous `?` slot among named ones; left NULL
                    };
                    let key = strip_sigil(&name);
                    match values.iter().find(|(k, _)| k == key) {
                        Some((_, v)) => stmt.bind_bound_value(i, v)?,
                        None => stmt.bind_value(i, crate::types::ValueRef::Null)?,
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn positional_from_vec() {
        let b = Bindings::from(vec![1i64, 2, 3]);
        match b {
            Bindings::Positional(v) => assert_eq!(v.len(), 3),
            _ => panic!("expected Positional"),
        }
    }

    #[test]
    fn named_from_vec() {
        let b: Bindings = Bindings::named(vec![("name", "joe".to_string())]);
        match b {
            Bindings::Named(v) => {
                assert_eq!(v.len(), 1);
                assert_eq!(v[0].0, "name");
            }
            _ => panic!("expected Named"),
        }
    }

    #[test]
    fn strip_sigil_variants() {
        assert_eq!(strip_sigil(":name"), "name");
        assert_eq!(strip_sigil("$name"), "name");
        assert_eq!(strip_sigil("@name"), "name");
        assert_eq!(strip_sigil("name"), "name");
    }

    #[test]
    fn overflow_u64_rejected() {
        assert!(integer_from_u64(u64::MAX).is_err());
        assert!(integer_from_u64(1).is_ok());
    }
}
