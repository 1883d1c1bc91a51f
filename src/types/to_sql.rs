use std::borrow::Cow;
use std::convert::TryFrom;

use super::{Null, Value, ValueRef};
use crate::Result;

/// `ToSqlOutput` represents the possible output types for implementors of the
/// [`ToSql`] trait.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ToSqlOutput<'a> {
    /// A borrowed SQLite-representable value.
    Borrowed(ValueRef<'a>),

    /// An owned SQLite-representable value.
    Owned(Value),

    /// A BLOB of the given length that is filled with zeroes. Only
    /// meaningful when bound as a statement parameter (see
    /// [`Bindings`](crate::bindings::Bindings)); never produced as the
    /// return value of a scalar function.
    #[cfg(feature = "blob")]
    ZeroBlob(i32),
}

impl<'a> From<ValueRef<'a>> for ToSqlOutput<'a> {
    #[inline]
    fn from(value: ValueRef<'a>) -> Self {
        ToSqlOutput::Borrowed(value)
    }
}

impl From<Value> for ToSqlOutput<'_> {
    #[inline]
    fn from(value: Value) -> Self {
        ToSqlOutput::Owned(value)
    }
}

macro_rules! from_owned(
    ($t:ty) => (
        impl From<$t> for ToSqlOutput<'_> {
            #[inline]
            fn from(t: $t) -> Self {
                ToSqlOutput::Owned(t.into())
            }
        }
    )
);

from_owned!(String);
from_owned!(Vec<u8>);

impl<'a> From<&'a str> for ToSqlOutput<'a> {
    #[inline]
    fn from(s: &'a str) -> Self {
        ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes()))
    }
}

impl<'a> From<&'a [u8]> for ToSqlOutput<'a> {
    #[inline]
    fn from(s: &'a [u8]) -> Self {
        ToSqlOutput::Borrowed(ValueRef::Blob(s))
    }
}

impl<'a> From<Cow<'a, str>> for ToSqlOutput<'a> {
    #[inline]
    fn from(s: Cow<'a, str>) -> Self {
        match s {
            Cow::Borrowed(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Cow::Owned(s) => ToSqlOutput::Owned(Value::Text(s)),
        }
    }
}

impl ToSqlOutput<'_> {
    /// Returns the underlying `ValueRef`, never `ZeroBlob` (callers needing
    /// `ZeroBlob` handling must match on the enum directly; this helper is
    /// only valid for statement binding where `ZeroBlob` is handled
    /// up-front).
    #[inline]
    pub(crate) fn as_value_ref(&self) -> ValueRef<'_> {
        match self {
            ToSqlOutput::Borrowed(v) => *v,
            ToSqlOutput::Owned(v) => v.into(),
            #[cfg(feature = "blob")]
            ToSqlOutput::ZeroBlob(_) => ValueRef::Null,
        }
    }
}

/// A trait for types that can be converted into SQLite values. Used for
/// binding parameters and table constraint values; never used for scalar
/// function *return* values, which always go through
/// [`Context::set_result`](crate::functions::Context::set_result).
pub trait ToSql {
    /// Converts Rust value to SQLite value.
    fn to_sql(&self) -> Result<ToSqlOutput<'_>>;
}

impl ToSql for ToSqlOutput<'_> {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(match *self {
            ToSqlOutput::Borrowed(v) => ToSqlOutput::Borrowed(v),
            ToSqlOutput::Owned(ref v) => ToSqlOutput::Borrowed(ValueRef::from(v)),
            #[cfg(feature = "blob")]
            ToSqlOutput::ZeroBlob(i) => ToSqlOutput::ZeroBlob(i),
        })
    }
}

macro_rules! to_sql_self(
    ($t:ty) => (
        impl ToSql for $t {
            #[inline]
            fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(*self))
            }
        }
    )
);

macro_rules! to_sql_via_i64(
    ($t:ty) => (
        impl ToSql for $t {
            #[inline]
            fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::Owned(Value::Integer(i64::from(*self))))
            }
        }
    )
);

impl From<bool> for ToSqlOutput<'_> {
    #[inline]
    fn from(b: bool) -> Self {
        ToSqlOutput::Owned(Value::Integer(b as i64))
    }
}
impl From<i64> for ToSqlOutput<'_> {
    #[inline]
    fn from(i: i64) -> Self {
        ToSqlOutput::Owned(Value::Integer(i))
    }
}
impl From<f64> for ToSqlOutput<'_> {
    #[inline]
    fn from(f: f64) -> Self {
        ToSqlOutput::Owned(Value::Real(f))
    }
}

to_sql_self!(bool);
to_sql_self!(i64);
to_sql_self!(f64);

to_sql_via_i64!(i8);
to_sql_via_i64!(i16);
to_sql_via_i64!(i32);
to_sql_via_i64!(u8);
to_sql_via_i64!(u16);
to_sql_via_i64!(u32);

impl ToSql for u64 {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        i64::try_from(*self)
            .map(|i| ToSqlOutput::Owned(Value::Integer(i)))
            .map_err(|e| crate::Error::ToSqlConversionFailure(Box::new(e)))
    }
}

impl ToSql for usize {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        (*self as u64).to_sql()
    }
}

impl ToSql for isize {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        (*self as i64).to_sql()
    }
}

impl ToSql for f32 {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(Value::Real(f64::from(*self))))
    }
}

impl ToSql for str {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Text(self.as_bytes())))
    }
}

impl ToSql for String {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Text(self.as_bytes())))
    }
}

impl ToSql for [u8] {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Blob(self)))
    }
}

impl ToSql for Vec<u8> {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Blob(self)))
    }
}

impl ToSql for Value {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::from(self)))
    }
}

impl ToSql for Null {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Null))
    }
}

/// Marker type requesting a zero-filled blob of the given length, either as
/// a bound statement parameter (`sqlite3_bind_zeroblob`) or as the result
/// of a scalar/aggregate function (`sqlite3_result_zeroblob`).
#[cfg(feature = "blob")]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ZeroBlob(pub i32);

#[cfg(feature = "blob")]
impl ToSql for ZeroBlob {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::ZeroBlob(self.0))
    }
}

impl<T: ?Sized + ToSql> ToSql for &T {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        (*self).to_sql()
    }
}

impl<T: ToSql> ToSql for Option<T> {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        match *self {
            None => Ok(ToSqlOutput::Borrowed(ValueRef::Null)),
            Some(ref t) => t.to_sql(),
        }
    }
}

impl<T: ?Sized + ToSql> ToSql for Box<T> {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        (**self).to_sql()
    }
}

impl<T: ?Sized + ToSql> ToSql for std::rc::Rc<T> {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        (**self).to_sql()
    }
}

impl<T: ?Sized + ToSql> ToSql for std::sync::Arc<T> {
    #[inline]
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        (**self).to_sql()
    }
}

#[cfg(test)]
mod test {
    use super::ToSql;
    use crate::types::{ToSqlOutput, Value, ValueRef};
    use crate::Result;

    fn is_to_sql<T: ToSql>() {}

    #[test]
    fn test_integral_types() -> Result<()> {
        is_to_sql::<i8>();
        is_to_sql::<i16>();
        is_to_sql::<i32>();
        is_to_sql::<i64>();
        is_to_sql::<u8>();
        is_to_sql::<u16>();
        is_to_sql::<u32>();
        Ok(())
    }

    #[test]
    fn test_str_borrowed() -> Result<()> {
        let s = "hello";
        match s.to_sql()? {
            ToSqlOutput::Borrowed(ValueRef::Text(b)) => assert_eq!(b, b"hello"),
            other => panic!("unexpected {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_owned_value() -> Result<()> {
        let v = Value::Integer(42);
        match v.to_sql()? {
            ToSqlOutput::Borrowed(ValueRef::Integer(i)) => assert_eq!(i, 42),
            other => panic!("unexpected {:?}", other),
        }
        Ok(())
    }
}
