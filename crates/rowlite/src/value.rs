//! Conversion between host values and the native SQLite value types.
//!
//! [`Param`] is what callers hand to the binder; [`Value`] is what comes back
//! out of a result column. Scalars round-trip through [`encode`] and
//! [`decode_column`] unchanged, and blobs stay blobs even when their bytes
//! happen to be valid UTF-8.

use core::ffi::c_int;
use std::fmt;
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::ffi;
use crate::raw::{SQLITE_BLOB, SQLITE_FLOAT, SQLITE_INTEGER, SQLITE_TEXT};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Null,
	Integer(i64),
	Float(f64),
	Text(String),
	Blob(Vec<u8>),
}

impl Value {
	#[must_use]
	pub const fn type_name(&self) -> &'static str {
		match self {
			Self::Null => "Null",
			Self::Integer(_) => "Integer",
			Self::Float(_) => "Float",
			Self::Text(_) => "Text",
			Self::Blob(_) => "Blob",
		}
	}

	#[must_use]
	pub const fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	#[must_use]
	pub const fn as_i64(&self) -> Option<i64> {
		match self {
			Self::Integer(v) => Some(*v),
			_ => None,
		}
	}

	#[must_use]
	pub const fn as_f64(&self) -> Option<f64> {
		match self {
			Self::Float(v) => Some(*v),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Text(v) => Some(v),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_blob(&self) -> Option<&[u8]> {
		match self {
			Self::Blob(v) => Some(v),
			_ => None,
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Null => f.write_str("NULL"),
			Self::Integer(v) => write!(f, "{v}"),
			Self::Float(v) => write!(f, "{v}"),
			Self::Text(v) => f.write_str(v),
			Self::Blob(v) => write!(f, "<{} byte blob>", v.len()),
		}
	}
}

/// A host value offered for binding.
///
/// `List`, `Map` and `Struct` are structured sources: the binder expands them
/// into several placeholder bindings instead of encoding them as one value.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
	Null,
	Bool(bool),
	Integer(i64),
	Unsigned(u64),
	Float(f64),
	Text(String),
	Blob(Vec<u8>),
	/// Values bound at consecutive positions.
	List(Vec<Self>),
	/// Keyed record; keys are placeholder names (text) or indices (integer).
	Map(Vec<(Self, Self)>),
	/// Record-like object exposing named fields.
	Struct(Vec<(String, Self)>),
	/// A host value the codec has no native representation for.
	Opaque { type_name: &'static str },
}

/// Record-like objects that expose their fields by name.
pub trait NamedFields {
	fn named_fields(&self) -> Vec<(String, Param)>;
}

impl Param {
	#[must_use]
	pub const fn type_name(&self) -> &'static str {
		match self {
			Self::Null => "Null",
			Self::Bool(_) => "Bool",
			Self::Integer(_) => "Integer",
			Self::Unsigned(_) => "Unsigned",
			Self::Float(_) => "Float",
			Self::Text(_) => "Text",
			Self::Blob(_) => "Blob",
			Self::List(_) => "List",
			Self::Map(_) => "Map",
			Self::Struct(_) => "Struct",
			Self::Opaque { type_name } => type_name,
		}
	}

	/// Wraps a value of a type the codec cannot bind.
	#[must_use]
	pub fn opaque<T: ?Sized>() -> Self {
		Self::Opaque { type_name: std::any::type_name::<T>() }
	}

	pub fn from_fields<T>(record: &T) -> Self
	where
		T: NamedFields + ?Sized,
	{
		Self::Struct(record.named_fields())
	}

	pub fn map<K, V, I>(entries: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<Self>,
		V: Into<Self>,
	{
		Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}

	pub fn list<V, I>(values: I) -> Self
	where
		I: IntoIterator<Item = V>,
		V: Into<Self>,
	{
		Self::List(values.into_iter().map(Into::into).collect())
	}

	#[must_use]
	pub const fn is_structured(&self) -> bool {
		matches!(self, Self::List(_) | Self::Map(_) | Self::Struct(_))
	}
}

/// Encodes one scalar host value, `position` naming it in errors.
pub fn encode(param: &Param, position: impl fmt::Display) -> Result<Value> {
	let value = match param {
		Param::Null => Value::Null,
		Param::Bool(v) => Value::Integer(i64::from(*v)),
		Param::Integer(v) => Value::Integer(*v),
		Param::Unsigned(v) => Value::Integer(i64::try_from(*v).map_err(|_| {
			Error::parameter(format!(
				"Cannot bind parameter at position {position}: integer {v} does not fit in 64 bits"
			))
		})?),
		Param::Float(v) => Value::Float(*v),
		Param::Text(v) => Value::Text(v.clone()),
		Param::Blob(v) => Value::Blob(v.clone()),
		Param::List(_) | Param::Map(_) | Param::Struct(_) | Param::Opaque { .. } => {
			return Err(Error::parameter(format!(
				"Cannot bind parameter at position {position} of type {}",
				param.type_name()
			)));
		}
	};
	Ok(value)
}

/// Reads column `index` of the current row.
pub(crate) fn decode_column(stmt: *mut ffi::Sqlite3Stmt, index: c_int) -> Value {
	match unsafe { ffi::sqlite3_column_type(stmt, index) } {
		SQLITE_INTEGER => Value::Integer(unsafe { ffi::sqlite3_column_int64(stmt, index) }),
		SQLITE_FLOAT => Value::Float(unsafe { ffi::sqlite3_column_double(stmt, index) }),
		SQLITE_TEXT => {
			let ptr = unsafe { ffi::sqlite3_column_text(stmt, index) };
			let bytes = unsafe { ffi::sqlite3_column_bytes(stmt, index) };
			text_value(column_bytes(ptr, bytes))
		}
		SQLITE_BLOB => {
			let ptr = unsafe { ffi::sqlite3_column_blob(stmt, index) };
			let bytes = unsafe { ffi::sqlite3_column_bytes(stmt, index) };
			Value::Blob(column_bytes(ptr.cast::<u8>(), bytes).map(<[u8]>::to_vec).unwrap_or_default())
		}
		_ => Value::Null,
	}
}

/// Reads a protected value handed out by the session extension.
#[cfg(feature = "session")]
pub(crate) fn decode_value(value: *mut ffi::Sqlite3Value) -> Value {
	if value.is_null() {
		return Value::Null;
	}
	match unsafe { ffi::sqlite3_value_type(value) } {
		SQLITE_INTEGER => Value::Integer(unsafe { ffi::sqlite3_value_int64(value) }),
		SQLITE_FLOAT => Value::Float(unsafe { ffi::sqlite3_value_double(value) }),
		SQLITE_TEXT => {
			let ptr = unsafe { ffi::sqlite3_value_text(value) };
			let bytes = unsafe { ffi::sqlite3_value_bytes(value) };
			text_value(column_bytes(ptr, bytes))
		}
		SQLITE_BLOB => {
			let ptr = unsafe { ffi::sqlite3_value_blob(value) };
			let bytes = unsafe { ffi::sqlite3_value_bytes(value) };
			Value::Blob(column_bytes(ptr.cast::<u8>(), bytes).map(<[u8]>::to_vec).unwrap_or_default())
		}
		_ => Value::Null,
	}
}

/// Text that is not valid UTF-8 comes back as the raw bytes.
fn text_value(bytes: Option<&[u8]>) -> Value {
	let Some(bytes) = bytes else {
		return Value::Text(String::new());
	};
	match std::str::from_utf8(bytes) {
		Ok(text) => Value::Text(text.to_string()),
		Err(_) => Value::Blob(bytes.to_vec()),
	}
}

fn column_bytes<'a>(ptr: *const u8, len: c_int) -> Option<&'a [u8]> {
	let len = usize::try_from(len).ok().filter(|len| *len > 0)?;
	if ptr.is_null() {
		return None;
	}
	Some(unsafe { std::slice::from_raw_parts(ptr, len) })
}

macro_rules! param_from_signed {
	($($ty:ty),*) => {
		$(impl From<$ty> for Param {
			fn from(value: $ty) -> Self {
				Self::Integer(i64::from(value))
			}
		})*
	};
}

param_from_signed!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Param {
	fn from(value: u64) -> Self {
		Self::Unsigned(value)
	}
}

impl From<usize> for Param {
	fn from(value: usize) -> Self {
		Self::Unsigned(value as u64)
	}
}

impl From<isize> for Param {
	fn from(value: isize) -> Self {
		Self::Integer(value as i64)
	}
}

impl From<f32> for Param {
	fn from(value: f32) -> Self {
		Self::Float(f64::from(value))
	}
}

impl From<f64> for Param {
	fn from(value: f64) -> Self {
		Self::Float(value)
	}
}

impl From<bool> for Param {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<&str> for Param {
	fn from(value: &str) -> Self {
		Self::Text(value.to_string())
	}
}

impl From<String> for Param {
	fn from(value: String) -> Self {
		Self::Text(value)
	}
}

impl From<&String> for Param {
	fn from(value: &String) -> Self {
		Self::Text(value.clone())
	}
}

impl From<Vec<u8>> for Param {
	fn from(value: Vec<u8>) -> Self {
		Self::Blob(value)
	}
}

impl From<&[u8]> for Param {
	fn from(value: &[u8]) -> Self {
		Self::Blob(value.to_vec())
	}
}

impl<const N: usize> From<&[u8; N]> for Param {
	fn from(value: &[u8; N]) -> Self {
		Self::Blob(value.to_vec())
	}
}

impl<T> From<Option<T>> for Param
where
	T: Into<Self>,
{
	fn from(value: Option<T>) -> Self {
		value.map_or(Self::Null, Into::into)
	}
}

impl From<Value> for Param {
	fn from(value: Value) -> Self {
		match value {
			Value::Null => Self::Null,
			Value::Integer(v) => Self::Integer(v),
			Value::Float(v) => Self::Float(v),
			Value::Text(v) => Self::Text(v),
			Value::Blob(v) => Self::Blob(v),
		}
	}
}

impl From<&Value> for Param {
	fn from(value: &Value) -> Self {
		Self::from(value.clone())
	}
}

impl From<SystemTime> for Param {
	fn from(_: SystemTime) -> Self {
		Self::opaque::<SystemTime>()
	}
}

impl From<Vec<Self>> for Param {
	fn from(value: Vec<Self>) -> Self {
		Self::List(value)
	}
}

/// Builds a positional parameter list.
///
/// ```
/// let params = rowlite::params![1, "two", 3.0];
/// assert_eq!(params.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
	() => {
		::std::vec::Vec::<$crate::Param>::new()
	};
	($($value:expr),+ $(,)?) => {
		::std::vec![$($crate::Param::from($value)),+]
	};
}

/// Builds a keyed record parameter.
///
/// ```
/// let record = rowlite::named! { "foo" => 41, "bar" => "x" };
/// assert!(record.is_structured());
/// ```
#[macro_export]
macro_rules! named {
	($($key:expr => $value:expr),* $(,)?) => {
		$crate::Param::Map(::std::vec![$(($crate::Param::from($key), $crate::Param::from($value))),*])
	};
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn invalid_utf8_text_falls_back_to_blob() {
		assert_eq!(text_value(Some(b"ok".as_slice())), Value::Text("ok".to_string()));
		assert_eq!(text_value(Some([0xff, 0x41].as_slice())), Value::Blob(vec![0xff, 0x41]));
		assert_eq!(text_value(None), Value::Text(String::new()));
	}

	#[test]
	fn scalars_encode_to_native_values() {
		assert_eq!(encode(&Param::Null, 1).expect("null"), Value::Null);
		assert_eq!(encode(&Param::Bool(true), 1).expect("true"), Value::Integer(1));
		assert_eq!(encode(&Param::Bool(false), 1).expect("false"), Value::Integer(0));
		assert_eq!(encode(&Param::from(i64::MIN), 1).expect("min"), Value::Integer(i64::MIN));
		assert_eq!(encode(&Param::from(2.5_f64), 1).expect("float"), Value::Float(2.5));
		assert_eq!(encode(&Param::from(""), 1).expect("text"), Value::Text(String::new()));
		assert_eq!(encode(&Param::from(Vec::<u8>::new()), 1).expect("blob"), Value::Blob(Vec::new()));
	}

	#[test]
	fn unsigned_overflow_is_a_parameter_error() {
		assert_eq!(
			encode(&Param::from(u64::try_from(i64::MAX).expect("fits")), 1).expect("max"),
			Value::Integer(i64::MAX)
		);

		let err = encode(&Param::from(u64::MAX), 3).expect_err("overflow");
		assert_eq!(err.kind(), crate::ErrorKind::Parameter);
		assert!(err.to_string().contains("position 3"));
	}

	#[test]
	fn unsupported_values_name_position_and_type() {
		let err = encode(&Param::from(SystemTime::now()), 2).expect_err("opaque");
		assert_eq!(
			err.to_string(),
			"Cannot bind parameter at position 2 of type std::time::SystemTime"
		);

		let err = encode(&Param::list([1, 2]), 1).expect_err("list");
		assert_eq!(err.to_string(), "Cannot bind parameter at position 1 of type List");
	}

	#[test]
	fn options_and_values_convert() {
		assert_eq!(Param::from(None::<i64>), Param::Null);
		assert_eq!(Param::from(Some("x")), Param::Text("x".to_string()));
		assert_eq!(Param::from(Value::Blob(vec![0xff])), Param::Blob(vec![0xff]));
		assert_eq!(Param::from(b"ab"), Param::Blob(b"ab".to_vec()));
	}

	#[test]
	fn macros_build_params() {
		assert_eq!(params![1, "a"], vec![Param::Integer(1), Param::Text("a".to_string())]);
		assert!(params![].is_empty());
		assert_eq!(
			named! { "foo" => 41 },
			Param::Map(vec![(Param::Text("foo".to_string()), Param::Integer(41))])
		);
	}
}
