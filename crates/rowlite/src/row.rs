//! Turning fetched native rows into host-shaped values.

use core::ffi::c_int;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ffi;
use crate::value::{Value, decode_column};

/// Base output shape of a row.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Shape {
	/// Column name to value, in column order.
	#[default]
	Record,
	/// Values only, in column order.
	Array,
	/// The single column's value. Only valid for one-column results.
	Splat,
}

/// A user function applied to every materialized row.
#[derive(Clone)]
pub struct Transform(Arc<dyn Fn(Row) -> Row + Send + Sync>);

impl Transform {
	pub fn new<F>(f: F) -> Self
	where
		F: Fn(Row) -> Row + Send + Sync + 'static,
	{
		Self(Arc::new(f))
	}

	fn apply(&self, row: Row) -> Row {
		(self.0)(row)
	}
}

impl fmt::Debug for Transform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Transform(..)")
	}
}

/// Output mode of a statement.
#[derive(Debug, Clone, Default)]
pub enum Mode {
	#[default]
	Record,
	Array,
	Splat,
	Transform { base: Shape, transform: Transform },
}

impl Mode {
	pub fn transform<F>(base: Shape, f: F) -> Self
	where
		F: Fn(Row) -> Row + Send + Sync + 'static,
	{
		Self::Transform { base, transform: Transform::new(f) }
	}

	#[must_use]
	pub const fn shape(&self) -> Shape {
		match self {
			Self::Record => Shape::Record,
			Self::Array => Shape::Array,
			Self::Splat => Shape::Splat,
			Self::Transform { base, .. } => *base,
		}
	}

	/// Rejects column counts the shape cannot represent, before anything is stepped.
	pub(crate) fn check_columns(&self, count: usize) -> Result<()> {
		if self.shape() == Shape::Splat && count > 1 {
			return Err(Error::usage(format!(
				"A splat query may only return a single column, got {count} columns"
			)));
		}
		Ok(())
	}
}

impl From<Shape> for Mode {
	fn from(shape: Shape) -> Self {
		match shape {
			Shape::Record => Self::Record,
			Shape::Array => Self::Array,
			Shape::Splat => Self::Splat,
		}
	}
}

/// One materialized row.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
	Record(Record),
	Array(Vec<Value>),
	Value(Value),
}

impl Row {
	#[must_use]
	pub fn into_record(self) -> Option<Record> {
		match self {
			Self::Record(record) => Some(record),
			_ => None,
		}
	}

	#[must_use]
	pub fn into_array(self) -> Option<Vec<Value>> {
		match self {
			Self::Array(values) => Some(values),
			_ => None,
		}
	}

	#[must_use]
	pub fn into_value(self) -> Option<Value> {
		match self {
			Self::Value(value) => Some(value),
			_ => None,
		}
	}

	/// All values of the row in column order, whatever its shape.
	#[must_use]
	pub fn into_values(self) -> Vec<Value> {
		match self {
			Self::Record(record) => record.into_values(),
			Self::Array(values) => values,
			Self::Value(value) => vec![value],
		}
	}
}

/// Column-keyed row. Duplicate column names are kept as separate entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
	columns: Arc<[String]>,
	values: Vec<Value>,
}

impl Record {
	pub(crate) const fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
		Self { columns, values }
	}

	pub fn from_pairs<K, I>(pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, Value)>,
		K: Into<String>,
	{
		let (columns, values): (Vec<String>, Vec<Value>) =
			pairs.into_iter().map(|(name, value)| (name.into(), value)).unzip();
		Self { columns: columns.into(), values }
	}

	/// First value whose column is called `name`.
	#[must_use]
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.columns.iter().position(|column| column == name).and_then(|index| self.values.get(index))
	}

	#[must_use]
	pub fn get_index(&self, index: usize) -> Option<&Value> {
		self.values.get(index)
	}

	#[must_use]
	pub fn columns(&self) -> &[String] {
		&self.columns
	}

	#[must_use]
	pub fn values(&self) -> &[Value] {
		&self.values
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.columns.iter().map(String::as_str).zip(self.values.iter())
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.values.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	#[must_use]
	pub fn into_values(self) -> Vec<Value> {
		self.values
	}
}

/// Reads the current row of `stmt` into the shape `mode` asks for.
pub(crate) fn materialize(stmt: *mut ffi::Sqlite3Stmt, columns: &Arc<[String]>, mode: &Mode) -> Row {
	match mode {
		Mode::Transform { base, transform } => transform.apply(shape_row(stmt, columns, *base)),
		other => shape_row(stmt, columns, other.shape()),
	}
}

fn shape_row(stmt: *mut ffi::Sqlite3Stmt, columns: &Arc<[String]>, shape: Shape) -> Row {
	match shape {
		Shape::Record => Row::Record(Record::new(Arc::clone(columns), read_values(stmt, columns.len()))),
		Shape::Array => Row::Array(read_values(stmt, columns.len())),
		Shape::Splat => Row::Value(if columns.is_empty() { Value::Null } else { decode_column(stmt, 0) }),
	}
}

fn read_values(stmt: *mut ffi::Sqlite3Stmt, count: usize) -> Vec<Value> {
	let count = c_int::try_from(count).unwrap_or(c_int::MAX);
	(0..count).map(|index| decode_column(stmt, index)).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn records_keep_duplicate_columns() {
		let record = Record::from_pairs([("a", Value::Integer(1)), ("a", Value::Integer(2))]);
		assert_eq!(record.len(), 2);
		assert_eq!(record.get("a"), Some(&Value::Integer(1)));
		assert_eq!(record.get_index(1), Some(&Value::Integer(2)));
		assert_eq!(record.iter().map(|(name, _)| name).collect::<Vec<_>>(), vec!["a", "a"]);
	}

	#[test]
	fn splat_rejects_multiple_columns() {
		assert!(Mode::Splat.check_columns(0).is_ok());
		assert!(Mode::Splat.check_columns(1).is_ok());
		let err = Mode::Splat.check_columns(9).expect_err("nine columns");
		assert_eq!(err.kind(), crate::ErrorKind::Usage);

		let mode = Mode::transform(Shape::Splat, |row| row);
		assert!(mode.check_columns(2).is_err());
		assert!(Mode::Array.check_columns(9).is_ok());
	}

	#[test]
	fn row_shapes_convert() {
		let row = Row::Array(vec![Value::Integer(1)]);
		assert_eq!(row.clone().into_values(), vec![Value::Integer(1)]);
		assert_eq!(row.into_record(), None);
		assert_eq!(Row::Value(Value::Null).into_value(), Some(Value::Null));
	}
}
