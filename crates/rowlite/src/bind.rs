//! Binding parameter sets to prepared statements.
//!
//! Positions start at 1. A scalar consumes one position, a `List` consumes
//! as many positions as it has elements, and keyed sources (`Map`, `Struct`)
//! bind by name without consuming any, so discrete arguments that follow a
//! keyed source continue the positional sequence.

use core::ffi::{c_char, c_int};
use std::ffi::CString;

use crate::error::{Error, Result, sqlite_error};
use crate::ffi;
use crate::raw::{SQLITE_OK, SQLITE_RANGE, SQLITE_UTF8, sqlite_transient};
use crate::value::{Param, Value, encode};

/// Binds every argument in order.
pub(crate) fn bind_all(db: *mut ffi::Sqlite3, stmt: *mut ffi::Sqlite3Stmt, params: &[Param]) -> Result<()> {
	let mut position: c_int = 1;
	for param in params {
		let consumed = bind_param(db, stmt, position, param)?;
		position = position.saturating_add(consumed);
	}
	Ok(())
}

/// Binds one batch parameter set: a `List` is positional, anything else is the only argument.
pub(crate) fn bind_one(db: *mut ffi::Sqlite3, stmt: *mut ffi::Sqlite3Stmt, params: &Param) -> Result<()> {
	bind_param(db, stmt, 1, params).map(drop)
}

/// Checks that every argument can be encoded, before anything is executed.
pub(crate) fn validate(params: &[Param]) -> Result<()> {
	let mut position: usize = 1;
	for param in params {
		match param {
			Param::List(values) => {
				for value in values {
					encode(value, position)?;
					position += 1;
				}
			}
			Param::Map(entries) => {
				for (key, value) in entries {
					match key {
						Param::Integer(index) => encode(value, index)?,
						Param::Unsigned(index) => encode(value, index)?,
						Param::Text(name) => encode(value, format_args!(":{name}"))?,
						other => return Err(key_error(other)),
					};
				}
			}
			Param::Struct(fields) => {
				for (name, value) in fields {
					encode(value, format_args!(":{name}"))?;
				}
			}
			scalar => {
				encode(scalar, position)?;
				position += 1;
			}
		}
	}
	Ok(())
}

pub(crate) fn clear(stmt: *mut ffi::Sqlite3Stmt) {
	let _ = unsafe { ffi::sqlite3_clear_bindings(stmt) };
}

pub(crate) fn parameter_count(stmt: *mut ffi::Sqlite3Stmt) -> usize {
	usize::try_from(unsafe { ffi::sqlite3_bind_parameter_count(stmt) }).unwrap_or_default()
}

/// Returns the number of positions consumed.
fn bind_param(
	db: *mut ffi::Sqlite3,
	stmt: *mut ffi::Sqlite3Stmt,
	position: c_int,
	param: &Param,
) -> Result<c_int> {
	match param {
		Param::List(values) => {
			let mut index = position;
			for value in values {
				bind_index(db, stmt, index, value)?;
				index = index.saturating_add(1);
			}
			Ok(index - position)
		}
		Param::Map(entries) => {
			for (key, value) in entries {
				bind_key(db, stmt, key, value)?;
			}
			Ok(0)
		}
		Param::Struct(fields) => {
			for (name, value) in fields {
				bind_name(db, stmt, name, value)?;
			}
			Ok(0)
		}
		scalar => {
			bind_index(db, stmt, position, scalar)?;
			Ok(1)
		}
	}
}

fn bind_key(db: *mut ffi::Sqlite3, stmt: *mut ffi::Sqlite3Stmt, key: &Param, value: &Param) -> Result<()> {
	match key {
		Param::Integer(index) => match c_int::try_from(*index) {
			Ok(index) if index > 0 => bind_index(db, stmt, index, value),
			_ => Ok(()),
		},
		Param::Unsigned(index) => match c_int::try_from(*index) {
			Ok(index) if index > 0 => bind_index(db, stmt, index, value),
			_ => Ok(()),
		},
		Param::Text(name) => bind_name(db, stmt, name, value),
		other => Err(key_error(other)),
	}
}

fn key_error(key: &Param) -> Error {
	Error::parameter(format!("Cannot bind parameter with a key of type {}", key.type_name()))
}

fn bind_name(db: *mut ffi::Sqlite3, stmt: *mut ffi::Sqlite3Stmt, name: &str, value: &Param) -> Result<()> {
	match parameter_index(stmt, name)? {
		Some(index) => bind_index(db, stmt, index, value),
		None => {
			// Still reject values the codec cannot represent.
			encode(value, format_args!(":{name}")).map(drop)
		}
	}
}

fn parameter_index(stmt: *mut ffi::Sqlite3Stmt, name: &str) -> Result<Option<c_int>> {
	for candidate in name_candidates(name) {
		let candidate = CString::new(candidate)
			.map_err(|_| Error::parameter("parameter name contains a NUL byte"))?;
		let index = unsafe { ffi::sqlite3_bind_parameter_index(stmt, candidate.as_ptr()) };
		if index > 0 {
			return Ok(Some(index));
		}
	}
	Ok(None)
}

fn name_candidates(name: &str) -> Vec<String> {
	if name.starts_with([':', '@', '$', '?']) {
		vec![name.to_string()]
	} else {
		vec![format!(":{name}"), format!("@{name}"), format!("${name}")]
	}
}

fn bind_index(db: *mut ffi::Sqlite3, stmt: *mut ffi::Sqlite3Stmt, index: c_int, param: &Param) -> Result<()> {
	let value = encode(param, index)?;
	let code = match &value {
		Value::Null => unsafe { ffi::sqlite3_bind_null(stmt, index) },
		Value::Integer(v) => unsafe { ffi::sqlite3_bind_int64(stmt, index, *v) },
		Value::Float(v) => unsafe { ffi::sqlite3_bind_double(stmt, index, *v) },
		Value::Text(v) => unsafe {
			ffi::sqlite3_bind_text64(
				stmt,
				index,
				v.as_ptr().cast::<c_char>(),
				v.len() as u64,
				Some(sqlite_transient()),
				SQLITE_UTF8,
			)
		},
		Value::Blob(v) => unsafe {
			ffi::sqlite3_bind_blob64(stmt, index, v.as_ptr().cast(), v.len() as u64, Some(sqlite_transient()))
		},
	};

	match code {
		// Placeholders the statement does not have are ignored.
		SQLITE_OK | SQLITE_RANGE => Ok(()),
		_ => Err(sqlite_error(db, code)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn validation_names_the_offending_position() {
		let params = [Param::from(1), Param::list([2, 3]), Param::opaque::<std::time::Instant>()];
		let err = validate(&params).expect_err("opaque value");
		assert_eq!(
			err.to_string(),
			"Cannot bind parameter at position 4 of type std::time::Instant"
		);

		let record = Param::Map(vec![(Param::Float(1.5), Param::from(1))]);
		let err = validate(&[record]).expect_err("float key");
		assert_eq!(err.to_string(), "Cannot bind parameter with a key of type Float");

		assert!(validate(&[crate::named! { "a" => 1 }, Param::from("x")]).is_ok());
	}

	#[test]
	fn bare_names_try_every_prefix() {
		assert_eq!(name_candidates("foo"), vec![":foo", "@foo", "$foo"]);
		assert_eq!(name_candidates("@foo"), vec!["@foo"]);
		assert_eq!(name_candidates("?2"), vec!["?2"]);
	}
}
