//! Compiling SQL text one statement at a time.

use core::ffi::{c_char, c_int};
use std::ffi::CStr;
use std::ptr::NonNull;

use crate::error::{Error, Result, sqlite_error};
use crate::ffi;
use crate::raw::SQLITE_OK;

/// One compiled statement out of a longer SQL text.
pub(crate) struct Compiled {
	/// `None` when the consumed text held only whitespace or comments.
	pub stmt: Option<NonNull<ffi::Sqlite3Stmt>>,
	/// Byte offset just past the consumed text.
	pub tail: usize,
}

/// Compiles the first statement of `sql`.
pub(crate) fn compile(db: *mut ffi::Sqlite3, sql: &str) -> Result<Compiled> {
	let len = c_int::try_from(sql.len()).map_err(|_| Error::usage("SQL text is too long"))?;
	let base = sql.as_ptr().cast::<c_char>();
	let mut stmt: *mut ffi::Sqlite3Stmt = std::ptr::null_mut();
	let mut tail: *const c_char = std::ptr::null();

	let code = unsafe { ffi::sqlite3_prepare_v3(db, base, len, 0, &raw mut stmt, &raw mut tail) };
	if code != SQLITE_OK {
		return Err(sqlite_error(db, code));
	}

	let tail = if tail.is_null() {
		sql.len()
	} else {
		usize::try_from(unsafe { tail.offset_from(base) }).unwrap_or(sql.len()).min(sql.len())
	};

	Ok(Compiled { stmt: NonNull::new(stmt), tail })
}

/// True when `sql` holds nothing but whitespace, semicolons and comments.
pub(crate) fn is_blank(sql: &str) -> bool {
	let bytes = sql.as_bytes();
	let mut i = 0;

	while let Some(&byte) = bytes.get(i) {
		match byte {
			b' ' | b'\t' | b'\n' | b'\r' | b'\x0c' | b';' => i += 1,
			b'-' if bytes.get(i + 1) == Some(&b'-') => {
				i = bytes.iter().skip(i).position(|b| *b == b'\n').map_or(bytes.len(), |n| i + n + 1);
			}
			b'/' if bytes.get(i + 1) == Some(&b'*') => {
				let body = i + 2;
				i = bytes
					.windows(2)
					.skip(body)
					.position(|w| w == b"*/")
					.map_or(bytes.len(), |n| body + n + 2);
			}
			_ => return false,
		}
	}

	true
}

pub(crate) fn statement_sql(stmt: *mut ffi::Sqlite3Stmt) -> Option<String> {
	let ptr = unsafe { ffi::sqlite3_sql(stmt) };
	if ptr.is_null() {
		None
	} else {
		Some(unsafe { CStr::from_ptr(ptr).to_string_lossy().into_owned() })
	}
}

/// Column names of a compiled statement, in result order.
pub(crate) fn column_names(stmt: *mut ffi::Sqlite3Stmt) -> Vec<String> {
	let count = unsafe { ffi::sqlite3_column_count(stmt) };
	(0..count)
		.map(|index| {
			let ptr = unsafe { ffi::sqlite3_column_name(stmt, index) };
			if ptr.is_null() {
				String::new()
			} else {
				unsafe { CStr::from_ptr(ptr).to_string_lossy().into_owned() }
			}
		})
		.collect()
}

/// Finalizes a statement compiled for a single call once it goes out of scope.
pub(crate) struct Scratch(pub NonNull<ffi::Sqlite3Stmt>);

impl Scratch {
	pub(crate) const fn as_ptr(&self) -> *mut ffi::Sqlite3Stmt {
		self.0.as_ptr()
	}
}

impl Drop for Scratch {
	fn drop(&mut self) {
		let _ = unsafe { ffi::sqlite3_finalize(self.0.as_ptr()) };
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn blank_text_is_detected() {
		assert!(is_blank(""));
		assert!(is_blank("  \n\t;"));
		assert!(is_blank("-- trailing comment"));
		assert!(is_blank("; -- one\n /* two */ ;"));
		assert!(is_blank("/* unterminated"));
	}

	#[test]
	fn statements_are_not_blank() {
		assert!(!is_blank("select 1"));
		assert!(!is_blank("-- comment\nselect 1"));
		assert!(!is_blank("/* c */ select 1"));
		assert!(!is_blank(" - 1"));
	}
}
