use core::ffi::c_int;
use std::ffi::CStr;

use thiserror::Error;

use crate::ffi;
use crate::raw::{
	SQLITE_BUSY, SQLITE_CONSTRAINT, SQLITE_ERROR, SQLITE_INTERRUPT, SQLITE_LOCKED, SQLITE_MISMATCH,
	SQLITE_RANGE, SQLITE_TOOBIG, primary_code,
};

/// Error raised by a user callback (progress handler, row callback, batch source).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
	/// A value or key could not be bound to a placeholder.
	#[error("{message}")]
	Parameter { message: String },

	/// SQLite rejected the SQL text or failed while running it.
	#[error("{message}")]
	Sql { code: c_int, message: String, offset: Option<usize> },

	#[error("{message}")]
	Busy { code: c_int, message: String },

	#[error("{message}")]
	Interrupt { message: String },

	#[error("Connection is closed")]
	ConnectionClosed,

	#[error("Statement is closed")]
	StatementClosed,

	/// The API was used in a way it does not support.
	#[error("{0}")]
	Usage(String),

	#[error("callback failed: {0}")]
	Callback(#[source] BoxError),

	/// Any other native result code.
	#[error("SQLite error {code}: {message}")]
	Engine { code: c_int, message: String },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorKind {
	Parameter,
	Sql,
	Busy,
	Interrupt,
	Closed,
	Usage,
	Callback,
	Engine,
}

impl Error {
	#[must_use]
	pub const fn kind(&self) -> ErrorKind {
		match self {
			Self::Parameter { .. } => ErrorKind::Parameter,
			Self::Sql { .. } => ErrorKind::Sql,
			Self::Busy { .. } => ErrorKind::Busy,
			Self::Interrupt { .. } => ErrorKind::Interrupt,
			Self::ConnectionClosed | Self::StatementClosed => ErrorKind::Closed,
			Self::Usage(_) => ErrorKind::Usage,
			Self::Callback(_) => ErrorKind::Callback,
			Self::Engine { .. } => ErrorKind::Engine,
		}
	}

	/// Extended SQLite result code, for errors that came out of the engine.
	#[must_use]
	pub const fn code(&self) -> Option<c_int> {
		match self {
			Self::Sql { code, .. } | Self::Busy { code, .. } | Self::Engine { code, .. } => Some(*code),
			Self::Interrupt { .. } => Some(SQLITE_INTERRUPT),
			_ => None,
		}
	}

	/// Byte offset into the submitted SQL text where the engine located the error.
	#[must_use]
	pub const fn offset(&self) -> Option<usize> {
		match self {
			Self::Sql { offset, .. } => *offset,
			_ => None,
		}
	}

	/// Wraps an error raised by user code so it can cross the engine boundary.
	pub fn callback<E>(err: E) -> Self
	where
		E: Into<BoxError>,
	{
		Self::Callback(err.into())
	}

	pub(crate) fn parameter(message: impl Into<String>) -> Self {
		Self::Parameter { message: message.into() }
	}

	pub(crate) fn usage(message: impl Into<String>) -> Self {
		Self::Usage(message.into())
	}

	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.kind() == ErrorKind::Closed
	}

	/// Moves a reported SQL error offset by `base` bytes, for multi-statement text.
	pub(crate) fn shift_offset(self, base: usize) -> Self {
		match self {
			Self::Sql { code, message, offset } => {
				Self::Sql { code, message, offset: offset.map(|offset| offset + base) }
			}
			other => other,
		}
	}
}

/// Translates a failing native result code, reading the message from the connection.
pub(crate) fn sqlite_error(db: *mut ffi::Sqlite3, code: c_int) -> Error {
	let code = effective_code(db, code);
	let message = db_error_message(db, code);

	match primary_code(code) {
		SQLITE_BUSY | SQLITE_LOCKED => Error::Busy { code, message },
		SQLITE_INTERRUPT => Error::Interrupt { message },
		SQLITE_ERROR | SQLITE_CONSTRAINT | SQLITE_MISMATCH | SQLITE_TOOBIG | SQLITE_RANGE => {
			let offset = if db.is_null() {
				None
			} else {
				usize::try_from(unsafe { ffi::sqlite3_error_offset(db) }).ok()
			};
			Error::Sql { code, message, offset }
		}
		_ => Error::Engine { code, message },
	}
}

fn effective_code(db: *mut ffi::Sqlite3, code: c_int) -> c_int {
	if db.is_null() {
		return code;
	}

	let extended = unsafe { ffi::sqlite3_extended_errcode(db) };
	if extended != 0 && primary_code(extended) == primary_code(code) { extended } else { code }
}

pub(crate) fn db_error_message(db: *mut ffi::Sqlite3, code: c_int) -> String {
	if db.is_null() {
		return rowlite_sqlite_ffi::sqlite_error_string(code);
	}

	let message_ptr = unsafe { ffi::sqlite3_errmsg(db) };
	if message_ptr.is_null() {
		return rowlite_sqlite_ffi::sqlite_error_string(code);
	}

	unsafe { CStr::from_ptr(message_ptr).to_string_lossy().into_owned() }
}
