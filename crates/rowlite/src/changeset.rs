//! Change tracking through the SQLite session extension.
//!
//! A [`Changeset`] records the row-level effect of the statements run inside
//! [`Changeset::track`]. It can be serialized, inspected, inverted and
//! replayed on another database.

use core::ffi::{c_char, c_int, c_void};
use std::ffi::{CStr, CString};
use std::ptr::NonNull;

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::ffi;
use crate::raw::{
	SQLITE_CHANGESET_ABORT, SQLITE_CHANGESET_CONFLICT, SQLITE_CHANGESET_DATA, SQLITE_CHANGESET_NOTFOUND,
	SQLITE_CHANGESET_OMIT, SQLITE_CHANGESET_REPLACE, SQLITE_DELETE, SQLITE_DONE, SQLITE_INSERT, SQLITE_NOMEM,
	SQLITE_OK, SQLITE_ROW, SQLITE_UPDATE,
};
use crate::value::{Value, decode_value};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ChangeOp {
	Insert,
	Update,
	Delete,
}

impl ChangeOp {
	fn from_code(code: c_int) -> Result<Self> {
		match code {
			SQLITE_INSERT => Ok(Self::Insert),
			SQLITE_UPDATE => Ok(Self::Update),
			SQLITE_DELETE => Ok(Self::Delete),
			other => Err(Error::Engine { code: other, message: format!("invalid changeset op code {other}") }),
		}
	}
}

/// One row-level change.
///
/// `old` is present for updates and deletes, `new` for inserts and updates.
/// Columns an update left alone are [`Value::Null`] in both.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
	pub op: ChangeOp,
	pub table: String,
	pub old: Option<Vec<Value>>,
	pub new: Option<Vec<Value>>,
}

/// A serialized set of changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
	blob: Vec<u8>,
}

impl Changeset {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Wraps a blob produced by [`Changeset::to_blob`].
	#[must_use]
	pub fn from_blob(blob: impl Into<Vec<u8>>) -> Self {
		Self { blob: blob.into() }
	}

	/// Replaces the contents with a previously serialized changeset.
	pub fn load(&mut self, blob: impl Into<Vec<u8>>) -> &mut Self {
		self.blob = blob.into();
		self
	}

	#[must_use]
	pub fn to_blob(&self) -> &[u8] {
		&self.blob
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.blob.is_empty()
	}

	/// Runs `f` and replaces the contents with the changes it made to `db`.
	///
	/// Only the listed tables of the main schema are tracked, or every table
	/// when `tables` is `None`. Nothing is recorded if `f` fails.
	pub fn track<F>(&mut self, db: &Connection, tables: Option<&[&str]>, f: F) -> Result<&mut Self>
	where
		F: FnOnce(&Connection) -> Result<()>,
	{
		self.blob.clear();
		let session = Session::start(db, tables)?;
		f(db)?;
		self.blob = session.collect()?;
		debug!(bytes = self.blob.len(), "changes tracked");
		Ok(self)
	}

	/// Calls `f` with every change, in the order they were recorded.
	pub fn each<F>(&self, mut f: F) -> Result<()>
	where
		F: FnMut(Change) -> Result<()>,
	{
		let mut iter = ChangesetIter::start(&self.blob)?;
		while let Some(change) = iter.next_change()? {
			f(change)?;
		}
		Ok(())
	}

	pub fn changes(&self) -> Result<Vec<Change>> {
		let mut changes = Vec::new();
		self.each(|change| {
			changes.push(change);
			Ok(())
		})?;
		Ok(changes)
	}

	/// Replays the changes on `db`.
	///
	/// Rows that conflict with a change are overwritten and changes to rows
	/// that no longer exist are skipped. A constraint violation aborts the
	/// whole apply.
	pub fn apply(&self, db: &Connection) -> Result<()> {
		let len = self.checked_len()?;
		db.shared.run(|op| {
			let code = unsafe {
				ffi::sqlite3changeset_apply(
					op.db(),
					len,
					self.blob.as_ptr().cast_mut().cast::<c_void>(),
					None,
					Some(resolve_conflict),
					std::ptr::null_mut(),
				)
			};
			if code != SQLITE_OK {
				return Err(op.step_error(code));
			}
			debug!(bytes = self.blob.len(), "changeset applied");
			Ok(())
		})
	}

	/// A changeset that undoes this one.
	pub fn invert(&self) -> Result<Self> {
		let len = self.checked_len()?;
		let mut out_len: c_int = 0;
		let mut out: *mut c_void = std::ptr::null_mut();
		let code = unsafe {
			ffi::sqlite3changeset_invert(len, self.blob.as_ptr().cast::<c_void>(), &raw mut out_len, &raw mut out)
		};
		let blob = take_buffer(out, out_len);
		if code != SQLITE_OK {
			return Err(session_error("inverting changeset", code));
		}
		Ok(Self { blob })
	}

	fn checked_len(&self) -> Result<c_int> {
		if self.blob.is_empty() {
			return Err(Error::usage("changeset not available"));
		}
		c_int::try_from(self.blob.len()).map_err(|_| Error::usage("changeset is too large"))
	}
}

impl Connection {
	/// Shorthand for [`Changeset::track`] into a fresh changeset.
	pub fn track_changes<F>(&self, tables: Option<&[&str]>, f: F) -> Result<Changeset>
	where
		F: FnOnce(&Self) -> Result<()>,
	{
		let mut changeset = Changeset::new();
		changeset.track(self, tables, f)?;
		Ok(changeset)
	}
}

unsafe extern "C" fn resolve_conflict(_: *mut c_void, conflict: c_int, _: *mut ffi::Sqlite3ChangesetIter) -> c_int {
	match conflict {
		SQLITE_CHANGESET_DATA | SQLITE_CHANGESET_CONFLICT => SQLITE_CHANGESET_REPLACE,
		SQLITE_CHANGESET_NOTFOUND => SQLITE_CHANGESET_OMIT,
		_ => SQLITE_CHANGESET_ABORT,
	}
}

/// A live session. Deleted on drop, before its connection can close.
struct Session<'a> {
	db: &'a Connection,
	session: NonNull<ffi::Sqlite3Session>,
}

impl<'a> Session<'a> {
	fn start(db: &'a Connection, tables: Option<&[&str]>) -> Result<Self> {
		let names = tables
			.map(|tables| {
				tables
					.iter()
					.map(|name| CString::new(*name).map_err(|_| Error::usage("table name contains a NUL byte")))
					.collect::<Result<Vec<_>>>()
			})
			.transpose()?;

		let mut op = db.shared.acquire()?;
		let mut session: *mut ffi::Sqlite3Session = std::ptr::null_mut();
		let code = unsafe { ffi::sqlite3session_create(op.db(), c"main".as_ptr(), &raw mut session) };
		if code != SQLITE_OK {
			return Err(session_error("creating session", code));
		}
		let session = NonNull::new(session).ok_or_else(|| session_error("creating session", SQLITE_NOMEM))?;

		if let Err(err) = attach(session, names.as_deref()) {
			unsafe { ffi::sqlite3session_delete(session.as_ptr()) };
			return Err(err);
		}
		op.session_opened();
		Ok(Self { db, session })
	}

	fn collect(&self) -> Result<Vec<u8>> {
		let _op = self.db.shared.acquire()?;
		let mut len: c_int = 0;
		let mut buffer: *mut c_void = std::ptr::null_mut();
		let code = unsafe { ffi::sqlite3session_changeset(self.session.as_ptr(), &raw mut len, &raw mut buffer) };
		let blob = take_buffer(buffer, len);
		if code != SQLITE_OK {
			return Err(session_error("collecting changeset from session", code));
		}
		Ok(blob)
	}
}

impl Drop for Session<'_> {
	fn drop(&mut self) {
		let op = self.db.shared.acquire();
		unsafe { ffi::sqlite3session_delete(self.session.as_ptr()) };
		match op {
			Ok(mut op) => op.session_closed(),
			Err(err) => warn!(%err, "session released without the connection lock"),
		}
	}
}

fn attach(session: NonNull<ffi::Sqlite3Session>, names: Option<&[CString]>) -> Result<()> {
	let Some(names) = names else {
		let code = unsafe { ffi::sqlite3session_attach(session.as_ptr(), std::ptr::null()) };
		if code != SQLITE_OK {
			return Err(session_error("attaching all tables", code));
		}
		return Ok(());
	};

	for name in names {
		let code = unsafe { ffi::sqlite3session_attach(session.as_ptr(), name.as_ptr()) };
		if code != SQLITE_OK {
			return Err(session_error(&format!("attaching table {}", name.to_string_lossy()), code));
		}
	}
	Ok(())
}

/// Cursor over a serialized changeset. Borrows the blob it reads.
struct ChangesetIter<'a> {
	iter: NonNull<ffi::Sqlite3ChangesetIter>,
	_blob: &'a [u8],
}

impl<'a> ChangesetIter<'a> {
	fn start(blob: &'a [u8]) -> Result<Self> {
		if blob.is_empty() {
			return Err(Error::usage("changeset not available"));
		}
		let len = c_int::try_from(blob.len()).map_err(|_| Error::usage("changeset is too large"))?;

		let mut iter: *mut ffi::Sqlite3ChangesetIter = std::ptr::null_mut();
		let code = unsafe { ffi::sqlite3changeset_start(&raw mut iter, len, blob.as_ptr().cast_mut().cast::<c_void>()) };
		if code != SQLITE_OK {
			return Err(session_error("starting changeset iterator", code));
		}
		let iter = NonNull::new(iter).ok_or_else(|| session_error("starting changeset iterator", SQLITE_NOMEM))?;
		Ok(Self { iter, _blob: blob })
	}

	fn next_change(&mut self) -> Result<Option<Change>> {
		match unsafe { ffi::sqlite3changeset_next(self.iter.as_ptr()) } {
			SQLITE_ROW => self.current().map(Some),
			SQLITE_DONE => Ok(None),
			code => Err(session_error("reading changeset", code)),
		}
	}

	fn current(&self) -> Result<Change> {
		let mut table: *const c_char = std::ptr::null();
		let mut columns: c_int = 0;
		let mut op: c_int = 0;
		let mut indirect: c_int = 0;
		let code = unsafe {
			ffi::sqlite3changeset_op(self.iter.as_ptr(), &raw mut table, &raw mut columns, &raw mut op, &raw mut indirect)
		};
		if code != SQLITE_OK {
			return Err(session_error("reading changeset entry", code));
		}

		let op = ChangeOp::from_code(op)?;
		let table = if table.is_null() {
			String::new()
		} else {
			unsafe { CStr::from_ptr(table).to_string_lossy().into_owned() }
		};
		let old = matches!(op, ChangeOp::Update | ChangeOp::Delete)
			.then(|| self.values(columns, ffi::sqlite3changeset_old))
			.transpose()?;
		let new = matches!(op, ChangeOp::Update | ChangeOp::Insert)
			.then(|| self.values(columns, ffi::sqlite3changeset_new))
			.transpose()?;
		Ok(Change { op, table, old, new })
	}

	fn values(
		&self,
		columns: c_int,
		read: unsafe extern "C" fn(*mut ffi::Sqlite3ChangesetIter, c_int, *mut *mut ffi::Sqlite3Value) -> c_int,
	) -> Result<Vec<Value>> {
		(0..columns)
			.map(|index| {
				let mut value: *mut ffi::Sqlite3Value = std::ptr::null_mut();
				let code = unsafe { read(self.iter.as_ptr(), index, &raw mut value) };
				if code != SQLITE_OK {
					return Err(session_error("reading changeset values", code));
				}
				Ok(decode_value(value))
			})
			.collect()
	}
}

impl Drop for ChangesetIter<'_> {
	fn drop(&mut self) {
		let _ = unsafe { ffi::sqlite3changeset_finalize(self.iter.as_ptr()) };
	}
}

/// Copies a buffer allocated by SQLite and frees the original.
fn take_buffer(buffer: *mut c_void, len: c_int) -> Vec<u8> {
	if buffer.is_null() {
		return Vec::new();
	}
	let len = usize::try_from(len).unwrap_or_default();
	let blob = unsafe { std::slice::from_raw_parts(buffer.cast::<u8>(), len) }.to_vec();
	unsafe { ffi::sqlite3_free(buffer) };
	blob
}

fn session_error(context: &str, code: c_int) -> Error {
	Error::Engine { code, message: format!("{context}: {}", rowlite_sqlite_ffi::sqlite_error_string(code)) }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn fixture() -> Connection {
		let db = Connection::open_in_memory().expect("open memory database");
		db.execute("create table t(x integer primary key, y, z)", &[]).expect("create table");
		db
	}

	fn ints(values: &[i64]) -> Option<Vec<Value>> {
		Some(values.iter().copied().map(Value::Integer).collect())
	}

	#[test]
	fn tracks_inserts_updates_and_deletes() {
		let db = fixture();
		let mut changeset = Changeset::new();

		changeset
			.track(&db, None, |db| db.execute("insert into t values (1, 2, 3)", &[]).map(drop))
			.expect("track insert");
		assert_eq!(
			changeset.changes().expect("changes"),
			[Change { op: ChangeOp::Insert, table: "t".to_string(), old: None, new: ints(&[1, 2, 3]) }]
		);

		changeset
			.track(&db, None, |db| db.execute("update t set y = 22 where x = 1", &[]).map(drop))
			.expect("track update");
		assert_eq!(
			changeset.changes().expect("changes"),
			[Change {
				op: ChangeOp::Update,
				table: "t".to_string(),
				old: Some(vec![Value::Integer(1), Value::Integer(2), Value::Null]),
				new: Some(vec![Value::Null, Value::Integer(22), Value::Null]),
			}]
		);

		changeset
			.track(&db, None, |db| db.execute("delete from t where x = 1", &[]).map(drop))
			.expect("track delete");
		assert_eq!(
			changeset.changes().expect("changes"),
			[Change { op: ChangeOp::Delete, table: "t".to_string(), old: ints(&[1, 22, 3]), new: None }]
		);
	}

	#[test]
	fn only_listed_tables_are_tracked() {
		let db = fixture();
		db.execute("create table u(id integer primary key, v)", &[]).expect("create u");

		let changeset = db
			.track_changes(Some(["u"].as_slice()), |db| {
				db.execute("insert into t values (1, 2, 3); insert into u values (1, 'one')", &[]).map(drop)
			})
			.expect("track");
		let tables: Vec<String> = changeset.changes().expect("changes").into_iter().map(|c| c.table).collect();
		assert_eq!(tables, ["u"]);
	}

	#[test]
	fn failed_tracking_records_nothing_and_releases_the_session() {
		let db = fixture();
		let mut changeset = Changeset::from_blob(vec![1, 2, 3]);
		let err = changeset
			.track(&db, None, |db| {
				db.execute("insert into t values (1, 2, 3)", &[])?;
				Err(Error::usage("give up"))
			})
			.expect_err("tracking failed");
		assert_eq!(err.kind(), crate::ErrorKind::Usage);
		assert!(changeset.is_empty());

		db.close().expect("close after the session is gone");
	}

	#[test]
	fn closing_while_tracking_is_refused() {
		let db = fixture();
		let err = db.track_changes(None, |db| db.close()).expect_err("close refused");
		assert_eq!(err.kind(), crate::ErrorKind::Usage);
		assert!(!db.is_closed());
	}

	#[test]
	fn empty_changesets_cannot_be_read() {
		let mut changeset = Changeset::new();
		assert_eq!(changeset.to_blob(), b"");
		changeset.load(Vec::new());
		assert_eq!(changeset.changes().expect_err("no changeset").kind(), crate::ErrorKind::Usage);
		assert_eq!(changeset.invert().expect_err("no changeset").kind(), crate::ErrorKind::Usage);
	}

	#[test]
	fn garbage_blobs_fail_to_read() {
		let changeset = Changeset::from_blob(vec![0xff; 16]);
		assert!(changeset.changes().is_err());
	}
}
