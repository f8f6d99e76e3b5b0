use core::ffi::c_int;
use std::ffi::CString;
use std::path::Path;
use std::ptr::NonNull;

use tracing::{debug, warn};

use crate::connection::{Connection, Op};
use crate::error::{Error, Result, sqlite_error};
use crate::ffi;
use crate::raw::{SQLITE_DONE, SQLITE_OK};

/// Page-by-page copy of one database into another.
pub struct Backup<'a> {
	dst: &'a Connection,
	src: &'a Connection,
	backup: Option<NonNull<ffi::Sqlite3Backup>>,
	done: bool,
}

impl<'a> Backup<'a> {
	/// Starts copying schema `src_name` of `src` into schema `dst_name` of `dst`.
	pub fn new(dst: &'a Connection, dst_name: &str, src: &'a Connection, src_name: &str) -> Result<Self> {
		let dst_name_c = schema_name(dst_name)?;
		let src_name_c = schema_name(src_name)?;

		let (dst_op, src_op) = lock_pair(dst, src)?;
		let backup = unsafe {
			ffi::sqlite3_backup_init(dst_op.db(), dst_name_c.as_ptr(), src_op.db(), src_name_c.as_ptr())
		};
		let Some(backup) = NonNull::new(backup) else {
			let code = unsafe { ffi::sqlite3_extended_errcode(dst_op.db()) };
			return Err(sqlite_error(dst_op.db(), code));
		};

		Ok(Self { dst, src, backup: Some(backup), done: false })
	}

	/// Copies up to `pages` pages, or everything left when negative. True once the copy is complete.
	pub fn step(&mut self, pages: c_int) -> Result<bool> {
		let backup = self.backup.ok_or(Error::ConnectionClosed)?;
		if self.done {
			return Ok(true);
		}

		let (dst_op, _src_op) = lock_pair(self.dst, self.src)?;
		match unsafe { ffi::sqlite3_backup_step(backup.as_ptr(), pages) } {
			SQLITE_OK => Ok(false),
			SQLITE_DONE => {
				self.done = true;
				Ok(true)
			}
			code => Err(sqlite_error(dst_op.db(), code)),
		}
	}

	/// Pages still to copy, as of the last step.
	#[must_use]
	pub fn remaining(&self) -> usize {
		self.backup.map_or(0, |backup| {
			usize::try_from(unsafe { ffi::sqlite3_backup_remaining(backup.as_ptr()) }).unwrap_or_default()
		})
	}

	/// Pages in the source database, as of the last step.
	#[must_use]
	pub fn page_count(&self) -> usize {
		self.backup.map_or(0, |backup| {
			usize::try_from(unsafe { ffi::sqlite3_backup_pagecount(backup.as_ptr()) }).unwrap_or_default()
		})
	}

	#[must_use]
	pub const fn is_done(&self) -> bool {
		self.done
	}

	/// Releases the backup. Finishing twice is a no-op.
	pub fn finish(&mut self) -> Result<()> {
		let Some(backup) = self.backup.take() else {
			return Ok(());
		};

		let op = self.dst.shared.acquire();
		let code = unsafe { ffi::sqlite3_backup_finish(backup.as_ptr()) };
		if code == SQLITE_OK {
			debug!(done = self.done, "backup finished");
			return Ok(());
		}
		let db = op.as_ref().map_or(std::ptr::null_mut(), Op::db);
		Err(sqlite_error(db, code))
	}
}

impl Drop for Backup<'_> {
	fn drop(&mut self) {
		if let Err(err) = self.finish() {
			warn!(%err, "finishing backup failed");
		}
	}
}

/// Options for [`Connection::backup_to`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOptions {
	pub source_schema: String,
	pub dest_schema: String,
	/// Pages copied per step; negative copies everything in one step.
	pub pages_per_step: c_int,
}

impl Default for BackupOptions {
	fn default() -> Self {
		Self { source_schema: "main".to_string(), dest_schema: "main".to_string(), pages_per_step: 100 }
	}
}

impl Connection {
	/// Copies this database into `dst`, calling `progress(remaining, total)` after every step.
	pub fn backup_to<F>(&self, dst: &Self, options: &BackupOptions, mut progress: F) -> Result<()>
	where
		F: FnMut(usize, usize),
	{
		let mut backup = Backup::new(dst, &options.dest_schema, self, &options.source_schema)?;
		loop {
			let done = backup.step(options.pages_per_step)?;
			progress(backup.remaining(), backup.page_count());
			if done {
				break;
			}
		}
		backup.finish()?;
		debug!(source = %self.path(), dest = %dst.path(), "backup complete");
		Ok(())
	}

	/// Copies this database into the file at `path`, creating or overwriting it.
	pub fn backup_to_path<F>(&self, path: impl AsRef<Path>, options: &BackupOptions, progress: F) -> Result<()>
	where
		F: FnMut(usize, usize),
	{
		let dst = Self::open(path)?;
		self.backup_to(&dst, options, progress)?;
		dst.close()
	}
}

fn schema_name(name: &str) -> Result<CString> {
	CString::new(name).map_err(|_| Error::usage("schema name contains a NUL byte"))
}

/// Locks both connections in a fixed order so two backups in opposite directions cannot deadlock.
fn lock_pair<'a>(dst: &'a Connection, src: &'a Connection) -> Result<(Op<'a>, Op<'a>)> {
	if std::ptr::eq(dst.shared.as_ref(), src.shared.as_ref()) {
		return Err(Error::usage("source and destination must be distinct connections"));
	}

	if std::ptr::from_ref(dst.shared.as_ref()) < std::ptr::from_ref(src.shared.as_ref()) {
		let dst_op = dst.shared.acquire()?;
		let src_op = src.shared.acquire()?;
		Ok((dst_op, src_op))
	} else {
		let src_op = src.shared.acquire()?;
		let dst_op = dst.shared.acquire()?;
		Ok((dst_op, src_op))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Value;

	#[test]
	fn backup_copies_in_steps() {
		let src = Connection::open_in_memory().expect("open source");
		src.execute(
			"create table t(x); \
			 with recursive n(x) as (select 1 union all select x + 1 from n where x < 2000) \
			 insert into t select x from n",
			&[],
		)
		.expect("fill source");

		let dst = Connection::open_in_memory().expect("open destination");
		let mut backup = Backup::new(&dst, "main", &src, "main").expect("start backup");
		let mut steps = 0;
		while !backup.step(1).expect("step") {
			steps += 1;
		}
		assert!(steps > 0);
		assert_eq!(backup.remaining(), 0);
		backup.finish().expect("finish");
		backup.finish().expect("finish again");

		let count = dst.query_value("select count(*) from t", &[]).expect("count copied rows");
		assert_eq!(count, Some(Value::Integer(2000)));
	}

	#[test]
	fn same_connection_is_rejected() {
		let db = Connection::open_in_memory().expect("open memory database");
		let err = Backup::new(&db, "main", &db, "main").err().expect("same connection");
		assert_eq!(err.kind(), crate::ErrorKind::Usage);
	}
}
