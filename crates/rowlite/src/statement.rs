//! Prepared statements and the cursor that walks their results.

use core::ffi::c_int;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::bind;
use crate::connection::{Op, Shared};
use crate::error::{BoxError, Error, Result};
use crate::ffi;
use crate::raw::{
	SQLITE_DONE, SQLITE_ROW, SQLITE_STMTSTATUS_AUTOINDEX, SQLITE_STMTSTATUS_FILTER_HIT,
	SQLITE_STMTSTATUS_FILTER_MISS, SQLITE_STMTSTATUS_FULLSCAN_STEP, SQLITE_STMTSTATUS_MEMUSED,
	SQLITE_STMTSTATUS_REPREPARE, SQLITE_STMTSTATUS_RUN, SQLITE_STMTSTATUS_SORT, SQLITE_STMTSTATUS_VM_STEP,
};
use crate::row::{Mode, Row, materialize};
use crate::sql;
use crate::value::{Param, Value};

/// Counters kept by SQLite for each prepared statement.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StatementStatus {
	FullscanStep,
	Sort,
	Autoindex,
	VmStep,
	Reprepare,
	Run,
	FilterMiss,
	FilterHit,
	MemUsed,
}

impl StatementStatus {
	const fn code(self) -> c_int {
		match self {
			Self::FullscanStep => SQLITE_STMTSTATUS_FULLSCAN_STEP,
			Self::Sort => SQLITE_STMTSTATUS_SORT,
			Self::Autoindex => SQLITE_STMTSTATUS_AUTOINDEX,
			Self::VmStep => SQLITE_STMTSTATUS_VM_STEP,
			Self::Reprepare => SQLITE_STMTSTATUS_REPREPARE,
			Self::Run => SQLITE_STMTSTATUS_RUN,
			Self::FilterMiss => SQLITE_STMTSTATUS_FILTER_MISS,
			Self::FilterHit => SQLITE_STMTSTATUS_FILTER_HIT,
			Self::MemUsed => SQLITE_STMTSTATUS_MEMUSED,
		}
	}
}

/// A compiled SQL statement.
///
/// Rebinding or resetting restarts the cursor. Once the end of the rows is
/// reached, [`Statement::step`] keeps returning `None` until then.
pub struct Statement {
	pub(crate) shared: Arc<Shared>,
	stmt: Option<NonNull<ffi::Sqlite3Stmt>>,
	sql: String,
	columns: Arc<[String]>,
	mode: Mode,
	eof: bool,
}

// The connection is opened in serialized mode and statements are only stepped through `&mut self`.
unsafe impl Send for Statement {}

impl fmt::Debug for Statement {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Statement")
			.field("sql", &self.sql)
			.field("mode", &self.mode)
			.field("closed", &self.is_closed())
			.finish_non_exhaustive()
	}
}

impl Statement {
	pub(crate) fn prepare(shared: &Arc<Shared>, sql: &str, mode: Mode) -> Result<Self> {
		if sql::is_blank(sql) {
			return Err(Error::usage("Cannot prepare an empty SQL query"));
		}

		let op = shared.acquire()?;
		let compiled = sql::compile(op.db(), sql)?;
		let Some(handle) = compiled.stmt else {
			return Err(Error::usage("Cannot prepare an empty SQL query"));
		};
		if !sql::is_blank(sql.get(compiled.tail..).unwrap_or_default()) {
			let _ = unsafe { ffi::sqlite3_finalize(handle.as_ptr()) };
			return Err(Error::usage(
				"A prepared statement does not accept SQL strings with multiple queries",
			));
		}

		Ok(Self {
			shared: Arc::clone(shared),
			stmt: Some(handle),
			sql: sql.to_string(),
			columns: sql::column_names(handle.as_ptr()).into(),
			mode,
			eof: false,
		})
	}

	/// A fresh statement for the same SQL and mode, with nothing bound.
	pub fn try_clone(&self) -> Result<Self> {
		if self.is_closed() {
			return Err(Error::StatementClosed);
		}
		Self::prepare(&self.shared, &self.sql, self.mode.clone())
	}

	#[must_use]
	pub fn sql(&self) -> &str {
		&self.sql
	}

	/// Result column names as of the last execution.
	#[must_use]
	pub fn columns(&self) -> &[String] {
		&self.columns
	}

	#[must_use]
	pub const fn mode(&self) -> &Mode {
		&self.mode
	}

	pub fn set_mode(&mut self, mode: Mode) {
		self.mode = mode;
	}

	#[must_use]
	pub fn with_mode(mut self, mode: Mode) -> Self {
		self.mode = mode;
		self
	}

	/// True once the current execution returned its last row.
	#[must_use]
	pub const fn eof(&self) -> bool {
		self.eof
	}

	pub fn parameter_count(&self) -> Result<usize> {
		Ok(bind::parameter_count(self.handle()?))
	}

	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.stmt.is_none() || self.shared.is_closed()
	}

	/// Finalizes the native statement. Closing twice is a no-op.
	pub fn close(&mut self) {
		if let Some(stmt) = self.stmt.take() {
			let _ = unsafe { ffi::sqlite3_finalize(stmt.as_ptr()) };
		}
	}

	/// Replaces the bound parameters and rewinds the cursor.
	///
	/// Unbindable values are rejected before anything changes. If the engine
	/// refuses a binding midway, every parameter is left unbound.
	pub fn bind(&mut self, params: &[Param]) -> Result<&mut Self> {
		let stmt = self.handle()?;
		bind::validate(params)?;
		let shared = Arc::clone(&self.shared);
		let op = shared.acquire()?;
		let _ = unsafe { ffi::sqlite3_reset(stmt) };
		bind::clear(stmt);
		self.eof = false;
		if let Err(err) = bind::bind_all(op.db(), stmt, params) {
			bind::clear(stmt);
			return Err(err);
		}
		Ok(self)
	}

	/// Rewinds the cursor, keeping the bound parameters.
	pub fn reset(&mut self) -> Result<&mut Self> {
		let stmt = self.handle()?;
		let shared = Arc::clone(&self.shared);
		let _op = shared.acquire()?;
		let _ = unsafe { ffi::sqlite3_reset(stmt) };
		self.eof = false;
		Ok(self)
	}

	/// Next row, or `None` at the end of the rows.
	pub fn step(&mut self) -> Result<Option<Row>> {
		let shared = Arc::clone(&self.shared);
		shared.run(|op| self.next_row(op))
	}

	/// Up to `n` more rows. A negative `n` reads all remaining rows.
	pub fn fetch(&mut self, n: i64) -> Result<Vec<Row>> {
		let limit = usize::try_from(n).ok();
		let shared = Arc::clone(&self.shared);
		shared.run(|op| {
			let mut rows = Vec::with_capacity(limit.unwrap_or_default().min(1024));
			while limit.is_none_or(|limit| rows.len() < limit) {
				match self.next_row(op)? {
					Some(row) => rows.push(row),
					None => break,
				}
			}
			Ok(rows)
		})
	}

	/// All remaining rows. Empty, not an error, when already at the end.
	pub fn fetch_all(&mut self) -> Result<Vec<Row>> {
		self.fetch(-1)
	}

	/// Calls `f` with every remaining row and returns how many there were.
	pub fn each<F>(&mut self, mut f: F) -> Result<usize>
	where
		F: FnMut(Row) -> std::result::Result<(), BoxError>,
	{
		let shared = Arc::clone(&self.shared);
		shared.run(|op| {
			let mut count = 0;
			while let Some(row) = self.next_row(op)? {
				f(row).map_err(Error::Callback)?;
				count += 1;
			}
			Ok(count)
		})
	}

	pub fn iter(&mut self) -> Rows<'_> {
		Rows { stmt: self, done: false }
	}

	/// Reruns the statement and returns all of its rows.
	///
	/// Empty `params` keep the current bindings.
	pub fn query(&mut self, params: &[Param]) -> Result<Vec<Row>> {
		self.restart(params)?;
		self.fetch_all()
	}

	/// Reruns the statement and returns its first row, leaving the cursor rewound.
	pub fn query_row(&mut self, params: &[Param]) -> Result<Option<Row>> {
		self.restart(params)?;
		let row = self.step();
		let stmt = self.handle()?;
		let _ = unsafe { ffi::sqlite3_reset(stmt) };
		self.eof = false;
		row
	}

	pub fn query_value(&mut self, params: &[Param]) -> Result<Option<Value>> {
		let row = self.query_row(params)?;
		Ok(row.and_then(|row| row.into_values().into_iter().next()))
	}

	/// Runs the statement to completion and returns the number of rows it changed.
	pub fn execute(&mut self, params: &[Param]) -> Result<u64> {
		self.restart(params)?;
		let stmt = self.handle()?;
		let shared = Arc::clone(&self.shared);
		shared.run(|op| {
			self.start(op, stmt)?;
			run_to_end(op, stmt)?;
			self.eof = true;
			Ok(op.changes())
		})
	}

	/// Reads a native counter, optionally resetting it.
	pub fn status(&self, counter: StatementStatus, reset: bool) -> Result<i64> {
		let stmt = self.handle()?;
		let value = unsafe { ffi::sqlite3_stmt_status(stmt, counter.code(), c_int::from(reset)) };
		Ok(i64::from(value))
	}

	pub(crate) fn restart(&mut self, params: &[Param]) -> Result<()> {
		if params.is_empty() {
			self.reset().map(drop)
		} else {
			self.bind(params).map(drop)
		}
	}

	pub(crate) fn handle(&self) -> Result<*mut ffi::Sqlite3Stmt> {
		if self.shared.is_closed() {
			return Err(Error::ConnectionClosed);
		}
		self.stmt.map(NonNull::as_ptr).ok_or(Error::StatementClosed)
	}

	pub(crate) fn columns_arc(&self) -> &Arc<[String]> {
		&self.columns
	}

	pub(crate) fn rewind(&mut self, stmt: *mut ffi::Sqlite3Stmt) {
		let _ = unsafe { ffi::sqlite3_reset(stmt) };
		self.eof = false;
	}

	/// Prepares for a fresh execution if the cursor is not in the middle of one.
	pub(crate) fn start(&mut self, op: &mut Op<'_>, stmt: *mut ffi::Sqlite3Stmt) -> Result<()> {
		if unsafe { ffi::sqlite3_stmt_busy(stmt) } == 0 {
			self.columns = sql::column_names(stmt).into();
			self.mode.check_columns(self.columns.len())?;
			op.trace(&self.sql);
		}
		Ok(())
	}

	fn next_row(&mut self, op: &mut Op<'_>) -> Result<Option<Row>> {
		let stmt = self.handle()?;
		self.mode.check_columns(self.columns.len())?;
		if self.eof {
			return Ok(None);
		}

		self.start(op, stmt)?;
		if step_once(op, stmt)? {
			Ok(Some(materialize(stmt, &self.columns, &self.mode)))
		} else {
			self.eof = true;
			Ok(None)
		}
	}
}

impl Drop for Statement {
	fn drop(&mut self) {
		self.close();
	}
}

/// Iterator over the remaining rows of a statement. Ends after the last row or the first error.
pub struct Rows<'stmt> {
	stmt: &'stmt mut Statement,
	done: bool,
}

impl Iterator for Rows<'_> {
	type Item = Result<Row>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done {
			return None;
		}

		match self.stmt.step() {
			Ok(Some(row)) => Some(Ok(row)),
			Ok(None) => {
				self.done = true;
				None
			}
			Err(err) => {
				self.done = true;
				Some(Err(err))
			}
		}
	}
}

impl std::iter::FusedIterator for Rows<'_> {}

/// Steps once. On failure the statement is reset so it can run again.
pub(crate) fn step_once(op: &mut Op<'_>, stmt: *mut ffi::Sqlite3Stmt) -> Result<bool> {
	match unsafe { ffi::sqlite3_step(stmt) } {
		SQLITE_ROW => {
			op.row_fetched();
			Ok(true)
		}
		SQLITE_DONE => Ok(false),
		code => {
			let err = op.step_error(code);
			let _ = unsafe { ffi::sqlite3_reset(stmt) };
			Err(err)
		}
	}
}

pub(crate) fn run_to_end(op: &mut Op<'_>, stmt: *mut ffi::Sqlite3Stmt) -> Result<()> {
	while step_once(op, stmt)? {}
	Ok(())
}

/// Materializes up to `limit` rows, or all of them.
pub(crate) fn collect_rows(
	op: &mut Op<'_>,
	stmt: *mut ffi::Sqlite3Stmt,
	columns: &Arc<[String]>,
	mode: &Mode,
	limit: Option<usize>,
) -> Result<Vec<Row>> {
	let mut rows = Vec::new();
	while limit.is_none_or(|limit| rows.len() < limit) && step_once(op, stmt)? {
		rows.push(materialize(stmt, columns, mode));
	}
	Ok(rows)
}

#[cfg(test)]
mod tests {
	use crate::{Connection, ErrorKind, Mode, Row, Value, params};

	#[test]
	fn step_is_idempotent_at_the_end() {
		let db = Connection::open_in_memory().expect("open memory database");
		let mut stmt = db.prepare_with_mode("select 1", Mode::Splat).expect("prepare");
		assert_eq!(stmt.step().expect("first row"), Some(Row::Value(Value::Integer(1))));
		for _ in 0..5 {
			assert_eq!(stmt.step().expect("end marker"), None);
		}
		assert!(stmt.eof());

		stmt.reset().expect("reset");
		assert_eq!(stmt.step().expect("row again"), Some(Row::Value(Value::Integer(1))));
	}

	#[test]
	fn prepare_rejects_blank_and_multiple_statements() {
		let db = Connection::open_in_memory().expect("open memory database");

		let err = db.prepare("  -- nothing\n").expect_err("blank");
		assert_eq!(err.to_string(), "Cannot prepare an empty SQL query");

		let err = db.prepare("select 1; select 2").expect_err("two statements");
		assert_eq!(err.kind(), ErrorKind::Usage);

		db.prepare("select 1; -- done").expect("trailing comment is fine");
	}

	#[test]
	fn closed_statement_keeps_its_introspection() {
		let db = Connection::open_in_memory().expect("open memory database");
		let mut stmt = db.prepare("select 1 as one").expect("prepare");
		stmt.close();
		stmt.close();
		assert!(stmt.is_closed());
		assert_eq!(stmt.sql(), "select 1 as one");
		assert_eq!(stmt.columns(), ["one".to_string()]);
		assert_eq!(stmt.step().expect_err("closed").kind(), ErrorKind::Closed);
	}

	#[test]
	fn status_counts_runs() {
		let db = Connection::open_in_memory().expect("open memory database");
		let mut stmt = db.prepare("select ?").expect("prepare");
		stmt.query(&params![1]).expect("first run");
		stmt.query(&params![2]).expect("second run");
		assert!(stmt.status(super::StatementStatus::Run, false).expect("run counter") >= 1);
		assert!(stmt.status(super::StatementStatus::VmStep, true).expect("vm steps") > 0);
		assert_eq!(stmt.status(super::StatementStatus::VmStep, false).expect("reset counter"), 0);
	}
}
