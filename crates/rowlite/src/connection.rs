use core::ffi::{c_char, c_int, c_void};
use std::ffi::{CStr, CString};
use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::bind;
use crate::config::{Config, is_identifier};
use crate::error::{BoxError, Error, Result, sqlite_error};
use crate::ffi;
use crate::lock;
use crate::progress::{
	self, IDLE_TICK, ProgressAction, ProgressConfig, ProgressEvent, ProgressHandler, ProgressSlot, busy_callback,
	progress_callback,
};
use crate::raw::{SQLITE_NOMEM, SQLITE_OK};
use crate::row::{Mode, Record, Row};
use crate::sql::{self, Scratch};
use crate::statement::{Statement, collect_rows, run_to_end, step_once};
use crate::value::{Param, Value};

/// Called with the SQL text of every statement as it starts executing.
pub type TraceHook = Box<dyn FnMut(&str) + Send>;

pub(crate) struct State {
	db: Option<NonNull<ffi::Sqlite3>>,
	trace: Option<TraceHook>,
	yield_threshold: u32,
	progress_period: u32,
	/// Change-tracking sessions alive on this handle; the handle cannot close under them.
	sessions: u32,
}

/// Connection state shared with the statements prepared on it.
pub(crate) struct Shared {
	state: Mutex<State>,
	/// Thread currently holding `state`, to turn re-entrant use into an error.
	owner: Mutex<Option<ThreadId>>,
	progress: Mutex<ProgressSlot>,
	interrupt: Arc<InterruptTarget>,
	path: String,
}

unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

pub(crate) struct Guard<'a> {
	shared: &'a Shared,
	state: MutexGuard<'a, State>,
}

impl Drop for Guard<'_> {
	fn drop(&mut self) {
		*lock(&self.shared.owner) = None;
	}
}

/// Exclusive use of an open connection handle.
pub(crate) struct Op<'a> {
	guard: Guard<'a>,
	db: NonNull<ffi::Sqlite3>,
	rows: u64,
}

impl Op<'_> {
	pub(crate) const fn db(&self) -> *mut ffi::Sqlite3 {
		self.db.as_ptr()
	}

	/// Announces a statement about to start executing.
	pub(crate) fn trace(&mut self, sql: &str) {
		trace!(target: "rowlite::sql", sql, "execute");
		if let Some(hook) = self.guard.state.trace.as_mut() {
			hook(sql);
		}
	}

	#[cfg(feature = "session")]
	pub(crate) fn session_opened(&mut self) {
		self.guard.state.sessions += 1;
	}

	#[cfg(feature = "session")]
	pub(crate) fn session_closed(&mut self) {
		self.guard.state.sessions = self.guard.state.sessions.saturating_sub(1);
	}

	pub(crate) fn row_fetched(&mut self) {
		self.rows += 1;
		let threshold = u64::from(self.guard.state.yield_threshold);
		if threshold != 0 && self.rows.is_multiple_of(threshold) {
			thread::yield_now();
		}
	}

	/// Error for a failed step. A failure raised by a callback wins over the engine's report.
	pub(crate) fn step_error(&self, code: c_int) -> Error {
		lock(&self.guard.shared.progress)
			.take_pending()
			.unwrap_or_else(|| sqlite_error(self.db(), code))
	}

	pub(crate) fn changes(&self) -> u64 {
		u64::try_from(unsafe { ffi::sqlite3_changes64(self.db()) }).unwrap_or_default()
	}
}

impl Shared {
	fn guard(&self) -> Result<Guard<'_>> {
		let me = thread::current().id();
		if *lock(&self.owner) == Some(me) {
			return Err(Error::usage("connection is already in use on this thread"));
		}

		let state = lock(&self.state);
		*lock(&self.owner) = Some(me);
		Ok(Guard { shared: self, state })
	}

	/// Locks the connection for an operation that does not execute SQL.
	pub(crate) fn acquire(&self) -> Result<Op<'_>> {
		let guard = self.guard()?;
		let db = guard.state.db.ok_or(Error::ConnectionClosed)?;
		Ok(Op { guard, db, rows: 0 })
	}

	/// Runs one top-level call that executes SQL, with progress bookkeeping around it.
	pub(crate) fn run<T>(&self, f: impl FnOnce(&mut Op<'_>) -> Result<T>) -> Result<T> {
		let mut op = self.acquire()?;
		lock(&self.progress).begin()?;
		let value = f(&mut op)?;
		lock(&self.progress).finish()?;
		Ok(value)
	}

	pub(crate) fn is_closed(&self) -> bool {
		self.interrupt.is_closed()
	}

	fn progress_context(&self) -> *mut c_void {
		std::ptr::from_ref(&self.progress).cast_mut().cast::<c_void>()
	}
}

struct InterruptTarget {
	open: AtomicBool,
	/// Polled by the progress hook; cleared when the next top-level call starts.
	requested: Arc<AtomicBool>,
}

impl InterruptTarget {
	fn is_closed(&self) -> bool {
		!self.open.load(Ordering::Acquire)
	}
}

/// Interrupts whatever the connection is running, from any thread or callback.
#[derive(Clone)]
pub struct InterruptHandle {
	target: Arc<InterruptTarget>,
}

impl InterruptHandle {
	/// Returns false once the connection is closed.
	pub fn interrupt(&self) -> bool {
		if self.target.is_closed() {
			return false;
		}
		self.target.requested.store(true, Ordering::Release);
		debug!("interrupt requested");
		true
	}
}

impl fmt::Debug for InterruptHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("InterruptHandle").field("closed", &self.target.is_closed()).finish()
	}
}

pub struct Connection {
	pub(crate) shared: Arc<Shared>,
}

impl fmt::Debug for Connection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection")
			.field("path", &self.shared.path)
			.field("closed", &self.is_closed())
			.finish()
	}
}

impl Connection {
	pub fn open(path: impl AsRef<Path>) -> Result<Self> {
		Self::open_with(path, &Config::default())
	}

	pub fn open_in_memory() -> Result<Self> {
		Self::open(":memory:")
	}

	pub fn open_with(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
		config.validate()?;
		let path = path.as_ref().to_string_lossy().into_owned();
		let path_c =
			CString::new(path.as_str()).map_err(|_| Error::usage("database path contains a NUL byte"))?;

		let mut db: *mut ffi::Sqlite3 = std::ptr::null_mut();
		let code =
			unsafe { ffi::sqlite3_open_v2(path_c.as_ptr(), &raw mut db, config.open_flags(), std::ptr::null()) };
		if code != SQLITE_OK {
			let error = sqlite_error(db, code);
			if !db.is_null() {
				let _ = unsafe { ffi::sqlite3_close_v2(db) };
			}
			return Err(error);
		}

		let db = NonNull::new(db).ok_or_else(|| Error::Engine {
			code: SQLITE_NOMEM,
			message: "SQLite returned a null connection handle".to_string(),
		})?;
		let _ = unsafe { ffi::sqlite3_extended_result_codes(db.as_ptr(), 1) };

		let requested = Arc::new(AtomicBool::new(false));
		let conn = Self {
			shared: Arc::new(Shared {
				state: Mutex::new(State {
					db: Some(db),
					trace: None,
					yield_threshold: config.yield_threshold,
					progress_period: config.progress_period,
					sessions: 0,
				}),
				owner: Mutex::new(None),
				progress: Mutex::new(ProgressSlot::with_interrupt(Arc::clone(&requested))),
				interrupt: Arc::new(InterruptTarget { open: AtomicBool::new(true), requested }),
				path,
			}),
		};

		conn.arm_progress_hook(IDLE_TICK)?;
		// Surfaces files that are not databases now instead of at first use.
		conn.shared.run(|op| exec_raw(op, "pragma schema_version"))?;

		if config.busy_timeout.is_some() {
			conn.set_busy_timeout(config.busy_timeout)?;
		}
		if let Some((progress, handler)) = progress::default_handler() {
			conn.install_progress(progress, handler)?;
		}
		for (name, value) in config.startup_pragmas() {
			conn.set_pragma(&name, &value)?;
		}

		debug!(path = %conn.shared.path, read_only = config.read_only, wal = config.wal, "opened connection");
		Ok(conn)
	}

	/// Closes the connection. Closing twice is a no-op.
	///
	/// Statements prepared on this connection stay alive but fail with
	/// [`Error::ConnectionClosed`] when executed.
	pub fn close(&self) -> Result<()> {
		let mut guard = self.shared.guard()?;
		if guard.state.sessions > 0 {
			return Err(Error::usage("cannot close a connection while changes are being tracked"));
		}
		let Some(db) = guard.state.db.take() else {
			return Ok(());
		};

		self.shared.interrupt.open.store(false, Ordering::Release);
		guard.state.trace = None;
		lock(&self.shared.progress).uninstall();
		unsafe {
			ffi::sqlite3_progress_handler(db.as_ptr(), 0, None, std::ptr::null_mut());
			let _ = ffi::sqlite3_busy_handler(db.as_ptr(), None, std::ptr::null_mut());
		}

		let code = unsafe { ffi::sqlite3_close_v2(db.as_ptr()) };
		debug!(path = %self.shared.path, "closed connection");
		if code == SQLITE_OK { Ok(()) } else { Err(sqlite_error(std::ptr::null_mut(), code)) }
	}

	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.shared.is_closed()
	}

	/// The path the connection was opened with.
	#[must_use]
	pub fn path(&self) -> &str {
		&self.shared.path
	}

	/// Absolute file name of the main database, `None` for in-memory and temporary databases.
	pub fn filename(&self) -> Result<Option<String>> {
		let op = self.shared.acquire()?;
		let ptr = unsafe { ffi::sqlite3_db_filename(op.db(), c"main".as_ptr()) };
		if ptr.is_null() {
			return Ok(None);
		}
		let name = unsafe { CStr::from_ptr(ptr).to_string_lossy().into_owned() };
		Ok(Some(name).filter(|name| !name.is_empty()))
	}

	pub fn read_only(&self) -> Result<bool> {
		let op = self.shared.acquire()?;
		Ok(unsafe { ffi::sqlite3_db_readonly(op.db(), c"main".as_ptr()) } == 1)
	}

	/// Loads a run-time extension from the shared library at `path`.
	///
	/// `entry_point` defaults to the name SQLite derives from the file name.
	/// Extension loading is switched on only for the duration of the call.
	pub fn load_extension(&self, path: impl AsRef<Path>, entry_point: Option<&str>) -> Result<()> {
		let path = path.as_ref().to_string_lossy().into_owned();
		let file = CString::new(path.as_str()).map_err(|_| Error::usage("extension path contains a NUL byte"))?;
		let entry = entry_point
			.map(CString::new)
			.transpose()
			.map_err(|_| Error::usage("extension entry point contains a NUL byte"))?;

		let op = self.shared.acquire()?;
		let code = unsafe { ffi::sqlite3_enable_load_extension(op.db(), 1) };
		if code != SQLITE_OK {
			return Err(sqlite_error(op.db(), code));
		}

		let mut message: *mut c_char = std::ptr::null_mut();
		let code = unsafe {
			ffi::sqlite3_load_extension(
				op.db(),
				file.as_ptr(),
				entry.as_ref().map_or(std::ptr::null(), |entry| entry.as_ptr()),
				&raw mut message,
			)
		};
		let _ = unsafe { ffi::sqlite3_enable_load_extension(op.db(), 0) };

		if code == SQLITE_OK {
			debug!(path = %path, "extension loaded");
			return Ok(());
		}
		let message = if message.is_null() {
			rowlite_sqlite_ffi::sqlite_error_string(code)
		} else {
			let text = unsafe { CStr::from_ptr(message).to_string_lossy().into_owned() };
			unsafe { ffi::sqlite3_free(message.cast()) };
			text
		};
		Err(Error::Sql { code, message, offset: None })
	}

	/// Rows changed by the most recent insert, update or delete.
	pub fn changes(&self) -> Result<u64> {
		Ok(self.shared.acquire()?.changes())
	}

	pub fn total_changes(&self) -> Result<u64> {
		let op = self.shared.acquire()?;
		Ok(u64::try_from(unsafe { ffi::sqlite3_total_changes64(op.db()) }).unwrap_or_default())
	}

	pub fn last_insert_rowid(&self) -> Result<i64> {
		let op = self.shared.acquire()?;
		Ok(unsafe { ffi::sqlite3_last_insert_rowid(op.db()) })
	}

	pub fn transaction_active(&self) -> Result<bool> {
		let op = self.shared.acquire()?;
		Ok(unsafe { ffi::sqlite3_get_autocommit(op.db()) } == 0)
	}

	/// Sets how long statements retry a locked database. `None` or zero fails immediately.
	pub fn set_busy_timeout(&self, timeout: Option<Duration>) -> Result<()> {
		let op = self.shared.acquire()?;
		let timeout = timeout.filter(|timeout| !timeout.is_zero());
		lock(&self.shared.progress).set_busy_timeout(timeout);

		let code = if timeout.is_some() {
			unsafe { ffi::sqlite3_busy_handler(op.db(), Some(busy_callback), self.shared.progress_context()) }
		} else {
			unsafe { ffi::sqlite3_busy_handler(op.db(), None, std::ptr::null_mut()) }
		};
		if code != SQLITE_OK {
			return Err(sqlite_error(op.db(), code));
		}

		debug!(?timeout, "busy timeout set");
		Ok(())
	}

	/// Installs `handler` with the connection's default period, replacing any previous one.
	pub fn set_progress_handler<F>(&self, handler: F) -> Result<()>
	where
		F: FnMut(ProgressEvent) -> Result<ProgressAction, BoxError> + Send + 'static,
	{
		let period = self.shared.acquire()?.guard.state.progress_period;
		self.set_progress_handler_with(ProgressConfig::with_period(period), handler)
	}

	pub fn set_progress_handler_with<F>(&self, config: ProgressConfig, handler: F) -> Result<()>
	where
		F: FnMut(ProgressEvent) -> Result<ProgressAction, BoxError> + Send + 'static,
	{
		config.validate()?;
		self.install_progress(config, Box::new(handler))
	}

	fn install_progress(&self, config: ProgressConfig, handler: ProgressHandler) -> Result<()> {
		self.arm_progress_hook(config.tick)?;
		lock(&self.shared.progress).install(config, handler);
		debug!(period = config.period, tick = config.tick, mode = ?config.mode, "progress handler installed");
		Ok(())
	}

	/// Removes the user handler. The hook itself stays registered so interrupts keep working.
	pub fn clear_progress_handler(&self) -> Result<()> {
		self.arm_progress_hook(IDLE_TICK)?;
		let mut slot = lock(&self.shared.progress);
		if slot.has_handler() {
			slot.uninstall();
			debug!("progress handler cleared");
		}
		Ok(())
	}

	fn arm_progress_hook(&self, tick: u32) -> Result<()> {
		let op = self.shared.acquire()?;
		let tick = c_int::try_from(tick).unwrap_or(c_int::MAX);
		unsafe {
			ffi::sqlite3_progress_handler(op.db(), tick, Some(progress_callback), self.shared.progress_context());
		}
		Ok(())
	}

	/// Interrupts the statement currently running on this connection, if any.
	pub fn interrupt(&self) -> bool {
		self.interrupt_handle().interrupt()
	}

	#[must_use]
	pub fn interrupt_handle(&self) -> InterruptHandle {
		InterruptHandle { target: Arc::clone(&self.shared.interrupt) }
	}

	/// Calls `hook` with the SQL of every statement as it starts executing.
	pub fn trace<F>(&self, hook: F) -> Result<()>
	where
		F: FnMut(&str) + Send + 'static,
	{
		let mut op = self.shared.acquire()?;
		op.guard.state.trace = Some(Box::new(hook));
		Ok(())
	}

	pub fn clear_trace(&self) -> Result<()> {
		let mut op = self.shared.acquire()?;
		op.guard.state.trace = None;
		Ok(())
	}

	/// Compiles a single SQL statement.
	pub fn prepare(&self, sql: &str) -> Result<Statement> {
		Statement::prepare(&self.shared, sql, Mode::Record)
	}

	pub fn prepare_with_mode(&self, sql: &str, mode: Mode) -> Result<Statement> {
		Statement::prepare(&self.shared, sql, mode)
	}

	/// Runs `sql`, which may hold several statements, and returns the change count of the last one.
	pub fn execute(&self, sql: &str, params: &[Param]) -> Result<u64> {
		let changes = self.run_script(sql, params, &Mode::Record, |op, stmt, _| {
			run_to_end(op, stmt.as_ptr())?;
			Ok(Some(op.changes()))
		})?;
		Ok(changes.unwrap_or_default())
	}

	/// Rows of the last statement in `sql`, shaped by `mode`.
	///
	/// `None` when `sql` is blank or its last statement has no result columns.
	pub fn query_with_mode(&self, sql: &str, params: &[Param], mode: &Mode) -> Result<Option<Vec<Row>>> {
		self.run_script(sql, params, mode, |op, stmt, columns| {
			if columns.is_empty() {
				run_to_end(op, stmt.as_ptr())?;
				return Ok(None);
			}
			collect_rows(op, stmt.as_ptr(), columns, mode, None).map(Some)
		})
	}

	pub fn query(&self, sql: &str, params: &[Param]) -> Result<Option<Vec<Record>>> {
		let rows = self.query_with_mode(sql, params, &Mode::Record)?;
		Ok(rows.map(|rows| rows.into_iter().filter_map(Row::into_record).collect()))
	}

	pub fn query_array(&self, sql: &str, params: &[Param]) -> Result<Option<Vec<Vec<Value>>>> {
		let rows = self.query_with_mode(sql, params, &Mode::Array)?;
		Ok(rows.map(|rows| rows.into_iter().filter_map(Row::into_array).collect()))
	}

	/// Values of the single result column.
	pub fn query_column(&self, sql: &str, params: &[Param]) -> Result<Option<Vec<Value>>> {
		let rows = self.query_with_mode(sql, params, &Mode::Splat)?;
		Ok(rows.map(|rows| rows.into_iter().filter_map(Row::into_value).collect()))
	}

	/// First row of the result, without reading the rest.
	pub fn query_row(&self, sql: &str, params: &[Param]) -> Result<Option<Record>> {
		let row = self.run_script(sql, params, &Mode::Record, |op, stmt, columns| {
			if columns.is_empty() {
				run_to_end(op, stmt.as_ptr())?;
				return Ok(None);
			}
			let mut rows = collect_rows(op, stmt.as_ptr(), columns, &Mode::Record, Some(1))?;
			Ok(rows.pop())
		})?;
		Ok(row.and_then(Row::into_record))
	}

	/// First column of the first row.
	pub fn query_value(&self, sql: &str, params: &[Param]) -> Result<Option<Value>> {
		let row = self.query_row(sql, params)?;
		Ok(row.and_then(|row| row.into_values().into_iter().next()))
	}

	/// Result column names of a single statement, without executing it.
	pub fn columns(&self, sql: &str) -> Result<Vec<String>> {
		let stmt = self.prepare(sql)?;
		Ok(stmt.columns().to_vec())
	}

	/// Names of the user tables in the main database.
	pub fn tables(&self) -> Result<Vec<String>> {
		let names = self.query_column(
			"select name from sqlite_schema where type = 'table' and name not like 'sqlite_%' order by name",
			&[],
		)?;
		Ok(names
			.unwrap_or_default()
			.into_iter()
			.filter_map(|value| match value {
				Value::Text(name) => Some(name),
				_ => None,
			})
			.collect())
	}

	pub fn pragma(&self, name: &str) -> Result<Option<Value>> {
		if !is_identifier(name) {
			return Err(Error::usage(format!("invalid pragma name: {name:?}")));
		}
		self.query_value(&format!("pragma {name}"), &[])
	}

	pub fn set_pragma(&self, name: &str, value: impl fmt::Display) -> Result<()> {
		if !is_identifier(name) {
			return Err(Error::usage(format!("invalid pragma name: {name:?}")));
		}
		let value = pragma_literal(&value.to_string());
		self.execute(&format!("pragma {name} = {value}"), &[]).map(drop)
	}

	pub fn transaction(&self) -> Result<Transaction<'_>> {
		self.transaction_with_mode(TransactionMode::default())
	}

	pub fn transaction_with_mode(&self, mode: TransactionMode) -> Result<Transaction<'_>> {
		self.execute(mode.begin_sql(), &[])?;
		Ok(Transaction { conn: self, active: true })
	}

	/// Executes every statement of `sql` in order, handing the last one to `last`.
	///
	/// Parameters bind to the last statement only. Error offsets are relative to
	/// the start of `sql`.
	fn run_script<T>(
		&self,
		sql: &str,
		params: &[Param],
		mode: &Mode,
		last: impl FnOnce(&mut Op<'_>, &Scratch, &Arc<[String]>) -> Result<Option<T>>,
	) -> Result<Option<T>> {
		bind::validate(params)?;

		self.shared.run(|op| {
			let mut offset = 0;
			loop {
				let rest = sql.get(offset..).unwrap_or_default();
				let compiled = sql::compile(op.db(), rest).map_err(|err| err.shift_offset(offset))?;
				let next = offset + compiled.tail;
				let remaining = sql.get(next..).unwrap_or_default();

				let Some(handle) = compiled.stmt else {
					if compiled.tail == 0 || sql::is_blank(remaining) {
						return Ok(None);
					}
					offset = next;
					continue;
				};
				let stmt = Scratch(handle);

				if !sql::is_blank(remaining) {
					op.trace(&sql::statement_sql(stmt.as_ptr()).unwrap_or_default());
					run_to_end(op, stmt.as_ptr()).map_err(|err| err.shift_offset(offset))?;
					offset = next;
					continue;
				}

				let columns: Arc<[String]> = sql::column_names(stmt.as_ptr()).into();
				mode.check_columns(columns.len())?;
				bind::bind_all(op.db(), stmt.as_ptr(), params)?;
				op.trace(&sql::statement_sql(stmt.as_ptr()).unwrap_or_default());
				return last(op, &stmt, &columns).map_err(|err| err.shift_offset(offset));
			}
		})
	}
}

impl Drop for Connection {
	fn drop(&mut self) {
		if let Err(err) = self.close() {
			warn!(path = %self.shared.path, %err, "closing connection failed");
		}
	}
}

/// Steps a one-off statement to completion, outside any statement object.
fn exec_raw(op: &mut Op<'_>, sql: &str) -> Result<()> {
	let compiled = sql::compile(op.db(), sql)?;
	if let Some(handle) = compiled.stmt {
		let stmt = Scratch(handle);
		while step_once(op, stmt.as_ptr())? {}
	}
	Ok(())
}

/// Pragma values cannot be bound, so anything that is not a plain word or number is quoted.
fn pragma_literal(value: &str) -> String {
	let plain = !value.is_empty()
		&& value.chars().enumerate().all(|(i, c)| c.is_ascii_alphanumeric() || c == '_' || (i == 0 && c == '-'));
	if plain { value.to_string() } else { format!("'{}'", value.replace('\'', "''")) }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum TransactionMode {
	Deferred,
	/// Takes the write lock at `begin`.
	#[default]
	Immediate,
	Exclusive,
}

impl TransactionMode {
	const fn begin_sql(self) -> &'static str {
		match self {
			Self::Deferred => "BEGIN DEFERRED",
			Self::Immediate => "BEGIN IMMEDIATE",
			Self::Exclusive => "BEGIN EXCLUSIVE",
		}
	}
}

/// An open transaction. Rolls back when dropped unless committed.
pub struct Transaction<'conn> {
	conn: &'conn Connection,
	active: bool,
}

impl Transaction<'_> {
	pub fn commit(mut self) -> Result<()> {
		if !self.active {
			return Ok(());
		}

		self.conn.execute("COMMIT", &[])?;
		self.active = false;
		Ok(())
	}

	pub fn rollback(mut self) -> Result<()> {
		if !self.active {
			return Ok(());
		}

		self.conn.execute("ROLLBACK", &[])?;
		self.active = false;
		Ok(())
	}

	#[must_use]
	pub const fn is_active(&self) -> bool {
		self.active
	}
}

impl Deref for Transaction<'_> {
	type Target = Connection;

	fn deref(&self) -> &Connection {
		self.conn
	}
}

impl Drop for Transaction<'_> {
	fn drop(&mut self) {
		if !self.active {
			return;
		}
		if let Err(err) = self.conn.execute("ROLLBACK", &[]) {
			warn!(%err, "rolling back transaction on drop failed");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pragma_literals() {
		assert_eq!(pragma_literal("wal"), "wal");
		assert_eq!(pragma_literal("-2000"), "-2000");
		assert_eq!(pragma_literal("a b"), "'a b'");
		assert_eq!(pragma_literal("it's"), "'it''s'");
		assert_eq!(pragma_literal(""), "''");
	}

	#[test]
	fn close_is_idempotent() {
		let db = Connection::open_in_memory().expect("open memory database");
		db.close().expect("close");
		db.close().expect("close again");
		assert!(db.is_closed());
		assert!(db.changes().expect_err("closed").is_closed());
		assert!(!db.interrupt());
	}

	#[test]
	fn transaction_rolls_back_on_drop_and_can_commit() {
		let db = Connection::open_in_memory().expect("open memory database");
		db.execute("create table txlog(value text)", &[]).expect("create table");

		{
			let tx = db.transaction().expect("begin transaction");
			tx.execute("insert into txlog(value) values ('rolled')", &[]).expect("insert rolled row");
			assert!(db.transaction_active().expect("active"));
		}

		let rolled = db.query_value("select count(*) from txlog", &[]).expect("count after rollback");
		assert_eq!(rolled, Some(Value::Integer(0)));

		let tx = db.transaction_with_mode(TransactionMode::Deferred).expect("begin transaction");
		tx.execute("insert into txlog(value) values ('committed')", &[]).expect("insert committed row");
		tx.commit().expect("commit transaction");

		let committed = db.query_value("select count(*) from txlog", &[]).expect("count after commit");
		assert_eq!(committed, Some(Value::Integer(1)));
		assert!(!db.transaction_active().expect("inactive"));
	}

	#[test]
	fn missing_extensions_report_the_loader_message() {
		let db = Connection::open_in_memory().expect("open memory database");
		let err = db.load_extension("/nonexistent/libnothing", None).expect_err("no such library");
		assert_eq!(err.kind(), crate::ErrorKind::Sql);
		assert!(err.to_string().contains("libnothing"), "{err}");

		let err = db.load_extension("bad\0path", None).expect_err("nul byte");
		assert_eq!(err.kind(), crate::ErrorKind::Usage);

		// The loader is switched back off afterwards.
		let err = db.query_value("select load_extension('/nonexistent/libnothing')", &[]).expect_err("disabled");
		assert!(err.to_string().contains("not authorized"), "{err}");
	}

	#[test]
	fn default_transaction_mode_is_immediate() {
		assert_eq!(TransactionMode::default(), TransactionMode::Immediate);
		assert_eq!(TransactionMode::default().begin_sql(), "BEGIN IMMEDIATE");
	}

	#[test]
	fn reentrant_use_from_a_callback_is_rejected() {
		let db = Arc::new(Connection::open_in_memory().expect("open memory database"));
		let inner = Arc::clone(&db);
		let seen = Arc::new(Mutex::new(None));
		let slot = Arc::clone(&seen);
		db.trace(move |_| {
			*lock(&slot) = Some(inner.execute("select 1", &[]).map_err(|err| err.kind()));
		})
		.expect("install trace");

		db.execute("select 2", &[]).expect("outer execute");
		assert_eq!(*lock(&seen), Some(Err(crate::ErrorKind::Usage)));
		db.clear_trace().expect("clear trace");
	}
}
