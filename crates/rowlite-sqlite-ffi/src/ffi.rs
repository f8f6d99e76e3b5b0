use core::ffi::{c_char, c_int, c_uchar, c_void};

pub type Sqlite3Int64 = i64;
pub type Sqlite3UInt64 = u64;
pub type Sqlite3DestructorType = Option<unsafe extern "C" fn(*mut c_void)>;

pub type Sqlite3ProgressCallback = Option<unsafe extern "C" fn(*mut c_void) -> c_int>;
pub type Sqlite3BusyCallback = Option<unsafe extern "C" fn(*mut c_void, c_int) -> c_int>;
#[cfg(feature = "session")]
pub type Sqlite3ChangesetFilter = Option<unsafe extern "C" fn(*mut c_void, *const c_char) -> c_int>;
#[cfg(feature = "session")]
pub type Sqlite3ChangesetConflict =
	Option<unsafe extern "C" fn(*mut c_void, c_int, *mut Sqlite3ChangesetIter) -> c_int>;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct Sqlite3 {
	_unused: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct Sqlite3Stmt {
	_unused: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct Sqlite3Backup {
	_unused: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct Sqlite3Value {
	_unused: [u8; 0],
}

#[cfg(feature = "session")]
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct Sqlite3Session {
	_unused: [u8; 0],
}

#[cfg(feature = "session")]
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct Sqlite3ChangesetIter {
	_unused: [u8; 0],
}

unsafe extern "C" {
	pub fn sqlite3_libversion_number() -> c_int;
	pub fn sqlite3_libversion() -> *const c_char;
	pub fn sqlite3_sourceid() -> *const c_char;
	pub fn sqlite3_compileoption_used(name: *const c_char) -> c_int;
	pub fn sqlite3_compileoption_get(n: c_int) -> *const c_char;
	pub fn sqlite3_threadsafe() -> c_int;

	pub fn sqlite3_open_v2(
		filename: *const c_char,
		pp_db: *mut *mut Sqlite3,
		flags: c_int,
		z_vfs: *const c_char,
	) -> c_int;
	pub fn sqlite3_close_v2(db: *mut Sqlite3) -> c_int;
	pub fn sqlite3_extended_result_codes(db: *mut Sqlite3, onoff: c_int) -> c_int;
	pub fn sqlite3_db_filename(db: *mut Sqlite3, z_db_name: *const c_char) -> *const c_char;
	pub fn sqlite3_db_readonly(db: *mut Sqlite3, z_db_name: *const c_char) -> c_int;
	pub fn sqlite3_get_autocommit(db: *mut Sqlite3) -> c_int;
	pub fn sqlite3_changes64(db: *mut Sqlite3) -> Sqlite3Int64;
	pub fn sqlite3_total_changes64(db: *mut Sqlite3) -> Sqlite3Int64;
	pub fn sqlite3_last_insert_rowid(db: *mut Sqlite3) -> Sqlite3Int64;

	pub fn sqlite3_free(ptr: *mut c_void);

	pub fn sqlite3_errmsg(db: *mut Sqlite3) -> *const c_char;
	pub fn sqlite3_errstr(code: c_int) -> *const c_char;
	pub fn sqlite3_extended_errcode(db: *mut Sqlite3) -> c_int;
	pub fn sqlite3_error_offset(db: *mut Sqlite3) -> c_int;

	pub fn sqlite3_progress_handler(
		db: *mut Sqlite3,
		n_ops: c_int,
		callback: Sqlite3ProgressCallback,
		p_arg: *mut c_void,
	);
	pub fn sqlite3_busy_handler(
		db: *mut Sqlite3,
		callback: Sqlite3BusyCallback,
		p_arg: *mut c_void,
	) -> c_int;

	pub fn sqlite3_prepare_v3(
		db: *mut Sqlite3,
		z_sql: *const c_char,
		n_byte: c_int,
		prep_flags: u32,
		pp_stmt: *mut *mut Sqlite3Stmt,
		pz_tail: *mut *const c_char,
	) -> c_int;
	pub fn sqlite3_step(p_stmt: *mut Sqlite3Stmt) -> c_int;
	pub fn sqlite3_reset(p_stmt: *mut Sqlite3Stmt) -> c_int;
	pub fn sqlite3_finalize(p_stmt: *mut Sqlite3Stmt) -> c_int;
	pub fn sqlite3_clear_bindings(p_stmt: *mut Sqlite3Stmt) -> c_int;
	pub fn sqlite3_sql(p_stmt: *mut Sqlite3Stmt) -> *const c_char;
	pub fn sqlite3_stmt_busy(p_stmt: *mut Sqlite3Stmt) -> c_int;
	pub fn sqlite3_stmt_status(p_stmt: *mut Sqlite3Stmt, op: c_int, reset: c_int) -> c_int;

	pub fn sqlite3_bind_parameter_count(p_stmt: *mut Sqlite3Stmt) -> c_int;
	pub fn sqlite3_bind_parameter_index(p_stmt: *mut Sqlite3Stmt, z_name: *const c_char) -> c_int;
	pub fn sqlite3_bind_null(p_stmt: *mut Sqlite3Stmt, i: c_int) -> c_int;
	pub fn sqlite3_bind_int64(p_stmt: *mut Sqlite3Stmt, i: c_int, value: Sqlite3Int64) -> c_int;
	pub fn sqlite3_bind_double(p_stmt: *mut Sqlite3Stmt, i: c_int, value: f64) -> c_int;
	pub fn sqlite3_bind_text64(
		p_stmt: *mut Sqlite3Stmt,
		i: c_int,
		value: *const c_char,
		n: Sqlite3UInt64,
		destructor: Sqlite3DestructorType,
		encoding: c_uchar,
	) -> c_int;
	pub fn sqlite3_bind_blob64(
		p_stmt: *mut Sqlite3Stmt,
		i: c_int,
		value: *const c_void,
		n: Sqlite3UInt64,
		destructor: Sqlite3DestructorType,
	) -> c_int;

	pub fn sqlite3_column_count(p_stmt: *mut Sqlite3Stmt) -> c_int;
	pub fn sqlite3_column_name(p_stmt: *mut Sqlite3Stmt, i_col: c_int) -> *const c_char;
	pub fn sqlite3_column_type(p_stmt: *mut Sqlite3Stmt, i_col: c_int) -> c_int;
	pub fn sqlite3_column_int64(p_stmt: *mut Sqlite3Stmt, i_col: c_int) -> Sqlite3Int64;
	pub fn sqlite3_column_double(p_stmt: *mut Sqlite3Stmt, i_col: c_int) -> f64;
	pub fn sqlite3_column_text(p_stmt: *mut Sqlite3Stmt, i_col: c_int) -> *const c_uchar;
	pub fn sqlite3_column_blob(p_stmt: *mut Sqlite3Stmt, i_col: c_int) -> *const c_void;
	pub fn sqlite3_column_bytes(p_stmt: *mut Sqlite3Stmt, i_col: c_int) -> c_int;

	pub fn sqlite3_value_type(value: *mut Sqlite3Value) -> c_int;
	pub fn sqlite3_value_int64(value: *mut Sqlite3Value) -> Sqlite3Int64;
	pub fn sqlite3_value_double(value: *mut Sqlite3Value) -> f64;
	pub fn sqlite3_value_text(value: *mut Sqlite3Value) -> *const c_uchar;
	pub fn sqlite3_value_blob(value: *mut Sqlite3Value) -> *const c_void;
	pub fn sqlite3_value_bytes(value: *mut Sqlite3Value) -> c_int;

	pub fn sqlite3_enable_load_extension(db: *mut Sqlite3, onoff: c_int) -> c_int;
	pub fn sqlite3_load_extension(
		db: *mut Sqlite3,
		z_file: *const c_char,
		z_proc: *const c_char,
		pz_err_msg: *mut *mut c_char,
	) -> c_int;

	pub fn sqlite3_backup_init(
		p_dest: *mut Sqlite3,
		z_dest_name: *const c_char,
		p_source: *mut Sqlite3,
		z_source_name: *const c_char,
	) -> *mut Sqlite3Backup;
	pub fn sqlite3_backup_step(p: *mut Sqlite3Backup, n_page: c_int) -> c_int;
	pub fn sqlite3_backup_finish(p: *mut Sqlite3Backup) -> c_int;
	pub fn sqlite3_backup_remaining(p: *mut Sqlite3Backup) -> c_int;
	pub fn sqlite3_backup_pagecount(p: *mut Sqlite3Backup) -> c_int;
}

#[cfg(feature = "session")]
unsafe extern "C" {
	pub fn sqlite3session_create(
		db: *mut Sqlite3,
		z_db: *const c_char,
		pp_session: *mut *mut Sqlite3Session,
	) -> c_int;
	pub fn sqlite3session_delete(p_session: *mut Sqlite3Session);
	pub fn sqlite3session_attach(p_session: *mut Sqlite3Session, z_tab: *const c_char) -> c_int;
	pub fn sqlite3session_changeset(
		p_session: *mut Sqlite3Session,
		pn_changeset: *mut c_int,
		pp_changeset: *mut *mut c_void,
	) -> c_int;

	pub fn sqlite3changeset_start(
		pp: *mut *mut Sqlite3ChangesetIter,
		n_changeset: c_int,
		p_changeset: *mut c_void,
	) -> c_int;
	pub fn sqlite3changeset_next(p_iter: *mut Sqlite3ChangesetIter) -> c_int;
	pub fn sqlite3changeset_op(
		p_iter: *mut Sqlite3ChangesetIter,
		pz_tab: *mut *const c_char,
		pn_col: *mut c_int,
		p_op: *mut c_int,
		pb_indirect: *mut c_int,
	) -> c_int;
	pub fn sqlite3changeset_old(
		p_iter: *mut Sqlite3ChangesetIter,
		i_val: c_int,
		pp_value: *mut *mut Sqlite3Value,
	) -> c_int;
	pub fn sqlite3changeset_new(
		p_iter: *mut Sqlite3ChangesetIter,
		i_val: c_int,
		pp_value: *mut *mut Sqlite3Value,
	) -> c_int;
	pub fn sqlite3changeset_finalize(p_iter: *mut Sqlite3ChangesetIter) -> c_int;
	pub fn sqlite3changeset_invert(
		n_in: c_int,
		p_in: *const c_void,
		pn_out: *mut c_int,
		pp_out: *mut *mut c_void,
	) -> c_int;
	pub fn sqlite3changeset_apply(
		db: *mut Sqlite3,
		n_changeset: c_int,
		p_changeset: *mut c_void,
		x_filter: Sqlite3ChangesetFilter,
		x_conflict: Sqlite3ChangesetConflict,
		p_ctx: *mut c_void,
	) -> c_int;
}
