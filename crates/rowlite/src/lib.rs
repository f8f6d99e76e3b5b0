//! Result streaming and prepared statement execution on top of SQLite.
//!
//! ```
//! use rowlite::{Connection, Value, params};
//!
//! let db = Connection::open_in_memory()?;
//! db.execute("create table t(name text, qty integer)", &[])?;
//! db.execute("insert into t values (?, ?)", &params!["widgets", 12])?;
//!
//! let qty = db.query_value("select qty from t where name = ?", &params!["widgets"])?;
//! assert_eq!(qty, Some(Value::Integer(12)));
//! # Ok::<(), rowlite::Error>(())
//! ```

mod backup;
pub mod batch;
mod bind;
#[cfg(feature = "session")]
mod changeset;
mod config;
mod connection;
mod error;
mod progress;
mod row;
mod sql;
mod statement;
mod value;

pub use rowlite_sqlite_ffi::{ffi, raw};

pub use backup::{Backup, BackupOptions};
pub use batch::ParameterSource;
#[cfg(feature = "session")]
pub use changeset::{Change, ChangeOp, Changeset};
pub use config::Config;
pub use connection::{Connection, InterruptHandle, TraceHook, Transaction, TransactionMode};
pub use error::{BoxError, Error, ErrorKind, Result};
pub use progress::{
	ProgressAction, ProgressConfig, ProgressEvent, ProgressHandler, ProgressMode,
	clear_default_progress_handler, set_default_progress_handler,
};
pub use row::{Mode, Record, Row, Shape, Transform};
pub use statement::{Rows, Statement, StatementStatus};
pub use value::{NamedFields, Param, Value, encode};

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn sqlite_lib_version() -> String {
	rowlite_sqlite_ffi::sqlite_lib_version()
}

pub fn sqlite_lib_version_number() -> i32 {
	rowlite_sqlite_ffi::sqlite_lib_version_number()
}

pub fn sqlite_source_id() -> String {
	rowlite_sqlite_ffi::sqlite_source_id()
}

pub fn sqlite_compile_option_used(name: &str) -> bool {
	rowlite_sqlite_ffi::sqlite_compile_option_used(name)
}

pub fn sqlite_compile_options() -> Vec<String> {
	rowlite_sqlite_ffi::sqlite_compile_options()
}
