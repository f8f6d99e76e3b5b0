use core::ffi::c_int;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::progress::DEFAULT_PERIOD;
use crate::raw::{SQLITE_OPEN_CREATE, SQLITE_OPEN_FULLMUTEX, SQLITE_OPEN_READONLY, SQLITE_OPEN_READWRITE, SQLITE_OPEN_URI};

/// Options applied when a connection is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	pub read_only: bool,
	/// How long a blocked statement keeps retrying a lock before failing with a busy error.
	pub busy_timeout: Option<Duration>,
	/// Switch the database to write-ahead logging.
	pub wal: bool,
	/// `PRAGMA name = value` statements run in order after opening.
	pub pragmas: Vec<(String, String)>,
	/// Period used by progress handlers installed without an explicit configuration.
	pub progress_period: u32,
	/// Yield the thread every this many fetched rows. Zero never yields.
	pub yield_threshold: u32,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			read_only: false,
			busy_timeout: None,
			wal: false,
			pragmas: Vec::new(),
			progress_period: DEFAULT_PERIOD,
			yield_threshold: 0,
		}
	}
}

impl Config {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub const fn read_only(mut self, read_only: bool) -> Self {
		self.read_only = read_only;
		self
	}

	#[must_use]
	pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
		self.busy_timeout = Some(timeout);
		self
	}

	#[must_use]
	pub const fn wal(mut self, wal: bool) -> Self {
		self.wal = wal;
		self
	}

	#[must_use]
	pub fn pragma(mut self, name: impl Into<String>, value: impl ToString) -> Self {
		self.pragmas.push((name.into(), value.to_string()));
		self
	}

	#[must_use]
	pub const fn progress_period(mut self, period: u32) -> Self {
		self.progress_period = period;
		self
	}

	#[must_use]
	pub const fn yield_threshold(mut self, rows: u32) -> Self {
		self.yield_threshold = rows;
		self
	}

	pub(crate) fn validate(&self) -> Result<()> {
		if self.progress_period == 0 {
			return Err(Error::usage("progress period must be positive"));
		}
		if let Some((name, _)) = self.pragmas.iter().find(|(name, _)| !is_identifier(name)) {
			return Err(Error::usage(format!("invalid pragma name: {name:?}")));
		}
		Ok(())
	}

	pub(crate) const fn open_flags(&self) -> c_int {
		let access = if self.read_only {
			SQLITE_OPEN_READONLY
		} else {
			SQLITE_OPEN_READWRITE | SQLITE_OPEN_CREATE
		};
		access | SQLITE_OPEN_URI | SQLITE_OPEN_FULLMUTEX
	}

	/// Pragmas to run after opening, `wal` first.
	pub(crate) fn startup_pragmas(&self) -> Vec<(String, String)> {
		let mut pragmas = Vec::with_capacity(self.pragmas.len() + 2);
		if self.wal {
			pragmas.push(("journal_mode".to_string(), "wal".to_string()));
			pragmas.push(("synchronous".to_string(), "1".to_string()));
		}
		pragmas.extend(self.pragmas.iter().cloned());
		pragmas
	}
}

/// Pragma names may carry a schema prefix (`aux.page_size`).
pub(crate) fn is_identifier(name: &str) -> bool {
	!name.is_empty()
		&& name.split('.').all(|part| {
			!part.is_empty()
				&& part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
				&& !part.starts_with(|c: char| c.is_ascii_digit())
		})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults() {
		let config = Config::default();
		assert!(!config.read_only);
		assert_eq!(config.busy_timeout, None);
		assert_eq!(config.progress_period, 1000);
		assert_eq!(config.yield_threshold, 0);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn wal_pragmas_come_first() {
		let config = Config::new().pragma("cache_size", -2000).wal(true);
		let pragmas = config.startup_pragmas();
		assert_eq!(pragmas.first().map(|(name, _)| name.as_str()), Some("journal_mode"));
		assert_eq!(pragmas.last(), Some(&("cache_size".to_string(), "-2000".to_string())));
	}

	#[test]
	fn read_only_flags() {
		let flags = Config::new().read_only(true).open_flags();
		assert_eq!(flags & SQLITE_OPEN_READONLY, SQLITE_OPEN_READONLY);
		assert_eq!(flags & SQLITE_OPEN_CREATE, 0);
	}

	#[test]
	fn rejects_bad_pragma_names_and_periods() {
		assert!(Config::new().pragma("foreign_keys; drop table x", 1).validate().is_err());
		assert!(Config::new().pragma("main.user_version", 3).validate().is_ok());
		assert!(Config::new().progress_period(0).validate().is_err());
	}
}
