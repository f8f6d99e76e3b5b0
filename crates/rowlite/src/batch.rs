//! Running one statement over a sequence of parameter sets.
//!
//! Every iteration rebinds the statement from the next parameter set and runs
//! it to completion. The first failure stops the batch; iterations that
//! already ran stay applied unless the caller wrapped the batch in a
//! transaction.

use std::sync::Arc;

use crate::bind;
use crate::connection::Connection;
use crate::error::{BoxError, Error, Result};
use crate::row::Row;
use crate::statement::{Statement, collect_rows, run_to_end};
use crate::value::Param;

/// Produces the parameter set for each batch iteration, `None` once exhausted.
pub trait ParameterSource {
	fn next_params(&mut self) -> Result<Option<Param>>;
}

impl<S> ParameterSource for &mut S
where
	S: ParameterSource + ?Sized,
{
	fn next_params(&mut self) -> Result<Option<Param>> {
		(**self).next_params()
	}
}

impl ParameterSource for Box<dyn ParameterSource + '_> {
	fn next_params(&mut self) -> Result<Option<Param>> {
		(**self).next_params()
	}
}

#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
	iter: std::slice::Iter<'a, Param>,
}

impl ParameterSource for SliceSource<'_> {
	fn next_params(&mut self) -> Result<Option<Param>> {
		Ok(self.iter.next().cloned())
	}
}

#[derive(Debug, Clone)]
pub struct IterSource<I> {
	iter: I,
}

impl<I> ParameterSource for IterSource<I>
where
	I: Iterator,
	I::Item: Into<Param>,
{
	fn next_params(&mut self) -> Result<Option<Param>> {
		Ok(self.iter.next().map(Into::into))
	}
}

pub struct FnSource<F> {
	f: F,
}

impl<F> ParameterSource for FnSource<F>
where
	F: FnMut() -> Option<Param>,
{
	fn next_params(&mut self) -> Result<Option<Param>> {
		Ok((self.f)())
	}
}

/// Parameter sets from a slice, in order.
#[must_use]
pub fn from_slice(params: &[Param]) -> SliceSource<'_> {
	SliceSource { iter: params.iter() }
}

/// Parameter sets pulled from an iterator until it ends.
pub fn from_iter<I>(iter: I) -> IterSource<I::IntoIter>
where
	I: IntoIterator,
	I::Item: Into<Param>,
{
	IterSource { iter: iter.into_iter() }
}

/// Parameter sets produced by calling `f` until it returns `None`.
pub fn from_fn<F>(f: F) -> FnSource<F>
where
	F: FnMut() -> Option<Param>,
{
	FnSource { f }
}

impl Statement {
	/// Runs the statement once per parameter set and returns the total change count.
	pub fn batch_execute(&mut self, source: impl ParameterSource) -> Result<u64> {
		self.batch(source, |op, stmt, _| run_to_end(op, stmt))
	}

	/// Runs the statement once per parameter set and returns each iteration's rows.
	pub fn batch_query(&mut self, source: impl ParameterSource) -> Result<Vec<Vec<Row>>> {
		let mut results = Vec::new();
		self.batch(source, |op, stmt, this| {
			let rows = collect_rows(op, stmt, this.columns_arc(), this.mode(), None)?;
			results.push(rows);
			Ok(())
		})?;
		Ok(results)
	}

	/// Like [`Statement::batch_query`], handing each iteration's rows to `f` instead of
	/// buffering them. Returns the total change count.
	pub fn batch_query_each<F>(&mut self, source: impl ParameterSource, mut f: F) -> Result<u64>
	where
		F: FnMut(Vec<Row>) -> std::result::Result<(), BoxError>,
	{
		self.batch(source, |op, stmt, this| {
			let rows = collect_rows(op, stmt, this.columns_arc(), this.mode(), None)?;
			f(rows).map_err(Error::Callback)
		})
	}

	fn batch<F>(&mut self, mut source: impl ParameterSource, mut iteration: F) -> Result<u64>
	where
		F: FnMut(&mut crate::connection::Op<'_>, *mut crate::ffi::Sqlite3Stmt, &Self) -> Result<()>,
	{
		let stmt = self.handle()?;
		let shared = Arc::clone(&self.shared);
		let result = shared.run(|op| {
			let mut changes = 0_u64;
			while let Some(params) = source.next_params()? {
				self.rewind(stmt);
				bind::clear(stmt);
				bind::bind_one(op.db(), stmt, &params)?;
				self.start(op, stmt)?;
				iteration(op, stmt, self)?;
				changes += op.changes();
			}
			Ok(changes)
		});
		self.rewind(stmt);
		result
	}
}

impl Connection {
	pub fn batch_execute(&self, sql: &str, source: impl ParameterSource) -> Result<u64> {
		self.prepare(sql)?.batch_execute(source)
	}

	pub fn batch_query(&self, sql: &str, source: impl ParameterSource) -> Result<Vec<Vec<Row>>> {
		self.prepare(sql)?.batch_query(source)
	}

	pub fn batch_query_each<F>(&self, sql: &str, source: impl ParameterSource, f: F) -> Result<u64>
	where
		F: FnMut(Vec<Row>) -> std::result::Result<(), BoxError>,
	{
		self.prepare(sql)?.batch_query_each(source, f)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sources_drain_in_order() {
		let params = [Param::from(1), Param::from(2)];
		let mut slice = from_slice(&params);
		assert_eq!(slice.next_params().expect("first"), Some(Param::Integer(1)));
		assert_eq!(slice.next_params().expect("second"), Some(Param::Integer(2)));
		assert_eq!(slice.next_params().expect("end"), None);

		let mut iter = from_iter(["a", "b"]);
		assert_eq!(iter.next_params().expect("first"), Some(Param::from("a")));

		let mut left = 2;
		let mut poll = from_fn(|| {
			left -= 1;
			(left >= 0).then(|| Param::from(left))
		});
		assert_eq!(poll.next_params().expect("first"), Some(Param::Integer(1)));
		assert_eq!(poll.next_params().expect("second"), Some(Param::Integer(0)));
		assert_eq!(poll.next_params().expect("end"), None);
	}
}
