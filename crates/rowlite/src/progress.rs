//! Progress callbacks, cooperative cancellation and busy retries.
//!
//! SQLite calls back into the connection's [`ProgressSlot`] every `tick`
//! virtual machine instructions. The slot accumulates ticks until `period`
//! is reached and then runs the user handler, which can let the step
//! continue, yield the thread, interrupt the statement or fail with its own
//! error. A failure is parked in the slot and replaces whatever error the
//! interrupted step reports.
//!
//! When a busy timeout is set the slot also owns the busy handler, so every
//! lock retry runs the same user handler with [`ProgressEvent::Busy`].

use core::ffi::{c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{BoxError, Error, Result};
use crate::lock;

pub(crate) const DEFAULT_PERIOD: u32 = 1000;
pub(crate) const DEFAULT_TICK: u32 = 10;
/// Callback granularity while no handler is installed; only interrupts are polled.
pub(crate) const IDLE_TICK: u32 = 100;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum ProgressMode {
	/// Fire every `period` instructions.
	#[default]
	Normal,
	/// Like `Normal`, and fire once more at the end of a call that never reached `period`.
	AtLeastOnce,
	/// Fire once at the start of every call and never during it.
	Once,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ProgressConfig {
	/// Instructions between handler invocations.
	pub period: u32,
	/// Instructions between native callbacks; the granularity of `period`.
	pub tick: u32,
	pub mode: ProgressMode,
}

impl Default for ProgressConfig {
	fn default() -> Self {
		Self { period: DEFAULT_PERIOD, tick: DEFAULT_TICK, mode: ProgressMode::Normal }
	}
}

impl ProgressConfig {
	#[must_use]
	pub fn with_period(period: u32) -> Self {
		Self { period, tick: DEFAULT_TICK.min(period), ..Self::default() }
	}

	#[must_use]
	pub const fn tick(mut self, tick: u32) -> Self {
		self.tick = tick;
		self
	}

	#[must_use]
	pub const fn mode(mut self, mode: ProgressMode) -> Self {
		self.mode = mode;
		self
	}

	pub fn validate(&self) -> Result<()> {
		if self.period == 0 {
			return Err(Error::usage("progress period must be positive"));
		}
		if self.tick == 0 {
			return Err(Error::usage("progress tick must be positive"));
		}
		if self.tick > self.period {
			return Err(Error::usage(format!(
				"progress tick {} is larger than the period {}",
				self.tick, self.period
			)));
		}
		Ok(())
	}
}

/// Why the handler is being called.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProgressEvent {
	/// The statement executed another `period` instructions.
	Step,
	/// The statement is waiting on a lock held by another connection.
	Busy { attempts: u32 },
}

/// What the running statement should do after the handler returns.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum ProgressAction {
	#[default]
	Continue,
	/// Let other threads run, then continue.
	Yield,
	/// Abort the running statement with an interrupt error.
	Interrupt,
}

pub type ProgressHandler = Box<dyn FnMut(ProgressEvent) -> Result<ProgressAction, BoxError> + Send>;

type SharedHandler = Arc<dyn Fn(ProgressEvent) -> Result<ProgressAction, BoxError> + Send + Sync>;

struct DefaultHandler {
	config: ProgressConfig,
	handler: SharedHandler,
}

static DEFAULT_HANDLER: RwLock<Option<DefaultHandler>> = RwLock::new(None);

/// Sets the handler that connections opened from now on start with.
///
/// Connections that are already open keep their own handler.
pub fn set_default_progress_handler<F>(config: ProgressConfig, handler: F) -> Result<()>
where
	F: Fn(ProgressEvent) -> Result<ProgressAction, BoxError> + Send + Sync + 'static,
{
	config.validate()?;
	let mut slot = DEFAULT_HANDLER.write().unwrap_or_else(std::sync::PoisonError::into_inner);
	*slot = Some(DefaultHandler { config, handler: Arc::new(handler) });
	debug!(period = config.period, tick = config.tick, mode = ?config.mode, "default progress handler set");
	Ok(())
}

pub fn clear_default_progress_handler() {
	let mut slot = DEFAULT_HANDLER.write().unwrap_or_else(std::sync::PoisonError::into_inner);
	*slot = None;
}

/// A private copy of the process-wide default, for a connection being opened.
pub(crate) fn default_handler() -> Option<(ProgressConfig, ProgressHandler)> {
	let slot = DEFAULT_HANDLER.read().unwrap_or_else(std::sync::PoisonError::into_inner);
	slot.as_ref().map(|default| {
		let handler = Arc::clone(&default.handler);
		let boxed: ProgressHandler = Box::new(move |event| handler(event));
		(default.config, boxed)
	})
}

/// Per-connection controller state, registered with SQLite by address.
#[derive(Default)]
pub(crate) struct ProgressSlot {
	handler: Option<ProgressHandler>,
	config: ProgressConfig,
	ticks: u32,
	fired: bool,
	pending: Option<Error>,
	busy_timeout: Option<Duration>,
	busy_started: Option<Instant>,
	interrupt: Arc<AtomicBool>,
}

impl ProgressSlot {
	pub(crate) fn with_interrupt(interrupt: Arc<AtomicBool>) -> Self {
		Self { interrupt, ..Self::default() }
	}

	fn interrupt_requested(&self) -> bool {
		self.interrupt.load(Ordering::Acquire)
	}

	pub(crate) fn install(&mut self, config: ProgressConfig, handler: ProgressHandler) {
		self.handler = Some(handler);
		self.config = config;
		self.ticks = 0;
		self.fired = false;
	}

	pub(crate) fn uninstall(&mut self) {
		self.handler = None;
		self.config = ProgressConfig::default();
		self.ticks = 0;
	}

	pub(crate) const fn has_handler(&self) -> bool {
		self.handler.is_some()
	}

	pub(crate) const fn set_busy_timeout(&mut self, timeout: Option<Duration>) {
		self.busy_timeout = timeout;
		self.busy_started = None;
	}

	pub(crate) const fn busy_timeout(&self) -> Option<Duration> {
		self.busy_timeout
	}

	/// Starts a top-level call: clears leftovers from the previous one.
	pub(crate) fn begin(&mut self) -> Result<()> {
		self.ticks = 0;
		self.fired = false;
		self.pending = None;
		self.busy_started = None;
		self.interrupt.store(false, Ordering::Release);

		if self.config.mode == ProgressMode::Once && self.handler.is_some() {
			self.fired = true;
			match self.call(ProgressEvent::Step)? {
				ProgressAction::Continue => {}
				ProgressAction::Yield => std::thread::yield_now(),
				ProgressAction::Interrupt => {
					debug!("operation interrupted by progress handler");
					return Err(Error::Interrupt { message: "interrupted".to_string() });
				}
			}
		}
		Ok(())
	}

	/// Ends a top-level call that completed.
	pub(crate) fn finish(&mut self) -> Result<()> {
		if self.config.mode == ProgressMode::AtLeastOnce && !self.fired && self.handler.is_some() {
			self.fired = true;
			match self.call(ProgressEvent::Step)? {
				ProgressAction::Yield => std::thread::yield_now(),
				// The work is already done; nothing left to interrupt.
				ProgressAction::Continue | ProgressAction::Interrupt => {}
			}
		}
		Ok(())
	}

	pub(crate) const fn take_pending(&mut self) -> Option<Error> {
		self.pending.take()
	}

	fn call(&mut self, event: ProgressEvent) -> Result<ProgressAction> {
		let Some(handler) = self.handler.as_mut() else {
			return Ok(ProgressAction::Continue);
		};

		match catch_unwind(AssertUnwindSafe(|| handler(event))) {
			Ok(Ok(action)) => Ok(action),
			Ok(Err(err)) => Err(Error::Callback(err)),
			Err(_) => Err(Error::callback("progress handler panicked")),
		}
	}

	/// Native progress callback body. Non-zero aborts the running step.
	fn on_tick(&mut self) -> c_int {
		if self.interrupt_requested() {
			debug!("operation interrupted");
			return 1;
		}
		if self.handler.is_none() || self.config.mode == ProgressMode::Once {
			return 0;
		}

		self.ticks = self.ticks.saturating_add(self.config.tick);
		if self.ticks < self.config.period {
			return 0;
		}
		self.ticks = 0;
		self.fired = true;

		match self.call(ProgressEvent::Step) {
			Ok(ProgressAction::Continue) => 0,
			Ok(ProgressAction::Yield) => {
				std::thread::yield_now();
				0
			}
			Ok(ProgressAction::Interrupt) => {
				debug!("operation interrupted by progress handler");
				1
			}
			Err(err) => {
				self.pending = Some(err);
				1
			}
		}
	}

	/// Native busy callback body. Non-zero retries the lock.
	fn on_busy(&mut self, count: c_int) -> c_int {
		if self.interrupt_requested() {
			self.pending = Some(Error::Interrupt { message: "interrupted".to_string() });
			return 0;
		}
		let Some(timeout) = self.busy_timeout else {
			return 0;
		};

		let now = Instant::now();
		let started = match self.busy_started {
			Some(started) if count > 0 => started,
			_ => {
				self.busy_started = Some(now);
				now
			}
		};

		let waited = now.duration_since(started);
		if waited >= timeout {
			trace!(target: "rowlite::sql", ?waited, "busy timeout elapsed");
			return 0;
		}

		let attempts = u32::try_from(count).unwrap_or(u32::MAX).saturating_add(1);
		match self.call(ProgressEvent::Busy { attempts }) {
			Ok(ProgressAction::Continue | ProgressAction::Yield) => {}
			Ok(ProgressAction::Interrupt) => {
				debug!(attempts, "busy wait abandoned by progress handler");
				return 0;
			}
			Err(err) => {
				self.pending = Some(err);
				return 0;
			}
		}

		let pause = Duration::from_millis(u64::from(attempts.min(10))).min(timeout - waited);
		trace!(target: "rowlite::sql", attempts, ?pause, "database busy, retrying");
		std::thread::sleep(pause);
		1
	}
}

pub(crate) unsafe extern "C" fn progress_callback(context: *mut c_void) -> c_int {
	if context.is_null() {
		return 0;
	}
	let slot = unsafe { &*context.cast::<Mutex<ProgressSlot>>() };
	lock(slot).on_tick()
}

pub(crate) unsafe extern "C" fn busy_callback(context: *mut c_void, count: c_int) -> c_int {
	if context.is_null() {
		return 0;
	}
	let slot = unsafe { &*context.cast::<Mutex<ProgressSlot>>() };
	lock(slot).on_busy(count)
}
