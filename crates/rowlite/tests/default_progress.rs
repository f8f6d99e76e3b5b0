use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use rowlite::{
	BoxError, Connection, ProgressAction, ProgressConfig, ProgressEvent, ProgressMode, clear_default_progress_handler,
	set_default_progress_handler,
};

#[test]
fn default_handler_is_copied_at_open() {
	let before = Connection::open_in_memory().expect("open before default");

	let calls = Arc::new(AtomicU32::new(0));
	let seen = Arc::clone(&calls);
	set_default_progress_handler(
		ProgressConfig::default().mode(ProgressMode::Once),
		move |_: ProgressEvent| -> Result<ProgressAction, BoxError> {
			seen.fetch_add(1, Ordering::SeqCst);
			Ok(ProgressAction::Continue)
		},
	)
	.expect("set default");

	let after = Connection::open_in_memory().expect("open after default");
	clear_default_progress_handler();
	let opened = calls.load(Ordering::SeqCst);

	before.query_value("select 1", &[]).expect("query before");
	assert_eq!(calls.load(Ordering::SeqCst), opened);

	after.query_value("select 1", &[]).expect("query after");
	assert_eq!(calls.load(Ordering::SeqCst), opened + 1);

	let later = Connection::open_in_memory().expect("open after clear");
	later.query_value("select 1", &[]).expect("query later");
	assert_eq!(calls.load(Ordering::SeqCst), opened + 1);
}
