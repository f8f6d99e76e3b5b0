#![cfg(feature = "session")]

use rowlite::{ChangeOp, Changeset, Connection, ErrorKind, Value};

fn open() -> Connection {
	let db = Connection::open_in_memory().expect("open memory database");
	db.execute("create table t(x integer primary key, y, z)", &[]).expect("create table");
	db
}

fn two_inserts(db: &Connection) -> Changeset {
	db.track_changes(Some(["t"].as_slice()), |db| {
		db.execute("insert into t values (1, 2, 3)", &[])?;
		db.execute("insert into t values (4, 5, 6)", &[])?;
		Ok(())
	})
	.expect("track inserts")
}

#[test]
fn apply_replays_changes_on_another_database() {
	let db = open();
	let changeset = two_inserts(&db);

	let other = open();
	changeset.apply(&other).expect("apply");
	assert_eq!(
		other.query_array("select * from t order by x", &[]).expect("rows"),
		Some(vec![
			vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)],
			vec![Value::Integer(4), Value::Integer(5), Value::Integer(6)],
		])
	);
}

#[test]
fn apply_overwrites_conflicting_rows() {
	let db = open();
	let changeset = two_inserts(&db);

	let other = open();
	other.execute("insert into t values (1, 'stale', 'stale')", &[]).expect("conflicting row");
	changeset.apply(&other).expect("apply over conflict");
	assert_eq!(
		other.query_value("select y from t where x = 1", &[]).expect("replaced"),
		Some(Value::Integer(2))
	);
}

#[test]
fn inverted_changesets_undo_the_original() {
	let db = open();
	let changeset = two_inserts(&db);

	let inverted = changeset.invert().expect("invert");
	assert_ne!(inverted, changeset);
	let ops: Vec<ChangeOp> = inverted.changes().expect("changes").into_iter().map(|change| change.op).collect();
	assert_eq!(ops, [ChangeOp::Delete, ChangeOp::Delete]);

	db.execute("insert into t values (7, 8, 9)", &[]).expect("unrelated row");
	inverted.apply(&db).expect("undo");
	assert_eq!(db.query_column("select x from t", &[]).expect("rows"), Some(vec![Value::Integer(7)]));
}

#[test]
fn blobs_load_back_into_the_same_changes() {
	let db = open();
	let changeset = two_inserts(&db);
	let blob = changeset.to_blob().to_vec();
	assert!(!blob.is_empty());

	let mut loaded = Changeset::new();
	loaded.load(blob.clone());
	assert_eq!(loaded.to_blob(), blob.as_slice());
	assert_eq!(loaded.changes().expect("loaded changes"), changeset.changes().expect("original changes"));
}

#[test]
fn float_and_text_values_survive_tracking() {
	let db = open();
	db.execute("insert into t values (1, 2, 3)", &[]).expect("seed");

	let changeset = db
		.track_changes(None, |db| db.execute("update t set y = 22.5, z = 'zed' where x = 1", &[]).map(drop))
		.expect("track update");
	let mut seen = Vec::new();
	changeset
		.each(|change| {
			seen.push((change.table, change.new));
			Ok(())
		})
		.expect("each");
	assert_eq!(
		seen,
		[("t".to_string(), Some(vec![Value::Null, Value::Float(22.5), Value::Text("zed".to_string())]))]
	);
}

#[test]
fn applying_to_a_closed_connection_fails() {
	let db = open();
	let changeset = two_inserts(&db);
	let other = open();
	other.close().expect("close");
	assert_eq!(changeset.apply(&other).expect_err("closed").kind(), ErrorKind::Closed);
}
