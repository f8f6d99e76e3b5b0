use rowlite::{Backup, BackupOptions, Config, Connection, ErrorKind, Value};

#[test]
fn wal_and_pragmas_apply_at_open() {
	let dir = tempfile::tempdir().expect("create temp dir");
	let path = dir.path().join("wal.db");

	let db = Connection::open_with(&path, &Config::new().wal(true).pragma("user_version", 7)).expect("open");
	assert_eq!(db.pragma("journal_mode").expect("journal mode"), Some(Value::Text("wal".to_string())));
	assert_eq!(db.pragma("user_version").expect("user version"), Some(Value::Integer(7)));
	assert!(db.filename().expect("filename").is_some_and(|name| name.ends_with("wal.db")));
	assert!(!db.read_only().expect("read only"));
}

#[test]
fn read_only_connections_refuse_writes() {
	let dir = tempfile::tempdir().expect("create temp dir");
	let path = dir.path().join("ro.db");
	Connection::open(&path).expect("create").execute("create table t(x)", &[]).expect("create table");

	let db = Connection::open_with(&path, &Config::new().read_only(true)).expect("open read only");
	assert!(db.read_only().expect("read only"));
	let err = db.execute("insert into t values (1)", &[]).expect_err("read only");
	assert_eq!(err.kind(), ErrorKind::Engine);
}

#[test]
fn non_database_files_fail_to_open() {
	let dir = tempfile::tempdir().expect("create temp dir");
	let path = dir.path().join("garbage.db");
	std::fs::write(&path, vec![b'x'; 4096]).expect("write garbage");

	let err = Connection::open(&path).expect_err("not a database");
	assert_eq!(err.kind(), ErrorKind::Engine);
}

#[test]
fn backup_to_path_copies_everything() {
	let dir = tempfile::tempdir().expect("create temp dir");
	let path = dir.path().join("copy.db");

	let src = Connection::open_in_memory().expect("open source");
	src.execute(
		"create table t(x); \
		 with recursive n(x) as (select 1 union all select x + 1 from n where x < 5000) \
		 insert into t select x from n",
		&[],
	)
	.expect("fill source");

	let mut reports = Vec::new();
	let options = BackupOptions { pages_per_step: 2, ..BackupOptions::default() };
	src.backup_to_path(&path, &options, |remaining, total| reports.push((remaining, total))).expect("backup");

	assert!(reports.len() > 1);
	assert_eq!(reports.last().map(|(remaining, _)| *remaining), Some(0));

	let copy = Connection::open(&path).expect("open copy");
	assert_eq!(copy.query_value("select sum(x) from t", &[]).expect("sum"), Some(Value::Integer(12_502_500)));
}

#[test]
fn backup_between_attached_schemas() {
	let src = Connection::open_in_memory().expect("open source");
	src.execute(
		"attach database ':memory:' as aux; \
		 create table aux.t(x); \
		 insert into aux.t values (1), (2), (3)",
		&[],
	)
	.expect("fill attached schema");

	let dst = Connection::open_in_memory().expect("open destination");
	dst.execute("attach database ':memory:' as archive", &[]).expect("attach destination");

	let options = BackupOptions {
		source_schema: "aux".to_string(),
		dest_schema: "archive".to_string(),
		..BackupOptions::default()
	};
	src.backup_to(&dst, &options, |_, _| {}).expect("backup");

	assert_eq!(dst.query_value("select sum(x) from archive.t", &[]).expect("sum"), Some(Value::Integer(6)));
	assert!(dst.tables().expect("main tables").is_empty());

	let missing = BackupOptions { source_schema: "nope".to_string(), ..BackupOptions::default() };
	let err = src.backup_to(&dst, &missing, |_, _| {}).expect_err("unknown schema");
	assert_eq!(err.kind(), ErrorKind::Sql);
	assert!(err.to_string().contains("nope"), "{err}");
}

#[test]
fn backup_step_errors_report_the_destination() {
	let dir = tempfile::tempdir().expect("create temp dir");
	let path = dir.path().join("target.db");
	Connection::open(&path).expect("create").execute("create table t(x)", &[]).expect("create table");

	let dst = Connection::open_with(&path, &Config::new().read_only(true)).expect("open read only");
	let src = Connection::open_in_memory().expect("open source");
	src.execute("create table s(y)", &[]).expect("fill source");

	let mut backup = Backup::new(&dst, "main", &src, "main").expect("start backup");
	let err = backup.step(-1).expect_err("read only destination");
	assert_eq!(err.kind(), ErrorKind::Engine);
	assert_eq!(err.code().map(|code| code & 0xff), Some(rowlite::raw::SQLITE_READONLY));
	assert!(!backup.is_done());
}
