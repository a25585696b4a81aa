use doclite::{AdapterError, Param, SqlValue, SqliteAdapter};

fn oligo_adapter() -> SqliteAdapter {
  let mut adapter = SqliteAdapter::in_memory();
  adapter.connect().unwrap();
  adapter
    .execute("CREATE TABLE oligos (length INTEGER, sequence TEXT)", &[])
    .unwrap();
  adapter
}

#[test]
fn factories_connect() {
  let mut mem = SqliteAdapter::in_memory();
  mem.connect().unwrap();
  let rows = mem.query("PRAGMA user_version", &[]).unwrap();
  assert!(matches!(rows[0][0], SqlValue::Integer(_)));

  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("test.db");
  let mut disk = SqliteAdapter::on_disk(path.to_str().unwrap());
  disk.connect().unwrap();
  let rows = disk.query("PRAGMA user_version", &[]).unwrap();
  assert!(matches!(rows[0][0], SqlValue::Integer(_)));
}

#[test]
fn on_disk_uses_wal_mode() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("wal_test.db");
  let mut adapter = SqliteAdapter::on_disk(path.to_str().unwrap());
  adapter.connect().unwrap();
  let rows = adapter.query("PRAGMA journal_mode", &[]).unwrap();
  match &rows[0][0] {
    SqlValue::Text(mode) => assert_eq!(mode.to_lowercase(), "wal"),
    other => panic!("unexpected journal_mode value: {other:?}"),
  }
}

#[test]
fn execute_and_query() {
  let adapter = oligo_adapter();
  adapter
    .execute("INSERT INTO oligos (length) VALUES (?)", &[Param::Int(100)])
    .unwrap();
  adapter.commit().unwrap();
  let rows = adapter.query("SELECT length FROM oligos", &[]).unwrap();
  assert_eq!(rows[0][0], SqlValue::Integer(100));
}

#[test]
fn executemany_batch_insert() {
  let adapter = oligo_adapter();
  let batches: Vec<Vec<Param>> = (0..100).map(|i| vec![Param::Int(i)]).collect();
  adapter
    .execute_many("INSERT INTO oligos (length) VALUES (?)", &batches)
    .unwrap();
  let rows = adapter.query("SELECT COUNT(*) FROM oligos", &[]).unwrap();
  assert_eq!(rows[0][0], SqlValue::Integer(100));
}

#[test]
fn executemany_empty_batch_is_noop() {
  let adapter = oligo_adapter();
  adapter
    .execute_many("INSERT INTO oligos (length) VALUES (?)", &[])
    .unwrap();
  let rows = adapter.query("SELECT COUNT(*) FROM oligos", &[]).unwrap();
  assert_eq!(rows[0][0], SqlValue::Integer(0));
}

#[test]
fn scripts_run_but_single_execute_rejects_them() {
  let adapter = oligo_adapter();
  let script = "INSERT INTO oligos (length) VALUES (1), (2); INSERT INTO oligos (length) VALUES (3);";
  adapter.execute_script(script).unwrap();

  assert!(matches!(
    adapter.execute(script, &[]),
    Err(AdapterError::MultiStatement)
  ));

  let rows = adapter
    .query("SELECT length FROM oligos ORDER BY length", &[])
    .unwrap();
  let lengths: Vec<_> = rows.iter().map(|r| r[0].clone()).collect();
  assert_eq!(
    lengths,
    vec![SqlValue::Integer(1), SqlValue::Integer(2), SqlValue::Integer(3)]
  );
}

#[test]
fn transaction_commits_on_ok() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("cm.db");
  let mut adapter = SqliteAdapter::on_disk(path.to_str().unwrap());
  adapter.connect().unwrap();
  adapter.execute("CREATE TABLE cm (x TEXT)", &[]).unwrap();
  adapter
    .transaction(|conn| {
      conn.execute("INSERT INTO cm (x) VALUES (?)", rusqlite::params!["hi"])?;
      Ok(())
    })
    .unwrap();
  adapter.close();

  let mut reopened = SqliteAdapter::on_disk(path.to_str().unwrap());
  reopened.connect().unwrap();
  let rows = reopened.query("SELECT x FROM cm", &[]).unwrap();
  assert_eq!(rows[0][0], SqlValue::Text("hi".into()));
}

#[test]
fn transaction_rolls_back_on_err() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("cm_rollback.db");
  let mut adapter = SqliteAdapter::on_disk(path.to_str().unwrap());
  adapter.connect().unwrap();
  adapter.execute("CREATE TABLE foo (x INTEGER)", &[]).unwrap();

  let result: Result<(), AdapterError> = adapter.transaction(|conn| {
    conn.execute("INSERT INTO foo (x) VALUES (1)", [])?;
    Err(AdapterError::MultiStatement) // force rollback
  });
  assert!(result.is_err());
  adapter.close();

  let mut reopened = SqliteAdapter::on_disk(path.to_str().unwrap());
  reopened.connect().unwrap();
  let rows = reopened.query("SELECT COUNT(*) FROM foo", &[]).unwrap();
  assert_eq!(rows[0][0], SqlValue::Integer(0));
}

#[test]
fn close_then_error() {
  let mut adapter = oligo_adapter();
  adapter.close();
  assert!(matches!(
    adapter.query("SELECT 1", &[]),
    Err(AdapterError::NotConnected)
  ));
  assert!(matches!(adapter.commit(), Err(AdapterError::NotConnected)));
  assert!(matches!(
    adapter.execute_many("SELECT 1", &[vec![]]),
    Err(AdapterError::NotConnected)
  ));
}

#[test]
fn commit_without_connection() {
  let adapter = SqliteAdapter::in_memory();
  assert!(matches!(adapter.commit(), Err(AdapterError::NotConnected)));
}

#[test]
fn multiple_connects_and_closes() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("multi.db");
  let mut adapter = SqliteAdapter::on_disk(path.to_str().unwrap());
  adapter.connect().unwrap();
  adapter.connect().unwrap();
  adapter.close();
  adapter.close();
  assert!(matches!(
    adapter.query("SELECT 1", &[]),
    Err(AdapterError::NotConnected)
  ));
}

#[test]
fn invalid_sql_propagates_engine_error() {
  let adapter = oligo_adapter();
  let err = adapter.query("THIS IS NOT VALID SQL", &[]).unwrap_err();
  assert!(matches!(err, AdapterError::Sqlite(_)));
}
