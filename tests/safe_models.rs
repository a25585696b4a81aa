use doclite::{impl_model, Database, Field, Model, ModelError, ModelExt, ModelMeta, Param};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

static LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Customer {
  #[serde(skip)]
  meta: ModelMeta,
  name: String,
  tier: i64,
}

impl_model!(Customer, safe = true);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Account {
  #[serde(skip)]
  meta: ModelMeta,
  owner: String,
  balance: i64,
}

impl_model!(Account, safe = true);

fn customer_db() -> Database {
  let db = Database::in_memory().unwrap();
  Customer::set_db(&db).unwrap();
  db
}

fn customer(name: &str, tier: i64) -> Customer {
  Customer {
    name: name.into(),
    tier,
    ..Default::default()
  }
}

#[test]
fn insert_sets_version_zero_and_updates_bump() {
  let _guard = LOCK.lock();
  let db = customer_db();

  let mut c = customer("Alice", 1);
  c.save().unwrap();
  assert!(c.meta().id.is_some());
  assert_eq!(c.meta().version, Some(0));

  c.tier = 2;
  c.save().unwrap();
  assert_eq!(c.meta().version, Some(1));

  db.close();
}

#[test]
fn stale_update_raises() {
  let _guard = LOCK.lock();
  let db = customer_db();

  let mut c = customer("Bob", 1);
  c.save().unwrap();
  let id = c.meta().id.unwrap();

  // simulate a concurrent writer bumping the version behind our back
  db.execute(
    "UPDATE customers SET _version = _version + 1 WHERE _id = ?",
    &[Param::Int(id)],
  )
  .unwrap();

  c.tier = 3;
  let err = c.save().unwrap_err();
  assert!(matches!(err, ModelError::StaleVersion { .. }));

  db.close();
}

#[test]
fn refresh_reads_version_and_fields() {
  let _guard = LOCK.lock();
  let db = customer_db();

  let mut c = customer("Zoe", 1);
  c.save().unwrap();
  assert_eq!(c.meta().version, Some(0));
  let id = c.meta().id.unwrap();

  db.execute(
    "UPDATE customers SET _version = _version + 1, data = json_set(data, '$.tier', 5) WHERE _id = ?",
    &[Param::Int(id)],
  )
  .unwrap();

  c.refresh().unwrap();
  assert_eq!(c.meta().version, Some(1));
  assert_eq!(c.tier, 5);

  db.close();
}

#[test]
fn queried_instances_carry_their_stored_version() {
  let _guard = LOCK.lock();
  let db = customer_db();

  let mut c = customer("Vera", 1);
  c.save().unwrap();
  c.tier = 2;
  c.save().unwrap(); // version 1

  let mut loaded = Customer::query()
    .filter(Field::new("name").eq("Vera"))
    .first()
    .unwrap()
    .unwrap();
  assert_eq!(loaded.meta().version, Some(1));

  // a save on the queried instance succeeds against the stored version
  loaded.tier = 3;
  loaded.save().unwrap();
  assert_eq!(loaded.meta().version, Some(2));

  db.close();
}

#[test]
fn complex_filters_on_safe_models() {
  let _guard = LOCK.lock();
  let db = customer_db();

  customer("A", 1).save().unwrap();
  customer("B", 2).save().unwrap();
  customer("C", 3).save().unwrap();

  let rows = Customer::query()
    .filter(Field::new("tier").ge(2) & Field::new("name").like("B%"))
    .all()
    .unwrap();
  assert_eq!(rows.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["B"]);

  let mut first = Customer::query()
    .order_by_desc("tier")
    .limit(1)
    .first()
    .unwrap()
    .unwrap();
  assert_eq!(first.name, "C");
  assert_eq!(first.meta().version, Some(0));
  first.refresh().unwrap();
  assert_eq!(first.meta().version, Some(0));

  db.close();
}

#[test]
fn stale_then_refresh_then_save_succeeds() {
  let _guard = LOCK.lock();
  let db = Database::in_memory().unwrap();
  Account::set_db(&db).unwrap();

  let mut acc = Account {
    owner: "Ada".into(),
    balance: 100,
    ..Default::default()
  };
  acc.save().unwrap();
  acc.balance = 120;
  acc.save().unwrap();
  assert_eq!(acc.meta().version, Some(1));

  // external version bump
  db.execute(
    "UPDATE accounts SET _version = _version + 1 WHERE _id = ?",
    &[Param::Int(acc.meta().id.unwrap())],
  )
  .unwrap();

  acc.balance = 140;
  assert!(matches!(acc.save(), Err(ModelError::StaleVersion { .. })));

  acc.refresh().unwrap();
  assert_eq!(acc.meta().version, Some(2));
  acc.balance = 140;
  acc.save().unwrap();
  assert_eq!(acc.meta().version, Some(3));

  db.close();
}

#[test]
fn resaving_unmodified_safe_model_still_bumps_version() {
  let _guard = LOCK.lock();
  let db = customer_db();

  let mut c = customer("Idem", 4);
  c.save().unwrap();
  c.save().unwrap();
  c.save().unwrap();
  assert_eq!(c.meta().version, Some(2));

  let (_, version) = db
    .find_document_versioned("customers", c.meta().id.unwrap())
    .unwrap()
    .unwrap();
  assert_eq!(version, 2);

  db.close();
}
