use std::sync::atomic::{AtomicUsize, Ordering};

use doclite::{impl_model, Database, Model, ModelExt, ModelMeta, Ref};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

static LOCK: Mutex<()> = Mutex::new(());

// RUST_LOG=doclite=debug surfaces the per-table lookups these tests count
fn init_logging() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Address {
  #[serde(skip)]
  meta: ModelMeta,
  city: String,
}

impl_model!(Address);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct User {
  #[serde(skip)]
  meta: ModelMeta,
  name: String,
  #[serde(default)]
  address: Option<Ref<Address>>,
}

impl_model!(User, refs = [address]);

static ADDRESS_BATCH_SELECTS: AtomicUsize = AtomicUsize::new(0);

fn count_address_batches(sql: &str) {
  let lower = sql.to_lowercase();
  if lower.starts_with("select _id, data from addresses") && lower.contains(" in (") {
    ADDRESS_BATCH_SELECTS.fetch_add(1, Ordering::SeqCst);
  }
}

#[test]
fn batch_hydration_issues_one_lookup_per_table() {
  let _guard = LOCK.lock();
  init_logging();
  let db = Database::in_memory().unwrap();
  Address::set_db(&db).unwrap();
  User::set_db(&db).unwrap();

  let mut cities = Vec::new();
  for city in ["Kyoto", "Osaka", "Tokyo"] {
    let mut addr = Address { city: city.into(), ..Default::default() };
    addr.save().unwrap();
    cities.push(addr);
  }

  // 200 users referencing 3 addresses
  for i in 0..200 {
    User {
      name: format!("U{i:03}"),
      address: Some(Ref::new(cities[i % 3].clone())),
      ..Default::default()
    }
    .save()
    .unwrap();
  }

  ADDRESS_BATCH_SELECTS.store(0, Ordering::SeqCst);
  db.trace_statements(Some(count_address_batches)).unwrap();
  let users = User::query().order_by("name").all().unwrap();
  db.trace_statements(None).unwrap();

  assert_eq!(users.len(), 200);
  assert!(users[0].address.as_ref().unwrap().is_hydrated());
  assert!(ADDRESS_BATCH_SELECTS.load(Ordering::SeqCst) <= 1);

  db.close();
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct A {
  #[serde(skip)]
  meta: ModelMeta,
  name: String,
  #[serde(default)]
  b: Option<Ref<B>>,
}

impl_model!(A, refs = [b]);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct B {
  #[serde(skip)]
  meta: ModelMeta,
  name: String,
  #[serde(default)]
  a: Option<Ref<A>>,
}

impl_model!(B, refs = [a]);

#[test]
fn cyclic_references_hydrate_one_hop_and_stop() {
  let _guard = LOCK.lock();
  init_logging();
  let db = Database::in_memory().unwrap();
  A::set_db(&db).unwrap();
  B::set_db(&db).unwrap();

  let mut a = A { name: "a".into(), ..Default::default() };
  a.save().unwrap();
  let mut b = B {
    name: "b".into(),
    a: Some(Ref::new(a.clone())),
    ..Default::default()
  };
  b.save().unwrap();
  a.b = Some(Ref::new(b));
  a.save().unwrap();

  let rows = A::query().all().unwrap();
  let loaded = &rows[0];

  // first hop is a hydrated instance
  let b_child = loaded.b.as_ref().unwrap().get().unwrap();
  assert_eq!(b_child.name, "b");

  // the back-reference stays a raw mapping; no infinite recursion
  let back = b_child.a.as_ref().unwrap();
  assert!(!back.is_hydrated());
  assert_eq!(back.id(), loaded.meta().id);

  db.close();
}

#[test]
fn hydration_is_idempotent_across_refreshes() {
  let _guard = LOCK.lock();
  init_logging();
  let db = Database::in_memory().unwrap();
  Address::set_db(&db).unwrap();
  User::set_db(&db).unwrap();

  let mut u = User {
    name: "Solo".into(),
    address: Some(Ref::new(Address { city: "Nara".into(), ..Default::default() })),
    ..Default::default()
  };
  u.save().unwrap();

  u.refresh().unwrap();
  assert_eq!(u.address.as_ref().unwrap().get().unwrap().city, "Nara");
  u.refresh().unwrap();
  assert_eq!(u.address.as_ref().unwrap().get().unwrap().city, "Nara");

  db.close();
}
