use doclite::{impl_model, Database, Model, ModelError, ModelExt, ModelMeta, OnDelete, Ref};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

static LOCK: Mutex<()> = Mutex::new(());

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
  #[serde(default, skip_serializing_if = "Option::is_none")]
  friends: Option<Vec<Option<Ref<Address>>>>,
}

impl_model!(User, refs = [address, friends]);

fn bind_all() -> Database {
  let db = Database::in_memory().unwrap();
  Address::set_db(&db).unwrap();
  User::set_db(&db).unwrap();
  db
}

fn address(city: &str) -> Address {
  Address { city: city.into(), ..Default::default() }
}

#[test]
fn restrict_blocks_while_referenced() {
  let _guard = LOCK.lock();
  let db = bind_all();

  let mut a = address("Kyoto");
  a.save().unwrap();
  User {
    name: "Alice".into(),
    address: Some(Ref::new(a.clone())),
    ..Default::default()
  }
  .save()
  .unwrap();

  let err = a.delete_with_policy(OnDelete::Restrict).unwrap_err();
  assert!(matches!(err, ModelError::ReferentialIntegrity { .. }));
  // the row is still there
  assert!(Address::from_id(a.meta().id.unwrap()).unwrap().is_some());

  db.close();
}

#[test]
fn restrict_allows_unreferenced_deletes() {
  let _guard = LOCK.lock();
  let db = bind_all();

  let mut a = address("Lonely");
  a.save().unwrap();
  let id = a.meta().id.unwrap();
  a.delete_with_policy(OnDelete::Restrict).unwrap();
  assert!(Address::from_id(id).unwrap().is_none());
  assert!(a.meta().id.is_none());

  db.close();
}

#[test]
fn set_null_clears_single_ref_and_preserves_list_arity() {
  let _guard = LOCK.lock();
  let db = bind_all();

  let mut a1 = address("Kyoto");
  a1.save().unwrap();
  let mut a2 = address("Osaka");
  a2.save().unwrap();

  let mut u = User {
    name: "Bob".into(),
    address: Some(Ref::new(a1.clone())),
    friends: Some(vec![Some(Ref::new(a1.clone())), Some(Ref::new(a2.clone()))]),
    ..Default::default()
  };
  u.save().unwrap();

  a1.delete_with_policy(OnDelete::SetNull).unwrap();

  let reloaded = User::from_id(u.meta().id.unwrap()).unwrap().unwrap();
  assert!(reloaded.address.is_none());
  let friends = reloaded.friends.as_ref().unwrap();
  assert_eq!(friends.len(), 2);
  assert!(friends[0].is_none());
  assert_eq!(friends[1].as_ref().unwrap().get().unwrap().city, "Osaka");

  db.close();
}

#[test]
fn cascade_deletes_referrer_closure() {
  let _guard = LOCK.lock();
  let db = bind_all();

  let mut a = address("Tokyo");
  a.save().unwrap();
  let a_id = a.meta().id.unwrap();
  let mut u = User {
    name: "Alice".into(),
    address: Some(Ref::new(a.clone())),
    ..Default::default()
  };
  u.save().unwrap();

  a.delete_with_policy(OnDelete::Cascade).unwrap();
  assert!(Address::from_id(a_id).unwrap().is_none());
  assert!(User::from_id(u.meta().id.unwrap()).unwrap().is_none());

  db.close();
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Node {
  #[serde(skip)]
  meta: ModelMeta,
  label: String,
  #[serde(default)]
  next: Option<Ref<Node>>,
}

impl_model!(Node, refs = [next]);

#[test]
fn cascade_terminates_on_reference_cycles() {
  let _guard = LOCK.lock();
  let db = Database::in_memory().unwrap();
  Node::set_db(&db).unwrap();

  let mut x = Node { label: "x".into(), ..Default::default() };
  x.save().unwrap();
  let mut y = Node {
    label: "y".into(),
    next: Some(Ref::new(x.clone())),
    ..Default::default()
  };
  y.save().unwrap();
  x.next = Some(Ref::new(y.clone()));
  x.save().unwrap();

  let x_id = x.meta().id.unwrap();
  let y_id = y.meta().id.unwrap();

  x.delete_with_policy(OnDelete::Cascade).unwrap();
  assert!(Node::from_id(x_id).unwrap().is_none());
  assert!(Node::from_id(y_id).unwrap().is_none());

  db.close();
}
