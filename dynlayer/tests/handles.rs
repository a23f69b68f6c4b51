use dynlayer::{memory::MemoryDriver, prelude::*};
use serde_json::json;

fn connection() -> Connection {
    Connection::new(MemoryDriver::new())
}

fn value(json: serde_json::Value) -> DynamicValue {
    json.into()
}

#[test]
fn insert_assigns_an_interned_identifier() {
    let connection = connection();
    let users = connection.database("app").collection("users");

    let id = users.insert(&value(json!({ "name": "Alice" }))).unwrap();
    let DynamicValue::Identifier(id) = id else {
        panic!("expected an identifier, got {id:?}");
    };

    let alice = users.find_one(&value(json!({ "name": "Alice" }))).unwrap().unwrap();
    let stored = alice.get("_id").and_then(DynamicValue::as_identifier).unwrap();

    assert_eq!(stored, &id);
    assert!(Identifier::same_instance(stored, &id));
    assert_eq!(alice.get("name"), Some(&DynamicValue::from("Alice")));
}

#[test]
fn insert_keeps_a_caller_supplied_id() {
    let connection = connection();
    let users = connection.database("app").collection("users");
    let id = Identifier::parse("507F1F77BCF86CD799439011").unwrap();

    let returned = users
        .insert(&DynamicMap::new().with("_id", id.clone()).with("name", "Bob").into())
        .unwrap();

    assert_eq!(returned, DynamicValue::Identifier(id.clone()));
    assert!(id.equals("507f1f77bcf86cd799439011"));
    assert_eq!(users.count(&DynamicValue::Undefined).unwrap(), 1);
}

#[test]
fn find_one_returns_none_without_a_match() {
    let connection = connection();
    let users = connection.database("app").collection("users");

    users.insert(&value(json!({ "name": "Alice" }))).unwrap();

    assert_eq!(users.find_one(&value(json!({ "name": "Nobody" }))).unwrap(), None);
}

#[test]
fn save_upserts_by_id() {
    let connection = connection();
    let users = connection.database("app").collection("users");

    let id = users.save(&value(json!({ "name": "Alice", "age": 30 }))).unwrap();
    assert_eq!(users.count(&DynamicValue::Null).unwrap(), 1);

    let mut alice = users.find_one(&DynamicValue::Null).unwrap().unwrap();
    alice.as_object_mut().unwrap().insert("age", 31);

    assert_eq!(users.save(&alice).unwrap(), id);
    assert_eq!(users.count(&DynamicValue::Null).unwrap(), 1);

    let alice = users.find_one(&DynamicValue::Null).unwrap().unwrap();
    assert_eq!(alice.get("age"), Some(&DynamicValue::Number(31.0)));

    let fresh = DynamicMap::new().with("_id", Identifier::new()).with("name", "Carol");
    users.save(&fresh.into()).unwrap();
    assert_eq!(users.count(&DynamicValue::Null).unwrap(), 2);
}

#[test]
fn update_and_remove_apply_to_matches() {
    let connection = connection();
    let users = connection.database("app").collection("users");

    for (name, age) in [("Alice", 30), ("Bob", 17), ("Carol", 45)] {
        users.insert(&value(json!({ "name": name, "age": age }))).unwrap();
    }

    users
        .update(
            &value(json!({ "age": { "$gte": 18 } })),
            &value(json!({ "$set": { "adult": true } })),
            UpdateOptions::multi(),
        )
        .unwrap();
    assert_eq!(users.count(&value(json!({ "adult": true }))).unwrap(), 2);

    users.remove(&value(json!({ "adult": { "$exists": false } }))).unwrap();
    assert_eq!(users.count(&DynamicValue::Undefined).unwrap(), 2);

    users.remove(&DynamicValue::Null).unwrap();
    assert_eq!(users.count(&DynamicValue::Undefined).unwrap(), 0);
}

#[test]
fn commands_reach_the_driver() {
    let connection = connection();
    let database = connection.database("app");

    let reply = database.run_command(&"ping".into()).unwrap();
    assert_eq!(reply.get("ok"), Some(&DynamicValue::Number(1.0)));

    let error = database.run_command(&"frobnicate".into()).unwrap_err();
    let LayerError::Driver(error) = error else {
        panic!("expected a driver error, got {error:?}");
    };
    assert_eq!(error.message(), "no such command: 'frobnicate'");

    let error = database.eval(&Code::new("function (x) { return x; }"), &[1.into()]).unwrap_err();
    assert!(matches!(error, LayerError::Driver(_)));
}

#[test]
fn error_log_tracks_failed_writes() {
    let connection = connection();
    let database = connection.database("app");
    let users = database.collection("users");
    let id = Identifier::new();

    users.insert(&DynamicMap::new().with("_id", id.clone()).into()).unwrap();
    assert!(users.insert(&DynamicMap::new().with("_id", id).into()).is_err());

    let last = database.last_error().unwrap();
    assert!(last.get("err").and_then(DynamicValue::as_str).is_some());

    database.reset_error().unwrap();
    assert_eq!(database.last_error().unwrap().get("err"), Some(&DynamicValue::Null));
}

#[test]
fn find_and_modify_returns_the_document() {
    let connection = connection();
    let counters = connection.database("app").collection("counters");

    counters.insert(&value(json!({ "name": "visits", "n": 1 }))).unwrap();

    let updated = counters
        .find_and_modify(&value(json!({
            "query": { "name": "visits" },
            "update": { "$inc": { "n": 1 } },
            "new": true,
        })))
        .unwrap();
    assert_eq!(updated.get("n"), Some(&DynamicValue::Number(2.0)));

    let missing = counters
        .find_and_modify(&value(json!({ "query": { "name": "none" }, "remove": true })))
        .unwrap();
    assert!(missing.is_nullish());
}

#[test]
fn catalog_operations() {
    let connection = connection();
    let database = connection.database("app");

    let logs = database.create_collection("logs", &DynamicValue::Undefined).unwrap();
    assert_eq!(logs.full_name(), "app.logs");
    assert!(database.create_collection("logs", &DynamicValue::Undefined).is_err());

    database.collection("users").insert(&value(json!({ "a": 1 }))).unwrap();
    assert_eq!(database.collection_names().unwrap(), vec!["logs", "users"]);
    assert_eq!(connection.database_names().unwrap(), vec!["app"]);

    let other = database.sister("other");
    assert_eq!(other.name(), "other");
    assert!(other.collection_names().unwrap().is_empty());

    logs.drop().unwrap();
    assert_eq!(database.collection_names().unwrap(), vec!["users"]);

    database.drop().unwrap();
    assert!(connection.database_names().unwrap().is_empty());
}

#[test]
fn unique_indexes_reject_duplicates() {
    let connection = connection();
    let users = connection.database("app").collection("users");

    users.ensure_index(&value(json!({ "email": 1 })), IndexOptions::unique()).unwrap();
    users.insert(&value(json!({ "email": "a@example.com" }))).unwrap();

    let error = users.insert(&value(json!({ "email": "a@example.com" }))).unwrap_err();
    assert!(matches!(error, LayerError::Driver(_)));

    users.drop_indexes().unwrap();
    users.insert(&value(json!({ "email": "a@example.com" }))).unwrap();
    assert_eq!(users.count(&DynamicValue::Null).unwrap(), 2);
}

#[test]
fn non_document_arguments_fail_before_the_driver() {
    let connection = connection();
    let users = connection.database("app").collection("users");

    let error = users.insert(&DynamicValue::from(42)).unwrap_err();
    assert!(matches!(error, LayerError::Marshal(MarshalError::NotADocument(ValueKind::Number))));
    assert_eq!(users.count(&DynamicValue::Null).unwrap(), 0);
}

#[test]
fn connections_share_nothing_but_the_driver() {
    let driver = MemoryDriver::new();
    let first = Connection::new(driver.clone());
    let second = Connection::builder(driver).cache_capacity(0).build();

    let id = first.database("app").collection("users").insert(&value(json!({ "a": 1 }))).unwrap();
    let read = second
        .database("app")
        .collection("users")
        .find_one(&DynamicValue::Null)
        .unwrap()
        .unwrap();

    assert_eq!(read.get("_id"), Some(&id));
    assert!(second.identity_cache().is_empty());
    assert!(!first.identity_cache().is_empty());
}
