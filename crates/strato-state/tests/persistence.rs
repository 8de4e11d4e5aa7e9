//! Integration tests over the durable redb backend.
//!
//! Exercise the store the way a host does across process restarts: every
//! "fresh instance" below reopens the same database file and must rebuild
//! its view purely from backend rows.

use std::path::Path;
use std::sync::Arc;

use strato_state::{
    ConflictPolicy, RedbBackend, StateError, StateStore, TableBackend, Value, Variable,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("strato_state=debug,strato_table=debug")
        .with_test_writer()
        .try_init();
}

fn open_store(path: &Path) -> StateStore {
    let backend: Arc<dyn TableBackend> = Arc::new(RedbBackend::open(path).unwrap());
    StateStore::with_backend("pageapi", backend).unwrap()
}

// ── Restart survival ──────────────────────────────────────────────

#[test]
fn scalars_survive_reopen() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.redb");

    {
        let mut store = open_store(&db_path);
        store.set("counterName", Value::Int(0));
        store.set("label", Value::Text("front page".to_string()));
        store.flush(ConflictPolicy::Optimistic).unwrap();
    }

    let mut store = open_store(&db_path);
    assert_eq!(
        store.get("counterName").unwrap(),
        Some(Variable::Scalar(Value::Int(0)))
    );
    assert_eq!(
        store.get("label").unwrap(),
        Some(Variable::Scalar(Value::Text("front page".to_string())))
    );
}

#[test]
fn nested_dictionaries_survive_reopen() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.redb");

    {
        let mut store = open_store(&db_path);
        let counters = store.child("counters").unwrap();
        counters.set("mainpage", Value::Int(5));
        counters.set("about", Value::Int(2));
        store.flush(ConflictPolicy::Optimistic).unwrap();
    }

    let mut store = open_store(&db_path);
    let counters = store.child("counters").unwrap();
    assert_eq!(
        counters.get("mainpage").unwrap(),
        Some(Variable::Scalar(Value::Int(5)))
    );
    let entries = counters.enumerate().unwrap();
    let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["about", "mainpage"]);

    // The nested counter is not a direct root entry.
    let root_entries = store.enumerate().unwrap();
    assert!(root_entries.iter().all(|(n, _)| n != "mainpage"));
}

#[test]
fn increment_across_invocations() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.redb");

    {
        let mut store = open_store(&db_path);
        store
            .seed([("visits".to_string(), Value::Long(0))])
            .unwrap();
    }

    // Three invocations, each a fresh instance over the same file.
    for _ in 0..3 {
        let mut store = open_store(&db_path);
        let Some(Variable::Scalar(Value::Long(current))) = store.get("visits").unwrap() else {
            panic!("visits missing or mistyped");
        };
        store.set("visits", Value::Long(current + 1));
        store.flush(ConflictPolicy::Optimistic).unwrap();
    }

    let mut store = open_store(&db_path);
    assert_eq!(
        store.get("visits").unwrap(),
        Some(Variable::Scalar(Value::Long(3)))
    );
}

// ── Cross-instance conflicts ──────────────────────────────────────

#[test]
fn stale_instance_conflicts_then_recovers() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.redb");
    let backend: Arc<dyn TableBackend> = Arc::new(RedbBackend::open(&db_path).unwrap());

    let mut seed = StateStore::with_backend("pageapi", Arc::clone(&backend)).unwrap();
    seed.set("v", Value::Int(1));
    seed.flush(ConflictPolicy::Optimistic).unwrap();

    let mut a = StateStore::with_backend("pageapi", Arc::clone(&backend)).unwrap();
    let mut b = StateStore::with_backend("pageapi", Arc::clone(&backend)).unwrap();
    a.get("v").unwrap();
    b.get("v").unwrap();

    a.set("v", Value::Int(2));
    a.flush(ConflictPolicy::Optimistic).unwrap();

    b.set("v", Value::Int(3));
    let err = b.flush(ConflictPolicy::Optimistic).unwrap_err();
    assert!(matches!(err, StateError::Conflict(_)));

    // The backend keeps A's value.
    let mut fresh = StateStore::with_backend("pageapi", Arc::clone(&backend)).unwrap();
    assert_eq!(
        fresh.get("v").unwrap(),
        Some(Variable::Scalar(Value::Int(2)))
    );

    // B recovers: clear, re-read, reapply, re-flush.
    b.clear_cache();
    b.enumerate().unwrap();
    b.set("v", Value::Int(3));
    b.flush(ConflictPolicy::Optimistic).unwrap();

    let mut fresh = StateStore::with_backend("pageapi", backend).unwrap();
    assert_eq!(
        fresh.get("v").unwrap(),
        Some(Variable::Scalar(Value::Int(3)))
    );
}

// ── Mixed scalar types ────────────────────────────────────────────

#[test]
fn all_scalar_kinds_roundtrip_through_storage() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.redb");

    let ts = chrono::DateTime::parse_from_rfc3339("2016-05-12T08:30:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let id = uuid::Uuid::new_v4();

    {
        let mut store = open_store(&db_path);
        store.set("enabled", Value::Bool(true));
        store.set("small", Value::Int(-7));
        store.set("big", Value::Long(1 << 40));
        store.set("ratio", Value::Double(0.25));
        store.set("name", Value::Text("strato".to_string()));
        store.set("since", Value::Timestamp(ts));
        store.set("session", Value::Uuid(id));
        store.flush(ConflictPolicy::Optimistic).unwrap();
    }

    let mut store = open_store(&db_path);
    let expected = [
        ("enabled", Value::Bool(true)),
        ("small", Value::Int(-7)),
        ("big", Value::Long(1 << 40)),
        ("ratio", Value::Double(0.25)),
        ("name", Value::Text("strato".to_string())),
        ("since", Value::Timestamp(ts)),
        ("session", Value::Uuid(id)),
    ];
    for (name, value) in expected {
        assert_eq!(
            store.get(name).unwrap(),
            Some(Variable::Scalar(value)),
            "variable {name}"
        );
    }
}
