//! Record fixtures and engine builders.

use super::MockRemote;
use chrono::{DateTime, TimeZone, Utc};
use pos_replication::{EntityKind, MemoryStore, ReplicationConfig, ReplicationEngine, SqliteStore, SyncController};
use serde_json::json;
use std::sync::Arc;

pub const BASE_URL: &str = "http://127.0.0.1:3000";

pub type MemoryEngine = ReplicationEngine<MemoryStore, MockRemote>;
pub type SqliteEngine = ReplicationEngine<SqliteStore, MockRemote>;

/// Deterministic timestamp `secs` after a fixed epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn sale_id(i: usize) -> String {
    format!("sale-{:03}", i)
}

pub fn category_id(i: usize) -> String {
    format!("cat-{:03}", i)
}

pub fn product_id(i: usize) -> String {
    format!("prod-{:03}", i)
}

pub fn memory_engine(kind: EntityKind, remote: MockRemote) -> Arc<MemoryEngine> {
    memory_engine_with(ReplicationConfig::for_testing(BASE_URL), kind, remote)
}

pub fn memory_engine_with(config: ReplicationConfig, kind: EntityKind, remote: MockRemote) -> Arc<MemoryEngine> {
    Arc::new(ReplicationEngine::new(config, kind, Arc::new(MemoryStore::new()), Arc::new(remote)).unwrap())
}

pub fn controller(engine: &Arc<MemoryEngine>) -> SyncController<MemoryStore, MockRemote> {
    SyncController::new(Arc::clone(engine))
}

/// `n` pending sales, one second apart.
pub async fn seed_sales(store: &MemoryStore, n: usize) {
    for i in 0..n {
        store
            .insert_record("sales", &sale_id(i), at(i as i64), json!({"total": 10 * i, "items": [{"sku": "A", "qty": 1}]}))
            .await
            .unwrap();
    }
}

/// `categories` pending categories, then `products` pending products each
/// with one presentation and one inventory row.
pub async fn seed_catalog(store: &MemoryStore, categories: usize, products: usize) {
    for i in 0..categories {
        store
            .insert_record("categories", &category_id(i), at(i as i64), json!({"name": format!("Category {}", i)}))
            .await
            .unwrap();
    }
    for i in 0..products {
        let id = product_id(i);
        let created = at(100 + i as i64);
        store
            .insert_record("products", &id, created, json!({"name": format!("Product {}", i), "categoryId": category_id(i % categories.max(1))}))
            .await
            .unwrap();
        store
            .insert_nested("presentations", &format!("pres-{:03}", i), &id, created, json!({"unit": "box", "factor": 12}))
            .await
            .unwrap();
        store
            .insert_nested("inventory", &format!("inv-{:03}", i), &id, created, json!({"qty": i}))
            .await
            .unwrap();
    }
}

/// SQLite-backed engine in a temp directory, schema created.
pub async fn sqlite_engine(kind: EntityKind, remote: MockRemote) -> (Arc<SqliteEngine>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("station.db")).await.unwrap();
    store.ensure_schema(&kind).await.unwrap();
    let engine =
        ReplicationEngine::new(ReplicationConfig::for_testing(BASE_URL), kind, Arc::new(store), Arc::new(remote)).unwrap();
    (Arc::new(engine), dir)
}

pub async fn seed_catalog_sqlite(store: &SqliteStore, categories: usize, products: usize) {
    let catalog = EntityKind::catalog();
    let parent = catalog.depends_on.as_deref().unwrap();
    let presentations = catalog.nested_kind("presentations").unwrap();
    let inventory = catalog.nested_kind("inventory").unwrap();

    for i in 0..categories {
        store
            .insert_record(parent, &category_id(i), at(i as i64), &json!({"name": format!("Category {}", i)}))
            .await
            .unwrap();
    }
    for i in 0..products {
        let id = product_id(i);
        let created = at(100 + i as i64);
        store
            .insert_record(&catalog, &id, created, &json!({"name": format!("Product {}", i)}))
            .await
            .unwrap();
        store
            .insert_nested(presentations, &format!("pres-{:03}", i), &id, created, &json!({"unit": "box"}))
            .await
            .unwrap();
        store
            .insert_nested(inventory, &format!("inv-{:03}", i), &id, created, &json!({"qty": i}))
            .await
            .unwrap();
    }
}
