//! Full sync cycles against a mock master.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{any, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use edgesync_core::report::{IN_PROGRESS_MESSAGE, OFFLINE_MESSAGE};
use edgesync_core::{EntityDefinition, Timestamp};
use edgesync_db::{Database, DbConfig};
use edgesync_sync::{
    CycleLock, CyclePhase, FixedClock, StaticProbe, SyncConfig, SyncEngine, SyncEngineBuilder,
};

const NOW: &str = "2025-07-10 12:00:00";

struct Harness {
    engine: SyncEngine,
    probe: Arc<StaticProbe>,
    server: MockServer,
    dir: TempDir,
}

impl Harness {
    async fn new(entities: Vec<EntityDefinition>) -> Self {
        Self::with_probe(entities, StaticProbe::online()).await
    }

    async fn with_probe(entities: Vec<EntityDefinition>, probe: StaticProbe) -> Self {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for table in ["orders", "customers", "events", "servers"] {
            sqlx::query(&format!(
                "CREATE TABLE {table} (id TEXT PRIMARY KEY, total INTEGER, created_at TEXT, updated_at TEXT)"
            ))
            .execute(db.pool())
            .await
            .unwrap();
        }

        let mut config = SyncConfig::default();
        config.remote.base_url = Some(format!("{}/api/sync", server.uri()));
        config.watermark.directory = Some(dir.path().to_path_buf());
        config.catalog.entities = entities;

        let probe = Arc::new(probe);
        let engine = SyncEngineBuilder::new(config)
            .with_database(db)
            .with_probe(probe.clone())
            .with_clock(Arc::new(FixedClock::new(ts(NOW))))
            .build()
            .unwrap();

        Harness {
            engine,
            probe,
            server,
            dir,
        }
    }

    async fn insert(&self, table: &str, id: &str, created_at: &str) {
        sqlx::query(&format!(
            "INSERT INTO {table} (id, total, created_at) VALUES (?, 1, ?)"
        ))
        .bind(id)
        .bind(created_at)
        .execute(self.engine.database().pool())
        .await
        .unwrap();
    }

    async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(self.engine.database().pool())
            .await
            .unwrap()
    }

    fn watermark_file(&self, entity: &str) -> std::path::PathBuf {
        self.dir.path().join(format!("{entity}_last_sync.dat"))
    }

    async fn mount_pull(&self, entity: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/api/sync/pull/{entity}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    async fn mount_push(&self, entity: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(format!("/api/sync/push/{entity}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }
}

fn ts(text: &str) -> Timestamp {
    text.parse().unwrap()
}

fn orders() -> EntityDefinition {
    EntityDefinition::new("Order", "orders")
}

fn file_exists(path: &Path) -> bool {
    path.try_exists().unwrap()
}

// =============================================================================
// Pull
// =============================================================================

#[tokio::test]
async fn test_pull_applies_records_and_advances_watermark() {
    let h = Harness::new(vec![orders()]).await;
    h.mount_pull(
        "orders",
        json!([
            {"id": "o-1", "total": 10, "created_at": "2025-07-08 09:00:00"},
            {"id": "o-2", "total": 20, "created_at": "2025-07-08 10:00:00"},
            {"id": "o-3", "total": 30, "created_at": "2025-07-08T11:00:00Z"},
        ]),
    )
    .await;
    // Rows newer than the cycle snapshot are sent back; the master merges them by id.
    h.mount_push("orders", 1).await;

    let result = h.engine.sync().await;

    assert!(result.success, "{}", result.message);
    let pull = result.pull.unwrap();
    assert_eq!(pull.count, 3);
    assert_eq!(pull.details["orders"].message, "Pulled 3 records for orders");
    assert_eq!(h.count("orders").await, 3);
    assert_eq!(h.engine.watermarks().get("orders").await, ts(NOW));
    assert_eq!(h.engine.phase().await, CyclePhase::Done);
}

#[tokio::test]
async fn test_pull_sends_snapshot_as_since() {
    let h = Harness::new(vec![orders()]).await;
    h.engine
        .watermarks()
        .set("orders", ts("2025-07-09 08:30:00"))
        .await;

    Mock::given(method("GET"))
        .and(path("/api/sync/pull/orders"))
        .and(query_param("since", "2025-07-09 08:30:00"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&h.server)
        .await;

    let result = h.engine.sync().await;
    assert!(result.success, "{}", result.message);
}

#[tokio::test]
async fn test_pull_server_error_keeps_watermark() {
    let h = Harness::new(vec![orders()]).await;
    Mock::given(method("GET"))
        .and(path("/api/sync/pull/orders"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;
    h.mount_push("orders", 0).await;

    let result = h.engine.sync().await;

    assert!(!result.success);
    assert!(result.message.contains("orders"));
    let detail = &result.pull.unwrap().details["orders"];
    assert!(!detail.success);
    assert!(detail.message.contains("500"), "{}", detail.message);
    assert!(!file_exists(&h.watermark_file("orders")));
    assert_eq!(h.count("orders").await, 0);
}

#[tokio::test]
async fn test_pull_skips_records_at_watermark() {
    let h = Harness::new(vec![orders()]).await;
    h.engine
        .watermarks()
        .set("orders", ts("2025-07-09 00:00:00"))
        .await;
    h.mount_pull(
        "orders",
        json!([
            {"id": "old", "total": 1, "updated_at": "2025-07-09 00:00:00"},
            {"id": "new", "total": 2, "updated_at": "2025-07-09 00:00:01"},
        ]),
    )
    .await;
    h.mount_push("orders", 1).await;

    let result = h.engine.sync().await;

    let detail = &result.pull.unwrap().details["orders"];
    assert_eq!(detail.count, 1);
    assert_eq!(
        detail.message,
        "Pulled 1 records for orders (1 stale, 0 rejected)"
    );
    assert_eq!(h.count("orders").await, 1);
}

#[tokio::test]
async fn test_pull_rejects_record_without_id() {
    let h = Harness::new(vec![orders()]).await;
    h.mount_pull(
        "orders",
        json!([
            {"total": 5, "created_at": "2025-07-08 09:00:00"},
            {"id": "o-1", "total": 6, "created_at": "2025-07-08 09:00:00"},
        ]),
    )
    .await;
    h.mount_push("orders", 1).await;

    let result = h.engine.sync().await;

    let detail = &result.pull.unwrap().details["orders"];
    assert!(detail.success);
    assert_eq!(detail.count, 1);
    assert!(detail.message.ends_with("(0 stale, 1 rejected)"));
    assert_eq!(h.count("orders").await, 1);
}

#[tokio::test]
async fn test_pull_into_read_only_database_keeps_watermark() {
    let h = Harness::new(vec![orders()]).await;
    h.mount_pull(
        "orders",
        json!([
            {"id": "o-1", "total": 10, "created_at": "2025-07-08 09:00:00"},
            {"id": "o-2", "total": 20, "created_at": "2025-07-08 10:00:00"},
            {"id": "o-3", "total": 30, "created_at": "2025-07-08 11:00:00"},
        ]),
    )
    .await;
    // Only the second cycle has local rows to send back
    h.mount_push("orders", 1).await;

    let pool = h.engine.database().pool();
    sqlx::query("PRAGMA query_only = 1").execute(pool).await.unwrap();

    let result = h.engine.sync().await;

    assert!(!result.success);
    let detail = &result.pull.unwrap().details["orders"];
    assert!(!detail.success, "{}", detail.message);
    assert_eq!(detail.count, 0);
    assert_eq!(h.count("orders").await, 0);
    assert!(!file_exists(&h.watermark_file("orders")));
    assert_eq!(
        h.engine.watermarks().get("orders").await,
        Timestamp::default_epoch()
    );

    // The same batch lands once the database accepts writes again
    sqlx::query("PRAGMA query_only = 0").execute(pool).await.unwrap();
    let result = h.engine.sync().await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.pull.unwrap().details["orders"].count, 3);
    assert_eq!(h.count("orders").await, 3);
    assert_eq!(h.engine.watermarks().get("orders").await, ts(NOW));
}

#[tokio::test]
async fn test_repeated_pull_is_idempotent() {
    let h = Harness::new(vec![orders()]).await;
    h.mount_pull(
        "orders",
        json!([{"id": "o-1", "total": 7, "updated_at": "2025-07-11 00:00:00"}]),
    )
    .await;
    h.mount_push("orders", 2).await;

    let first = h.engine.sync().await;
    let second = h.engine.sync().await;

    assert!(first.success && second.success);
    assert_eq!(h.count("orders").await, 1);
    let total: i64 = sqlx::query_scalar("SELECT total FROM orders WHERE id = 'o-1'")
        .fetch_one(h.engine.database().pool())
        .await
        .unwrap();
    assert_eq!(total, 7);
}

// =============================================================================
// Push
// =============================================================================

#[tokio::test]
async fn test_push_sends_local_changes_and_advances_watermark() {
    let h = Harness::new(vec![orders()]).await;
    h.insert("orders", "o-1", "2025-07-08 09:00:00").await;
    h.insert("orders", "o-2", "2025-07-08 10:00:00").await;
    h.mount_pull("orders", json!([])).await;
    h.mount_push("orders", 1).await;

    let result = h.engine.sync().await;

    assert!(result.success, "{}", result.message);
    let push = result.push.unwrap();
    assert_eq!(push.count, 2);
    assert_eq!(push.details["orders"].message, "Pushed 2 records for orders");
    assert_eq!(h.engine.watermarks().get("orders").await, ts(NOW));

    let requests = h.server.received_requests().await.unwrap();
    let pushed = requests
        .iter()
        .find(|r| r.url.path() == "/api/sync/push/orders")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&pushed.body).unwrap();
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[0]["id"], "o-1");
}

#[tokio::test]
async fn test_push_without_changes_sends_nothing() {
    let h = Harness::new(vec![EntityDefinition::new("Event", "events").push_only()]).await;
    h.insert("events", "e-1", "2025-07-01 09:00:00").await;
    h.mount_push("events", 0).await;

    let result = h.engine.sync().await;

    assert!(result.success, "{}", result.message);
    let pull = result.pull.unwrap();
    assert!(pull.details.is_empty());
    let detail = &result.push.unwrap().details["events"];
    assert!(detail.success);
    assert_eq!(detail.count, 0);
    assert_eq!(detail.message, "No changes to push for events");
    assert!(!file_exists(&h.watermark_file("events")));
}

#[tokio::test]
async fn test_push_failure_keeps_watermark() {
    let h = Harness::new(vec![EntityDefinition::new("Event", "events").push_only()]).await;
    h.insert("events", "e-1", "2025-07-08 09:00:00").await;
    Mock::given(method("POST"))
        .and(path("/api/sync/push/events"))
        .respond_with(ResponseTemplate::new(422))
        .expect(1)
        .mount(&h.server)
        .await;

    let result = h.engine.sync().await;

    assert!(!result.success);
    assert_eq!(result.message, "Sync completed with errors in: events");
    assert!(!file_exists(&h.watermark_file("events")));
}

// =============================================================================
// Cycle gates
// =============================================================================

#[tokio::test]
async fn test_offline_cycle_contacts_nothing() {
    let h = Harness::with_probe(vec![orders()], StaticProbe::offline()).await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let result = h.engine.sync().await;

    assert!(!result.success);
    assert_eq!(result.message, OFFLINE_MESSAGE);
    assert!(result.pull.is_none() && result.push.is_none());
    assert_eq!(h.probe.calls(), 1);
}

#[tokio::test]
async fn test_cycle_refused_while_lock_held() {
    let h = Harness::new(vec![orders()]).await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let held = CycleLock::try_acquire(h.dir.path()).unwrap().unwrap();
    let result = h.engine.sync().await;
    drop(held);

    assert_eq!(result.message, IN_PROGRESS_MESSAGE);
    assert_eq!(h.probe.calls(), 0);
}

#[tokio::test]
async fn test_denylisted_entity_never_synced() {
    let h = Harness::new(vec![orders(), EntityDefinition::new("Server", "servers")]).await;
    h.insert("servers", "s-1", "2025-07-08 09:00:00").await;
    h.mount_pull("orders", json!([])).await;
    Mock::given(path("/api/sync/pull/servers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&h.server)
        .await;
    Mock::given(path("/api/sync/push/servers"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let catalog = h.engine.tables().await;
    assert_eq!(catalog.names(), vec!["orders"]);

    let result = h.engine.sync().await;
    assert!(result.success, "{}", result.message);
    assert!(!result.pull.unwrap().details.contains_key("servers"));
}

// =============================================================================
// Reset
// =============================================================================

#[tokio::test]
async fn test_reset_one_entity_keeps_others() {
    let h = Harness::new(vec![orders(), EntityDefinition::new("Customer", "customers")]).await;
    h.engine.watermarks().set("orders", ts(NOW)).await;
    h.engine.watermarks().set("customers", ts(NOW)).await;

    assert_eq!(h.engine.reset(Some("orders")).await.unwrap(), 1);

    assert!(!file_exists(&h.watermark_file("orders")));
    assert!(file_exists(&h.watermark_file("customers")));
    assert_eq!(
        h.engine.watermarks().get("orders").await,
        Timestamp::default_epoch()
    );

    assert_eq!(h.engine.reset(None).await.unwrap(), 1);
    assert!(!file_exists(&h.watermark_file("customers")));
}
