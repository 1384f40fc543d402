//! # Entity Catalog
//!
//! Turns the declared registry into the set of entities a cycle may touch.
//! Built fresh for every cycle and every peer request; never cached.
//!
//! ## Discovery
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        EntityCatalog::discover()                        │
//! │                                                                         │
//! │  database reachable? ── no ──► empty catalog (error logged)            │
//! │        │ yes                                                            │
//! │        ▼                                                                │
//! │  for each definition, in registry order:                               │
//! │     denylisted (model or table)?        ──► skipped                    │
//! │     definition invalid?                 ──► dropped (warn)             │
//! │     table missing?                      ──► dropped (warn)             │
//! │     table without "id" column?          ──► dropped (warn)             │
//! │     otherwise                           ──► EntityDescriptor           │
//! │                                                                         │
//! │  capabilities:                                                          │
//! │     queryable  = has created_at or updated_at                          │
//! │     countable  = always                                                 │
//! │     upsertable = definition is not push-only                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failing candidate never aborts discovery.

use serde::Serialize;
use tracing::{debug, error, warn};

use edgesync_core::{Capabilities, EntityDefinition, EntityRegistry};
use edgesync_db::{Database, EntityRepository, TableSchema};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Descriptor
// =============================================================================

/// One entity eligible for sync in the current cycle.
#[derive(Debug, Clone, Serialize)]
pub struct EntityDescriptor {
    /// Wire name (the table name).
    pub name: String,
    pub model: String,
    pub table: String,
    pub capabilities: Capabilities,
    /// Whether local changes are sent to the master.
    pub push: bool,
    #[serde(skip)]
    pub schema: TableSchema,
}

impl EntityDescriptor {
    fn new(definition: &EntityDefinition, schema: TableSchema) -> Self {
        let capabilities = Capabilities {
            queryable: schema.is_queryable(),
            countable: true,
            upsertable: definition.pull,
        };

        EntityDescriptor {
            name: definition.name().to_string(),
            model: definition.model.clone(),
            table: definition.table.clone(),
            capabilities,
            push: definition.push,
            schema,
        }
    }

    /// True when records from the master may be applied.
    pub fn pulls(&self) -> bool {
        self.capabilities.upsertable
    }

    /// True when local changes can be selected and sent.
    pub fn pushes(&self) -> bool {
        self.push && self.capabilities.queryable
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Entities discovered for one cycle, in registry order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<EntityDescriptor>,
}

impl Catalog {
    /// Looks an entity up by name.
    pub fn get(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Looks an entity up by name, failing with `UnknownEntity`.
    pub fn require(&self, name: &str) -> SyncResult<&EntityDescriptor> {
        self.get(name)
            .ok_or_else(|| SyncError::UnknownEntity(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// Discovers syncable entities against the live database.
#[derive(Debug, Clone)]
pub struct EntityCatalog {
    db: Database,
    registry: EntityRegistry,
    denylist: Vec<String>,
}

impl EntityCatalog {
    pub fn new(db: Database, registry: EntityRegistry, denylist: Vec<String>) -> Self {
        EntityCatalog {
            db,
            registry,
            denylist,
        }
    }

    /// Declared definitions, before any checks.
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Repository for a discovered entity.
    pub fn repository(&self, entity: &EntityDescriptor) -> SyncResult<EntityRepository> {
        Ok(self.db.entity(&entity.table)?)
    }

    /// Builds this cycle's catalog.
    pub async fn discover(&self) -> Catalog {
        if !self.db.health_check().await {
            error!("Database unreachable, no entities available for sync");
            return Catalog::default();
        }

        let mut entries: Vec<EntityDescriptor> = Vec::with_capacity(self.registry.len());

        for definition in self.registry.definitions() {
            if definition.is_denied(&self.denylist) {
                debug!(model = %definition.model, table = %definition.table, "Skipping denylisted entity");
                continue;
            }

            if entries.iter().any(|e| e.table == definition.table) {
                warn!(table = %definition.table, "Duplicate entity definition, keeping the first");
                continue;
            }

            match self.check(definition).await {
                Ok(descriptor) => entries.push(descriptor),
                Err(e) => warn!(
                    model = %definition.model,
                    table = %definition.table,
                    error = %e,
                    "Entity excluded from this cycle"
                ),
            }
        }

        debug!(count = entries.len(), "Entity discovery complete");
        Catalog { entries }
    }

    async fn check(&self, definition: &EntityDefinition) -> SyncResult<EntityDescriptor> {
        definition.validate()?;

        let repo = self.db.entity(&definition.table)?;
        let schema = repo.schema().await?;

        if !schema.has_id() {
            return Err(SyncError::NoIdColumn(definition.table.clone()));
        }

        Ok(EntityDescriptor::new(definition, schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgesync_db::DbConfig;

    async fn database() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for ddl in [
            "CREATE TABLE orders (id TEXT PRIMARY KEY, total INTEGER, created_at TEXT, updated_at TEXT)",
            "CREATE TABLE servers (id INTEGER PRIMARY KEY, host TEXT, updated_at TEXT)",
            "CREATE TABLE tags (id INTEGER PRIMARY KEY, label TEXT)",
            "CREATE TABLE role_user (role_id INTEGER, user_id INTEGER)",
            "CREATE TABLE audit_logs (id INTEGER PRIMARY KEY, created_at TEXT)",
        ] {
            sqlx::query(ddl).execute(db.pool()).await.unwrap();
        }
        db
    }

    fn denylist() -> Vec<String> {
        vec!["Server".to_string(), "role_user".to_string()]
    }

    #[tokio::test]
    async fn test_discovery_filters_candidates() {
        let registry = EntityRegistry::new()
            .register(EntityDefinition::new("Order", "orders"))
            .register(EntityDefinition::new("Server", "servers"))
            .register(EntityDefinition::new("Tag", "tags"))
            .register(EntityDefinition::new("RoleUser", "role_user"))
            .register(EntityDefinition::new("Ghost", "ghosts"))
            .register(EntityDefinition::new("Broken", "bad name"))
            .register(EntityDefinition::new("AuditLog", "audit_logs").push_only());

        let catalog = EntityCatalog::new(database().await, registry, denylist())
            .discover()
            .await;

        assert_eq!(catalog.names(), vec!["orders", "tags", "audit_logs"]);
        assert!(catalog.get("servers").is_none());
    }

    #[tokio::test]
    async fn test_capabilities() {
        let registry = EntityRegistry::new()
            .register(EntityDefinition::new("Order", "orders"))
            .register(EntityDefinition::new("Tag", "tags"))
            .register(EntityDefinition::new("AuditLog", "audit_logs").push_only());

        let catalog = EntityCatalog::new(database().await, registry, vec![])
            .discover()
            .await;

        let orders = catalog.require("orders").unwrap();
        assert!(orders.capabilities.queryable && orders.pulls() && orders.pushes());

        let tags = catalog.require("tags").unwrap();
        assert!(!tags.capabilities.queryable);
        assert!(tags.capabilities.countable);
        assert!(!tags.pushes());

        let audit = catalog.require("audit_logs").unwrap();
        assert!(!audit.pulls());
        assert!(audit.pushes());
    }

    #[tokio::test]
    async fn test_table_without_id_excluded() {
        let registry = EntityRegistry::new().register(EntityDefinition::new("RoleUser", "role_user"));
        let catalog = EntityCatalog::new(database().await, registry, vec![])
            .discover()
            .await;
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_database_gives_empty_catalog() {
        let db = database().await;
        db.close().await;

        let registry = EntityRegistry::new().register(EntityDefinition::new("Order", "orders"));
        let catalog = EntityCatalog::new(db, registry, vec![]).discover().await;
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_entity_lookup() {
        let catalog = Catalog::default();
        assert!(matches!(
            catalog.require("orders"),
            Err(SyncError::UnknownEntity(_))
        ));
    }
}
