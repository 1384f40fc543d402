//! # Entity Definitions
//!
//! The static registry of entities that may take part in sync.
//!
//! ## Registry vs. Catalog
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Definitions → Catalog (every cycle)                    │
//! │                                                                         │
//! │  EntityRegistry (startup, from config or code)                         │
//! │  ├── Order    → orders        ✓ valid, table exists                    │
//! │  ├── Customer → customers     ✓ valid, table exists                    │
//! │  ├── Server   → servers       ✗ denylisted                             │
//! │  └── Draft    → "bad name!"   ✗ invalid identifier                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Catalog for this cycle: { orders, customers }                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Definitions are declared, never discovered by introspection. Whether a
//! definition is usable is decided each cycle by the catalog, which calls
//! [`EntityDefinition::validate`] and checks the table.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Longest table identifier accepted.
const MAX_IDENTIFIER_LEN: usize = 64;

// =============================================================================
// Capabilities
// =============================================================================

/// What the engine may do with an entity's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Changes can be selected by `created_at`/`updated_at`.
    pub queryable: bool,
    /// Rows can be counted.
    pub countable: bool,
    /// Inbound records can be merged by id.
    pub upsertable: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            queryable: true,
            countable: true,
            upsertable: true,
        }
    }
}

// =============================================================================
// Entity Definition
// =============================================================================

fn default_true() -> bool {
    true
}

/// A declared syncable entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDefinition {
    /// Model name (e.g. `Order`). Matched against the denylist.
    pub model: String,

    /// Backing table (e.g. `orders`). Also the entity's name on the wire.
    pub table: String,

    /// Whether records from the master may be applied locally.
    #[serde(default = "default_true")]
    pub pull: bool,

    /// Whether local changes are sent to the master.
    #[serde(default = "default_true")]
    pub push: bool,
}

impl EntityDefinition {
    /// Creates a definition that syncs in both directions.
    pub fn new(model: impl Into<String>, table: impl Into<String>) -> Self {
        EntityDefinition {
            model: model.into(),
            table: table.into(),
            pull: true,
            push: true,
        }
    }

    /// Marks the entity as push-only (never written from the master).
    pub fn push_only(mut self) -> Self {
        self.pull = false;
        self
    }

    /// Marks the entity as pull-only (local changes stay local).
    pub fn pull_only(mut self) -> Self {
        self.push = false;
        self
    }

    /// Entity name on the wire and in watermark files.
    pub fn name(&self) -> &str {
        &self.table
    }

    /// True when either the model or the table appears in `denylist`.
    pub fn is_denied(&self, denylist: &[String]) -> bool {
        denylist
            .iter()
            .any(|denied| denied == &self.model || denied == &self.table)
    }

    /// Checks that the definition names a concrete, storage-backed table.
    pub fn validate(&self) -> CoreResult<()> {
        if self.model.trim().is_empty() {
            return Err(self.invalid("model name is empty"));
        }
        if !is_valid_identifier(&self.table) {
            return Err(self.invalid(&format!(
                "table '{}' is not a plain SQL identifier",
                self.table
            )));
        }
        if !self.pull && !self.push {
            return Err(self.invalid("neither pull nor push is enabled"));
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> CoreError {
        CoreError::InvalidDefinition {
            name: self.model.clone(),
            reason: reason.to_string(),
        }
    }
}

/// True for `[A-Za-z_][A-Za-z0-9_]*` up to 64 characters.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// =============================================================================
// Entity Registry
// =============================================================================

/// Ordered list of declared entity definitions.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    definitions: Vec<EntityDefinition>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition. Validation is deferred to discovery.
    pub fn register(mut self, definition: EntityDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Returns all definitions in declaration order.
    pub fn definitions(&self) -> &[EntityDefinition] {
        &self.definitions
    }

    /// Finds a definition by table name.
    pub fn get(&self, table: &str) -> Option<&EntityDefinition> {
        self.definitions.iter().find(|d| d.table == table)
    }

    /// Number of declared definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// True when nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl From<Vec<EntityDefinition>> for EntityRegistry {
    fn from(definitions: Vec<EntityDefinition>) -> Self {
        EntityRegistry { definitions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rules() {
        assert!(is_valid_identifier("orders"));
        assert!(is_valid_identifier("_order_items2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2orders"));
        assert!(!is_valid_identifier("orders; DROP TABLE x"));
        assert!(!is_valid_identifier("order\"s"));
        assert!(!is_valid_identifier(&"a".repeat(65)));
    }

    #[test]
    fn test_denylist_matches_model_or_table() {
        let def = EntityDefinition::new("Server", "servers");
        assert!(def.is_denied(&["Server".to_string()]));
        assert!(def.is_denied(&["servers".to_string()]));
        assert!(!def.is_denied(&["PasswordReset".to_string()]));
    }

    #[test]
    fn test_validate() {
        assert!(EntityDefinition::new("Order", "orders").validate().is_ok());
        assert!(EntityDefinition::new("", "orders").validate().is_err());
        assert!(EntityDefinition::new("Order", "bad name").validate().is_err());
        assert!(EntityDefinition::new("Order", "orders")
            .push_only()
            .pull_only()
            .validate()
            .is_err());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = EntityRegistry::new()
            .register(EntityDefinition::new("Order", "orders"))
            .register(EntityDefinition::new("Customer", "customers").push_only());

        assert_eq!(registry.len(), 2);
        assert!(!registry.get("customers").unwrap().pull);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_definition_defaults_from_toml_shape() {
        let def: EntityDefinition =
            serde_json::from_str(r#"{"model": "Order", "table": "orders"}"#).unwrap();
        assert!(def.pull && def.push);
    }
}
