use anyhow::{Context, Result};
use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::core::{CoreError, CoreResult, SchemaResolver, TableId, TargetSchema};

/// Column-level difference between two versions of a table schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDelta {
    pub table: TableId,
    pub added_columns: Vec<String>,
    pub removed_columns: Vec<String>,
}

impl SchemaDelta {
    fn between(table: TableId, previous: &TargetSchema, current: &TargetSchema) -> Self {
        let prev: HashSet<&str> = previous.column_names().collect();
        let next: HashSet<&str> = current.column_names().collect();

        Self {
            table,
            added_columns: current
                .column_names()
                .filter(|c| !prev.contains(c))
                .map(str::to_string)
                .collect(),
            removed_columns: previous
                .column_names()
                .filter(|c| !next.contains(c))
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    tables: Vec<TargetSchema>,
}

/// In-memory schema catalog keyed by `(database, table)`.
///
/// Schemas are handed out as `Arc`s so projection never holds the lock.
pub struct SchemaCatalog {
    cache: RwLock<HashMap<TableId, Arc<TargetSchema>>>,
    case_sensitive: bool,
}

impl SchemaCatalog {
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            case_sensitive,
        }
    }

    /// Parses a catalog document of the form `{"tables": [...]}`.
    pub fn from_json_str(json: &str, case_sensitive: bool) -> CoreResult<Self> {
        let file: CatalogFile = serde_json::from_str(json).map_err(|e| {
            CoreError::serialization_error_with_cause("invalid schema catalog", e)
        })?;

        let catalog = Self::new(case_sensitive);
        for schema in file.tables {
            let id = catalog.key(&TableId::new(schema.database.as_str(), schema.table.as_str()));
            if catalog.cache.read().contains_key(&id) {
                return Err(CoreError::schema_error(format!(
                    "table {} is declared more than once",
                    id
                )));
            }
            catalog.register(schema)?;
        }
        Ok(catalog)
    }

    pub fn from_file(path: impl AsRef<Path>, case_sensitive: bool) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema catalog {}", path.display()))?;
        let catalog = Self::from_json_str(&json, case_sensitive)
            .with_context(|| format!("Failed to load schema catalog {}", path.display()))?;
        info!("Loaded {} table schemas from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Registers or replaces the schema of a table.
    ///
    /// Returns the delta against the previous version, if there was one and
    /// its columns differ.
    pub fn register(&self, schema: TargetSchema) -> CoreResult<Option<SchemaDelta>> {
        schema.validate()?;

        let id = self.key(&TableId::new(schema.database.as_str(), schema.table.as_str()));
        let current = Arc::new(schema);
        let previous = self.cache.write().insert(id.clone(), Arc::clone(&current));

        let Some(previous) = previous else {
            return Ok(None);
        };
        let delta = SchemaDelta::between(id, &previous, &current);
        if delta.added_columns.is_empty() && delta.removed_columns.is_empty() {
            return Ok(None);
        }

        info!(
            "[SCHEMA] Schema change for table {}: {} added, {} removed columns",
            delta.table,
            delta.added_columns.len(),
            delta.removed_columns.len()
        );
        Ok(Some(delta))
    }

    pub fn remove(&self, table: &TableId) -> Option<Arc<TargetSchema>> {
        self.cache.write().remove(&self.key(table))
    }

    pub fn get(&self, table: &TableId) -> Option<Arc<TargetSchema>> {
        self.cache.read().get(&self.key(table)).cloned()
    }

    /// Registered routing keys, sorted.
    pub fn tables(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.cache.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn key(&self, table: &TableId) -> TableId {
        if self.case_sensitive {
            table.clone()
        } else {
            table.to_lowercase()
        }
    }
}

impl SchemaResolver for SchemaCatalog {
    fn resolve(&self, table: &TableId) -> CoreResult<Arc<TargetSchema>> {
        self.get(table).ok_or_else(|| {
            CoreError::unknown_routing_target(table.database.as_str(), table.table.as_str())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType};

    fn users(columns: &[&str]) -> TargetSchema {
        TargetSchema::new(
            "db1",
            "users",
            columns
                .iter()
                .map(|c| Column::new(*c, DataType::String))
                .collect(),
        )
    }

    #[test]
    fn test_register_and_resolve() {
        let catalog = SchemaCatalog::new(true);
        assert!(catalog.is_empty());
        assert_eq!(catalog.register(users(&["id", "name"])).unwrap(), None);

        let schema = catalog.resolve(&TableId::new("db1", "users")).unwrap();
        assert_eq!(schema.columns.len(), 2);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_unknown_target() {
        let catalog = SchemaCatalog::new(true);
        catalog.register(users(&["id"])).unwrap();

        let err = catalog.resolve(&TableId::new("db1", "orders")).unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnknownRoutingTarget { ref database, ref table }
                if database == "db1" && table == "orders"
        ));
    }

    #[test]
    fn test_case_policy() {
        let sensitive = SchemaCatalog::new(true);
        sensitive.register(users(&["id"])).unwrap();
        assert!(sensitive.resolve(&TableId::new("DB1", "Users")).is_err());

        let insensitive = SchemaCatalog::new(false);
        insensitive.register(users(&["id"])).unwrap();
        assert!(insensitive.resolve(&TableId::new("DB1", "Users")).is_ok());
        assert_eq!(insensitive.tables(), vec![TableId::new("db1", "users")]);
    }

    #[test]
    fn test_replace_reports_delta() {
        let catalog = SchemaCatalog::new(true);
        catalog.register(users(&["id", "name"])).unwrap();

        let delta = catalog
            .register(users(&["id", "email"]))
            .unwrap()
            .unwrap();
        assert_eq!(delta.table, TableId::new("db1", "users"));
        assert_eq!(delta.added_columns, vec!["email"]);
        assert_eq!(delta.removed_columns, vec!["name"]);

        // identical columns: replaced, no delta
        assert_eq!(catalog.register(users(&["id", "email"])).unwrap(), None);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_register_rejects_invalid_schema() {
        let catalog = SchemaCatalog::new(true);
        assert!(catalog.register(users(&["id", "id"])).is_err());
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_remove() {
        let catalog = SchemaCatalog::new(true);
        catalog.register(users(&["id"])).unwrap();
        assert!(catalog.remove(&TableId::new("db1", "users")).is_some());
        assert!(catalog.get(&TableId::new("db1", "users")).is_none());
    }

    #[test]
    fn test_from_json_str() {
        let json = r#"{
            "tables": [
                {
                    "database": "db1",
                    "table": "users",
                    "columns": [
                        {"name": "id", "type": "int64", "primary_key": true, "nullable": false},
                        {"name": "name", "type": "string"}
                    ]
                },
                {
                    "database": "db1",
                    "table": "orders",
                    "columns": [
                        {"name": "id", "type": "int64", "primary_key": true},
                        {"name": "total", "type": {"decimal": {"precision": 12, "scale": 2}}}
                    ]
                }
            ]
        }"#;

        let catalog = SchemaCatalog::from_json_str(json, true).unwrap();
        assert_eq!(catalog.len(), 2);
        let orders = catalog.resolve(&TableId::new("db1", "orders")).unwrap();
        assert_eq!(
            orders.columns[1].data_type,
            DataType::Decimal { precision: 12, scale: 2 }
        );
        assert_eq!(orders.primary_keys().count(), 1);
    }

    #[test]
    fn test_from_json_str_errors() {
        assert!(matches!(
            SchemaCatalog::from_json_str("{", true),
            Err(CoreError::Serialization { .. })
        ));

        let duplicate = r#"{"tables": [
            {"database": "db1", "table": "t", "columns": [{"name": "id", "type": "int64"}]},
            {"database": "DB1", "table": "T", "columns": [{"name": "id", "type": "int64"}]}
        ]}"#;
        assert!(SchemaCatalog::from_json_str(duplicate, true).is_ok());
        assert!(matches!(
            SchemaCatalog::from_json_str(duplicate, false),
            Err(CoreError::Schema { .. })
        ));
    }
}
