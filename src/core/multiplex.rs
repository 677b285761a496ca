use std::fmt;

use crate::core::error::CoercionError;
use crate::core::record::{ChangeRecord, Projection, Row};
use crate::core::schema::Column;

/// Routing key of a destination table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId {
    pub database: String,
    pub table: String,
}

impl TableId {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }

    /// Key folded to ASCII lowercase, for case-insensitive routing.
    pub fn to_lowercase(&self) -> Self {
        Self {
            database: self.database.to_ascii_lowercase(),
            table: self.table.to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// A change record tagged with the database and table it came from, so a
/// single stream can carry changes for many tables.
///
/// The caller resolves the target columns for `(database, table)` before
/// projecting.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiplexChangeRecord {
    database_name: String,
    table_name: String,
    record: ChangeRecord,
}

impl MultiplexChangeRecord {
    pub fn new(
        database_name: impl Into<String>,
        table_name: impl Into<String>,
        record: ChangeRecord,
    ) -> Self {
        Self {
            database_name: database_name.into(),
            table_name: table_name.into(),
            record,
        }
    }

    pub fn from_change_record(
        database_name: impl Into<String>,
        table_name: impl Into<String>,
        record: ChangeRecord,
    ) -> Self {
        Self::new(database_name, table_name, record)
    }

    pub fn project_as_insert(&self, columns: &[Column]) -> Result<Row, CoercionError> {
        self.record.project_as_insert(columns)
    }

    pub fn to_generic_row(&self, columns: &[Column]) -> Result<Projection, CoercionError> {
        self.record.project_as_change(columns)
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn record(&self) -> &ChangeRecord {
        &self.record
    }

    pub fn table_id(&self) -> TableId {
        TableId::new(self.database_name.as_str(), self.table_name.as_str())
    }

    pub fn into_record(self) -> ChangeRecord {
        self.record
    }
}

impl fmt::Display for MultiplexChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.database_name, self.table_name, self.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{AbsentReason, RowKind};
    use crate::core::schema::DataType;
    use crate::core::value::Value;

    fn rec() -> ChangeRecord {
        ChangeRecord::insert([("id", 1)])
    }

    #[test]
    fn test_display_format() {
        let mux = MultiplexChangeRecord::new("db1", "t1", rec());
        assert_eq!(mux.to_string(), "db1.t1 INSERT{id=1}");
        assert_eq!(
            mux.to_string(),
            format!("{}.{} {}", mux.database_name(), mux.table_name(), mux.record())
        );
    }

    #[test]
    fn test_equality_includes_identity() {
        let users = MultiplexChangeRecord::new("db1", "users", rec());
        let orders = MultiplexChangeRecord::new("db1", "orders", rec());
        let other_db = MultiplexChangeRecord::new("db2", "users", rec());

        assert_ne!(users, orders);
        assert_ne!(users, other_db);
        assert_eq!(users, MultiplexChangeRecord::from_change_record("db1", "users", rec()));

        let changed = MultiplexChangeRecord::new("db1", "users", ChangeRecord::insert([("id", 2)]));
        assert_ne!(users, changed);

        let deleted = MultiplexChangeRecord::new("db1", "users", ChangeRecord::delete([("id", 1)]));
        assert_ne!(users, deleted);
    }

    #[test]
    fn test_projection_delegates() {
        let columns = vec![
            Column::new("id", DataType::Int64).primary_key(),
            Column::new("name", DataType::String),
        ];
        let mux = MultiplexChangeRecord::new("db1", "users", rec());

        let row = mux.project_as_insert(&columns).unwrap();
        assert_eq!(row, mux.record().project_as_insert(&columns).unwrap());
        assert_eq!(row.values(), &[Value::Int64(1), Value::Null]);

        let before = MultiplexChangeRecord::new(
            "db1",
            "users",
            ChangeRecord::new(RowKind::UpdateBefore, [("id", 1)]),
        );
        assert_eq!(
            before.to_generic_row(&columns).unwrap(),
            Projection::Absent(AbsentReason::BeforeImage)
        );
    }

    #[test]
    fn test_table_id() {
        let mux = MultiplexChangeRecord::new("Sales", "Orders", rec());
        let id = mux.table_id();
        assert_eq!(id, TableId::new("Sales", "Orders"));
        assert_eq!(id.to_string(), "Sales.Orders");
        assert_eq!(id.to_lowercase(), TableId::new("sales", "orders"));
        assert!(TableId::new("a", "z") < TableId::new("b", "a"));
        assert_eq!(mux.into_record(), rec());
    }
}
