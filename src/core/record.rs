use hashbrown::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::core::coerce::coerce;
use crate::core::error::{CoercionError, CoreError};
use crate::core::schema::Column;
use crate::core::value::Value;

/// Kind of a row-level change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKind {
    Insert,
    UpdateBefore,
    UpdateAfter,
    Delete,
}

impl RowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowKind::Insert => "INSERT",
            RowKind::UpdateBefore => "UPDATE_BEFORE",
            RowKind::UpdateAfter => "UPDATE_AFTER",
            RowKind::Delete => "DELETE",
        }
    }

    /// Compact changelog notation (`+I`, `-U`, `+U`, `-D`)
    pub fn short_string(&self) -> &'static str {
        match self {
            RowKind::Insert => "+I",
            RowKind::UpdateBefore => "-U",
            RowKind::UpdateAfter => "+U",
            RowKind::Delete => "-D",
        }
    }
}

impl FromStr for RowKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INSERT" | "+I" => Ok(RowKind::Insert),
            "UPDATE_BEFORE" | "-U" => Ok(RowKind::UpdateBefore),
            "UPDATE_AFTER" | "+U" => Ok(RowKind::UpdateAfter),
            "DELETE" | "-D" => Ok(RowKind::Delete),
            other => Err(CoreError::serialization_error(format!(
                "Unsupported row kind: '{}'. Supported: INSERT, UPDATE_BEFORE, UPDATE_AFTER, DELETE",
                other
            ))),
        }
    }
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-table change event as emitted by a CDC source.
///
/// Fields are keyed by name and never change after construction, so a record
/// can be read from any number of threads at once.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    kind: RowKind,
    fields: HashMap<String, Value>,
}

impl ChangeRecord {
    pub fn new<K, V>(kind: RowKind, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            kind,
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn insert<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::new(RowKind::Insert, fields)
    }

    pub fn delete<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::new(RowKind::Delete, fields)
    }

    pub fn kind(&self) -> RowKind {
        self.kind
    }

    pub fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Projects the record as a full insert row.
    ///
    /// Every column gets a slot, in the order given: missing fields become
    /// `Null`, fields unknown to `columns` are dropped. The only failure is a
    /// value that does not fit its column's type.
    pub fn project_as_insert(&self, columns: &[Column]) -> Result<Row, CoercionError> {
        self.project(RowKind::Insert, columns)
    }

    /// Projects the record as a change carrying its own kind, or reports that
    /// the change has no row to emit.
    ///
    /// Before-images are not retained, and a delete needs every primary-key
    /// column of the target to be present. Absence is decided before any
    /// value is coerced.
    pub fn project_as_change(&self, columns: &[Column]) -> Result<Projection, CoercionError> {
        match self.kind {
            RowKind::Insert | RowKind::UpdateAfter => {
                self.project(self.kind, columns).map(Projection::Row)
            }
            RowKind::UpdateBefore => Ok(Projection::Absent(AbsentReason::BeforeImage)),
            RowKind::Delete => {
                if self.has_identity(columns) {
                    self.project(RowKind::Delete, columns).map(Projection::Row)
                } else {
                    Ok(Projection::Absent(AbsentReason::MissingIdentity))
                }
            }
        }
    }

    /// Names of fields the given columns do not know about, sorted.
    pub fn unknown_fields(&self, columns: &[Column]) -> Vec<&str> {
        let mut unknown: Vec<&str> = self
            .fields
            .keys()
            .map(String::as_str)
            .filter(|name| !columns.iter().any(|c| c.name == *name))
            .collect();
        unknown.sort_unstable();
        unknown
    }

    /// True when the columns declare a primary key and the record carries a
    /// non-null value for every key column.
    fn has_identity(&self, columns: &[Column]) -> bool {
        let mut keys = columns.iter().filter(|c| c.primary_key).peekable();
        keys.peek().is_some()
            && keys.all(|c| self.fields.get(&c.name).is_some_and(|v| !v.is_null()))
    }

    fn project(&self, kind: RowKind, columns: &[Column]) -> Result<Row, CoercionError> {
        let values = columns
            .iter()
            .map(|column| match self.fields.get(&column.name) {
                Some(value) => coerce(column, value),
                None => Ok(Value::Null),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Row { kind, values })
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.fields.keys().collect();
        names.sort_unstable();

        write!(f, "{}{{", self.kind)?;
        for (i, name) in names.into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, self.fields[name])?;
        }
        write!(f, "}}")
    }
}

/// Positional row whose slots follow the projected column list
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    kind: RowKind,
    values: Vec<Value>,
}

impl Row {
    pub fn kind(&self) -> RowKind {
        self.kind
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Pairs each slot with its column name as a JSON object, keys in column
    /// order.
    pub fn to_json(&self, columns: &[Column]) -> serde_json::Map<String, serde_json::Value> {
        columns
            .iter()
            .zip(self.values.iter())
            .map(|(c, v)| (c.name.clone(), v.to_json()))
            .collect()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind.short_string())?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

/// Why a change produced no row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentReason {
    /// Update before-image; only after-images are materialized
    BeforeImage,
    /// Delete without a resolvable primary key
    MissingIdentity,
    /// Record carries fields the target schema does not know yet
    AwaitingSchema,
}

impl fmt::Display for AbsentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbsentReason::BeforeImage => write!(f, "update before-image"),
            AbsentReason::MissingIdentity => write!(f, "delete without primary key"),
            AbsentReason::AwaitingSchema => write!(f, "awaiting schema update"),
        }
    }
}

/// Outcome of a change projection: a row, or an explicit "no row"
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Row(Row),
    Absent(AbsentReason),
}

impl Projection {
    pub fn is_absent(&self) -> bool {
        matches!(self, Projection::Absent(_))
    }

    pub fn into_row(self) -> Option<Row> {
        match self {
            Projection::Row(row) => Some(row),
            Projection::Absent(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::DataType;

    fn columns(names: &[&str]) -> Vec<Column> {
        names
            .iter()
            .map(|n| Column::new(*n, DataType::String))
            .collect()
    }

    fn users_columns() -> Vec<Column> {
        vec![
            Column::new("id", DataType::Int64).primary_key(),
            Column::new("name", DataType::String),
            Column::new("age", DataType::Int32),
        ]
    }

    #[test]
    fn test_insert_fills_missing_with_null() {
        let record = ChangeRecord::insert([("id", Value::from(1)), ("name", Value::from("Alice"))]);
        let row = record.project_as_insert(&users_columns()).unwrap();

        assert_eq!(row.kind(), RowKind::Insert);
        assert_eq!(
            row.values(),
            &[Value::Int64(1), Value::from("Alice"), Value::Null]
        );
    }

    #[test]
    fn test_insert_drops_extra_fields() {
        let record = ChangeRecord::insert([("id", Value::from(1)), ("extra", Value::from("x"))]);
        let cols = vec![Column::new("id", DataType::Int64)];
        let row = record.project_as_insert(&cols).unwrap();

        assert_eq!(row.into_values(), vec![Value::Int64(1)]);
        assert_eq!(record.unknown_fields(&cols), vec!["extra"]);
    }

    #[test]
    fn test_projection_length_and_order() {
        let record = ChangeRecord::insert([("c", "3"), ("a", "1"), ("b", "2")]);

        for names in [
            vec!["a", "b", "c"],
            vec!["c", "b", "a"],
            vec!["b", "z", "a", "y"],
            vec![],
        ] {
            let cols = columns(&names);
            let row = record.project_as_insert(&cols).unwrap();
            assert_eq!(row.len(), cols.len());
            for (i, name) in names.iter().enumerate() {
                let expected = record.field(name).cloned().unwrap_or(Value::Null);
                assert_eq!(row.get(i), Some(&expected));
            }
        }
    }

    #[test]
    fn test_empty_record_projects_all_nulls() {
        let record = ChangeRecord::insert(Vec::<(String, Value)>::new());
        let row = record.project_as_insert(&users_columns()).unwrap();
        assert!(row.values().iter().all(Value::is_null));
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn test_insert_surfaces_coercion_error() {
        let record = ChangeRecord::insert([("id", Value::from(1)), ("age", Value::from("old"))]);
        let err = record.project_as_insert(&users_columns()).unwrap_err();
        assert_eq!(err.column, "age");
        assert_eq!(err.expected, DataType::Int32);
        assert_eq!(err.found, "string");
    }

    #[test]
    fn test_change_keeps_kind() {
        let record = ChangeRecord::new(RowKind::UpdateAfter, [("id", 7)]);
        let row = record
            .project_as_change(&users_columns())
            .unwrap()
            .into_row()
            .unwrap();
        assert_eq!(row.kind(), RowKind::UpdateAfter);
        assert_eq!(row.values(), &[Value::Int64(7), Value::Null, Value::Null]);

        // same shape as the insert projection
        let insert = record.project_as_insert(&users_columns()).unwrap();
        assert_eq!(insert.values(), row.values());
        assert_eq!(insert.kind(), RowKind::Insert);
    }

    #[test]
    fn test_delete_without_identity_is_absent() {
        let record = ChangeRecord::delete([("name", "Alice")]);
        assert_eq!(
            record.project_as_change(&users_columns()).unwrap(),
            Projection::Absent(AbsentReason::MissingIdentity)
        );

        // null key is not an identity either
        let record = ChangeRecord::delete([("id", Value::Null)]);
        assert!(record.project_as_change(&users_columns()).unwrap().is_absent());

        // no primary key declared at all
        let record = ChangeRecord::delete([("id", 1)]);
        assert!(record.project_as_change(&columns(&["id"])).unwrap().is_absent());
    }

    #[test]
    fn test_delete_with_identity_is_row() {
        let record = ChangeRecord::delete([("id", 1)]);
        let row = record
            .project_as_change(&users_columns())
            .unwrap()
            .into_row()
            .unwrap();
        assert_eq!(row.kind(), RowKind::Delete);
        assert_eq!(row.get(0), Some(&Value::Int64(1)));
    }

    #[test]
    fn test_before_image_is_absent_without_coercion() {
        // age would fail coercion, but absence wins
        let record = ChangeRecord::new(
            RowKind::UpdateBefore,
            [("id", Value::from(1)), ("age", Value::from("old"))],
        );
        assert_eq!(
            record.project_as_change(&users_columns()).unwrap(),
            Projection::Absent(AbsentReason::BeforeImage)
        );
    }

    #[test]
    fn test_display_sorted_fields() {
        let record = ChangeRecord::insert([("id", 1)]);
        assert_eq!(record.to_string(), "INSERT{id=1}");

        let record = ChangeRecord::new(
            RowKind::Delete,
            [("name", Value::from("Bob")), ("id", Value::from(2)), ("age", Value::Null)],
        );
        assert_eq!(record.to_string(), "DELETE{age=null, id=2, name=Bob}");
    }

    #[test]
    fn test_row_display_and_json() {
        let record = ChangeRecord::insert([("id", Value::from(1)), ("name", Value::from("Alice"))]);
        let cols = users_columns();
        let row = record.project_as_insert(&cols).unwrap();
        assert_eq!(row.to_string(), "+I(1,Alice,null)");

        let json = row.to_json(&cols);
        assert_eq!(json["id"], serde_json::json!(1));
        assert_eq!(json["age"], serde_json::Value::Null);
        assert_eq!(
            serde_json::to_string(&json).unwrap(),
            r#"{"id":1,"name":"Alice","age":null}"#
        );
    }

    #[test]
    fn test_row_kind_parsing() {
        assert_eq!("insert".parse::<RowKind>().unwrap(), RowKind::Insert);
        assert_eq!("+U".parse::<RowKind>().unwrap(), RowKind::UpdateAfter);
        assert_eq!("-u".parse::<RowKind>().unwrap(), RowKind::UpdateBefore);
        assert_eq!("DELETE".parse::<RowKind>().unwrap(), RowKind::Delete);
        assert!("TRUNCATE".parse::<RowKind>().is_err());
    }

    #[test]
    fn test_record_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ChangeRecord>();
        assert_send_sync::<Row>();
    }
}
