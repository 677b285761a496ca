use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::error::{CoreError, CoreResult};

/// Maximum decimal precision a target column may declare.
pub const MAX_DECIMAL_PRECISION: u8 = 38;

/// Declared type of a target column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Boolean,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal { precision: u8, scale: u8 },
    String,
    Bytes,
    Json,
    Uuid,
    Date,
    Timestamp,
    TimestampTz,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Int16 => write!(f, "SMALLINT"),
            DataType::Int32 => write!(f, "INT"),
            DataType::Int64 => write!(f, "BIGINT"),
            DataType::Float32 => write!(f, "FLOAT"),
            DataType::Float64 => write!(f, "DOUBLE"),
            DataType::Decimal { precision, scale } => {
                write!(f, "DECIMAL({},{})", precision, scale)
            }
            DataType::String => write!(f, "STRING"),
            DataType::Bytes => write!(f, "BYTES"),
            DataType::Json => write!(f, "JSON"),
            DataType::Uuid => write!(f, "UUID"),
            DataType::Date => write!(f, "DATE"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::TimestampTz => write!(f, "TIMESTAMP_TZ"),
        }
    }
}

fn default_nullable() -> bool {
    true
}

/// A named, typed column of a target table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            primary_key: false,
        }
    }

    /// Marks the column as part of the primary key (which implies NOT NULL).
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Ordered column layout of a destination table.
///
/// Owned by the catalog; the projection only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetSchema {
    pub database: String,
    pub table: String,
    pub columns: Vec<Column>,
}

impl TargetSchema {
    pub fn new(database: impl Into<String>, table: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            columns,
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    /// Checks the schema is usable as a projection target.
    pub fn validate(&self) -> CoreResult<()> {
        if self.columns.is_empty() {
            return Err(CoreError::schema_error(format!(
                "table {} declares no columns",
                self.qualified_name()
            )));
        }

        let mut seen = hashbrown::HashSet::with_capacity(self.columns.len());
        for column in &self.columns {
            if column.name.is_empty() {
                return Err(CoreError::schema_error(format!(
                    "table {} has a column with an empty name",
                    self.qualified_name()
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(CoreError::schema_error(format!(
                    "table {} declares column '{}' twice",
                    self.qualified_name(),
                    column.name
                )));
            }
            if let DataType::Decimal { precision, scale } = column.data_type {
                if precision == 0 || precision > MAX_DECIMAL_PRECISION || scale > precision {
                    return Err(CoreError::schema_error(format!(
                        "column {}.{} has invalid type {}",
                        self.qualified_name(),
                        column.name,
                        column.data_type
                    )));
                }
            }
        }
        Ok(())
    }
}
