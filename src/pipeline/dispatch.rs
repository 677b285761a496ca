use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::core::{
    AbsentReason, CoreError, CoreResult, MultiplexChangeRecord, Projection, Row, SchemaResolver,
    TargetSchema,
};

/// How rows are materialized for the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Every record becomes an insert row
    Append,
    /// Records keep their change kind; non-materializable changes emit nothing
    Changelog,
}

impl FromStr for WriteMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "append" => Ok(WriteMode::Append),
            "changelog" => Ok(WriteMode::Changelog),
            other => Err(CoreError::config_error(format!(
                "Unsupported write mode: '{}'. Supported: append, changelog",
                other
            ))),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Append => write!(f, "append"),
            WriteMode::Changelog => write!(f, "changelog"),
        }
    }
}

/// What to do with records carrying fields the target schema lacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaLagPolicy {
    /// Project anyway, dropping the unknown fields
    DropExtra,
    /// Emit no row until the catalog knows every field
    AwaitSchema,
}

impl FromStr for SchemaLagPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drop-extra" | "drop_extra" => Ok(SchemaLagPolicy::DropExtra),
            "await-schema" | "await_schema" => Ok(SchemaLagPolicy::AwaitSchema),
            other => Err(CoreError::config_error(format!(
                "Unsupported schema lag policy: '{}'. Supported: drop-extra, await-schema",
                other
            ))),
        }
    }
}

impl fmt::Display for SchemaLagPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaLagPolicy::DropExtra => write!(f, "drop-extra"),
            SchemaLagPolicy::AwaitSchema => write!(f, "await-schema"),
        }
    }
}

/// Handling of record-scoped failures (coercion errors, unknown tables)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    Quarantine,
    Skip,
    FailFast,
}

impl FromStr for ErrorPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quarantine" => Ok(ErrorPolicy::Quarantine),
            "skip" => Ok(ErrorPolicy::Skip),
            "fail" | "fail-fast" => Ok(ErrorPolicy::FailFast),
            other => Err(CoreError::config_error(format!(
                "Unsupported error policy: '{}'. Supported: quarantine, skip, fail",
                other
            ))),
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Quarantine => write!(f, "quarantine"),
            ErrorPolicy::Skip => write!(f, "skip"),
            ErrorPolicy::FailFast => write!(f, "fail"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    pub write_mode: WriteMode,
    pub schema_lag_policy: SchemaLagPolicy,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            write_mode: WriteMode::Changelog,
            schema_lag_policy: SchemaLagPolicy::DropExtra,
        }
    }
}

/// Result of dispatching one record
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// A row for the table described by `schema`
    Row { schema: Arc<TargetSchema>, row: Row },
    Absent(AbsentReason),
}

/// Resolves each record's target schema and projects the record onto it.
pub struct Dispatcher {
    resolver: Arc<dyn SchemaResolver>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(resolver: Arc<dyn SchemaResolver>, options: DispatchOptions) -> Self {
        Self { resolver, options }
    }

    pub fn options(&self) -> DispatchOptions {
        self.options
    }

    /// Routes and projects a record.
    ///
    /// An unresolvable table fails before any projection happens, so no
    /// partial row is ever produced for it.
    pub fn dispatch(&self, record: &MultiplexChangeRecord) -> CoreResult<Dispatched> {
        let schema = self.resolver.resolve(&record.table_id())?;

        if self.options.schema_lag_policy == SchemaLagPolicy::AwaitSchema {
            let unknown = record.record().unknown_fields(&schema.columns);
            if !unknown.is_empty() {
                debug!("Holding back {}: unknown fields {:?}", record, unknown);
                return Ok(Dispatched::Absent(AbsentReason::AwaitingSchema));
            }
        }

        let projection = match self.options.write_mode {
            WriteMode::Append => Projection::Row(record.project_as_insert(&schema.columns)?),
            WriteMode::Changelog => record.to_generic_row(&schema.columns)?,
        };

        Ok(match projection {
            Projection::Row(row) => Dispatched::Row { schema, row },
            Projection::Absent(reason) => Dispatched::Absent(reason),
        })
    }
}
