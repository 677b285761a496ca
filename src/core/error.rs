use thiserror::Error;

use crate::core::schema::DataType;

/// A raw value could not be converted to the declared type of its column.
///
/// This is a data error scoped to a single record. It is never raised for a
/// field that is simply absent.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot coerce {found} value into column '{column}' of type {expected}: {reason}")]
pub struct CoercionError {
    pub column: String,
    pub expected: DataType,
    pub found: &'static str,
    pub reason: String,
}

/// Common error types for the CDC core module
#[derive(Debug, Error)]
pub enum CoreError {
    /// No schema is known for the routing key
    #[error("Unknown routing target: {database}.{table}")]
    UnknownRoutingTarget { database: String, table: String },

    /// A field value did not fit its target column
    #[error("Coercion error: {0}")]
    Coercion(#[from] CoercionError),

    /// Invalid or unusable target schema
    #[error("Schema error: {message}")]
    Schema { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Writer-related errors
    #[error("Sink error: {message}")]
    Sink {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CoreError {
    pub fn unknown_routing_target(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self::UnknownRoutingTarget {
            database: database.into(),
            table: table.into(),
        }
    }

    pub fn schema_error(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn serialization_error(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
            source: None,
        }
    }

    pub fn serialization_error_with_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    pub fn sink_error(message: impl Into<String>) -> Self {
        Self::Sink {
            message: message.into(),
            source: None,
        }
    }

    pub fn sink_error_with_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Sink {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Errors that concern a single record rather than the whole stream.
    pub fn is_record_scoped(&self) -> bool {
        matches!(
            self,
            CoreError::UnknownRoutingTarget { .. } | CoreError::Coercion(_)
        )
    }
}

/// Result type alias using CoreError
pub type CoreResult<T> = Result<T, CoreError>;
