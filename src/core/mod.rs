pub mod coerce;
pub mod error;
pub mod multiplex;
pub mod record;
pub mod schema;
pub mod traits;
pub mod value;

pub use error::{CoercionError, CoreError, CoreResult};
pub use multiplex::{MultiplexChangeRecord, TableId};
pub use record::{AbsentReason, ChangeRecord, Projection, Row, RowKind};
pub use schema::{Column, DataType, TargetSchema};
pub use traits::{SchemaResolver, TableWriter, WriteResult, WriterCapabilities};
pub use value::Value;
