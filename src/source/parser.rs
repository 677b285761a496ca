use serde::Deserialize;

use crate::core::{ChangeRecord, CoreError, CoreResult, MultiplexChangeRecord, RowKind, Value};

fn default_kind() -> String {
    RowKind::Insert.as_str().to_string()
}

/// One change as it appears on the wire: a JSON object per line.
///
/// ```text
/// {"database": "db1", "table": "users", "kind": "INSERT", "fields": {"id": 1}}
/// ```
#[derive(Debug, Deserialize)]
struct Envelope {
    database: String,
    table: String,
    #[serde(default = "default_kind")]
    kind: String,
    #[serde(default)]
    fields: serde_json::Map<String, serde_json::Value>,
}

/// Parses a JSON envelope into a routed change record.
pub fn parse_envelope(line: &str) -> CoreResult<MultiplexChangeRecord> {
    let envelope: Envelope = serde_json::from_str(line)
        .map_err(|e| CoreError::serialization_error_with_cause("invalid change envelope", e))?;

    if envelope.database.is_empty() || envelope.table.is_empty() {
        return Err(CoreError::serialization_error(
            "change envelope needs a non-empty database and table",
        ));
    }

    let kind: RowKind = envelope.kind.parse()?;
    let record = ChangeRecord::new(
        kind,
        envelope
            .fields
            .into_iter()
            .map(|(name, value)| (name, Value::from_json(value))),
    );

    Ok(MultiplexChangeRecord::new(envelope.database, envelope.table, record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_insert() {
        let record = parse_envelope(
            r#"{"database": "db1", "table": "users", "kind": "INSERT", "fields": {"id": 1, "name": "Alice", "tags": ["a"]}}"#,
        )
        .unwrap();

        assert_eq!(record.database_name(), "db1");
        assert_eq!(record.table_name(), "users");
        assert_eq!(record.record().kind(), RowKind::Insert);
        assert_eq!(record.record().field("id"), Some(&Value::Int64(1)));
        assert_eq!(record.record().field("tags"), Some(&Value::Nested(json!(["a"]))));
    }

    #[test]
    fn test_parse_defaults_and_short_kinds() {
        let record = parse_envelope(r#"{"database": "db1", "table": "t1"}"#).unwrap();
        assert_eq!(record.record().kind(), RowKind::Insert);
        assert!(record.record().fields().is_empty());

        let record =
            parse_envelope(r#"{"database": "db1", "table": "t1", "kind": "-D", "fields": {"id": 4}}"#)
                .unwrap();
        assert_eq!(record.record().kind(), RowKind::Delete);
        assert_eq!(record.to_string(), "db1.t1 DELETE{id=4}");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_envelope("not json"),
            Err(CoreError::Serialization { .. })
        ));
        assert!(parse_envelope(r#"{"table": "t1"}"#).is_err());
        assert!(parse_envelope(r#"{"database": "", "table": "t1"}"#).is_err());
        assert!(parse_envelope(r#"{"database": "db1", "table": "t1", "kind": "TRUNCATE"}"#).is_err());
        assert!(parse_envelope(r#"{"database": "db1", "table": "t1", "fields": [1]}"#).is_err());
    }
}
