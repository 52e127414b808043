use gptmem_common::{Error, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::codec;

/// Insert shape for a log entry. The three structured fields are always
/// encoded, including when they are `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub ts: String,
    pub decay_weights: Value,
    pub feedback: Option<String>,
    pub inputs: Value,
    pub outputs: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub ts: String,
    pub decay_weights: Value,
    pub feedback: Option<String>,
    pub inputs: Value,
    pub outputs: Value,
}

/// Columns of the `log` table that an update may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogField {
    Ts,
    DecayWeights,
    Feedback,
    Inputs,
    Outputs,
}

impl LogField {
    pub const ALL: [LogField; 5] = [
        Self::Ts,
        Self::DecayWeights,
        Self::Feedback,
        Self::Inputs,
        Self::Outputs,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Self::Ts => "ts",
            Self::DecayWeights => "decay_weights",
            Self::Feedback => "feedback",
            Self::Inputs => "inputs",
            Self::Outputs => "outputs",
        }
    }
}

impl FromStr for LogField {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.column() == name)
            .ok_or_else(|| Error::UnknownField(format!("log has no updatable field {name:?}")))
    }
}

impl fmt::Display for LogField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A partial update of one log entry. Only fields set to `Some` are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogUpdate {
    pub ts: Option<String>,
    pub decay_weights: Option<Value>,
    pub feedback: Option<String>,
    pub inputs: Option<Value>,
    pub outputs: Option<Value>,
}

impl LogUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ts(mut self, ts: impl Into<String>) -> Self {
        self.ts = Some(ts.into());
        self
    }

    pub fn decay_weights(mut self, value: Value) -> Self {
        self.decay_weights = Some(value);
        self
    }

    pub fn feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }

    pub fn inputs(mut self, value: Value) -> Self {
        self.inputs = Some(value);
        self
    }

    pub fn outputs(mut self, value: Value) -> Self {
        self.outputs = Some(value);
        self
    }

    /// Sets a field by column name. Names outside [`LogField::ALL`] are
    /// rejected with [`Error::UnknownField`].
    pub fn set(self, name: &str, value: Value) -> Result<Self> {
        let field: LogField = name.parse()?;
        Ok(match field {
            LogField::Ts => self.ts(expect_text(field, value)?),
            LogField::Feedback => self.feedback(expect_text(field, value)?),
            LogField::DecayWeights => self.decay_weights(value),
            LogField::Inputs => self.inputs(value),
            LogField::Outputs => self.outputs(value),
        })
    }

    /// Fields this update will write, in column order.
    pub fn fields(&self) -> Vec<LogField> {
        LogField::ALL
            .into_iter()
            .filter(|field| match field {
                LogField::Ts => self.ts.is_some(),
                LogField::DecayWeights => self.decay_weights.is_some(),
                LogField::Feedback => self.feedback.is_some(),
                LogField::Inputs => self.inputs.is_some(),
                LogField::Outputs => self.outputs.is_some(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    fn assignments(&self) -> Result<Vec<(LogField, SqlValue)>> {
        let mut out = Vec::new();
        if let Some(ts) = &self.ts {
            out.push((LogField::Ts, SqlValue::Text(ts.clone())));
        }
        if let Some(value) = &self.decay_weights {
            out.push((LogField::DecayWeights, SqlValue::Blob(codec::encode_document(value)?)));
        }
        if let Some(feedback) = &self.feedback {
            out.push((LogField::Feedback, SqlValue::Text(feedback.clone())));
        }
        if let Some(value) = &self.inputs {
            out.push((LogField::Inputs, SqlValue::Blob(codec::encode_document(value)?)));
        }
        if let Some(value) = &self.outputs {
            out.push((LogField::Outputs, SqlValue::Blob(codec::encode_document(value)?)));
        }
        Ok(out)
    }
}

fn expect_text(field: LogField, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(Error::Query(format!(
            "log field {field} takes a string, got {other}"
        ))),
    }
}

/// Learning-log entries for one database connection.
pub struct LogStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> LogStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Writes a new entry and returns its id.
    pub fn insert(&self, entry: &NewLogEntry) -> Result<i64> {
        let decay_weights = codec::encode_document(&entry.decay_weights)?;
        let inputs = codec::encode_document(&entry.inputs)?;
        let outputs = codec::encode_document(&entry.outputs)?;

        self.conn
            .execute(
                "INSERT INTO log (ts, decay_weights, feedback, inputs, outputs)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![entry.ts, decay_weights, entry.feedback, inputs, outputs],
            )
            .map_err(|e| Error::Database(format!("failed to insert log entry: {e}")))?;

        let id = self.conn.last_insert_rowid();
        debug!(id, "inserted log entry");
        Ok(id)
    }

    /// Applies `update` to entry `log_id` in a single statement.
    ///
    /// Returns [`Error::NotFound`] when no entry has that id.
    pub fn update(&self, log_id: i64, update: &LogUpdate) -> Result<()> {
        let assignments = update.assignments()?;
        if assignments.is_empty() {
            return Err(Error::Query(format!("update of log {log_id} names no fields")));
        }

        let set_clause = assignments
            .iter()
            .enumerate()
            .map(|(i, (field, _))| format!("{} = ?{}", field.column(), i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE log SET {set_clause} WHERE id = ?{}",
            assignments.len() + 1
        );

        let mut values: Vec<SqlValue> = assignments.into_iter().map(|(_, v)| v).collect();
        values.push(SqlValue::Integer(log_id));

        let changed = self
            .conn
            .execute(&sql, params_from_iter(values))
            .map_err(|e| Error::Database(format!("failed to update log entry: {e}")))?;

        if changed == 0 {
            return Err(Error::NotFound(format!("log entry {log_id}")));
        }

        debug!(id = log_id, fields = ?update.fields(), "updated log entry");
        Ok(())
    }

    pub fn get(&self, log_id: i64) -> Result<Option<LogEntry>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, ts, decay_weights, feedback, inputs, outputs FROM log WHERE id = ?1",
                params![log_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<Vec<u8>>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<Vec<u8>>>(4)?,
                        row.get::<_, Option<Vec<u8>>>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| Error::Database(format!("failed to read log entry: {e}")))?;

        let Some((id, ts, decay_weights, feedback, inputs, outputs)) = raw else {
            return Ok(None);
        };

        Ok(Some(LogEntry {
            id,
            ts: ts.unwrap_or_default(),
            decay_weights: decode_blob(decay_weights.as_deref())?,
            feedback,
            inputs: decode_blob(inputs.as_deref())?,
            outputs: decode_blob(outputs.as_deref())?,
        }))
    }
}

fn decode_blob(blob: Option<&[u8]>) -> Result<Value> {
    match blob {
        Some(bytes) => codec::decode_document(bytes),
        None => Ok(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::{LogField, LogUpdate, NewLogEntry};
    use crate::Database;
    use gptmem_common::Error;
    use serde_json::{Value, json};

    fn entry(ts: &str) -> NewLogEntry {
        NewLogEntry {
            ts: ts.to_string(),
            decay_weights: json!({"recency": 0.8, "relevance": 0.2}),
            feedback: None,
            inputs: json!(["what did I say yesterday?"]),
            outputs: json!({"picked": [3, 7]}),
        }
    }

    #[test]
    fn insert_and_get_round_trip() {
        let db = Database::in_memory().expect("failed to create in-memory database");
        let logs = db.logs();

        let id = logs.insert(&entry("2024-01-01T00:00:00")).expect("insert should succeed");
        let stored = logs.get(id).expect("get should succeed").expect("entry should exist");

        assert_eq!(stored.id, id);
        assert_eq!(stored.ts, "2024-01-01T00:00:00");
        assert_eq!(stored.decay_weights, json!({"recency": 0.8, "relevance": 0.2}));
        assert_eq!(stored.feedback, None);
        assert_eq!(stored.inputs, json!(["what did I say yesterday?"]));
        assert_eq!(stored.outputs, json!({"picked": [3, 7]}));

        assert!(logs.get(id + 1).expect("get should succeed").is_none());
    }

    #[test]
    fn null_structures_are_still_stored_as_blobs() {
        let db = Database::in_memory().expect("failed to create in-memory database");
        let id = db
            .logs()
            .insert(&NewLogEntry {
                ts: "2024-01-01T00:00:00".to_string(),
                ..Default::default()
            })
            .expect("insert should succeed");

        let null_blobs: i64 = db
            .connection()
            .query_row(
                "SELECT count(*) FROM log
                 WHERE id = ?1 AND (decay_weights IS NULL OR inputs IS NULL OR outputs IS NULL)",
                [id],
                |row| row.get(0),
            )
            .expect("count query should succeed");
        assert_eq!(null_blobs, 0);

        let stored = db.logs().get(id).expect("get should succeed").expect("entry should exist");
        assert!(stored.decay_weights.is_null());
        assert!(stored.inputs.is_null());
        assert!(stored.outputs.is_null());
    }

    #[test]
    fn update_touches_only_named_fields() {
        let db = Database::in_memory().expect("failed to create in-memory database");
        let logs = db.logs();

        let id = logs
            .insert(&NewLogEntry {
                feedback: Some("meh".to_string()),
                ..entry("2024-01-01T00:00:00")
            })
            .expect("insert should succeed");
        let before = logs.get(id).expect("get should succeed").expect("entry should exist");

        logs.update(id, &LogUpdate::new().decay_weights(json!([0.1, 0.9])))
            .expect("update should succeed");

        let after = logs.get(id).expect("get should succeed").expect("entry should exist");
        assert_eq!(after.decay_weights, json!([0.1, 0.9]));
        assert_eq!(after.ts, before.ts);
        assert_eq!(after.feedback, before.feedback);
        assert_eq!(after.inputs, before.inputs);
        assert_eq!(after.outputs, before.outputs);
    }

    #[test]
    fn feedback_update_leaves_other_entries_unchanged() {
        let db = Database::in_memory().expect("failed to create in-memory database");
        let logs = db.logs();

        let first = logs.insert(&entry("2024-01-01T00:00:00")).expect("insert should succeed");
        let second = logs.insert(&entry("2024-01-02T00:00:00")).expect("insert should succeed");
        assert_eq!((first, second), (1, 2));

        let untouched = logs.get(2).expect("get should succeed");
        logs.update(1, &LogUpdate::new().feedback("good"))
            .expect("update should succeed");

        assert_eq!(
            logs.get(1).expect("get should succeed").and_then(|e| e.feedback),
            Some("good".to_string())
        );
        assert_eq!(logs.get(2).expect("get should succeed"), untouched);
    }

    #[test]
    fn update_writes_several_fields_at_once() {
        let db = Database::in_memory().expect("failed to create in-memory database");
        let logs = db.logs();
        let id = logs.insert(&entry("2024-01-01T00:00:00")).expect("insert should succeed");

        let update = LogUpdate::new()
            .ts("2024-02-01T00:00:00")
            .inputs(Value::Null)
            .outputs(json!("done"));
        assert_eq!(
            update.fields(),
            vec![LogField::Ts, LogField::Inputs, LogField::Outputs]
        );
        logs.update(id, &update).expect("update should succeed");

        let stored = logs.get(id).expect("get should succeed").expect("entry should exist");
        assert_eq!(stored.ts, "2024-02-01T00:00:00");
        assert!(stored.inputs.is_null());
        assert_eq!(stored.outputs, json!("done"));
        assert_eq!(stored.decay_weights, json!({"recency": 0.8, "relevance": 0.2}));
    }

    #[test]
    fn set_rejects_names_outside_allow_list() {
        for name in ["id", "feedback = 'x', ts", "Feedback", ""] {
            match LogUpdate::new().set(name, json!("x")) {
                Err(Error::UnknownField(_)) => {}
                other => panic!("expected unknown field for {name:?}, got {other:?}"),
            }
        }

        let update = LogUpdate::new()
            .set("feedback", json!("fine"))
            .and_then(|u| u.set("decay_weights", json!({"a": 1})))
            .expect("known names should be accepted");
        assert_eq!(update.fields(), vec![LogField::DecayWeights, LogField::Feedback]);
    }

    #[test]
    fn text_fields_require_strings() {
        assert!(matches!(
            LogUpdate::new().set("ts", json!(42)),
            Err(Error::Query(_))
        ));
        assert!(matches!(
            LogUpdate::new().set("feedback", Value::Null),
            Err(Error::Query(_))
        ));
    }

    #[test]
    fn update_of_missing_entry_is_not_found() {
        let db = Database::in_memory().expect("failed to create in-memory database");
        match db.logs().update(42, &LogUpdate::new().feedback("lost")) {
            Err(Error::NotFound(_)) => {}
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn empty_update_is_rejected() {
        let db = Database::in_memory().expect("failed to create in-memory database");
        let id = db
            .logs()
            .insert(&entry("2024-01-01T00:00:00"))
            .expect("insert should succeed");

        assert!(LogUpdate::new().is_empty());
        assert!(matches!(
            db.logs().update(id, &LogUpdate::new()),
            Err(Error::Query(_))
        ));
    }

    #[test]
    fn field_names_parse_back_to_themselves() {
        for field in LogField::ALL {
            let parsed: LogField = field.column().parse().expect("column name should parse");
            assert_eq!(parsed, field);
            assert_eq!(field.to_string(), field.column());
        }
    }
}
