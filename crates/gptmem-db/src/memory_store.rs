use gptmem_common::{Error, Result};
use rusqlite::{Connection, Row, params, params_from_iter};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::codec;

/// Upper bound on bound parameters per DELETE statement. Stays under the
/// 999-variable limit of older SQLite builds.
const DELETE_CHUNK_SIZE: usize = 500;

const SUMMARY_COLUMNS: &str =
    "id, text, role, ts, categories, labels, continued, level1, level2, level3, user_id";
const FULL_COLUMNS: &str =
    "id, text, role, ts, categories, labels, continued, level1, level2, level3, user_id, embedding";
const EMBEDDING_INDEX: usize = 11;

/// Insert shape for a memory record before the store assigns its id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMemoryRecord {
    pub text: String,
    pub role: String,
    pub ts: String,
    pub categories: String,
    pub labels: String,
    /// `None` is stored as SQL NULL and is distinct from an empty vector.
    pub embedding: Option<Vec<f64>>,
    /// Marks a continuation of the previous turn.
    pub continued: bool,
    pub level1: String,
    pub level2: String,
    pub level3: String,
    pub user_id: String,
}

/// A persisted memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: i64,
    pub text: String,
    pub role: String,
    pub ts: String,
    pub categories: String,
    pub labels: String,
    pub embedding: Option<Vec<f64>>,
    pub continued: bool,
    pub level1: String,
    pub level2: String,
    pub level3: String,
    pub user_id: String,
}

/// Display view of a memory record without its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySummary {
    pub id: i64,
    pub text: String,
    pub role: String,
    pub ts: String,
    pub categories: String,
    pub labels: String,
    pub continued: bool,
    pub level1: String,
    pub level2: String,
    pub level3: String,
    pub user_id: String,
}

impl MemorySummary {
    fn with_embedding(self, embedding: Option<Vec<f64>>) -> MemoryRecord {
        MemoryRecord {
            id: self.id,
            text: self.text,
            role: self.role,
            ts: self.ts,
            categories: self.categories,
            labels: self.labels,
            embedding,
            continued: self.continued,
            level1: self.level1,
            level2: self.level2,
            level3: self.level3,
            user_id: self.user_id,
        }
    }
}

/// Records returned by [`MemoryStore::read`], keyed by id and iterated
/// newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryRecords {
    records: Vec<MemoryRecord>,
    by_id: HashMap<i64, usize>,
}

impl From<Vec<MemoryRecord>> for MemoryRecords {
    fn from(records: Vec<MemoryRecord>) -> Self {
        let by_id = records
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.id, pos))
            .collect();
        Self { records, by_id }
    }
}

impl MemoryRecords {
    pub fn get(&self, id: i64) -> Option<&MemoryRecord> {
        self.by_id.get(&id).map(|&pos| &self.records[pos])
    }

    pub fn contains(&self, id: i64) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.records.iter().map(|r| r.id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MemoryRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_vec(self) -> Vec<MemoryRecord> {
        self.records
    }
}

impl IntoIterator for MemoryRecords {
    type Item = MemoryRecord;
    type IntoIter = std::vec::IntoIter<MemoryRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a MemoryRecords {
    type Item = &'a MemoryRecord;
    type IntoIter = std::slice::Iter<'a, MemoryRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// Serialized as a JSON object keyed by id, in read order.
impl Serialize for MemoryRecords {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.records.len()))?;
        for record in &self.records {
            map.serialize_entry(&record.id.to_string(), record)?;
        }
        map.end()
    }
}

/// Message records for one database connection.
pub struct MemoryStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> MemoryStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Writes a new record and returns its id.
    pub fn insert(&self, record: &NewMemoryRecord) -> Result<i64> {
        let embedding_blob = record
            .embedding
            .as_deref()
            .map(codec::encode_vector)
            .transpose()?;

        self.conn
            .execute(
                "INSERT INTO mem (
                    text, role, ts, categories, labels, embedding, continued,
                    level1, level2, level3, user_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.text,
                    record.role,
                    record.ts,
                    record.categories,
                    record.labels,
                    embedding_blob,
                    record.continued,
                    record.level1,
                    record.level2,
                    record.level3,
                    record.user_id,
                ],
            )
            .map_err(|e| Error::Database(format!("failed to insert memory record: {e}")))?;

        let id = self.conn.last_insert_rowid();
        debug!(id, user_id = %record.user_id, "inserted memory record");
        Ok(id)
    }

    /// Full records for `user_id`, newest `ts` first, at most `limit`.
    pub fn read(&self, user_id: &str, limit: usize) -> Result<MemoryRecords> {
        let rows = self.select_recent(FULL_COLUMNS, user_id, limit, |row| {
            let summary = row_to_summary(row)?;
            let blob: Option<Vec<u8>> = row.get(EMBEDDING_INDEX)?;
            Ok((summary, blob))
        })?;

        let mut records = Vec::with_capacity(rows.len());
        for (summary, blob) in rows {
            let embedding = match blob {
                Some(bytes) => Some(codec::decode_vector(&bytes).inspect_err(|e| {
                    warn!(id = summary.id, "stored embedding is unreadable: {e}");
                })?),
                None => None,
            };
            records.push(summary.with_embedding(embedding));
        }

        Ok(MemoryRecords::from(records))
    }

    /// Same filter, order and limit as [`MemoryStore::read`], without the
    /// embedding column.
    pub fn project(&self, user_id: &str, limit: usize) -> Result<Vec<MemorySummary>> {
        self.select_recent(SUMMARY_COLUMNS, user_id, limit, row_to_summary)
    }

    /// Deletes exactly the records in `ids` and returns how many were removed.
    pub fn delete(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| Error::Database(format!("failed to begin delete: {e}")))?;

        let mut deleted = 0;
        for chunk in ids.chunks(DELETE_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("DELETE FROM mem WHERE id IN ({placeholders})");
            deleted += tx
                .execute(&sql, params_from_iter(chunk.iter()))
                .map_err(|e| Error::Database(format!("failed to delete memory records: {e}")))?;
        }

        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit delete: {e}")))?;

        debug!(requested = ids.len(), deleted, "deleted memory records");
        Ok(deleted)
    }

    pub fn count(&self, user_id: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT count(*) FROM mem WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(format!("failed to count memory records: {e}")))?;
        Ok(count as usize)
    }

    fn select_recent<T>(
        &self,
        columns: &str,
        user_id: &str,
        limit: usize,
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {columns} FROM mem
                 WHERE user_id = ?1
                 ORDER BY ts DESC, id DESC
                 LIMIT ?2"
            ))
            .map_err(|e| Error::Database(format!("failed to prepare memory query: {e}")))?;

        let rows = stmt
            .query_map(params![user_id, limit], map)
            .map_err(|e| Error::Database(format!("failed to execute memory query: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect memory rows: {e}")))
    }
}

/// Parses a user-typed id list such as `"1, 2;3 4"`.
pub fn parse_id_list(input: &str) -> Result<Vec<i64>> {
    input
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<i64>()
                .map_err(|_| Error::Query(format!("invalid record id: {token:?}")))
        })
        .collect()
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<MemorySummary> {
    Ok(MemorySummary {
        id: row.get(0)?,
        text: text_column(row, 1)?,
        role: text_column(row, 2)?,
        ts: text_column(row, 3)?,
        categories: text_column(row, 4)?,
        labels: text_column(row, 5)?,
        continued: row.get::<_, Option<i64>>(6)?.unwrap_or(0) != 0,
        level1: text_column(row, 7)?,
        level2: text_column(row, 8)?,
        level3: text_column(row, 9)?,
        user_id: text_column(row, 10)?,
    })
}

// Text columns are nullable in the schema; NULL reads as an empty string.
fn text_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}
