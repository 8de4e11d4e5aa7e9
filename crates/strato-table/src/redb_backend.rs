//! Durable table backend over an embedded redb database.
//!
//! All partitions share one redb table. The redb key is the partition and
//! row key joined by a unit separator (`\u{1f}`), which sorts below every
//! printable character, so rows of one partition are contiguous and a scan
//! bounded by the separator's successor never crosses into a sibling
//! partition. Row payloads are JSON-serialized [`StoredRow`]s.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::backend::{ConflictPolicy, Entity, StoredRow, TableBackend, WriteBatch};
use crate::error::{TableError, TableResult};

/// Convert any `Display` error into a `TableError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| TableError::$variant(e.to_string())
    };
}

const ROWS: TableDefinition<&str, &[u8]> = TableDefinition::new("rows");

/// Joins partition and row key; must never occur in either.
const PART_SEP: char = '\u{1f}';
/// Successor of `PART_SEP`; upper bound for whole-partition scans.
const PART_END: char = '\u{20}';

fn row_id(partition: &str, row_key: &str) -> String {
    format!("{partition}{PART_SEP}{row_key}")
}

/// Embedded, durable backend. `Clone`-free by design; share via `Arc`.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open (or create) a database file at the given path.
    pub fn open(path: &Path) -> TableResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        debug!(?path, "table backend opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Ephemeral in-memory database (for testing the adapter itself).
    pub fn in_memory() -> TableResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        debug!("in-memory table backend opened");
        Ok(Self { db: Arc::new(db) })
    }

    fn decode_row(id: &str, bytes: &[u8]) -> TableResult<StoredRow> {
        serde_json::from_slice(bytes)
            .map_err(|e| TableError::Deserialize(format!("row `{id}`: {e}")))
    }
}

impl TableBackend for RedbBackend {
    fn ensure_table(&self) -> TableResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ROWS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn point_get(&self, partition: &str, row_key: &str) -> TableResult<Option<Entity>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ROWS).map_err(map_err!(Table))?;
        let id = row_id(partition, row_key);
        match table.get(id.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let stored = Self::decode_row(&id, guard.value())?;
                Ok(Some(Entity {
                    partition: partition.to_string(),
                    row_key: row_key.to_string(),
                    value: stored.value,
                    type_tag: stored.type_tag,
                    version: stored.version,
                }))
            }
            None => Ok(None),
        }
    }

    fn range_scan(
        &self,
        partition: &str,
        lower: &str,
        upper: Option<&str>,
    ) -> TableResult<Vec<Entity>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ROWS).map_err(map_err!(Table))?;

        let start = row_id(partition, lower);
        let end = match upper {
            Some(u) => row_id(partition, u),
            None => format!("{partition}{PART_END}"),
        };

        let mut entities = Vec::new();
        let iter = table
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?;
        for entry in iter {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let id = key.value();
            let stored = Self::decode_row(id, value.value())?;
            let row_key = id
                .split_once(PART_SEP)
                .map(|(_, rk)| rk.to_string())
                .unwrap_or_default();
            entities.push(Entity {
                partition: partition.to_string(),
                row_key,
                value: stored.value,
                type_tag: stored.type_tag,
                version: stored.version,
            });
        }
        Ok(entities)
    }

    fn batch_write(
        &self,
        partition: &str,
        batch: WriteBatch,
        policy: ConflictPolicy,
    ) -> TableResult<Vec<(String, u64)>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut versions = Vec::with_capacity(batch.upserts.len());
        {
            let mut table = txn.open_table(ROWS).map_err(map_err!(Table))?;

            // A failed precondition returns before commit, so the dropped
            // transaction rolls the whole batch back.
            for upsert in &batch.upserts {
                let id = row_id(partition, &upsert.row_key);
                let existing = match table.get(id.as_str()).map_err(map_err!(Read))? {
                    Some(guard) => Some(Self::decode_row(&id, guard.value())?.version),
                    None => None,
                };
                if policy == ConflictPolicy::Optimistic
                    && !upsert.precondition.admits(existing)
                {
                    return Err(TableError::Conflict(format!(
                        "row `{}` expected {:?}, found {:?}",
                        upsert.row_key, upsert.precondition, existing
                    )));
                }
                let next = existing.map_or(1, |v| v + 1);
                let stored = StoredRow {
                    value: upsert.value.clone(),
                    type_tag: upsert.type_tag.clone(),
                    version: next,
                };
                let bytes = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
                table
                    .insert(id.as_str(), bytes.as_slice())
                    .map_err(map_err!(Write))?;
                versions.push((upsert.row_key.clone(), next));
            }

            for delete in &batch.deletes {
                let id = row_id(partition, &delete.row_key);
                let existing = match table.get(id.as_str()).map_err(map_err!(Read))? {
                    Some(guard) => Some(Self::decode_row(&id, guard.value())?.version),
                    None => None,
                };
                if policy == ConflictPolicy::Optimistic
                    && !delete.precondition.admits(existing)
                {
                    return Err(TableError::Conflict(format!(
                        "row `{}` expected {:?}, found {:?}",
                        delete.row_key, delete.precondition, existing
                    )));
                }
                table.remove(id.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;

        debug!(
            partition,
            upserts = versions.len(),
            deletes = batch.deletes.len(),
            "batch committed"
        );
        Ok(versions)
    }
}
