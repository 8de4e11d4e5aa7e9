//! In-memory table backend for tests and ephemeral hosts.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::RwLock;

use tracing::debug;

use crate::backend::{ConflictPolicy, Entity, StoredRow, TableBackend, WriteBatch};
use crate::error::{TableError, TableResult};

/// `BTreeMap`-per-partition store behind an `RwLock`.
///
/// Versions are per-row monotonic counters, so two handles over the same
/// backend observe each other's writes exactly like two processes over a
/// shared table service.
#[derive(Default)]
pub struct MemoryBackend {
    partitions: RwLock<HashMap<String, BTreeMap<String, StoredRow>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held in a partition (test observability).
    pub fn partition_len(&self, partition: &str) -> usize {
        self.partitions
            .read()
            .map_or(0, |partitions| partitions.get(partition).map_or(0, BTreeMap::len))
    }
}

impl TableBackend for MemoryBackend {
    fn ensure_table(&self) -> TableResult<()> {
        Ok(())
    }

    fn point_get(&self, partition: &str, row_key: &str) -> TableResult<Option<Entity>> {
        let partitions = self
            .partitions
            .read()
            .map_err(|e| TableError::Read(e.to_string()))?;
        let row = partitions
            .get(partition)
            .and_then(|rows| rows.get(row_key));
        Ok(row.map(|stored| Entity {
            partition: partition.to_string(),
            row_key: row_key.to_string(),
            value: stored.value.clone(),
            type_tag: stored.type_tag.clone(),
            version: stored.version,
        }))
    }

    fn range_scan(
        &self,
        partition: &str,
        lower: &str,
        upper: Option<&str>,
    ) -> TableResult<Vec<Entity>> {
        let partitions = self
            .partitions
            .read()
            .map_err(|e| TableError::Read(e.to_string()))?;
        let Some(rows) = partitions.get(partition) else {
            return Ok(Vec::new());
        };
        let upper_bound = match upper {
            Some(u) => Bound::Excluded(u.to_string()),
            None => Bound::Unbounded,
        };
        let entities = rows
            .range((Bound::Included(lower.to_string()), upper_bound))
            .map(|(row_key, stored)| Entity {
                partition: partition.to_string(),
                row_key: row_key.clone(),
                value: stored.value.clone(),
                type_tag: stored.type_tag.clone(),
                version: stored.version,
            })
            .collect();
        Ok(entities)
    }

    fn batch_write(
        &self,
        partition: &str,
        batch: WriteBatch,
        policy: ConflictPolicy,
    ) -> TableResult<Vec<(String, u64)>> {
        let mut partitions = self
            .partitions
            .write()
            .map_err(|e| TableError::Write(e.to_string()))?;
        let rows = partitions.entry(partition.to_string()).or_default();

        // Validate every precondition before applying anything, so a
        // mid-batch mismatch leaves the partition untouched.
        if policy == ConflictPolicy::Optimistic {
            for upsert in &batch.upserts {
                let existing = rows.get(&upsert.row_key).map(|r| r.version);
                if !upsert.precondition.admits(existing) {
                    return Err(TableError::Conflict(format!(
                        "row `{}` expected {:?}, found {:?}",
                        upsert.row_key, upsert.precondition, existing
                    )));
                }
            }
            for delete in &batch.deletes {
                let existing = rows.get(&delete.row_key).map(|r| r.version);
                if !delete.precondition.admits(existing) {
                    return Err(TableError::Conflict(format!(
                        "row `{}` expected {:?}, found {:?}",
                        delete.row_key, delete.precondition, existing
                    )));
                }
            }
        }

        let mut versions = Vec::with_capacity(batch.upserts.len());
        for upsert in batch.upserts {
            let next = rows.get(&upsert.row_key).map_or(1, |r| r.version + 1);
            rows.insert(
                upsert.row_key.clone(),
                StoredRow {
                    value: upsert.value,
                    type_tag: upsert.type_tag,
                    version: next,
                },
            );
            versions.push((upsert.row_key, next));
        }
        for delete in &batch.deletes {
            rows.remove(&delete.row_key);
        }

        debug!(
            partition,
            upserts = versions.len(),
            deletes = batch.deletes.len(),
            "batch applied"
        );
        Ok(versions)
    }
}
