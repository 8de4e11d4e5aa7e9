//! The table-backend contract.
//!
//! A backend exposes a flat, partitioned row space. Row keys sort
//! lexicographically within a partition; batched writes are atomic within
//! one partition and carry per-row preconditions for optimistic concurrency.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::TableResult;

/// One persisted row.
///
/// `type_tag == None` marks a dictionary row: the row asserts that a nested
/// level exists under `row_key` but carries no scalar payload of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub partition: String,
    pub row_key: String,
    /// Backend-native scalar payload (`Null` for dictionary rows).
    pub value: JsonValue,
    /// Scalar type tag; absent for dictionary rows.
    pub type_tag: Option<String>,
    /// Concurrency token, bumped by the backend on every successful write.
    pub version: u64,
}

/// Conflict handling selected per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Honor every mutation's [`Precondition`]; fail the whole batch on any
    /// mismatch.
    Optimistic,
    /// Ignore preconditions and overwrite unconditionally.
    Force,
}

/// Per-mutation expectation about the row's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// The row must not exist.
    Absent,
    /// The row must exist at exactly this version.
    Version(u64),
    /// No expectation.
    Any,
}

impl Precondition {
    /// Whether the precondition admits a row currently at `existing` version.
    pub fn admits(&self, existing: Option<u64>) -> bool {
        match self {
            Precondition::Absent => existing.is_none(),
            Precondition::Version(expected) => existing == Some(*expected),
            Precondition::Any => true,
        }
    }
}

/// A staged insert-or-update.
#[derive(Debug, Clone)]
pub struct Upsert {
    pub row_key: String,
    pub value: JsonValue,
    pub type_tag: Option<String>,
    pub precondition: Precondition,
}

/// A staged delete.
#[derive(Debug, Clone)]
pub struct Delete {
    pub row_key: String,
    pub precondition: Precondition,
}

/// A batch of mutations against one partition.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub upserts: Vec<Upsert>,
    pub deletes: Vec<Delete>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletes.len()
    }
}

/// Row payload as adapters persist it (everything but the keys).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredRow {
    pub value: JsonValue,
    pub type_tag: Option<String>,
    pub version: u64,
}

/// Point lookup, range scan, and batched conditional writes over a
/// partitioned flat key space.
///
/// Scans promise ascending row-key order and a half-open interval, nothing
/// more: they are restartable by re-issuing the call and may interleave with
/// concurrent writers. Batches are all-or-nothing within one partition.
pub trait TableBackend: Send + Sync {
    /// Create the backing container if it does not exist yet. Idempotent;
    /// an already-existing container is success, not an error.
    fn ensure_table(&self) -> TableResult<()>;

    /// Fetch a single row, or `None` if absent.
    fn point_get(&self, partition: &str, row_key: &str) -> TableResult<Option<Entity>>;

    /// All rows in `[lower, upper)` within the partition, ascending by row
    /// key. `upper == None` scans to the end of the partition.
    fn range_scan(
        &self,
        partition: &str,
        lower: &str,
        upper: Option<&str>,
    ) -> TableResult<Vec<Entity>>;

    /// Apply a batch atomically within one partition. Under
    /// [`ConflictPolicy::Optimistic`], every mutation's precondition is
    /// checked before anything is applied and any mismatch fails the whole
    /// batch with [`TableError::Conflict`](crate::TableError::Conflict).
    /// Returns the new version of every upserted row.
    fn batch_write(
        &self,
        partition: &str,
        batch: WriteBatch,
        policy: ConflictPolicy,
    ) -> TableResult<Vec<(String, u64)>>;
}
