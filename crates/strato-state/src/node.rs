//! StateNode — one level of the variable hierarchy.
//!
//! A node is a write-back cache over the rows of its level: reads populate
//! the cache lazily (point lookups) or in bulk (one range scan), mutations
//! accumulate in a pending set and a tombstone set, and `flush` commits
//! both as a single conflict-aware batch before recursing into children.
//!
//! Load states move only forward — empty, partially loaded (only requested
//! names resolved), fully loaded (one complete range scan done; cache
//! absence is authoritative) — and reset only through `clear_cache`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use strato_table::{
    ConflictPolicy, Delete, Entity, Precondition, TableBackend, Upsert, WriteBatch,
};

use crate::error::{StateError, StateResult};
use crate::keys;
use crate::value::{Value, Variable};

/// A cached entry: a scalar value or a nested node.
enum Slot {
    Scalar(Value),
    Dict(StateNode),
}

impl Slot {
    fn variable(&self) -> Variable {
        match self {
            Slot::Scalar(value) => Variable::Scalar(value.clone()),
            Slot::Dict(_) => Variable::Dictionary,
        }
    }
}

/// Write-back cache for one hierarchy level, owning its child nodes.
pub struct StateNode {
    backend: Arc<dyn TableBackend>,
    /// Partition holding this node's own rows.
    partition: String,
    /// Partition child nodes write into (differs from `partition` only at
    /// the root, whose entries live in the marker-suffixed partition).
    child_partition: String,
    /// Encoded key prefix of this node; empty at the root.
    prefix: String,
    /// Segment count of `prefix`; direct children have `depth + 1` segments.
    depth: usize,
    cache: HashMap<String, Slot>,
    /// Last-seen backend rows by name, for preconditions and change detection.
    stored: HashMap<String, Entity>,
    pending: HashSet<String>,
    tombstones: HashSet<String>,
    fully_loaded: bool,
}

impl std::fmt::Debug for StateNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateNode")
            .field("partition", &self.partition)
            .field("child_partition", &self.child_partition)
            .field("prefix", &self.prefix)
            .field("depth", &self.depth)
            .field("cache_len", &self.cache.len())
            .field("stored_len", &self.stored.len())
            .field("pending", &self.pending)
            .field("tombstones", &self.tombstones)
            .field("fully_loaded", &self.fully_loaded)
            .finish()
    }
}

impl StateNode {
    pub(crate) fn new(
        backend: Arc<dyn TableBackend>,
        partition: String,
        child_partition: String,
        prefix: String,
    ) -> Self {
        let depth = if prefix.is_empty() {
            0
        } else {
            keys::split_segments(&prefix).len()
        };
        Self {
            backend,
            partition,
            child_partition,
            prefix,
            depth,
            cache: HashMap::new(),
            stored: HashMap::new(),
            pending: HashSet::new(),
            tombstones: HashSet::new(),
            fully_loaded: false,
        }
    }

    /// Look up a name at this level.
    ///
    /// Checks the cache first; on a miss (and only while not fully loaded)
    /// issues one point lookup. Dictionary rows lazily construct a child
    /// node; descend into it with [`child`](Self::child).
    pub fn get(&mut self, name: &str) -> StateResult<Option<Variable>> {
        if self.tombstones.contains(name) {
            return Ok(None);
        }
        if let Some(slot) = self.cache.get(name) {
            return Ok(Some(slot.variable()));
        }
        if self.fully_loaded {
            return Ok(None);
        }
        let row_key = keys::compose_key(&self.prefix, name);
        match self.backend.point_get(&self.partition, &row_key)? {
            Some(entity) => self.admit(name.to_string(), entity).map(Some),
            None => Ok(None),
        }
    }

    /// Whether a name currently resolves at this level.
    pub fn contains_key(&mut self, name: &str) -> StateResult<bool> {
        Ok(self.get(name)?.is_some())
    }

    /// Write a scalar into the cache and mark it pending. No backend I/O;
    /// the value persists on the next `flush`. Overwriting a pending write
    /// replaces it, and re-adding a removed name cancels its tombstone.
    pub fn set(&mut self, name: &str, value: Value) {
        self.tombstones.remove(name);
        self.pending.insert(name.to_string());
        self.cache.insert(name.to_string(), Slot::Scalar(value));
    }

    /// Remove a name if it exists. Returns `false` for names with no prior
    /// existence. Existing names are cleared locally and tombstoned for
    /// deletion at the next `flush`.
    pub fn remove(&mut self, name: &str) -> StateResult<bool> {
        if self.tombstones.contains(name) {
            return Ok(false);
        }
        // Resolve first: a backend-only row must land in `stored` so the
        // flush can stage its delete with the right version.
        if self.get(name)?.is_none() {
            return Ok(false);
        }
        self.cache.remove(name);
        self.pending.remove(name);
        self.tombstones.insert(name.to_string());
        Ok(true)
    }

    /// The nested dictionary under `name`, created lazily on first use.
    ///
    /// Creation touches no backend rows; a marker row is staged for the
    /// next `flush` and the child only reaches the backend through its own
    /// operations. A scalar already cached under the name is a mismatch.
    pub fn child(&mut self, name: &str) -> StateResult<&mut StateNode> {
        self.tombstones.remove(name);
        if !self.cache.contains_key(name) {
            let row_key = keys::compose_key(&self.prefix, name);
            let node = StateNode::new(
                Arc::clone(&self.backend),
                self.child_partition.clone(),
                self.child_partition.clone(),
                row_key,
            );
            self.cache.insert(name.to_string(), Slot::Dict(node));
            // A marker row must be flushed unless the backend already
            // holds one under this name.
            let marker_stored = self
                .stored
                .get(name)
                .is_some_and(|prev| prev.type_tag.is_none());
            if !marker_stored {
                self.pending.insert(name.to_string());
            }
        }
        match self.cache.get_mut(name) {
            Some(Slot::Dict(node)) => Ok(node),
            _ => Err(StateError::TypeMismatch {
                key: keys::compose_key(&self.prefix, name),
                detail: "name holds a scalar, not a dictionary".to_string(),
            }),
        }
    }

    /// Every entry at this level, sorted by name, tombstoned names excluded.
    ///
    /// The first call performs the node's one range scan and merges the
    /// rows into the cache; later calls reuse the cached view until
    /// `clear_cache`.
    pub fn enumerate(&mut self) -> StateResult<Vec<(String, Variable)>> {
        self.load_all()?;
        let mut entries: Vec<_> = self
            .cache
            .iter()
            .map(|(name, slot)| (name.clone(), slot.variable()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// Number of entries at this level (forces the one-time full load).
    pub fn len(&mut self) -> StateResult<usize> {
        self.load_all()?;
        Ok(self.cache.len())
    }

    pub fn is_empty(&mut self) -> StateResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every entry at this level: pending writes are discarded and
    /// every stored name is tombstoned (after a full load, so none escape).
    pub fn clear(&mut self) -> StateResult<()> {
        self.load_all()?;
        self.pending.clear();
        self.cache.clear();
        let names: Vec<String> = self.stored.keys().cloned().collect();
        self.tombstones.extend(names);
        Ok(())
    }

    /// Commit pending writes and tombstones as one batch, then flush every
    /// child with the same policy.
    ///
    /// Under [`ConflictPolicy::Optimistic`] each staged row carries its
    /// last-seen version; a concurrent modification fails the whole batch
    /// with [`StateError::Conflict`], leaving pending and tombstone sets
    /// intact so a retry reproduces the same batch. Child conflicts are
    /// aggregated after every child has been attempted.
    pub fn flush(&mut self, policy: ConflictPolicy) -> StateResult<()> {
        let mut batch = WriteBatch::default();
        // Staged upserts by name, so returned versions map back to `stored`.
        let mut staged_upserts: Vec<(String, String)> = Vec::new();
        let mut staged_deletes: Vec<String> = Vec::new();

        let mut pending_names: Vec<&String> = self.pending.iter().collect();
        pending_names.sort();
        for name in pending_names {
            let row_key = keys::compose_key(&self.prefix, name);
            match self.cache.get(name) {
                Some(Slot::Scalar(value)) => {
                    let payload = value.encode();
                    let tag = value.tag().as_str().to_string();
                    if let Some(prev) = self.stored.get(name) {
                        // Unchanged from what the backend already holds.
                        if prev.type_tag.as_deref() == Some(tag.as_str())
                            && prev.value == payload
                        {
                            continue;
                        }
                    }
                    let precondition = match self.stored.get(name) {
                        Some(prev) => Precondition::Version(prev.version),
                        None => Precondition::Absent,
                    };
                    batch.upserts.push(Upsert {
                        row_key: row_key.clone(),
                        value: payload,
                        type_tag: Some(tag),
                        precondition,
                    });
                    staged_upserts.push((name.clone(), row_key));
                }
                Some(Slot::Dict(_)) => {
                    match self.stored.get(name) {
                        // Marker row already present.
                        Some(prev) if prev.type_tag.is_none() => continue,
                        // Replacing a known scalar row with a dictionary.
                        Some(prev) => batch.upserts.push(Upsert {
                            row_key: row_key.clone(),
                            value: serde_json::Value::Null,
                            type_tag: None,
                            precondition: Precondition::Version(prev.version),
                        }),
                        // Markers carry no data; racing creators converge.
                        None => batch.upserts.push(Upsert {
                            row_key: row_key.clone(),
                            value: serde_json::Value::Null,
                            type_tag: None,
                            precondition: Precondition::Any,
                        }),
                    }
                    staged_upserts.push((name.clone(), row_key));
                }
                None => {}
            }
        }

        let mut tombstone_names: Vec<&String> = self.tombstones.iter().collect();
        tombstone_names.sort();
        for name in tombstone_names {
            // Tombstones without a stored identity never reached the
            // backend; clearing the set below is all they need.
            if let Some(prev) = self.stored.get(name) {
                batch.deletes.push(Delete {
                    row_key: prev.row_key.clone(),
                    precondition: Precondition::Version(prev.version),
                });
                staged_deletes.push(name.clone());
            }
        }

        if !batch.is_empty() {
            debug!(
                prefix = %self.describe(),
                upserts = batch.upserts.len(),
                deletes = batch.deletes.len(),
                "flushing node batch"
            );
            match self.backend.batch_write(&self.partition, batch, policy) {
                Ok(versions) => {
                    let by_row: HashMap<String, u64> = versions.into_iter().collect();
                    for (name, row_key) in staged_upserts {
                        if let Some(version) = by_row.get(&row_key) {
                            let (payload, tag) = match self.cache.get(&name) {
                                Some(Slot::Scalar(value)) => {
                                    (value.encode(), Some(value.tag().as_str().to_string()))
                                }
                                _ => (serde_json::Value::Null, None),
                            };
                            self.stored.insert(
                                name,
                                Entity {
                                    partition: self.partition.clone(),
                                    row_key,
                                    value: payload,
                                    type_tag: tag,
                                    version: *version,
                                },
                            );
                        }
                    }
                    for name in staged_deletes {
                        self.stored.remove(&name);
                    }
                }
                Err(strato_table::TableError::Conflict(detail)) => {
                    return Err(StateError::Conflict(format!(
                        "{}: {detail}",
                        self.describe()
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.pending.clear();
        self.tombstones.clear();

        let mut conflicts = Vec::new();
        for slot in self.cache.values_mut() {
            if let Slot::Dict(node) = slot {
                match node.flush(policy) {
                    Ok(()) => {}
                    Err(StateError::Conflict(path)) => conflicts.push(path),
                    Err(e) => return Err(e),
                }
            }
        }
        if !conflicts.is_empty() {
            return Err(StateError::Conflict(conflicts.join(", ")));
        }
        Ok(())
    }

    /// Discard cached values, children, stored row snapshots, and the
    /// fully-loaded flag, forcing fresh reads on next access. Entries with
    /// unflushed local changes are preserved, so pending work survives a
    /// conflict-recovery cycle. Since a pending value shadows point
    /// lookups, refresh row versions afterwards with `enumerate` before
    /// re-flushing optimistically.
    pub fn clear_cache(&mut self) {
        let pending = &self.pending;
        self.cache.retain(|name, slot| {
            pending.contains(name) || matches!(slot, Slot::Dict(node) if node.is_dirty())
        });
        for slot in self.cache.values_mut() {
            if let Slot::Dict(node) = slot {
                node.clear_cache();
            }
        }
        self.stored.clear();
        self.fully_loaded = false;
    }

    /// Whether this node or any cached descendant has unflushed changes.
    fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
            || !self.tombstones.is_empty()
            || self
                .cache
                .values()
                .any(|slot| matches!(slot, Slot::Dict(node) if node.is_dirty()))
    }

    /// Decode a fetched row into the cache and record its stored identity.
    fn admit(&mut self, name: String, entity: Entity) -> StateResult<Variable> {
        let variable = match &entity.type_tag {
            Some(tag) => {
                let value = Value::decode(tag, &entity.value).map_err(|detail| {
                    StateError::TypeMismatch {
                        key: entity.row_key.clone(),
                        detail,
                    }
                })?;
                self.cache.insert(name.clone(), Slot::Scalar(value.clone()));
                Variable::Scalar(value)
            }
            None => {
                let node = StateNode::new(
                    Arc::clone(&self.backend),
                    self.child_partition.clone(),
                    self.child_partition.clone(),
                    entity.row_key.clone(),
                );
                self.cache.insert(name.clone(), Slot::Dict(node));
                Variable::Dictionary
            }
        };
        self.stored.insert(name, entity);
        Ok(variable)
    }

    /// Populate the cache with one range scan, at most once.
    fn load_all(&mut self) -> StateResult<()> {
        if self.fully_loaded {
            return Ok(());
        }
        let entities = if self.prefix.is_empty() {
            // Root entries fill their whole partition.
            self.backend.range_scan(&self.partition, "", None)?
        } else {
            let (lower, upper) = keys::range_bounds(&self.prefix);
            self.backend
                .range_scan(&self.partition, &lower, Some(&upper))?
        };

        let mut merged = 0usize;
        for entity in entities {
            let segments = keys::split_segments(&entity.row_key);
            // Deeper descendant rows load lazily at their own level.
            if segments.len() != self.depth + 1 {
                continue;
            }
            let name = match segments.last() {
                Some(leaf) => keys::unescape(leaf),
                None => continue,
            };
            // Local unflushed state wins over the scanned row; an already
            // cached child keeps its node (only the snapshot refreshes).
            let keep =
                self.pending.contains(&name)
                    || self.tombstones.contains(&name)
                    || matches!(self.cache.get(&name), Some(Slot::Dict(_)));
            if keep {
                self.stored.insert(name, entity);
                continue;
            }
            self.admit(name, entity)?;
            merged += 1;
        }
        debug!(prefix = %self.describe(), merged, "node fully loaded");
        self.fully_loaded = true;
        Ok(())
    }

    fn describe(&self) -> &str {
        if self.prefix.is_empty() {
            "<root>"
        } else {
            &self.prefix
        }
    }
}
