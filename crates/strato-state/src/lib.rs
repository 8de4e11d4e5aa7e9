//! strato-state — durable per-function variables for the Strato host.
//!
//! Function handlers read and write named variables (scalars and nested
//! maps) that survive across invocations. Variables are mapped onto rows
//! of a flat, partitioned table backend (see `strato-table`): each
//! hierarchy level is a [`StateNode`] — a write-back cache with a pending
//! set and tombstone set — and the whole tree is held by a [`StateStore`]
//! bound to a namespace.
//!
//! # Architecture
//!
//! Nested names are encoded into reversible flat row keys ([`keys`]), with
//! root-level entries in a marker-suffixed partition and nested entries in
//! the bare namespace partition. Reads populate the cache lazily (point
//! lookups) or in bulk (one range scan per node); mutations stay local
//! until [`flush`](StateNode::flush) commits them as a batched,
//! conflict-aware write.
//!
//! One `StateStore` serves one logical invocation at a time; concurrent
//! mutation of the same rows from other instances is detected at flush
//! time under the optimistic policy.

pub mod config;
pub mod error;
pub mod keys;
pub mod node;
pub mod store;
pub mod value;

pub use config::{BackendConfig, StoreConfig};
pub use error::{StateError, StateResult};
pub use node::StateNode;
pub use store::StateStore;
pub use value::{TypeTag, Value, Variable};

pub use strato_table::{ConflictPolicy, MemoryBackend, RedbBackend, TableBackend};
