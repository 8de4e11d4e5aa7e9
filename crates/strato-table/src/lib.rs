//! strato-table — partitioned table-backend contract for the Strato state store.
//!
//! The state store is written against the [`TableBackend`] trait only: point
//! lookup, ascending range scan, and all-or-nothing batched writes within a
//! single partition. Two adapters satisfy the contract out of the box:
//!
//! - [`MemoryBackend`] — `BTreeMap`-per-partition behind an `RwLock`, for
//!   tests and ephemeral hosts.
//! - [`RedbBackend`] — durable embedded storage backed by
//!   [redb](https://docs.rs/redb), one composite-keyed table, rows
//!   JSON-serialized into the `&[u8]` value column.
//!
//! Any other implementation of the trait (a distributed table service client,
//! for instance) is a valid substitute.

pub mod backend;
pub mod error;
pub mod memory;
pub mod redb_backend;

pub use backend::{
    ConflictPolicy, Delete, Entity, Precondition, TableBackend, Upsert, WriteBatch,
};
pub use error::{TableError, TableResult};
pub use memory::MemoryBackend;
pub use redb_backend::RedbBackend;
