//! StateStore — the namespace-bound facade host code holds.
//!
//! Binds a root [`StateNode`] to a namespace and performs the one-time
//! idempotent backend-container setup at construction. Handlers receive a
//! `StateStore`, call the same get/set/child/enumerate/flush surface the
//! nodes expose, and drop it (unflushed) to abandon a session without
//! touching the backend.

use std::sync::Arc;

use tracing::debug;

use strato_table::{ConflictPolicy, TableBackend};

use crate::config::StoreConfig;
use crate::error::{StateError, StateResult};
use crate::node::StateNode;
use crate::value::{Value, Variable};

/// Suffix deriving the root-entry partition from the namespace. Root-level
/// entries live in `{namespace}#root`; nested entries share the bare
/// `{namespace}` partition, where row-key range bounds separate subtrees.
const ROOT_PARTITION_SUFFIX: &str = "#root";

/// Characters a namespace must not contain: the partition marker and the
/// adapter-level partition separator.
const RESERVED_NAMESPACE_CHARS: [char; 2] = ['#', '\u{1f}'];

/// Durable per-function variable store for one namespace.
pub struct StateStore {
    namespace: String,
    root: StateNode,
}

impl StateStore {
    /// Build a store from configuration, connecting the configured backend.
    pub fn open(config: &StoreConfig) -> StateResult<Self> {
        let backend = config.backend.connect()?;
        Self::with_backend(&config.namespace, backend)
    }

    /// Build a store over an already-constructed backend.
    ///
    /// Ensures the backing container exists (tolerating prior existence)
    /// before any row access.
    pub fn with_backend(
        namespace: &str,
        backend: Arc<dyn TableBackend>,
    ) -> StateResult<Self> {
        validate_namespace(namespace)?;
        backend.ensure_table()?;
        let root = StateNode::new(
            backend,
            format!("{namespace}{ROOT_PARTITION_SUFFIX}"),
            namespace.to_string(),
            String::new(),
        );
        debug!(namespace, "state store opened");
        Ok(Self {
            namespace: namespace.to_string(),
            root,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Seed root-level variables with their initial values and persist them
    /// immediately, overwriting any existing rows. Used by host bootstrap
    /// when a function declares initial state.
    pub fn seed<I>(&mut self, variables: I) -> StateResult<()>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut count = 0usize;
        for (name, value) in variables {
            self.root.set(&name, value);
            count += 1;
        }
        debug!(namespace = %self.namespace, count, "seeding initial state");
        self.root.flush(ConflictPolicy::Force)
    }

    // The store surface is the root node's surface.

    pub fn get(&mut self, name: &str) -> StateResult<Option<Variable>> {
        self.root.get(name)
    }

    pub fn contains_key(&mut self, name: &str) -> StateResult<bool> {
        self.root.contains_key(name)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.root.set(name, value);
    }

    pub fn remove(&mut self, name: &str) -> StateResult<bool> {
        self.root.remove(name)
    }

    pub fn child(&mut self, name: &str) -> StateResult<&mut StateNode> {
        self.root.child(name)
    }

    pub fn enumerate(&mut self) -> StateResult<Vec<(String, Variable)>> {
        self.root.enumerate()
    }

    pub fn len(&mut self) -> StateResult<usize> {
        self.root.len()
    }

    pub fn is_empty(&mut self) -> StateResult<bool> {
        self.root.is_empty()
    }

    pub fn clear(&mut self) -> StateResult<()> {
        self.root.clear()
    }

    pub fn flush(&mut self, policy: ConflictPolicy) -> StateResult<()> {
        self.root.flush(policy)
    }

    pub fn clear_cache(&mut self) {
        self.root.clear_cache();
    }
}

pub(crate) fn validate_namespace(namespace: &str) -> Result<(), StateError> {
    if namespace.is_empty() {
        return Err(StateError::Config("namespace must not be empty".to_string()));
    }
    if namespace.contains(RESERVED_NAMESPACE_CHARS) {
        return Err(StateError::Config(format!(
            "namespace `{namespace}` contains a reserved character"
        )));
    }
    Ok(())
}
