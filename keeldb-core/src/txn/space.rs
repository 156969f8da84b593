//! Spaces: the transaction manager's view of the storage engine
//!
//! A space is one logical tuple container. The engine that actually
//! indexes and stores tuples sits behind [`TupleStore`]; this module
//! only carries what the transaction protocol needs: the replace
//! entry point, the temporary flag, and the `on_replace` observers.

use super::Txn;
use crate::{Result, SpaceId, Tuple};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// How a replace treats an existing tuple with the same key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DupReplaceMode {
    /// The tuple must not exist yet
    DupInsert,
    /// The tuple must already exist
    DupReplace,
    /// Insert or replace, whichever applies
    DupReplaceOrInsert,
}

/// The storage engine interface the transaction manager consumes.
///
/// `replace` applies the mutation immediately and returns whatever
/// tuple it displaced, so the caller can undo the mutation later.
pub trait TupleStore: Send + Sync {
    fn replace(
        &self,
        old: Option<&Tuple>,
        new: Option<&Tuple>,
        mode: DupReplaceMode,
    ) -> Result<Option<Tuple>>;
}

/// Observer invoked synchronously after a replace is staged.
///
/// Observers run in registration order and must not mutate the
/// transaction's tuples.
pub type ReplaceObserver = Box<dyn Fn(&Txn) + Send + Sync>;

/// One logical tuple container
pub struct Space {
    id: SpaceId,
    name: String,
    temporary: bool,
    run_triggers: AtomicBool,
    store: Box<dyn TupleStore>,
    on_replace: RwLock<Vec<ReplaceObserver>>,
}

impl Space {
    /// Create a space backed by the given engine
    pub fn new(id: SpaceId, name: impl Into<String>, store: Box<dyn TupleStore>) -> Self {
        Self {
            id,
            name: name.into(),
            temporary: false,
            run_triggers: AtomicBool::new(true),
            store,
            on_replace: RwLock::new(Vec::new()),
        }
    }

    /// Mark the space temporary: its mutations commit without a WAL
    /// append
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    /// Space id
    pub fn id(&self) -> SpaceId {
        self.id
    }

    /// Space name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether mutations to this space skip the WAL
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Enable or disable `on_replace` observers, e.g. while replaying
    /// the log
    pub fn set_run_triggers(&self, run: bool) {
        self.run_triggers.store(run, Ordering::Relaxed);
    }

    /// Whether `on_replace` observers currently run
    pub fn run_triggers(&self) -> bool {
        self.run_triggers.load(Ordering::Relaxed)
    }

    /// Register an `on_replace` observer
    pub fn on_replace(&self, observer: ReplaceObserver) {
        self.on_replace.write().push(observer);
    }

    pub(crate) fn replace(
        &self,
        old: Option<&Tuple>,
        new: Option<&Tuple>,
        mode: DupReplaceMode,
    ) -> Result<Option<Tuple>> {
        self.store.replace(old, new, mode)
    }

    pub(crate) fn run_replace_observers(&self, txn: &Txn) {
        if !self.run_triggers() {
            return;
        }
        for observer in self.on_replace.read().iter() {
            observer(txn);
        }
    }
}

impl std::fmt::Debug for Space {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Space")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("temporary", &self.temporary)
            .finish_non_exhaustive()
    }
}
