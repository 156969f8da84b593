//! Transaction manager
//!
//! A transaction applies its mutation to the storage engine in memory
//! first, then durably appends a redo row through the WAL, and only a
//! successful append makes the mutation count as committed. The WAL
//! append is the single suspension point of the protocol, so the order
//! in which appends complete is the serialization order between
//! cooperative tasks.
//!
//! Each task owns one [`TxnContext`] and may have at most one open
//! transaction; `begin` inside an open transaction is a programming
//! error and panics. Commit and rollback hooks must not fail: a panic
//! inside one is an invariant violation, not a reportable error.

mod space;

pub use space::{DupReplaceMode, ReplaceObserver, Space, TupleStore};

use crate::wal::Row;
use crate::{config, Error, Result, SpaceId, Tuple};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Whether mutations are written to the WAL at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalMode {
    /// No redo rows are built or appended; durability is off
    None,
    /// Every mutation is appended before commit
    #[default]
    Write,
}

/// Transaction manager configuration
#[derive(Debug, Clone)]
pub struct TxnConfig {
    /// Durability mode
    pub wal_mode: WalMode,
    /// WAL appends slower than this are logged as warnings
    pub too_long_threshold: Duration,
}

impl Default for TxnConfig {
    fn default() -> Self {
        Self {
            wal_mode: WalMode::default(),
            too_long_threshold: Duration::from_millis(config::TOO_LONG_THRESHOLD_MS),
        }
    }
}

/// The WAL-append interface commit relies on.
///
/// `append` returns once the row is durable and may suspend the
/// calling task while it waits on I/O.
pub trait WalSink {
    fn append(&self, row: &Row) -> Result<()>;
}

/// Optional sink for the committed tuple, used to hand a result back
/// to the caller
pub trait TuplePort {
    fn add_tuple(&mut self, tuple: &Tuple);
}

/// Mutations a request can stage; the durable redo payload is this
/// value, serialized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestOp {
    Insert { space_id: SpaceId, tuple: Vec<u8> },
    Replace { space_id: SpaceId, tuple: Vec<u8> },
    Delete { space_id: SpaceId, key: Vec<u8> },
}

impl RequestOp {
    /// Row tag identifying the request type in the log
    pub fn tag(&self) -> u16 {
        match self {
            RequestOp::Insert { .. } => 1,
            RequestOp::Replace { .. } => 2,
            RequestOp::Delete { .. } => 3,
        }
    }

    /// Space the request targets
    pub fn space_id(&self) -> SpaceId {
        match self {
            RequestOp::Insert { space_id, .. }
            | RequestOp::Replace { space_id, .. }
            | RequestOp::Delete { space_id, .. } => *space_id,
        }
    }
}

/// One originating request
#[derive(Debug, Clone)]
pub struct Request {
    /// The mutation to stage
    pub op: RequestOp,
    /// Origin cookie, recorded in the redo row
    pub cookie: u64,
    /// Pre-built redo row; set for requests replayed from the log,
    /// which must not be re-encoded
    pub header: Option<Row>,
}

/// Hook run after commit or rollback. Must not fail.
pub type TxnHook = Box<dyn FnOnce(&Txn) + Send>;

/// One open transaction
pub struct Txn {
    old_tuple: Option<Tuple>,
    new_tuple: Option<Tuple>,
    space: Option<Arc<Space>>,
    redo: Option<Row>,
    on_commit: Vec<TxnHook>,
    on_rollback: Vec<TxnHook>,
}

impl Txn {
    fn new() -> Self {
        Self {
            old_tuple: None,
            new_tuple: None,
            space: None,
            redo: None,
            on_commit: Vec::new(),
            on_rollback: Vec::new(),
        }
    }

    /// Tuple displaced by the staged mutation, if any
    pub fn old_tuple(&self) -> Option<&Tuple> {
        self.old_tuple.as_ref()
    }

    /// Tuple installed by the staged mutation, if any
    pub fn new_tuple(&self) -> Option<&Tuple> {
        self.new_tuple.as_ref()
    }

    /// Space the staged mutation targets
    pub fn space(&self) -> Option<&Arc<Space>> {
        self.space.as_ref()
    }

    /// Redo row built for the staged mutation
    pub fn redo(&self) -> Option<&Row> {
        self.redo.as_ref()
    }

    /// Register a hook to run after a successful commit
    pub fn on_commit(&mut self, hook: TxnHook) {
        self.on_commit.push(hook);
    }

    /// Register a hook to run after a rollback
    pub fn on_rollback(&mut self, hook: TxnHook) {
        self.on_rollback.push(hook);
    }

    fn result_tuple(&self) -> Option<&Tuple> {
        self.new_tuple.as_ref().or(self.old_tuple.as_ref())
    }
}

/// Per-task transaction slot and commit/rollback protocol
pub struct TxnContext {
    config: TxnConfig,
    current: Option<Txn>,
}

impl TxnContext {
    /// Create a context with no open transaction
    pub fn new(config: TxnConfig) -> Self {
        Self {
            config,
            current: None,
        }
    }

    /// Whether a transaction is currently open
    pub fn in_txn(&self) -> bool {
        self.current.is_some()
    }

    /// The open transaction, if any
    pub fn current(&self) -> Option<&Txn> {
        self.current.as_ref()
    }

    /// Open a transaction and install it as current.
    ///
    /// # Panics
    ///
    /// Panics if a transaction is already open: this protocol does not
    /// support nested transactions.
    pub fn begin(&mut self) -> &mut Txn {
        assert!(self.current.is_none(), "nested transaction begin");
        self.current.insert(Txn::new())
    }

    /// Apply a mutation to the storage engine and record how to undo
    /// it.
    ///
    /// The mutation is applied immediately, before durability; commit
    /// later gates visibility on the WAL append, and rollback reverses
    /// this apply. Runs the space's `on_replace` observers unless they
    /// are disabled.
    ///
    /// # Panics
    ///
    /// Panics when no transaction is open or when both tuples are
    /// absent.
    pub fn stage_replace(
        &mut self,
        space: &Arc<Space>,
        old: Option<Tuple>,
        new: Option<Tuple>,
        mode: DupReplaceMode,
    ) -> Result<()> {
        assert!(
            old.is_some() || new.is_some(),
            "replace requires an old or a new tuple"
        );
        let txn = self
            .current
            .as_mut()
            .expect("stage_replace outside a transaction");

        // Remember what the engine actually displaced, not what the
        // caller claimed, so rollback never removes a tuple staged by
        // someone else.
        txn.old_tuple = space.replace(old.as_ref(), new.as_ref(), mode)?;
        txn.new_tuple = new;
        txn.space = Some(Arc::clone(space));

        space.run_replace_observers(txn);
        Ok(())
    }

    /// Derive the durable redo row from the originating request.
    ///
    /// Requests replayed from recovery already carry their row and are
    /// not re-encoded. Skipped entirely when durability is off.
    pub fn build_redo(&mut self, request: &Request) -> Result<()> {
        let txn = self
            .current
            .as_mut()
            .expect("build_redo outside a transaction");
        if let Some(row) = &request.header {
            txn.redo = Some(row.clone());
            return Ok(());
        }
        if self.config.wal_mode == WalMode::None {
            return Ok(());
        }
        let payload =
            bincode::serialize(&request.op).map_err(|e| Error::Serialization(e.to_string()))?;
        txn.redo = Some(Row {
            lsn: 0, // assigned by the WAL writer on append
            tm: now_tm(),
            tag: request.op.tag(),
            cookie: request.cookie,
            payload: Bytes::from(payload),
        });
        Ok(())
    }

    /// Commit the transaction: durably append the redo row, then run
    /// hooks and publish the result.
    ///
    /// On a failed append the transaction stays open and un-committed
    /// with its in-memory mutation still applied; the caller decides
    /// between retrying `commit` and calling [`rollback`]. No hooks
    /// run in that case.
    ///
    /// [`rollback`]: TxnContext::rollback
    ///
    /// # Panics
    ///
    /// Panics when no transaction is open, or when a mutation needs
    /// logging but `build_redo` was never called.
    pub fn commit(&mut self, wal: &dyn WalSink, port: Option<&mut dyn TuplePort>) -> Result<()> {
        let txn = self.current.as_ref().expect("commit outside a transaction");
        let must_log = (txn.old_tuple.is_some() || txn.new_tuple.is_some())
            && txn.space.as_ref().is_some_and(|s| !s.is_temporary())
            && self.config.wal_mode != WalMode::None;

        if must_log {
            let row = txn.redo.as_ref().expect("commit before build_redo");
            let start = Instant::now();
            let result = wal.append(row);
            let elapsed = start.elapsed();
            if elapsed > self.config.too_long_threshold {
                warn!(
                    tag = row.tag,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "slow WAL append"
                );
            }
            result.map_err(|e| Error::Durability(e.to_string()))?;
        }

        let mut txn = self.current.take().expect("commit outside a transaction");
        let hooks = mem::take(&mut txn.on_commit);
        for hook in hooks {
            hook(&txn); // must not fail
        }
        if let Some(port) = port {
            if let Some(tuple) = txn.result_tuple() {
                port.add_tuple(tuple);
            }
        }
        // Dropping the txn releases the old tuple's reference and the
        // transaction's scratch.
        Ok(())
    }

    /// Undo the staged mutation and destroy the transaction.
    ///
    /// Reapplies the inverse replace in the storage engine, runs the
    /// rollback hooks and releases the new tuple's reference. Calling
    /// this with no open transaction is a silent no-op.
    pub fn rollback(&mut self) {
        let Some(mut txn) = self.current.take() else {
            return;
        };
        if txn.old_tuple.is_some() || txn.new_tuple.is_some() {
            let space = txn
                .space
                .as_ref()
                .expect("staged transaction without a space");
            // The inverse of a mutation the engine already accepted
            // must be accepted too.
            space
                .replace(
                    txn.new_tuple.as_ref(),
                    txn.old_tuple.as_ref(),
                    DupReplaceMode::DupInsert,
                )
                .expect("rollback replace must not fail");
            let hooks = mem::take(&mut txn.on_rollback);
            for hook in hooks {
                hook(&txn); // must not fail
            }
        }
        // The new tuple's reference drops with the txn.
    }
}

fn now_tm() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
