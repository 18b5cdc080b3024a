//! The `KnowledgeBase` facade: sessions, commits, and queries.
//!
//! A `KnowledgeBase` is an explicitly constructed handle over one schema,
//! one store, and an optional durable journal. There is no process-global
//! instance; embedders create it at startup and pass it by reference.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use tkb_journal::{CommitLog, JournalConfig};
use tkb_schema::SchemaRepository;
use tkb_store::{
    CommitRecord, KnowledgeAssociation, KnowledgeItem, KnowledgeStore, StoreRecord,
};
use tkb_types::{BranchId, ObjectKey, Revision, RevisionInfo, TypeName};

use crate::config::StoreConfig;
use crate::error::TxnError;
use crate::transaction::Transaction;

/// The session, query, and branch surface of one store instance.
pub struct KnowledgeBase {
    schema: Arc<SchemaRepository>,
    store: Arc<KnowledgeStore>,
    journal: Option<CommitLog>,
    /// One commit lock per branch: only the critical section that validates
    /// conflicts and allocates the next revision is serialized.
    commit_locks: Mutex<HashMap<BranchId, Arc<Mutex<()>>>>,
    default_author: String,
}

impl KnowledgeBase {
    /// Open a knowledge base. With a configured journal path, previously
    /// journaled history is recovered and replayed before the call returns.
    pub fn open(schema: Arc<SchemaRepository>, config: StoreConfig) -> Result<Self, TxnError> {
        let store = Arc::new(KnowledgeStore::new(Arc::clone(&schema)));

        let journal = match &config.journal_path {
            Some(path) => {
                let log = CommitLog::open(
                    path,
                    JournalConfig {
                        sync_mode: config.sync_mode,
                    },
                )?;
                let records = log.recover()?;
                for record in &records {
                    store.apply(record)?;
                }
                info!(records = records.len(), path = %path.display(), "journal recovered");
                Some(log)
            }
            None => None,
        };

        Ok(Self {
            schema,
            store,
            journal,
            commit_locks: Mutex::new(HashMap::new()),
            default_author: config.default_author,
        })
    }

    /// An in-memory knowledge base without a journal.
    pub fn in_memory(schema: Arc<SchemaRepository>) -> Self {
        Self {
            store: Arc::new(KnowledgeStore::new(Arc::clone(&schema))),
            schema,
            journal: None,
            commit_locks: Mutex::new(HashMap::new()),
            default_author: StoreConfig::default().default_author,
        }
    }

    pub fn schema(&self) -> &Arc<SchemaRepository> {
        &self.schema
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    // ---------------------------------------------------------------
    // Session contract
    // ---------------------------------------------------------------

    /// Begin a transaction on the branch, snapshotting its current head as
    /// the read revision.
    pub fn begin(&self, branch: BranchId) -> Result<Transaction, TxnError> {
        self.begin_as(branch, self.default_author.clone())
    }

    /// Begin a transaction with an explicit author.
    pub fn begin_as(
        &self,
        branch: BranchId,
        author: impl Into<String>,
    ) -> Result<Transaction, TxnError> {
        let read_revision = self.store.head(branch)?;
        Ok(Transaction::new(
            Arc::clone(&self.store),
            branch,
            read_revision,
            author.into(),
        ))
    }

    /// Commit a transaction: validate staged writes against the current
    /// branch state, allocate the next revision, journal it, and publish.
    ///
    /// First committer wins. If any staged write targets an object that was
    /// superseded after the read revision, the whole transaction fails with
    /// [`TxnError::Conflict`] naming the offenders and nothing is applied.
    /// An empty transaction is a no-op returning the current head.
    pub fn commit(&self, txn: Transaction) -> Result<Revision, TxnError> {
        let branch = txn.branch();
        let lock = self.branch_lock(branch);
        let _guard = lock.lock().expect("commit lock poisoned");

        let mut conflicts = Vec::new();
        for id in txn.conflict_candidates() {
            if let Some(changed) = self.store.latest_change(branch, id)? {
                if changed > txn.read_revision() {
                    conflicts.push(id);
                }
            }
        }
        if !conflicts.is_empty() {
            warn!(
                branch = %branch,
                txn = %txn.id(),
                objects = conflicts.len(),
                "commit conflict; transaction aborted"
            );
            return Err(TxnError::Conflict { objects: conflicts });
        }

        if txn.is_empty() {
            debug!(branch = %branch, txn = %txn.id(), "empty transaction; nothing to commit");
            return Ok(self.store.head(branch)?);
        }

        let revision = self.store.next_revision(branch)?;
        let parts = txn.into_parts();
        let record = StoreRecord::Commit(CommitRecord {
            branch,
            revision,
            info: RevisionInfo {
                author: parts.author,
                timestamp: Utc::now(),
                message: parts.message,
            },
            events: parts.events,
        });

        // Durability before visibility: a journal failure leaves the
        // transaction not committed.
        if let Some(journal) = &self.journal {
            journal.append(&record)?;
        }
        self.store.apply(&record)?;

        info!(branch = %branch, revision = %revision, "transaction committed");
        Ok(revision)
    }

    /// Discard a transaction's staged writes. Always succeeds; dropping the
    /// handle without calling this has the same effect.
    pub fn rollback(&self, txn: Transaction) {
        debug!(branch = %txn.branch(), txn = %txn.id(), staged = txn.staged_len(), "transaction rolled back");
        drop(txn);
    }

    // ---------------------------------------------------------------
    // Query contract
    // ---------------------------------------------------------------

    pub fn resolve(&self, key: &ObjectKey) -> Result<Option<KnowledgeItem>, TxnError> {
        Ok(self.store.resolve(key)?)
    }

    pub fn get(&self, key: &ObjectKey) -> Result<KnowledgeItem, TxnError> {
        Ok(self.store.get(key)?)
    }

    pub fn outgoing(
        &self,
        key: &ObjectKey,
        assoc_type: &TypeName,
    ) -> Result<Vec<KnowledgeAssociation>, TxnError> {
        Ok(self.store.outgoing(key, assoc_type)?)
    }

    pub fn incoming(
        &self,
        key: &ObjectKey,
        assoc_type: &TypeName,
    ) -> Result<Vec<KnowledgeAssociation>, TxnError> {
        Ok(self.store.incoming(key, assoc_type)?)
    }

    // ---------------------------------------------------------------
    // Branches
    // ---------------------------------------------------------------

    pub fn head(&self, branch: BranchId) -> Result<Revision, TxnError> {
        Ok(self.store.head(branch)?)
    }

    /// Fork a new branch off `parent` at `at`. The fork is journaled like a
    /// commit so a recovered store reproduces the branch tree.
    pub fn fork_branch(&self, parent: BranchId, at: Revision) -> Result<BranchId, TxnError> {
        // Serialize with commits on the parent so the fork point is stable.
        let lock = self.branch_lock(parent);
        let _guard = lock.lock().expect("commit lock poisoned");

        let branch = self.store.fork_branch(parent, at)?;
        if let Some(journal) = &self.journal {
            journal.append(&StoreRecord::Fork {
                branch,
                parent,
                fork_revision: at,
            })?;
        }
        Ok(branch)
    }

    fn branch_lock(&self, branch: BranchId) -> Arc<Mutex<()>> {
        let mut locks = self.commit_locks.lock().expect("lock table poisoned");
        Arc::clone(locks.entry(branch).or_default())
    }
}
