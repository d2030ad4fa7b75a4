//! Process-wide build table
//!
//! Maps build identities to their shared records. The lock guards map
//! membership only; it is never held across an await, a compile, or file I/O.
//!
//! # Reservation Protocol
//!
//! 1. `get_or_reserve` checks and inserts atomically under the lock
//! 2. The first caller gets a [`BuildTicket`] and owns the build
//! 3. Everyone else gets the shared record and waits on its signal
//! 4. The owner either completes the ticket (record stays, read-only) or
//!    fails it (record evicted, waiters released with the failure)
//!
//! Dropping a ticket without finishing it counts as a failure, so a panicking
//! or cancelled owner can never strand waiters.

use crate::build::params::{BuildIdentity, BuildParameters};
use crate::build::record::{BuildArtifact, BuildRecord, BuildState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

type Entries = HashMap<BuildIdentity, Arc<BuildRecord>>;

/// Result of looking up an identity
#[derive(Debug)]
pub enum Reservation {
    /// Caller inserted the record and must build it
    Owner(BuildTicket),
    /// Record already existed; wait on its signal
    Waiter(Arc<BuildRecord>),
}

/// Concurrent identity → record table
#[derive(Debug, Clone, Default)]
pub struct BuildTable {
    entries: Arc<Mutex<Entries>>,
}

impl BuildTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // Critical sections never panic mid-update, so a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically find the record for `params` or reserve a new one
    pub fn get_or_reserve(&self, params: BuildParameters) -> Reservation {
        let identity = params.identity();
        let mut entries = self.lock();

        if let Some(record) = entries.get(&identity) {
            debug!("Build {} already {}", identity, record.state());
            return Reservation::Waiter(Arc::clone(record));
        }

        let record = Arc::new(BuildRecord::new(identity.clone(), params));
        entries.insert(identity, Arc::clone(&record));
        drop(entries);

        Reservation::Owner(BuildTicket {
            table: self.clone(),
            record,
            finished: false,
        })
    }

    /// Current state of an identity, `None` if absent
    pub fn state(&self, identity: &BuildIdentity) -> Option<BuildState> {
        let record = self.lock().get(identity).cloned();
        record.map(|r| r.state())
    }

    /// Number of reserved or completed builds
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove `record` if the table still maps its identity to it
    fn evict(&self, record: &Arc<BuildRecord>) -> bool {
        let mut entries = self.lock();
        match entries.get(record.identity()) {
            Some(current) if Arc::ptr_eq(current, record) => {
                entries.remove(record.identity());
                true
            }
            _ => false,
        }
    }
}

/// Exclusive right to finish one reserved record
#[derive(Debug)]
pub struct BuildTicket {
    table: BuildTable,
    record: Arc<BuildRecord>,
    finished: bool,
}

impl BuildTicket {
    pub fn record(&self) -> &Arc<BuildRecord> {
        &self.record
    }

    pub fn identity(&self) -> &BuildIdentity {
        self.record.identity()
    }

    pub fn params(&self) -> &BuildParameters {
        self.record.params()
    }

    /// Publish the final outputs and wake all waiters
    pub fn complete(mut self, artifact: BuildArtifact) -> Arc<BuildArtifact> {
        self.finished = true;
        let artifact = Arc::new(artifact);
        self.record
            .publish(BuildState::Completed(Arc::clone(&artifact)));
        artifact
    }

    /// Evict the record, then release waiters with the failure
    pub fn fail(mut self, reason: impl Into<String>) {
        self.finished = true;
        self.abandon(reason.into());
    }

    fn abandon(&self, reason: String) {
        if !self.table.evict(&self.record) {
            warn!("Build {} was not in the table on failure", self.identity());
        }
        self.record.publish(BuildState::Failed(Arc::from(reason)));
    }
}

impl Drop for BuildTicket {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        warn!("Build {} abandoned by its owner", self.identity());
        self.abandon("build owner exited before publishing a result".to_string());
    }
}
