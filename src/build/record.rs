//! Build records and their completion signal
//!
//! A record's outputs live inside the terminal [`BuildState`] carried by its
//! completion signal. Nothing can read a path or expiry before the owner
//! publishes them, so waiters never see a half-written record.

use crate::build::params::{BuildIdentity, BuildParameters};
use crate::error::{KilnError, KilnResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Final outputs of a completed build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildArtifact {
    /// Attempt directory holding both files
    pub dir: PathBuf,
    /// Raw compiled binary
    pub binary_path: PathBuf,
    /// Packaged archive
    pub archive_path: PathBuf,
    /// Download file name of the archive
    pub archive_filename: String,
    /// When the build finished
    pub completed_at: DateTime<Utc>,
    /// When clients should consider the artifact stale
    pub expires_at: DateTime<Utc>,
}

impl BuildArtifact {
    /// Name of the attempt directory
    pub fn dir_name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Value carried by a record's completion signal
#[derive(Debug, Clone)]
pub enum BuildState {
    /// Reserved, compilation in progress
    Pending,
    /// Finished; all outputs are final and on disk
    Completed(Arc<BuildArtifact>),
    /// Owner gave up; the record has been evicted from the table
    Failed(Arc<str>),
}

impl BuildState {
    /// Whether the signal has fired
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "reserved"),
            Self::Completed(_) => write!(f, "completed"),
            Self::Failed(_) => write!(f, "failed"),
        }
    }
}

/// Shared record for one build identity
#[derive(Debug)]
pub struct BuildRecord {
    identity: BuildIdentity,
    params: BuildParameters,
    reserved_at: DateTime<Utc>,
    signal: watch::Sender<BuildState>,
}

impl BuildRecord {
    pub(crate) fn new(identity: BuildIdentity, params: BuildParameters) -> Self {
        let (signal, _) = watch::channel(BuildState::Pending);
        Self {
            identity,
            params,
            reserved_at: Utc::now(),
            signal,
        }
    }

    pub fn identity(&self) -> &BuildIdentity {
        &self.identity
    }

    pub fn params(&self) -> &BuildParameters {
        &self.params
    }

    pub fn reserved_at(&self) -> DateTime<Utc> {
        self.reserved_at
    }

    /// Snapshot of the current state
    pub fn state(&self) -> BuildState {
        self.signal.borrow().clone()
    }

    /// Wait for the completion signal and return the published outputs
    ///
    /// Returns immediately if the signal already fired.
    pub async fn wait(&self) -> KilnResult<Arc<BuildArtifact>> {
        let mut rx = self.signal.subscribe();
        let state = rx
            .wait_for(BuildState::is_terminal)
            .await
            .map_err(|_| KilnError::ConcurrencyHazard(self.identity.to_string()))?
            .clone();

        match state {
            BuildState::Completed(artifact) => Ok(artifact),
            BuildState::Failed(reason) => Err(KilnError::BuildFailed {
                identity: self.identity.to_string(),
                reason: reason.to_string(),
            }),
            BuildState::Pending => Err(KilnError::ConcurrencyHazard(self.identity.to_string())),
        }
    }

    /// Fire the signal. Only the first terminal state is kept.
    pub(crate) fn publish(&self, state: BuildState) -> bool {
        self.signal.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            *current = state;
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record() -> BuildRecord {
        let params = BuildParameters {
            os: "linux".to_string(),
            arch: "amd64".to_string(),
            variant: None,
            features: vec![],
        };
        BuildRecord::new(params.identity(), params)
    }

    fn artifact() -> BuildArtifact {
        let dir = PathBuf::from("/builds/260101000000123");
        BuildArtifact {
            binary_path: dir.join("build_linux_amd64_custom"),
            archive_path: dir.join("build_linux_amd64_custom.zip"),
            archive_filename: "build_linux_amd64_custom.zip".to_string(),
            dir,
            completed_at: Utc::now(),
            expires_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn waiters_wake_on_completion() {
        let record = Arc::new(record());

        let waiter = {
            let record = record.clone();
            tokio::spawn(async move { record.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        assert!(record.publish(BuildState::Completed(Arc::new(artifact()))));

        let published = waiter.await.unwrap().unwrap();
        assert_eq!(published.dir_name(), "260101000000123");
    }

    #[tokio::test]
    async fn late_waiter_returns_immediately() {
        let record = record();
        record.publish(BuildState::Completed(Arc::new(artifact())));

        let published = record.wait().await.unwrap();
        assert_eq!(published.archive_filename, "build_linux_amd64_custom.zip");
    }

    #[tokio::test]
    async fn failure_is_reported_to_waiters() {
        let record = record();
        record.publish(BuildState::Failed(Arc::from("exit code 2")));

        let err = record.wait().await.unwrap_err();
        assert!(matches!(err, KilnError::BuildFailed { .. }));
        assert!(err.to_string().contains("exit code 2"));
    }

    #[test]
    fn signal_fires_once() {
        let record = record();
        assert!(record.publish(BuildState::Failed(Arc::from("first"))));
        assert!(!record.publish(BuildState::Completed(Arc::new(artifact()))));
        assert!(matches!(record.state(), BuildState::Failed(_)));
        assert_eq!(record.state().to_string(), "failed");
    }
}
