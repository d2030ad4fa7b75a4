//! Build coordination
//!
//! Turns a raw request into a finished artifact, compiling each distinct
//! build identity at most once at a time no matter how many identical
//! requests arrive concurrently.
//!
//! The owner's work runs in a spawned task holding the [`BuildTicket`], so a
//! caller that goes away mid-build does not cancel a build other requests may
//! be waiting on.

use crate::audit::AuditLog;
use crate::backend::{BuildJob, CompilerBackend};
use crate::build::params::{BuildIdentity, BuildRequest, RequestNormalizer};
use crate::build::paths::{ArtifactPathAllocator, ArtifactPaths};
use crate::build::record::{BuildArtifact, BuildRecord};
use crate::build::table::{BuildTable, BuildTicket, Reservation};
use crate::config::Config;
use crate::error::{KilnError, KilnResult};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether the caller triggered the build or reused it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildOutcome {
    /// This caller reserved and built the artifact
    Created,
    /// Artifact was built (or being built) by someone else
    Existing,
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Existing => write!(f, "existing"),
        }
    }
}

/// Completed build as seen by one caller
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// Shared record for the identity
    pub record: Arc<BuildRecord>,
    /// Published outputs
    pub artifact: Arc<BuildArtifact>,
    /// How this caller got the artifact
    pub outcome: BuildOutcome,
}

impl BuildResult {
    pub fn identity(&self) -> &BuildIdentity {
        self.record.identity()
    }
}

/// Orchestrates lookup, reservation, compilation and waiting
///
/// Construct once and share; clones use the same build table.
#[derive(Clone)]
pub struct BuildCoordinator {
    table: BuildTable,
    normalizer: Arc<RequestNormalizer>,
    allocator: ArtifactPathAllocator,
    backend: Arc<dyn CompilerBackend>,
    artifact_ttl: Duration,
    audit: AuditLog,
}

impl BuildCoordinator {
    /// Create a coordinator with a 24 hour artifact TTL and no audit log
    pub fn new(
        normalizer: RequestNormalizer,
        allocator: ArtifactPathAllocator,
        backend: Arc<dyn CompilerBackend>,
    ) -> Self {
        Self {
            table: BuildTable::new(),
            normalizer: Arc::new(normalizer),
            allocator,
            backend,
            artifact_ttl: Duration::hours(24),
            audit: AuditLog::disabled(),
        }
    }

    /// Create a coordinator from configuration
    pub fn from_config(config: &Config, backend: Arc<dyn CompilerBackend>) -> Self {
        Self::new(
            RequestNormalizer::from_config(&config.features),
            ArtifactPathAllocator::from_config(config),
            backend,
        )
        .with_artifact_ttl(Duration::hours(i64::from(config.storage.artifact_ttl_hours)))
        .with_audit(AuditLog::new(config))
    }

    pub fn with_artifact_ttl(mut self, ttl: Duration) -> Self {
        self.artifact_ttl = ttl;
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn table(&self) -> &BuildTable {
        &self.table
    }

    pub fn normalizer(&self) -> &RequestNormalizer {
        &self.normalizer
    }

    /// Resolve a request to a completed artifact
    ///
    /// Invalid requests fail before the table is touched. The first caller
    /// for an identity builds it; everyone else waits for that build.
    pub async fn request(&self, request: &BuildRequest) -> KilnResult<BuildResult> {
        self.normalizer.validate(request)?;
        let params = self.normalizer.normalize(request);

        match self.table.get_or_reserve(params) {
            Reservation::Owner(ticket) => {
                let record = Arc::clone(ticket.record());
                info!(
                    "Reserved build {} ({}/{})",
                    record.identity(),
                    record.params().os,
                    record.params().arch
                );

                let artifact = tokio::spawn(self.clone().run_build(ticket))
                    .await
                    .map_err(|e| KilnError::BuildFailed {
                        identity: record.identity().to_string(),
                        reason: format!("build task did not finish: {}", e),
                    })??;

                Ok(BuildResult {
                    record,
                    artifact,
                    outcome: BuildOutcome::Created,
                })
            }
            Reservation::Waiter(record) => {
                debug!("Waiting on build {}", record.identity());
                let artifact = record.wait().await?;

                Ok(BuildResult {
                    record,
                    artifact,
                    outcome: BuildOutcome::Existing,
                })
            }
        }
    }

    /// Owner side: compile, then complete or fail the ticket
    async fn run_build(self, ticket: BuildTicket) -> KilnResult<Arc<BuildArtifact>> {
        let identity = ticket.identity().clone();
        let params = ticket.params();
        self.audit
            .log(
                "build.reserved",
                &serde_json::json!({
                    "identity": identity,
                    "os": params.os,
                    "arch": params.arch,
                    "variant": params.variant,
                    "features": params.features,
                }),
            )
            .await;

        match self.produce(&ticket).await {
            Ok(artifact) => {
                let artifact = ticket.complete(artifact);
                info!(
                    "Build {} completed at {}",
                    artifact.archive_filename,
                    artifact.dir.display()
                );
                self.audit
                    .log(
                        "build.completed",
                        &serde_json::json!({
                            "identity": identity,
                            "archive": artifact.archive_path,
                            "expires_at": artifact.expires_at.to_rfc3339(),
                        }),
                    )
                    .await;
                Ok(artifact)
            }
            Err(e) => {
                warn!("Build {} failed: {}", identity, e);
                ticket.fail(e.to_string());
                self.audit
                    .log(
                        "build.failed",
                        &serde_json::json!({
                            "identity": identity,
                            "error": e.to_string(),
                        }),
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// Allocate storage and compile into it
    ///
    /// A failed attempt's directory is removed before the error is returned.
    async fn produce(&self, ticket: &BuildTicket) -> KilnResult<BuildArtifact> {
        let paths = self.allocator.allocate(ticket.params()).await?;
        let dir = paths.dir.clone();

        match self.compile_into(ticket, paths).await {
            Ok(artifact) => Ok(artifact),
            Err(e) => {
                discard_attempt(&dir).await;
                Err(e)
            }
        }
    }

    /// Invoke the backend and confirm the outputs
    async fn compile_into(
        &self,
        ticket: &BuildTicket,
        paths: ArtifactPaths,
    ) -> KilnResult<BuildArtifact> {
        let job = BuildJob {
            identity: ticket.identity().clone(),
            params: ticket.params().clone(),
            paths,
        };

        debug!(
            "Compiling {} with {} backend",
            job.identity,
            self.backend.backend_name()
        );
        self.backend.compile(&job).await?;

        confirm_output(&job.paths.binary_path).await?;
        confirm_output(&job.paths.archive_path).await?;

        let completed_at = Utc::now();
        Ok(BuildArtifact {
            dir: job.paths.dir,
            binary_path: job.paths.binary_path,
            archive_path: job.paths.archive_path,
            archive_filename: job.paths.archive_filename,
            completed_at,
            expires_at: completed_at
                .checked_add_signed(self.artifact_ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        })
    }
}

/// Fail unless `path` is a readable regular file
async fn confirm_output(path: &Path) -> KilnResult<()> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| KilnError::storage(path, format!("expected build output: {}", e)))?;
    let metadata = file
        .metadata()
        .await
        .map_err(|e| KilnError::storage(path, format!("reading build output: {}", e)))?;

    if !metadata.is_file() {
        return Err(KilnError::storage(path, "expected build output is not a file"));
    }
    Ok(())
}

/// Remove a failed attempt's directory and anything the backend left in it
async fn discard_attempt(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!("Removed failed attempt directory {}", dir.display()),
        Err(e) => warn!(
            "Failed to remove attempt directory {}: {}",
            dir.display(),
            e
        ),
    }
}
