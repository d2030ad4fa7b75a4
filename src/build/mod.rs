//! Build coordination
//!
//! Turns raw requests into canonical build parameters, deduplicates
//! concurrent requests for the same identity, and hands the single owner of
//! each identity a fresh storage location.
//!
//! # Record States
//!
//! | State | Table entry | Description |
//! |-------|-------------|-------------|
//! | Absent | none | Never requested, or evicted after a failure |
//! | Reserved | pending | Owner compiling; later callers wait on the record |
//! | Completed | completed | Artifact published, every caller reuses it |
//!
//! A failed build is evicted from the table and its waiters are released
//! with the failure, so the next request for that identity starts over.

pub mod coordinator;
pub mod params;
pub mod paths;
pub mod record;
pub mod table;

pub use coordinator::{BuildCoordinator, BuildOutcome, BuildResult};
pub use params::{BuildIdentity, BuildParameters, BuildRequest, FeatureRegistry, RequestNormalizer};
pub use paths::{ArtifactPathAllocator, ArtifactPaths};
pub use record::{BuildArtifact, BuildRecord, BuildState};
pub use table::{BuildTable, BuildTicket, Reservation};
