//! Compiler backends
//!
//! The coordinator never compiles anything itself. It hands a fully
//! specified [`BuildJob`] to a [`CompilerBackend`], which must leave the raw
//! binary and the packaged archive at the assigned paths before returning.

mod command;
pub mod package;

pub use command::CommandBackend;

use crate::build::params::{BuildIdentity, BuildParameters};
use crate::build::paths::ArtifactPaths;
use crate::config::Config;
use crate::error::{KilnError, KilnResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Max number of output lines to include in build error messages.
const BUILD_ERROR_TAIL_LINES: usize = 50;

/// Everything a backend needs to produce one artifact
#[derive(Debug, Clone)]
pub struct BuildJob {
    /// Identity of the build
    pub identity: BuildIdentity,
    /// Canonical parameters
    pub params: BuildParameters,
    /// Assigned output locations
    pub paths: ArtifactPaths,
}

/// Abstract compiler interface
///
/// On `Ok(())` the binary and archive must exist at `job.paths` and be
/// durable. Errors are reported as build failures.
#[async_trait]
pub trait CompilerBackend: Send + Sync {
    /// Compile and package one build
    async fn compile(&self, job: &BuildJob) -> KilnResult<()>;

    /// Human-readable backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Create the backend described by the configuration
pub fn create_backend(config: &Config) -> KilnResult<Arc<dyn CompilerBackend>> {
    if config.backend.program.trim().is_empty() {
        return Err(KilnError::BackendNotConfigured);
    }
    Ok(Arc::new(CommandBackend::new(config.backend.clone())))
}

/// Extract the useful tail of build output for error diagnostics.
///
/// Combines stdout and stderr, then returns the last `BUILD_ERROR_TAIL_LINES`
/// lines so error messages are actionable without being overwhelming.
pub(crate) fn build_error_output(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let total = lines.len();
    let tail: Vec<&str> = if total > BUILD_ERROR_TAIL_LINES {
        lines[total - BUILD_ERROR_TAIL_LINES..].to_vec()
    } else {
        lines
    };
    tail.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_output_keeps_tail() {
        let stdout: String = (0..80).map(|i| format!("line {}\n", i)).collect();
        let out = build_error_output(&stdout, "fatal: boom");

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), BUILD_ERROR_TAIL_LINES);
        assert_eq!(lines.last(), Some(&"fatal: boom"));
        assert_eq!(lines[0], "line 31");
    }

    #[test]
    fn error_output_short() {
        assert_eq!(build_error_output("a\n", "b\n"), "a\nb");
    }

    #[test]
    fn create_backend_requires_program() {
        let config = Config::default();
        assert!(matches!(
            create_backend(&config),
            Err(KilnError::BackendNotConfigured)
        ));

        let mut config = Config::default();
        config.backend.program = "make".to_string();
        let backend = create_backend(&config).unwrap();
        assert_eq!(backend.backend_name(), "command");
    }
}
