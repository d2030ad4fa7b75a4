//! External command compiler backend
//!
//! Runs a configured program once per build. Build parameters are passed both
//! as `{placeholder}` substitutions in the arguments and as `KILN_*`
//! environment variables.

use crate::backend::package::package_binary;
use crate::backend::{build_error_output, BuildJob, CompilerBackend};
use crate::config::schema::BackendConfig;
use crate::error::{KilnError, KilnResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Backend that shells out to a build program
pub struct CommandBackend {
    config: BackendConfig,
}

impl CommandBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    /// Substitute job placeholders in one argument
    fn expand_arg(arg: &str, job: &BuildJob) -> String {
        arg.replace("{os}", &job.params.os)
            .replace("{arch}", &job.params.arch)
            .replace("{variant}", job.params.variant.as_deref().unwrap_or(""))
            .replace("{features}", &job.params.features_csv())
            .replace("{output}", &job.paths.binary_path.to_string_lossy())
            .replace("{dir}", &job.paths.dir.to_string_lossy())
    }

    fn job_env(job: &BuildJob) -> Vec<(&'static str, String)> {
        vec![
            ("KILN_OS", job.params.os.clone()),
            ("KILN_ARCH", job.params.arch.clone()),
            (
                "KILN_VARIANT",
                job.params.variant.clone().unwrap_or_default(),
            ),
            ("KILN_FEATURES", job.params.features_csv()),
            (
                "KILN_OUTPUT",
                job.paths.binary_path.to_string_lossy().into_owned(),
            ),
            (
                "KILN_ARCHIVE",
                job.paths.archive_path.to_string_lossy().into_owned(),
            ),
            ("KILN_BUILD_DIR", job.paths.dir.to_string_lossy().into_owned()),
            ("KILN_BUILD_ID", job.identity.to_string()),
        ]
    }

    fn failed(job: &BuildJob, reason: impl Into<String>) -> KilnError {
        KilnError::BuildFailed {
            identity: job.identity.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CompilerBackend for CommandBackend {
    async fn compile(&self, job: &BuildJob) -> KilnResult<()> {
        let program = self.config.program.trim();
        if program.is_empty() {
            return Err(KilnError::BackendNotConfigured);
        }

        let args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|a| Self::expand_arg(a, job))
            .collect();

        debug!("Executing: {} {:?}", program, args);

        let mut command = Command::new(program);
        command
            .args(&args)
            .envs(&self.config.env)
            .envs(Self::job_env(job))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref workdir) = self.config.workdir {
            command.current_dir(workdir);
        }

        let output = command
            .output()
            .await
            .map_err(|e| KilnError::command_failed(format!("{} {:?}", program, args), e))?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(Self::failed(
                job,
                format!(
                    "{} exited with {}\n{}",
                    program,
                    code,
                    build_error_output(&stdout, &stderr)
                ),
            ));
        }

        if self.config.package {
            if !job.paths.binary_path.is_file() {
                return Err(Self::failed(
                    job,
                    format!(
                        "{} succeeded but produced no binary at {}",
                        program,
                        job.paths.binary_path.display()
                    ),
                ));
            }
            sync_output(&job.paths.binary_path).await?;
            package_binary(&job.paths.binary_path, &job.paths.archive_path).await?;
        } else {
            sync_output(&job.paths.binary_path).await?;
            sync_output(&job.paths.archive_path).await?;
        }

        info!("Compiled {} ({})", job.identity, job.paths.archive_filename);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "command"
    }
}

/// Flush a build output to disk
async fn sync_output(path: &Path) -> KilnResult<()> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| KilnError::storage(path, format!("opening build output: {}", e)))?;
    file.sync_all()
        .await
        .map_err(|e| KilnError::storage(path, format!("syncing build output: {}", e)))
}
