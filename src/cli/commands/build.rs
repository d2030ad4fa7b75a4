//! Build command - build or reuse one artifact

use crate::cli::args::BuildArgs;
use crate::config::Config;
use crate::error::{KilnError, KilnResult};
use crate::response::BuildResponse;
use std::path::Path;
use tracing::info;

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> KilnResult<()> {
    let coordinator = super::coordinator(config).await?;
    let result = coordinator.request(&args.request()).await?;
    let response = BuildResponse::assemble(&result, &config.server.base_url);

    if let Some(ref output) = args.output {
        copy_body(&response, output).await?;
    }

    super::print_response(&response, args.format)
}

/// Stream the artifact to a local file
async fn copy_body(response: &BuildResponse, output: &Path) -> KilnResult<()> {
    let mut body = response.open_body().await?;
    let mut file = tokio::fs::File::create(output)
        .await
        .map_err(|e| KilnError::io(format!("creating {}", output.display()), e))?;

    let bytes = tokio::io::copy(&mut body, &mut file)
        .await
        .map_err(|e| KilnError::io(format!("writing {}", output.display()), e))?;

    info!("Wrote {} bytes to {}", bytes, output.display());
    Ok(())
}
