//! Features command - list the feature registry

use crate::build::RequestNormalizer;
use crate::config::Config;
use crate::error::KilnResult;
use console::style;

/// Execute the features command
pub async fn execute(config: &Config) -> KilnResult<()> {
    let normalizer = RequestNormalizer::from_config(&config.features);
    let registry = normalizer.registry();

    if registry.is_empty() {
        println!("No features registered.");
        return Ok(());
    }

    for (index, directive) in registry.iter().enumerate() {
        println!("{:>3}  {}", style(index).dim(), directive);
    }
    println!();
    println!(
        "Sub-variant applies to arch: {}",
        style(&config.features.variant_arch).cyan()
    );

    Ok(())
}
