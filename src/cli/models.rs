//! List configured model bundles

use std::path::PathBuf;

use anyhow::Result;

use crate::config::DetServeConfig;

/// Print the configured model bundles
pub async fn models(config_path: Option<PathBuf>) -> Result<()> {
    let config = DetServeConfig::load(config_path.as_deref())?;

    println!("Configured models:\n");
    for model in &config.models {
        let default_marker = if model.name == config.default_model_name {
            " (default)"
        } else {
            ""
        };
        let status = if model.enabled { "" } else { " [disabled]" };
        println!(
            "  {}{}{} - {} instance(s), {}",
            model.name,
            default_marker,
            status,
            model.max_instances.max(1),
            model.model_path.display()
        );
    }

    Ok(())
}
