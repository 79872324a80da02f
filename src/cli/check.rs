//! Config validation command

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::config::DetServeConfig;
use crate::device::{NvidiaSmiProbe, VramProbe, MIN_FREE_VRAM_BYTES};
use crate::engine::DEFAULT_MODEL_KEYWORD;

/// Validate the config file and the device without loading any engines
pub async fn check(config_path: Option<PathBuf>) -> Result<()> {
    let config = DetServeConfig::load(config_path.as_deref())?;

    println!("Device: {}", config.device_id);
    println!("Default model: {}", config.default_model_name);
    println!();

    let mut problems = 0usize;

    let mut enabled_names = Vec::new();
    for model in &config.models {
        let status = if model.enabled { "enabled" } else { "disabled" };
        println!(
            "  {} ({}, {} instance(s)): {}",
            model.name,
            status,
            model.max_instances.max(1),
            model.model_path.display()
        );

        if model.name == DEFAULT_MODEL_KEYWORD {
            println!("    ERROR: '{DEFAULT_MODEL_KEYWORD}' is a reserved model name");
            problems += 1;
        }
        if model.enabled {
            if !model.model_path.exists() {
                println!("    ERROR: model file not found");
                problems += 1;
            }
            enabled_names.push(model.name.as_str());
        }
    }

    println!();
    if !enabled_names.contains(&config.default_model_name.as_str()) {
        println!(
            "ERROR: default model '{}' is not among the enabled models",
            config.default_model_name
        );
        problems += 1;
    }

    match NvidiaSmiProbe.free_bytes(config.device_id) {
        Ok(free) => {
            let status = if free >= MIN_FREE_VRAM_BYTES {
                "ok"
            } else {
                problems += 1;
                "INSUFFICIENT"
            };
            println!(
                "Free device memory: {:.0} MiB ({}, minimum {:.0} MiB per instance)",
                free as f64 / (1024.0 * 1024.0),
                status,
                MIN_FREE_VRAM_BYTES as f64 / (1024.0 * 1024.0),
            );
        }
        Err(e) => {
            // Not fatal for a dry run; the machine running `check` may not
            // be the deployment target.
            println!("Free device memory: unavailable ({e})");
        }
    }

    if problems > 0 {
        bail!("config check failed with {problems} problem(s)");
    }
    println!("\nConfig OK");
    Ok(())
}
