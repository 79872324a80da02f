//! HTTP server command

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::config::DetServeConfig;
use crate::device::NvidiaSmiProbe;
use crate::engine::{ModelPool, PlanEngineFactory, SystemClock};
use crate::server::{self, AppState};

/// Load every configured model bundle and start the session server
pub async fn serve(config_path: Option<PathBuf>, port: Option<u16>, host: Option<String>) -> Result<()> {
    let config = DetServeConfig::load(config_path.as_deref())?;

    tracing::info!(
        device_id = config.device_id,
        default_model = %config.default_model_name,
        models = config.models.len(),
        "building model pool"
    );
    let pool = ModelPool::build(
        &config.models,
        &config.default_model_name,
        config.device_id,
        &PlanEngineFactory,
        &NvidiaSmiProbe,
        Arc::new(SystemClock),
    )?;
    tracing::info!(bundles = ?pool.model_names(), "model pool ready");

    // Server config, with CLI overrides
    let mut server_config = config.server_config();
    if let Some(port) = port {
        server_config.port = port;
    }
    if let Some(host) = host {
        server_config.host = host;
    }

    let state = Arc::new(AppState::new(Arc::new(pool)));

    let addr = server_config.addr();
    tracing::info!("Starting server at http://{}", addr);

    server::start(state, server_config).await?;

    Ok(())
}
