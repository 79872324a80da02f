//! Serialized-plan engine backend.
//!
//! `PlanEngine` stands in for the device-resident detector. It validates
//! and memorizes the plan file at load time so pool construction exercises
//! the real admission path, but `infer` is a stub that returns no
//! detections until a TensorRT binding is wired in behind this type.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::engine::{Detection, Engine, EngineFactory};

/// An engine instance backed by a serialized plan file.
pub struct PlanEngine {
    path: PathBuf,
    device_id: usize,
    tag: String,
    plan_bytes: u64,
}

impl PlanEngine {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn device_id(&self) -> usize {
        self.device_id
    }

    /// Instance tag within its bundle (the slot number at load time).
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Size of the plan file on disk.
    pub fn plan_bytes(&self) -> u64 {
        self.plan_bytes
    }
}

impl Engine for PlanEngine {
    fn infer(&self, _image: &[u8]) -> Result<Vec<Detection>> {
        // Stub backend: no device execution yet.
        tracing::debug!(tag = %self.tag, "plan backend has no device runtime, returning no detections");
        Ok(Vec::new())
    }
}

/// Loads [`PlanEngine`] instances for the pool.
#[derive(Debug, Default)]
pub struct PlanEngineFactory;

impl EngineFactory for PlanEngineFactory {
    type Engine = PlanEngine;

    fn load(&self, path: &Path, device_id: usize, tag: &str) -> Result<PlanEngine> {
        let meta = fs::metadata(path)
            .with_context(|| format!("cannot read model plan: {}", path.display()))?;
        if !meta.is_file() {
            bail!("model plan is not a regular file: {}", path.display());
        }
        if meta.len() == 0 {
            bail!("model plan is empty: {}", path.display());
        }

        Ok(PlanEngine {
            path: path.to_path_buf(),
            device_id,
            tag: tag.to_string(),
            plan_bytes: meta.len(),
        })
    }
}
