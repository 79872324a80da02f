//! Engine pooling and session leasing
//!
//! This module is the heart of the server:
//! - `ModelPool`: named bundles of loaded engine instances with session
//!   leasing and heartbeat expiry
//! - `SessionManager` / `ModelSession`: the caller-facing layer that pairs
//!   acquire with registration and releases on drop
//! - `Engine` / `EngineFactory`: the seam behind which the actual inference
//!   backend lives

mod backend;
mod pool;
mod session;

pub use backend::{PlanEngine, PlanEngineFactory};
pub use pool::{
    Clock, Lease, ModelHandle, ModelPool, PoolError, SystemClock, DEFAULT_MODEL_KEYWORD,
    SESSION_TTL,
};
pub use session::{ModelSession, SessionManager};

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

/// One detected object.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    /// Class label, e.g. "person".
    pub label: String,
    /// Confidence score in `[0, 1]`.
    pub confidence: f32,
    /// Bounding box as `[x, y, width, height]` in pixels.
    pub bbox: [f32; 4],
}

/// A loaded, exclusive-use inference engine instance.
///
/// The pool never looks past this trait: engines are constructed by an
/// [`EngineFactory`] during pool build, leased to one session at a time,
/// and dropped when the pool is torn down.
pub trait Engine: Send + Sync + 'static {
    /// Run detection on one encoded image.
    fn infer(&self, image: &[u8]) -> Result<Vec<Detection>>;
}

/// Constructs engine instances during pool build.
///
/// `tag` distinguishes sibling instances of the same model (the bundle
/// passes the slot number). A returned error means "skip this slot": the
/// pool logs it and keeps loading the rest of the bundle.
pub trait EngineFactory {
    type Engine;

    fn load(&self, path: &Path, device_id: usize, tag: &str) -> Result<Self::Engine>;
}
