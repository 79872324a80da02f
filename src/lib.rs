//! detserve - Pooled object-detection inference server
//!
//! detserve keeps a small, fixed number of expensive GPU-resident detection
//! engines loaded and multiplexes them across many short-lived client
//! sessions. The heart of the crate is the model pool: named bundles of
//! engine instances leased to sessions, kept alive by heartbeats, and
//! reclaimed when a client goes silent.
//!
//! # Architecture
//!
//! - **engine::pool**: named bundles, first-fit leasing, heartbeat expiry
//! - **engine::session**: the caller-facing layer (default-model
//!   resolution, session ids, release on drop)
//! - **device**: VRAM admission check before each engine load
//! - **server**: REST session lifecycle on top of the pool
//! - **cli** / **config**: deployment surface
//!
//! # Example
//!
//! ```bash
//! # Validate a deployment config
//! detserve check --config detserve.json
//!
//! # Load the configured bundles and serve
//! detserve serve --config detserve.json --port 8080
//! ```

pub mod cli;
pub mod config;
pub mod device;
pub mod engine;
pub mod server;

// Re-export key types
pub use config::{DetServeConfig, ModelConfig, ServerConfig};
pub use engine::{
    Engine, EngineFactory, Lease, ModelHandle, ModelPool, ModelSession, PoolError, SessionManager,
};
