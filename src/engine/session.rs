//! Caller-facing session layer.
//!
//! The pool itself only hands out leases; this layer does everything a
//! well-behaved caller must do around them: resolve the `"default"`
//! sentinel, generate a session id, pair `acquire` with
//! `register_session`, forward heartbeats, and release the lease when the
//! session is dropped.

use std::sync::Arc;

use uuid::Uuid;

use crate::engine::pool::{ModelHandle, ModelPool, PoolError, DEFAULT_MODEL_KEYWORD};

/// Opens sessions against a shared [`ModelPool`].
pub struct SessionManager<E> {
    pool: Arc<ModelPool<E>>,
}

impl<E> SessionManager<E> {
    pub fn new(pool: Arc<ModelPool<E>>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<ModelPool<E>> {
        &self.pool
    }

    /// Resolve the `"default"` sentinel to the configured default model.
    pub fn resolve_model_name<'a>(&'a self, requested: &'a str) -> &'a str {
        if requested == DEFAULT_MODEL_KEYWORD {
            self.pool.default_model_name()
        } else {
            requested
        }
    }

    /// Open a session on `requested` (which may be `"default"`).
    ///
    /// Leases an engine instance and registers a fresh uuid session id for
    /// it in one step. `Ok(None)` means the bundle is exhausted right now;
    /// the caller decides whether and when to retry.
    pub fn open(&self, requested: &str) -> Result<Option<ModelSession<E>>, PoolError> {
        let model_name = self.resolve_model_name(requested).to_string();

        let lease = match self.pool.acquire(&model_name)? {
            Some(lease) => lease,
            None => return Ok(None),
        };

        let session_id = Uuid::new_v4().to_string();
        self.pool
            .register_session(&model_name, lease.handle, &session_id)?;
        tracing::info!(model = %model_name, %session_id, "session opened");

        Ok(Some(ModelSession {
            pool: Arc::clone(&self.pool),
            model_name,
            session_id,
            handle: lease.handle,
            engine: lease.engine,
        }))
    }

    /// Move a live session to a different model, keeping its session id.
    ///
    /// The old lease is released before the new one is acquired, so a
    /// session switching off a contended bundle never deadlocks against
    /// itself. The flip side: if the target bundle is exhausted the old
    /// lease is already gone and the session ends (`Ok(None)`).
    pub fn change(
        &self,
        session: ModelSession<E>,
        requested: &str,
    ) -> Result<Option<ModelSession<E>>, PoolError> {
        let model_name = self.resolve_model_name(requested).to_string();
        let session_id = session.id().to_string();
        drop(session);

        let lease = match self.pool.acquire(&model_name)? {
            Some(lease) => lease,
            None => {
                tracing::warn!(
                    model = %model_name,
                    %session_id,
                    "no instance available for model change, session ended"
                );
                return Ok(None);
            }
        };

        self.pool
            .register_session(&model_name, lease.handle, &session_id)?;
        tracing::info!(model = %model_name, %session_id, "session moved to new model");

        Ok(Some(ModelSession {
            pool: Arc::clone(&self.pool),
            model_name,
            session_id,
            handle: lease.handle,
            engine: lease.engine,
        }))
    }
}

/// One live lease over an engine instance.
///
/// Dropping the session returns the instance to the pool; `release` in the
/// pool is idempotent, so dropping after expiry is harmless.
pub struct ModelSession<E> {
    pool: Arc<ModelPool<E>>,
    model_name: String,
    session_id: String,
    handle: ModelHandle,
    engine: Arc<E>,
}

impl<E> ModelSession<E> {
    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn handle(&self) -> ModelHandle {
        self.handle
    }

    /// The leased engine instance.
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Refresh this session's heartbeat.
    pub fn heartbeat(&self) -> Result<(), PoolError> {
        self.pool.heartbeat(&self.model_name, &self.session_id)
    }

    /// Whether the pool still considers this session live. Also sweeps
    /// expired sessions in the bundle as a side effect.
    pub fn is_live(&self) -> Result<bool, PoolError> {
        self.pool.session_exists(&self.model_name, &self.session_id)
    }
}

impl<E> Drop for ModelSession<E> {
    fn drop(&mut self) {
        if let Err(err) = self
            .pool
            .release(&self.model_name, self.handle, &self.session_id)
        {
            tracing::warn!(
                model = %self.model_name,
                session_id = %self.session_id,
                error = %err,
                "failed to release session lease"
            );
        } else {
            tracing::info!(
                model = %self.model_name,
                session_id = %self.session_id,
                "session closed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::device::FixedProbe;
    use crate::engine::pool::SystemClock;
    use crate::engine::EngineFactory;
    use std::io::Write;
    use std::path::Path;

    struct UnitEngine;

    struct UnitFactory;

    impl EngineFactory for UnitFactory {
        type Engine = UnitEngine;

        fn load(&self, _path: &Path, _device_id: usize, _tag: &str) -> anyhow::Result<UnitEngine> {
            Ok(UnitEngine)
        }
    }

    fn manager(instances: usize) -> (SessionManager<UnitEngine>, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"plan").unwrap();
        let pool = ModelPool::build(
            &[ModelConfig {
                name: "yolo".to_string(),
                enabled: true,
                max_instances: instances,
                model_path: file.path().to_path_buf(),
            }],
            "yolo",
            0,
            &UnitFactory,
            &FixedProbe::plenty(),
            Arc::new(SystemClock),
        )
        .unwrap();
        (SessionManager::new(Arc::new(pool)), file)
    }

    fn dual_manager() -> (SessionManager<UnitEngine>, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"plan").unwrap();
        let models = ["yolo", "tiny"].map(|name| ModelConfig {
            name: name.to_string(),
            enabled: true,
            max_instances: 1,
            model_path: file.path().to_path_buf(),
        });
        let pool = ModelPool::build(
            &models,
            "yolo",
            0,
            &UnitFactory,
            &FixedProbe::plenty(),
            Arc::new(SystemClock),
        )
        .unwrap();
        (SessionManager::new(Arc::new(pool)), file)
    }

    #[test]
    fn test_open_resolves_default_sentinel() {
        let (manager, _file) = manager(1);
        let session = manager.open("default").unwrap().unwrap();
        assert_eq!(session.model_name(), "yolo");
        assert!(session.is_live().unwrap());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let (manager, _file) = manager(2);
        let a = manager.open("yolo").unwrap().unwrap();
        let b = manager.open("yolo").unwrap().unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_exhaustion_reports_none() {
        let (manager, _file) = manager(1);
        let _held = manager.open("yolo").unwrap().unwrap();
        assert!(manager.open("yolo").unwrap().is_none());
    }

    #[test]
    fn test_unknown_model_is_an_error() {
        let (manager, _file) = manager(1);
        assert!(manager.open("resnet").is_err());
    }

    #[test]
    fn test_change_moves_session_and_keeps_its_id() {
        let (manager, _file) = dual_manager();
        let session = manager.open("yolo").unwrap().unwrap();
        let id = session.id().to_string();

        let moved = manager.change(session, "tiny").unwrap().unwrap();
        assert_eq!(moved.id(), id);
        assert_eq!(moved.model_name(), "tiny");
        assert!(moved.is_live().unwrap());

        // The old lease went back to its bundle, the new one is held.
        assert_eq!(manager.pool().available_count("yolo").unwrap(), 1);
        assert_eq!(manager.pool().available_count("tiny").unwrap(), 0);
        assert!(!manager.pool().session_exists("yolo", &id).unwrap());
    }

    #[test]
    fn test_change_resolves_default_sentinel() {
        let (manager, _file) = dual_manager();
        let session = manager.open("tiny").unwrap().unwrap();
        let moved = manager.change(session, "default").unwrap().unwrap();
        assert_eq!(moved.model_name(), "yolo");
    }

    #[test]
    fn test_change_to_exhausted_model_ends_the_session() {
        let (manager, _file) = dual_manager();
        let _blocker = manager.open("tiny").unwrap().unwrap();
        let session = manager.open("yolo").unwrap().unwrap();
        let id = session.id().to_string();

        assert!(manager.change(session, "tiny").unwrap().is_none());

        // The original lease was released and the id is no longer known.
        assert_eq!(manager.pool().available_count("yolo").unwrap(), 1);
        assert!(!manager.pool().session_exists("yolo", &id).unwrap());
    }

    #[test]
    fn test_drop_returns_lease_to_pool() {
        let (manager, _file) = manager(1);
        let session = manager.open("yolo").unwrap().unwrap();
        let id = session.id().to_string();
        assert_eq!(manager.pool().available_count("yolo").unwrap(), 0);

        drop(session);
        assert_eq!(manager.pool().available_count("yolo").unwrap(), 1);
        assert!(!manager.pool().session_exists("yolo", &id).unwrap());
    }
}
