//! Named engine pool with session-scoped leasing
//!
//! A `ModelPool` owns one `ModelBundle` per configured model name. Each
//! bundle holds a fixed set of loaded engine instances; callers lease an
//! instance with `acquire`, bind it to a session with `register_session`,
//! keep the lease alive with `heartbeat`, and give it back with `release`.
//! Sessions silent for longer than [`SESSION_TTL`] are reclaimed by an
//! on-demand expiry sweep: there is no background reaper, so a lease is
//! only physically freed the next time `acquire` or `session_exists`
//! touches its bundle.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::ModelConfig;
use crate::device::{VramProbe, MIN_FREE_VRAM_BYTES};
use crate::engine::EngineFactory;

/// Heartbeat time-to-live. A session that has not heartbeated for longer
/// than this is eligible for reclamation on the next sweep.
pub const SESSION_TTL: Duration = Duration::from_secs(60);

/// Model name reserved as the "give me the default model" sentinel.
/// Resolved by the session layer, never registered as a bundle.
pub const DEFAULT_MODEL_KEYWORD: &str = "default";

/// Errors surfaced by pool construction and lookup.
///
/// Construction-time variants (`ReservedModelName`, `ModelFileMissing`,
/// `InsufficientVram`, `DefaultModelMissing`, `Probe`) are fatal: they
/// indicate a configuration problem that must be fixed before the server
/// can run. `ModelNotFound` is the only runtime variant and is always
/// caller-recoverable.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("model name 'default' is a reserved keyword")]
    ReservedModelName,

    #[error("model file not found: {0}")]
    ModelFileMissing(PathBuf),

    #[error(
        "insufficient device memory: {free} bytes free (< {min}); \
         disable models or lower max_instances in the config"
    )]
    InsufficientVram { free: u64, min: u64 },

    #[error("default model '{0}' is not among the constructed bundles")]
    DefaultModelMissing(String),

    #[error("device memory probe failed: {0}")]
    Probe(anyhow::Error),

    #[error("model '{0}' not found")]
    ModelNotFound(String),
}

/// Time source for heartbeat bookkeeping.
///
/// Production code uses [`SystemClock`]; tests drive the pool through a
/// manually advanced clock to exercise expiry without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time via `Instant::now`.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Opaque identity of one engine instance within its bundle.
///
/// Stable for the bundle's whole lifetime: slots are fixed at construction
/// and never reordered. Handles from one bundle are meaningless in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(usize);

impl ModelHandle {
    /// Slot index within the owning bundle.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A leased engine instance.
///
/// Holding a `Lease` does not keep the slot reserved by itself; the pool
/// only tracks the in-use flag and the session binding. Callers must pair
/// every `acquire` with `register_session` and heartbeat within
/// [`SESSION_TTL`], or the slot will be handed to someone else.
#[derive(Debug)]
pub struct Lease<E> {
    pub handle: ModelHandle,
    pub engine: Arc<E>,
}

/// One engine slot: the instance plus its in-use flag.
struct Slot<E> {
    engine: Arc<E>,
    in_use: bool,
}

/// Lease bookkeeping for one session.
struct SessionLease {
    handle: ModelHandle,
    last_seen: Instant,
}

/// A fixed set of engine instances for one model name, plus the sessions
/// currently leasing them.
struct ModelBundle<E> {
    slots: Vec<Slot<E>>,
    sessions: HashMap<String, SessionLease>,
}

impl<E> ModelBundle<E> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            sessions: HashMap::new(),
        }
    }

    /// First-fit claim: scan slots in construction order and take the first
    /// free one. Slot 0 is always the warmest instance.
    fn try_claim(&mut self) -> Option<Lease<E>> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if !slot.in_use {
                slot.in_use = true;
                return Some(Lease {
                    handle: ModelHandle(index),
                    engine: Arc::clone(&slot.engine),
                });
            }
        }
        None
    }

    fn available_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.in_use).count()
    }

    /// Drop every session whose heartbeat is older than `ttl` and free its
    /// slot. Returns whether anything was reclaimed.
    fn sweep_expired(&mut self, now: Instant, ttl: Duration) -> bool {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, lease)| now.duration_since(lease.last_seen) > ttl)
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in &expired {
            if let Some(lease) = self.sessions.remove(session_id) {
                tracing::debug!(%session_id, slot = lease.handle.0, "reclaiming expired lease");
                if let Some(slot) = self.slots.get_mut(lease.handle.0) {
                    slot.in_use = false;
                }
            }
        }
        !expired.is_empty()
    }
}

struct PoolInner<E> {
    bundles: HashMap<String, ModelBundle<E>>,
}

/// Process-wide directory of model bundles and the sole entry point for
/// leasing. One pool is built at startup and shared behind an `Arc`.
///
/// Every public operation takes the single internal lock on entry, so pool
/// state is globally sequentially consistent; no operation ever blocks
/// waiting for a slot to come free; exhaustion is reported immediately as
/// `Ok(None)` and retry policy belongs to the caller.
pub struct ModelPool<E> {
    inner: Mutex<PoolInner<E>>,
    default_model: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<E> ModelPool<E> {
    /// Build the pool from configuration, loading every enabled model's
    /// instances up front.
    ///
    /// Per model: the name must not be the reserved keyword, the model file
    /// must exist, and each instance passes the VRAM admission check before
    /// it is loaded. An individual load failure is logged and that slot is
    /// skipped, so a bundle may come up smaller than configured. Insufficient
    /// device memory, by contrast, fails the whole pool: under-provisioning
    /// is a configuration problem, not a transient condition.
    pub fn build<F>(
        models: &[ModelConfig],
        default_model: &str,
        device_id: usize,
        factory: &F,
        probe: &dyn VramProbe,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PoolError>
    where
        F: EngineFactory<Engine = E>,
    {
        let mut bundles: HashMap<String, ModelBundle<E>> = HashMap::new();

        for model in models {
            if !model.enabled {
                tracing::info!(model = %model.name, "skipping disabled model");
                continue;
            }
            if model.name == DEFAULT_MODEL_KEYWORD {
                tracing::error!("model name '{DEFAULT_MODEL_KEYWORD}' is a reserved keyword");
                return Err(PoolError::ReservedModelName);
            }

            let instances = model.max_instances.max(1);
            tracing::info!(model = %model.name, instances, "loading model bundle");

            if !model.model_path.exists() {
                tracing::error!(path = %model.model_path.display(), "model file not found");
                return Err(PoolError::ModelFileMissing(model.model_path.clone()));
            }

            let mut bundle = ModelBundle::new();
            for i in 0..instances {
                let free = probe.free_bytes(device_id).map_err(PoolError::Probe)?;
                if free < MIN_FREE_VRAM_BYTES {
                    tracing::error!(
                        free,
                        min = MIN_FREE_VRAM_BYTES,
                        "device memory admission check failed"
                    );
                    return Err(PoolError::InsufficientVram {
                        free,
                        min: MIN_FREE_VRAM_BYTES,
                    });
                }

                match factory.load(&model.model_path, device_id, &i.to_string()) {
                    Ok(engine) => {
                        bundle.slots.push(Slot {
                            engine: Arc::new(engine),
                            in_use: false,
                        });
                        tracing::info!(
                            model = %model.name,
                            instance = i + 1,
                            total = instances,
                            "engine instance ready"
                        );
                    }
                    Err(err) => {
                        // Degraded bundle, keep going with the remaining slots.
                        tracing::error!(
                            model = %model.name,
                            instance = i + 1,
                            total = instances,
                            error = %err,
                            "engine instance failed to load, skipping slot"
                        );
                    }
                }
            }

            bundles.insert(model.name.clone(), bundle);
        }

        if !bundles.contains_key(default_model) {
            tracing::error!(default_model, "default model not found among bundles");
            return Err(PoolError::DefaultModelMissing(default_model.to_string()));
        }

        Ok(Self {
            inner: Mutex::new(PoolInner { bundles }),
            default_model: default_model.to_string(),
            ttl: SESSION_TTL,
            clock,
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner<E>> {
        // A caller panicking mid-operation must not wedge the pool.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Name of the bundle used when callers ask for `"default"`.
    pub fn default_model_name(&self) -> &str {
        &self.default_model
    }

    /// Whether `model_name` is a registered bundle.
    pub fn model_exists(&self, model_name: &str) -> bool {
        self.lock().bundles.contains_key(model_name)
    }

    /// Registered bundle names, sorted.
    pub fn model_names(&self) -> Vec<String> {
        let inner = self.lock();
        let mut names: Vec<String> = inner.bundles.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of instances in `model_name` currently free.
    pub fn available_count(&self, model_name: &str) -> Result<usize, PoolError> {
        let inner = self.lock();
        let bundle = inner
            .bundles
            .get(model_name)
            .ok_or_else(|| PoolError::ModelNotFound(model_name.to_string()))?;
        Ok(bundle.available_count())
    }

    /// Whether at least one instance of `model_name` is free right now.
    /// Unknown names report `false` (and log), matching the lookup behavior
    /// of every other read.
    pub fn is_available(&self, model_name: &str) -> bool {
        let inner = self.lock();
        match inner.bundles.get(model_name) {
            Some(bundle) => bundle.available_count() > 0,
            None => {
                tracing::error!(model = model_name, "model not found");
                false
            }
        }
    }

    /// Lease a free instance of `model_name`.
    ///
    /// First-fit over the bundle's slots; if every slot is taken, expired
    /// sessions are swept and the scan retried exactly once. `Ok(None)`
    /// means genuine exhaustion, a normal outcome under load, to be
    /// retried by the caller with its own backoff.
    pub fn acquire(&self, model_name: &str) -> Result<Option<Lease<E>>, PoolError> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let bundle = inner
            .bundles
            .get_mut(model_name)
            .ok_or_else(|| PoolError::ModelNotFound(model_name.to_string()))?;

        if let Some(lease) = bundle.try_claim() {
            tracing::debug!(model = model_name, slot = lease.handle.0, "leased engine instance");
            return Ok(Some(lease));
        }

        // All slots taken: reclaim expired sessions and rescan once. The
        // sweep is deterministic within this lock hold, so one retry is
        // enough.
        if bundle.sweep_expired(now, self.ttl) {
            if let Some(lease) = bundle.try_claim() {
                tracing::debug!(
                    model = model_name,
                    slot = lease.handle.0,
                    "leased reclaimed engine instance"
                );
                return Ok(Some(lease));
            }
        }

        tracing::warn!(model = model_name, "no engine instance available");
        Ok(None)
    }

    /// Bind `session_id` to a leased instance, stamping its heartbeat.
    ///
    /// Overwrites any prior binding for the same id. Does not check that
    /// the handle is actually marked in use; that invariant comes from
    /// always pairing `acquire` with `register_session`.
    pub fn register_session(
        &self,
        model_name: &str,
        handle: ModelHandle,
        session_id: &str,
    ) -> Result<(), PoolError> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let bundle = inner
            .bundles
            .get_mut(model_name)
            .ok_or_else(|| PoolError::ModelNotFound(model_name.to_string()))?;

        tracing::info!(model = model_name, session_id, slot = handle.0, "session registered");
        bundle.sessions.insert(
            session_id.to_string(),
            SessionLease {
                handle,
                last_seen: now,
            },
        );
        Ok(())
    }

    /// Refresh a session's heartbeat. Unknown sessions are a silent no-op:
    /// a heartbeat racing with an expiry sweep is expected and harmless.
    pub fn heartbeat(&self, model_name: &str, session_id: &str) -> Result<(), PoolError> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let bundle = inner
            .bundles
            .get_mut(model_name)
            .ok_or_else(|| PoolError::ModelNotFound(model_name.to_string()))?;

        if let Some(lease) = bundle.sessions.get_mut(session_id) {
            tracing::debug!(model = model_name, session_id, "heartbeat");
            lease.last_seen = now;
        }
        Ok(())
    }

    /// Whether `session_id` is still live in `model_name`'s bundle.
    ///
    /// Sweeps expired sessions first, so every liveness probe also collects
    /// garbage for its bundle.
    pub fn session_exists(&self, model_name: &str, session_id: &str) -> Result<bool, PoolError> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let bundle = inner
            .bundles
            .get_mut(model_name)
            .ok_or_else(|| PoolError::ModelNotFound(model_name.to_string()))?;

        bundle.sweep_expired(now, self.ttl);
        Ok(bundle.sessions.contains_key(session_id))
    }

    /// Return a leased instance and drop the session binding.
    ///
    /// Idempotent: releasing an already-expired or already-released session
    /// leaves the pool in the same state as releasing it once.
    pub fn release(
        &self,
        model_name: &str,
        handle: ModelHandle,
        session_id: &str,
    ) -> Result<(), PoolError> {
        let mut inner = self.lock();
        let bundle = inner
            .bundles
            .get_mut(model_name)
            .ok_or_else(|| PoolError::ModelNotFound(model_name.to_string()))?;

        tracing::info!(model = model_name, session_id, slot = handle.0, "releasing engine instance");
        if let Some(slot) = bundle.slots.get_mut(handle.0) {
            slot.in_use = false;
        }
        bundle.sessions.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::device::FixedProbe;
    use std::io::Write;
    use std::path::Path;

    /// Test clock advanced by hand.
    struct ManualClock {
        base: Instant,
        offset: Mutex<Duration>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                base: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            }
        }

        fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap()
        }
    }

    /// Engine stand-in that records its construction tag.
    struct FakeEngine {
        #[allow(dead_code)]
        tag: String,
    }

    /// Factory that fails for tags listed in `fail_tags`.
    struct FakeFactory {
        fail_tags: Vec<String>,
    }

    impl FakeFactory {
        fn reliable() -> Self {
            Self { fail_tags: Vec::new() }
        }
    }

    impl EngineFactory for FakeFactory {
        type Engine = FakeEngine;

        fn load(&self, _path: &Path, _device_id: usize, tag: &str) -> anyhow::Result<FakeEngine> {
            if self.fail_tags.iter().any(|t| t == tag) {
                anyhow::bail!("simulated load failure for instance {tag}");
            }
            Ok(FakeEngine { tag: tag.to_string() })
        }
    }

    fn model_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"plan").unwrap();
        file
    }

    fn config(name: &str, instances: usize, path: &Path) -> ModelConfig {
        ModelConfig {
            name: name.to_string(),
            enabled: true,
            max_instances: instances,
            model_path: path.to_path_buf(),
        }
    }

    fn pool_with_clock(
        models: &[ModelConfig],
        default: &str,
        clock: Arc<ManualClock>,
    ) -> ModelPool<FakeEngine> {
        ModelPool::build(
            models,
            default,
            0,
            &FakeFactory::reliable(),
            &FixedProbe::plenty(),
            clock,
        )
        .unwrap()
    }

    /// The in-use flags must mirror the session map exactly: a slot is
    /// flagged iff some live session holds its handle.
    fn assert_lease_consistent(pool: &ModelPool<FakeEngine>, model: &str) {
        let inner = pool.lock();
        let bundle = &inner.bundles[model];
        for (index, slot) in bundle.slots.iter().enumerate() {
            let held = bundle
                .sessions
                .values()
                .any(|lease| lease.handle.0 == index);
            assert_eq!(slot.in_use, held, "slot {index} flag out of sync");
        }
    }

    #[test]
    fn test_fresh_bundle_fully_available() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 3, file.path())], "yolo", clock);

        assert!(pool.model_exists("yolo"));
        assert_eq!(pool.available_count("yolo").unwrap(), 3);
        assert!(pool.is_available("yolo"));
    }

    #[test]
    fn test_acquire_exhausts_bundle() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 2, file.path())], "yolo", clock);

        let a = pool.acquire("yolo").unwrap().unwrap();
        let b = pool.acquire("yolo").unwrap().unwrap();
        assert_ne!(a.handle, b.handle);
        assert_eq!(pool.available_count("yolo").unwrap(), 0);
        assert!(!pool.is_available("yolo"));
        assert!(pool.acquire("yolo").unwrap().is_none());
    }

    #[test]
    fn test_first_fit_prefers_front_slot() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 2, file.path())], "yolo", clock);

        let first = pool.acquire("yolo").unwrap().unwrap();
        assert_eq!(first.handle.index(), 0);
        pool.release("yolo", first.handle, "nobody").unwrap();

        // Slot 0 is free again and must win over the never-used slot 1.
        let again = pool.acquire("yolo").unwrap().unwrap();
        assert_eq!(again.handle.index(), 0);
    }

    #[test]
    fn test_register_then_session_exists() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 1, file.path())], "yolo", clock);

        let lease = pool.acquire("yolo").unwrap().unwrap();
        pool.register_session("yolo", lease.handle, "s1").unwrap();
        assert!(pool.session_exists("yolo", "s1").unwrap());
        assert_lease_consistent(&pool, "yolo");
    }

    #[test]
    fn test_heartbeat_keeps_session_alive() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 1, file.path())], "yolo", Arc::clone(&clock));

        let lease = pool.acquire("yolo").unwrap().unwrap();
        pool.register_session("yolo", lease.handle, "s1").unwrap();

        // Heartbeat every 40 s; the TTL never elapses between beats.
        for _ in 0..3 {
            clock.advance(Duration::from_secs(40));
            pool.heartbeat("yolo", "s1").unwrap();
        }
        assert!(pool.session_exists("yolo", "s1").unwrap());
        assert_eq!(pool.available_count("yolo").unwrap(), 0);
    }

    #[test]
    fn test_silent_session_reclaimed_after_ttl() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 1, file.path())], "yolo", Arc::clone(&clock));

        let lease = pool.acquire("yolo").unwrap().unwrap();
        pool.register_session("yolo", lease.handle, "s1").unwrap();
        assert_eq!(pool.available_count("yolo").unwrap(), 0);

        clock.advance(Duration::from_secs(61));
        assert!(!pool.session_exists("yolo", "s1").unwrap());
        assert_eq!(pool.available_count("yolo").unwrap(), 1);
        assert_lease_consistent(&pool, "yolo");
    }

    #[test]
    fn test_ttl_boundary_is_strictly_greater() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 1, file.path())], "yolo", Arc::clone(&clock));

        let lease = pool.acquire("yolo").unwrap().unwrap();
        pool.register_session("yolo", lease.handle, "s1").unwrap();

        // Exactly 60 s of silence is not yet expired.
        clock.advance(Duration::from_secs(60));
        assert!(pool.session_exists("yolo", "s1").unwrap());
    }

    #[test]
    fn test_acquire_reclaims_expired_lease() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 2, file.path())], "yolo", Arc::clone(&clock));

        let a = pool.acquire("yolo").unwrap().unwrap();
        pool.register_session("yolo", a.handle, "a").unwrap();
        let b = pool.acquire("yolo").unwrap().unwrap();
        pool.register_session("yolo", b.handle, "b").unwrap();
        assert_eq!(pool.available_count("yolo").unwrap(), 0);
        assert!(pool.acquire("yolo").unwrap().is_none());

        clock.advance(Duration::from_secs(61));

        // Both sessions went silent; the next acquire sweeps and succeeds.
        let reclaimed = pool.acquire("yolo").unwrap().unwrap();
        assert!(reclaimed.handle == a.handle || reclaimed.handle == b.handle);
        assert!(!pool.session_exists("yolo", "a").unwrap());
        assert!(!pool.session_exists("yolo", "b").unwrap());
    }

    #[test]
    fn test_heartbeat_protects_one_of_two() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 2, file.path())], "yolo", Arc::clone(&clock));

        let a = pool.acquire("yolo").unwrap().unwrap();
        pool.register_session("yolo", a.handle, "a").unwrap();
        let b = pool.acquire("yolo").unwrap().unwrap();
        pool.register_session("yolo", b.handle, "b").unwrap();

        clock.advance(Duration::from_secs(45));
        pool.heartbeat("yolo", "a").unwrap();
        clock.advance(Duration::from_secs(30));

        // "b" has been silent for 75 s, "a" only 30 s.
        let reclaimed = pool.acquire("yolo").unwrap().unwrap();
        assert_eq!(reclaimed.handle, b.handle);
        pool.register_session("yolo", reclaimed.handle, "c").unwrap();
        assert!(pool.session_exists("yolo", "a").unwrap());
        assert!(!pool.session_exists("yolo", "b").unwrap());
        assert_lease_consistent(&pool, "yolo");
    }

    #[test]
    fn test_release_is_idempotent() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 1, file.path())], "yolo", clock);

        let lease = pool.acquire("yolo").unwrap().unwrap();
        pool.register_session("yolo", lease.handle, "s1").unwrap();

        pool.release("yolo", lease.handle, "s1").unwrap();
        assert_eq!(pool.available_count("yolo").unwrap(), 1);
        assert!(!pool.session_exists("yolo", "s1").unwrap());

        // Second release of the same lease changes nothing and must not fail.
        pool.release("yolo", lease.handle, "s1").unwrap();
        assert_eq!(pool.available_count("yolo").unwrap(), 1);
        assert_lease_consistent(&pool, "yolo");
    }

    #[test]
    fn test_release_after_expiry_is_harmless() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 1, file.path())], "yolo", Arc::clone(&clock));

        let lease = pool.acquire("yolo").unwrap().unwrap();
        pool.register_session("yolo", lease.handle, "s1").unwrap();
        clock.advance(Duration::from_secs(61));
        assert!(!pool.session_exists("yolo", "s1").unwrap());

        pool.release("yolo", lease.handle, "s1").unwrap();
        assert_eq!(pool.available_count("yolo").unwrap(), 1);
    }

    #[test]
    fn test_heartbeat_on_unknown_session_is_noop() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 1, file.path())], "yolo", clock);

        pool.heartbeat("yolo", "ghost").unwrap();
        assert!(!pool.session_exists("yolo", "ghost").unwrap());
    }

    #[test]
    fn test_reregistration_overwrites_binding() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 2, file.path())], "yolo", Arc::clone(&clock));

        let a = pool.acquire("yolo").unwrap().unwrap();
        pool.register_session("yolo", a.handle, "s1").unwrap();
        let b = pool.acquire("yolo").unwrap().unwrap();
        pool.register_session("yolo", b.handle, "s1").unwrap();

        // One session, bound to the newer slot.
        let inner = pool.lock();
        let bundle = &inner.bundles["yolo"];
        assert_eq!(bundle.sessions.len(), 1);
        assert_eq!(bundle.sessions["s1"].handle, b.handle);
    }

    #[test]
    fn test_unknown_model_is_an_error() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 1, file.path())], "yolo", clock);

        assert!(!pool.model_exists("nope"));
        assert!(!pool.is_available("nope"));
        assert!(matches!(
            pool.available_count("nope"),
            Err(PoolError::ModelNotFound(_))
        ));
        assert!(matches!(
            pool.acquire("nope"),
            Err(PoolError::ModelNotFound(_))
        ));
        assert!(matches!(
            pool.heartbeat("nope", "s1"),
            Err(PoolError::ModelNotFound(_))
        ));
        // The known bundle is untouched by failed lookups.
        assert_eq!(pool.available_count("yolo").unwrap(), 1);
    }

    #[test]
    fn test_model_names_sorted_snapshot() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(
            &[
                config("zebra", 1, file.path()),
                config("aardvark", 1, file.path()),
            ],
            "zebra",
            clock,
        );
        assert_eq!(pool.model_names(), vec!["aardvark", "zebra"]);
    }

    #[test]
    fn test_reserved_model_name_rejected() {
        let file = model_file();
        let result = ModelPool::build(
            &[config("default", 1, file.path())],
            "default",
            0,
            &FakeFactory::reliable(),
            &FixedProbe::plenty(),
            Arc::new(ManualClock::new()),
        );
        assert!(matches!(result, Err(PoolError::ReservedModelName)));
    }

    #[test]
    fn test_missing_default_model_is_fatal() {
        let file = model_file();
        let result = ModelPool::build(
            &[config("yolo", 1, file.path())],
            "resnet",
            0,
            &FakeFactory::reliable(),
            &FixedProbe::plenty(),
            Arc::new(ManualClock::new()),
        );
        assert!(matches!(result, Err(PoolError::DefaultModelMissing(_))));
    }

    #[test]
    fn test_disabled_model_skipped() {
        let file = model_file();
        let mut disabled = config("off", 4, file.path());
        disabled.enabled = false;
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 1, file.path()), disabled], "yolo", clock);

        assert!(!pool.model_exists("off"));
        assert_eq!(pool.model_names(), vec!["yolo"]);
    }

    #[test]
    fn test_zero_instances_coerced_to_one() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 0, file.path())], "yolo", clock);
        assert_eq!(pool.available_count("yolo").unwrap(), 1);
    }

    #[test]
    fn test_partial_load_failure_degrades_bundle() {
        let file = model_file();
        let factory = FakeFactory {
            fail_tags: vec!["1".to_string()],
        };
        let pool: ModelPool<FakeEngine> = ModelPool::build(
            &[config("yolo", 3, file.path())],
            "yolo",
            0,
            &factory,
            &FixedProbe::plenty(),
            Arc::new(ManualClock::new()),
        )
        .unwrap();

        // Instance "1" failed to load; the bundle still serves the other two.
        assert_eq!(pool.available_count("yolo").unwrap(), 2);
    }

    #[test]
    fn test_insufficient_vram_is_fatal() {
        let file = model_file();
        let result = ModelPool::build(
            &[config("yolo", 1, file.path())],
            "yolo",
            0,
            &FakeFactory::reliable(),
            &FixedProbe::new(MIN_FREE_VRAM_BYTES - 1),
            Arc::new(ManualClock::new()),
        );
        assert!(matches!(result, Err(PoolError::InsufficientVram { .. })));
    }

    #[test]
    fn test_missing_model_file_is_fatal() {
        let result = ModelPool::build(
            &[config("yolo", 1, Path::new("/nonexistent/model.plan"))],
            "yolo",
            0,
            &FakeFactory::reliable(),
            &FixedProbe::plenty(),
            Arc::new(ManualClock::new()),
        );
        assert!(matches!(result, Err(PoolError::ModelFileMissing(_))));
    }

    #[test]
    fn test_end_to_end_reclamation_scenario() {
        let file = model_file();
        let clock = Arc::new(ManualClock::new());
        let pool = pool_with_clock(&[config("yolo", 2, file.path())], "yolo", Arc::clone(&clock));

        let r1 = pool.acquire("yolo").unwrap().unwrap();
        pool.register_session("yolo", r1.handle, "a").unwrap();
        let r2 = pool.acquire("yolo").unwrap().unwrap();
        pool.register_session("yolo", r2.handle, "b").unwrap();

        assert_eq!(pool.available_count("yolo").unwrap(), 0);
        assert!(pool.acquire("yolo").unwrap().is_none());

        clock.advance(Duration::from_secs(61));

        let reclaimed = pool.acquire("yolo").unwrap().unwrap();
        assert!(reclaimed.handle == r1.handle || reclaimed.handle == r2.handle);
        pool.register_session("yolo", reclaimed.handle, "c").unwrap();

        let a_live = pool.session_exists("yolo", "a").unwrap();
        let b_live = pool.session_exists("yolo", "b").unwrap();
        assert!(!a_live && !b_live);
        assert_lease_consistent(&pool, "yolo");
    }
}
