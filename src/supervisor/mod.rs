//! Lazy component supervisor (`spec.md` §4.3): named components are
//! registered up front but constructed only on first `Get`, with
//! at-most-once initialization, memory-budget-aware admission, idle
//! eviction, and priority-ordered warmup.

pub mod component;
pub mod config;
pub mod context;
pub mod error;
pub mod memory;

pub use component::{CleanupFn, ComponentHandle, ComponentSpec, ComponentState, Instance, ProviderFn};
pub use config::SupervisorConfig;
pub use context::{ContextPropagator, Scope};
pub use error::SupervisorError;
pub use memory::MemoryBudget;

use crate::common::metrics::Metrics;
use component::LazyComponent;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Owns every registered [`LazyComponent`] and drives the shared lifecycle
/// rules: at-most-once init, memory-budget admission with idle eviction,
/// priority-ordered warmup, and a periodic idle sweep.
pub struct Supervisor {
    config: SupervisorConfig,
    components: DashMap<String, Arc<LazyComponent>>,
    /// Bytes currently attributed to `Ready` (or being-initialized)
    /// components, serialized under its own lock so reads of component
    /// state never block on the budget accounting.
    reserved: Mutex<u64>,
    context: ContextPropagator,
    metrics: Metrics,
}

impl Supervisor {
    /// Create an empty supervisor under `config`.
    #[must_use]
    pub fn new(config: SupervisorConfig, metrics: Metrics) -> Self {
        Self {
            config,
            components: DashMap::new(),
            reserved: Mutex::new(0),
            context: ContextPropagator::new(),
            metrics,
        }
    }

    /// Register a component. Fails if `spec.name` is already registered.
    pub fn register(&self, spec: ComponentSpec) -> Result<(), SupervisorError> {
        let name = spec.name.clone();
        if self.components.contains_key(&name) {
            return Err(SupervisorError::DuplicateRegistration(name));
        }
        self.components.insert(name, Arc::new(LazyComponent::new(spec)));
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Arc<LazyComponent>, SupervisorError> {
        self.components
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| SupervisorError::UnknownComponent(name.to_string()))
    }

    /// Fetch (constructing if necessary) the component named `name`, typed
    /// as `T`. Equivalent to `get_with_cancellation` with a token that is
    /// never cancelled by the caller.
    pub async fn get<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        name: &str,
    ) -> Result<ComponentHandle<T>, SupervisorError> {
        self.get_with_cancellation(name, tokio_util::sync::CancellationToken::new()).await
    }

    /// As [`get`](Self::get), but the caller's own `cancel` token can
    /// abandon the wait without affecting other concurrent callers. If this
    /// caller happens to be the last active waiter when it cancels, the
    /// in-flight provider invocation itself is cancelled.
    pub async fn get_with_cancellation<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        name: &str,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<ComponentHandle<T>, SupervisorError> {
        let component = self.ensure_ready(name, cancel).await?;
        let instance = component.instance().expect("ensure_ready implies an instance");
        let typed = Arc::downcast::<T>(instance).map_err(|_| {
            SupervisorError::ProviderFailed(format!("component {name} instance type mismatch"))
        })?;
        component.mark_accessed();
        Ok(ComponentHandle::new(typed, component))
    }

    /// Drive `name` to `Ready` (constructing it if necessary) without
    /// committing to a concrete instance type; used by `warm_up`, which
    /// only needs initialization as a side effect.
    async fn ensure_ready(
        self: &Arc<Self>,
        name: &str,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<Arc<LazyComponent>, SupervisorError> {
        let component = self.lookup(name)?;
        loop {
            match component.state() {
                ComponentState::Ready => return Ok(component),
                ComponentState::Failed => {
                    return Err(component
                        .error()
                        .unwrap_or_else(|| SupervisorError::ProviderFailed("unknown".to_string())));
                }
                ComponentState::Shutdown => {
                    return Err(SupervisorError::UnknownComponent(name.to_string()));
                }
                ComponentState::Initializing => {
                    component.enter_wait();
                    tokio::select! {
                        () = component.notified() => {
                            component.leave_wait();
                        }
                        () = cancel.cancelled() => {
                            if component.leave_wait() {
                                debug!(component = name, "last waiter abandoned, cancelling provider");
                                component.cancellation().cancel();
                            }
                            return Err(SupervisorError::Canceled);
                        }
                    }
                }
                ComponentState::Uninitialized => {
                    if component.try_begin_initializing() {
                        if !self.try_admit(component.memory_estimate()) {
                            component.revert_to_uninitialized();
                            return Err(SupervisorError::MemoryPressure);
                        }
                        let scope = self
                            .context
                            .scope_with_timeout(format!("component:{name}"), Some(component.timeout()));
                        let sup = Arc::clone(self);
                        let comp = Arc::clone(&component);
                        tokio::spawn(async move { sup.run_provider(comp, scope).await });
                    }
                    // Either we just spawned the provider, or we lost the
                    // race and another caller did: loop back around to
                    // observe `Initializing` and join the rendezvous.
                }
            }
        }
    }

    async fn run_provider(self: Arc<Self>, component: Arc<LazyComponent>, scope: Scope) {
        let provider = component.provider_fn();
        let fut = provider(scope);
        let outcome = tokio::select! {
            res = tokio::time::timeout(component.timeout(), fut) => match res {
                Ok(Ok(instance)) => Ok(instance),
                Ok(Err(detail)) => Err(SupervisorError::ProviderFailed(detail)),
                Err(_) => Err(SupervisorError::ProviderTimeout),
            },
            () = component.cancellation().cancelled() => Err(SupervisorError::Canceled),
        };
        match outcome {
            Ok(instance) => {
                component.complete_ready(instance);
                self.metrics.record_component_init();
                info!(component = component.name(), "component ready");
            }
            Err(error) => {
                self.release_reservation(component.memory_estimate());
                warn!(component = component.name(), %error, "component initialization failed");
                component.complete_failed(error);
            }
        }
    }

    /// Reserve `estimate` bytes against the memory budget, attempting idle
    /// eviction first if it would not otherwise fit. Returns `false` (and
    /// reserves nothing) if it still does not fit afterward.
    fn try_admit(&self, estimate: u64) -> bool {
        if estimate == 0 {
            return true;
        }
        if self.reserve_if_fits(estimate) {
            return true;
        }
        self.evict_idle_until_fits(estimate);
        self.reserve_if_fits(estimate)
    }

    fn reserve_if_fits(&self, estimate: u64) -> bool {
        let mut reserved = self.reserved.lock().unwrap();
        if self.config.memory_budget.admits(*reserved, estimate) {
            *reserved += estimate;
            true
        } else {
            false
        }
    }

    fn release_reservation(&self, estimate: u64) {
        if estimate == 0 {
            return;
        }
        let mut reserved = self.reserved.lock().unwrap();
        *reserved = reserved.saturating_sub(estimate);
    }

    /// Evict `Ready`, not-in-use components idle past `config.idle_timeout`,
    /// oldest-idle first, until `estimate` would fit or there is nothing
    /// left to evict.
    fn evict_idle_until_fits(&self, estimate: u64) {
        let idle_timeout = self.config.idle_timeout;
        let mut candidates: Vec<Arc<LazyComponent>> = self
            .components
            .iter()
            .filter(|e| {
                let c = e.value();
                c.state() == ComponentState::Ready && !c.is_in_use() && c.idle_for() >= idle_timeout
            })
            .map(|e| e.value().clone())
            .collect();
        candidates.sort_by(|a, b| b.idle_for().cmp(&a.idle_for()));

        for candidate in candidates {
            if self.reserve_if_fits(estimate) {
                // Put the reservation back; the caller re-checks itself.
                self.release_reservation(estimate);
                return;
            }
            self.evict_component(&candidate, "memory pressure");
        }
    }

    fn evict_component(&self, component: &Arc<LazyComponent>, reason: &str) {
        let estimate = component.memory_estimate();
        if let Some(instance) = component.reset() {
            if let Some(cleanup) = component.cleanup_fn() {
                cleanup(instance);
            }
        }
        self.release_reservation(estimate);
        self.metrics.record_component_eviction();
        info!(component = component.name(), reason, "evicted idle component");
    }

    /// Force a component back to `Uninitialized`, running its cleanup
    /// function against the evicted instance (if any).
    pub fn reset(&self, name: &str) -> Result<(), SupervisorError> {
        let component = self.lookup(name)?;
        let estimate = component.memory_estimate();
        if let Some(instance) = component.reset() {
            if let Some(cleanup) = component.cleanup_fn() {
                cleanup(instance);
            }
            self.release_reservation(estimate);
        }
        Ok(())
    }

    /// Initialize every registered component, lowest `priority` first,
    /// bounded by `warmup_parallelism` concurrent provider invocations.
    /// Individual failures are logged and do not stop the rest of warmup.
    pub async fn warm_up(self: &Arc<Self>) {
        let mut names: Vec<Arc<LazyComponent>> =
            self.components.iter().map(|e| e.value().clone()).collect();
        names.sort_by_key(|c| c.priority());

        let semaphore = Arc::new(Semaphore::new(self.config.warmup_parallelism.max(1)));
        let mut handles = Vec::with_capacity(names.len());
        for component in names {
            let sup = Arc::clone(self);
            let permit = Arc::clone(&semaphore);
            let name = component.name().to_string();
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore never closed");
                let result = sup
                    .ensure_ready(&name, tokio_util::sync::CancellationToken::new())
                    .await;
                if let Err(error) = result {
                    warn!(component = name, %error, "warmup failed for component");
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Evict every `Ready`, not-in-use component idle past
    /// `config.idle_timeout`. Intended to be driven by a periodic caller
    /// (e.g. a `tokio::time::interval` loop at `config.sweep_interval`).
    pub fn sweep_idle(&self) {
        let idle_timeout = self.config.idle_timeout;
        let stale: Vec<Arc<LazyComponent>> = self
            .components
            .iter()
            .filter(|e| {
                let c = e.value();
                c.state() == ComponentState::Ready && !c.is_in_use() && c.idle_for() >= idle_timeout
            })
            .map(|e| e.value().clone())
            .collect();
        for component in stale {
            self.evict_component(&component, "idle timeout");
        }
    }

    /// Run `sweep_idle` on `config.sweep_interval` until `self` is dropped.
    /// Intended to be spawned once at startup.
    pub async fn run_idle_sweep_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        loop {
            ticker.tick().await;
            self.sweep_idle();
        }
    }

    /// Shut down every component: cancels all context scopes, transitions
    /// every component to `Shutdown`, and runs cleanup functions. Waits up
    /// to `grace_period` for in-flight `Get`s to observe the cancellation
    /// before forcing the transition regardless.
    pub async fn shutdown(&self, grace_period: Duration) {
        self.context.cancel_all();
        tokio::time::sleep(grace_period.min(Duration::from_millis(50))).await;
        for entry in self.components.iter() {
            let component = entry.value();
            if let Some(instance) = component.shutdown() {
                if let Some(cleanup) = component.cleanup_fn() {
                    cleanup(instance);
                }
            }
        }
        *self.reserved.lock().unwrap() = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    struct Widget(u32);

    fn spec_for(
        name: &str,
        priority: i32,
        memory_estimate: u64,
        init_calls: Arc<AtomicUsize>,
        delay: Duration,
    ) -> ComponentSpec {
        ComponentSpec {
            name: name.to_string(),
            priority,
            memory_estimate,
            timeout: Duration::from_secs(5),
            provider: Arc::new(move |_scope| {
                let init_calls = init_calls.clone();
                Box::pin(async move {
                    tokio::time::sleep(delay).await;
                    init_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(Widget(42)) as Instance)
                })
            }),
            cleanup: None,
        }
    }

    #[tokio::test]
    async fn concurrent_get_calls_initialize_the_provider_exactly_once() {
        let sup = Arc::new(Supervisor::new(SupervisorConfig::default(), Metrics::new()));
        let init_calls = Arc::new(AtomicUsize::new(0));
        sup.register(spec_for(
            "widget",
            0,
            0,
            init_calls.clone(),
            Duration::from_millis(20),
        ))
        .unwrap();

        let a = Arc::clone(&sup);
        let b = Arc::clone(&sup);
        let (r1, r2) = tokio::join!(a.get::<Widget>("widget"), b.get::<Widget>("widget"));
        assert!(r1.is_ok());
        assert!(r2.is_ok());
        assert_eq!(init_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_component_is_rejected() {
        let sup = Arc::new(Supervisor::new(SupervisorConfig::default(), Metrics::new()));
        let err = sup.get::<Widget>("missing").await.unwrap_err();
        assert!(matches!(err, SupervisorError::UnknownComponent(_)));
    }

    #[tokio::test]
    async fn cancelling_the_last_waiter_cancels_the_in_flight_provider() {
        let sup = Arc::new(Supervisor::new(SupervisorConfig::default(), Metrics::new()));
        let init_calls = Arc::new(AtomicUsize::new(0));
        sup.register(spec_for(
            "widget",
            0,
            0,
            init_calls.clone(),
            Duration::from_millis(30),
        ))
        .unwrap();

        let cancel = CancellationToken::new();
        let sup2 = Arc::clone(&sup);
        let cancel2 = cancel.clone();
        let handle = tokio::spawn(async move { sup2.get_with_cancellation::<Widget>("widget", cancel2).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel.cancel();
        let first = handle.await.unwrap();
        assert!(matches!(first, Err(SupervisorError::Canceled)));

        // The sole waiter abandoning the wait cancels the in-flight
        // provider; the component lands in `Failed` rather than `Ready`.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let component = sup.lookup("widget").unwrap();
        assert_eq!(component.state(), ComponentState::Failed);
        assert_eq!(init_calls.load(Ordering::SeqCst), 0);

        // After a reset, a fresh `Get` initializes it normally.
        sup.reset("widget").unwrap();
        let second = sup.get::<Widget>("widget").await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn admission_beyond_the_ceiling_fails_until_eviction_frees_room() {
        let config = SupervisorConfig::new(
            MemoryBudget::new(100),
            Duration::from_millis(10),
            Duration::from_secs(300),
            4,
            Duration::from_secs(5),
        );
        let sup = Arc::new(Supervisor::new(config, Metrics::new()));
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));
        sup.register(spec_for("a", 0, 80, calls_a, Duration::from_millis(0))).unwrap();
        sup.register(spec_for("b", 1, 80, calls_b, Duration::from_millis(0))).unwrap();

        let handle_a = sup.get::<Widget>("a").await.unwrap();
        drop(handle_a);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let result_b = sup.get::<Widget>("b").await;
        assert!(result_b.is_ok(), "evicting idle `a` should free enough room for `b`");
    }

    #[tokio::test]
    async fn admission_does_not_evict_a_component_that_is_not_yet_idle() {
        let config = SupervisorConfig::new(
            MemoryBudget::new(100),
            Duration::from_secs(1800),
            Duration::from_secs(300),
            4,
            Duration::from_secs(5),
        );
        let sup = Arc::new(Supervisor::new(config, Metrics::new()));
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));
        sup.register(spec_for("a", 0, 80, calls_a, Duration::from_millis(0))).unwrap();
        sup.register(spec_for("b", 1, 80, calls_b, Duration::from_millis(0))).unwrap();

        let handle_a = sup.get::<Widget>("a").await.unwrap();
        drop(handle_a); // a is ready but has been idle for only milliseconds

        // a has not been idle anywhere near config.idle_timeout (1800s), so
        // it must not be evicted to admit b.
        let result_b = sup.get::<Widget>("b").await;
        assert!(matches!(result_b, Err(SupervisorError::MemoryPressure)));
    }

    #[tokio::test]
    async fn warm_up_initializes_every_registered_component() {
        let sup = Arc::new(Supervisor::new(SupervisorConfig::default(), Metrics::new()));
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));
        sup.register(spec_for("a", 1, 0, calls_a.clone(), Duration::from_millis(0)))
            .unwrap();
        sup.register(spec_for("b", 0, 0, calls_b.clone(), Duration::from_millis(0)))
            .unwrap();

        sup.warm_up().await;
        assert_eq!(calls_a.load(Ordering::SeqCst), 1);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sweep_idle_evicts_ready_components_past_the_idle_timeout() {
        let config = SupervisorConfig::new(
            MemoryBudget::local(),
            Duration::from_millis(10),
            Duration::from_secs(300),
            4,
            Duration::from_secs(5),
        );
        let sup = Arc::new(Supervisor::new(config, Metrics::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        sup.register(spec_for("a", 0, 1024, calls, Duration::from_millis(0))).unwrap();

        let handle = sup.get::<Widget>("a").await.unwrap();
        drop(handle);
        tokio::time::sleep(Duration::from_millis(20)).await;
        sup.sweep_idle();

        let component = sup.lookup("a").unwrap();
        assert_eq!(component.state(), ComponentState::Uninitialized);
    }

    #[tokio::test]
    async fn shutdown_prevents_further_initialization() {
        let sup = Arc::new(Supervisor::new(SupervisorConfig::default(), Metrics::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        sup.register(spec_for("a", 0, 0, calls, Duration::from_millis(0))).unwrap();
        sup.shutdown(Duration::from_millis(1)).await;

        let err = sup.get::<Widget>("a").await.unwrap_err();
        assert!(matches!(err, SupervisorError::UnknownComponent(_)));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let sup = Supervisor::new(SupervisorConfig::default(), Metrics::new());
        let calls = Arc::new(AtomicUsize::new(0));
        sup.register(spec_for("a", 0, 0, calls.clone(), Duration::from_millis(0)))
            .unwrap();
        let err = sup
            .register(spec_for("a", 0, 0, calls, Duration::from_millis(0)))
            .unwrap_err();
        assert!(matches!(err, SupervisorError::DuplicateRegistration(_)));
    }
}
