//! A single lazy component: at-most-once initialization via a
//! `tokio::sync::Notify` rendezvous (`spec.md` §3 "LazyComponent", §4.3
//! "At-most-once initialization").

use crate::supervisor::context::Scope;
use crate::supervisor::error::SupervisorError;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// A boxed, type-erased component instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// A boxed provider future.
pub type ProviderFuture = Pin<Box<dyn Future<Output = Result<Instance, String>> + Send>>;

/// A component's construction function. Receives the scope the supervisor
/// created for this initialization so it can honor cancellation
/// cooperatively.
pub type ProviderFn = Arc<dyn Fn(Scope) -> ProviderFuture + Send + Sync>;

/// A component's teardown function, run on `Reset` and `Shutdown`.
pub type CleanupFn = Arc<dyn Fn(Instance) + Send + Sync>;

/// Lifecycle state of a [`LazyComponent`], `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    /// Never initialized (or reset back to this state).
    Uninitialized,
    /// A provider invocation is in flight.
    Initializing,
    /// Successfully initialized; an instance is stored.
    Ready,
    /// The provider failed; an error is stored.
    Failed,
    /// The supervisor has shut down; no further `Get` will succeed.
    Shutdown,
}

struct Inner {
    state: ComponentState,
    instance: Option<Instance>,
    error: Option<SupervisorError>,
}

/// Static registration data for a component, supplied once at `Register`.
pub struct ComponentSpec {
    /// Unique component name.
    pub name: String,
    /// Warmup ordering; lower runs earlier.
    pub priority: i32,
    /// Estimated resident memory once ready, in bytes. Zero means
    /// "unknown": bypasses the budget check but never counts toward
    /// `reserved`.
    pub memory_estimate: u64,
    /// Maximum duration a single provider invocation may run.
    pub timeout: Duration,
    /// The construction function.
    pub provider: ProviderFn,
    /// Optional teardown function, run on `Reset`/`Shutdown`/eviction.
    pub cleanup: Option<CleanupFn>,
}

/// A registered lazy component: its static spec plus mutable lifecycle
/// state, a waiter rendezvous, and usage bookkeeping for eviction.
pub struct LazyComponent {
    spec: ComponentSpec,
    inner: Mutex<Inner>,
    notify: Notify,
    active_waiters: AtomicUsize,
    in_use: AtomicUsize,
    last_access: Mutex<Instant>,
    cancel: CancellationToken,
}

impl LazyComponent {
    /// Wrap `spec` in fresh, uninitialized lifecycle state.
    #[must_use]
    pub fn new(spec: ComponentSpec) -> Self {
        Self {
            spec,
            inner: Mutex::new(Inner {
                state: ComponentState::Uninitialized,
                instance: None,
                error: None,
            }),
            notify: Notify::new(),
            active_waiters: AtomicUsize::new(0),
            in_use: AtomicUsize::new(0),
            last_access: Mutex::new(Instant::now()),
            cancel: CancellationToken::new(),
        }
    }

    /// This component's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Warmup priority; lower runs earlier.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.spec.priority
    }

    /// Estimated resident memory once ready.
    #[must_use]
    pub fn memory_estimate(&self) -> u64 {
        self.spec.memory_estimate
    }

    /// Per-invocation timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.spec.timeout
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ComponentState {
        self.inner.lock().unwrap().state
    }

    /// Currently stored instance, if ready.
    #[must_use]
    pub fn instance(&self) -> Option<Instance> {
        self.inner.lock().unwrap().instance.clone()
    }

    /// Currently stored error, if failed.
    #[must_use]
    pub fn error(&self) -> Option<SupervisorError> {
        self.inner.lock().unwrap().error.clone()
    }

    /// Attempt to claim the right to run the provider: succeeds only from
    /// `Uninitialized`, transitioning to `Initializing`.
    pub fn try_begin_initializing(&self) -> bool {
        let mut guard = self.inner.lock().unwrap();
        if guard.state == ComponentState::Uninitialized {
            guard.state = ComponentState::Initializing;
            true
        } else {
            false
        }
    }

    /// Undo a `try_begin_initializing` that lost its memory admission
    /// check, returning to `Uninitialized` so a later `Get` can retry once
    /// budget frees up.
    pub fn revert_to_uninitialized(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.state = ComponentState::Uninitialized;
    }

    /// Store a successful result and release every waiter.
    pub fn complete_ready(&self, instance: Instance) {
        let mut guard = self.inner.lock().unwrap();
        guard.state = ComponentState::Ready;
        guard.instance = Some(instance);
        guard.error = None;
        drop(guard);
        *self.last_access.lock().unwrap() = Instant::now();
        self.notify.notify_waiters();
    }

    /// Store a failed result and release every waiter.
    pub fn complete_failed(&self, error: SupervisorError) {
        let mut guard = self.inner.lock().unwrap();
        guard.state = ComponentState::Failed;
        guard.instance = None;
        guard.error = Some(error);
        drop(guard);
        self.notify.notify_waiters();
    }

    /// Transition back to `Uninitialized`, returning the instance that
    /// should be passed to the cleanup function (if any).
    pub fn reset(&self) -> Option<Instance> {
        let mut guard = self.inner.lock().unwrap();
        let instance = guard.instance.take();
        guard.state = ComponentState::Uninitialized;
        guard.error = None;
        instance
    }

    /// Transition to `Shutdown`, returning the instance for cleanup.
    pub fn shutdown(&self) -> Option<Instance> {
        let mut guard = self.inner.lock().unwrap();
        let instance = guard.instance.take();
        guard.state = ComponentState::Shutdown;
        drop(guard);
        self.cancel.cancel();
        self.notify.notify_waiters();
        instance
    }

    /// The component's cleanup function, if registered.
    #[must_use]
    pub fn cleanup_fn(&self) -> Option<CleanupFn> {
        self.spec.cleanup.clone()
    }

    /// The component's provider function.
    #[must_use]
    pub fn provider_fn(&self) -> ProviderFn {
        self.spec.provider.clone()
    }

    /// Token cancelled when every active waiter has abandoned this
    /// initialization (supervisor cancels the in-flight provider).
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record that a new waiter has joined an in-flight initialization.
    pub fn enter_wait(&self) {
        self.active_waiters.fetch_add(1, Ordering::SeqCst);
    }

    /// Record that a waiter has left (success, failure, or its own
    /// cancellation). Returns `true` if this was the last active waiter,
    /// in which case the caller should cancel the in-flight provider.
    pub fn leave_wait(&self) -> bool {
        self.active_waiters.fetch_sub(1, Ordering::SeqCst) == 1
    }

    /// Wait for the current initialization to complete (ready or failed).
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    /// Mark this component as just accessed, for idle-eviction ordering.
    pub fn mark_accessed(&self) {
        *self.last_access.lock().unwrap() = Instant::now();
        self.in_use.fetch_add(1, Ordering::SeqCst);
    }

    /// Release a handle acquired via `mark_accessed`.
    pub fn release_use(&self) {
        self.in_use.fetch_sub(1, Ordering::SeqCst);
    }

    /// `true` if at least one live handle is currently held.
    #[must_use]
    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::SeqCst) > 0
    }

    /// How long since this component was last accessed.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_access.lock().unwrap().elapsed()
    }
}

/// A handle to a ready component's instance, downcast to its concrete
/// type. Decrements the component's in-use counter on drop, feeding the
/// idle-eviction ordering.
pub struct ComponentHandle<T: ?Sized> {
    instance: Arc<T>,
    component: Arc<LazyComponent>,
}

impl<T: ?Sized> ComponentHandle<T> {
    pub(crate) fn new(instance: Arc<T>, component: Arc<LazyComponent>) -> Self {
        Self { instance, component }
    }
}

impl<T: ?Sized> std::ops::Deref for ComponentHandle<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.instance
    }
}

impl<T: ?Sized> Drop for ComponentHandle<T> {
    fn drop(&mut self) {
        self.component.release_use();
    }
}

impl<T: ?Sized> Clone for ComponentHandle<T> {
    fn clone(&self) -> Self {
        self.component.mark_accessed();
        Self {
            instance: self.instance.clone(),
            component: self.component.clone(),
        }
    }
}
