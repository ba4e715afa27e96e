//! Named, cancel-on-replace context scopes (`spec.md` §4.3 "Context
//! propagation"). New relative to the teacher — the supervisor itself has
//! no analog in `joaquinbejar-OrderBook-rs` — grounded on the
//! governor/resource-budget texture of `usealtoal-edgelord`'s runtime
//! layer and built on `tokio_util::sync::CancellationToken`.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A single named scope: a cancellation token plus arbitrary key-value
/// attachments, optionally bound to a deadline.
#[derive(Clone)]
pub struct Scope {
    name: String,
    token: CancellationToken,
    deadline: Option<Instant>,
    attributes: std::sync::Arc<Mutex<HashMap<String, String>>>,
}

impl Scope {
    /// This scope's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cancellation token providers should select against.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// `true` if this scope has been cancelled (explicitly, by deadline,
    /// or by being replaced).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Remaining time until this scope's deadline, if one was set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Attach a key-value pair to this scope, visible to anything holding
    /// a clone of it.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.lock().unwrap().insert(key.into(), value.into());
    }

    /// Read a previously attached attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes.lock().unwrap().get(key).cloned()
    }

    /// Resolve once this scope is cancelled, its deadline passes, or (if
    /// given) `timeout` elapses, whichever comes first.
    pub async fn cancelled(&self) {
        match self.remaining() {
            Some(remaining) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep(remaining) => { self.token.cancel(); }
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

/// Owns named scopes; creating a scope under a name already in use cancels
/// the prior scope of that name before installing the new one.
#[derive(Default)]
pub struct ContextPropagator {
    scopes: DashMap<String, Scope>,
}

impl ContextPropagator {
    /// Create an empty propagator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) the scope named `name`. A prior scope under the
    /// same name is cancelled first.
    pub fn scope(&self, name: impl Into<String>) -> Scope {
        self.scope_with_timeout(name, None)
    }

    /// As [`scope`](Self::scope), with a deadline `timeout` from now.
    pub fn scope_with_timeout(&self, name: impl Into<String>, timeout: Option<Duration>) -> Scope {
        let name = name.into();
        if let Some((_, prior)) = self.scopes.remove(&name) {
            debug!(scope = %name, "cancelling prior scope of the same name");
            prior.token.cancel();
        }
        let scope = Scope {
            name: name.clone(),
            token: CancellationToken::new(),
            deadline: timeout.map(|d| Instant::now() + d),
            attributes: std::sync::Arc::new(Mutex::new(HashMap::new())),
        };
        self.scopes.insert(name, scope.clone());
        scope
    }

    /// Look up a currently installed scope by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Scope> {
        self.scopes.get(name).map(|s| s.clone())
    }

    /// Cancel every installed scope (used by supervisor shutdown).
    pub fn cancel_all(&self) {
        for entry in self.scopes.iter() {
            entry.value().token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creating_a_scope_under_the_same_name_cancels_the_prior_one() {
        let propagator = ContextPropagator::new();
        let first = propagator.scope("warmup");
        assert!(!first.is_cancelled());
        let _second = propagator.scope("warmup");
        assert!(first.is_cancelled());
    }

    #[tokio::test]
    async fn attributes_are_visible_through_clones() {
        let propagator = ContextPropagator::new();
        let scope = propagator.scope("init");
        scope.set_attribute("component", "engine");
        let looked_up = propagator.get("init").unwrap();
        assert_eq!(looked_up.attribute("component").as_deref(), Some("engine"));
    }

    #[tokio::test]
    async fn cancel_all_cancels_every_scope() {
        let propagator = ContextPropagator::new();
        let a = propagator.scope("a");
        let b = propagator.scope("b");
        propagator.cancel_all();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }
}
