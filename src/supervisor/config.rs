//! Supervisor configuration: every knob from `spec.md` §6's
//! "memory-ceiling-bytes, idle-timeout, sweep-interval, warmup-parallelism,
//! per-component timeout-default" line item, in the style of
//! `usealtoal-edgelord/src/runtime/resource.rs`.

use crate::supervisor::memory::MemoryBudget;
use std::time::Duration;

/// Supervisor-wide tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Global memory ceiling for ready components.
    pub memory_budget: MemoryBudget,
    /// A ready, not-in-use component idle past this is eligible for
    /// eviction by the periodic sweep.
    pub idle_timeout: Duration,
    /// Interval between idle-eviction sweeps.
    pub sweep_interval: Duration,
    /// Maximum number of concurrent provider invocations during `WarmUp`.
    pub warmup_parallelism: usize,
    /// Timeout applied to a component's provider when none is specified
    /// at registration.
    pub default_timeout: Duration,
}

impl SupervisorConfig {
    /// Construct a config from explicit values.
    #[must_use]
    pub const fn new(
        memory_budget: MemoryBudget,
        idle_timeout: Duration,
        sweep_interval: Duration,
        warmup_parallelism: usize,
        default_timeout: Duration,
    ) -> Self {
        Self {
            memory_budget,
            idle_timeout,
            sweep_interval,
            warmup_parallelism,
            default_timeout,
        }
    }

    /// `spec.md` §4.3 defaults: 30 minute idle timeout, 5 minute sweep,
    /// warmup parallelism bound to the number of available CPUs.
    #[must_use]
    pub fn local() -> Self {
        Self::new(
            MemoryBudget::local(),
            Duration::from_secs(30 * 60),
            Duration::from_secs(5 * 60),
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            Duration::from_secs(10),
        )
    }

    /// Production preset: larger memory ceiling, same timing defaults.
    #[must_use]
    pub fn production() -> Self {
        Self {
            memory_budget: MemoryBudget::production(),
            ..Self::local()
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::local()
    }
}
