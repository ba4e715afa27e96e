//! Lazy component supervisor error types.

use crate::common::error::ErrorKind;
use std::fmt;

/// Errors raised by [`crate::supervisor::Supervisor`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SupervisorError {
    /// No component is registered under that name.
    UnknownComponent(String),
    /// The provider function failed; carries its detail message.
    ProviderFailed(String),
    /// The provider did not complete within the component's configured
    /// timeout.
    ProviderTimeout,
    /// The calling `Get`'s own cancellation token fired before
    /// initialization completed. Other waiters are unaffected.
    Canceled,
    /// Admission would exceed the memory ceiling even after attempting
    /// eviction of idle components.
    MemoryPressure,
    /// A component is already registered under that name.
    DuplicateRegistration(String),
}

impl SupervisorError {
    /// Stable error-kind tag, per `spec.md` §7.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SupervisorError::UnknownComponent(_) | SupervisorError::DuplicateRegistration(_) => {
                ErrorKind::Validation
            }
            SupervisorError::ProviderFailed(_)
            | SupervisorError::ProviderTimeout
            | SupervisorError::Canceled => ErrorKind::Initialization,
            SupervisorError::MemoryPressure => ErrorKind::Resource,
        }
    }
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorError::UnknownComponent(name) => write!(f, "unknown component: {name}"),
            SupervisorError::ProviderFailed(detail) => write!(f, "provider failed: {detail}"),
            SupervisorError::ProviderTimeout => write!(f, "provider initialization timed out"),
            SupervisorError::Canceled => write!(f, "get canceled"),
            SupervisorError::MemoryPressure => write!(f, "memory pressure: ceiling would be exceeded"),
            SupervisorError::DuplicateRegistration(name) => {
                write!(f, "component already registered: {name}")
            }
        }
    }
}

impl std::error::Error for SupervisorError {}
