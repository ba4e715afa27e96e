//! Self-Trade Prevention (STP) modes.
//!
//! Generalizes `spec.md` §4.1's coarse `self-cross-policy {forbid, allow}`
//! knob with the finer-grained STP behaviors the teacher's `stp.rs`
//! implemented, since the richer set is a strict superset: `allow` maps to
//! [`STPMode::None`] and `forbid` maps to [`STPMode::CancelTaker`], while
//! symbols that need maker-side or both-side cancellation can opt into
//! those modes directly.

use serde::{Deserialize, Serialize};

/// Self-trade prevention mode for a single symbol's book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum STPMode {
    /// No checks; orders from the same user may match freely. Maps to
    /// the spec's self-cross-policy `allow`.
    #[default]
    None,
    /// Cancel the remainder of the incoming (taker) order the instant a
    /// self-cross is detected; fills against other users up to that
    /// point stand. Maps to the spec's self-cross-policy `forbid`.
    CancelTaker,
    /// Cancel the resting (maker) order from the same user and continue
    /// sweeping the taker against the remaining book.
    CancelMaker,
    /// Cancel both the incoming order's remainder and the conflicting
    /// resting order; matching stops immediately.
    CancelBoth,
}

impl STPMode {
    /// `true` for any mode other than `None`.
    #[must_use]
    pub fn is_enabled(self) -> bool {
        self != STPMode::None
    }
}

impl std::fmt::Display for STPMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            STPMode::None => write!(f, "none"),
            STPMode::CancelTaker => write!(f, "cancel-taker"),
            STPMode::CancelMaker => write!(f, "cancel-maker"),
            STPMode::CancelBoth => write!(f, "cancel-both"),
        }
    }
}

/// The coarse self-cross-policy knob from `spec.md` §4.1/§6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelfCrossPolicy {
    /// Self-crosses are prevented (maps to `STPMode::CancelTaker`).
    Forbid,
    /// Self-crosses are allowed (maps to `STPMode::None`).
    Allow,
}

impl SelfCrossPolicy {
    /// The STP mode this policy maps to by default.
    #[must_use]
    pub fn to_stp_mode(self) -> STPMode {
        match self {
            SelfCrossPolicy::Forbid => STPMode::CancelTaker,
            SelfCrossPolicy::Allow => STPMode::None,
        }
    }
}
