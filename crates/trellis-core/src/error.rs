use std::error::Error as StdError;

use thiserror::Error;

use crate::lifecycle::LifecycleState;

/// Errors reported by the core. Every failure is a synchronous return value
/// at the call site; nothing is queued or delivered later.
#[derive(Debug, Error)]
pub enum TrellisError {
    /// An illegal lifecycle move was attempted, either because the state
    /// machine has no such edge (anything out of `Destroyed` included) or
    /// because the owner capped the registry below the requested level.
    /// The attempted call fails; the current state is unchanged.
    #[error("invalid lifecycle transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    /// `pop` was called on a stack holding a single entry. No state change.
    #[error("cannot pop the only back stack entry")]
    EmptyBackStack,

    /// A state or instance keeper was accessed after its owning component
    /// was destroyed. Indicates a usage bug in the owning component.
    #[error("keeper accessed after its owner was destroyed")]
    KeeperDestroyed,

    /// An instance keeper disposal was attempted while a disposal was
    /// already running (or had already completed). The attempt is a no-op.
    #[error("re-entrant instance keeper disposal")]
    ReentrantDisposal,

    /// `get_or_create` was called with a type that does not match the
    /// instance already retained under the key.
    #[error("retained instance under key `{key}` has a different type")]
    RetainedTypeMismatch { key: String },

    /// A router operation was attempted after the owning component's
    /// lifecycle reached `Destroyed`.
    #[error("router used after its owning component was destroyed")]
    RouterDestroyed,

    /// Encoding or decoding failed at the serialization boundary.
    #[error("codec failure")]
    Codec(#[source] Box<dyn StdError + Send + Sync + 'static>),
}

impl TrellisError {
    /// Wraps an arbitrary encode/decode failure.
    pub fn codec(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Codec(Box::new(source))
    }
}

pub type Result<T> = std::result::Result<T, TrellisError>;
