// ============================================================================
// spark-sorted-map - Errors
// ============================================================================

use thiserror::Error;

/// Errors surfaced by the reactive map and its substrate.
///
/// All of them are raised synchronously, before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// `update` was called for a key that is not in the map and no
    /// `if_absent` fallback was supplied.
    #[error("key not found in `{map}` and no if_absent fallback was given")]
    KeyNotFound { map: String },

    /// An observable was read outside a reaction or transaction while the
    /// read policy is [`ReadPolicy::Always`](crate::ReadPolicy::Always).
    #[error(
        "`{name}` was read outside a reaction or batch; \
         the read policy requires observables to be read inside one"
    )]
    ReadOutsideReaction { name: String },

    /// Effects kept invalidating each other past the configured limit.
    #[error(
        "maximum update depth exceeded after {iterations} flush rounds; \
         an effect keeps triggering itself"
    )]
    FlushLoop { iterations: u32 },
}
