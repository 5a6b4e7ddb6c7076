// ============================================================================
// spark-sorted-map - Core Module
// Flags, graph traits, configuration, errors and the thread-local context
// ============================================================================

pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod types;

pub use config::{configure, current_config, with_config, ReactiveConfig, ReadPolicy};
pub use context::{is_batching, is_tracking, is_untracking, with_context, ReactiveContext};
pub use error::ReactiveError;
pub use types::{AnyReaction, AnySource};
