// ============================================================================
// spark-sorted-map - Configuration
// Per-thread knobs for the reactive context
// ============================================================================

use super::context::with_context;

/// Whether observables may be read outside a tracked context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Reads are allowed anywhere.
    #[default]
    Never,

    /// Reads must happen inside an effect, a derived or a `batch`.
    Always,
}

/// Default cap on flush rounds before an effect loop is reported.
pub const DEFAULT_MAX_FLUSH_ITERATIONS: u32 = 1000;

/// Configuration held by the thread-local reactive context.
///
/// # Example
///
/// ```
/// use spark_sorted_map::{with_config, ReactiveConfig, ReadPolicy, current_config};
///
/// let strict = ReactiveConfig::default().with_read_policy(ReadPolicy::Always);
///
/// with_config(strict, || {
///     assert_eq!(current_config().read_policy, ReadPolicy::Always);
/// });
///
/// assert_eq!(current_config().read_policy, ReadPolicy::Never);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactiveConfig {
    pub read_policy: ReadPolicy,
    pub max_flush_iterations: u32,
}

impl ReactiveConfig {
    pub fn with_read_policy(mut self, policy: ReadPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    pub fn with_max_flush_iterations(mut self, iterations: u32) -> Self {
        self.max_flush_iterations = iterations.max(1);
        self
    }
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            read_policy: ReadPolicy::Never,
            max_flush_iterations: DEFAULT_MAX_FLUSH_ITERATIONS,
        }
    }
}

/// Replace the current thread's configuration, returning the previous one.
pub fn configure(config: ReactiveConfig) -> ReactiveConfig {
    with_context(|ctx| ctx.config.replace(config))
}

/// Snapshot of the current thread's configuration.
pub fn current_config() -> ReactiveConfig {
    with_context(|ctx| ctx.config.borrow().clone())
}

/// Run `f` with `config` installed, restoring the previous configuration
/// afterwards (also on panic).
pub fn with_config<T>(config: ReactiveConfig, f: impl FnOnce() -> T) -> T {
    struct RestoreGuard {
        prev: Option<ReactiveConfig>,
    }

    impl Drop for RestoreGuard {
        fn drop(&mut self) {
            if let Some(prev) = self.prev.take() {
                configure(prev);
            }
        }
    }

    let _guard = RestoreGuard {
        prev: Some(configure(config)),
    };
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ReactiveConfig::default();
        assert_eq!(config.read_policy, ReadPolicy::Never);
        assert_eq!(config.max_flush_iterations, DEFAULT_MAX_FLUSH_ITERATIONS);
    }

    #[test]
    fn configure_returns_previous() {
        let prev = configure(ReactiveConfig::default().with_max_flush_iterations(5));
        assert_eq!(current_config().max_flush_iterations, 5);
        configure(prev);
        assert_eq!(
            current_config().max_flush_iterations,
            DEFAULT_MAX_FLUSH_ITERATIONS
        );
    }

    #[test]
    fn with_config_restores_on_panic() {
        let result = std::panic::catch_unwind(|| {
            with_config(
                ReactiveConfig::default().with_read_policy(ReadPolicy::Always),
                || panic!("boom"),
            )
        });
        assert!(result.is_err());
        assert_eq!(current_config().read_policy, ReadPolicy::Never);
    }

    #[test]
    fn zero_iterations_is_clamped() {
        let config = ReactiveConfig::default().with_max_flush_iterations(0);
        assert_eq!(config.max_flush_iterations, 1);
    }
}
