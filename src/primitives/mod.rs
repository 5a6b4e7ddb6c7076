// ============================================================================
// spark-sorted-map - Primitives Module
// Reactions that consume tracked state: derived values and effects
// ============================================================================

pub mod derived;
pub mod effect;

pub use derived::{derived, Derived, DerivedInner};
pub use effect::{destroy_effect, effect, effect_tracking, update_effect, EffectFn, EffectInner};
