// ============================================================================
// spark-sorted-map - Constants
// Flag bitmasks shared by tracked cells, deriveds and effects
// ============================================================================

// =============================================================================
// NODE TYPE FLAGS
// =============================================================================

/// Plain source (a tracked cell)
pub const SOURCE: u32 = 1 << 0;

/// Lazily computed value; both a source and a reaction
pub const DERIVED: u32 = 1 << 1;

/// Eager side effect
pub const EFFECT: u32 = 1 << 2;

// =============================================================================
// STATUS FLAGS
// =============================================================================

/// Up to date
pub const CLEAN: u32 = 1 << 10;

/// A direct dependency changed
pub const DIRTY: u32 = 1 << 11;

/// An upstream derived may have changed
pub const MAYBE_DIRTY: u32 = 1 << 12;

/// Reaction is running and collecting dependencies
pub const REACTION_IS_UPDATING: u32 = 1 << 13;

/// Reaction was disposed and must never run again
pub const DESTROYED: u32 = 1 << 14;

// =============================================================================
// MASKS
// =============================================================================

/// Clears the three status bits, keeps everything else.
pub const STATUS_MASK: u32 = !(CLEAN | DIRTY | MAYBE_DIRTY);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_flags_are_distinct() {
        assert_eq!(CLEAN & DIRTY, 0);
        assert_eq!(DIRTY & MAYBE_DIRTY, 0);
        assert_eq!(CLEAN & MAYBE_DIRTY, 0);
    }

    #[test]
    fn status_mask_keeps_type_bits() {
        let flags = EFFECT | DIRTY | REACTION_IS_UPDATING;
        assert_eq!(flags & STATUS_MASK, EFFECT | REACTION_IS_UPDATING);
    }
}
