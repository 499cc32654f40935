//! Small numeric helpers shared across the crate.

/// Comparison tolerance for angular-scale bookkeeping. Scales of interest
/// span a few orders of magnitude around a degree, so a fixed epsilon is
/// adequate here.
const DOUBLE_TOLERANCE: f64 = 1.0e-10;

/// `a >= b` up to tolerance.
#[inline]
pub fn double_ge(a: f64, b: f64) -> bool {
    a > b - DOUBLE_TOLERANCE
}

/// `a <= b` up to tolerance.
#[inline]
pub fn double_le(a: f64, b: f64) -> bool {
    a < b + DOUBLE_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerant_comparisons() {
        assert!(double_ge(1.0, 1.0));
        assert!(double_ge(1.0 + 1.0e-12, 1.0));
        assert!(double_ge(1.0 - 1.0e-12, 1.0));
        assert!(!double_ge(0.9, 1.0));

        assert!(double_le(1.0, 1.0));
        assert!(double_le(1.0 + 1.0e-12, 1.0));
        assert!(!double_le(1.1, 1.0));
    }
}
