//! # Probability Checks

/// Check that a value is a legal probability.
///
/// # Returns
///
/// The value, unchanged.
///
/// # Panics
///
/// If the value is not in ``[0, 1]``.
#[inline(always)]
pub fn expect_probability(prob: f64) -> f64 {
    assert!(
        (0.0..=1.0).contains(&prob),
        "Probability must be in [0, 1]: {prob}"
    );
    prob
}
