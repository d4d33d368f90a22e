//! Raw distance-to-scale curves
//!
//! Each curve maps `distance` relative to `reference` to a dimensionless
//! scale: exactly 1 at the reference distance, larger when closer, smaller
//! when farther, and never increasing with distance. Clamping and the
//! near-zero guard are applied by the calculator, not here.

/// `reference / distance`
pub fn linear(distance: f64, reference: f64) -> f64 {
    reference / distance
}

/// `(reference / distance)^exponent`
pub fn inverse_square(distance: f64, reference: f64, exponent: f64) -> f64 {
    (reference / distance).powf(exponent)
}

/// Logarithmic falloff in the given base
///
/// With `x = distance / reference` the scale is `1 - log_b(x)` inside the
/// reference distance and `1 / (1 + log_b(x))` beyond it, continuous at 1.
pub fn logarithmic(distance: f64, reference: f64, base: f64) -> f64 {
    let ratio = distance / reference;
    let log = ratio.ln() / base.ln();
    if ratio < 1.0 {
        1.0 - log
    } else {
        1.0 / (1.0 + log)
    }
}
