//! Shared helpers for score rounding and coordinate parsing.
//!
//! Scores keep full f64 precision internally (forecast training uses the
//! unrounded values); only reported records pass through `round2`.

/// Round a value to 2 decimal places.
///
/// Returns 0.0 for non-finite inputs (NaN, ±Inf), which can only arise from
/// degenerate provider data (e.g. a rating of "NaN").
pub(crate) fn round2(v: f64) -> f64 {
    if !v.is_finite() {
        tracing::warn!("round2 received non-finite value {}, defaulting to 0", v);
        return 0.0;
    }
    (v * 100.0).round() / 100.0
}

/// Parse a `"lng,lat"` location string into (longitude, latitude).
///
/// Returns None when either component is missing or not a number.
pub(crate) fn parse_location(location: &str) -> Option<(f64, f64)> {
    let mut parts = location.split(',');
    let longitude = parts.next()?.trim().parse::<f64>().ok()?;
    let latitude = parts.next()?.trim().parse::<f64>().ok()?;
    Some((longitude, latitude))
}
