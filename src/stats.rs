// Latency statistics over duration samples: mean and nearest-rank percentile.

/// Nearest-rank percentile: returns an observed sample value, no interpolation.
/// `sorted` must be non-empty and ascending; the caller guards the empty case.
pub fn percentile(sorted: &[i64], p: u8) -> i64 {
    assert!(!sorted.is_empty(), "percentile over an empty sample");
    debug_assert!(p <= 100);
    let n = sorted.len();
    let rank = ((p as f64 / 100.0) * n as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(n - 1);
    sorted[index]
}

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<i64>() as f64 / values.len() as f64
}
