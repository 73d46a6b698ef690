//! Integer percentages rounded half-up, the only arithmetic the scores use.

/// `round(100 * numerator / denominator)`, 0 when `denominator` is 0, capped
/// at 100.
pub fn percent(numerator: usize, denominator: usize) -> u8 {
    if denominator == 0 {
        return 0;
    }
    let numerator = numerator.min(denominator) as u64;
    let denominator = denominator as u64;
    ((200 * numerator + denominator) / (2 * denominator)) as u8
}

/// Rounded arithmetic mean, 0 for an empty slice.
pub fn rounded_mean(values: &[u8]) -> u8 {
    if values.is_empty() {
        return 0;
    }
    let sum: u64 = values.iter().map(|&v| u64::from(v)).sum();
    let count = values.len() as u64;
    ((2 * sum + count) / (2 * count)) as u8
}
