//! Success-rate arithmetic shared by reports and summaries.

/// Fraction of attempts that succeeded, in `[0.0, 1.0]`.
///
/// An empty run has a rate of zero rather than NaN.
pub fn success_rate(successes: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    successes as f64 / total as f64
}

/// Success rate as a percentage.
pub fn success_percentage(successes: usize, total: usize) -> f64 {
    success_rate(successes, total) * 100.0
}

/// `"s/N (p%)"`, with the percentage rounded to a whole number.
pub fn format_success_rate(successes: usize, total: usize) -> String {
    format!(
        "{successes}/{total} ({:.0}%)",
        success_percentage(successes, total)
    )
}
