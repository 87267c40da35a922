//! Point-budget enforcement by uniform stride thinning.
//!
//! This is a visual-sampling reducer, not a statistically faithful
//! summarizer: callers needing faithful aggregates use the window summary
//! instead of downsampled points.

/// Reduce `points` to at most `budget` elements by keeping every
/// stride-th element starting at index 0. Order is preserved; sequences
/// already within budget pass through unchanged.
pub fn limit<T>(points: Vec<T>, budget: usize) -> Vec<T> {
    if budget == 0 {
        return Vec::new();
    }
    if points.len() <= budget {
        return points;
    }

    let stride = points.len().div_ceil(budget);
    points
        .into_iter()
        .step_by(stride)
        .collect()
}
