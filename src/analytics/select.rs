//! Top-N selection.

/// The `n` items with the largest `key`, descending. Ties keep input order,
/// so applying the selection twice gives the same list.
pub fn top_n<T: Clone>(items: &[T], n: usize, key: impl Fn(&T) -> f64) -> Vec<T> {
    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by(|a, b| key(b).total_cmp(&key(a)));
    sorted.into_iter().take(n).cloned().collect()
}
