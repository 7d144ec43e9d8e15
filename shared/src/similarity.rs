//! Edit-distance similarity between normalized strings.

/// Levenshtein distance over Unicode scalar values with unit cost for
/// insertion, deletion and substitution.
pub use strsim::levenshtein;

/// `(max_len - distance) / max_len`, in `[0, 1]`. Two empty strings count as
/// identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    // not normalized_levenshtein: `1 - d / max` can land one ulp off this
    (max_len - levenshtein(a, b)) as f64 / max_len as f64
}
