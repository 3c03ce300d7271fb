//! Model name normalization: canonicalizes a raw wire model name so
//! `PricingMap::get` can find a fallback entry even when a session log
//! reports a dated or dotted variant of a name the pricing tables key on.

/// Normalize a model name to canonical form.
///
/// Transformations:
/// - Dots to hyphens: "claude-opus-4.5" -> "claude-opus-4-5"
/// - Strip an 8-digit `-YYYYMMDD` release-date suffix:
///   "claude-opus-4-5-20251101" -> "claude-opus-4-5"
pub fn normalize_model_name(model: &str) -> String {
    let normalized = model.replace('.', "-");

    if let Some(suffix_start) = normalized.rfind('-') {
        let suffix = &normalized[suffix_start + 1..];
        if suffix.len() == 8 && suffix.starts_with("20") && suffix.chars().all(|c| c.is_ascii_digit()) {
            return normalized[..suffix_start].to_string();
        }
    }

    normalized
}
