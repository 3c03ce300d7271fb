//! Canonical token usage model: raw wire snapshots, normalized usage,
//! events, and the day/session/week summary shapes the aggregation
//! pipeline produces.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Wire-level snapshot of the six counters a single log record can carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawUsage {
    pub input_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_output_tokens: u64,
    pub total_tokens: u64,
}

impl RawUsage {
    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0
            && self.cache_creation_input_tokens == 0
            && self.cached_input_tokens == 0
            && self.output_tokens == 0
            && self.reasoning_output_tokens == 0
            && self.total_tokens == 0
    }
}

/// Normalized usage: same six counters as `RawUsage`, after the
/// per-provider "cached overlaps input" rule has been applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn from_raw(raw: RawUsage) -> Self {
        Self {
            input_tokens: raw.input_tokens,
            cache_creation_input_tokens: raw.cache_creation_input_tokens,
            cached_input_tokens: raw.cached_input_tokens,
            output_tokens: raw.output_tokens,
            reasoning_output_tokens: raw.reasoning_output_tokens,
            total_tokens: raw.total_tokens,
        }
    }

    /// Per-field saturating subtraction against the previous cumulative
    /// snapshot. When `previous` is `None` the current snapshot is
    /// returned verbatim (used by the first record in a cumulative
    /// session, e.g. Gemini/Codex totals).
    pub fn delta_from(current: RawUsage, previous: Option<RawUsage>) -> Self {
        let Some(prev) = previous else {
            return Self::from_raw(current);
        };
        Self {
            input_tokens: current.input_tokens.saturating_sub(prev.input_tokens),
            cache_creation_input_tokens: current
                .cache_creation_input_tokens
                .saturating_sub(prev.cache_creation_input_tokens),
            cached_input_tokens: current
                .cached_input_tokens
                .saturating_sub(prev.cached_input_tokens),
            output_tokens: current.output_tokens.saturating_sub(prev.output_tokens),
            reasoning_output_tokens: current
                .reasoning_output_tokens
                .saturating_sub(prev.reasoning_output_tokens),
            total_tokens: current.total_tokens.saturating_sub(prev.total_tokens),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0
            && self.cache_creation_input_tokens == 0
            && self.cached_input_tokens == 0
            && self.output_tokens == 0
            && self.reasoning_output_tokens == 0
            && self.total_tokens == 0
    }

    /// The "logical input" spend basis for this usage, computed from the
    /// *pre-normalization* raw values by the caller. See
    /// `normalize_usage_delta` for why this must happen before the
    /// overlap clamp runs.
    pub fn display_input_tokens(&self, cached_counts_overlap_input: bool) -> u64 {
        if cached_counts_overlap_input {
            self.input_tokens
        } else {
            self.input_tokens
                .saturating_add(self.cached_input_tokens)
                .saturating_add(self.cache_creation_input_tokens)
        }
    }

    fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.cache_creation_input_tokens = self
            .cache_creation_input_tokens
            .saturating_add(other.cache_creation_input_tokens);
        self.cached_input_tokens = self
            .cached_input_tokens
            .saturating_add(other.cached_input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.reasoning_output_tokens = self
            .reasoning_output_tokens
            .saturating_add(other.reasoning_output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// Clamp `input_tokens` so that, for providers whose cached counts
/// overlap their input counts (Codex), the stored `input_tokens` becomes
/// the non-cached remainder. Providers where cached tokens are additive
/// to input (`cached_counts_overlap_input = false`) are untouched.
///
/// Must be called on the *delta* usage exactly once, before any
/// `display_input_tokens` computation (display math is derived from the
/// un-clamped value). Applying it a second time to an already-clamped
/// value whose cache fields are zero, or whose cache fields already
/// exceed `input_tokens`, is a no-op: the clamp saturates at its fixed
/// point.
pub fn normalize_usage_delta(mut u: TokenUsage, cached_counts_overlap_input: bool) -> TokenUsage {
    if cached_counts_overlap_input {
        let overlap = u
            .cached_input_tokens
            .saturating_add(u.cache_creation_input_tokens);
        u.input_tokens = u.input_tokens.saturating_sub(overlap);
    }
    u
}

/// Per-session-file scratch tracking the model currently in effect.
#[derive(Debug, Clone, Default)]
pub struct ModelState {
    pub current_model: Option<String>,
    pub is_fallback: bool,
}

impl ModelState {
    pub fn set(&mut self, model: String) {
        self.current_model = Some(model);
        self.is_fallback = false;
    }
}

/// A single normalized usage-bearing record, the atom of the aggregation
/// pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenUsageEvent {
    pub session_id: String,
    pub timestamp: String,
    pub local_iso_date: String,
    pub model_name: String,
    pub usage: TokenUsage,
    pub is_fallback_model: bool,
    pub display_input_tokens: u64,
}

/// Classification of a usage-record field name (see `usage_field_for_key`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageField {
    Input,
    CacheCreation,
    Cached,
    Output,
    Reasoning,
    Total,
}

/// Map a raw JSON key name onto a canonical usage field. Unknown keys
/// return `None` and are ignored by callers.
pub fn usage_field_for_key(name: &str) -> Option<UsageField> {
    match name {
        "input_tokens" | "prompt_tokens" | "input" => Some(UsageField::Input),
        "cache_creation_input_tokens" | "cache_write" => Some(UsageField::CacheCreation),
        "cache_read_input_tokens" | "cached" | "cached_input_tokens" => Some(UsageField::Cached),
        "output_tokens" | "completion_tokens" | "output" => Some(UsageField::Output),
        "reasoning_output_tokens" | "thoughts" => Some(UsageField::Reasoning),
        "total_tokens" | "total" => Some(UsageField::Total),
        _ => None,
    }
}

/// Tolerant u64 parser: accepts integers, truncates floats, skips
/// thousand-separator commas, returns 0 on malformed input.
pub fn parse_token_number(s: &str) -> u64 {
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    if let Ok(v) = cleaned.parse::<u64>() {
        return v;
    }
    if let Ok(f) = cleaned.parse::<f64>() {
        if f.is_finite() && f >= 0.0 {
            return f as u64;
        }
    }
    0
}

/// Accumulates field updates from a single session record into a
/// `RawUsage`. Cache/cached/output/reasoning fields are additive across
/// calls; `input` and `total` overwrite the last-seen value instead of
/// accumulating (they arrive as already-cumulative or already-final
/// counts on most providers' wire formats).
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageAccumulator {
    input: u64,
    cache_creation: u64,
    cached: u64,
    output: u64,
    reasoning: u64,
    total: u64,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_field(&mut self, field: UsageField, value: u64) {
        match field {
            UsageField::Input => self.input = value,
            UsageField::Total => self.total = value,
            UsageField::CacheCreation => self.cache_creation = self.cache_creation.saturating_add(value),
            UsageField::Cached => self.cached = self.cached.saturating_add(value),
            UsageField::Output => self.output = self.output.saturating_add(value),
            UsageField::Reasoning => self.reasoning = self.reasoning.saturating_add(value),
        }
    }

    pub fn finalize(self) -> RawUsage {
        RawUsage {
            input_tokens: self.input,
            cache_creation_input_tokens: self.cache_creation,
            cached_input_tokens: self.cached,
            output_tokens: self.output,
            reasoning_output_tokens: self.reasoning,
            total_tokens: self.total,
        }
    }
}

/// USD-per-million-token pricing for one model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricingEntry {
    pub input_cost_per_million: f64,
    pub cache_creation_cost_per_million: f64,
    pub cached_input_cost_per_million: f64,
    pub output_cost_per_million: f64,
    pub reasoning_output_cost_per_million: Option<f64>,
}

impl PricingEntry {
    pub fn cost_usd(&self, usage: &TokenUsage) -> f64 {
        let reasoning_rate = self
            .reasoning_output_cost_per_million
            .unwrap_or(self.output_cost_per_million);
        (usage.input_tokens as f64 * self.input_cost_per_million / 1_000_000.0)
            + (usage.cache_creation_input_tokens as f64 * self.cache_creation_cost_per_million
                / 1_000_000.0)
            + (usage.cached_input_tokens as f64 * self.cached_input_cost_per_million / 1_000_000.0)
            + (usage.output_tokens as f64 * self.output_cost_per_million / 1_000_000.0)
            + (usage.reasoning_output_tokens as f64 * reasoning_rate / 1_000_000.0)
    }
}

/// `model_name -> PricingEntry`, populated from an optional remote
/// manifest and then per-provider fallback tables. Fallback inserts
/// never overwrite a present entry.
#[derive(Debug, Clone, Default)]
pub struct PricingMap {
    entries: BTreeMap<String, PricingEntry>,
}

impl PricingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unconditionally (used when loading the authoritative
    /// remote manifest, which always wins).
    pub fn insert(&mut self, name: impl Into<String>, entry: PricingEntry) {
        self.entries.insert(name.into(), entry);
    }

    /// Insert only if the key is absent (used for fallback tables).
    pub fn insert_fallback(&mut self, name: impl Into<String>, entry: PricingEntry) {
        self.entries.entry(name.into()).or_insert(entry);
    }

    /// Exact-name lookup, falling back to a normalized alias (dots to
    /// hyphens, trailing release-date suffix stripped) when the exact
    /// name is absent.
    pub fn get(&self, name: &str) -> Option<&PricingEntry> {
        if let Some(entry) = self.entries.get(name) {
            return Some(entry);
        }
        let alias = crate::services::normalizer::normalize_model_name(name);
        if alias != name {
            return self.entries.get(&alias);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-model slice of a day/session/week summary.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub usage: TokenUsage,
    pub display_input_tokens: u64,
    pub cost_usd: f64,
    pub pricing_available: bool,
    pub is_fallback: bool,
}

impl ModelSummary {
    fn new(name: String) -> Self {
        Self {
            name,
            usage: TokenUsage::default(),
            display_input_tokens: 0,
            cost_usd: 0.0,
            pricing_available: false,
            is_fallback: false,
        }
    }

    fn add_event(&mut self, event: &TokenUsageEvent) {
        self.usage.accumulate(&event.usage);
        self.display_input_tokens = self
            .display_input_tokens
            .saturating_add(event.display_input_tokens);
        if event.is_fallback_model {
            self.is_fallback = true;
        }
    }

    fn apply_pricing(&mut self, pricing: &PricingMap, missing: &mut BTreeSet<String>) {
        match pricing.get(&self.name) {
            Some(entry) => {
                self.cost_usd = entry.cost_usd(&self.usage);
                self.pricing_available = true;
            }
            None => {
                self.cost_usd = 0.0;
                self.pricing_available = false;
                missing.insert(self.name.clone());
            }
        }
    }
}

/// Aggregate usage for all events sharing one `local_iso_date`.
#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub iso_date: String,
    pub display_date: String,
    pub usage: TokenUsage,
    pub display_input_tokens: u64,
    pub cost_usd: f64,
    pub models: BTreeMap<String, ModelSummary>,
    pub missing_pricing: BTreeSet<String>,
}

/// Aggregate usage for all events sharing one `session_id`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub first_seen_timestamp: String,
    pub last_seen_timestamp: String,
    pub usage: TokenUsage,
    pub display_input_tokens: u64,
    pub cost_usd: f64,
    pub model_breakdown: BTreeMap<String, ModelSummary>,
}

/// Aggregate usage for all events falling in one ISO-8601 week
/// (Mon-Sun, weeks belong to the year of their Thursday).
#[derive(Debug, Clone, Serialize)]
pub struct WeeklySummary {
    pub iso_year: i32,
    pub iso_week: u32,
    pub start_date: String,
    pub end_date: String,
    pub usage: TokenUsage,
    pub display_input_tokens: u64,
    pub cost_usd: f64,
    pub model_breakdown: BTreeMap<String, ModelSummary>,
    pub missing_pricing: BTreeSet<String>,
}

/// Cross-day roll-up; same shape as `DailySummary` minus the per-day key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryTotals {
    pub usage: TokenUsage,
    pub display_input_tokens: u64,
    pub cost_usd: f64,
    pub missing_pricing: BTreeSet<String>,
}

impl DailySummary {
    fn new(iso_date: String, display_date: String) -> Self {
        Self {
            iso_date,
            display_date,
            usage: TokenUsage::default(),
            display_input_tokens: 0,
            cost_usd: 0.0,
            models: BTreeMap::new(),
            missing_pricing: BTreeSet::new(),
        }
    }

    pub fn add_event(&mut self, event: &TokenUsageEvent) {
        self.usage.accumulate(&event.usage);
        self.display_input_tokens = self
            .display_input_tokens
            .saturating_add(event.display_input_tokens);
        self.models
            .entry(event.model_name.clone())
            .or_insert_with(|| ModelSummary::new(event.model_name.clone()))
            .add_event(event);
    }

    pub fn apply_pricing(&mut self, pricing: &PricingMap) {
        self.cost_usd = 0.0;
        for model in self.models.values_mut() {
            model.apply_pricing(pricing, &mut self.missing_pricing);
            self.cost_usd += model.cost_usd;
        }
    }
}

impl SessionSummary {
    fn new(session_id: String, timestamp: String) -> Self {
        Self {
            session_id,
            first_seen_timestamp: timestamp.clone(),
            last_seen_timestamp: timestamp,
            usage: TokenUsage::default(),
            display_input_tokens: 0,
            cost_usd: 0.0,
            model_breakdown: BTreeMap::new(),
        }
    }

    pub fn add_event(&mut self, event: &TokenUsageEvent) {
        if event.timestamp < self.first_seen_timestamp {
            self.first_seen_timestamp = event.timestamp.clone();
        }
        if event.timestamp > self.last_seen_timestamp {
            self.last_seen_timestamp = event.timestamp.clone();
        }
        self.usage.accumulate(&event.usage);
        self.display_input_tokens = self
            .display_input_tokens
            .saturating_add(event.display_input_tokens);
        self.model_breakdown
            .entry(event.model_name.clone())
            .or_insert_with(|| ModelSummary::new(event.model_name.clone()))
            .add_event(event);
    }

    pub fn apply_pricing(&mut self, pricing: &PricingMap) {
        self.cost_usd = 0.0;
        let mut missing = BTreeSet::new();
        for model in self.model_breakdown.values_mut() {
            model.apply_pricing(pricing, &mut missing);
            self.cost_usd += model.cost_usd;
        }
    }
}

impl WeeklySummary {
    fn new(iso_year: i32, iso_week: u32, start_date: String, end_date: String) -> Self {
        Self {
            iso_year,
            iso_week,
            start_date,
            end_date,
            usage: TokenUsage::default(),
            display_input_tokens: 0,
            cost_usd: 0.0,
            model_breakdown: BTreeMap::new(),
            missing_pricing: BTreeSet::new(),
        }
    }

    pub fn add_event(&mut self, event: &TokenUsageEvent) {
        self.usage.accumulate(&event.usage);
        self.display_input_tokens = self
            .display_input_tokens
            .saturating_add(event.display_input_tokens);
        self.model_breakdown
            .entry(event.model_name.clone())
            .or_insert_with(|| ModelSummary::new(event.model_name.clone()))
            .add_event(event);
    }

    pub fn apply_pricing(&mut self, pricing: &PricingMap) {
        self.cost_usd = 0.0;
        for model in self.model_breakdown.values_mut() {
            model.apply_pricing(pricing, &mut self.missing_pricing);
            self.cost_usd += model.cost_usd;
        }
    }
}

/// Factory helpers so the aggregation pipeline can allocate summaries on
/// first sight of a key without repeating their construction logic.
pub fn new_daily_summary(iso_date: String, display_date: String) -> DailySummary {
    DailySummary::new(iso_date, display_date)
}

pub fn new_session_summary(session_id: String, first_timestamp: String) -> SessionSummary {
    SessionSummary::new(session_id, first_timestamp)
}

pub fn new_weekly_summary(
    iso_year: i32,
    iso_week: u32,
    start_date: String,
    end_date: String,
) -> WeeklySummary {
    WeeklySummary::new(iso_year, iso_week, start_date, end_date)
}

/// Bounded hash set of 64-bit fingerprints used to suppress duplicate
/// `(message.id, request.id)` pairs when a provider's session file is
/// re-processed. Backed by `std::collections::HashSet`, whose hashbrown
/// implementation is already an open-addressed table with a fixed max
/// load factor.
#[derive(Debug, Default)]
pub struct MessageDeduper {
    seen: HashSet<u64>,
}

impl MessageDeduper {
    pub fn init(cap: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(cap),
        }
    }

    /// Returns `false` if the fingerprint was already present.
    pub fn mark(&mut self, hash: u64) -> bool {
        self.seen.insert(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(input: u64, cc: u64, cached: u64, output: u64, reasoning: u64, total: u64) -> RawUsage {
        RawUsage {
            input_tokens: input,
            cache_creation_input_tokens: cc,
            cached_input_tokens: cached,
            output_tokens: output,
            reasoning_output_tokens: reasoning,
            total_tokens: total,
        }
    }

    #[test]
    fn delta_from_none_returns_verbatim() {
        let current = raw(100, 0, 20, 50, 0, 170);
        let delta = TokenUsage::delta_from(current, None);
        assert_eq!(delta, TokenUsage::from_raw(current));
    }

    #[test]
    fn delta_from_some_subtracts_each_field() {
        let prev = raw(100, 0, 20, 50, 0, 170);
        let current = raw(250, 0, 60, 120, 10, 440);
        let delta = TokenUsage::delta_from(current, Some(prev));
        assert_eq!(delta.input_tokens, 150);
        assert_eq!(delta.cached_input_tokens, 40);
        assert_eq!(delta.output_tokens, 70);
        assert_eq!(delta.reasoning_output_tokens, 10);
        assert_eq!(delta.total_tokens, 270);
    }

    #[test]
    fn delta_from_decrease_clamps_to_zero() {
        let prev = raw(100, 0, 20, 50, 0, 170);
        let current = raw(90, 0, 15, 40, 0, 145);
        let delta = TokenUsage::delta_from(current, Some(prev));
        assert_eq!(delta.input_tokens, 0);
        assert_eq!(delta.cached_input_tokens, 0);
        assert_eq!(delta.output_tokens, 0);
    }

    #[test]
    fn cumulative_sum_of_deltas_equals_terminal_total() {
        let totals = [
            raw(100, 0, 10, 50, 0, 160),
            raw(250, 0, 30, 120, 0, 400),
            raw(400, 0, 60, 200, 0, 660),
        ];
        let mut prev: Option<RawUsage> = None;
        let mut sum = TokenUsage::default();
        for t in totals {
            let delta = TokenUsage::delta_from(t, prev);
            sum.accumulate(&delta);
            prev = Some(t);
        }
        let terminal = totals.last().unwrap();
        assert_eq!(sum.input_tokens, terminal.input_tokens);
        assert_eq!(sum.output_tokens, terminal.output_tokens);
        assert_eq!(sum.total_tokens, terminal.total_tokens);
    }

    #[test]
    fn normalize_usage_delta_overlap_mode_subtracts_cache() {
        let u = TokenUsage {
            input_tokens: 1000,
            cache_creation_input_tokens: 0,
            cached_input_tokens: 200,
            output_tokens: 50,
            reasoning_output_tokens: 0,
            total_tokens: 1250,
        };
        let normalized = normalize_usage_delta(u, true);
        assert_eq!(normalized.input_tokens, 800);
        assert_eq!(normalized.cached_input_tokens, 200);
    }

    #[test]
    fn normalize_usage_delta_non_overlap_mode_is_noop() {
        let u = TokenUsage {
            input_tokens: 100,
            cache_creation_input_tokens: 10,
            cached_input_tokens: 20,
            output_tokens: 50,
            reasoning_output_tokens: 0,
            total_tokens: 180,
        };
        let normalized = normalize_usage_delta(u, false);
        assert_eq!(normalized, u);
    }

    #[test]
    fn normalize_usage_delta_idempotent_at_saturated_fixed_point() {
        // cache already exceeds input: clamps to 0 and stays at 0.
        let u = TokenUsage {
            input_tokens: 50,
            cache_creation_input_tokens: 0,
            cached_input_tokens: 200,
            output_tokens: 10,
            reasoning_output_tokens: 0,
            total_tokens: 260,
        };
        let once = normalize_usage_delta(u, true);
        let twice = normalize_usage_delta(once, true);
        assert_eq!(once.input_tokens, 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_usage_delta_idempotent_in_non_overlap_mode() {
        let u = TokenUsage {
            input_tokens: 100,
            cache_creation_input_tokens: 10,
            cached_input_tokens: 20,
            output_tokens: 50,
            reasoning_output_tokens: 0,
            total_tokens: 180,
        };
        let once = normalize_usage_delta(u, false);
        let twice = normalize_usage_delta(once, false);
        assert_eq!(once, twice);
    }

    #[test]
    fn display_input_tokens_overlap_mode_uses_input_only() {
        let u = TokenUsage {
            input_tokens: 1000,
            cache_creation_input_tokens: 0,
            cached_input_tokens: 200,
            output_tokens: 50,
            reasoning_output_tokens: 0,
            total_tokens: 1250,
        };
        assert_eq!(u.display_input_tokens(true), 1000);
    }

    #[test]
    fn display_input_tokens_additive_mode_sums_cache_fields() {
        let u = TokenUsage {
            input_tokens: 100,
            cache_creation_input_tokens: 10,
            cached_input_tokens: 20,
            output_tokens: 50,
            reasoning_output_tokens: 0,
            total_tokens: 180,
        };
        assert_eq!(u.display_input_tokens(false), 130);
    }

    #[test]
    fn usage_field_for_key_aliases() {
        assert_eq!(usage_field_for_key("prompt_tokens"), Some(UsageField::Input));
        assert_eq!(
            usage_field_for_key("cache_read_input_tokens"),
            Some(UsageField::Cached)
        );
        assert_eq!(
            usage_field_for_key("completion_tokens"),
            Some(UsageField::Output)
        );
        assert_eq!(usage_field_for_key("thoughts"), Some(UsageField::Reasoning));
        assert_eq!(usage_field_for_key("total"), Some(UsageField::Total));
        assert_eq!(usage_field_for_key("unknown_key"), None);
    }

    #[test]
    fn parse_token_number_variants() {
        assert_eq!(parse_token_number("1234"), 1234);
        assert_eq!(parse_token_number("1,234,567"), 1234567);
        assert_eq!(parse_token_number("12.9"), 12);
        assert_eq!(parse_token_number("not-a-number"), 0);
        assert_eq!(parse_token_number(""), 0);
    }

    #[test]
    fn usage_accumulator_input_and_total_overwrite() {
        let mut acc = UsageAccumulator::new();
        acc.apply_field(UsageField::Input, 100);
        acc.apply_field(UsageField::Input, 250);
        acc.apply_field(UsageField::Total, 10);
        acc.apply_field(UsageField::Total, 400);
        let raw = acc.finalize();
        assert_eq!(raw.input_tokens, 250);
        assert_eq!(raw.total_tokens, 400);
    }

    #[test]
    fn usage_accumulator_cache_fields_additive() {
        let mut acc = UsageAccumulator::new();
        acc.apply_field(UsageField::Cached, 20);
        acc.apply_field(UsageField::Cached, 30);
        acc.apply_field(UsageField::Output, 5);
        acc.apply_field(UsageField::Output, 7);
        let raw = acc.finalize();
        assert_eq!(raw.cached_input_tokens, 50);
        assert_eq!(raw.output_tokens, 12);
    }

    #[test]
    fn pricing_map_fallback_never_overwrites_present_entry() {
        let mut map = PricingMap::new();
        let entry_a = PricingEntry {
            input_cost_per_million: 1.0,
            cache_creation_cost_per_million: 0.0,
            cached_input_cost_per_million: 0.0,
            output_cost_per_million: 2.0,
            reasoning_output_cost_per_million: None,
        };
        let entry_b = PricingEntry {
            input_cost_per_million: 99.0,
            cache_creation_cost_per_million: 0.0,
            cached_input_cost_per_million: 0.0,
            output_cost_per_million: 99.0,
            reasoning_output_cost_per_million: None,
        };
        map.insert("gpt-5", entry_a);
        map.insert_fallback("gpt-5", entry_b);
        assert_eq!(map.get("gpt-5").unwrap().input_cost_per_million, 1.0);
    }

    #[test]
    fn pricing_entry_cost_usd_uses_output_rate_when_reasoning_rate_absent() {
        let entry = PricingEntry {
            input_cost_per_million: 1.25,
            cache_creation_cost_per_million: 0.0,
            cached_input_cost_per_million: 0.0,
            output_cost_per_million: 10.0,
            reasoning_output_cost_per_million: None,
        };
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            cache_creation_input_tokens: 0,
            cached_input_tokens: 0,
            output_tokens: 0,
            reasoning_output_tokens: 1_000_000,
            total_tokens: 2_000_000,
        };
        assert!((entry.cost_usd(&usage) - (1.25 + 10.0)).abs() < 0.01);
    }

    #[test]
    fn message_deduper_marks_first_seen_only() {
        let mut deduper = MessageDeduper::init(16);
        assert!(deduper.mark(42));
        assert!(!deduper.mark(42));
        assert!(deduper.mark(43));
    }

    fn make_event(model: &str, date: &str, session: &str, input: u64, output: u64) -> TokenUsageEvent {
        TokenUsageEvent {
            session_id: session.to_string(),
            timestamp: format!("{date}T00:00:00Z"),
            local_iso_date: date.to_string(),
            model_name: model.to_string(),
            usage: TokenUsage {
                input_tokens: input,
                cache_creation_input_tokens: 0,
                cached_input_tokens: 0,
                output_tokens: output,
                reasoning_output_tokens: 0,
                total_tokens: input + output,
            },
            is_fallback_model: false,
            display_input_tokens: input,
        }
    }

    #[test]
    fn daily_summary_usage_equals_sum_of_model_usages() {
        let mut day = new_daily_summary("2025-01-01".into(), "Jan 1, 2025".into());
        day.add_event(&make_event("gpt-5", "2025-01-01", "s1", 100, 50));
        day.add_event(&make_event("claude", "2025-01-01", "s1", 200, 75));

        let summed_input: u64 = day.models.values().map(|m| m.usage.input_tokens).sum();
        let summed_output: u64 = day.models.values().map(|m| m.usage.output_tokens).sum();
        assert_eq!(day.usage.input_tokens, summed_input);
        assert_eq!(day.usage.output_tokens, summed_output);
    }

    #[test]
    fn daily_summary_missing_pricing_tracks_priced_and_unpriced_models() {
        let mut day = new_daily_summary("2025-01-01".into(), "Jan 1, 2025".into());
        day.add_event(&make_event("priced-model", "2025-01-01", "s1", 100, 50));
        day.add_event(&make_event("unpriced-model", "2025-01-01", "s1", 100, 50));

        let mut pricing = PricingMap::new();
        pricing.insert(
            "priced-model",
            PricingEntry {
                input_cost_per_million: 1.0,
                cache_creation_cost_per_million: 0.0,
                cached_input_cost_per_million: 0.0,
                output_cost_per_million: 2.0,
                reasoning_output_cost_per_million: None,
            },
        );
        day.apply_pricing(&pricing);

        assert!(day.missing_pricing.contains("unpriced-model"));
        assert!(!day.missing_pricing.contains("priced-model"));
        assert!(day.models["priced-model"].pricing_available);
        assert!(!day.models["unpriced-model"].pricing_available);
    }
}
