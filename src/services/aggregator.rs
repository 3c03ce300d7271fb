//! Aggregation pipeline: sort, filter, bucket into day/session/week
//! summaries, apply pricing, and accumulate cross-day totals.

use crate::time::iso_week_for_date;
use crate::types::{
    new_daily_summary, new_session_summary, new_weekly_summary, DailySummary, PricingMap,
    SessionSummary, SummaryTotals, TokenUsageEvent, WeeklySummary,
};
use std::collections::BTreeMap;

/// Everything the renderers and uploader need: per-day, per-session, and
/// per-ISO-week summaries plus the cross-day totals.
pub struct Report {
    pub daily: Vec<DailySummary>,
    pub sessions: Vec<SessionSummary>,
    pub weekly: Vec<WeeklySummary>,
    pub totals: SummaryTotals,
}

pub struct Aggregator;

impl Aggregator {
    /// Run the full pipeline: filter by `[since, until]` (inclusive,
    /// compared on `local_iso_date`), sort, bucket, price, and total.
    pub fn run(
        mut events: Vec<TokenUsageEvent>,
        pricing: &PricingMap,
        since: Option<&str>,
        until: Option<&str>,
    ) -> Report {
        events.retain(|e| {
            since.is_none_or(|s| e.local_iso_date.as_str() >= s)
                && until.is_none_or(|u| e.local_iso_date.as_str() <= u)
        });
        events.sort_by(|a, b| {
            (&a.timestamp, &a.session_id, &a.model_name).cmp(&(&b.timestamp, &b.session_id, &b.model_name))
        });

        let mut days: BTreeMap<String, DailySummary> = BTreeMap::new();
        let mut sessions: BTreeMap<String, SessionSummary> = BTreeMap::new();
        let mut weeks: BTreeMap<(i32, u32), WeeklySummary> = BTreeMap::new();

        for event in &events {
            days.entry(event.local_iso_date.clone())
                .or_insert_with(|| {
                    new_daily_summary(event.local_iso_date.clone(), crate::time::display_date(&event.local_iso_date))
                })
                .add_event(event);

            sessions
                .entry(event.session_id.clone())
                .or_insert_with(|| new_session_summary(event.session_id.clone(), event.timestamp.clone()))
                .add_event(event);

            if let Some((iso_year, iso_week, start, end)) = iso_week_for_date(&event.local_iso_date) {
                weeks
                    .entry((iso_year, iso_week))
                    .or_insert_with(|| new_weekly_summary(iso_year, iso_week, start, end))
                    .add_event(event);
            }
        }

        let mut totals = SummaryTotals::default();
        for day in days.values_mut() {
            day.apply_pricing(pricing);
            totals.usage.input_tokens = totals.usage.input_tokens.saturating_add(day.usage.input_tokens);
            totals.usage.cache_creation_input_tokens = totals
                .usage
                .cache_creation_input_tokens
                .saturating_add(day.usage.cache_creation_input_tokens);
            totals.usage.cached_input_tokens = totals
                .usage
                .cached_input_tokens
                .saturating_add(day.usage.cached_input_tokens);
            totals.usage.output_tokens = totals.usage.output_tokens.saturating_add(day.usage.output_tokens);
            totals.usage.reasoning_output_tokens = totals
                .usage
                .reasoning_output_tokens
                .saturating_add(day.usage.reasoning_output_tokens);
            totals.usage.total_tokens = totals.usage.total_tokens.saturating_add(day.usage.total_tokens);
            totals.display_input_tokens = totals.display_input_tokens.saturating_add(day.display_input_tokens);
            totals.cost_usd += day.cost_usd;
            totals.missing_pricing.extend(day.missing_pricing.iter().cloned());
        }
        for session in sessions.values_mut() {
            session.apply_pricing(pricing);
        }
        for week in weeks.values_mut() {
            week.apply_pricing(pricing);
        }

        Report {
            daily: days.into_values().collect(),
            sessions: sessions.into_values().collect(),
            weekly: weeks.into_values().collect(),
            totals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PricingEntry, TokenUsage};

    fn event(model: &str, date: &str, session: &str, ts: &str, input: u64, output: u64) -> TokenUsageEvent {
        TokenUsageEvent {
            session_id: session.to_string(),
            timestamp: ts.to_string(),
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
    fn daily_usage_equals_sum_of_model_usage() {
        let events = vec![
            event("gpt-5", "2025-11-01", "s1", "2025-11-01T10:00:00Z", 100, 50),
            event("claude", "2025-11-01", "s1", "2025-11-01T11:00:00Z", 200, 75),
        ];
        let report = Aggregator::run(events, &PricingMap::new(), None, None);
        assert_eq!(report.daily.len(), 1);
        let day = &report.daily[0];
        let summed: u64 = day.models.values().map(|m| m.usage.input_tokens).sum();
        assert_eq!(day.usage.input_tokens, summed);
    }

    #[test]
    fn since_until_filters_are_inclusive() {
        let events = vec![
            event("gpt-5", "2025-11-01", "s1", "2025-11-01T10:00:00Z", 100, 50),
            event("gpt-5", "2025-11-02", "s1", "2025-11-02T10:00:00Z", 100, 50),
            event("gpt-5", "2025-11-03", "s1", "2025-11-03T10:00:00Z", 100, 50),
        ];
        let report = Aggregator::run(events, &PricingMap::new(), Some("2025-11-01"), Some("2025-11-02"));
        assert_eq!(report.daily.len(), 2);
    }

    #[test]
    fn missing_pricing_appears_in_day_and_totals() {
        let events = vec![event("unpriced", "2025-11-01", "s1", "2025-11-01T10:00:00Z", 100, 50)];
        let report = Aggregator::run(events, &PricingMap::new(), None, None);
        assert!(report.daily[0].missing_pricing.contains("unpriced"));
        assert!(report.totals.missing_pricing.contains("unpriced"));
        assert_eq!(report.totals.cost_usd, 0.0);
    }

    #[test]
    fn s4_pricing_fallback_present_then_removed() {
        let events = vec![event("gpt-5", "2025-11-01", "s1", "2025-11-01T10:00:00Z", 1_000_000, 0)];
        let mut pricing = PricingMap::new();
        pricing.insert(
            "gpt-5",
            PricingEntry {
                input_cost_per_million: 1.25,
                cache_creation_cost_per_million: 0.0,
                cached_input_cost_per_million: 0.0,
                output_cost_per_million: 10.0,
                reasoning_output_cost_per_million: None,
            },
        );
        let report = Aggregator::run(events.clone(), &pricing, None, None);
        assert!((report.totals.cost_usd - 1.25).abs() < 0.01);

        let report_unpriced = Aggregator::run(events, &PricingMap::new(), None, None);
        assert_eq!(report_unpriced.totals.cost_usd, 0.0);
        assert!(report_unpriced.totals.missing_pricing.contains("gpt-5"));
    }

    #[test]
    fn weekly_buckets_group_by_iso_week() {
        let events = vec![
            event("gpt-5", "2025-10-27", "s1", "2025-10-27T10:00:00Z", 10, 5),
            event("gpt-5", "2025-11-02", "s1", "2025-11-02T10:00:00Z", 10, 5),
        ];
        let report = Aggregator::run(events, &PricingMap::new(), None, None);
        assert_eq!(report.weekly.len(), 1);
        assert_eq!(report.weekly[0].iso_week, 44);
    }

    #[test]
    fn sessions_track_first_and_last_seen_timestamps() {
        let events = vec![
            event("gpt-5", "2025-11-01", "s1", "2025-11-01T09:00:00Z", 10, 5),
            event("gpt-5", "2025-11-01", "s1", "2025-11-01T12:00:00Z", 10, 5),
        ];
        let report = Aggregator::run(events, &PricingMap::new(), None, None);
        assert_eq!(report.sessions.len(), 1);
        assert_eq!(report.sessions[0].first_seen_timestamp, "2025-11-01T09:00:00Z");
        assert_eq!(report.sessions[0].last_seen_timestamp, "2025-11-01T12:00:00Z");
    }
}
