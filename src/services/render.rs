//! Output renderers: the JSON wire schema the dashboard expects, and a
//! bordered ASCII table for terminal use.

use crate::services::aggregator::Report;
use crate::types::{DailySummary, ModelSummary, SessionSummary, WeeklySummary};
use serde_json::{json, Value};

/// Commas every three digits from the right: `1234567` -> `"1,234,567"`.
pub fn format_digits_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

fn model_breakdown_json(models: &std::collections::BTreeMap<String, ModelSummary>) -> Value {
    let mut map = serde_json::Map::new();
    for (name, m) in models {
        map.insert(
            name.clone(),
            json!({
                "inputTokens": m.usage.input_tokens,
                "cachedInputTokens": m.usage.cached_input_tokens,
                "cacheCreationInputTokens": m.usage.cache_creation_input_tokens,
                "outputTokens": m.usage.output_tokens,
                "reasoningOutputTokens": m.usage.reasoning_output_tokens,
                "totalTokens": m.usage.total_tokens,
                "costUSD": m.cost_usd,
                "pricingAvailable": m.pricing_available,
                "isFallback": m.is_fallback,
            }),
        );
    }
    Value::Object(map)
}

pub(crate) fn daily_json(day: &DailySummary) -> Value {
    json!({
        "date": day.display_date,
        "isoDate": day.iso_date,
        "inputTokens": day.usage.input_tokens,
        "cachedInputTokens": day.usage.cached_input_tokens,
        "cacheCreationInputTokens": day.usage.cache_creation_input_tokens,
        "outputTokens": day.usage.output_tokens,
        "reasoningOutputTokens": day.usage.reasoning_output_tokens,
        "totalTokens": day.usage.total_tokens,
        "costUSD": day.cost_usd,
        "models": model_breakdown_json(&day.models),
        "missingPricing": day.missing_pricing.iter().cloned().collect::<Vec<_>>(),
    })
}

pub(crate) fn session_json(session: &SessionSummary) -> Value {
    json!({
        "sessionId": session.session_id,
        "firstSeen": session.first_seen_timestamp,
        "lastSeen": session.last_seen_timestamp,
        "inputTokens": session.usage.input_tokens,
        "cachedInputTokens": session.usage.cached_input_tokens,
        "cacheCreationInputTokens": session.usage.cache_creation_input_tokens,
        "outputTokens": session.usage.output_tokens,
        "reasoningOutputTokens": session.usage.reasoning_output_tokens,
        "totalTokens": session.usage.total_tokens,
        "costUSD": session.cost_usd,
        "models": model_breakdown_json(&session.model_breakdown),
    })
}

pub(crate) fn weekly_json(week: &WeeklySummary) -> Value {
    json!({
        "isoYear": week.iso_year,
        "isoWeek": week.iso_week,
        "startDate": week.start_date,
        "endDate": week.end_date,
        "inputTokens": week.usage.input_tokens,
        "cachedInputTokens": week.usage.cached_input_tokens,
        "cacheCreationInputTokens": week.usage.cache_creation_input_tokens,
        "outputTokens": week.usage.output_tokens,
        "reasoningOutputTokens": week.usage.reasoning_output_tokens,
        "totalTokens": week.usage.total_tokens,
        "costUSD": week.cost_usd,
        "models": model_breakdown_json(&week.model_breakdown),
        "missingPricing": week.missing_pricing.iter().cloned().collect::<Vec<_>>(),
    })
}

fn totals_json(report: &Report) -> Value {
    json!({
        "inputTokens": report.totals.usage.input_tokens,
        "cachedInputTokens": report.totals.usage.cached_input_tokens,
        "cacheCreationInputTokens": report.totals.usage.cache_creation_input_tokens,
        "outputTokens": report.totals.usage.output_tokens,
        "reasoningOutputTokens": report.totals.usage.reasoning_output_tokens,
        "totalTokens": report.totals.usage.total_tokens,
        "costUSD": report.totals.cost_usd,
        "missingPricing": report.totals.missing_pricing.iter().cloned().collect::<Vec<_>>(),
    })
}

/// Serialize the report to the dashboard-compatible JSON schema: snake_case
/// root keys (`daily`/`sessions`/`totals`), camelCase per-day/per-model keys.
pub fn render_json(report: &Report, sessions_view: bool, pretty: bool) -> String {
    let body = if sessions_view {
        json!({
            "sessions": report.sessions.iter().map(session_json).collect::<Vec<_>>(),
            "totals": totals_json(report),
        })
    } else {
        json!({
            "daily": report.daily.iter().map(daily_json).collect::<Vec<_>>(),
            "totals": totals_json(report),
        })
    };
    if pretty {
        serde_json::to_string_pretty(&body).unwrap_or_default()
    } else {
        serde_json::to_string(&body).unwrap_or_default()
    }
}

const COLS: [usize; 7] = [12, 10, 10, 10, 10, 10, 12];

fn rule() -> String {
    "─".repeat(COLS.iter().sum::<usize>() + COLS.len() - 1)
}

fn row(label: &str, input: u64, cached: u64, output: u64, reasoning: u64, total: u64, cost: f64, missing: bool) -> String {
    format!(
        "{:<w0$}│{:>w1$}│{:>w2$}│{:>w3$}│{:>w4$}│{:>w5$}│{:>w6$}",
        label,
        format_digits_with_commas(input),
        format_digits_with_commas(cached),
        format_digits_with_commas(output),
        format_digits_with_commas(reasoning),
        format_digits_with_commas(total),
        format!("${:.2}{}", cost, if missing { "*" } else { "" }),
        w0 = COLS[0],
        w1 = COLS[1],
        w2 = COLS[2],
        w3 = COLS[3],
        w4 = COLS[4],
        w5 = COLS[5],
        w6 = COLS[6],
    )
}

/// Bordered ASCII table, one row per day (or per session in `--sessions`
/// mode), with a totals row. A `*` suffix on the cost column marks rows
/// with at least one model missing a price.
pub fn render_table(report: &Report, sessions_view: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<w0$}│{:>w1$}│{:>w2$}│{:>w3$}│{:>w4$}│{:>w5$}│{:>w6$}",
        "Date",
        "Input",
        "Cached",
        "Output",
        "Reasoning",
        "Total",
        "Cost",
        w0 = COLS[0],
        w1 = COLS[1],
        w2 = COLS[2],
        w3 = COLS[3],
        w4 = COLS[4],
        w5 = COLS[5],
        w6 = COLS[6],
    ));
    out.push('\n');
    out.push_str(&rule());
    out.push('\n');

    if sessions_view {
        for session in &report.sessions {
            let missing = session.model_breakdown.values().any(|m| !m.pricing_available);
            out.push_str(&row(
                &session.session_id,
                session.usage.input_tokens,
                session.usage.cached_input_tokens,
                session.usage.output_tokens,
                session.usage.reasoning_output_tokens,
                session.usage.total_tokens,
                session.cost_usd,
                missing,
            ));
            out.push('\n');
        }
    } else {
        for day in &report.daily {
            out.push_str(&row(
                &day.iso_date,
                day.usage.input_tokens,
                day.usage.cached_input_tokens,
                day.usage.output_tokens,
                day.usage.reasoning_output_tokens,
                day.usage.total_tokens,
                day.cost_usd,
                !day.missing_pricing.is_empty(),
            ));
            out.push('\n');
        }
    }

    out.push_str(&rule());
    out.push('\n');
    out.push_str(&row(
        "Total",
        report.totals.usage.input_tokens,
        report.totals.usage.cached_input_tokens,
        report.totals.usage.output_tokens,
        report.totals.usage.reasoning_output_tokens,
        report.totals.usage.total_tokens,
        report.totals.cost_usd,
        !report.totals.missing_pricing.is_empty(),
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_digits_with_commas_groups_by_three() {
        assert_eq!(format_digits_with_commas(0), "0");
        assert_eq!(format_digits_with_commas(999), "999");
        assert_eq!(format_digits_with_commas(1000), "1,000");
        assert_eq!(format_digits_with_commas(1_234_567), "1,234,567");
    }

    fn empty_report() -> Report {
        Report {
            daily: Vec::new(),
            sessions: Vec::new(),
            weekly: Vec::new(),
            totals: Default::default(),
        }
    }

    #[test]
    fn render_json_daily_view_has_daily_and_totals_keys() {
        let report = empty_report();
        let text = render_json(&report, false, false);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert!(value.get("daily").is_some());
        assert!(value.get("totals").is_some());
        assert!(value.get("sessions").is_none());
    }

    #[test]
    fn render_json_sessions_view_has_sessions_key() {
        let report = empty_report();
        let text = render_json(&report, true, true);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert!(value.get("sessions").is_some());
        assert!(value.get("daily").is_none());
    }

    #[test]
    fn render_table_includes_total_row() {
        let report = empty_report();
        let table = render_table(&report, false);
        assert!(table.contains("Total"));
    }
}
