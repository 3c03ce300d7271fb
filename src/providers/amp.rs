//! Amp session parser: JSONL, per-message additive usage fields under a
//! generic `usage` object (field names resolved through the shared
//! alias table rather than a fixed struct, since Amp's wire format is
//! looser than Claude's).

use super::{default_max_session_bytes, stream_json_lines, ParseContext, ProviderConfig, SessionParser};
use crate::types::{
    usage_field_for_key, MessageDeduper, PricingEntry, Result, TokenUsage, TokenUsageEvent,
    UsageAccumulator,
};
use serde::Deserialize;
use std::path::Path;

use super::json_value_to_u64;

#[derive(Deserialize)]
struct AmpLine {
    #[serde(rename = "type")]
    line_type: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<serde_json::Map<String, serde_json::Value>>,
}

pub struct AmpParser {
    config: ProviderConfig,
}

impl AmpParser {
    pub fn new() -> Self {
        Self {
            config: ProviderConfig {
                name: "amp",
                sessions_dir_suffix: ".config/amp/sessions",
                legacy_fallback_model: None,
                session_file_ext: "jsonl",
                cached_counts_overlap_input: false,
                requires_deduper: false,
            },
        }
    }
}

impl Default for AmpParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionParser for AmpParser {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn fallback_pricing(&self) -> Vec<(&'static str, PricingEntry)> {
        vec![(
            "claude-sonnet-4-5",
            PricingEntry {
                input_cost_per_million: 3.0,
                cache_creation_cost_per_million: 3.75,
                cached_input_cost_per_million: 0.3,
                output_cost_per_million: 15.0,
                reasoning_output_cost_per_million: None,
            },
        )]
    }

    fn parse_session(
        &self,
        ctx: &ParseContext,
        session_id: &str,
        path: &Path,
        _deduper: Option<&mut MessageDeduper>,
        events: &mut Vec<TokenUsageEvent>,
    ) -> Result<()> {
        stream_json_lines(path, default_max_session_bytes(), |line, line_index| {
            let record: AmpLine = match simd_json::from_slice(line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(
                        provider = "amp",
                        path = %path.display(),
                        line_index,
                        error_name = "json_parse",
                        error = %e,
                        "malformed session record"
                    );
                    return;
                }
            };

            if record.line_type != "message" {
                return;
            }
            let Some(usage_obj) = &record.usage else {
                return;
            };
            let Some(model_name) = record.model.clone() else {
                return;
            };
            let Some(timestamp) = record.timestamp.as_deref() else {
                return;
            };
            let Some((timestamp, local_iso_date)) = ctx.timestamp_from_slice(timestamp) else {
                return;
            };

            let mut accumulator = UsageAccumulator::new();
            for (key, value) in usage_obj {
                if let Some(field) = usage_field_for_key(key) {
                    accumulator.apply_field(field, json_value_to_u64(value));
                }
            }
            let raw = accumulator.finalize();
            let delta = TokenUsage::from_raw(raw);
            let display_input_tokens = delta.display_input_tokens(ctx.cached_counts_overlap_input);
            let usage = ctx.normalize_usage_delta(delta);
            if usage.is_zero() {
                return;
            }

            events.push(TokenUsageEvent {
                session_id: session_id.to_string(),
                timestamp,
                local_iso_date,
                model_name,
                usage,
                is_fallback_model: false,
                display_input_tokens,
            });
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(lines: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("session-1.jsonl")).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        dir
    }

    #[test]
    fn additive_generic_usage_fields_resolve_via_alias_table() {
        let dir = write_fixture(&[
            r#"{"type":"message","timestamp":"2025-11-01T10:00:00Z","model":"claude-sonnet-4-5","usage":{"prompt_tokens":100,"cache_write":10,"cached":20,"completion_tokens":50}}"#,
        ]);
        let parser = AmpParser::new();
        let ctx = ParseContext::for_provider(&parser.config, 0);
        let mut events = Vec::new();
        parser
            .parse_session(&ctx, "session-1", &dir.path().join("session-1.jsonl"), None, &mut events)
            .unwrap();
        assert_eq!(events.len(), 1);
        let usage = &events[0].usage;
        assert_eq!(usage.input_tokens, 100);
        assert_eq!(usage.cache_creation_input_tokens, 10);
        assert_eq!(usage.cached_input_tokens, 20);
        assert_eq!(usage.output_tokens, 50);
    }

    #[test]
    fn non_message_records_are_ignored() {
        let dir = write_fixture(&[r#"{"type":"meta","timestamp":"2025-11-01T10:00:00Z"}"#]);
        let parser = AmpParser::new();
        let ctx = ParseContext::for_provider(&parser.config, 0);
        let mut events = Vec::new();
        parser
            .parse_session(&ctx, "session-1", &dir.path().join("session-1.jsonl"), None, &mut events)
            .unwrap();
        assert!(events.is_empty());
    }
}
