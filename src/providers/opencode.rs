//! Opencode session parser: JSONL `step.tokens` records carrying
//! cumulative per-session totals, differenced like Gemini rather than
//! additive like Claude/Amp.

use super::{default_max_session_bytes, json_value_to_u64, stream_json_lines, ParseContext, ProviderConfig, SessionParser};
use crate::types::{
    usage_field_for_key, MessageDeduper, ModelState, PricingEntry, Result, TokenUsage, TokenUsageEvent,
    UsageAccumulator,
};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
struct OpencodeLine {
    #[serde(rename = "type")]
    line_type: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    tokens: Option<serde_json::Map<String, serde_json::Value>>,
}

pub struct OpencodeParser {
    config: ProviderConfig,
}

impl OpencodeParser {
    pub fn new() -> Self {
        Self {
            config: ProviderConfig {
                name: "opencode",
                sessions_dir_suffix: ".local/share/opencode/sessions",
                legacy_fallback_model: None,
                session_file_ext: "jsonl",
                cached_counts_overlap_input: false,
                requires_deduper: false,
            },
        }
    }
}

impl Default for OpencodeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionParser for OpencodeParser {
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
        let mut state = ModelState::default();
        let mut previous = None;

        stream_json_lines(path, default_max_session_bytes(), |line, line_index| {
            let record: OpencodeLine = match simd_json::from_slice(line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(
                        provider = "opencode",
                        path = %path.display(),
                        line_index,
                        error_name = "json_parse",
                        error = %e,
                        "malformed session record"
                    );
                    return;
                }
            };

            if record.line_type != "step.tokens" {
                return;
            }
            let Some(tokens_obj) = &record.tokens else {
                return;
            };
            let Some(timestamp) = record.timestamp.as_deref() else {
                return;
            };
            let Some((timestamp, local_iso_date)) = ctx.timestamp_from_slice(timestamp) else {
                return;
            };
            let Some((model_name, is_fallback_model)) =
                ctx.resolve_model(&mut state, record.model.as_deref())
            else {
                return;
            };

            let mut accumulator = UsageAccumulator::new();
            for (key, value) in tokens_obj {
                if let Some(field) = usage_field_for_key(key) {
                    accumulator.apply_field(field, json_value_to_u64(value));
                }
            }
            let raw = accumulator.finalize();
            let delta = TokenUsage::delta_from(raw, previous);
            previous = Some(raw);

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
                is_fallback_model,
                display_input_tokens,
            });
        })
    }
}
