//! Codex session parser: JSONL with `turn_context` (model) and
//! `event_msg` (`token_count`) record types.

use super::{
    default_max_session_bytes, stream_json_lines, ParseContext, ProviderConfig, SessionParser,
};
use crate::types::{
    MessageDeduper, ModelState, PricingEntry, RawUsage, Result, TokenUsage, TokenUsageEvent,
};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
struct CodexLine {
    #[serde(rename = "type")]
    line_type: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    payload: Option<CodexPayload>,
}

#[derive(Deserialize)]
struct CodexPayload {
    #[serde(rename = "type")]
    payload_type: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    metadata: Option<CodexMetadata>,
    #[serde(default)]
    info: Option<CodexInfo>,
}

#[derive(Deserialize)]
struct CodexMetadata {
    #[serde(default)]
    model_name: Option<String>,
}

#[derive(Deserialize)]
struct CodexInfo {
    #[serde(default)]
    last_token_usage: Option<CodexTokenUsage>,
    #[serde(default)]
    total_token_usage: Option<CodexTokenUsage>,
}

#[derive(Deserialize, Clone, Copy, Default)]
struct CodexTokenUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    cached_input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    reasoning_output_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl From<CodexTokenUsage> for RawUsage {
    fn from(u: CodexTokenUsage) -> Self {
        RawUsage {
            input_tokens: u.input_tokens,
            cache_creation_input_tokens: 0,
            cached_input_tokens: u.cached_input_tokens,
            output_tokens: u.output_tokens,
            reasoning_output_tokens: u.reasoning_output_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

pub struct CodexParser {
    config: ProviderConfig,
}

impl CodexParser {
    pub fn new() -> Self {
        Self {
            config: ProviderConfig {
                name: "codex",
                sessions_dir_suffix: ".codex/sessions",
                legacy_fallback_model: Some("gpt-5"),
                session_file_ext: "jsonl",
                cached_counts_overlap_input: true,
                requires_deduper: false,
            },
        }
    }
}

impl Default for CodexParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionParser for CodexParser {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn fallback_pricing(&self) -> Vec<(&'static str, PricingEntry)> {
        vec![
            (
                "gpt-5",
                PricingEntry {
                    input_cost_per_million: 1.25,
                    cache_creation_cost_per_million: 0.0,
                    cached_input_cost_per_million: 0.125,
                    output_cost_per_million: 10.0,
                    reasoning_output_cost_per_million: None,
                },
            ),
            (
                "gpt-5-codex",
                PricingEntry {
                    input_cost_per_million: 1.25,
                    cache_creation_cost_per_million: 0.0,
                    cached_input_cost_per_million: 0.125,
                    output_cost_per_million: 10.0,
                    reasoning_output_cost_per_million: None,
                },
            ),
        ]
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
        let mut previous_cumulative: Option<RawUsage> = None;

        stream_json_lines(path, default_max_session_bytes(), |line, line_index| {
            let record: CodexLine = match simd_json::from_slice(line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(
                        provider = "codex",
                        path = %path.display(),
                        line_index,
                        error_name = "json_parse",
                        error = %e,
                        "malformed session record"
                    );
                    return;
                }
            };

            let Some(payload) = &record.payload else {
                return;
            };

            if record.line_type == "turn_context" {
                let model = payload
                    .model
                    .clone()
                    .or_else(|| payload.metadata.as_ref().and_then(|m| m.model_name.clone()));
                if let Some(model) = model {
                    state.set(model);
                }
                return;
            }

            if record.line_type != "event_msg" {
                return;
            }
            if payload.payload_type.as_deref() != Some("token_count") {
                return;
            }
            let Some(info) = &payload.info else {
                return;
            };

            // Prefer the verbatim delta when present; still advance the
            // remembered cumulative from `total_token_usage` either way.
            let delta_raw: RawUsage = if let Some(last) = info.last_token_usage {
                last.into()
            } else if let Some(total) = info.total_token_usage {
                let raw_total: RawUsage = total.into();
                TokenUsage::delta_from(raw_total, previous_cumulative).into()
            } else {
                return;
            };
            if let Some(total) = info.total_token_usage {
                previous_cumulative = Some(total.into());
            }

            let Some(timestamp) = record.timestamp.as_deref() else {
                return;
            };
            let Some((timestamp, local_iso_date)) = ctx.timestamp_from_slice(timestamp) else {
                return;
            };
            let Some((model_name, is_fallback_model)) = ctx.resolve_model(&mut state, None) else {
                return;
            };

            let delta = TokenUsage::from_raw(delta_raw);
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

impl From<TokenUsage> for RawUsage {
    fn from(u: TokenUsage) -> Self {
        RawUsage {
            input_tokens: u.input_tokens,
            cache_creation_input_tokens: u.cache_creation_input_tokens,
            cached_input_tokens: u.cached_input_tokens,
            output_tokens: u.output_tokens,
            reasoning_output_tokens: u.reasoning_output_tokens,
            total_tokens: u.total_tokens,
        }
    }
}
