//! Gemini session parser: one JSON document (not line-delimited) whose
//! `messages[]` carry cumulative token totals that must be differenced.

use super::{default_max_session_bytes, ParseContext, ProviderConfig, SessionParser};
use crate::types::{MessageDeduper, ModelState, PricingEntry, RawUsage, Result, TokenUsage, TokenUsageEvent};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
struct GeminiSession {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    messages: Vec<GeminiMessage>,
}

#[derive(Deserialize)]
struct GeminiMessage {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    tokens: Option<GeminiTokens>,
}

#[derive(Deserialize, Clone, Copy, Default)]
struct GeminiTokens {
    #[serde(default)]
    input: u64,
    #[serde(default)]
    cached: u64,
    #[serde(default)]
    output: u64,
    #[serde(default)]
    tool: u64,
    #[serde(default)]
    thoughts: u64,
    #[serde(default)]
    total: u64,
}

impl From<GeminiTokens> for RawUsage {
    fn from(t: GeminiTokens) -> Self {
        RawUsage {
            input_tokens: t.input,
            cache_creation_input_tokens: 0,
            cached_input_tokens: t.cached,
            output_tokens: t.output.saturating_add(t.tool),
            reasoning_output_tokens: t.thoughts,
            total_tokens: t.total,
        }
    }
}

pub struct GeminiParser {
    config: ProviderConfig,
}

impl GeminiParser {
    pub fn new() -> Self {
        Self {
            config: ProviderConfig {
                name: "gemini",
                sessions_dir_suffix: ".gemini/tmp",
                legacy_fallback_model: None,
                session_file_ext: "json",
                cached_counts_overlap_input: false,
                requires_deduper: false,
            },
        }
    }
}

impl Default for GeminiParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionParser for GeminiParser {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn fallback_pricing(&self) -> Vec<(&'static str, PricingEntry)> {
        vec![(
            "gemini-2-5-pro",
            PricingEntry {
                input_cost_per_million: 1.25,
                cache_creation_cost_per_million: 0.0,
                cached_input_cost_per_million: 0.31,
                output_cost_per_million: 10.0,
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
        let mut bytes = std::fs::read(path)?;
        if bytes.len() as u64 > default_max_session_bytes() {
            bytes.truncate(default_max_session_bytes() as usize);
        }
        let session: GeminiSession = match simd_json::from_slice(&mut bytes) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(
                    provider = "gemini",
                    path = %path.display(),
                    line_index = 0usize,
                    error_name = "json_parse",
                    error = %e,
                    "malformed session document"
                );
                return Ok(());
            }
        };

        let mut state = ModelState::default();
        if let Some(model) = session.model {
            state.set(model);
        }
        let mut previous: Option<RawUsage> = None;

        for message in &session.messages {
            let Some(tokens) = message.tokens else {
                continue;
            };
            let raw: RawUsage = tokens.into();
            let delta = TokenUsage::delta_from(raw, previous);
            previous = Some(raw);

            let Some(timestamp) = message.timestamp.as_deref() else {
                continue;
            };
            let Some((timestamp, local_iso_date)) = ctx.timestamp_from_slice(timestamp) else {
                continue;
            };
            let Some((model_name, is_fallback_model)) =
                ctx.resolve_model(&mut state, message.model.as_deref())
            else {
                continue;
            };

            let display_input_tokens = delta.display_input_tokens(ctx.cached_counts_overlap_input);
            let usage = ctx.normalize_usage_delta(delta);
            if usage.is_zero() {
                continue;
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
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture(json: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("session-1.json"), json).unwrap();
        dir
    }

    #[test]
    fn s3_gemini_cumulative_deltas_sum_to_terminal() {
        let json = r#"{
            "model": "gemini-2-5-pro",
            "messages": [
                {"timestamp":"2025-11-01T10:00:00Z","tokens":{"input":60,"cached":0,"output":40,"tool":0,"thoughts":0,"total":100}},
                {"timestamp":"2025-11-01T10:01:00Z","tokens":{"input":200,"cached":0,"output":150,"tool":0,"thoughts":0,"total":350}},
                {"timestamp":"2025-11-01T10:02:00Z","tokens":{"input":500,"cached":0,"output":300,"tool":0,"thoughts":0,"total":800}}
            ]
        }"#;
        let dir = write_fixture(json);
        let parser = GeminiParser::new();
        let ctx = ParseContext::for_provider(&parser.config, 0);
        let mut events = Vec::new();
        parser
            .parse_session(&ctx, "session-1", &dir.path().join("session-1.json"), None, &mut events)
            .unwrap();

        assert_eq!(events.len(), 3);
        let sum: u64 = events.iter().map(|e| e.usage.total_tokens).sum();
        assert_eq!(sum, 800);
    }

    #[test]
    fn cumulative_decrease_clamps_to_zero() {
        let json = r#"{
            "model": "gemini-2-5-pro",
            "messages": [
                {"timestamp":"2025-11-01T10:00:00Z","tokens":{"input":100,"output":50,"total":150}},
                {"timestamp":"2025-11-01T10:01:00Z","tokens":{"input":90,"output":40,"total":130}}
            ]
        }"#;
        let dir = write_fixture(json);
        let parser = GeminiParser::new();
        let ctx = ParseContext::for_provider(&parser.config, 0);
        let mut events = Vec::new();
        parser
            .parse_session(&ctx, "session-1", &dir.path().join("session-1.json"), None, &mut events)
            .unwrap();
        // second message's decrease normalizes to an all-zero delta and is dropped
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn output_tool_tokens_combine_and_thoughts_map_to_reasoning() {
        let json = r#"{
            "model": "gemini-2-5-pro",
            "messages": [
                {"timestamp":"2025-11-01T10:00:00Z","tokens":{"input":10,"output":5,"tool":3,"thoughts":7,"total":25}}
            ]
        }"#;
        let dir = write_fixture(json);
        let parser = GeminiParser::new();
        let ctx = ParseContext::for_provider(&parser.config, 0);
        let mut events = Vec::new();
        parser
            .parse_session(&ctx, "session-1", &dir.path().join("session-1.json"), None, &mut events)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].usage.output_tokens, 8);
        assert_eq!(events[0].usage.reasoning_output_tokens, 7);
    }
}
