//! Claude Code session parser: JSONL `assistant` records, deduplicated
//! by `(message.id, requestId)`.

use super::{default_max_session_bytes, fingerprint, stream_json_lines, ParseContext, ProviderConfig, SessionParser};
use crate::types::{MessageDeduper, PricingEntry, RawUsage, Result, TokenUsage, TokenUsageEvent};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
struct ClaudeLine {
    #[serde(rename = "type")]
    line_type: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(rename = "sessionId", default)]
    session_id: Option<String>,
    #[serde(rename = "requestId", default)]
    request_id: Option<String>,
    #[serde(default)]
    message: Option<ClaudeMessage>,
}

#[derive(Deserialize)]
struct ClaudeMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<ClaudeUsage>,
}

#[derive(Deserialize, Default)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

pub struct ClaudeParser {
    config: ProviderConfig,
}

impl ClaudeParser {
    pub fn new() -> Self {
        Self {
            config: ProviderConfig {
                name: "claude",
                sessions_dir_suffix: ".claude/projects",
                legacy_fallback_model: None,
                session_file_ext: "jsonl",
                cached_counts_overlap_input: false,
                requires_deduper: true,
            },
        }
    }
}

impl Default for ClaudeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionParser for ClaudeParser {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn fallback_pricing(&self) -> Vec<(&'static str, PricingEntry)> {
        vec![
            (
                "claude-opus-4-5",
                PricingEntry {
                    input_cost_per_million: 5.0,
                    cache_creation_cost_per_million: 6.25,
                    cached_input_cost_per_million: 0.5,
                    output_cost_per_million: 25.0,
                    reasoning_output_cost_per_million: None,
                },
            ),
            (
                "claude-sonnet-4-5",
                PricingEntry {
                    input_cost_per_million: 3.0,
                    cache_creation_cost_per_million: 3.75,
                    cached_input_cost_per_million: 0.3,
                    output_cost_per_million: 15.0,
                    reasoning_output_cost_per_million: None,
                },
            ),
            (
                "claude-haiku-4-5",
                PricingEntry {
                    input_cost_per_million: 1.0,
                    cache_creation_cost_per_million: 1.25,
                    cached_input_cost_per_million: 0.1,
                    output_cost_per_million: 5.0,
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
        deduper: Option<&mut MessageDeduper>,
        events: &mut Vec<TokenUsageEvent>,
    ) -> Result<()> {
        let mut deduper = deduper;
        let mut effective_session_id: Option<String> = None;

        stream_json_lines(path, default_max_session_bytes(), |line, line_index| {
            let record: ClaudeLine = match simd_json::from_slice(line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(
                        provider = "claude",
                        path = %path.display(),
                        line_index,
                        error_name = "json_parse",
                        error = %e,
                        "malformed session record"
                    );
                    return;
                }
            };

            if record.line_type != "assistant" {
                return;
            }
            let Some(message) = &record.message else {
                return;
            };
            let Some(usage) = &message.usage else {
                return;
            };

            if effective_session_id.is_none() {
                if let Some(sid) = &record.session_id {
                    effective_session_id = Some(sid.clone());
                }
            }

            if let (Some(message_id), Some(request_id)) = (&message.id, &record.request_id) {
                if let Some(deduper) = deduper.as_deref_mut() {
                    let hash = fingerprint(message_id, request_id);
                    if !deduper.mark(hash) {
                        return;
                    }
                }
            }

            let Some(timestamp) = record.timestamp.as_deref() else {
                return;
            };
            let Some((timestamp, local_iso_date)) = ctx.timestamp_from_slice(timestamp) else {
                return;
            };
            let Some(model_name) = message.model.clone() else {
                return;
            };

            let raw = RawUsage {
                input_tokens: usage.input_tokens,
                cache_creation_input_tokens: usage.cache_creation_input_tokens,
                cached_input_tokens: usage.cache_read_input_tokens,
                output_tokens: usage.output_tokens,
                reasoning_output_tokens: 0,
                total_tokens: usage.input_tokens
                    + usage.cache_creation_input_tokens
                    + usage.cache_read_input_tokens
                    + usage.output_tokens,
            };
            let delta = TokenUsage::from_raw(raw);
            let display_input_tokens = delta.display_input_tokens(ctx.cached_counts_overlap_input);
            let usage = ctx.normalize_usage_delta(delta);
            if usage.is_zero() {
                return;
            }

            events.push(TokenUsageEvent {
                session_id: effective_session_id.clone().unwrap_or_else(|| session_id.to_string()),
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

    fn assistant_line(msg_id: &str, req_id: &str) -> String {
        format!(
            r#"{{"type":"assistant","timestamp":"2025-11-01T10:00:00Z","sessionId":"sess-a","requestId":"{req_id}","message":{{"id":"{msg_id}","model":"claude-sonnet-4-5","usage":{{"input_tokens":100,"cache_creation_input_tokens":10,"cache_read_input_tokens":20,"output_tokens":50}}}}}}"#
        )
    }

    #[test]
    fn s2_identical_pair_dedups_distinct_pairs_do_not() {
        let lines = [
            assistant_line("msg-1", "req-1"),
            assistant_line("msg-1", "req-1"),
            assistant_line("msg-2", "req-2"),
        ];
        let line_refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let dir = write_fixture(&line_refs);
        let parser = ClaudeParser::new();
        let ctx = ParseContext::for_provider(&parser.config, 0);
        let mut deduper = MessageDeduper::init(16);
        let mut events = Vec::new();
        parser
            .parse_session(&ctx, "session-1", &dir.path().join("session-1.jsonl"), Some(&mut deduper), &mut events)
            .unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn additive_cache_fields_and_session_id_override() {
        let lines = [assistant_line("msg-1", "req-1")];
        let dir = write_fixture(&lines.iter().map(String::as_str).collect::<Vec<_>>());
        let parser = ClaudeParser::new();
        let ctx = ParseContext::for_provider(&parser.config, 0);
        let mut events = Vec::new();
        parser
            .parse_session(&ctx, "filename-session-id", &dir.path().join("session-1.jsonl"), None, &mut events)
            .unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.session_id, "sess-a");
        assert_eq!(event.usage.input_tokens, 100);
        assert_eq!(event.display_input_tokens, 130);
        assert_eq!(event.usage.reasoning_output_tokens, 0);
    }
}
