//! Zed session parser: `~/.local/share/zed/threads/threads.db`, one row
//! per thread whose `data` BLOB is a zstd-compressed JSON document
//! carrying a `request_token_usage` map keyed by request id.

use super::{ParseContext, ProviderConfig, SessionParser};
use crate::types::{MessageDeduper, PricingEntry, RawUsage, Result, TokenUsage, TokenUsageEvent};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Deserialize)]
struct ZedThread {
    #[serde(default)]
    model: Option<ZedModel>,
    #[serde(default, rename = "request_token_usage")]
    request_token_usage: BTreeMap<String, ZedUsage>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ZedModel {
    Name(String),
    Object { model: String },
}

impl ZedModel {
    fn name(&self) -> String {
        match self {
            ZedModel::Name(s) => s.clone(),
            ZedModel::Object { model } => model.clone(),
        }
    }
}

#[derive(Deserialize, Default)]
struct ZedUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl From<ZedUsage> for RawUsage {
    fn from(u: ZedUsage) -> Self {
        RawUsage {
            input_tokens: u.input_tokens,
            cache_creation_input_tokens: u.cache_creation_input_tokens,
            cached_input_tokens: u.cache_read_input_tokens,
            output_tokens: u.output_tokens,
            reasoning_output_tokens: 0,
            total_tokens: u.input_tokens
                + u.cache_creation_input_tokens
                + u.cache_read_input_tokens
                + u.output_tokens,
        }
    }
}

pub struct ZedParser {
    config: ProviderConfig,
}

impl ZedParser {
    pub fn new() -> Self {
        Self {
            config: ProviderConfig {
                name: "zed",
                sessions_dir_suffix: ".local/share/zed/threads",
                legacy_fallback_model: None,
                session_file_ext: "db",
                cached_counts_overlap_input: false,
                requires_deduper: false,
            },
        }
    }
}

impl Default for ZedParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionParser for ZedParser {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    // Zed threads name whichever backend model served them; no
    // Zed-specific pricing table is needed beyond the other providers'.
    fn fallback_pricing(&self) -> Vec<(&'static str, PricingEntry)> {
        Vec::new()
    }

    fn parse_session(
        &self,
        ctx: &ParseContext,
        _session_id: &str,
        path: &Path,
        _deduper: Option<&mut MessageDeduper>,
        events: &mut Vec<TokenUsageEvent>,
    ) -> Result<()> {
        let conn = match rusqlite::Connection::open(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::info!(provider = "zed", path = %path.display(), error = %e, "skipping unreadable thread database");
                return Ok(());
            }
        };

        let mut stmt = match conn.prepare("SELECT id, data, updated_at FROM threads") {
            Ok(s) => s,
            Err(e) => {
                tracing::info!(provider = "zed", path = %path.display(), error = %e, "skipping database without a threads table");
                return Ok(());
            }
        };

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, String>(2)?,
            ))
        });
        let rows = match rows {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(provider = "zed", path = %path.display(), error_name = "sqlite_query", error = %e, "malformed threads table");
                return Ok(());
            }
        };

        for (line_index, row) in rows.enumerate() {
            let (thread_id, compressed, updated_at) = match row {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(provider = "zed", path = %path.display(), line_index, error_name = "sqlite_row", error = %e, "malformed thread row");
                    continue;
                }
            };

            let decompressed = match zstd::stream::decode_all(&compressed[..]) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(provider = "zed", path = %path.display(), line_index, error_name = "zstd_decode", error = %e, "failed to decompress thread blob");
                    continue;
                }
            };
            let thread: ZedThread = match serde_json::from_slice(&decompressed) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(provider = "zed", path = %path.display(), line_index, error_name = "json_parse", error = %e, "malformed thread document");
                    continue;
                }
            };

            let Some(model_name) = thread.model.as_ref().map(ZedModel::name).filter(|s| !s.is_empty()) else {
                continue;
            };
            let Some((timestamp, local_iso_date)) = ctx.timestamp_from_slice(&updated_at) else {
                continue;
            };

            for usage in thread.request_token_usage.into_values() {
                let raw: RawUsage = usage.into();
                let delta = TokenUsage::from_raw(raw);
                let display_input_tokens = delta.display_input_tokens(ctx.cached_counts_overlap_input);
                let usage = ctx.normalize_usage_delta(delta);
                if usage.is_zero() {
                    continue;
                }

                events.push(TokenUsageEvent {
                    session_id: format!("thread-{thread_id}"),
                    timestamp: timestamp.clone(),
                    local_iso_date: local_iso_date.clone(),
                    model_name: model_name.clone(),
                    usage,
                    is_fallback_model: false,
                    display_input_tokens,
                });
            }
        }

        Ok(())
    }
}
