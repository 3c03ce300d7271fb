//! Crush session parser: project-nested SQLite databases under
//! `~/.config/crush/projects/**/*.db`, one row per session with a
//! prompt/completion token pair for a specific model.
//!
//! Queried in-process via `rusqlite` rather than shelling out to the
//! `sqlite3` CLI; what this crate needs is the row data, not the
//! subprocess that produces it.

use super::{ParseContext, ProviderConfig, SessionParser};
use crate::types::{MessageDeduper, PricingEntry, RawUsage, Result, TokenUsage, TokenUsageEvent};
use std::path::Path;

pub struct CrushParser {
    config: ProviderConfig,
}

impl CrushParser {
    pub fn new() -> Self {
        Self {
            config: ProviderConfig {
                name: "crush",
                sessions_dir_suffix: ".config/crush/projects",
                legacy_fallback_model: None,
                session_file_ext: "db",
                cached_counts_overlap_input: false,
                requires_deduper: false,
            },
        }
    }
}

impl Default for CrushParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionParser for CrushParser {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    // Crush sessions name the backend model directly (e.g. "gpt-5",
    // "claude-sonnet-4-5"); those providers' own fallback tables already
    // cover pricing lookups, so Crush contributes none of its own.
    fn fallback_pricing(&self) -> Vec<(&'static str, PricingEntry)> {
        Vec::new()
    }

    fn parse_session(
        &self,
        ctx: &ParseContext,
        session_id: &str,
        path: &Path,
        _deduper: Option<&mut MessageDeduper>,
        events: &mut Vec<TokenUsageEvent>,
    ) -> Result<()> {
        let conn = match rusqlite::Connection::open(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::info!(provider = "crush", path = %path.display(), error = %e, "skipping unreadable project database");
                return Ok(());
            }
        };

        let mut stmt = match conn
            .prepare("SELECT id, model, prompt_tokens, completion_tokens, updated_at FROM sessions")
        {
            Ok(s) => s,
            Err(e) => {
                tracing::info!(provider = "crush", path = %path.display(), error = %e, "skipping database without a sessions table");
                return Ok(());
            }
        };

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        });

        let rows = match rows {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(provider = "crush", path = %path.display(), error_name = "sqlite_query", error = %e, "malformed sessions table");
                return Ok(());
            }
        };

        for (line_index, row) in rows.enumerate() {
            let (row_id, model_name, prompt_tokens, completion_tokens, updated_at) = match row {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(provider = "crush", path = %path.display(), line_index, error_name = "sqlite_row", error = %e, "malformed session row");
                    continue;
                }
            };

            let Some((timestamp, local_iso_date)) = ctx.timestamp_from_slice(&updated_at) else {
                continue;
            };

            let raw = RawUsage {
                input_tokens: prompt_tokens.max(0) as u64,
                cache_creation_input_tokens: 0,
                cached_input_tokens: 0,
                output_tokens: completion_tokens.max(0) as u64,
                reasoning_output_tokens: 0,
                total_tokens: (prompt_tokens.max(0) + completion_tokens.max(0)) as u64,
            };
            let delta = TokenUsage::from_raw(raw);
            let display_input_tokens = delta.display_input_tokens(ctx.cached_counts_overlap_input);
            let usage = ctx.normalize_usage_delta(delta);
            if usage.is_zero() {
                continue;
            }

            events.push(TokenUsageEvent {
                session_id: format!("{session_id}-{row_id}"),
                timestamp,
                local_iso_date,
                model_name,
                usage,
                is_fallback_model: false,
                display_input_tokens,
            });
        }

        Ok(())
    }
}
