//! Generic provider framework: a configuration record plus a shared
//! runner that dispatches to per-provider session parsers. Specializations
//! never implement their own directory walk or worker pool; they only
//! know how to turn one session file into zero or more events.

mod amp;
mod claude;
mod codex;
mod crush;
mod gemini;
mod opencode;
mod zed;

pub use amp::AmpParser;
pub use claude::ClaudeParser;
pub use codex::CodexParser;
pub use crush::CrushParser;
pub use gemini::GeminiParser;
pub use opencode::OpencodeParser;
pub use zed::ZedParser;

use crate::types::{MessageDeduper, ModelState, PricingEntry, PricingMap, Result, TokenUsage, TokenUsageEvent};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Static description of a provider's session layout and normalization
/// rules. One instance per provider specialization.
#[derive(Debug, Clone, Copy)]
pub struct ProviderConfig {
    pub name: &'static str,
    pub sessions_dir_suffix: &'static str,
    pub legacy_fallback_model: Option<&'static str>,
    pub session_file_ext: &'static str,
    pub cached_counts_overlap_input: bool,
    pub requires_deduper: bool,
}

/// Per-run context threaded through a parser: normalization mode,
/// fallback model, and the bucketing timezone.
pub struct ParseContext {
    pub provider: &'static str,
    pub cached_counts_overlap_input: bool,
    pub legacy_fallback_model: Option<&'static str>,
    pub tz_offset_minutes: i32,
}

impl ParseContext {
    pub fn for_provider(cfg: &ProviderConfig, tz_offset_minutes: i32) -> Self {
        Self {
            provider: cfg.name,
            cached_counts_overlap_input: cfg.cached_counts_overlap_input,
            legacy_fallback_model: cfg.legacy_fallback_model,
            tz_offset_minutes,
        }
    }

    pub fn normalize_usage_delta(&self, u: TokenUsage) -> TokenUsage {
        crate::types::normalize_usage_delta(u, self.cached_counts_overlap_input)
    }

    /// If `extracted` is non-empty, adopt it into `state` and return it.
    /// Otherwise reuse the carried-over model, then the provider's legacy
    /// fallback (marked `is_fallback`), then give up.
    pub fn resolve_model(
        &self,
        state: &mut ModelState,
        extracted: Option<&str>,
    ) -> Option<(String, bool)> {
        if let Some(name) = extracted.map(str::trim).filter(|s| !s.is_empty()) {
            state.set(name.to_string());
            return Some((name.to_string(), false));
        }
        if let Some(current) = state.current_model.clone() {
            return Some((current, state.is_fallback));
        }
        if let Some(fallback) = self.legacy_fallback_model {
            state.current_model = Some(fallback.to_string());
            state.is_fallback = true;
            return Some((fallback.to_string(), true));
        }
        None
    }

    pub fn timestamp_from_slice(&self, text: &str) -> Option<(String, String)> {
        crate::time::timestamp_from_slice(text, self.tz_offset_minutes)
    }
}

/// Per-provider session parser. Implementations never walk the
/// filesystem themselves; `collect_events` does that and calls
/// `parse_session` once per discovered file.
pub trait SessionParser: Send + Sync {
    fn config(&self) -> &ProviderConfig;

    fn fallback_pricing(&self) -> Vec<(&'static str, PricingEntry)>;

    fn parse_session(
        &self,
        ctx: &ParseContext,
        session_id: &str,
        path: &Path,
        deduper: Option<&mut MessageDeduper>,
        events: &mut Vec<TokenUsageEvent>,
    ) -> Result<()>;
}

/// Default session-file read cap (128 MiB), matched by every JSONL/JSON
/// specialization.
pub fn default_max_session_bytes() -> u64 {
    128 * 1024 * 1024
}

/// Memory-capped line reader: calls `handler(line, line_index)` for each
/// non-empty, trimmed line. Stops cleanly (without error) once `max_bytes`
/// has been consumed; already-emitted events from earlier lines are
/// retained by the caller.
/// Streams `path` line by line, handing each non-blank line to `handler`
/// as an owned, mutable byte buffer so callers can parse it in place with
/// `simd_json::from_slice` without a second allocation.
pub fn stream_json_lines<F>(path: &Path, max_bytes: u64, mut handler: F) -> Result<()>
where
    F: FnMut(&mut [u8], usize),
{
    let file = File::open(path)?;
    let mut reader = BufReader::new(file.take(max_bytes));
    let mut line = String::new();
    let mut index = 0usize;
    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            break;
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            let mut bytes = trimmed.as_bytes().to_vec();
            handler(&mut bytes, index);
        }
        index += 1;
    }
    Ok(())
}

/// Owned copy of `s`, or `None` if it is absent/blank.
pub fn duplicate_non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Tolerant conversion from a JSON number/string value to `u64`.
pub fn json_value_to_u64(value: &serde_json::Value) -> u64 {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u
            } else if let Some(f) = n.as_f64() {
                if f.is_finite() && f >= 0.0 {
                    f as u64
                } else {
                    0
                }
            } else {
                0
            }
        }
        serde_json::Value::String(s) => crate::types::parse_token_number(s),
        _ => 0,
    }
}

/// Fingerprint a `(message_id, request_id)` pair for `MessageDeduper`.
/// Uses FNV-1a mixing, stable across runs, which is all the dedup
/// contract needs.
pub fn fingerprint(message_id: &str, request_id: &str) -> u64 {
    fn fnv1a(bytes: &[u8]) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for b in bytes {
            hash ^= *b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }
    fnv1a(message_id.as_bytes()) ^ fnv1a(request_id.as_bytes())
}

fn discover_session_files(home: &Path, cfg: &ProviderConfig) -> Vec<PathBuf> {
    let root = home.join(cfg.sessions_dir_suffix);
    let pattern = root.join(format!("**/*.{}", cfg.session_file_ext));
    glob::glob(&pattern.to_string_lossy())
        .map(|paths| paths.filter_map(std::result::Result::ok).collect())
        .unwrap_or_default()
}

/// Walk the provider's session directory, parse every matching file in
/// parallel on a worker pool scoped to this call (`min(nproc, 8)`
/// threads), and funnel the resulting events into one vector under a
/// mutex. Ordering across files is not guaranteed; the aggregation
/// pipeline re-sorts.
pub fn collect_events(parser: &dyn SessionParser, home: &Path, tz_offset_minutes: i32) -> Vec<TokenUsageEvent> {
    let cfg = *parser.config();
    let files = discover_session_files(home, &cfg);
    let ctx = ParseContext::for_provider(&cfg, tz_offset_minutes);
    let collected: Mutex<Vec<TokenUsageEvent>> = Mutex::new(Vec::new());

    let worker_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(8);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .build()
        .expect("failed to build per-provider worker pool");

    pool.install(|| {
        files.par_iter().for_each(|path| {
            let session_id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string();
            let mut deduper = cfg.requires_deduper.then(|| MessageDeduper::init(1024));
            let mut events = Vec::new();
            if let Err(e) = parser.parse_session(&ctx, &session_id, path, deduper.as_mut(), &mut events) {
                tracing::warn!(
                    provider = cfg.name,
                    path = %path.display(),
                    error = %e,
                    "failed to parse session file"
                );
            }
            if !events.is_empty() {
                collected.lock().expect("event mutex poisoned").extend(events);
            }
        });
    });

    collected.into_inner().expect("event mutex poisoned")
}

/// Merge a provider's static fallback pricing table into `pricing`,
/// never overwriting an entry already present (e.g. from a remote
/// manifest fetched earlier in startup).
pub fn load_pricing_data(parser: &dyn SessionParser, pricing: &mut PricingMap) {
    for (name, entry) in parser.fallback_pricing() {
        pricing.insert_fallback(name, entry);
    }
}

/// All seven provider specializations, in the order they should be
/// tried and reported.
pub fn all_providers() -> Vec<Box<dyn SessionParser>> {
    vec![
        Box::new(CodexParser::new()),
        Box::new(ClaudeParser::new()),
        Box::new(GeminiParser::new()),
        Box::new(AmpParser::new()),
        Box::new(OpencodeParser::new()),
        Box::new(CrushParser::new()),
        Box::new(ZedParser::new()),
    ]
}
