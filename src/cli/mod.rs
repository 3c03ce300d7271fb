//! CLI surface: flag parsing, provider selection, and dispatch between
//! the renderer and the uploader.

use clap::Parser;

use crate::providers::{all_providers, collect_events, SessionParser};
use crate::services::aggregator::Aggregator;
use crate::services::{build_pricing_map, machine_id, render, uploader};
use crate::time::parse_tz_offset;
use crate::types::{Result, TokenuzeError};
use std::path::PathBuf;

/// Reconciles local LLM coding-agent session logs into token usage and
/// cost reports.
#[derive(Parser)]
#[command(name = "tokenuze")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Inclusive lower bound on local date, YYYYMMDD
    #[arg(long)]
    since: Option<String>,

    /// Inclusive upper bound on local date, YYYYMMDD
    #[arg(long)]
    until: Option<String>,

    /// Bucket timezone: `UTC` or `±HH[:MM]`
    #[arg(long)]
    tz: Option<String>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Restrict to one or more providers; may repeat
    #[arg(long = "agent")]
    agents: Vec<String>,

    /// Upload the aggregation to the dashboard instead of rendering it
    #[arg(long)]
    upload: bool,

    /// Emit a per-session view instead of per-day
    #[arg(long)]
    sessions: bool,

    /// Emit JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Print the cached/derived machine ID and exit
    #[arg(long = "machine-id")]
    machine_id: bool,
}

fn parse_yyyymmdd(s: &str) -> Result<String> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TokenuzeError::InvalidUsage(format!("expected YYYYMMDD, got {s:?}")));
    }
    Ok(format!("{}-{}-{}", &s[0..4], &s[4..6], &s[6..8]))
}

fn resolve_tz_offset(tz_flag: Option<&str>) -> i32 {
    if let Some(tz) = tz_flag {
        return parse_tz_offset(tz).unwrap_or(0);
    }
    std::env::var("TZ").ok().and_then(|tz| parse_tz_offset(&tz).ok()).unwrap_or(0)
}

fn home_dir() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or_else(|| TokenuzeError::InvalidUsage("could not determine home directory".into()))
}

fn select_providers(agents: &[String]) -> Result<Vec<Box<dyn SessionParser>>> {
    let all = all_providers();
    if agents.is_empty() {
        return Ok(all);
    }
    let mut selected = Vec::new();
    for wanted in agents {
        match all.iter().position(|p| p.config().name == wanted.as_str()) {
            Some(_) => {}
            None => return Err(TokenuzeError::InvalidUsage(format!("unknown provider: {wanted}"))),
        }
    }
    for provider in all {
        if agents.iter().any(|a| a.as_str() == provider.config().name) {
            selected.push(provider);
        }
    }
    Ok(selected)
}

impl Cli {
    pub fn run(self) -> i32 {
        if self.machine_id {
            return match machine_id::machine_id() {
                Ok(id) => {
                    println!("{id}");
                    0
                }
                Err(e) => {
                    eprintln!("tokenuze: {e}");
                    1
                }
            };
        }

        match self.execute() {
            Ok(code) => code,
            Err(e) => {
                eprintln!("tokenuze: {e}");
                1
            }
        }
    }

    fn execute(&self) -> Result<i32> {
        let since = self.since.as_deref().map(parse_yyyymmdd).transpose()?;
        let until = self.until.as_deref().map(parse_yyyymmdd).transpose()?;
        if let (Some(s), Some(u)) = (&since, &until) {
            if u < s {
                return Err(TokenuzeError::InvalidUsage("--until must be >= --since".into()));
            }
        }

        let tz_offset_minutes = resolve_tz_offset(self.tz.as_deref());
        let providers = select_providers(&self.agents)?;
        let home = home_dir()?;
        let pricing = build_pricing_map(&providers, false);

        if self.upload {
            let machine_id = machine_id::machine_id()?;
            let status =
                uploader::upload(&providers, &home, tz_offset_minutes, &pricing, &machine_id)?;
            println!("{status}");
            return Ok(0);
        }

        let mut events = Vec::new();
        for provider in &providers {
            events.extend(collect_events(provider.as_ref(), &home, tz_offset_minutes));
        }

        let report = Aggregator::run(events, &pricing, since.as_deref(), until.as_deref());

        if self.json {
            println!("{}", render::render_json(&report, self.sessions, self.pretty));
        } else {
            println!("{}", render::render_table(&report, self.sessions));
        }

        Ok(0)
    }
}
