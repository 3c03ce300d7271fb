//! Dashboard uploader: packages a per-provider aggregation into JSON and
//! POSTs it to the configured dashboard endpoint.

use crate::providers::SessionParser;
use crate::services::aggregator::Aggregator;
use crate::services::render::{daily_json, session_json, weekly_json};
use crate::types::{PricingMap, Result, TokenUsageEvent, TokenuzeError};
use serde::Serialize;
use serde_json::{json, Value};
use std::error::Error as _;
use std::time::Duration;

const DEFAULT_DASHBOARD_URL: &str = "http://localhost:8000";
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct ProviderUpload {
    name: String,
    daily_summary_json: Value,
    sessions_summary_json: Value,
    weekly_summary_json: Value,
}

fn build_provider_upload(name: &str, events: Vec<TokenUsageEvent>, pricing: &PricingMap) -> ProviderUpload {
    let report = Aggregator::run(events, pricing, None, None);
    ProviderUpload {
        name: name.to_string(),
        daily_summary_json: Value::Array(report.daily.iter().map(daily_json).collect()),
        sessions_summary_json: Value::Array(report.sessions.iter().map(session_json).collect()),
        weekly_summary_json: Value::Array(report.weekly.iter().map(weekly_json).collect()),
    }
}

fn dashboard_url() -> String {
    let base = std::env::var("DASHBOARD_API_URL").unwrap_or_else(|_| DEFAULT_DASHBOARD_URL.to_string());
    format!("{}/api/usage/report", base.trim_end_matches('/'))
}

fn is_dns_cname_failure(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(e) = source {
        if e.to_string().contains("invalid CNAME record") {
            return true;
        }
        source = e.source();
    }
    false
}

fn build_client(force_libc_resolver: bool) -> std::result::Result<reqwest::blocking::Client, reqwest::Error> {
    let mut builder = reqwest::blocking::Client::builder().timeout(UPLOAD_TIMEOUT);
    // `force_libc_resolver` is a no-op today: this client carries no
    // alternate DNS resolver feature, so it always resolves via libc.
    // Kept so the retry call site reads the same as the documented
    // "retry once using the libc resolver" contract.
    let _ = force_libc_resolver;
    builder = builder.no_proxy();
    builder.build()
}

fn post_body(client: &reqwest::blocking::Client, url: &str, api_key: &str, body: &Value) -> std::result::Result<reqwest::blocking::Response, reqwest::Error> {
    client.post(url).header("X-API-Key", api_key).json(body).send()
}

/// Run the uploader: aggregate each selected provider independently and
/// POST the bundle to the dashboard. A missing `DASHBOARD_API_KEY` is the
/// only failure mode surfaced as `Err` (it is the only one that should
/// change the process exit code); every transport or server-side outcome
/// comes back as `Ok` with a human-readable status line to print.
pub fn upload(
    providers: &[Box<dyn SessionParser>],
    home: &std::path::Path,
    tz_offset_minutes: i32,
    pricing: &PricingMap,
    machine_id: &str,
) -> Result<String> {
    let api_key = std::env::var("DASHBOARD_API_KEY")
        .map_err(|_| TokenuzeError::Upload("DASHBOARD_API_KEY is not set; see docs for how to configure it".into()))?;

    let mut uploads = Vec::with_capacity(providers.len());
    for provider in providers {
        let events = crate::providers::collect_events(provider.as_ref(), home, tz_offset_minutes);
        uploads.push(build_provider_upload(provider.config().name, events, pricing));
    }

    let body = json!({
        "machine_id": machine_id,
        "timezone_offset_minutes": tz_offset_minutes,
        "providers": uploads,
    });

    let url = dashboard_url();
    let client = match build_client(false) {
        Ok(c) => c,
        Err(e) => return Ok(format!("Failed ({e})")),
    };
    let response = match post_body(&client, &url, &api_key, &body) {
        Ok(r) => r,
        Err(e) if is_dns_cname_failure(&e) => match build_client(true) {
            Ok(retry_client) => match post_body(&retry_client, &url, &api_key, &body) {
                Ok(r) => r,
                Err(e) => return Ok(format!("Failed ({e})")),
            },
            Err(e) => return Ok(format!("Failed ({e})")),
        },
        Err(e) => return Ok(format!("Failed ({e})")),
    };

    Ok(status_message(response.status().as_u16()))
}

fn status_message(status: u16) -> String {
    match status {
        200 => "success".to_string(),
        401 => "Authentication failed".to_string(),
        422 => "Data validation error".to_string(),
        500..=599 => "Server error".to_string(),
        other => format!("Failed (HTTP {other})"),
    }
}
