//! Pricing resolution: an optional remote LiteLLM manifest merged with
//! each provider's static fallback table. Remote fetch failures are
//! never fatal; they just leave the manifest empty, and fallback
//! tables still apply.

use crate::providers::SessionParser;
use crate::types::{PricingEntry, PricingMap, Result, TokenuzeError};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const LITELLM_PRICING_URL: &str =
    "https://raw.githubusercontent.com/BerriAI/litellm/main/model_prices_and_context_window.json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize, Default)]
struct RemoteModelPricing {
    #[serde(default)]
    input_cost_per_token: Option<f64>,
    #[serde(default)]
    output_cost_per_token: Option<f64>,
    #[serde(default)]
    cache_creation_input_token_cost: Option<f64>,
    #[serde(default)]
    cache_read_input_token_cost: Option<f64>,
}

fn to_pricing_entry(raw: &RemoteModelPricing) -> Option<PricingEntry> {
    let input = raw.input_cost_per_token?;
    let output = raw.output_cost_per_token?;
    Some(PricingEntry {
        input_cost_per_million: input * 1_000_000.0,
        cache_creation_cost_per_million: raw.cache_creation_input_token_cost.unwrap_or(0.0) * 1_000_000.0,
        cached_input_cost_per_million: raw.cache_read_input_token_cost.unwrap_or(0.0) * 1_000_000.0,
        output_cost_per_million: output * 1_000_000.0,
        reasoning_output_cost_per_million: None,
    })
}

fn fetch_manifest() -> Result<HashMap<String, RemoteModelPricing>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| TokenuzeError::Pricing(e.to_string()))?;
    let response = client
        .get(LITELLM_PRICING_URL)
        .send()
        .map_err(|e| TokenuzeError::Pricing(e.to_string()))?;
    response
        .json::<HashMap<String, RemoteModelPricing>>()
        .map_err(|e| TokenuzeError::Pricing(e.to_string()))
}

/// Best-effort fetch of the remote manifest. On any network or parse
/// failure, logs at info level and returns an empty map; the caller's
/// fallback tables still apply.
pub fn fetch_remote_pricing() -> PricingMap {
    let mut map = PricingMap::new();
    match fetch_manifest() {
        Ok(raw) => {
            for (name, entry) in raw.iter() {
                if let Some(entry) = to_pricing_entry(entry) {
                    map.insert(name.clone(), entry);
                }
            }
        }
        Err(e) => {
            tracing::info!(error = %e, "remote pricing manifest unavailable, using fallback tables only");
        }
    }
    map
}

/// Build the pricing map for a run: remote manifest first (unless
/// `skip_remote`), then every selected provider's fallback table,
/// inserted only where the manifest left a gap.
pub fn build_pricing_map(providers: &[Box<dyn SessionParser>], skip_remote: bool) -> PricingMap {
    let mut map = if skip_remote {
        PricingMap::new()
    } else {
        fetch_remote_pricing()
    };
    for provider in providers {
        crate::providers::load_pricing_data(provider.as_ref(), &mut map);
    }
    map
}
