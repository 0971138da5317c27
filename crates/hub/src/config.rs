//! Hub configuration from environment variables

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Hub runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Electricity Maps API key
    pub api_key: String,
    /// Zones to poll for carbon intensity
    pub zones: Vec<String>,
    /// Serve synthesized carbon data instead of calling the provider
    pub use_mock_data: bool,
    /// Scheduler period (seconds)
    pub schedule_interval_s: u64,
    /// Dispatcher period (seconds)
    pub dispatch_interval_s: u64,
    /// Carbon poll period (seconds)
    pub carbon_poll_interval_s: u64,
    /// Address the API server binds to
    pub bind_address: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            zones: vec!["KR".to_string(), "JP".to_string(), "CN".to_string()],
            use_mock_data: false,
            schedule_interval_s: 300,
            dispatch_interval_s: 30,
            carbon_poll_interval_s: 30,
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

impl HubConfig {
    /// Load configuration from the environment, falling back to defaults and
    /// warning on unparseable values.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(key) = std::env::var("ELECTRICITYMAP_API_KEY") {
            config.api_key = key;
        }

        if let Ok(zones) = std::env::var("CARBON_ZONES") {
            let parsed: Vec<String> = zones
                .split(',')
                .map(str::trim)
                .filter(|z| !z.is_empty())
                .map(str::to_string)
                .collect();
            if parsed.is_empty() {
                warn!("CARBON_ZONES is set but empty, keeping defaults");
            } else {
                config.zones = parsed;
            }
        }

        if let Ok(v) = std::env::var("USE_MOCK_DATA") {
            config.use_mock_data = v.eq_ignore_ascii_case("true") || v == "1";
        }

        config.schedule_interval_s =
            env_u64("SCHEDULE_INTERVAL_S", config.schedule_interval_s);
        config.dispatch_interval_s =
            env_u64("DISPATCH_INTERVAL_S", config.dispatch_interval_s);
        config.carbon_poll_interval_s =
            env_u64("CARBON_POLL_INTERVAL_S", config.carbon_poll_interval_s);

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            config.bind_address = addr;
        }

        if config.api_key.is_empty() && !config.use_mock_data {
            warn!("ELECTRICITYMAP_API_KEY not set; carbon fetches will fail until it is provided");
        }

        config
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(v) => v.parse().unwrap_or_else(|_| {
            warn!(var = name, value = %v, "Unparseable interval, using default");
            default
        }),
        Err(_) => default,
    }
}
