//! HTTP client for Electricity Maps compatible carbon-intensity APIs

use crate::types::{CarbonApiError, CarbonSnapshot};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use verdant_common::unix_now;

/// Trait for carbon-intensity providers
///
/// Declared with an explicit `Send` future so monitors can poll providers
/// from spawned tasks; implementations just write `async fn`.
pub trait CarbonProvider: Send + Sync {
    /// Fetch the current carbon intensity for a zone
    fn fetch_latest(
        &self,
        zone: &str,
    ) -> impl Future<Output = Result<CarbonSnapshot, CarbonApiError>> + Send;
}

/// Electricity Maps API client
/// API Documentation: https://static.electricitymaps.com/api/docs/index.html
pub struct ElectricityMapsProvider {
    client: reqwest::Client,
    base_url: String,
    fallback_url: String,
    api_key: String,
}

impl ElectricityMapsProvider {
    const DEFAULT_BASE_URL: &'static str = "https://api-access.electricitymaps.com/free-tier";
    const DEFAULT_FALLBACK_URL: &'static str = "https://api.electricitymap.org/v3";
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("verdant-hub/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            fallback_url: Self::DEFAULT_FALLBACK_URL.to_string(),
            api_key,
        }
    }

    pub fn with_base_urls(mut self, base_url: String, fallback_url: String) -> Self {
        self.base_url = base_url;
        self.fallback_url = fallback_url;
        self
    }

    async fn fetch_from(&self, base: &str, zone: &str) -> Result<CarbonSnapshot, CarbonApiError> {
        let response = self
            .client
            .get(format!("{base}/carbon-intensity/latest"))
            .header("auth-token", &self.api_key)
            .query(&[("zone", zone)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CarbonApiError::Status {
                zone: zone.to_string(),
                status: status.as_u16(),
            });
        }

        let mut snapshot: CarbonSnapshot = response
            .json()
            .await
            .map_err(|e| CarbonApiError::Parse(e.to_string()))?;
        snapshot.fetched_at = unix_now();

        Ok(snapshot)
    }
}

impl CarbonProvider for ElectricityMapsProvider {
    /// Try the primary endpoint first, then the fallback. The caller keeps
    /// its previous snapshot when both fail.
    #[instrument(skip(self))]
    async fn fetch_latest(&self, zone: &str) -> Result<CarbonSnapshot, CarbonApiError> {
        let mut last_error = String::new();

        for base in [&self.base_url, &self.fallback_url] {
            match self.fetch_from(base, zone).await {
                Ok(snapshot) => {
                    debug!(
                        zone = %zone,
                        ci = snapshot.carbon_intensity,
                        "Fetched carbon intensity"
                    );
                    return Ok(snapshot);
                }
                Err(e) => {
                    warn!(zone = %zone, endpoint = %base, error = %e, "Carbon fetch failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(CarbonApiError::AllEndpointsFailed {
            zone: zone.to_string(),
            last_error,
        })
    }
}

/// Provider backend selected at startup: the real HTTP API or the
/// deterministic mock.
pub enum ProviderBackend {
    ElectricityMaps(ElectricityMapsProvider),
    Mock(crate::mock::MockProvider),
}

impl CarbonProvider for ProviderBackend {
    async fn fetch_latest(&self, zone: &str) -> Result<CarbonSnapshot, CarbonApiError> {
        match self {
            Self::ElectricityMaps(p) => p.fetch_latest(zone).await,
            Self::Mock(p) => p.fetch_latest(zone).await,
        }
    }
}
