//! Verdant Carbon - grid carbon-intensity integration
//!
//! This crate polls grid carbon-intensity data per zone (Electricity Maps
//! compatible API or a deterministic mock), caches the freshest snapshot per
//! zone, and ranks zones by carbon intensity for placement decisions.

mod client;
mod mock;
mod monitor;
mod types;

pub use client::{CarbonProvider, ElectricityMapsProvider, ProviderBackend};
pub use mock::MockProvider;
pub use monitor::CarbonMonitor;
pub use types::{BestZone, CarbonApiError, CarbonSnapshot};
