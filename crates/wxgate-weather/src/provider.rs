//! The upstream collaborator the service depends on.

use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::types::{Coordinates, Location, RawCurrentWeather, RawForecastSample};

/// Source of raw weather data and city matches.
///
/// Implementations own transport concerns (timeouts, retries); the service
/// calls each method at most once per request.
#[async_trait]
pub trait WeatherUpstream: Send + Sync {
    /// Current-weather payload for `coords`.
    async fn fetch_current(&self, coords: Coordinates) -> Result<RawCurrentWeather, UpstreamError>;

    /// Forecast samples for `coords`, in the provider's order.
    async fn fetch_forecast_series(
        &self,
        coords: Coordinates,
    ) -> Result<Vec<RawForecastSample>, UpstreamError>;

    /// Up to the configured number of matches; an empty list means no matches.
    async fn search_locations(&self, query: &str) -> Result<Vec<Location>, UpstreamError>;
}
