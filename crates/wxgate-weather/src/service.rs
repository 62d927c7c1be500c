//! Weather aggregation service: validation, caching and reduction in front of
//! the upstream provider.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;
use wxgate_core::Config;

use crate::cache::{get_or_compute, CacheKind, CacheStore, MemoryCache, DEFAULT_TTL};
use crate::client::OpenWeatherMapClient;
use crate::error::WeatherError;
use crate::forecast::reduce_forecast;
use crate::provider::WeatherUpstream;
use crate::types::{Coordinates, CurrentConditions, DailyForecastSummary, Location};

/// Entry point for current conditions, forecasts and city search.
///
/// Cheap to clone; clones share the upstream client and the cache.
#[derive(Clone)]
pub struct WeatherService {
    upstream: Arc<dyn WeatherUpstream>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl std::fmt::Debug for WeatherService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherService")
            .field("cached_entries", &self.cache.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl WeatherService {
    pub fn new(upstream: Arc<dyn WeatherUpstream>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            upstream,
            cache,
            ttl: DEFAULT_TTL,
        }
    }

    /// Override the lifetime of cached entries.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Wire an OpenWeatherMap client and an in-memory cache from `config`.
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, WeatherError> {
        let client = OpenWeatherMapClient::from_config(config)?;
        let cache = MemoryCache::with_max_entries(config.cache.max_entries);
        Ok(Self::new(Arc::new(client), Arc::new(cache))
            .with_ttl(Duration::from_secs(config.cache.ttl_seconds)))
    }

    /// Current conditions at (`lat`, `lon`), served from cache when fresh.
    ///
    /// # Errors
    /// `InvalidLocation` for out-of-range coordinates; upstream failures
    /// unchanged. Nothing is cached on failure.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_current(&self, lat: f64, lon: f64) -> Result<CurrentConditions, WeatherError> {
        let coords = Coordinates::new(lat, lon)?;
        let key = CacheKind::Current.key(&coords);
        let upstream = self.upstream.as_ref();

        let current = get_or_compute(self.cache.as_ref(), &key, self.ttl, move || async move {
            let raw = upstream.fetch_current(coords).await?;
            CurrentConditions::try_from(raw)
        })
        .await?;

        Ok(current)
    }

    /// Up to three daily summaries for (`lat`, `lon`), served from cache when fresh.
    ///
    /// # Errors
    /// `InvalidLocation` for out-of-range coordinates; upstream failures,
    /// including malformed samples, unchanged. Nothing is cached on failure.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_forecast(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Vec<DailyForecastSummary>, WeatherError> {
        let coords = Coordinates::new(lat, lon)?;
        let key = CacheKind::Forecast.key(&coords);
        let upstream = self.upstream.as_ref();

        let days = get_or_compute(self.cache.as_ref(), &key, self.ttl, move || async move {
            let samples = upstream.fetch_forecast_series(coords).await?;
            reduce_forecast(&samples)
        })
        .await?;

        Ok(days)
    }

    /// City search. Never cached; an empty result is returned as-is.
    ///
    /// # Errors
    /// `InvalidQuery` for a blank query; upstream failures unchanged.
    #[instrument(skip(self), level = "debug")]
    pub async fn search_locations(&self, query: &str) -> Result<Vec<Location>, WeatherError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(WeatherError::InvalidQuery);
        }

        let matches = self.upstream.search_locations(query).await?;
        tracing::debug!("{} matches for {:?}", matches.len(), query);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_from_config_applies_cache_settings() {
        let mut config = Config::default();
        config.cache.ttl_seconds = 90;
        config.cache.max_entries = 10;

        let service = WeatherService::from_config(&config).unwrap();
        assert_eq!(service.ttl, Duration::from_secs(90));
        assert!(format!("{:?}", service).contains("cached_entries: 0"));
    }
}
