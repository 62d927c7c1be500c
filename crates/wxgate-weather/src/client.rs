//! OpenWeatherMap API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::instrument;
use wxgate_core::{ApiConfig, Config, ReqwestErrorExt};

use crate::error::UpstreamError;
use crate::provider::WeatherUpstream;
use crate::retry::{with_retry, RetryConfig};
use crate::types::{Coordinates, Location, RawCurrentWeather, RawForecastResponse, RawForecastSample};

const USER_AGENT: &str = concat!("wxgate/", env!("CARGO_PKG_VERSION"));
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

pub struct OpenWeatherMapClient {
    client: Client,
    base_url: String,
    geo_url: String,
    api_key: String,
    units: String,
    search_limit: u32,
    retry: RetryConfig,
}

impl OpenWeatherMapClient {
    /// Build a client from the `api` section and a retry policy.
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be constructed (TLS backend init).
    pub fn new(api: &ApiConfig, retry: RetryConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| UpstreamError::Network(e.into_network_error()))?;

        Ok(Self {
            client,
            base_url: api.base_url.clone(),
            geo_url: api.geo_url.clone(),
            api_key: api.api_key.clone(),
            units: api.units.clone(),
            search_limit: api.search_limit,
            retry,
        })
    }

    /// # Errors
    /// See `new`.
    pub fn from_config(config: &Config) -> Result<Self, UpstreamError> {
        Self::new(&config.api, RetryConfig::from(&config.retry))
    }

    /// Client pointed at arbitrary endpoints with default settings otherwise.
    ///
    /// # Errors
    /// See `new`.
    pub fn with_base_urls(
        base_url: &str,
        geo_url: &str,
        api_key: &str,
        retry: RetryConfig,
    ) -> Result<Self, UpstreamError> {
        let api = ApiConfig {
            base_url: base_url.to_string(),
            geo_url: geo_url.to_string(),
            api_key: api_key.to_string(),
            ..ApiConfig::default()
        };
        Self::new(&api, retry)
    }

    fn coordinate_query(&self, coords: Coordinates) -> Vec<(&'static str, String)> {
        vec![
            ("lat", coords.latitude.to_string()),
            ("lon", coords.longitude.to_string()),
            ("appid", self.api_key.clone()),
            ("units", self.units.clone()),
        ]
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, UpstreamError> {
        // Strip URLs from errors so the appid never reaches logs or messages
        let response = with_retry(&self.retry, move || async move {
            self.client
                .get(url)
                .query(query)
                .send()
                .await
                .map_err(reqwest::Error::without_url)
        })
        .await
        .map_err(|e| UpstreamError::Network(e.into_network_error()))?;

        self.handle_response(response).await
    }

    /// Map provider status codes onto `UpstreamError` and decode success bodies.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, UpstreamError> {
        let status = response.status();

        if status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|e| UpstreamError::Network(e.without_url().into_network_error()))?;
            return serde_json::from_slice(&body)
                .map_err(|e| UpstreamError::malformed(format!("JSON parse error: {}", e)));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(UpstreamError::RateLimited(retry_after));
        }

        let text = response.text().await.unwrap_or_default();
        let message = provider_message(&text);
        tracing::debug!("Provider returned {}: {}", status, message);

        match status {
            StatusCode::UNAUTHORIZED => Err(UpstreamError::InvalidApiKey),
            StatusCode::NOT_FOUND => Err(UpstreamError::NotFound(message)),
            _ => Err(UpstreamError::Status {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

/// Error bodies look like `{"cod": 401, "message": "..."}`; fall back to raw text.
fn provider_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl WeatherUpstream for OpenWeatherMapClient {
    #[instrument(skip(self), level = "info")]
    async fn fetch_current(&self, coords: Coordinates) -> Result<RawCurrentWeather, UpstreamError> {
        let url = format!("{}weather", self.base_url);
        self.get_json(&url, &self.coordinate_query(coords)).await
    }

    #[instrument(skip(self), level = "info")]
    async fn fetch_forecast_series(
        &self,
        coords: Coordinates,
    ) -> Result<Vec<RawForecastSample>, UpstreamError> {
        let url = format!("{}forecast", self.base_url);
        let response: RawForecastResponse =
            self.get_json(&url, &self.coordinate_query(coords)).await?;
        response
            .list
            .ok_or_else(|| UpstreamError::malformed("forecast response has no list"))
    }

    #[instrument(skip(self), level = "info")]
    async fn search_locations(&self, query: &str) -> Result<Vec<Location>, UpstreamError> {
        let url = format!("{}direct", self.geo_url);
        let params = [
            ("q", query.to_string()),
            ("limit", self.search_limit.to_string()),
            ("appid", self.api_key.clone()),
        ];
        self.get_json(&url, &params).await
    }
}
