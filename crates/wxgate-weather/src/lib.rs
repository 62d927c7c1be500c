//! Weather aggregation for wxgate.
//!
//! Fronts the OpenWeatherMap API with a time-bounded cache and reshapes its
//! responses: current conditions, a three-day forecast reduced from the
//! 3-hourly feed, and city search.

pub mod cache;
pub mod client;
pub mod error;
pub mod forecast;
pub mod provider;
pub mod retry;
pub mod service;
pub mod types;

pub use cache::{
    get_or_compute, CacheEntry, CacheKind, CacheStore, MemoryCache, DEFAULT_TTL, MAX_TTL,
};
pub use client::OpenWeatherMapClient;
pub use error::{UpstreamError, WeatherError};
pub use forecast::{reduce_forecast, reduce_forecast_with_limit, MAX_FORECAST_DAYS};
pub use provider::WeatherUpstream;
pub use retry::RetryConfig;
pub use service::WeatherService;
pub use types::*;
