use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{UpstreamError, WeatherError};

/// Decimal places kept when a coordinate becomes part of a cache key (~11 m).
const KEY_PRECISION: i32 = 4;

/// A validated latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build coordinates, rejecting non-finite or out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, WeatherError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(WeatherError::InvalidLocation(format!(
                "latitude {} is outside [-90, 90]",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(WeatherError::InvalidLocation(format!(
                "longitude {} is outside [-180, 180]",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Parse raw query parameters such as `"10"` or `" 10.0 "`.
    pub fn parse(latitude: &str, longitude: &str) -> Result<Self, WeatherError> {
        Self::new(
            parse_axis("latitude", latitude)?,
            parse_axis("longitude", longitude)?,
        )
    }

    /// Stable `lat:lon` rendering used in cache keys.
    ///
    /// Both axes are rounded to a fixed precision so that `10`, `10.0` and
    /// `10.00001` share a slot, and `-0.0` is folded into `0.0`.
    pub fn cache_fragment(&self) -> String {
        format!(
            "{}:{}",
            format_axis(self.latitude),
            format_axis(self.longitude)
        )
    }
}

fn parse_axis(name: &str, raw: &str) -> Result<f64, WeatherError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(WeatherError::InvalidLocation(format!("{} is required", name)));
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| WeatherError::InvalidLocation(format!("{} '{}' is not a number", name, trimmed)))
}

fn format_axis(value: f64) -> String {
    let scale = 10f64.powi(KEY_PRECISION);
    let rounded = (value * scale).round() / scale;
    // -0.0 == 0.0, so this also drops the sign of negative zero
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{:.*}", KEY_PRECISION as usize, rounded)
}

/// A city search match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub country: String,
    /// Administrative region, when the provider knows one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

/// Current weather conditions for a coordinate pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: u8,
    pub wind_speed: f64,
    pub description: String,
    pub icon: String,
    pub location_name: String,
    pub country: String,
    /// When the provider computed the observation
    #[serde(with = "chrono::serde::ts_seconds")]
    pub captured_at: DateTime<Utc>,
}

/// One day of the reduced forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecastSummary {
    pub date: NaiveDate,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: u8,
    pub wind_speed: f64,
    pub description: String,
    pub icon: String,
}

/// `main` block shared by current and forecast payloads
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawMain {
    pub temp: f64,
    pub feels_like: f64,
    pub humidity: u8,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawWind {
    pub speed: f64,
}

/// Entry of the provider's `weather` array
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawCondition {
    #[serde(default)]
    pub main: String,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawSys {
    #[serde(default)]
    pub country: Option<String>,
}

/// Current-weather payload as returned by the provider.
///
/// Blocks are optional here so a missing one surfaces as a malformed
/// response instead of a generic decode failure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawCurrentWeather {
    pub dt: Option<i64>,
    pub main: Option<RawMain>,
    pub wind: Option<RawWind>,
    #[serde(default)]
    pub weather: Vec<RawCondition>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sys: Option<RawSys>,
}

/// One entry of the provider's 3-hourly forecast list
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawForecastSample {
    pub dt: Option<i64>,
    pub main: Option<RawMain>,
    pub wind: Option<RawWind>,
    #[serde(default)]
    pub weather: Vec<RawCondition>,
}

/// Envelope of the forecast endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RawForecastResponse {
    pub list: Option<Vec<RawForecastSample>>,
}

impl TryFrom<RawCurrentWeather> for CurrentConditions {
    type Error = UpstreamError;

    fn try_from(raw: RawCurrentWeather) -> Result<Self, Self::Error> {
        let dt = raw
            .dt
            .ok_or_else(|| UpstreamError::malformed("current weather has no timestamp"))?;
        let captured_at = DateTime::from_timestamp(dt, 0).ok_or_else(|| {
            UpstreamError::malformed(format!("current weather timestamp {} is out of range", dt))
        })?;
        let main = raw
            .main
            .ok_or_else(|| UpstreamError::malformed("current weather has no main block"))?;
        let wind = raw
            .wind
            .ok_or_else(|| UpstreamError::malformed("current weather has no wind block"))?;
        let condition = raw
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::malformed("current weather has no conditions"))?;

        Ok(Self {
            temperature: main.temp,
            feels_like: main.feels_like,
            humidity: main.humidity,
            wind_speed: wind.speed,
            description: condition.description,
            icon: condition.icon,
            location_name: raw.name.unwrap_or_default(),
            country: raw.sys.and_then(|s| s.country).unwrap_or_default(),
            captured_at,
        })
    }
}

/// Values the shared cache can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Current(CurrentConditions),
    Forecast(Vec<DailyForecastSummary>),
}

/// Conversion between a service result and its cache representation.
pub trait Cacheable: Clone + Sized {
    fn into_cached(self) -> CachedValue;

    /// Returns `None` if the entry holds a different kind of value.
    fn from_cached(value: CachedValue) -> Option<Self>;
}

impl Cacheable for CurrentConditions {
    fn into_cached(self) -> CachedValue {
        CachedValue::Current(self)
    }

    fn from_cached(value: CachedValue) -> Option<Self> {
        match value {
            CachedValue::Current(current) => Some(current),
            CachedValue::Forecast(_) => None,
        }
    }
}

impl Cacheable for Vec<DailyForecastSummary> {
    fn into_cached(self) -> CachedValue {
        CachedValue::Forecast(self)
    }

    fn from_cached(value: CachedValue) -> Option<Self> {
        match value {
            CachedValue::Forecast(days) => Some(days),
            CachedValue::Current(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    fn owm_current() -> serde_json::Value {
        serde_json::json!({
            "coord": {"lon": 36.8219, "lat": -1.2921},
            "weather": [{"id": 803, "main": "Clouds", "description": "broken clouds", "icon": "04d"}],
            "main": {"temp": 22.5, "feels_like": 22.1, "humidity": 56, "pressure": 1016},
            "wind": {"speed": 4.1, "deg": 70},
            "dt": 1_700_000_000,
            "sys": {"country": "KE"},
            "name": "Nairobi"
        })
    }

    #[test]
    fn test_coordinates_in_range() {
        let coords = Coordinates::new(-1.2921, 36.8219).unwrap();
        assert_eq!(coords.latitude, -1.2921);
        assert!(Coordinates::new(90.0, 180.0).is_ok());
        assert!(Coordinates::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn test_coordinates_out_of_range() {
        assert!(matches!(
            Coordinates::new(200.0, 0.0),
            Err(WeatherError::InvalidLocation(_))
        ));
        assert!(matches!(
            Coordinates::new(0.0, -180.5),
            Err(WeatherError::InvalidLocation(_))
        ));
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
        assert!(Coordinates::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_parse_rejects_missing_and_non_numeric() {
        assert!(matches!(
            Coordinates::parse("", "20"),
            Err(WeatherError::InvalidLocation(msg)) if msg.contains("required")
        ));
        assert!(matches!(
            Coordinates::parse("10", "east"),
            Err(WeatherError::InvalidLocation(msg)) if msg.contains("not a number")
        ));
    }

    #[test]
    fn test_cache_fragment_collapses_formatting() {
        let a = Coordinates::parse("10", "20").unwrap();
        let b = Coordinates::parse("10.0", " 20.000 ").unwrap();
        let c = Coordinates::new(10.000_01, 19.999_99).unwrap();
        assert_eq!(a.cache_fragment(), "10.0000:20.0000");
        assert_eq!(a.cache_fragment(), b.cache_fragment());
        assert_eq!(a.cache_fragment(), c.cache_fragment());
    }

    #[test]
    fn test_cache_fragment_folds_negative_zero() {
        let a = Coordinates::new(-0.0, -0.000_01).unwrap();
        assert_eq!(a.cache_fragment(), "0.0000:0.0000");
    }

    #[test]
    fn test_current_conditions_from_payload() {
        let raw: RawCurrentWeather = serde_json::from_value(owm_current()).unwrap();
        let current = CurrentConditions::try_from(raw).unwrap();

        assert_eq!(current.temperature, 22.5);
        assert_eq!(current.feels_like, 22.1);
        assert_eq!(current.humidity, 56);
        assert_eq!(current.wind_speed, 4.1);
        assert_eq!(current.description, "broken clouds");
        assert_eq!(current.icon, "04d");
        assert_eq!(current.location_name, "Nairobi");
        assert_eq!(current.country, "KE");
        assert_eq!(current.captured_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_current_conditions_missing_wind_is_malformed() {
        let mut payload = owm_current();
        payload.as_object_mut().unwrap().remove("wind");
        let raw: RawCurrentWeather = serde_json::from_value(payload).unwrap();

        let err = CurrentConditions::try_from(raw).unwrap_err();
        assert!(matches!(err, UpstreamError::MalformedResponse(msg) if msg.contains("wind")));
    }

    #[test]
    fn test_current_conditions_serializes_epoch_seconds() {
        let raw: RawCurrentWeather = serde_json::from_value(owm_current()).unwrap();
        let current = CurrentConditions::try_from(raw).unwrap();
        let json = serde_json::to_value(&current).unwrap();
        assert_eq!(json["captured_at"], 1_700_000_000);
    }

    #[test]
    fn test_location_deserializes_geocoding_match() {
        let loc: Location = serde_json::from_value(serde_json::json!({
            "name": "Springfield",
            "local_names": {"en": "Springfield"},
            "lat": 39.7817,
            "lon": -89.6501,
            "country": "US",
            "state": "Illinois"
        }))
        .unwrap();
        assert_eq!(loc.state.as_deref(), Some("Illinois"));
        assert_eq!(loc.lon, -89.6501);
    }

    #[test]
    fn test_cacheable_rejects_other_kind() {
        let cached = Vec::<DailyForecastSummary>::new().into_cached();
        assert!(CurrentConditions::from_cached(cached.clone()).is_none());
        assert_eq!(Vec::<DailyForecastSummary>::from_cached(cached), Some(vec![]));
    }
}
