//! Reduces the provider's 3-hourly forecast feed to one summary per day.
//!
//! The first sample of each new UTC calendar date is kept, in input order,
//! up to a fixed number of days.

use chrono::{DateTime, NaiveDate};

use crate::error::UpstreamError;
use crate::types::{DailyForecastSummary, RawForecastSample};

/// Number of daily summaries returned by `reduce_forecast`.
pub const MAX_FORECAST_DAYS: usize = 3;

/// Reduce `samples` to at most `MAX_FORECAST_DAYS` daily summaries.
///
/// # Errors
/// `UpstreamError::MalformedResponse` when a scanned sample has no usable
/// timestamp, or a kept sample lacks its `main`, `wind` or `weather` data.
pub fn reduce_forecast(
    samples: &[RawForecastSample],
) -> Result<Vec<DailyForecastSummary>, UpstreamError> {
    reduce_forecast_with_limit(samples, MAX_FORECAST_DAYS)
}

/// Same as `reduce_forecast` with a caller-chosen day limit.
///
/// # Errors
/// See `reduce_forecast`.
pub fn reduce_forecast_with_limit(
    samples: &[RawForecastSample],
    max_days: usize,
) -> Result<Vec<DailyForecastSummary>, UpstreamError> {
    let mut current_date: Option<NaiveDate> = None;
    let mut days = Vec::with_capacity(max_days.min(samples.len()));

    for (index, sample) in samples.iter().enumerate() {
        let date = sample_date(sample, index)?;
        if current_date == Some(date) {
            continue;
        }
        current_date = Some(date);

        if days.len() >= max_days {
            break;
        }
        days.push(summarize(sample, date, index)?);
    }

    Ok(days)
}

fn sample_date(sample: &RawForecastSample, index: usize) -> Result<NaiveDate, UpstreamError> {
    let dt = sample
        .dt
        .ok_or_else(|| UpstreamError::malformed(format!("forecast sample {} has no timestamp", index)))?;
    DateTime::from_timestamp(dt, 0)
        .map(|at| at.date_naive())
        .ok_or_else(|| {
            UpstreamError::malformed(format!(
                "forecast sample {} timestamp {} is out of range",
                index, dt
            ))
        })
}

fn summarize(
    sample: &RawForecastSample,
    date: NaiveDate,
    index: usize,
) -> Result<DailyForecastSummary, UpstreamError> {
    let missing = |block: &str| {
        UpstreamError::malformed(format!("forecast sample {} has no {}", index, block))
    };
    let main = sample.main.as_ref().ok_or_else(|| missing("main block"))?;
    let wind = sample.wind.as_ref().ok_or_else(|| missing("wind block"))?;
    let condition = sample.weather.first().ok_or_else(|| missing("conditions"))?;

    Ok(DailyForecastSummary {
        date,
        temperature: main.temp,
        feels_like: main.feels_like,
        humidity: main.humidity,
        wind_speed: wind.speed,
        description: condition.description.clone(),
        icon: condition.icon.clone(),
    })
}
