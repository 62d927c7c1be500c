//! Requests shared by the one-shot commands and the `serve` loop.
//!
//! `serve` answers one request per input line with one line of JSON, reusing
//! a single `WeatherService` so repeated lookups are served from its cache.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use wxgate_weather::{
    Coordinates, CurrentConditions, DailyForecastSummary, Location, WeatherError, WeatherService,
};

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Request {
    /// Current conditions at a coordinate
    Current {
        #[arg(allow_hyphen_values = true)]
        lat: String,
        #[arg(allow_hyphen_values = true)]
        lon: String,
    },
    /// Three-day forecast at a coordinate
    Forecast {
        #[arg(allow_hyphen_values = true)]
        lat: String,
        #[arg(allow_hyphen_values = true)]
        lon: String,
    },
    /// Search cities by name
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
}

/// One `serve` input line, e.g. `forecast -1.29 36.82`.
#[derive(Parser)]
#[command(no_binary_name = true, disable_help_flag = true, disable_help_subcommand = true)]
struct RequestLine {
    #[command(subcommand)]
    request: Request,
}

impl Request {
    pub fn parse_line(line: &str) -> Result<Self, clap::Error> {
        RequestLine::try_parse_from(line.split_whitespace()).map(|parsed| parsed.request)
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Current(CurrentConditions),
    Forecast(Vec<DailyForecastSummary>),
    Locations(Vec<Location>),
}

pub async fn execute(service: &WeatherService, request: Request) -> Result<Reply, WeatherError> {
    match request {
        Request::Current { lat, lon } => {
            let coords = Coordinates::parse(&lat, &lon)?;
            let current = service.get_current(coords.latitude, coords.longitude).await?;
            Ok(Reply::Current(current))
        }
        Request::Forecast { lat, lon } => {
            let coords = Coordinates::parse(&lat, &lon)?;
            let days = service.get_forecast(coords.latitude, coords.longitude).await?;
            Ok(Reply::Forecast(days))
        }
        Request::Search { query } => {
            let matches = service.search_locations(&query.join(" ")).await?;
            Ok(Reply::Locations(matches))
        }
    }
}

/// Answer requests from `reader` until EOF, returning how many were handled.
///
/// A failed request produces `{"error": "..."}` and the loop continues.
/// Blank lines are skipped.
pub async fn serve<R, W>(service: &WeatherService, reader: R, mut writer: W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut handled = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match Request::parse_line(line) {
            Ok(request) => match execute(service, request).await {
                Ok(reply) => serde_json::to_string(&reply)?,
                Err(e) => {
                    tracing::warn!("Request {:?} failed: {}", line, e);
                    error_line(e.user_message())?
                }
            },
            Err(e) => {
                let rendered = e.to_string();
                let first = rendered.lines().next().unwrap_or("invalid request");
                error_line(first.trim_start_matches("error: "))?
            }
        };

        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        handled += 1;
    }

    Ok(handled)
}

fn error_line(message: &str) -> serde_json::Result<String> {
    serde_json::to_string(&serde_json::json!({ "error": message }))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wxgate_weather::{
        MemoryCache, RawCurrentWeather, RawForecastSample, UpstreamError, WeatherUpstream,
    };

    #[derive(Default)]
    struct CountingUpstream {
        current_calls: AtomicUsize,
        forecast_calls: AtomicUsize,
        search_calls: AtomicUsize,
    }

    #[async_trait]
    impl WeatherUpstream for CountingUpstream {
        async fn fetch_current(
            &self,
            coords: Coordinates,
        ) -> Result<RawCurrentWeather, UpstreamError> {
            self.current_calls.fetch_add(1, Ordering::SeqCst);
            let payload = serde_json::json!({
                "dt": 1_700_000_000,
                "main": {"temp": coords.latitude, "feels_like": 0.0, "humidity": 50},
                "wind": {"speed": 1.0},
                "weather": [{"main": "Clear", "description": "clear sky", "icon": "01d"}],
                "sys": {"country": "NO"},
                "name": "Oslo"
            });
            Ok(serde_json::from_value(payload).unwrap())
        }

        async fn fetch_forecast_series(
            &self,
            _coords: Coordinates,
        ) -> Result<Vec<RawForecastSample>, UpstreamError> {
            self.forecast_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn search_locations(&self, query: &str) -> Result<Vec<Location>, UpstreamError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Location {
                name: query.to_string(),
                country: "US".to_string(),
                state: None,
                lat: 40.71,
                lon: -74.0,
            }])
        }
    }

    async fn run(upstream: &Arc<CountingUpstream>, input: &str) -> Vec<serde_json::Value> {
        let service = WeatherService::new(upstream.clone(), Arc::new(MemoryCache::new()));
        let mut out = Vec::new();
        let handled = serve(&service, tokio::io::BufReader::new(input.as_bytes()), &mut out)
            .await
            .unwrap();

        let lines: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), handled);
        lines
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            Request::parse_line("current -1.29 36.82").unwrap(),
            Request::Current {
                lat: "-1.29".into(),
                lon: "36.82".into()
            }
        );
        assert_eq!(
            Request::parse_line("search  New   York ").unwrap(),
            Request::Search {
                query: vec!["New".into(), "York".into()]
            }
        );
        assert!(Request::parse_line("current 10").is_err());
        assert!(Request::parse_line("weather 10 20").is_err());
    }

    #[tokio::test]
    async fn test_repeat_lookups_in_a_session_hit_the_cache() {
        let upstream = Arc::new(CountingUpstream::default());
        let replies = run(
            &upstream,
            "current 59.91 10.75\ncurrent 59.9100 10.75\nforecast 59.91 10.75\nforecast 59.91 10.75\n",
        )
        .await;

        assert_eq!(replies.len(), 4);
        assert_eq!(replies[0], replies[1]);
        assert_eq!(replies[0]["location_name"], "Oslo");
        assert_eq!(replies[2], serde_json::json!([]));
        assert_eq!(upstream.current_calls.load(Ordering::SeqCst), 1);
        assert_eq!(upstream.forecast_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_search_is_repeated_upstream() {
        let upstream = Arc::new(CountingUpstream::default());
        let replies = run(&upstream, "search New York\n\nsearch New York\n").await;

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0][0]["name"], "New York");
        assert_eq!(upstream.search_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bad_lines_answer_with_errors_and_continue() {
        let upstream = Arc::new(CountingUpstream::default());
        let replies = run(&upstream, "current 200 0\nbogus\nsearch   \ncurrent 1 1\n").await;

        assert_eq!(replies.len(), 4);
        assert_eq!(
            replies[0]["error"],
            "Latitude and longitude are required and must be in range."
        );
        assert!(replies[1]["error"].is_string());
        assert!(replies[2]["error"].is_string());
        assert_eq!(replies[3]["country"], "NO");
        assert_eq!(upstream.current_calls.load(Ordering::SeqCst), 1);
    }
}
