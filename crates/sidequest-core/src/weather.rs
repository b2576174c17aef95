use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use sidequest_schema::{Coordinates, WeatherOutcome, WeatherReport};

use crate::config::WeatherConfig;

#[async_trait]
pub trait WeatherService: Send + Sync {
    /// Current conditions. Failures come back as [`WeatherOutcome::Error`].
    async fn current(&self, at: Coordinates) -> WeatherOutcome;
}

/// Open-Meteo forecast API, `current` block only.
pub struct OpenMeteoClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ForecastResponse {
    current: Option<CurrentBlock>,
}

#[derive(Deserialize)]
struct CurrentBlock {
    temperature_2m: Option<f64>,
    precipitation: Option<f64>,
    weather_code: Option<u16>,
}

impl OpenMeteoClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &WeatherConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn fetch(&self, at: Coordinates) -> Result<WeatherReport> {
        let resp = self
            .client
            .get(format!("{}/v1/forecast", self.base_url))
            .query(&[
                ("latitude", at.lat.to_string()),
                ("longitude", at.lng.to_string()),
                (
                    "current",
                    "temperature_2m,precipitation,weather_code".to_string(),
                ),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("HTTP {status}: {body}"));
        }

        let body: ForecastResponse = resp.json().await?;
        let current = body
            .current
            .ok_or_else(|| anyhow!("response has no current block"))?;
        Ok(WeatherReport {
            coordinates: at,
            temperature_c: current.temperature_2m,
            precipitation_mm: current.precipitation,
            weather_code: current.weather_code,
        })
    }
}

#[async_trait]
impl WeatherService for OpenMeteoClient {
    async fn current(&self, at: Coordinates) -> WeatherOutcome {
        match self.fetch(at).await {
            Ok(report) => {
                tracing::info!("{}", report.summary());
                WeatherOutcome::Success { report }
            }
            Err(e) => {
                tracing::warn!("Error fetching weather: {e}");
                WeatherOutcome::Error {
                    error_message: format!(
                        "Could not fetch weather for ({}, {}): {e}",
                        at.lat, at.lng
                    ),
                }
            }
        }
    }
}
