use serde::{Deserialize, Serialize};

use crate::Coordinates;

/// WMO weather interpretation codes that mean something is falling from the sky.
const PRECIPITATION_CODES: &[std::ops::RangeInclusive<u16>] =
    &[51..=67, 71..=77, 80..=86, 95..=99];

const MIN_OUTDOOR_TEMP_C: f64 = 0.0;
const MAX_OUTDOOR_TEMP_C: f64 = 35.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReport {
    pub coordinates: Coordinates,
    pub temperature_c: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub weather_code: Option<u16>,
}

impl WeatherReport {
    /// No precipitation and a temperature people will go outside in.
    pub fn outdoor_friendly(&self) -> bool {
        if self.precipitation_mm.is_some_and(|mm| mm > 0.0) {
            return false;
        }
        if self
            .weather_code
            .is_some_and(|code| PRECIPITATION_CODES.iter().any(|r| r.contains(&code)))
        {
            return false;
        }
        match self.temperature_c {
            Some(t) => (MIN_OUTDOOR_TEMP_C..=MAX_OUTDOOR_TEMP_C).contains(&t),
            None => true,
        }
    }

    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        match self.temperature_c {
            Some(t) => parts.push(format!(
                "The current temperature at ({}, {}) is {t}°C",
                self.coordinates.lat, self.coordinates.lng
            )),
            None => parts.push(format!(
                "Current conditions at ({}, {})",
                self.coordinates.lat, self.coordinates.lng
            )),
        }
        if let Some(mm) = self.precipitation_mm {
            if mm > 0.0 {
                parts.push(format!("with {mm} mm of precipitation"));
            } else {
                parts.push("with no precipitation".to_string());
            }
        }
        let mut text = parts.join(" ");
        text.push('.');
        if !self.outdoor_friendly() {
            text.push_str(" Not suitable for outdoor activities.");
        }
        text
    }
}

/// Result of a weather lookup. Failures are carried as data, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WeatherOutcome {
    Success { report: WeatherReport },
    Error { error_message: String },
}

impl WeatherOutcome {
    pub fn report(&self) -> Option<&WeatherReport> {
        match self {
            Self::Success { report } => Some(report),
            Self::Error { .. } => None,
        }
    }

    /// Text handed to the suggestion prompt and surfaced as `weatherSummary`.
    pub fn describe(&self) -> String {
        match self {
            Self::Success { report } => report.summary(),
            Self::Error { error_message } => format!("weather unavailable: {error_message}"),
        }
    }

    /// `false` only when the weather is known and rules out outdoor activities.
    pub fn allows_outdoor(&self) -> bool {
        self.report().map_or(true, WeatherReport::outdoor_friendly)
    }
}
