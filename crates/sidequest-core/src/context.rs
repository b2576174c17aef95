//! Per-request state threaded through the stages.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use sidequest_schema::{Coordinates, UserProfile, WeatherOutcome, DEFAULT_LOCATION};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::geolocation::Geolocator;
use crate::weather::WeatherService;

/// Named stage results. Append-only: writing a key twice is an error.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    values: Map<String, Value>,
}

impl StageOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: Value) -> Result<(), PipelineError> {
        if self.values.contains_key(key) {
            return Err(PipelineError::DuplicateKey(key.to_string()));
        }
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.values.get(key).and_then(Value::as_array)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}

/// Everything one pipeline run may read. Location and weather are fetched
/// at most once, on first use.
pub struct RequestContext {
    pub request_id: Uuid,
    pub profile: UserProfile,
    pub today: NaiveDate,
    pub outputs: StageOutput,
    location: OnceCell<Coordinates>,
    weather: OnceCell<WeatherOutcome>,
}

impl RequestContext {
    pub fn new(profile: UserProfile, today: NaiveDate) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            profile,
            today,
            outputs: StageOutput::new(),
            location: OnceCell::new(),
            weather: OnceCell::new(),
        }
    }

    /// Coordinates from a `"lat,lng"` location, else the geolocator.
    pub async fn coarse_location(&self, geolocator: &dyn Geolocator) -> Coordinates {
        *self
            .location
            .get_or_init(|| async {
                match Coordinates::parse_pair(&self.profile.raw_location) {
                    Some(coords) => coords,
                    None => geolocator.locate().await,
                }
            })
            .await
    }

    pub async fn weather(
        &self,
        service: &dyn WeatherService,
        geolocator: &dyn Geolocator,
    ) -> &WeatherOutcome {
        self.weather
            .get_or_init(|| async {
                let at = self.coarse_location(geolocator).await;
                service.current(at).await
            })
            .await
    }

    /// Weather fetched earlier in this run, if any.
    pub fn cached_weather(&self) -> Option<&WeatherOutcome> {
        self.weather.get()
    }

    /// Text appended to place searches: the raw location, else `"lat,lng"`.
    /// The "your city" placeholder counts as no location.
    pub async fn location_terms(&self, geolocator: &dyn Geolocator) -> String {
        let raw = self.profile.raw_location.trim();
        if raw.is_empty() || raw == DEFAULT_LOCATION {
            self.coarse_location(geolocator).await.to_string()
        } else {
            raw.to_string()
        }
    }
}
