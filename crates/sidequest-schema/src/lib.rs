use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub mod weather;

pub use weather::{WeatherOutcome, WeatherReport};

/// Location used when a request carries no location at all.
pub const DEFAULT_LOCATION: &str = "your city";

/// Interest list substituted when the user has none.
pub const GENERIC_INTERESTS: &[&str] = &["general"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Parse a `"lat,lng"` pair. Returns `None` for anything else, including
    /// out-of-range values.
    pub fn parse_pair(raw: &str) -> Option<Self> {
        let (lat, lng) = raw.split_once(',')?;
        let lat: f64 = lat.trim().parse().ok()?;
        let lng: f64 = lng.trim().parse().ok()?;
        let coords = Self { lat, lng };
        coords.is_valid().then_some(coords)
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

// ============================================================
// Request / profile
// ============================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestUser {
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub preference: Option<String>,
}

/// Inbound quest request, as accepted by the HTTP API and the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestRequest {
    pub user: RequestUser,
    #[serde(default)]
    pub quest_titles: Vec<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl QuestRequest {
    pub fn into_profile(self) -> UserProfile {
        let location = self.user.location.trim();
        UserProfile {
            interests: self
                .user
                .interests
                .into_iter()
                .map(|i| i.trim().to_string())
                .filter(|i| !i.is_empty())
                .collect(),
            completed_activity_titles: self
                .quest_titles
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            raw_location: if location.is_empty() {
                DEFAULT_LOCATION.to_string()
            } else {
                location.to_string()
            },
            preference: self.user.preference.filter(|p| !p.trim().is_empty()),
        }
    }
}

/// Everything the pipeline knows about the user. Immutable for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub interests: Vec<String>,
    pub completed_activity_titles: BTreeSet<String>,
    pub raw_location: String,
    #[serde(default)]
    pub preference: Option<String>,
}

impl UserProfile {
    /// Interests to summarize; an empty profile degrades to the generic one.
    pub fn effective_interests(&self) -> Vec<String> {
        if self.interests.is_empty() {
            GENERIC_INTERESTS.iter().map(|s| s.to_string()).collect()
        } else {
            self.interests.clone()
        }
    }

    pub fn has_completed(&self, title: &str) -> bool {
        let title = title.trim();
        self.completed_activity_titles
            .iter()
            .any(|done| done.trim().eq_ignore_ascii_case(title))
    }
}

// ============================================================
// Places
// ============================================================

/// A place resolved against the mapping provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceRecord {
    pub name: String,
    pub address: String,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u64>,
    #[serde(default)]
    pub types: Vec<String>,
    pub place_id: String,
    pub coordinates: Option<Coordinates>,
}

// ============================================================
// Quests
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Pending,
    Valid,
    Invalid,
}

/// The quest as produced by the pipeline, before place validation.
///
/// Deserialization never rejects an object: unknown fields land in `extra`
/// and ill-typed known fields fall back to their empty value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestCandidate {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address: String,
    #[serde(
        default,
        deserialize_with = "lenient_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub coordinates: Option<Coordinates>,
    #[serde(
        default,
        deserialize_with = "lenient_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub weather_ok: Option<bool>,
    #[serde(
        default,
        deserialize_with = "lenient_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub weather_summary: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub validation_status: Option<ValidationStatus>,
    #[serde(
        default,
        deserialize_with = "lenient_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub feedback_prompt: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QuestCandidate {
    pub fn from_object(object: Map<String, Value>) -> Self {
        match serde_json::from_value(Value::Object(object.clone())) {
            Ok(quest) => quest,
            Err(_) => Self {
                extra: object,
                ..Self::default()
            },
        }
    }

    pub fn has_location_name(&self) -> bool {
        !self.location_name.trim().is_empty()
    }
}

/// Keys owned by [`ValidatedQuest`]; stripped from a candidate's extra fields
/// so they are never emitted twice.
const VALIDATION_KEYS: &[&str] = &["validated", "location", "error"];

/// Terminal artifact: a quest plus the outcome of place validation.
///
/// Only [`ValidatedQuest::resolved`] and [`ValidatedQuest::unresolved`]
/// construct it, so `validated` is true exactly when `location` is set and
/// `error` is not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedQuest {
    #[serde(flatten)]
    quest: QuestCandidate,
    validated: bool,
    location: Option<PlaceRecord>,
    error: Option<String>,
}

impl ValidatedQuest {
    pub fn resolved(mut quest: QuestCandidate, place: PlaceRecord) -> Self {
        strip_validation_keys(&mut quest);
        if place.coordinates.is_some() {
            quest.coordinates = place.coordinates;
        }
        quest.validation_status = Some(ValidationStatus::Valid);
        Self {
            quest,
            validated: true,
            location: Some(place),
            error: None,
        }
    }

    pub fn unresolved(mut quest: QuestCandidate, error: impl Into<String>) -> Self {
        strip_validation_keys(&mut quest);
        quest.validation_status = Some(ValidationStatus::Invalid);
        Self {
            quest,
            validated: false,
            location: None,
            error: Some(error.into()),
        }
    }

    pub fn quest(&self) -> &QuestCandidate {
        &self.quest
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    pub fn location(&self) -> Option<&PlaceRecord> {
        self.location.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn strip_validation_keys(quest: &mut QuestCandidate) {
    for key in VALIDATION_KEYS {
        quest.extra.remove(*key);
    }
}

/// Output of the coordinator: either structured JSON or free text that may
/// still contain JSON behind formatting noise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawResult {
    Structured(Value),
    Text(String),
}

/// Suggestions are dated at most today; anything later is not doable now.
pub fn is_future_dated(date: &str, today: NaiveDate) -> bool {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map(|d| d > today)
        .unwrap_or(false)
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}
