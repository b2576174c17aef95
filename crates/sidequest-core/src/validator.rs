//! Place validation for finished quests.

use serde_json::{Map, Value};
use sidequest_schema::{QuestCandidate, ValidatedQuest, DEFAULT_LOCATION};

use crate::places::PlaceLookupClient;

/// Wrapper keys a generator may put around the quest object.
pub const ENVELOPE_KEYS: &[&str] = &["final_quest", "finalQuest", "quest"];

pub struct QuestValidator {
    places: PlaceLookupClient,
}

impl QuestValidator {
    pub fn new(places: PlaceLookupClient) -> Self {
        Self { places }
    }

    /// Resolve the quest's `locationName` near its `address`. Never fails: an
    /// unresolved place is reported on the returned quest.
    pub async fn validate(&self, quest: QuestCandidate) -> ValidatedQuest {
        if !quest.has_location_name() {
            return ValidatedQuest::unresolved(quest, "No locationName provided");
        }

        let name = quest.location_name.trim().to_string();
        let rough = match quest.address.trim() {
            DEFAULT_LOCATION => "",
            other => other,
        }
        .to_string();
        match self.places.resolve(&name, &rough).await {
            Some(place) => ValidatedQuest::resolved(quest, place),
            None => ValidatedQuest::unresolved(quest, format!("Could not find address for '{name}'")),
        }
    }

    /// Validate a raw JSON value, looking through envelope keys. The envelope
    /// and any sibling keys are put back around the validated quest. Values
    /// that are not objects come back unchanged.
    pub async fn validate_value(&self, value: Value) -> Value {
        let Value::Object(outer) = value else {
            return value;
        };

        let mut layers: Vec<(Map<String, Value>, String)> = Vec::new();
        let mut current = outer;
        while let Some(key) = envelope_key(&current) {
            let Some(Value::Object(inner)) = current.remove(&key) else {
                break;
            };
            layers.push((current, key));
            current = inner;
        }

        let validated = self
            .validate(QuestCandidate::from_object(current))
            .await
            .to_value();

        layers
            .into_iter()
            .rev()
            .fold(validated, |inner, (mut outer, key)| {
                outer.insert(key, inner);
                Value::Object(outer)
            })
    }
}

/// Envelope key to unwrap, if `object` is an envelope rather than a quest.
fn envelope_key(object: &Map<String, Value>) -> Option<String> {
    if object.contains_key("locationName") {
        return None;
    }
    ENVELOPE_KEYS
        .iter()
        .find(|key| matches!(object.get(**key), Some(Value::Object(_))))
        .map(|key| key.to_string())
}
