//! The four pipeline stages.
//!
//! Each stage reads the request context plus earlier stage outputs and returns
//! the value to store under its output key. `Ok(None)` means the stage had
//! nothing to offer; the coordinator treats that as a stall.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sidequest_schema::{
    is_future_dated, QuestCandidate, RawResult, UserProfile, ValidationStatus, WeatherOutcome,
};

use crate::context::RequestContext;
use crate::generator::{TextGenerator, Variables};
use crate::geolocation::Geolocator;
use crate::normalize::normalize;
use crate::places::{LocationBias, PlaceLookupClient};
use crate::prompts;
use crate::weather::WeatherService;

pub const USER_SUMMARY: &str = "user_summary";
pub const WEATHER_SUGGESTIONS: &str = "weather_suggestions";
pub const SEARCH_RESULTS: &str = "search_results";
pub const FINAL_QUEST: &str = "final_quest";

const METERS_PER_MILE: f64 = 1609.344;

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn output_key(&self) -> &'static str;

    async fn run(&self, ctx: &RequestContext) -> Result<Option<Value>>;
}

/// Collaborators shared by the stages of one pipeline.
#[derive(Clone)]
pub struct StageDeps {
    pub generator: Arc<dyn TextGenerator>,
    pub places: PlaceLookupClient,
    pub weather: Arc<dyn WeatherService>,
    pub geolocator: Arc<dyn Geolocator>,
    pub search_radius_m: u32,
}

// ============================================================
// Summarize
// ============================================================

pub struct SummarizeStage {
    deps: StageDeps,
}

impl SummarizeStage {
    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Stage for SummarizeStage {
    fn name(&self) -> &'static str {
        "summarize"
    }

    fn output_key(&self) -> &'static str {
        USER_SUMMARY
    }

    async fn run(&self, ctx: &RequestContext) -> Result<Option<Value>> {
        let mut variables = Variables::new();
        variables.insert("interests".into(), json!(ctx.profile.effective_interests()));
        variables.insert("past_events".into(), past_events(&ctx.profile));

        generate_keyed(
            self.deps.generator.as_ref(),
            prompts::SUMMARIZER,
            &variables,
            USER_SUMMARY,
        )
        .await
    }
}

// ============================================================
// Suggest
// ============================================================

pub struct SuggestStage {
    deps: StageDeps,
}

impl SuggestStage {
    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Stage for SuggestStage {
    fn name(&self) -> &'static str {
        "suggest"
    }

    fn output_key(&self) -> &'static str {
        WEATHER_SUGGESTIONS
    }

    async fn run(&self, ctx: &RequestContext) -> Result<Option<Value>> {
        let weather = ctx
            .weather(self.deps.weather.as_ref(), self.deps.geolocator.as_ref())
            .await;

        let mut variables = Variables::new();
        variables.insert(
            USER_SUMMARY.into(),
            Value::String(ctx.outputs.get(USER_SUMMARY).map(text_of).unwrap_or_default()),
        );
        variables.insert("weather_report".into(), Value::String(weather.describe()));
        variables.insert(
            "today".into(),
            Value::String(ctx.today.format("%Y-%m-%d").to_string()),
        );
        variables.insert(
            "preference".into(),
            Value::String(
                ctx.profile
                    .preference
                    .clone()
                    .unwrap_or_else(|| "no preference".to_string()),
            ),
        );
        variables.insert("past_events".into(), past_events(&ctx.profile));

        let output = generate_keyed(
            self.deps.generator.as_ref(),
            prompts::SUGGESTER,
            &variables,
            WEATHER_SUGGESTIONS,
        )
        .await?;

        Ok(match output {
            Some(Value::Array(items)) => {
                let total = items.len();
                let kept = filter_suggestions(items, ctx, weather.allows_outdoor());
                tracing::info!(
                    request_id = %ctx.request_id,
                    total,
                    kept = kept.len(),
                    "suggestions filtered"
                );
                if kept.is_empty() {
                    None
                } else {
                    Some(Value::Array(kept))
                }
            }
            other => other,
        })
    }
}

/// Drop completed and future-dated suggestions. When the weather rules out
/// outdoor activities, indoor ones move to the front; order is otherwise kept.
fn filter_suggestions(items: Vec<Value>, ctx: &RequestContext, allows_outdoor: bool) -> Vec<Value> {
    let mut kept: Vec<Value> = items
        .into_iter()
        .filter(|item| {
            if let Some(title) = str_field(item, &["title"]) {
                if ctx.profile.has_completed(title) {
                    tracing::debug!(title, "dropping already completed suggestion");
                    return false;
                }
            }
            if let Some(date) = str_field(item, &["date"]) {
                if is_future_dated(date, ctx.today) {
                    tracing::debug!(date, "dropping future-dated suggestion");
                    return false;
                }
            }
            true
        })
        .collect();

    if !allows_outdoor {
        kept.sort_by_key(is_outdoor);
    }
    kept
}

// ============================================================
// Ground
// ============================================================

pub struct GroundStage {
    deps: StageDeps,
}

impl GroundStage {
    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }

    fn radius_miles(&self) -> u64 {
        (f64::from(self.deps.search_radius_m) / METERS_PER_MILE).round() as u64
    }

    async fn search_places(
        &self,
        suggestions: &[Value],
        terms: &str,
        bias: LocationBias,
    ) -> Vec<Value> {
        let mut results = Vec::new();
        for item in suggestions {
            let Some(title) = str_field(item, &["title"]) else {
                continue;
            };
            let query = format!("{title} {terms}");
            let Some(place) = self.deps.places.find_nearby(query.trim(), bias).await else {
                continue;
            };
            results.push(json!({
                "title": title,
                "placeName": place.name,
                "address": place.address,
                "description": str_field(item, &["description"]).unwrap_or_default(),
                "isOutdoor": is_outdoor(item),
            }));
        }
        results
    }
}

#[async_trait]
impl Stage for GroundStage {
    fn name(&self) -> &'static str {
        "ground"
    }

    fn output_key(&self) -> &'static str {
        SEARCH_RESULTS
    }

    async fn run(&self, ctx: &RequestContext) -> Result<Option<Value>> {
        let geolocator = self.deps.geolocator.as_ref();
        let coords = ctx.coarse_location(geolocator).await;
        let terms = ctx.location_terms(geolocator).await;
        let suggestions = ctx.outputs.get(WEATHER_SUGGESTIONS);

        if let (Some(items), true) = (
            ctx.outputs.get_array(WEATHER_SUGGESTIONS),
            self.deps.places.is_available(),
        ) {
            let bias = LocationBias {
                center: coords,
                radius_m: self.deps.search_radius_m,
            };
            let results = self.search_places(items, &terms, bias).await;
            if !results.is_empty() {
                return Ok(Some(Value::Array(results)));
            }
            tracing::info!(
                request_id = %ctx.request_id,
                "place search grounded nothing; falling back to the generator"
            );
        }

        let mut variables = Variables::new();
        variables.insert(
            WEATHER_SUGGESTIONS.into(),
            suggestions.cloned().unwrap_or(Value::Null),
        );
        variables.insert("location".into(), Value::String(terms));
        variables.insert("coordinates".into(), Value::String(coords.to_string()));
        variables.insert("radius_miles".into(), json!(self.radius_miles()));
        variables.insert("past_events".into(), past_events(&ctx.profile));

        let output = generate_keyed(
            self.deps.generator.as_ref(),
            prompts::SEARCHER,
            &variables,
            SEARCH_RESULTS,
        )
        .await?;

        Ok(match output {
            Some(Value::Array(items)) => {
                let kept: Vec<Value> = items
                    .into_iter()
                    .filter(|item| {
                        !str_field(item, &["title"])
                            .is_some_and(|title| ctx.profile.has_completed(title))
                    })
                    .collect();
                if kept.is_empty() {
                    None
                } else {
                    Some(Value::Array(kept))
                }
            }
            other => other,
        })
    }
}

// ============================================================
// Reformat
// ============================================================

pub struct ReformatStage {
    deps: StageDeps,
}

impl ReformatStage {
    pub fn new(deps: StageDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Stage for ReformatStage {
    fn name(&self) -> &'static str {
        "reformat"
    }

    fn output_key(&self) -> &'static str {
        FINAL_QUEST
    }

    async fn run(&self, ctx: &RequestContext) -> Result<Option<Value>> {
        match ctx.outputs.get(SEARCH_RESULTS) {
            Some(Value::Array(items)) => {
                let Some(first) = items.first() else {
                    return Ok(None);
                };
                let quest = build_final_quest(first, ctx.cached_weather());
                Ok(Some(serde_json::to_value(quest)?))
            }
            other => {
                let mut variables = Variables::new();
                variables.insert(SEARCH_RESULTS.into(), other.cloned().unwrap_or(Value::Null));
                let text = self
                    .deps
                    .generator
                    .generate(prompts::REFORMATTER, &variables)
                    .await?;
                if text.trim().is_empty() {
                    return Ok(None);
                }
                Ok(Some(Value::String(text)))
            }
        }
    }
}

fn build_final_quest(entry: &Value, weather: Option<&WeatherOutcome>) -> QuestCandidate {
    let outdoor = is_outdoor(entry);
    let allows_outdoor = weather.map_or(true, WeatherOutcome::allows_outdoor);
    let title = str_field(entry, &["title"]).unwrap_or_default().to_string();

    let mut extra = Map::new();
    extra.insert("isOutdoor".into(), Value::Bool(outdoor));

    QuestCandidate {
        description: str_field(entry, &["description"])
            .unwrap_or_default()
            .to_string(),
        location_name: str_field(entry, &["placeName", "place_name", "locationName", "name"])
            .unwrap_or_default()
            .to_string(),
        address: str_field(entry, &["address"]).unwrap_or_default().to_string(),
        coordinates: None,
        weather_ok: Some(!(outdoor && !allows_outdoor)),
        weather_summary: Some(
            weather
                .map(WeatherOutcome::describe)
                .unwrap_or_else(|| "weather unavailable: not fetched".to_string()),
        ),
        validation_status: Some(ValidationStatus::Pending),
        feedback_prompt: Some(feedback_prompt(&title)),
        title,
        extra,
    }
}

fn feedback_prompt(title: &str) -> String {
    if title.is_empty() {
        "How did this quest go? Tell us what you enjoyed and what you would change.".to_string()
    } else {
        format!("How did \"{title}\" go? Tell us what you enjoyed and what you would change.")
    }
}

// ============================================================
// Helpers
// ============================================================

/// Run the generator and unwrap `{key: value}` when the output is JSON.
/// Non-JSON text is kept as a string; empty text counts as no output.
async fn generate_keyed(
    generator: &dyn TextGenerator,
    instruction: &str,
    variables: &Variables,
    key: &str,
) -> Result<Option<Value>> {
    let text = generator.generate(instruction, variables).await?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    match normalize(RawResult::Text(text)) {
        RawResult::Structured(value) => Ok(Some(unwrap_key(value, key))),
        RawResult::Text(text) => {
            tracing::warn!(key, "generator output is not JSON; storing raw text");
            Ok(Some(Value::String(text)))
        }
    }
}

fn unwrap_key(value: Value, key: &str) -> Value {
    match value {
        Value::Object(mut map) => match map.remove(key) {
            Some(inner) => inner,
            None => Value::Object(map),
        },
        other => other,
    }
}

fn past_events(profile: &UserProfile) -> Value {
    Value::Array(
        profile
            .completed_activity_titles
            .iter()
            .cloned()
            .map(Value::String)
            .collect(),
    )
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// First non-empty string among `keys`.
fn str_field<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| item.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn is_outdoor(item: &Value) -> bool {
    ["isOutdoor", "is_outdoor", "outdoor"]
        .iter()
        .find_map(|key| item.get(*key))
        .is_some_and(|value| match value {
            Value::Bool(b) => *b,
            Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
            _ => false,
        })
}
