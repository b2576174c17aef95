use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};
use sidequest_core::*;
use sidequest_schema::{Coordinates, QuestRequest, WeatherOutcome, WeatherReport};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Answers each instruction with a canned completion and records the
/// variables it was called with.
#[derive(Default)]
struct ScriptedGenerator {
    replies: HashMap<&'static str, String>,
    calls: Mutex<Vec<(&'static str, Variables)>>,
}

impl ScriptedGenerator {
    fn reply(mut self, instruction: &'static str, text: impl Into<String>) -> Self {
        self.replies.insert(instruction, text.into());
        self
    }

    fn variables_for(&self, instruction: &str) -> Option<Variables> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(i, _)| *i == instruction)
            .map(|(_, v)| v.clone())
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, instruction: &str, variables: &Variables) -> Result<String> {
        let (key, reply) = self
            .replies
            .get_key_value(instruction)
            .ok_or_else(|| anyhow!("no scripted reply for instruction"))?;
        self.calls.lock().unwrap().push((*key, variables.clone()));
        Ok(reply.clone())
    }
}

struct FixedWeather(WeatherOutcome);

#[async_trait]
impl WeatherService for FixedWeather {
    async fn current(&self, _at: Coordinates) -> WeatherOutcome {
        self.0.clone()
    }
}

const PHILLY: Coordinates = Coordinates {
    lat: 39.95,
    lng: -75.16,
};

fn clear_weather() -> WeatherOutcome {
    WeatherOutcome::Success {
        report: WeatherReport {
            coordinates: PHILLY,
            temperature_c: Some(21.0),
            precipitation_mm: Some(0.0),
            weather_code: Some(0),
        },
    }
}

fn service(generator: Arc<ScriptedGenerator>, places: PlaceLookupClient, weather: WeatherOutcome) -> QuestService {
    let deps = StageDeps {
        generator,
        places: places.clone(),
        weather: Arc::new(FixedWeather(weather)),
        geolocator: Arc::new(StaticGeolocator(PHILLY)),
        search_radius_m: DEFAULT_SEARCH_RADIUS_M,
    };
    let pipeline = QuestPipeline::new(deps);
    let status = ServiceStatus {
        provider: "scripted".into(),
        model: "none".into(),
        places_configured: places.is_available(),
        stages: pipeline.stage_names(),
    };
    QuestService::new(pipeline, QuestValidator::new(places), status)
}

fn request(interests: &[&str], completed: &[&str]) -> QuestRequest {
    request_at("Philadelphia, PA", interests, completed)
}

fn request_at(location: &str, interests: &[&str], completed: &[&str]) -> QuestRequest {
    serde_json::from_value(json!({
        "user": {"interests": interests, "location": location},
        "questTitles": completed,
        "userId": "user-1"
    }))
    .unwrap()
}

fn place_hit(place_id: &str, name: &str, address: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": "OK",
        "results": [{
            "place_id": place_id,
            "name": name,
            "formatted_address": address,
            "geometry": {"location": {"lat": 39.96, "lng": -75.17}}
        }]
    }))
}

fn validated(outcome: QuestOutcome) -> Value {
    match outcome {
        QuestOutcome::Validated(value) => value,
        QuestOutcome::Unstructured(text) => panic!("expected structured quest, got {text}"),
    }
}

#[tokio::test]
async fn completed_activity_is_excluded_and_clear_weather_keeps_outdoor_quest() {
    let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/textsearch/json"))
        .and(query_param("query", "Visit the Modern Art Museum Philadelphia, PA"))
        .respond_with(place_hit("p-mam", "Modern Art Museum", "1 Art Way, Philadelphia, PA"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/textsearch/json"))
        .and(query_param("query", "Sculpture garden walk Philadelphia, PA"))
        .and(query_param("radius", "80467"))
        .respond_with(place_hit("p-sg", "Sculpture Garden", "1 Garden Way, Philadelphia, PA"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/textsearch/json"))
        .and(query_param("query", "Sculpture Garden 1 Garden Way, Philadelphia, PA"))
        .respond_with(place_hit("p-sg", "Sculpture Garden", "1 Garden Way, Philadelphia, PA"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/details/json"))
        .and(query_param("place_id", "p-sg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "result": {
                "name": "Sculpture Garden",
                "formatted_address": "1 Garden Way, Philadelphia, PA 19130",
                "rating": 4.7,
                "user_ratings_total": 530,
                "types": ["park"],
                "geometry": {"location": {"lat": 39.965, "lng": -75.18}}
            }
        })))
        .mount(&server)
        .await;

    let suggestions = json!({
        "weather_suggestions": [
            {"title": "Visit the Modern Art Museum", "description": "Modern art", "isOutdoor": false, "date": today},
            {"title": "Sculpture garden walk", "description": "Art outdoors", "isOutdoor": true, "date": today}
        ]
    });
    let generator = Arc::new(
        ScriptedGenerator::default()
            .reply(prompts::SUMMARIZER, r#"{"user_summary": "Loves art and food."}"#)
            .reply(prompts::SUGGESTER, format!("```json\n{suggestions}\n```")),
    );
    let places = PlaceLookupClient::new(Arc::new(GooglePlacesApi::new(
        "maps-key",
        server.uri(),
        Duration::from_secs(2),
    )));
    let service = service(generator.clone(), places, clear_weather());

    let out = validated(
        service
            .generate(request(&["art", "food"], &["Visit the Modern Art Museum"]))
            .await
            .unwrap(),
    );

    let quest = &out["final_quest"];
    assert_eq!(quest["title"], "Sculpture garden walk");
    assert_eq!(quest["locationName"], "Sculpture Garden");
    assert_eq!(quest["weatherOk"], json!(true));
    assert_eq!(quest["validated"], json!(true));
    assert_eq!(quest["error"], Value::Null);
    assert_eq!(quest["validationStatus"], "valid");
    assert_eq!(quest["location"]["rating"], json!(4.7));
    assert_eq!(quest["coordinates"]["lat"], json!(39.965));
    assert!(quest["feedbackPrompt"].as_str().unwrap().contains("Sculpture garden walk"));

    let summarize_vars = generator.variables_for(prompts::SUMMARIZER).unwrap();
    assert_eq!(summarize_vars["interests"], json!(["art", "food"]));
    assert_eq!(summarize_vars["past_events"], json!(["Visit the Modern Art Museum"]));
    let suggest_vars = generator.variables_for(prompts::SUGGESTER).unwrap();
    assert_eq!(suggest_vars["user_summary"], "Loves art and food.");
    assert_eq!(suggest_vars["today"], json!(today));
    // places answered, so neither fallback instruction ran
    assert_eq!(generator.call_count(), 2);
}

#[tokio::test]
async fn weather_failure_is_marked_and_pipeline_continues() {
    let generator = Arc::new(
        ScriptedGenerator::default()
            .reply(prompts::SUMMARIZER, r#"{"user_summary": "Enjoys food."}"#)
            .reply(
                prompts::SUGGESTER,
                r#"{"weather_suggestions": [{"title": "Cooking class", "description": "Learn pasta", "isOutdoor": false}]}"#,
            )
            .reply(
                prompts::SEARCHER,
                r#"{"search_results": [{"title": "Cooking class", "placeName": "Pasta Lab", "address": "3 Flour St, Philadelphia, PA", "description": "Hands-on pasta", "isOutdoor": false}]}"#,
            ),
    );
    let weather = WeatherOutcome::Error {
        error_message: "Could not fetch weather for (39.95, -75.16): timed out".into(),
    };
    let service = service(generator.clone(), PlaceLookupClient::unavailable(), weather);

    let out = validated(service.generate(request(&["food"], &[])).await.unwrap());

    let suggest_vars = generator.variables_for(prompts::SUGGESTER).unwrap();
    assert!(suggest_vars["weather_report"]
        .as_str()
        .unwrap()
        .starts_with("weather unavailable"));

    let search_vars = generator.variables_for(prompts::SEARCHER).unwrap();
    assert_eq!(search_vars["location"], "Philadelphia, PA");
    assert_eq!(search_vars["coordinates"], "39.95,-75.16");
    assert_eq!(search_vars["radius_miles"], json!(50));

    let quest = &out["final_quest"];
    assert_eq!(quest["locationName"], "Pasta Lab");
    assert_eq!(quest["weatherOk"], json!(true));
    assert!(quest["weatherSummary"]
        .as_str()
        .unwrap()
        .starts_with("weather unavailable"));
    assert_eq!(quest["validated"], json!(false));
    assert_eq!(quest["location"], Value::Null);
    assert_eq!(quest["error"], "Could not find address for 'Pasta Lab'");
}

#[tokio::test]
async fn empty_stage_output_stalls_the_request() {
    let generator = Arc::new(ScriptedGenerator::default().reply(prompts::SUMMARIZER, "   "));
    let service = service(generator, PlaceLookupClient::unavailable(), clear_weather());

    let err = service.generate(request(&[], &[])).await.unwrap_err();
    assert_eq!(err.kind(), "pipeline_stall");
    assert_eq!(err.stage(), Some("summarize"));
}

#[tokio::test]
async fn generator_failure_stalls_at_that_stage() {
    // no SUGGESTER reply scripted: the generator errors
    let generator = Arc::new(
        ScriptedGenerator::default().reply(prompts::SUMMARIZER, r#"{"user_summary": "x"}"#),
    );
    let service = service(generator, PlaceLookupClient::unavailable(), clear_weather());

    let err = service.generate(request(&["art"], &[])).await.unwrap_err();
    assert_eq!(err.stage(), Some("suggest"));
}

#[tokio::test]
async fn unparseable_final_text_is_returned_raw() {
    let generator = Arc::new(
        ScriptedGenerator::default()
            .reply(prompts::SUMMARIZER, "Likes walking around town.")
            .reply(prompts::SUGGESTER, "Walk around town today.")
            .reply(prompts::SEARCHER, "I could not look anything up.")
            .reply(prompts::REFORMATTER, "Go for a walk downtown!"),
    );
    let service = service(generator.clone(), PlaceLookupClient::unavailable(), clear_weather());

    let outcome = service.generate(request(&["walking"], &[])).await.unwrap();
    assert_eq!(
        outcome,
        QuestOutcome::Unstructured("Go for a walk downtown!".into())
    );
    assert_eq!(outcome.to_json(), json!({"raw": "Go for a walk downtown!"}));

    // raw text from earlier stages is passed along untouched
    let suggest_vars = generator.variables_for(prompts::SUGGESTER).unwrap();
    assert_eq!(suggest_vars["user_summary"], "Likes walking around town.");
    let reformat_vars = generator.variables_for(prompts::REFORMATTER).unwrap();
    assert_eq!(reformat_vars["search_results"], "I could not look anything up.");
}

#[tokio::test]
async fn fenced_final_quest_envelope_is_validated_and_rewrapped() {
    let generator = Arc::new(
        ScriptedGenerator::default()
            .reply(prompts::SUMMARIZER, r#"{"user_summary": "Likes tea."}"#)
            .reply(prompts::SUGGESTER, r#"{"weather_suggestions": "tea somewhere"}"#)
            .reply(prompts::SEARCHER, "no structured results")
            .reply(
                prompts::REFORMATTER,
                "```json\n{\"finalQuest\": {\"title\": \"Tea time\", \"description\": \"Try oolong\", \"locationName\": \"\", \"address\": \"\"}}\n```",
            ),
    );
    let service = service(generator, PlaceLookupClient::unavailable(), clear_weather());

    let out = validated(service.generate(request(&["tea"], &[])).await.unwrap());
    let quest = &out["finalQuest"];
    assert_eq!(quest["title"], "Tea time");
    assert_eq!(quest["validated"], json!(false));
    assert_eq!(quest["location"], Value::Null);
    assert_eq!(quest["error"], "No locationName provided");
}

#[tokio::test]
async fn missing_location_searches_near_coarse_coordinates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/textsearch/json"))
        .and(query_param("query", "Art museum 39.95,-75.16"))
        .and(query_param("location", "39.95,-75.16"))
        .respond_with(place_hit("p-barnes", "Barnes Foundation", "2025 Benjamin Franklin Pkwy, Philadelphia, PA"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/textsearch/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ZERO_RESULTS",
            "results": []
        })))
        .with_priority(10)
        .mount(&server)
        .await;

    let generator = Arc::new(
        ScriptedGenerator::default()
            .reply(prompts::SUMMARIZER, r#"{"user_summary": "Loves art."}"#)
            .reply(
                prompts::SUGGESTER,
                r#"{"weather_suggestions": [{"title": "Art museum", "description": "Paintings", "isOutdoor": false}]}"#,
            ),
    );
    let places = PlaceLookupClient::new(Arc::new(GooglePlacesApi::new(
        "maps-key",
        server.uri(),
        Duration::from_secs(2),
    )));
    let service = service(generator, places, clear_weather());

    let out = validated(service.generate(request_at("", &["art"], &[])).await.unwrap());
    assert_eq!(out["final_quest"]["locationName"], "Barnes Foundation");
}

#[tokio::test]
async fn missing_location_sends_coordinates_to_searcher() {
    let generator = Arc::new(
        ScriptedGenerator::default()
            .reply(prompts::SUMMARIZER, r#"{"user_summary": "Loves art."}"#)
            .reply(
                prompts::SUGGESTER,
                r#"{"weather_suggestions": [{"title": "Art museum", "isOutdoor": false}]}"#,
            )
            .reply(
                prompts::SEARCHER,
                r#"{"search_results": [{"title": "Art museum", "placeName": "Barnes Foundation", "address": "", "description": "", "isOutdoor": false}]}"#,
            ),
    );
    let service = service(generator.clone(), PlaceLookupClient::unavailable(), clear_weather());

    service.generate(request_at("  ", &["art"], &[])).await.unwrap();

    let search_vars = generator.variables_for(prompts::SEARCHER).unwrap();
    assert_eq!(search_vars["location"], "39.95,-75.16");
    assert_ne!(search_vars["location"], sidequest_schema::DEFAULT_LOCATION);
}

#[tokio::test]
async fn ground_with_only_completed_results_stalls_at_ground() {
    let generator = Arc::new(
        ScriptedGenerator::default()
            .reply(prompts::SUMMARIZER, r#"{"user_summary": "Loves art."}"#)
            .reply(
                prompts::SUGGESTER,
                r#"{"weather_suggestions": [{"title": "Gallery crawl", "isOutdoor": false}]}"#,
            )
            .reply(
                prompts::SEARCHER,
                r#"{"search_results": [{"title": "Visit the Modern Art Museum", "placeName": "Modern Art Museum"}]}"#,
            ),
    );
    let service = service(generator, PlaceLookupClient::unavailable(), clear_weather());

    let err = service
        .generate(request(&["art"], &["Visit the Modern Art Museum"]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "pipeline_stall");
    assert_eq!(err.stage(), Some("ground"));
}
