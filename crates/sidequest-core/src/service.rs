//! Request-level facade: profile in, validated quest out.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use sidequest_provider::create_provider;
use sidequest_schema::{QuestRequest, RawResult, UserProfile};
use uuid::Uuid;

use crate::config::SidequestConfig;
use crate::error::PipelineError;
use crate::generator::LlmTextGenerator;
use crate::geolocation::IpGeolocator;
use crate::normalize::normalize;
use crate::pipeline::QuestPipeline;
use crate::places::PlaceLookupClient;
use crate::stages::StageDeps;
use crate::validator::QuestValidator;
use crate::weather::OpenMeteoClient;

#[derive(Debug, Clone, PartialEq)]
pub enum QuestOutcome {
    /// Validated quest JSON, envelope preserved.
    Validated(Value),
    /// Final text that could not be parsed as JSON.
    Unstructured(String),
}

impl QuestOutcome {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Validated(value) => value.clone(),
            Self::Unstructured(text) => serde_json::json!({ "raw": text }),
        }
    }
}

/// What is wired up, for health reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub provider: String,
    pub model: String,
    pub places_configured: bool,
    pub stages: Vec<&'static str>,
}

pub struct QuestService {
    pipeline: QuestPipeline,
    validator: QuestValidator,
    status: ServiceStatus,
}

impl QuestService {
    pub fn new(pipeline: QuestPipeline, validator: QuestValidator, status: ServiceStatus) -> Self {
        Self {
            pipeline,
            validator,
            status,
        }
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &SidequestConfig) -> Result<Self> {
        let provider = create_provider(&config.provider.connection)
            .context("failed to create text provider (set GEMINI_API_KEY or provider.api_key)")?;
        let generator = LlmTextGenerator::new(
            provider,
            config.provider.model.clone(),
            config.provider.max_tokens,
        );
        let places = PlaceLookupClient::from_config(&config.places);

        let deps = StageDeps {
            generator: Arc::new(generator),
            places: places.clone(),
            weather: Arc::new(OpenMeteoClient::from_config(&config.weather)),
            geolocator: Arc::new(IpGeolocator::from_config(&config.geolocation)),
            search_radius_m: config.places.search_radius_m,
        };
        let pipeline = QuestPipeline::new(deps);

        let status = ServiceStatus {
            provider: format!("{:?}", config.provider.connection.provider_type).to_lowercase(),
            model: config.provider.model.clone(),
            places_configured: places.is_available(),
            stages: pipeline.stage_names(),
        };

        Ok(Self::new(pipeline, QuestValidator::new(places), status))
    }

    pub fn status(&self) -> &ServiceStatus {
        &self.status
    }

    pub async fn generate(&self, request: QuestRequest) -> Result<QuestOutcome, PipelineError> {
        let user_id = request.user_id.clone();
        let profile = request.into_profile();
        tracing::info!(user_id = ?user_id, location = %profile.raw_location, "generating quest");
        self.generate_for(profile).await.map(|(_, outcome)| outcome)
    }

    /// Run the pipeline, normalize its result and validate the quest place.
    pub async fn generate_for(
        &self,
        profile: UserProfile,
    ) -> Result<(Uuid, QuestOutcome), PipelineError> {
        let run = self.pipeline.run(profile).await?;

        let outcome = match normalize(run.result) {
            RawResult::Structured(value) => {
                QuestOutcome::Validated(self.validator.validate_value(value).await)
            }
            RawResult::Text(text) => {
                tracing::warn!(request_id = %run.request_id, "final result is not JSON; returning raw text");
                QuestOutcome::Unstructured(text)
            }
        };

        tracing::info!(request_id = %run.request_id, "quest ready");
        Ok((run.request_id, outcome))
    }
}
