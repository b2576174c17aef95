use std::time::Instant;

use chrono::{Local, NaiveDate};
use serde_json::{Map, Value};
use sidequest_schema::{RawResult, UserProfile};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::PipelineError;
use crate::stages::{GroundStage, ReformatStage, Stage, StageDeps, SuggestStage, SummarizeStage};

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub request_id: Uuid,
    /// Last stage's output: `{output_key: value}` when structured, else the raw
    /// text the stage produced.
    pub result: RawResult,
    pub outputs: Map<String, Value>,
}

/// Fixed, strictly sequential stage sequence.
pub struct QuestPipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl QuestPipeline {
    /// Summarize, Suggest, Ground, Reformat.
    pub fn new(deps: StageDeps) -> Self {
        Self::from_stages(vec![
            Box::new(SummarizeStage::new(deps.clone())),
            Box::new(SuggestStage::new(deps.clone())),
            Box::new(GroundStage::new(deps.clone())),
            Box::new(ReformatStage::new(deps)),
        ])
    }

    pub fn from_stages(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, profile: UserProfile) -> Result<PipelineRun, PipelineError> {
        self.run_on(profile, Local::now().date_naive()).await
    }

    /// Run with an explicit "today", used for date filtering.
    pub async fn run_on(
        &self,
        profile: UserProfile,
        today: NaiveDate,
    ) -> Result<PipelineRun, PipelineError> {
        let mut ctx = RequestContext::new(profile, today);
        tracing::info!(request_id = %ctx.request_id, "pipeline started");

        let mut last: Option<(&'static str, Value)> = None;
        for stage in &self.stages {
            let started = Instant::now();
            let output = match stage.run(&ctx).await {
                Ok(Some(value)) => value,
                Ok(None) => {
                    tracing::error!(request_id = %ctx.request_id, stage = stage.name(), "stage produced no output");
                    return Err(PipelineError::stall(stage.name(), "stage produced no output"));
                }
                Err(e) => {
                    tracing::error!(request_id = %ctx.request_id, stage = stage.name(), "stage failed: {e:#}");
                    return Err(PipelineError::stall(stage.name(), format!("{e:#}")));
                }
            };

            tracing::info!(
                request_id = %ctx.request_id,
                stage = stage.name(),
                key = stage.output_key(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "stage finished"
            );
            tracing::debug!(stage = stage.name(), output = %output, "stage output");

            ctx.outputs.insert(stage.output_key(), output.clone())?;
            last = Some((stage.output_key(), output));
        }

        let result = match last {
            Some((_, Value::String(text))) => RawResult::Text(text),
            Some((key, value)) => {
                let mut wrapped = Map::new();
                wrapped.insert(key.to_string(), value);
                RawResult::Structured(Value::Object(wrapped))
            }
            None => return Err(PipelineError::stall("pipeline", "no stages configured")),
        };

        Ok(PipelineRun {
            request_id: ctx.request_id,
            result,
            outputs: ctx.outputs.into_map(),
        })
    }
}
