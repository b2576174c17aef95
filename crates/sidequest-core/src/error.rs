use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage produced nothing; every later stage depends on it.
    #[error("pipeline stalled at stage '{stage}': {reason}")]
    Stall { stage: &'static str, reason: String },
    #[error("stage output key '{0}' was already written")]
    DuplicateKey(String),
}

impl PipelineError {
    pub fn stall(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::Stall {
            stage,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stall { .. } => "pipeline_stall",
            Self::DuplicateKey(_) => "duplicate_stage_key",
        }
    }

    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Self::Stall { stage, .. } => Some(stage),
            Self::DuplicateKey(_) => None,
        }
    }
}
