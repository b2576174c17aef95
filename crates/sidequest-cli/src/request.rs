use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use sidequest_schema::{QuestRequest, RequestUser};

/// Load a request JSON document from `path`, or from stdin when `path` is `-`.
pub fn read_request(path: &Path) -> Result<QuestRequest> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read request file: {}", path.display()))?
    };
    serde_json::from_str(&content).context("request is not a valid quest request")
}

pub fn request_from_args(
    interests: Vec<String>,
    location: String,
    completed: Vec<String>,
    preference: Option<String>,
) -> QuestRequest {
    QuestRequest {
        user: RequestUser {
            interests,
            location,
            preference,
        },
        quest_titles: completed,
        user_id: None,
    }
}
