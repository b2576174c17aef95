use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod request;

use request::{read_request, request_from_args};
use sidequest_core::{load_config, QuestOutcome, QuestService, SidequestConfig};
use sidequest_schema::QuestRequest;
use sidequest_server::state::AppState;

#[derive(Parser)]
#[command(name = "sidequest", version, about = "Weather-aware daily quest generator")]
struct Cli {
    #[arg(
        long,
        default_value = "~/.sidequest",
        help = "Config root directory (contains sidequest.yaml and logs/)"
    )]
    config_root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Generate one quest and print it as JSON")]
    Generate {
        #[arg(long, help = "Request JSON file, or - for stdin")]
        request: Option<PathBuf>,
        #[arg(long, value_delimiter = ',', help = "Comma-separated interests")]
        interests: Vec<String>,
        #[arg(long, default_value = "", help = "Free-text location or \"lat,lng\"")]
        location: String,
        #[arg(long = "completed", help = "Title of an already completed quest (repeatable)")]
        completed: Vec<String>,
        #[arg(long, help = "Indoor/outdoor preference hint")]
        preference: Option<String>,
    },
    #[command(about = "Start the HTTP API server")]
    Serve {
        #[arg(long, help = "Listen address (overrides server.addr)")]
        addr: Option<String>,
    },
    #[command(about = "Validate the config file")]
    ValidateConfig,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let mut cli = Cli::parse();

    // Expand ~ to home directory
    if cli.config_root.starts_with("~") {
        if let Some(home) = std::env::var_os("HOME") {
            cli.config_root = PathBuf::from(home).join(
                cli.config_root
                    .strip_prefix("~")
                    .unwrap_or(&cli.config_root),
            );
        }
    }

    let log_dir = cli.config_root.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "sidequest.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::ValidateConfig => {
            let config = load_config(&cli.config_root)?;
            print_config_summary(&config);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Serve { addr } => {
            let config = load_config(&cli.config_root)?;
            let addr = addr.unwrap_or_else(|| config.server.addr.clone());
            let service = QuestService::from_config(&config)?;
            sidequest_server::serve(AppState::new(service), &addr).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Generate {
            request,
            interests,
            location,
            completed,
            preference,
        } => {
            let prepared = prepare(&cli.config_root, request, || {
                request_from_args(interests, location, completed, preference)
            });
            match prepared {
                Ok((service, request)) => generate(&service, request).await,
                Err(err) => {
                    println!("{}", err.payload());
                    eprintln!("Error: {:#}", err.source);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

/// A `generate` failure before the pipeline starts.
struct SetupError {
    kind: &'static str,
    source: anyhow::Error,
}

impl SetupError {
    fn new(kind: &'static str, source: anyhow::Error) -> Self {
        Self { kind, source }
    }

    fn payload(&self) -> Value {
        json!({
            "error": format!("{:#}", self.source),
            "kind": self.kind,
        })
    }
}

fn prepare(
    config_root: &Path,
    request_path: Option<PathBuf>,
    from_args: impl FnOnce() -> QuestRequest,
) -> std::result::Result<(QuestService, QuestRequest), SetupError> {
    let request = match request_path {
        Some(path) => read_request(&path).map_err(|e| SetupError::new("request", e))?,
        None => from_args(),
    };
    let service = load_config(config_root)
        .and_then(|config| QuestService::from_config(&config))
        .map_err(|e| SetupError::new("config", e))?;
    Ok((service, request))
}

async fn generate(service: &QuestService, request: QuestRequest) -> Result<ExitCode> {
    match service.generate(request).await {
        Ok(QuestOutcome::Validated(value)) => {
            let text = serde_json::to_string_pretty(&value).context("failed to render quest")?;
            println!("{text}");
            Ok(ExitCode::SUCCESS)
        }
        Ok(QuestOutcome::Unstructured(text)) => {
            println!("{text}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let payload = json!({
                "error": err.to_string(),
                "kind": err.kind(),
                "stage": err.stage(),
            });
            println!("{payload}");
            eprintln!("Error: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_config_summary(config: &SidequestConfig) {
    println!(
        "Config valid. provider: {:?} ({}), key configured: {}, places configured: {}, search radius: {} m, server: {}",
        config.provider.connection.provider_type,
        config.provider.model,
        config.provider.connection.key_configured(),
        config.places.key_configured(),
        config.places.search_radius_m,
        config.server.addr,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unused_args() -> QuestRequest {
        panic!("flags should not be read when a request file is given")
    }

    #[test]
    fn unreadable_request_file_is_a_request_error() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("missing.json");

        let Err(err) = prepare(root.path(), Some(missing), unused_args) else {
            panic!("missing request file should fail");
        };
        assert_eq!(err.kind, "request");
        let payload = err.payload();
        assert_eq!(payload["kind"], "request");
        assert!(payload["error"]
            .as_str()
            .unwrap()
            .contains("failed to read request file"));
    }

    #[test]
    fn malformed_config_is_a_config_error() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("sidequest.yaml"), "provider: [unclosed").unwrap();
        let request_path = root.path().join("request.json");
        std::fs::write(&request_path, r#"{"user": {"interests": ["art"]}}"#).unwrap();

        let Err(err) = prepare(root.path(), Some(request_path), unused_args) else {
            panic!("malformed config should fail");
        };
        assert_eq!(err.payload()["kind"], "config");
        assert!(!err.payload()["error"].as_str().unwrap().is_empty());
    }

    #[test]
    fn missing_provider_key_is_a_config_error() {
        let config = SidequestConfig::default();
        let source = QuestService::from_config(&config).err().unwrap();
        let payload = SetupError::new("config", source).payload();
        assert_eq!(payload["kind"], "config");
        assert!(payload["error"]
            .as_str()
            .unwrap()
            .contains("failed to create text provider"));
    }
}
