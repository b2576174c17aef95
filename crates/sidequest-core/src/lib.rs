pub mod config;
pub mod context;
pub mod error;
pub mod generator;
pub mod geolocation;
pub mod normalize;
pub mod pipeline;
pub mod places;
pub mod prompts;
pub mod service;
pub mod stages;
pub mod validator;
pub mod weather;

pub use config::*;
pub use context::{RequestContext, StageOutput};
pub use error::PipelineError;
pub use generator::{LlmTextGenerator, TextGenerator, Variables};
pub use geolocation::{Geolocator, IpGeolocator, StaticGeolocator};
pub use normalize::{normalize, strip_code_fences};
pub use pipeline::{PipelineRun, QuestPipeline};
pub use places::{GooglePlacesApi, LocationBias, PlaceLookupClient, PlacesApi};
pub use service::{QuestOutcome, QuestService, ServiceStatus};
pub use stages::{Stage, StageDeps};
pub use validator::QuestValidator;
pub use weather::{OpenMeteoClient, WeatherService};
