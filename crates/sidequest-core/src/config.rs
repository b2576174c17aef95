use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sidequest_provider::ProviderConfig;
use sidequest_schema::Coordinates;

pub const CONFIG_FILE_NAME: &str = "sidequest.yaml";

/// 50 miles.
pub const DEFAULT_SEARCH_RADIUS_M: u32 = 80_467;

const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";
const MAPS_KEY_ENVS: &[&str] = &["GOOGLE_MAPS_API_KEY", "NEXT_PUBLIC_GOOGLE_MAPS_API_KEY"];

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_places_base_url() -> String {
    "https://maps.googleapis.com/maps/api/place".to_string()
}

fn default_weather_base_url() -> String {
    "https://api.open-meteo.com".to_string()
}

fn default_geolocation_url() -> String {
    "https://ipinfo.io/json".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_search_radius_m() -> u32 {
    DEFAULT_SEARCH_RADIUS_M
}

fn default_fallback_lat() -> f64 {
    52.52
}

fn default_fallback_lng() -> f64 {
    13.41
}

fn default_server_addr() -> String {
    "127.0.0.1:3000".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextProviderConfig {
    #[serde(flatten)]
    pub connection: ProviderConfig,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for TextProviderConfig {
    fn default() -> Self {
        Self {
            connection: ProviderConfig::default(),
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacesConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_places_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_search_radius_m")]
    pub search_radius_m: u32,
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_places_base_url(),
            timeout_secs: default_timeout_secs(),
            search_radius_m: default_search_radius_m(),
        }
    }
}

impl PlacesConfig {
    pub fn key_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeolocationConfig {
    #[serde(default = "default_geolocation_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_fallback_lat")]
    pub fallback_lat: f64,
    #[serde(default = "default_fallback_lng")]
    pub fallback_lng: f64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            url: default_geolocation_url(),
            timeout_secs: default_timeout_secs(),
            fallback_lat: default_fallback_lat(),
            fallback_lng: default_fallback_lng(),
        }
    }
}

impl GeolocationConfig {
    pub fn fallback(&self) -> Coordinates {
        Coordinates::new(self.fallback_lat, self.fallback_lng)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SidequestConfig {
    #[serde(default)]
    pub provider: TextProviderConfig,
    #[serde(default)]
    pub places: PlacesConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub geolocation: GeolocationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + 2..];
        let Some(end) = candidate.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &candidate[..end];
        output.push_str(&std::env::var(key).unwrap_or_default());
        rest = &candidate[end + 1..];
    }

    output.push_str(rest);
    output
}

/// Load `<root>/sidequest.yaml`, falling back to defaults when the file does
/// not exist, then apply `${VAR}` interpolation and environment fallbacks.
pub fn load_config(root: &Path) -> Result<SidequestConfig> {
    let path = root.join(CONFIG_FILE_NAME);
    let mut config = if path.is_file() {
        read_yaml_file::<SidequestConfig>(&path)?
    } else {
        tracing::debug!("no config file at {}, using defaults", path.display());
        SidequestConfig::default()
    };

    resolve_config_env(&mut config);
    apply_env_fallbacks(&mut config, |key| std::env::var(key).ok());
    validate_config(&config)?;
    Ok(config)
}

fn resolve_optional(value: &mut Option<String>) {
    if let Some(raw) = value.as_mut() {
        *raw = resolve_env_var(raw);
    }
    if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
        *value = None;
    }
}

fn resolve_config_env(config: &mut SidequestConfig) {
    resolve_optional(&mut config.provider.connection.api_key);
    resolve_optional(&mut config.provider.connection.base_url);
    config.provider.model = resolve_env_var(&config.provider.model);
    resolve_optional(&mut config.places.api_key);
    config.places.base_url = resolve_env_var(&config.places.base_url);
    config.weather.base_url = resolve_env_var(&config.weather.base_url);
    config.geolocation.url = resolve_env_var(&config.geolocation.url);
    config.server.addr = resolve_env_var(&config.server.addr);
}

/// Fill credentials the file left empty from well-known environment variables.
pub fn apply_env_fallbacks(config: &mut SidequestConfig, lookup: impl Fn(&str) -> Option<String>) {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if !config.provider.connection.key_configured() {
        config.provider.connection.api_key = non_empty(GEMINI_KEY_ENV);
    }
    if !config.places.key_configured() {
        config.places.api_key = MAPS_KEY_ENVS.iter().find_map(|key| non_empty(*key));
    }
}

pub fn validate_config(config: &SidequestConfig) -> Result<()> {
    if config.provider.model.trim().is_empty() {
        return Err(anyhow!("provider.model must not be empty"));
    }
    if config.provider.max_tokens == 0 {
        return Err(anyhow!("provider.max_tokens must be positive"));
    }
    if config.places.search_radius_m == 0 {
        return Err(anyhow!("places.search_radius_m must be positive"));
    }
    for (name, secs) in [
        ("places.timeout_secs", config.places.timeout_secs),
        ("weather.timeout_secs", config.weather.timeout_secs),
        ("geolocation.timeout_secs", config.geolocation.timeout_secs),
    ] {
        if secs == 0 {
            return Err(anyhow!("{name} must be positive"));
        }
    }
    if !config.geolocation.fallback().is_valid() {
        return Err(anyhow!(
            "geolocation fallback out of range: {}",
            config.geolocation.fallback()
        ));
    }
    Ok(())
}

fn read_yaml_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))
}
