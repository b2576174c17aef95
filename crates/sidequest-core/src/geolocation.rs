use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use sidequest_schema::Coordinates;

use crate::config::GeolocationConfig;

/// Coarse location of the caller. Never fails: implementations fall back to
/// a fixed coordinate pair.
#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn locate(&self) -> Coordinates;
}

/// IP-based lookup against an ipinfo-style endpoint (`{"loc": "lat,lng"}`).
pub struct IpGeolocator {
    client: reqwest::Client,
    url: String,
    fallback: Coordinates,
}

#[derive(Deserialize)]
struct IpInfoResponse {
    loc: Option<String>,
}

impl IpGeolocator {
    pub fn new(url: impl Into<String>, timeout: Duration, fallback: Coordinates) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
            fallback,
        }
    }

    pub fn from_config(config: &GeolocationConfig) -> Self {
        Self::new(
            config.url.clone(),
            Duration::from_secs(config.timeout_secs),
            config.fallback(),
        )
    }

    async fn lookup(&self) -> Result<Coordinates> {
        let resp = self.client.get(&self.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("geolocation lookup failed (HTTP {status})"));
        }
        let body: IpInfoResponse = resp.json().await?;
        let loc = body.loc.ok_or_else(|| anyhow!("geolocation response has no loc"))?;
        Coordinates::parse_pair(&loc).ok_or_else(|| anyhow!("unparseable loc: {loc}"))
    }
}

#[async_trait]
impl Geolocator for IpGeolocator {
    async fn locate(&self) -> Coordinates {
        match self.lookup().await {
            Ok(coords) => coords,
            Err(e) => {
                tracing::warn!(
                    "Error fetching current location: {e}; using fallback {}",
                    self.fallback
                );
                self.fallback
            }
        }
    }
}

/// Always answers with the same coordinates.
pub struct StaticGeolocator(pub Coordinates);

#[async_trait]
impl Geolocator for StaticGeolocator {
    async fn locate(&self) -> Coordinates {
        self.0
    }
}
