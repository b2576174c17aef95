//! Place lookup against the Google Places web service.
//!
//! [`PlaceLookupClient::resolve`] walks three query tiers and stops at the
//! first one the provider answers with status `OK` and at least one result.
//! Nothing is cached; every call re-resolves.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use sidequest_schema::{Coordinates, PlaceRecord};

use crate::config::PlacesConfig;

const DETAILS_FIELDS: &str = "formatted_address,name,rating,user_ratings_total,types,geometry";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationBias {
    pub center: Coordinates,
    pub radius_m: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceCandidate {
    #[serde(default)]
    pub place_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub formatted_address: String,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub user_ratings_total: Option<u64>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

impl PlaceCandidate {
    pub fn coordinates(&self) -> Option<Coordinates> {
        self.geometry.as_ref().map(|g| g.location)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Geometry {
    pub location: Coordinates,
}

/// One text-search answer: provider status plus ranked candidates.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPage {
    pub status: String,
    #[serde(default)]
    pub results: Vec<PlaceCandidate>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl SearchPage {
    pub fn is_usable(&self) -> bool {
        self.status == "OK" && !self.results.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct DetailsPage {
    status: String,
    #[serde(default)]
    result: Option<PlaceCandidate>,
}

/// Raw access to the places provider.
#[async_trait]
pub trait PlacesApi: Send + Sync {
    async fn text_search(&self, query: &str, bias: Option<LocationBias>) -> Result<SearchPage>;
    /// `Ok(None)` when the provider answers with a non-OK status.
    async fn details(&self, place_id: &str) -> Result<Option<PlaceCandidate>>;
}

pub struct GooglePlacesApi {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GooglePlacesApi {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PlacesApi for GooglePlacesApi {
    async fn text_search(&self, query: &str, bias: Option<LocationBias>) -> Result<SearchPage> {
        let mut params = vec![
            ("query".to_string(), query.to_string()),
            ("key".to_string(), self.api_key.clone()),
        ];
        if let Some(bias) = bias {
            params.push(("location".to_string(), bias.center.to_string()));
            params.push(("radius".to_string(), bias.radius_m.to_string()));
        }

        let resp = self
            .client
            .get(format!("{}/textsearch/json", self.base_url))
            .query(&params)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("places text search failed (HTTP {status})"));
        }
        Ok(resp.json().await?)
    }

    async fn details(&self, place_id: &str) -> Result<Option<PlaceCandidate>> {
        let resp = self
            .client
            .get(format!("{}/details/json", self.base_url))
            .query(&[
                ("place_id", place_id),
                ("fields", DETAILS_FIELDS),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("places details failed (HTTP {status})"));
        }
        let page: DetailsPage = resp.json().await?;
        if page.status != "OK" {
            return Ok(None);
        }
        Ok(page.result)
    }
}

/// Resolves place names to [`PlaceRecord`]s. Without a credential it is
/// permanently unavailable and answers `None` without touching the network.
#[derive(Clone)]
pub struct PlaceLookupClient {
    api: Option<Arc<dyn PlacesApi>>,
}

impl PlaceLookupClient {
    pub fn new(api: Arc<dyn PlacesApi>) -> Self {
        Self { api: Some(api) }
    }

    pub fn unavailable() -> Self {
        Self { api: None }
    }

    pub fn from_config(config: &PlacesConfig) -> Self {
        match config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            Some(key) => Self::new(Arc::new(GooglePlacesApi::new(
                key,
                config.base_url.clone(),
                Duration::from_secs(config.timeout_secs),
            ))),
            None => {
                tracing::warn!(
                    "GOOGLE_MAPS_API_KEY not configured; place lookups are disabled"
                );
                Self::unavailable()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.api.is_some()
    }

    pub async fn resolve(&self, place_name: &str, rough_location: &str) -> Option<PlaceRecord> {
        let api = self.api.as_ref()?;

        for query in fallback_queries(place_name, rough_location) {
            if let Some(record) = self.search_tier(api.as_ref(), &query, rough_location).await {
                tracing::info!(query = %query, place = %record.name, "place resolved");
                return Some(record);
            }
        }

        tracing::warn!("Could not resolve place '{place_name}' near '{rough_location}'");
        None
    }

    /// Single biased search used while grounding suggestions. Takes the top
    /// candidate as is, without a details call.
    pub async fn find_nearby(&self, query: &str, bias: LocationBias) -> Option<PlaceRecord> {
        let api = self.api.as_ref()?;
        match api.text_search(query, Some(bias)).await {
            Ok(page) if page.is_usable() => page.results.first().map(record_from_candidate),
            Ok(page) => {
                tracing::debug!(query, status = %page.status, "nearby search found nothing");
                None
            }
            Err(e) => {
                tracing::warn!(query, "nearby search failed: {e}");
                None
            }
        }
    }

    async fn search_tier(
        &self,
        api: &dyn PlacesApi,
        query: &str,
        rough_location: &str,
    ) -> Option<PlaceRecord> {
        let page = match api.text_search(query, None).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(query, "place search failed: {e}");
                return None;
            }
        };
        if !page.is_usable() {
            tracing::debug!(
                query,
                status = %page.status,
                error = ?page.error_message,
                "place search tier not usable"
            );
            return None;
        }

        let best = pick_candidate(&page.results, rough_location)?;
        match api.details(&best.place_id).await {
            Ok(Some(details)) => Some(merge_details(best, &details)),
            Ok(None) => Some(record_from_candidate(best)),
            Err(e) => {
                tracing::warn!(place_id = %best.place_id, "place details failed: {e}");
                Some(record_from_candidate(best))
            }
        }
    }
}

/// Queries to try, in order: name plus location, the part before an
/// apostrophe, then the first two words.
pub fn fallback_queries(place_name: &str, rough_location: &str) -> Vec<String> {
    let name = place_name.trim();
    let mut queries: Vec<String> = Vec::new();
    let mut push = |query: String| {
        if !query.is_empty() && !queries.contains(&query) {
            queries.push(query);
        }
    };

    push(format!("{name} {}", rough_location.trim()).trim().to_string());

    if let Some(idx) = name.find(['\'', '\u{2019}']) {
        push(name[..idx].trim().to_string());
    }

    let words: Vec<&str> = name.split_whitespace().collect();
    if words.len() > 2 {
        push(words[..2].join(" "));
    }

    queries
}

/// Prefer a candidate whose address mentions the rough location.
fn pick_candidate<'a>(candidates: &'a [PlaceCandidate], rough_location: &str) -> Option<&'a PlaceCandidate> {
    let needle = rough_location.trim().to_lowercase();
    if !needle.is_empty() {
        if let Some(hit) = candidates
            .iter()
            .find(|c| c.formatted_address.to_lowercase().contains(&needle))
        {
            return Some(hit);
        }
    }
    candidates.first()
}

fn record_from_candidate(candidate: &PlaceCandidate) -> PlaceRecord {
    PlaceRecord {
        name: candidate.name.clone(),
        address: candidate.formatted_address.clone(),
        rating: candidate.rating,
        user_ratings_total: candidate.user_ratings_total,
        types: candidate.types.clone(),
        place_id: candidate.place_id.clone(),
        coordinates: candidate.coordinates(),
    }
}

fn merge_details(candidate: &PlaceCandidate, details: &PlaceCandidate) -> PlaceRecord {
    let pick = |detail: &str, fallback: &str| {
        if detail.is_empty() {
            fallback.to_string()
        } else {
            detail.to_string()
        }
    };
    PlaceRecord {
        name: pick(&details.name, &candidate.name),
        address: pick(&details.formatted_address, &candidate.formatted_address),
        rating: details.rating.or(candidate.rating),
        user_ratings_total: details.user_ratings_total.or(candidate.user_ratings_total),
        types: if details.types.is_empty() {
            candidate.types.clone()
        } else {
            details.types.clone()
        },
        place_id: candidate.place_id.clone(),
        coordinates: details.coordinates().or_else(|| candidate.coordinates()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, address: &str) -> PlaceCandidate {
        PlaceCandidate {
            place_id: format!("id-{name}"),
            name: name.into(),
            formatted_address: address.into(),
            ..PlaceCandidate::default()
        }
    }

    #[test]
    fn fallback_queries_for_possessive_name() {
        assert_eq!(
            fallback_queries("Mum's Diner", "Philadelphia, PA"),
            vec!["Mum's Diner Philadelphia, PA", "Mum"]
        );
    }

    #[test]
    fn fallback_queries_for_long_name() {
        assert_eq!(
            fallback_queries("Philadelphia Museum of Art", "Philadelphia"),
            vec![
                "Philadelphia Museum of Art Philadelphia",
                "Philadelphia Museum"
            ]
        );
    }

    #[test]
    fn fallback_queries_handle_typographic_apostrophe_and_empty_location() {
        assert_eq!(
            fallback_queries("Joe\u{2019}s Famous Steaks", ""),
            vec!["Joe\u{2019}s Famous Steaks", "Joe", "Joe\u{2019}s Famous"]
        );
    }

    #[test]
    fn short_plain_name_has_single_tier() {
        assert_eq!(fallback_queries("Louvre", "Paris"), vec!["Louvre Paris"]);
    }

    #[test]
    fn pick_candidate_prefers_address_match() {
        let candidates = vec![
            candidate("A", "1 Road, Springfield, IL"),
            candidate("B", "2 Road, Philadelphia, PA"),
        ];
        assert_eq!(pick_candidate(&candidates, "philadelphia").unwrap().name, "B");
        assert_eq!(pick_candidate(&candidates, "Boston").unwrap().name, "A");
        assert_eq!(pick_candidate(&candidates, "").unwrap().name, "A");
    }

    #[test]
    fn merge_details_falls_back_to_candidate_geometry() {
        let mut base = candidate("Museum", "addr");
        base.geometry = Some(Geometry {
            location: Coordinates::new(1.0, 2.0),
        });
        let details = PlaceCandidate {
            name: "Museum of Art".into(),
            rating: Some(4.8),
            ..PlaceCandidate::default()
        };
        let record = merge_details(&base, &details);
        assert_eq!(record.name, "Museum of Art");
        assert_eq!(record.address, "addr");
        assert_eq!(record.rating, Some(4.8));
        assert_eq!(record.coordinates, Some(Coordinates::new(1.0, 2.0)));
        assert_eq!(record.place_id, "id-Museum");
    }

    #[tokio::test]
    async fn unavailable_client_resolves_nothing() {
        let client = PlaceLookupClient::unavailable();
        assert!(!client.is_available());
        assert!(client.resolve("Anything", "Anywhere").await.is_none());
    }
}
