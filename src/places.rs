use crate::error::AppError;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;

const TEXT_SEARCH_URL: &str = "https://places.googleapis.com/v1/places:searchText";
const FIND_PLACE_URL: &str = "https://maps.googleapis.com/maps/api/place/findplacefromtext/json";
const FIELD_MASK: &str = "places.id,places.displayName,places.formattedAddress,places.types";
const MAX_RESULTS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceMatch {
    pub name: String,
    pub address: String,
    pub place_id: String,
    pub types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TextSearchResponse {
    #[serde(default)]
    places: Vec<TextSearchPlace>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextSearchPlace {
    #[serde(default)]
    id: String,
    display_name: Option<DisplayName>,
    formatted_address: Option<String>,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DisplayName {
    text: String,
}

#[derive(Debug, Deserialize)]
struct FindPlaceResponse {
    status: String,
    #[serde(default)]
    candidates: Vec<FindPlaceCandidate>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FindPlaceCandidate {
    place_id: Option<String>,
    name: Option<String>,
    formatted_address: Option<String>,
    #[serde(default)]
    types: Vec<String>,
}

pub struct PlacesClient {
    http: Client,
    api_key: String,
    text_search_url: String,
    find_place_url: String,
}

impl PlacesClient {
    pub fn new(api_key: String) -> Result<Self, AppError> {
        Self::with_urls(
            api_key,
            TEXT_SEARCH_URL.to_string(),
            FIND_PLACE_URL.to_string(),
        )
    }

    fn with_urls(
        api_key: String,
        text_search_url: String,
        find_place_url: String,
    ) -> Result<Self, AppError> {
        Ok(PlacesClient {
            http: Client::builder().build()?,
            api_key,
            text_search_url,
            find_place_url,
        })
    }

    /// Searches the Places API (new) and falls back to the legacy find-place
    /// endpoint when the new one rejects the request (typically an API key
    /// not enabled for it). An empty result is "no match", not an error.
    pub fn search(&self, query: &str) -> Result<Vec<PlaceMatch>, AppError> {
        match self.search_text(query) {
            Ok(matches) => Ok(matches),
            Err(AppError::Api { status, message }) => {
                log::warn!(
                    "Places API (new) rejected the request (HTTP {}): {}; trying legacy API",
                    status,
                    message
                );
                self.find_place_legacy(query)
            }
            Err(other) => Err(other),
        }
    }

    fn search_text(&self, query: &str) -> Result<Vec<PlaceMatch>, AppError> {
        log::debug!("Text search for {:?}", query);
        let response = self
            .http
            .post(&self.text_search_url)
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&json!({ "textQuery": query }))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(body);
            return Err(AppError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: TextSearchResponse = response.json()?;
        Ok(parsed
            .places
            .into_iter()
            .take(MAX_RESULTS)
            .map(|p| PlaceMatch {
                name: p
                    .display_name
                    .map(|d| d.text)
                    .unwrap_or_else(|| "Unknown".to_string()),
                address: p
                    .formatted_address
                    .unwrap_or_else(|| "No address".to_string()),
                // Resource names arrive as "places/<id>"; keep the bare id.
                place_id: p.id.strip_prefix("places/").unwrap_or(&p.id).to_string(),
                types: p.types,
            })
            .collect())
    }

    fn find_place_legacy(&self, query: &str) -> Result<Vec<PlaceMatch>, AppError> {
        log::debug!("Legacy find-place for {:?}", query);
        let response = self
            .http
            .get(&self.find_place_url)
            .query(&[
                ("input", query),
                ("inputtype", "textquery"),
                ("fields", "place_id,name,formatted_address,types"),
                ("key", self.api_key.as_str()),
            ])
            .send()?;

        let http_status = response.status().as_u16();
        let parsed: FindPlaceResponse = response.json()?;
        match parsed.status.as_str() {
            "OK" => Ok(parsed
                .candidates
                .into_iter()
                .take(MAX_RESULTS)
                .map(|c| PlaceMatch {
                    name: c.name.unwrap_or_else(|| "Unknown".to_string()),
                    address: c
                        .formatted_address
                        .unwrap_or_else(|| "No address".to_string()),
                    place_id: c.place_id.unwrap_or_else(|| "No ID".to_string()),
                    types: c.types,
                })
                .collect()),
            "ZERO_RESULTS" => Ok(Vec::new()),
            other => Err(AppError::Api {
                status: http_status,
                message: match parsed.error_message {
                    Some(detail) => format!("{}: {}", other, detail),
                    None => other.to_string(),
                },
            }),
        }
    }
}

/// The no-API-key path: pure formatting, no network call.
pub fn manual_lookup_instructions(query: &str) -> String {
    let search_url = format!(
        "https://www.google.com/maps/search/{}",
        utf8_percent_encode(query, NON_ALPHANUMERIC)
    );
    format!(
        "No API key supplied; look the place up by hand instead:\n\
         \n\
         Open this URL in your browser:\n\
         {}\n\
         \n\
         Once you find the place on Google Maps:\n\
         1. Click on the place to select it\n\
         2. Click the 'Share' button\n\
         3. Click the 'Embed a map' tab\n\
         4. Look in the iframe src URL for 'place_id=ChIJ...'\n\
         5. That's your Place ID",
        search_url
    )
}
