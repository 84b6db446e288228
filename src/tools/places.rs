//! `get_points_of_interest`: Google Places text search

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ParleyError, Result};
use crate::tools::{string_arg, ToolExecutor, ToolResult};

pub const DEFAULT_PLACES_URL: &str = "https://maps.googleapis.com";

/// Results beyond this are dropped before reaching the model
const MAX_PLACES: usize = 10;

#[derive(Debug, Clone)]
pub struct PlacesTool {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextSearchResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<Value>,
}

impl PlacesTool {
    pub fn new(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

fn summarize(place: &Value) -> Value {
    let location = &place["geometry"]["location"];
    json!({
        "name": place.get("name"),
        "address": place.get("formatted_address"),
        "rating": place.get("rating"),
        "user_ratings_total": place.get("user_ratings_total"),
        "latitude": location.get("lat"),
        "longitude": location.get("lng"),
        "place_id": place.get("place_id"),
        "types": place.get("types"),
    })
}

#[async_trait]
impl ToolExecutor for PlacesTool {
    fn tool_definition(&self) -> Value {
        json!({
            "name": "get_points_of_interest",
            "description": "Get things to do for a point of interest or city",
            "parameters": {
                "type": "object",
                "properties": {
                    "poi": {
                        "type": "string",
                        "description": "query to send to the Google Places API. e.g. \"things to do in Amsterdam\" or \"casinos and hotels in Las Vegas\""
                    }
                },
                "required": ["poi"]
            }
        })
    }

    fn pending(&self, args: &Value) -> Option<String> {
        Some(match args.get("poi").and_then(Value::as_str) {
            Some(poi) => format!("Searching places for {}...", poi),
            None => "Searching places...".to_string(),
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let poi = string_arg(&args, "poi")?;
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ParleyError::ToolExecution("GOOGLE_MAPS_API_KEY is not configured".to_string())
        })?;

        let response = self
            .client
            .get(format!("{}/maps/api/place/textsearch/json", self.base_url))
            .query(&[("query", poi), ("key", api_key)])
            .send()
            .await
            .map_err(ParleyError::from)?;
        if !response.status().is_success() {
            return Err(ParleyError::ToolExecution(format!(
                "Failed to fetch places: HTTP {}",
                response.status()
            ))
            .into());
        }

        let body: TextSearchResponse = response.json().await.map_err(ParleyError::from)?;
        match body.status.as_str() {
            "OK" | "ZERO_RESULTS" => {}
            other => {
                return Err(ParleyError::ToolExecution(format!(
                    "Places search failed: {}{}",
                    other,
                    body.error_message
                        .map(|m| format!(" ({})", m))
                        .unwrap_or_default()
                ))
                .into())
            }
        }

        let places: Vec<Value> = body.results.iter().take(MAX_PLACES).map(summarize).collect();
        tracing::debug!(poi, count = places.len(), "Places search finished");

        Ok(ToolResult::json(json!({
            "query": poi,
            "places": places,
        })))
    }
}
