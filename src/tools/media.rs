//! `get_media`: trending or searched movies and TV shows from TMDB

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{ParleyError, Result};
use crate::tools::{ToolExecutor, ToolResult};

pub const DEFAULT_TMDB_URL: &str = "https://api.themoviedb.org";

const MEDIA_TYPES: [&str; 2] = ["tv", "movie"];
const TIME_WINDOWS: [&str; 2] = ["day", "week"];

#[derive(Debug, Clone)]
pub struct MediaTool {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl MediaTool {
    pub fn new(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn request_url(
        &self,
        api_key: &str,
        media_type: &str,
        time_window: &str,
        query: Option<&str>,
    ) -> Result<url::Url> {
        let url = match query {
            Some(q) => url::Url::parse_with_params(
                &format!("{}/3/search/{}", self.base_url, media_type),
                &[("api_key", api_key), ("query", q)],
            )?,
            None => url::Url::parse_with_params(
                &format!("{}/3/trending/{}/{}", self.base_url, media_type, time_window),
                &[("api_key", api_key)],
            )?,
        };
        Ok(url)
    }
}

/// Value of `key` if it is one of `allowed`, else `default`
fn choice<'a>(args: &'a Value, key: &str, allowed: &[&str], default: &'a str) -> Result<&'a str> {
    match args.get(key).and_then(Value::as_str) {
        None => Ok(default),
        Some(v) if allowed.contains(&v) => Ok(v),
        Some(v) => Err(ParleyError::ToolExecution(format!(
            "Invalid {} '{}', expected one of: {}",
            key,
            v,
            allowed.join(", ")
        ))
        .into()),
    }
}

#[async_trait]
impl ToolExecutor for MediaTool {
    fn tool_definition(&self) -> Value {
        json!({
            "name": "get_media",
            "description": "List movies or TV shows today or this week from TMDB",
            "parameters": {
                "type": "object",
                "properties": {
                    "time_window": {
                        "type": "string",
                        "enum": TIME_WINDOWS,
                        "default": "day",
                        "description": "time window to search for"
                    },
                    "media_type": {
                        "type": "string",
                        "enum": MEDIA_TYPES,
                        "default": "movie",
                        "description": "type of media to search for"
                    },
                    "generated_description": {
                        "type": "string",
                        "description": "AI-generated description of the tool call"
                    },
                    "query": {
                        "type": "string",
                        "description": "The query to use for searching movies or TV shows. Set to undefined if looking for trending, new, or popular media."
                    }
                },
                "required": ["time_window", "media_type", "generated_description"]
            }
        })
    }

    fn pending(&self, args: &Value) -> Option<String> {
        let noun = match args.get("media_type").and_then(Value::as_str) {
            Some("tv") => "TV shows",
            _ => "movies",
        };
        Some(format!("Loading {}...", noun))
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let media_type = choice(&args, "media_type", &MEDIA_TYPES, "movie")?;
        let time_window = choice(&args, "time_window", &TIME_WINDOWS, "day")?;
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty());
        let title = args
            .get("generated_description")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ParleyError::ToolExecution("TMDB_API_KEY is not configured".to_string())
        })?;

        let url = self.request_url(api_key, media_type, time_window, query)?;
        tracing::debug!(media_type, time_window, ?query, "Fetching media from TMDB");

        let response = self.client.get(url).send().await.map_err(ParleyError::from)?;
        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "TMDB request failed");
            return Err(
                ParleyError::ToolExecution("Failed to fetch trending movies".to_string()).into(),
            );
        }

        let body: Value = response.json().await.map_err(ParleyError::from)?;
        let results: Vec<Value> = body
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|mut item| {
                if let Some(obj) = item.as_object_mut() {
                    obj.entry("media_type")
                        .or_insert_with(|| Value::String(media_type.to_string()));
                }
                item
            })
            .collect();

        Ok(ToolResult::json(json!({
            "title": title,
            "results": results,
        })))
    }
}
