//! `get_weather`: current conditions for a city from Open-Meteo
//!
//! The city is geocoded first; the forecast call then asks for current
//! conditions and a three-day daily summary.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ParleyError, Result};
use crate::tools::{string_arg, ToolExecutor, ToolResult};

pub const DEFAULT_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com";
pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com";

#[derive(Debug, Clone)]
pub struct WeatherTool {
    client: reqwest::Client,
    geocoding_url: String,
    forecast_url: String,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<Place>,
}

#[derive(Debug, Deserialize)]
struct Place {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    admin1: Option<String>,
}

impl WeatherTool {
    pub fn new(client: reqwest::Client, geocoding_url: String, forecast_url: String) -> Self {
        Self {
            client,
            geocoding_url,
            forecast_url,
        }
    }

    async fn geocode(&self, city: &str) -> Result<Place> {
        let response = self
            .client
            .get(format!("{}/v1/search", self.geocoding_url))
            .query(&[("name", city), ("count", "1"), ("format", "json")])
            .send()
            .await
            .map_err(ParleyError::from)?;

        if !response.status().is_success() {
            return Err(ParleyError::ToolExecution(format!(
                "Failed to look up city {}: HTTP {}",
                city,
                response.status()
            ))
            .into());
        }

        let body: GeocodingResponse = response.json().await.map_err(ParleyError::from)?;
        body.results
            .into_iter()
            .next()
            .ok_or_else(|| ParleyError::ToolExecution(format!("Unknown city: {}", city)).into())
    }

    async fn forecast(&self, place: &Place) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/v1/forecast", self.forecast_url))
            .query(&[
                ("latitude", place.latitude.to_string()),
                ("longitude", place.longitude.to_string()),
                (
                    "current",
                    "temperature_2m,apparent_temperature,relative_humidity_2m,weather_code,wind_speed_10m,is_day"
                        .to_string(),
                ),
                (
                    "daily",
                    "weather_code,temperature_2m_max,temperature_2m_min".to_string(),
                ),
                ("forecast_days", "3".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await
            .map_err(ParleyError::from)?;

        if !response.status().is_success() {
            return Err(ParleyError::ToolExecution(format!(
                "Failed to fetch weather: HTTP {}",
                response.status()
            ))
            .into());
        }

        Ok(response.json().await.map_err(ParleyError::from)?)
    }
}

#[async_trait]
impl ToolExecutor for WeatherTool {
    fn tool_definition(&self) -> Value {
        json!({
            "name": "get_weather",
            "description": "Get the current weather for a city",
            "parameters": {
                "type": "object",
                "properties": {
                    "city": {"type": "string", "description": "the city to get the weather for"}
                },
                "required": ["city"]
            }
        })
    }

    fn pending(&self, args: &Value) -> Option<String> {
        let city = args.get("city").and_then(Value::as_str).unwrap_or("your city");
        Some(format!("Loading weather for {}...", city))
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let city = string_arg(&args, "city")?;
        let place = self.geocode(city).await?;
        tracing::debug!(city, lat = place.latitude, lon = place.longitude, "Geocoded city");

        let forecast = self.forecast(&place).await?;
        let current = forecast.get("current").cloned().unwrap_or(Value::Null);
        let conditions = current
            .get("weather_code")
            .and_then(Value::as_u64)
            .map(describe_weather_code);

        Ok(ToolResult::json(json!({
            "city": place.name,
            "region": place.admin1,
            "country": place.country,
            "latitude": place.latitude,
            "longitude": place.longitude,
            "conditions": conditions,
            "current": current,
            "current_units": forecast.get("current_units"),
            "daily": forecast.get("daily"),
        })))
    }
}

/// WMO weather interpretation code in words
pub fn describe_weather_code(code: u64) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51 | 53 | 55 => "Drizzle",
        56 | 57 => "Freezing drizzle",
        61 | 63 | 65 => "Rain",
        66 | 67 => "Freezing rain",
        71 | 73 | 75 => "Snow",
        77 => "Snow grains",
        80..=82 => "Rain showers",
        85 | 86 => "Snow showers",
        95 => "Thunderstorm",
        96 | 99 => "Thunderstorm with hail",
        _ => "Unknown",
    }
}
