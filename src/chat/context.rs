//! What the assistant is told about the user
//!
//! The system prompt names the built-in tools and carries a short user
//! profile. Every field that is not known is reported as `unknown`.

use crate::credentials::EnvLookup;

pub const CITY_ENV: &str = "PARLEY_CITY";
pub const COUNTRY_ENV: &str = "PARLEY_COUNTRY";
pub const REGION_ENV: &str = "PARLEY_REGION";

const UNKNOWN: &str = "unknown";

/// Location and device details for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub city: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub platform: Option<String>,
}

impl RequestContext {
    /// Location from `PARLEY_CITY`, `PARLEY_COUNTRY` and `PARLEY_REGION`
    pub fn from_env(env: &EnvLookup, platform: Option<String>) -> Self {
        let read = |name: &str| env(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            city: read(CITY_ENV),
            country: read(COUNTRY_ENV),
            region: read(REGION_ENV),
            platform,
        }
    }

    /// The system message opening every request
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::chat::RequestContext;
    ///
    /// let ctx = RequestContext {
    ///     city: Some("Austin".into()),
    ///     ..Default::default()
    /// };
    /// let prompt = ctx.system_prompt();
    /// assert!(prompt.contains("- city: Austin\n"));
    /// assert!(prompt.contains("- device platform: unknown\n"));
    /// ```
    pub fn system_prompt(&self) -> String {
        let field = |v: &Option<String>| v.clone().unwrap_or_else(|| UNKNOWN.to_string());
        format!(
            "You are a helpful chatbot assistant. You can provide weather info and movie recommendations.\n\
             You have the following tools available:\n\
             - get_media: Lists or search movies and TV shows from TMDB.\n\
             - get_weather: Gets the weather for a city.\n\
             \n\
             User info:\n\
             - city: {}\n\
             - country: {}\n\
             - region: {}\n\
             - device platform: {}\n",
            field(&self.city),
            field(&self.country),
            field(&self.region),
            field(&self.platform),
        )
    }
}
