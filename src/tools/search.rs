//! Tavily web search tools
//!
//! Four tools share one client and key: `search`, `searchContext`,
//! `searchQNA` and `extract`. Each posts a JSON body carrying the key and
//! hands the response body back to the model unchanged.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{ParleyError, Result};
use crate::tools::{string_arg, ToolExecutor, ToolResult};

pub const DEFAULT_TAVILY_URL: &str = "https://api.tavily.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TavilyAction {
    Search,
    SearchContext,
    SearchQna,
    Extract,
}

impl TavilyAction {
    pub const ALL: [TavilyAction; 4] = [
        TavilyAction::Search,
        TavilyAction::SearchContext,
        TavilyAction::SearchQna,
        TavilyAction::Extract,
    ];

    fn tool_name(self) -> &'static str {
        match self {
            TavilyAction::Search => "search",
            TavilyAction::SearchContext => "searchContext",
            TavilyAction::SearchQna => "searchQNA",
            TavilyAction::Extract => "extract",
        }
    }

    fn description(self) -> &'static str {
        match self {
            TavilyAction::Search => "Search for information on Tavily",
            TavilyAction::SearchContext => "Search for information on Tavily with context",
            TavilyAction::SearchQna => "Search for information on Tavily with Q&A",
            TavilyAction::Extract => "Extract information from a URL",
        }
    }

    fn path(self) -> &'static str {
        match self {
            TavilyAction::Search | TavilyAction::SearchContext => "/search",
            TavilyAction::SearchQna => "/qna_search",
            TavilyAction::Extract => "/extract",
        }
    }

    fn arguments(self) -> &'static [&'static str] {
        match self {
            TavilyAction::Search | TavilyAction::SearchQna => &["query"],
            TavilyAction::SearchContext => &["query", "context"],
            TavilyAction::Extract => &["url"],
        }
    }
}

#[derive(Debug, Clone)]
pub struct TavilyTool {
    action: TavilyAction,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TavilyTool {
    pub fn new(
        action: TavilyAction,
        client: reqwest::Client,
        base_url: String,
        api_key: String,
    ) -> Self {
        Self {
            action,
            client,
            base_url,
            api_key,
        }
    }
}

/// All Tavily tools bound to `api_key`
pub fn tavily_tools(
    client: reqwest::Client,
    base_url: &str,
    api_key: &str,
) -> Vec<Arc<dyn ToolExecutor>> {
    TavilyAction::ALL
        .iter()
        .map(|action| {
            Arc::new(TavilyTool::new(
                *action,
                client.clone(),
                base_url.to_string(),
                api_key.to_string(),
            )) as Arc<dyn ToolExecutor>
        })
        .collect()
}

#[async_trait]
impl ToolExecutor for TavilyTool {
    fn tool_definition(&self) -> Value {
        let names = self.action.arguments();
        let properties: serde_json::Map<String, Value> = names
            .iter()
            .map(|n| (n.to_string(), json!({"type": "string"})))
            .collect();
        json!({
            "name": self.action.tool_name(),
            "description": self.action.description(),
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": names,
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let mut body = serde_json::Map::new();
        body.insert("api_key".to_string(), json!(self.api_key));
        for name in self.action.arguments() {
            body.insert(name.to_string(), json!(string_arg(&args, name)?));
        }

        let response = self
            .client
            .post(format!("{}{}", self.base_url, self.action.path()))
            .json(&body)
            .send()
            .await
            .map_err(ParleyError::from)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ParleyError::ToolExecution(format!(
                "Tavily API error: HTTP {} {}",
                status,
                detail.trim()
            ))
            .into());
        }

        Ok(ToolResult::json(response.json().await.map_err(ParleyError::from)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool(action: TavilyAction, server: &MockServer) -> TavilyTool {
        TavilyTool::new(action, reqwest::Client::new(), server.uri(), "tv-key".into())
    }

    #[test]
    fn test_tool_set() {
        let names: Vec<String> = tavily_tools(reqwest::Client::new(), "http://x", "k")
            .iter()
            .map(|t| t.name())
            .collect();
        assert_eq!(names, vec!["search", "searchContext", "searchQNA", "extract"]);
    }

    #[tokio::test]
    async fn test_search_context_posts_all_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_json(json!({"api_key": "tv-key", "query": "rust", "context": "language"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [1, 2]})))
            .expect(1)
            .mount(&server)
            .await;

        let result = tool(TavilyAction::SearchContext, &server)
            .execute(json!({"query": "rust", "context": "language"}))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap()["results"], json!([1, 2]));
    }

    #[tokio::test]
    async fn test_qna_and_extract_paths() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/qna_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!("42")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .and(body_json(json!({"api_key": "tv-key", "url": "https://example.com"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"raw_content": "hi"})))
            .expect(1)
            .mount(&server)
            .await;

        let qna = tool(TavilyAction::SearchQna, &server)
            .execute(json!({"query": "meaning of life"}))
            .await
            .unwrap();
        assert_eq!(qna.output, "\"42\"");

        let extract = tool(TavilyAction::Extract, &server)
            .execute(json!({"url": "https://example.com"}))
            .await
            .unwrap();
        assert_eq!(extract.data.unwrap()["raw_content"], "hi");
    }

    #[tokio::test]
    async fn test_error_status_and_missing_argument() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let t = tool(TavilyAction::Search, &server);
        let err = t.execute(json!({"query": "x"})).await.unwrap_err();
        assert!(err.to_string().contains("Tavily API error"));
        assert!(err.to_string().contains("bad key"));

        let err = t.execute(json!({})).await.unwrap_err();
        assert!(err.to_string().contains("Missing required argument: query"));
    }
}
