use super::SearchTool;
use crate::core::SearchItem;
use crate::errors::ToolError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

/// Web search through the Tavily API
#[derive(Debug)]
pub struct TavilySearch {
    client: Client,
    api_key: String,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Debug, Deserialize)]
struct TavilyHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: Option<f64>,
}

impl TavilySearch {
    pub fn new(api_key: &str, max_results: usize) -> Self {
        TavilySearch {
            client: Client::new(),
            api_key: api_key.to_string(),
            max_results,
        }
    }
}

#[async_trait]
impl SearchTool for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchItem>, ToolError> {
        let request_body = json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": self.max_results,
            "search_depth": "basic",
        });

        let res = self
            .client
            .post(TAVILY_SEARCH_URL)
            .json(&request_body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await?;
            return Err(ToolError::Api {
                tool: self.name().to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let response: TavilyResponse = res.json().await?;
        debug!("Tavily returned {} results for '{}'", response.results.len(), query);
        Ok(response
            .results
            .into_iter()
            .map(|hit| SearchItem {
                title: hit.title,
                url: hit.url,
                snippet: hit.content,
                score: hit.score,
            })
            .collect())
    }
}
