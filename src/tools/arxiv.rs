use super::SearchTool;
use crate::core::SearchItem;
use crate::errors::ToolError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const ARXIV_QUERY_URL: &str = "https://export.arxiv.org/api/query";

/// Academic paper search through the public arXiv API. Needs no API key.
#[derive(Debug)]
pub struct ArxivSearch {
    client: Client,
    max_results: usize,
}

/// The parts of the Atom feed we read; other elements are ignored
#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
}

impl ArxivSearch {
    pub fn new(max_results: usize) -> Self {
        ArxivSearch {
            client: Client::new(),
            max_results,
        }
    }
}

#[async_trait]
impl SearchTool for ArxivSearch {
    fn name(&self) -> &str {
        "arxiv"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchItem>, ToolError> {
        let res = self
            .client
            .get(ARXIV_QUERY_URL)
            .query(&[
                ("search_query", format!("all:{}", query)),
                ("start", "0".to_string()),
                ("max_results", self.max_results.to_string()),
                ("sortBy", "relevance".to_string()),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(ToolError::Api {
                tool: self.name().to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let items = parse_feed(&body).map_err(|e| ToolError::Malformed {
            tool: self.name().to_string(),
            message: e.to_string(),
        })?;
        debug!("arXiv returned {} papers for '{}'", items.len(), query);
        Ok(items)
    }
}

/// Turns an arXiv Atom feed into search items. Titles and abstracts are
/// hard-wrapped in the feed, so their whitespace is collapsed.
fn parse_feed(xml: &str) -> Result<Vec<SearchItem>, quick_xml::de::DeError> {
    let feed: AtomFeed = quick_xml::de::from_str(xml)?;
    Ok(feed
        .entries
        .into_iter()
        .filter(|entry| !entry.id.trim().is_empty())
        .map(|entry| SearchItem {
            title: collapse_whitespace(&entry.title),
            url: entry.id.trim().to_string(),
            snippet: collapse_whitespace(&entry.summary),
            score: None,
        })
        .collect())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
