use super::{ArxivSearch, SearchTool, TavilySearch};
use crate::config::SearchConfig;
use crate::core::{SearchResult, SubTask};
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps source names to search tools and runs a subtask's searches
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn SearchTool>>,
}

impl ToolRegistry {
    /// Creates a registry with arXiv search and every tool that has
    /// credentials configured
    ///
    /// # Arguments
    /// * `config` - Search section of the application configuration
    ///
    /// # Returns
    /// * `ToolRegistry` - Registry holding the configured tools
    pub fn from_config(config: &SearchConfig) -> Self {
        let mut tools: Vec<Arc<dyn SearchTool>> =
            vec![Arc::new(ArxivSearch::new(config.max_results))];
        match config.tavily_api_key.as_deref() {
            Some(key) if !key.is_empty() => {
                tools.push(Arc::new(TavilySearch::new(key, config.max_results)))
            }
            _ => warn!("TAVILY_API_KEY not set, web search is disabled; only arxiv is available"),
        }
        debug!(
            "Loaded search tools: {:?}",
            tools.iter().map(|t| t.name()).collect::<Vec<_>>()
        );
        ToolRegistry { tools }
    }

    pub fn with_tools(tools: Vec<Arc<dyn SearchTool>>) -> Self {
        ToolRegistry { tools }
    }

    /// Retrieves a tool by its source name
    pub fn get_tool(&self, name: &str) -> Option<&Arc<dyn SearchTool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Runs every (query, source) pair of `sub_task`, in order.
    ///
    /// Sources without a registered tool are skipped. A failing tool yields a
    /// result carrying the error and no items; it never aborts the subtask.
    pub async fn search_sub_task(&self, sub_task: &SubTask) -> Vec<SearchResult> {
        let mut results = Vec::new();
        for query in &sub_task.search_queries {
            for source in &sub_task.sources {
                let Some(tool) = self.get_tool(source) else {
                    debug!("No tool configured for source '{}', skipping", source);
                    continue;
                };

                let result = match tool.search(query).await {
                    Ok(items) => SearchResult {
                        task_id: sub_task.id,
                        query: query.clone(),
                        source: source.clone(),
                        items,
                        error: None,
                    },
                    Err(e) => {
                        warn!("Search '{}' on {} failed: {}", query, source, e);
                        SearchResult {
                            task_id: sub_task.id,
                            query: query.clone(),
                            source: source.clone(),
                            items: Vec::new(),
                            error: Some(e.to_string()),
                        }
                    }
                };
                results.push(result);
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SearchItem, SubTaskStatus};
    use crate::errors::ToolError;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct Echo;

    #[async_trait]
    impl SearchTool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn search(&self, query: &str) -> Result<Vec<SearchItem>, ToolError> {
            Ok(vec![SearchItem {
                title: query.to_string(),
                url: format!("https://example.org/{}", query),
                snippet: String::new(),
                score: None,
            }])
        }
    }

    #[derive(Debug)]
    struct Broken;

    #[async_trait]
    impl SearchTool for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn search(&self, _query: &str) -> Result<Vec<SearchItem>, ToolError> {
            Err(ToolError::Api {
                tool: "broken".into(),
                status: 503,
                body: "unavailable".into(),
            })
        }
    }

    #[test]
    fn arxiv_is_available_without_credentials() {
        let registry = ToolRegistry::from_config(&SearchConfig::default());
        assert!(registry.get_tool("arxiv").is_some());
        assert!(registry.get_tool("tavily").is_none());

        let config = SearchConfig {
            tavily_api_key: Some("tvly-test".to_string()),
            ..SearchConfig::default()
        };
        let registry = ToolRegistry::from_config(&config);
        assert!(registry.get_tool("arxiv").is_some());
        assert!(registry.get_tool("tavily").is_some());
    }

    #[tokio::test]
    async fn searches_each_query_and_source_skipping_unknown_ones() {
        let registry = ToolRegistry::with_tools(vec![Arc::new(Echo), Arc::new(Broken)]);
        let sub_task = SubTask {
            id: 4,
            description: "d".into(),
            search_queries: vec!["a".into(), "b".into()],
            sources: ["arxiv", "broken", "echo"].iter().map(|s| s.to_string()).collect(),
            status: SubTaskStatus::Pending,
            priority: None,
        };

        let results = registry.search_sub_task(&sub_task).await;
        let pairs: Vec<_> = results
            .iter()
            .map(|r| (r.query.as_str(), r.source.as_str(), r.error.is_some()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("a", "broken", true),
                ("a", "echo", false),
                ("b", "broken", true),
                ("b", "echo", false),
            ]
        );
        assert!(results.iter().all(|r| r.task_id == 4));
        assert!(results[0].items.is_empty());
    }
}
