mod arxiv;
mod tavily;
mod tool_registry;

pub use arxiv::*;
pub use tavily::*;
pub use tool_registry::*;

use crate::core::SearchItem;
use crate::errors::ToolError;
use async_trait::async_trait;
use std::fmt::Debug;

/// A search backend addressable by source name
#[async_trait]
pub trait SearchTool: Debug + Send + Sync {
    /// Source name subtasks refer to (e.g. "tavily")
    fn name(&self) -> &str;
    async fn search(&self, query: &str) -> Result<Vec<SearchItem>, ToolError>;
}
