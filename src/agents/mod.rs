mod coordinator;
mod planner;
mod rapporteur;

pub use coordinator::*;
pub use planner::*;
pub use rapporteur::*;

use crate::core::{OutputFormat, Plan, QueryKind, SearchResult};
use crate::errors::CollaboratorError;
use async_trait::async_trait;

/// Triages a query before any research is planned
#[async_trait]
pub trait Coordinator: Send + Sync {
    async fn classify(&self, query: &str) -> Result<QueryKind, CollaboratorError>;

    /// Direct answer for queries that need no research
    async fn respond(&self, query: &str, kind: QueryKind) -> Result<String, CollaboratorError>;
}

/// Produces free-form planning text and judges sufficiency of findings.
///
/// Parsing the text into a `Plan` is the plan builder's job, so
/// implementations never fail on malformed model output.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn draft_plan(
        &self,
        query: &str,
        feedback: Option<&str>,
    ) -> Result<String, CollaboratorError>;

    async fn revise_plan(
        &self,
        query: &str,
        plan: &Plan,
        feedback: &str,
    ) -> Result<String, CollaboratorError>;

    async fn is_sufficient(
        &self,
        plan: &Plan,
        results: &[SearchResult],
    ) -> Result<bool, CollaboratorError>;
}

/// Composes the final report from the gathered findings
#[async_trait]
pub trait Rapporteur: Send + Sync {
    async fn compose(
        &self,
        query: &str,
        plan: &Plan,
        results: &[SearchResult],
        format: OutputFormat,
    ) -> Result<String, CollaboratorError>;
}

#[cfg(test)]
pub(crate) mod fakes;
