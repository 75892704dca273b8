use crate::error::Result;
use crate::types::{QueryHooks, QueryOutcome, QueryRequest};
use async_trait::async_trait;

#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Unique backend identifier: "dev", "claude-code".
    fn backend_id(&self) -> &str;

    /// Run one conversational query to completion. The backend may send any
    /// number of tool-permission probes and at most one session-created
    /// notice through `hooks` while the call is in flight.
    async fn query(&self, request: QueryRequest, hooks: QueryHooks) -> Result<QueryOutcome>;
}
