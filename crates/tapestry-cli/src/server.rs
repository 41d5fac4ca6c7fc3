use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;

use tapestry_core::{
    ActionKind, Intention, ManualCommand, Region, StorageError, ThreadDraft, TimeOfDay,
};

use crate::app::Tapestry;

const DEFAULT_QUERY_LIMIT: usize = 5;

#[derive(Clone)]
pub struct TapServer {
    state: Arc<Mutex<Tapestry>>,
    tool_router: ToolRouter<Self>,
}

impl TapServer {
    pub fn new(app: Tapestry) -> Self {
        Self {
            state: Arc::new(Mutex::new(app)),
            tool_router: Self::tool_router(),
        }
    }

    /// Wait for queued ledger writes before the process exits.
    pub async fn flush(&self) {
        let failures = self.state.lock().await.flush().await;
        if !failures.is_empty() {
            tracing::warn!("{} ledger write(s) failed during the session", failures.len());
        }
    }
}

fn json_result(value: &impl serde::Serialize) -> Result<CallToolResult, McpError> {
    json_result_with(value, &[])
}

/// Result body first, then a `warnings` block when ledger writes failed.
fn json_result_with(
    value: &impl serde::Serialize,
    failures: &[StorageError],
) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    let mut content = vec![Content::text(text)];
    if !failures.is_empty() {
        let warnings: Vec<String> = failures
            .iter()
            .map(|e| format!("ledger not persisted: {e}"))
            .collect();
        content.push(Content::text(
            serde_json::json!({ "warnings": warnings }).to_string(),
        ));
    }
    Ok(CallToolResult::success(content))
}

fn invalid(field: &str, value: &str) -> McpError {
    McpError::invalid_params(format!("invalid {field}: {value}"), None)
}

// --- Tool parameter types ---

#[derive(Debug, Deserialize, JsonSchema)]
struct WeaveRequest {
    /// serenity, vibrancy, awe or legacy
    intention: String,
    /// dawn, midday, dusk or night
    time: String,
    /// coast, medina, sahara or kasbah
    region: String,
    /// Optional free-text title
    title: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AssessRequest {
    /// Assess only the first N threads, as the ledger stood then
    at: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct QueryRequest {
    /// Id of the stored thread to find neighbours for
    id: String,
    /// Maximum matches to return (default 5)
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct OverrideRequest {
    /// NOTIFY, TEMPORAL_BRAKE, STABILIZE, DEPLOY_SCOUT, DEPLOY_INTERCEPTOR or LOCKDOWN
    action: String,
    /// Optional target region
    target: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct LogRequest {
    /// Return only the most recent N entries
    limit: Option<usize>,
}

#[tool_router]
impl TapServer {
    #[tool(
        description = "Append a thread (intention, time of day, region, optional title) to the ledger. Returns the stored record with its id and chain hash."
    )]
    async fn tap_weave(
        &self,
        Parameters(req): Parameters<WeaveRequest>,
    ) -> Result<CallToolResult, McpError> {
        let intention = Intention::parse_strict(&req.intention)
            .filter(|v| v.is_known())
            .ok_or_else(|| invalid("intention", &req.intention))?;
        let time = TimeOfDay::parse_strict(&req.time)
            .filter(|v| v.is_known())
            .ok_or_else(|| invalid("time", &req.time))?;
        let region = Region::parse_strict(&req.region)
            .filter(|v| v.is_known())
            .ok_or_else(|| invalid("region", &req.region))?;

        let mut draft = ThreadDraft::new(intention, time, region);
        draft.title = req.title;

        let mut state = self.state.lock().await;
        let thread = state
            .weave(draft)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        let failures = state.flush().await;
        json_result_with(&thread, &failures)
    }

    #[tool(
        description = "Run anomaly detection over the ledger, or over its first `at` threads to replay history. Returns the DEFCON level (5 calm, 1 critical), threats, dominant intention, balance score, per-region zones and a momentum/balance horizon."
    )]
    async fn tap_assess(
        &self,
        Parameters(req): Parameters<AssessRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let report = match req.at {
            None => state.assess(),
            Some(count) => state
                .assess_at(count)
                .map_err(|e| McpError::invalid_params(e.to_string(), None))?,
        };
        json_result(&report)
    }

    #[tool(
        description = "Rank other threads by TF-IDF similarity to a stored thread. Scores are 0-100; exact duplicates score 100."
    )]
    async fn tap_query(
        &self,
        Parameters(req): Parameters<QueryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let matches = state
            .query(&req.id, req.limit.unwrap_or(DEFAULT_QUERY_LIMIT))
            .ok_or_else(|| invalid("id", &req.id))?;
        json_result(&matches)
    }

    #[tool(
        description = "Assess the ledger and let the response engine apply its policy. Always appends one execution log entry and returns it."
    )]
    async fn tap_evaluate(&self) -> Result<CallToolResult, McpError> {
        let mut state = self.state.lock().await;
        let entry = state
            .evaluate()
            .map_err(|e| McpError::internal_error(format!("{e:#}"), None))?;
        let failures = state.drain_notifications();
        json_result_with(&entry, &failures)
    }

    #[tool(
        description = "Log a manual action that bypasses policy and engine status."
    )]
    async fn tap_override(
        &self,
        Parameters(req): Parameters<OverrideRequest>,
    ) -> Result<CallToolResult, McpError> {
        let action = ActionKind::parse(&req.action).ok_or_else(|| invalid("action", &req.action))?;
        let target = match req.target.as_deref() {
            None => None,
            Some(raw) => Some(
                Region::parse_strict(raw)
                    .filter(|v| v.is_known())
                    .ok_or_else(|| invalid("target", raw))?,
            ),
        };

        let mut state = self.state.lock().await;
        let entry = state
            .manual_override(ManualCommand { action, target })
            .map_err(|e| McpError::internal_error(format!("{e:#}"), None))?;
        let failures = state.drain_notifications();
        json_result_with(&entry, &failures)
    }

    #[tool(description = "Read the execution log, oldest first.")]
    async fn tap_log(
        &self,
        Parameters(req): Parameters<LogRequest>,
    ) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let log = state.execution_log();
        let start = req.limit.map_or(0, |n| log.len().saturating_sub(n));
        json_result(&serde_json::json!({
            "status": state.status(),
            "entries": &log[start..],
        }))
    }

    #[tool(description = "Export the full ledger as a scroll (JSON array of thread records).")]
    async fn tap_export(&self) -> Result<CallToolResult, McpError> {
        let state = self.state.lock().await;
        let scroll = state
            .export()
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(scroll)]))
    }
}

#[tool_handler]
impl ServerHandler for TapServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Tapestry records user actions as threads in an append-only, hash-chained ledger.\n\n\
                 - tap_weave appends a thread.\n\
                 - tap_assess grades the ledger for surges, congestion, polarization and malformed data; `at` replays an earlier point.\n\
                 - Mutating tools append a `warnings` block when a ledger write failed.\n\
                 - tap_query finds threads similar to a stored one.\n\
                 - tap_evaluate runs the response policy and logs the outcome; tap_override logs a manual action.\n\
                 - tap_log and tap_export read state without changing it."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
