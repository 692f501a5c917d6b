//! MCP server implementation with tool handlers
//!
//! Implements the `ServerHandler` trait and registers the three bridge
//! tools. Input validation happens here, before any store interaction;
//! orchestration lives in [`MailboxService`].

use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{Json, ServerHandler, tool, tool_handler, tool_router};

use crate::errors::{AppError, AppResult};
use crate::mailbox::MailboxService;
use crate::models::{
    AlertAnalysisData, AnalyzeAlertHistoryInput, EmailChainData, GetEmailChainInput,
    MailboxAccessData, Meta, ToolEnvelope,
};

/// Maximum length of a search phrase or alert pattern
const MAX_SEARCH_TEXT_LEN: usize = 256;

/// Mailbox bridge MCP server
///
/// Holds the shared mailbox service. Implements MCP tool handlers via the
/// `#[tool]` attribute macro and `ServerHandler` trait.
#[derive(Clone)]
pub struct MailBridgeServer {
    /// Connection, cache, and search orchestration
    service: Arc<MailboxService>,
    /// Tool router for dispatching MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MailBridgeServer {
    pub fn new(service: Arc<MailboxService>) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }

    /// Tool: Diagnose mail client connectivity and mailbox access
    ///
    /// Reports connection state, per-mailbox accessibility, and configured
    /// retention hints. Mailbox-level problems appear in the payload rather
    /// than failing the call.
    #[tool(
        name = "check_mailbox_access",
        description = "Check mail client connectivity and mailbox accessibility"
    )]
    async fn check_mailbox_access(
        &self,
    ) -> Result<Json<ToolEnvelope<MailboxAccessData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.service.check_access().await.map(|data| {
                let summary = format!(
                    "Mailbox access {} ({} issue(s))",
                    data.status,
                    data.errors.len()
                );
                (summary, data)
            }),
        )
    }

    /// Tool: Find an email chain by exact phrase
    ///
    /// Searches subject and body across the requested mailboxes and returns
    /// matches grouped into conversations with per-conversation statistics.
    #[tool(
        name = "get_email_chain",
        description = "Search mailboxes for an exact phrase and return grouped conversations"
    )]
    async fn get_email_chain(
        &self,
        Parameters(input): Parameters<GetEmailChainInput>,
    ) -> Result<Json<ToolEnvelope<EmailChainData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.get_email_chain_impl(input).await)
    }

    /// Tool: Analyze an alert pattern's history
    ///
    /// Searches for the pattern and reports frequency per day, top senders,
    /// and an urgency breakdown over the matches.
    #[tool(
        name = "analyze_alert_history",
        description = "Analyze frequency, senders, and urgency of emails matching an alert pattern"
    )]
    async fn analyze_alert_history(
        &self,
        Parameters(input): Parameters<AnalyzeAlertHistoryInput>,
    ) -> Result<Json<ToolEnvelope<AlertAnalysisData>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.analyze_alert_history_impl(input).await)
    }
}

/// MCP server handler implementation
///
/// Provides server info and capabilities to the MCP client.
#[tool_handler(router = self.tool_router)]
impl ServerHandler for MailBridgeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            "Local mailbox bridge. Exposes the desktop mail client's personal and shared mailboxes: check_mailbox_access for diagnostics, get_email_chain for phrase search grouped into conversations, analyze_alert_history for alert-pattern statistics. All access is read-only.",
        )
    }
}

/// Tool implementation methods
///
/// Private methods handle validation and delegation for each tool, separated
/// from the public `#[tool]` methods that handle response formatting.
impl MailBridgeServer {
    async fn get_email_chain_impl(
        &self,
        input: GetEmailChainInput,
    ) -> AppResult<(String, EmailChainData)> {
        validate_search_text(&input.search_text)?;
        let data = self
            .service
            .search_chain(
                &input.search_text,
                input.include_personal,
                input.include_shared,
            )
            .await?;
        let summary = format!(
            "{} message(s) in {} conversation(s){}",
            data.summary.total_messages,
            data.summary.conversation_count,
            if data.summary.from_cache {
                " (cached)"
            } else {
                ""
            }
        );
        Ok((summary, data))
    }

    async fn analyze_alert_history_impl(
        &self,
        input: AnalyzeAlertHistoryInput,
    ) -> AppResult<(String, AlertAnalysisData)> {
        validate_search_text(&input.alert_pattern)?;
        let data = self
            .service
            .analyze_alert_history(
                &input.alert_pattern,
                input.include_personal,
                input.include_shared,
            )
            .await?;
        let summary = data.summary.clone();
        Ok((summary, data))
    }
}

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Build a standardized MCP tool response envelope from business logic output
fn finalize_tool<T>(
    started: Instant,
    result: AppResult<(String, T)>,
) -> Result<Json<ToolEnvelope<T>>, ErrorData>
where
    T: schemars::JsonSchema,
{
    match result {
        Ok((summary, data)) => Ok(Json(ToolEnvelope {
            summary,
            data,
            meta: Meta::now(duration_ms(started)),
        })),
        Err(e) => Err(e.to_error_data()),
    }
}

/// Validate a search phrase or alert pattern
///
/// Runs before any store interaction: the phrase must be non-empty after
/// trimming, at most 256 characters, and free of control characters.
fn validate_search_text(input: &str) -> AppResult<()> {
    if input.trim().is_empty() {
        return Err(AppError::invalid("search text must not be empty"));
    }
    if input.len() > MAX_SEARCH_TEXT_LEN {
        return Err(AppError::invalid(format!(
            "search text must be at most {MAX_SEARCH_TEXT_LEN} characters"
        )));
    }
    if input.chars().any(|ch| ch.is_control()) {
        return Err(AppError::invalid(
            "search text must not contain control characters",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_search_text;

    #[test]
    fn accepts_ordinary_phrases() {
        validate_search_text("ALERT-4417 database pool").expect("must be valid");
    }

    #[test]
    fn rejects_empty_and_whitespace_only_text() {
        assert!(validate_search_text("").is_err());
        assert!(validate_search_text("   ").is_err());
    }

    #[test]
    fn rejects_control_characters() {
        let err = validate_search_text("alert\nhistory").expect_err("must fail");
        assert!(err.to_string().contains("control characters"));
    }

    #[test]
    fn rejects_overlong_text() {
        let long = "x".repeat(300);
        let err = validate_search_text(&long).expect_err("must fail");
        assert!(err.to_string().contains("256"));
    }
}
