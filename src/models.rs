//! Domain records and tool DTOs
//!
//! Defines the owned record types that flow between the store adapter, search
//! cascade, cache, and formatter, plus the schema-bearing structures used in
//! MCP tool contracts. Tool-facing types are annotated with `JsonSchema` for
//! automatic schema generation.

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::store::MailboxRoot;

/// Mailbox identity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum MailboxKind {
    /// The signed-in user's own mailbox
    Personal,
    /// A shared mailbox resolved by configured email address
    Shared,
}

impl MailboxKind {
    /// Stable lowercase label used in payloads and cache keys
    pub fn label(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Shared => "shared",
        }
    }
}

impl std::fmt::Display for MailboxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Folder scope for one search request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// Inbox only
    InboxOnly,
    /// Inbox plus Sent Items and Drafts
    AllFolders,
}

/// Search strategy that produced a folder's matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Index-accelerated combined subject+body phrase query
    IndexSearch,
    /// Subject-only filter, always available
    SubjectFilter,
    /// Bounded linear scan of folder contents
    ManualScan,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::IndexSearch => "index_search",
            Self::SubjectFilter => "subject_filter",
            Self::ManualScan => "manual_scan",
        };
        f.write_str(label)
    }
}

/// One validated search invocation
///
/// Immutable once constructed; mailbox order is the caller's request order
/// with duplicates removed, and determines result concatenation order.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Non-empty search phrase
    pub phrase: String,
    /// Mailboxes to search, request order preserved
    pub mailboxes: Vec<MailboxKind>,
    /// Folder scope
    pub scope: SearchScope,
    /// Global cap on returned records across all mailboxes
    pub cap: usize,
}

impl SearchRequest {
    /// Build a request, deduplicating mailboxes while preserving order
    pub fn new(
        phrase: impl Into<String>,
        mailboxes: Vec<MailboxKind>,
        scope: SearchScope,
        cap: usize,
    ) -> Self {
        let mut deduped = Vec::with_capacity(mailboxes.len());
        for kind in mailboxes {
            if !deduped.contains(&kind) {
                deduped.push(kind);
            }
        }
        Self {
            phrase: phrase.into(),
            mailboxes: deduped,
            scope,
            cap,
        }
    }
}

/// A resolved mailbox, created at connection time
///
/// Read-only after creation; lives for the process session.
#[derive(Debug, Clone)]
pub struct MailboxHandle {
    /// Identity of this mailbox
    pub kind: MailboxKind,
    /// Display name reported by the store
    pub display_name: String,
    /// Opaque root-folder reference within the store
    pub root: MailboxRoot,
    /// Whether the current user can read this mailbox
    pub accessible: bool,
    /// Retention hint in months; informational only, never enforced
    pub retention_months: Option<u32>,
}

/// Owned, plain email record
///
/// Produced by the store adapter from a native message handle; holds no live
/// reference to the native object. Bodies and recipient lists are stored at
/// full fidelity; truncation happens at format time so cached entries survive
/// configuration changes.
#[derive(Debug, Clone, Serialize)]
pub struct EmailRecord {
    /// Store-assigned stable message identifier
    pub entry_id: String,
    pub subject: String,
    pub body: String,
    pub sender_name: String,
    pub sender_email: String,
    pub recipients: Vec<String>,
    pub received_at: DateTime<Utc>,
    /// Source folder display name
    pub folder: String,
    /// Source mailbox identity
    pub mailbox: MailboxKind,
    /// Store conversation key, when the store tracks threads
    pub thread_key: Option<String>,
    /// Importance level (0 low, 1 normal, 2 high)
    pub importance: u8,
    pub unread: bool,
    pub attachment_count: u32,
    pub size_bytes: u64,
}

/// Which strategy produced one mailbox's contribution
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct MailboxStrategy {
    pub mailbox: MailboxKind,
    pub strategy: StrategyKind,
}

/// Per-mailbox failure annotation for partial results
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct MailboxFailure {
    pub mailbox: MailboxKind,
    pub reason: String,
}

/// Aggregated outcome of one search dispatch
///
/// Invariants: `records.len()` never exceeds the request cap, and no two
/// records share an `entry_id`.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Matched records, concatenated mailbox-by-mailbox in request order,
    /// newest first within each mailbox's contribution
    pub records: Vec<EmailRecord>,
    /// Winning strategy per contributing mailbox
    pub mailbox_strategies: Vec<MailboxStrategy>,
    /// Wall-clock time spent searching
    pub elapsed_ms: u64,
    /// True when the cap was hit before the store was exhausted
    pub truncated: bool,
    /// Mailboxes that failed, with reasons; partial results still returned
    pub failures: Vec<MailboxFailure>,
}

/// Metadata included in all tool responses
///
/// Provides timing information and current UTC timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Meta {
    /// Current UTC timestamp in RFC 3339 format with milliseconds
    pub now_utc: String,
    /// Tool execution duration in milliseconds
    pub duration_ms: u64,
}

impl Meta {
    /// Create metadata populated with current time and elapsed duration
    pub fn now(duration_ms: u64) -> Self {
        Self {
            now_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms,
        }
    }
}

/// Standard response envelope for all tools
///
/// Wraps tool-specific data with human-readable summary and execution metadata.
/// This structure provides consistent response shape across all MCP tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolEnvelope<T>
where
    T: JsonSchema,
{
    /// Human-readable summary of the operation outcome
    pub summary: String,
    /// Tool-specific data payload
    pub data: T,
    /// Execution metadata (timestamp, duration)
    pub meta: Meta,
}

/// Connection state reported by `check_mailbox_access`
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ConnectionStatus {
    pub connected: bool,
    /// RFC 3339 timestamp of the check
    pub timestamp: String,
}

/// Per-mailbox accessibility report
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct PersonalMailboxStatus {
    pub accessible: bool,
    pub name: Option<String>,
    pub retention_months: u32,
}

/// Shared mailbox accessibility report
///
/// `configured=false` means no shared address is set and resolution was
/// never attempted.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SharedMailboxStatus {
    pub accessible: bool,
    pub name: Option<String>,
    pub configured: bool,
    pub retention_months: u32,
}

/// Result payload of `check_mailbox_access`
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct MailboxAccessData {
    /// `"ok"` when every configured mailbox is accessible, else `"degraded"`
    pub status: String,
    pub connection: ConnectionStatus,
    pub personal_mailbox: PersonalMailboxStatus,
    pub shared_mailbox: SharedMailboxStatus,
    /// Per-mailbox error descriptions; empty when everything is accessible
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// One formatted message inside a conversation
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct MessageView {
    pub subject: String,
    pub sender_name: String,
    pub sender_email: String,
    /// Capped to `max_recipients_display`
    pub recipients: Vec<String>,
    /// Recipients dropped by the display cap
    #[serde(skip_serializing_if = "is_zero")]
    pub recipients_omitted: usize,
    /// RFC 3339 receive timestamp
    pub received_at: String,
    pub folder: String,
    pub mailbox: MailboxKind,
    pub importance: u8,
    pub unread: bool,
    pub attachment_count: u32,
    /// Body, HTML-flattened and truncated per configuration
    pub body: String,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

/// First/last activity of a conversation or result set
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct Timeline {
    pub first: String,
    pub last: String,
}

/// Computed statistics for one conversation
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ConversationStats {
    pub message_count: usize,
    pub participant_count: usize,
    /// Message counts per mailbox label
    pub mailbox_counts: BTreeMap<String, usize>,
    /// Message counts per source folder
    pub folder_counts: BTreeMap<String, usize>,
}

/// A grouped email conversation, ordered chronologically
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ConversationView {
    /// Normalized subject or store thread topic
    pub topic: String,
    /// Distinct senders and recipients across the conversation
    pub participants: Vec<String>,
    pub timeline: Timeline,
    pub messages: Vec<MessageView>,
    pub stats: ConversationStats,
}

/// Aggregate summary of one `get_email_chain` result
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ChainSummary {
    pub total_messages: usize,
    pub conversation_count: usize,
    /// Message counts per mailbox label
    pub mailbox_counts: BTreeMap<String, usize>,
    pub date_range: Option<Timeline>,
    /// Winning strategy per contributing mailbox
    pub strategies: Vec<MailboxStrategy>,
    /// Mailboxes that failed during this search
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_mailboxes: Vec<MailboxFailure>,
    /// True when this response was served from the result cache
    pub from_cache: bool,
    /// True when the result cap was hit before the store was exhausted
    pub truncated: bool,
    /// Search time of the underlying (possibly cached) result
    pub search_elapsed_ms: u64,
}

/// Result payload of `get_email_chain`
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct EmailChainData {
    pub search_text: String,
    pub conversations: Vec<ConversationView>,
    pub summary: ChainSummary,
}

/// Sender frequency entry for alert analysis
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SenderCount {
    pub sender: String,
    pub count: usize,
}

/// Urgency classification counts
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct UrgencyBreakdown {
    pub urgent: usize,
    pub warning: usize,
    pub normal: usize,
}

/// Result payload of `analyze_alert_history`
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct AlertAnalysisData {
    pub alert_pattern: String,
    pub total_matches: usize,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
    /// Match counts per UTC day (`YYYY-MM-DD`)
    pub per_day: BTreeMap<String, usize>,
    pub top_senders: Vec<SenderCount>,
    pub urgency: UrgencyBreakdown,
    pub summary: String,
    /// Mailboxes that failed during the underlying search
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_mailboxes: Vec<MailboxFailure>,
}

/// Input: search for an email chain
///
/// Used by `get_email_chain`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetEmailChainInput {
    /// Exact phrase to search for in subject and body
    pub search_text: String,
    /// Search the personal mailbox (default true)
    #[serde(default = "default_true")]
    pub include_personal: bool,
    /// Search the shared mailbox (default true)
    #[serde(default = "default_true")]
    pub include_shared: bool,
}

/// Input: analyze an alert pattern's history
///
/// Used by `analyze_alert_history`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AnalyzeAlertHistoryInput {
    /// Alert identifier or phrase to look for (e.g. an error code)
    pub alert_pattern: String,
    /// Search the personal mailbox (default true)
    #[serde(default = "default_true")]
    pub include_personal: bool,
    /// Search the shared mailbox (default true)
    #[serde(default = "default_true")]
    pub include_shared: bool,
}

/// Default value for `bool` fields (true)
fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::{MailboxKind, SearchRequest, SearchScope};

    #[test]
    fn search_request_dedups_mailboxes_preserving_order() {
        let request = SearchRequest::new(
            "outage",
            vec![
                MailboxKind::Shared,
                MailboxKind::Personal,
                MailboxKind::Shared,
            ],
            SearchScope::InboxOnly,
            100,
        );
        assert_eq!(
            request.mailboxes,
            vec![MailboxKind::Shared, MailboxKind::Personal]
        );
    }
}
