//! Mailbox service layer
//!
//! Sits between the MCP tool surface and the store adapter. Owns the shared
//! result cache and fans one search request out to a task per mailbox, each
//! with its own store session. Per-mailbox failures degrade the result
//! instead of failing it; the whole search errors only when every requested
//! mailbox fails.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::Mutex;

use crate::cache::{CacheKey, SearchCache};
use crate::chain;
use crate::config::BridgeConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AlertAnalysisData, ConnectionStatus, EmailChainData, MailboxAccessData, MailboxFailure,
    MailboxKind, MailboxStrategy, PersonalMailboxStatus, SearchRequest, SearchResult, SearchScope,
    SharedMailboxStatus,
};
use crate::search::{search_mailbox, MailboxOutcome};
use crate::store::adapter::StoreAdapter;
use crate::store::MailStore;

/// Connection, cache, and search orchestration for all tools
pub struct MailboxService {
    adapter: Arc<StoreAdapter>,
    cache: Arc<Mutex<SearchCache>>,
    config: Arc<BridgeConfig>,
}

impl MailboxService {
    pub fn new(store: Arc<dyn MailStore>, config: Arc<BridgeConfig>) -> Self {
        let cache = SearchCache::new(config.cache_ttl(), config.cache_max_entries);
        Self {
            adapter: Arc::new(StoreAdapter::new(store, Arc::clone(&config))),
            cache: Arc::new(Mutex::new(cache)),
            config,
        }
    }

    /// Diagnose connection state and per-mailbox accessibility
    ///
    /// Mailbox-level problems are reported in the payload, never raised; an
    /// unconfigured shared mailbox is a normal state, not a defect.
    ///
    /// # Errors
    ///
    /// Returns `Connection` when the store is unreachable.
    pub async fn check_access(&self) -> AppResult<MailboxAccessData> {
        self.adapter.connect().await?;
        let mut worker = self.adapter.worker().await?;
        let mut errors: Vec<String> = Vec::new();

        let personal_mailbox = match worker
            .resolve_mailbox(MailboxKind::Personal, &self.config)
            .await
        {
            Ok(handle) => PersonalMailboxStatus {
                accessible: handle.accessible,
                name: Some(handle.display_name),
                retention_months: self.config.personal_retention_months,
            },
            Err(e) => {
                errors.push(format!("personal mailbox: {e}"));
                PersonalMailboxStatus {
                    accessible: false,
                    name: None,
                    retention_months: self.config.personal_retention_months,
                }
            }
        };

        let shared_mailbox = if !self.config.shared_configured() {
            SharedMailboxStatus {
                accessible: false,
                name: None,
                configured: false,
                retention_months: self.config.shared_retention_months,
            }
        } else {
            match worker
                .resolve_mailbox(MailboxKind::Shared, &self.config)
                .await
            {
                Ok(handle) => {
                    if !handle.accessible {
                        errors.push(format!(
                            "shared mailbox '{}': permission denied",
                            handle.display_name
                        ));
                    }
                    SharedMailboxStatus {
                        accessible: handle.accessible,
                        name: Some(handle.display_name),
                        configured: true,
                        retention_months: self.config.shared_retention_months,
                    }
                }
                Err(e) => {
                    errors.push(format!("shared mailbox: {e}"));
                    SharedMailboxStatus {
                        accessible: false,
                        name: None,
                        configured: true,
                        retention_months: self.config.shared_retention_months,
                    }
                }
            }
        };

        let status = if errors.is_empty() { "ok" } else { "degraded" };
        Ok(MailboxAccessData {
            status: status.to_owned(),
            connection: ConnectionStatus {
                connected: true,
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
            personal_mailbox,
            shared_mailbox,
            errors,
        })
    }

    /// Search for an email chain and group the matches into conversations
    pub async fn search_chain(
        &self,
        search_text: &str,
        include_personal: bool,
        include_shared: bool,
    ) -> AppResult<EmailChainData> {
        let request = self.build_request(search_text, include_personal, include_shared)?;
        let (result, from_cache) = self.search(request).await?;

        let conversations = chain::build_conversations(&result.records, &self.config);
        let summary = chain::build_summary(&result, conversations.len(), from_cache);
        Ok(EmailChainData {
            search_text: search_text.trim().to_owned(),
            conversations,
            summary,
        })
    }

    /// Search for an alert pattern and compute its history statistics
    pub async fn analyze_alert_history(
        &self,
        alert_pattern: &str,
        include_personal: bool,
        include_shared: bool,
    ) -> AppResult<AlertAnalysisData> {
        let request = self.build_request(alert_pattern, include_personal, include_shared)?;
        let (result, _) = self.search(request).await?;

        let mut data = chain::analyze_alerts(&result.records, alert_pattern.trim());
        data.failed_mailboxes = result.failures;
        Ok(data)
    }

    /// Translate tool inclusion flags into a concrete search request
    ///
    /// An unconfigured shared mailbox is silently dropped from the set as
    /// long as another mailbox remains.
    fn build_request(
        &self,
        phrase: &str,
        include_personal: bool,
        include_shared: bool,
    ) -> AppResult<SearchRequest> {
        if !include_personal && !include_shared {
            return Err(AppError::invalid(
                "at least one mailbox must be included in the search",
            ));
        }

        let mut mailboxes = Vec::new();
        if include_personal {
            mailboxes.push(MailboxKind::Personal);
        }
        if include_shared {
            if self.config.shared_configured() {
                mailboxes.push(MailboxKind::Shared);
            } else if mailboxes.is_empty() {
                return Err(AppError::MailboxNotFound(
                    "shared mailbox is not configured".to_owned(),
                ));
            } else {
                tracing::debug!("shared mailbox not configured, searching personal only");
            }
        }

        let scope = if self.config.search_all_folders {
            SearchScope::AllFolders
        } else {
            SearchScope::InboxOnly
        };
        Ok(SearchRequest::new(
            phrase.trim(),
            mailboxes,
            scope,
            self.config.max_search_results,
        ))
    }

    /// Run a search, serving from cache when a fresh entry exists
    async fn search(&self, request: SearchRequest) -> AppResult<(SearchResult, bool)> {
        let key = CacheKey::for_request(&request);
        if let Some(result) = self.cache.lock().await.get(&key) {
            tracing::debug!(phrase = %request.phrase, "search served from cache");
            return Ok((result, true));
        }

        let result = self.dispatch(&request).await?;
        self.cache.lock().await.put(key, result.clone());
        Ok((result, false))
    }

    /// Fan the request out to one task per mailbox and merge the outcomes
    ///
    /// Results are concatenated in request order; the global cap is enforced
    /// here, after each mailbox applied it locally. The merged record list
    /// never contains two records with the same entry id.
    async fn dispatch(&self, request: &SearchRequest) -> AppResult<SearchResult> {
        self.adapter.connect().await?;
        let started = Instant::now();

        let tasks = request.mailboxes.iter().map(|&kind| {
            let adapter = Arc::clone(&self.adapter);
            let config = Arc::clone(&self.config);
            let request = request.clone();
            tokio::spawn(async move {
                let outcome = search_one(adapter, config, request, kind).await;
                (kind, outcome)
            })
        });

        let mut records = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut mailbox_strategies: Vec<MailboxStrategy> = Vec::new();
        let mut failures: Vec<MailboxFailure> = Vec::new();
        let mut errors: Vec<AppError> = Vec::new();
        let mut truncated = false;

        for joined in join_all(tasks).await {
            let (kind, outcome) = joined
                .map_err(|e| AppError::Internal(format!("search task panicked: {e}")))?;
            match outcome {
                Ok(outcome) => {
                    truncated |= outcome.truncated;
                    mailbox_strategies.push(MailboxStrategy {
                        mailbox: kind,
                        strategy: outcome.strategy,
                    });
                    for record in outcome.records {
                        if records.len() >= request.cap {
                            truncated = true;
                            break;
                        }
                        if seen_ids.insert(record.entry_id.clone()) {
                            records.push(record);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(mailbox = %kind, error = %e, "mailbox search failed");
                    failures.push(MailboxFailure {
                        mailbox: kind,
                        reason: e.to_string(),
                    });
                    errors.push(e);
                }
            }
        }

        if mailbox_strategies.is_empty() {
            // nothing succeeded; a lone mailbox keeps its specific error
            return Err(match errors.len() {
                1 => errors.remove(0),
                _ => AppError::StrategyFailed(
                    failures
                        .iter()
                        .map(|f| format!("{}: {}", f.mailbox, f.reason))
                        .collect::<Vec<_>>()
                        .join("; "),
                ),
            });
        }

        Ok(SearchResult {
            records,
            mailbox_strategies,
            elapsed_ms: started.elapsed().as_millis() as u64,
            truncated,
            failures,
        })
    }
}

/// One mailbox's end-to-end search: own session, resolve, cascade
async fn search_one(
    adapter: Arc<StoreAdapter>,
    config: Arc<BridgeConfig>,
    request: SearchRequest,
    kind: MailboxKind,
) -> AppResult<MailboxOutcome> {
    let mut worker = adapter.worker().await?;
    let handle = worker.resolve_mailbox(kind, &config).await?;
    if !handle.accessible {
        return Err(AppError::NotAccessible(format!(
            "no permission for mailbox '{}'",
            handle.display_name
        )));
    }
    search_mailbox(&mut worker, &handle, &request, &config).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use crate::config::BridgeConfig;
    use crate::errors::AppError;
    use crate::models::MailboxKind;
    use crate::store::memory::{MemoryStore, StoredMessage};
    use crate::store::FolderKind;

    use super::MailboxService;

    fn service(store: &MemoryStore, config: BridgeConfig) -> MailboxService {
        MailboxService::new(Arc::new(store.clone()), Arc::new(config))
    }

    fn shared_config() -> BridgeConfig {
        BridgeConfig {
            shared_mailbox_email: "escalations@example.com".to_owned(),
            ..BridgeConfig::default()
        }
    }

    fn message(id: &str, subject: &str, body: &str, hour: u32) -> StoredMessage {
        StoredMessage::new(
            id,
            subject,
            body,
            "monitor@example.com",
            Utc.with_ymd_and_hms(2026, 8, 18, hour, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn check_access_reports_ok_without_shared_configuration() {
        let store = MemoryStore::new();
        let svc = service(&store, BridgeConfig::default());

        let data = svc.check_access().await.expect("check access");
        assert_eq!(data.status, "ok");
        assert!(data.connection.connected);
        assert!(data.personal_mailbox.accessible);
        assert!(!data.shared_mailbox.configured);
        assert!(!data.shared_mailbox.accessible);
        assert!(data.errors.is_empty());
    }

    #[tokio::test]
    async fn check_access_degrades_on_denied_shared_mailbox() {
        let store = MemoryStore::new();
        store.enable_shared("Operations Escalations");
        store.deny_shared_access();
        let svc = service(&store, shared_config());

        let data = svc.check_access().await.expect("check access");
        assert_eq!(data.status, "degraded");
        assert!(data.personal_mailbox.accessible);
        assert!(data.shared_mailbox.configured);
        assert!(!data.shared_mailbox.accessible);
        assert_eq!(data.errors.len(), 1);
    }

    #[tokio::test]
    async fn failing_shared_mailbox_degrades_but_returns_personal_results() {
        let store = MemoryStore::new();
        // shared is configured but does not resolve in the store
        store.seed(
            FolderKind::Inbox,
            false,
            message("p-1", "outage postmortem", "details inside", 9),
        );
        let svc = service(&store, shared_config());

        let data = svc
            .search_chain("outage", true, true)
            .await
            .expect("partial result");
        assert_eq!(data.summary.total_messages, 1);
        assert_eq!(data.conversations.len(), 1);
        assert_eq!(data.summary.failed_mailboxes.len(), 1);
        assert_eq!(data.summary.failed_mailboxes[0].mailbox, MailboxKind::Shared);
    }

    #[tokio::test]
    async fn all_mailboxes_failing_is_an_error() {
        let store = MemoryStore::new();
        let svc = service(&store, shared_config());

        let err = svc
            .search_chain("outage", false, true)
            .await
            .expect_err("lone failing mailbox must error");
        assert!(matches!(err, AppError::MailboxNotFound(_)));
    }

    #[tokio::test]
    async fn excluding_every_mailbox_is_rejected() {
        let store = MemoryStore::new();
        let svc = service(&store, BridgeConfig::default());

        let err = svc
            .search_chain("outage", false, false)
            .await
            .expect_err("must reject");
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unconfigured_shared_mailbox_is_skipped_silently() {
        let store = MemoryStore::new();
        store.seed(
            FolderKind::Inbox,
            false,
            message("p-1", "outage postmortem", "details", 9),
        );
        let svc = service(&store, BridgeConfig::default());

        let data = svc
            .search_chain("outage", true, true)
            .await
            .expect("personal-only search");
        assert_eq!(data.summary.total_messages, 1);
        assert!(data.summary.failed_mailboxes.is_empty());
    }

    #[tokio::test]
    async fn repeated_search_is_served_from_cache() {
        let store = MemoryStore::new();
        store.seed(
            FolderKind::Inbox,
            false,
            message("p-1", "outage postmortem", "details", 9),
        );
        let svc = service(&store, BridgeConfig::default());

        let first = svc.search_chain("outage", true, true).await.expect("first");
        assert!(!first.summary.from_cache);

        // new mail arrives; the cached entry must still be served as-is
        store.seed(
            FolderKind::Inbox,
            false,
            message("p-2", "outage update", "more details", 10),
        );
        let second = svc
            .search_chain("  OUTAGE ", true, true)
            .await
            .expect("second");
        assert!(second.summary.from_cache);
        assert_eq!(second.summary.total_messages, 1);
    }

    #[tokio::test]
    async fn global_cap_applies_across_mailboxes() {
        let store = MemoryStore::new();
        store.enable_shared("Operations Escalations");
        for i in 0..3 {
            store.seed(
                FolderKind::Inbox,
                false,
                message(&format!("p-{i}"), "outage update", "x", i),
            );
            store.seed(
                FolderKind::Inbox,
                true,
                message(&format!("s-{i}"), "outage update", "x", i),
            );
        }
        let config = BridgeConfig {
            max_search_results: 4,
            ..shared_config()
        };
        let svc = service(&store, config);

        let data = svc.search_chain("outage", true, true).await.expect("search");
        assert_eq!(data.summary.total_messages, 4);
        assert!(data.summary.truncated);
    }

    #[tokio::test]
    async fn alert_history_over_demo_data() {
        let store = MemoryStore::demo();
        let config = BridgeConfig {
            search_all_folders: true,
            ..shared_config()
        };
        let svc = service(&store, config);

        let data = svc
            .analyze_alert_history("ALERT-4417", true, true)
            .await
            .expect("analysis");
        assert_eq!(data.total_matches, 4);
        assert!(data.urgency.urgent >= 1);
        assert_eq!(data.per_day.len(), 1);
        assert!(data.failed_mailboxes.is_empty());
        assert!(data.summary.contains("ALERT-4417"));
    }
}
