//! Progressive search strategy cascade
//!
//! One mailbox search runs an ordered cascade of strategies per folder until
//! one yields a usable result:
//!
//! 1. Index-accelerated subject+body phrase query, bounded by a 30s deadline.
//!    Near-instant when the index is healthy and matches the desktop
//!    client's own search semantics. A timeout or index failure falls
//!    through; a successful query with zero hits is terminal.
//! 2. Subject-only filter, always available. A non-empty result is terminal;
//!    an empty one keeps cascading since the filter cannot see bodies.
//! 3. Bounded manual iteration over folder contents, last resort.
//!
//! With `AllFolders` scope the same cascade additionally runs against Sent
//! Items and Drafts, sharing the mailbox's running cap. Collection stops as
//! soon as the cap is reached.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::timeout;

use crate::config::BridgeConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{
    EmailRecord, MailboxHandle, MailboxKind, SearchRequest, SearchScope, StrategyKind,
};
use crate::store::adapter::StoreWorker;
use crate::store::{FolderKind, MailboxRoot, MessageRef};

/// Deadline for the index-accelerated strategy
pub const INDEX_SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound on items examined by one manual folder scan
pub const MAX_MANUAL_SCAN_ITEMS: usize = 500;

/// Strategies in attempt order
const CASCADE: [StrategyKind; 3] = [
    StrategyKind::IndexSearch,
    StrategyKind::SubjectFilter,
    StrategyKind::ManualScan,
];

/// One mailbox's search contribution
#[derive(Debug)]
pub struct MailboxOutcome {
    /// Extracted records, newest first
    pub records: Vec<EmailRecord>,
    /// Strategy that produced the inbox matches
    pub strategy: StrategyKind,
    /// True when the cap cut collection short
    pub truncated: bool,
}

/// A recoverable strategy failure, absorbed by the cascade
#[derive(Debug)]
struct StrategyFailure {
    kind: StrategyKind,
    reason: String,
}

/// Search one mailbox with the full cascade
///
/// Matching references are deduplicated by entry id across folders, then
/// extracted into owned records in batches. The per-mailbox cap equals the
/// request cap; the global cap is enforced at concatenation time by the
/// caller.
///
/// # Errors
///
/// Returns `StrategyFailed` only when every strategy fails for the inbox;
/// failures in expansion folders are logged and skipped.
pub async fn search_mailbox(
    worker: &mut StoreWorker,
    handle: &MailboxHandle,
    request: &SearchRequest,
    config: &BridgeConfig,
) -> AppResult<MailboxOutcome> {
    let folders: &[FolderKind] = match request.scope {
        SearchScope::InboxOnly => &[FolderKind::Inbox],
        SearchScope::AllFolders => &[FolderKind::Inbox, FolderKind::SentItems, FolderKind::Drafts],
    };

    let mut found_ids: HashSet<String> = HashSet::new();
    let mut matches: Vec<MessageRef> = Vec::new();
    let mut inbox_strategy = StrategyKind::IndexSearch;
    let mut truncated = false;

    for (position, &folder) in folders.iter().enumerate() {
        if matches.len() >= request.cap {
            truncated = true;
            break;
        }
        let remaining = request.cap - matches.len();

        let outcome = run_cascade(
            worker,
            &handle.root,
            folder,
            handle.kind,
            request,
            remaining,
            config,
        )
        .await;
        let (strategy, folder_matches) = match outcome {
            Ok(found) => found,
            Err(e) if position == 0 => return Err(e),
            Err(e) => {
                tracing::warn!(folder = folder.display_name(), mailbox = %handle.kind, error = %e, "skipping expansion folder");
                continue;
            }
        };
        if position == 0 {
            inbox_strategy = strategy;
        }

        let mut kept = 0usize;
        let total = folder_matches.len();
        for message in folder_matches {
            if matches.len() >= request.cap {
                break;
            }
            if found_ids.insert(message.entry_id.clone()) {
                matches.push(message);
                kept += 1;
            }
        }
        if kept < total && matches.len() >= request.cap {
            truncated = true;
        }
    }

    let records = worker.fetch_details(&matches, handle.kind).await?;
    tracing::info!(
        mailbox = %handle.kind,
        strategy = %inbox_strategy,
        count = records.len(),
        "mailbox search complete"
    );
    Ok(MailboxOutcome {
        records,
        strategy: inbox_strategy,
        truncated,
    })
}

/// Try each strategy in order until one yields a usable result
async fn run_cascade(
    worker: &mut StoreWorker,
    root: &MailboxRoot,
    folder: FolderKind,
    mailbox: MailboxKind,
    request: &SearchRequest,
    remaining_cap: usize,
    config: &BridgeConfig,
) -> AppResult<(StrategyKind, Vec<MessageRef>)> {
    let mut failures: Vec<StrategyFailure> = Vec::new();
    let mut empty_success: Option<StrategyKind> = None;

    for kind in CASCADE {
        match run_strategy(
            worker,
            kind,
            root,
            folder,
            mailbox,
            request,
            remaining_cap,
            config,
        )
        .await
        {
            Ok(found) => {
                // a subject-only filter cannot see bodies, so an empty
                // success there is not terminal
                if !found.is_empty() || kind != StrategyKind::SubjectFilter {
                    return Ok((kind, found));
                }
                empty_success = Some(kind);
            }
            Err(failure) => {
                tracing::warn!(
                    strategy = %failure.kind,
                    folder = folder.display_name(),
                    reason = %failure.reason,
                    "strategy failed, falling through"
                );
                failures.push(failure);
            }
        }
    }

    if let Some(kind) = empty_success {
        return Ok((kind, Vec::new()));
    }
    let reasons = failures
        .iter()
        .map(|f| format!("{}: {}", f.kind, f.reason))
        .collect::<Vec<_>>()
        .join("; ");
    Err(AppError::StrategyFailed(format!(
        "no strategy succeeded for {} ({reasons})",
        folder.display_name()
    )))
}

/// Uniform strategy entry point used by the cascade driver
#[allow(clippy::too_many_arguments)]
async fn run_strategy(
    worker: &mut StoreWorker,
    kind: StrategyKind,
    root: &MailboxRoot,
    folder: FolderKind,
    mailbox: MailboxKind,
    request: &SearchRequest,
    remaining_cap: usize,
    config: &BridgeConfig,
) -> Result<Vec<MessageRef>, StrategyFailure> {
    match kind {
        StrategyKind::IndexSearch => {
            match timeout(
                INDEX_SEARCH_TIMEOUT,
                worker.search_index(root, folder, &request.phrase),
            )
            .await
            {
                Ok(Ok(found)) => Ok(found),
                Ok(Err(e)) => Err(StrategyFailure {
                    kind,
                    reason: e.to_string(),
                }),
                Err(_) => Err(StrategyFailure {
                    kind,
                    reason: format!("no answer within {}s", INDEX_SEARCH_TIMEOUT.as_secs()),
                }),
            }
        }
        StrategyKind::SubjectFilter => worker
            .filter_subjects(root, folder, &request.phrase)
            .await
            .map_err(|e| StrategyFailure {
                kind,
                reason: e.to_string(),
            }),
        StrategyKind::ManualScan => {
            manual_scan(worker, root, folder, mailbox, request, remaining_cap, config)
                .await
                .map_err(|reason| StrategyFailure { kind, reason })
        }
    }
}

/// Linear scan of folder contents, bounded by the cap and a scan limit
///
/// Matches the phrase case-insensitively against the subject, and against a
/// body prefix of `max_search_body_chars` characters when that limit is
/// non-zero. Unreadable items are skipped.
#[allow(clippy::too_many_arguments)]
async fn manual_scan(
    worker: &mut StoreWorker,
    root: &MailboxRoot,
    folder: FolderKind,
    mailbox: MailboxKind,
    request: &SearchRequest,
    remaining_cap: usize,
    config: &BridgeConfig,
) -> Result<Vec<MessageRef>, String> {
    let needle = request.phrase.trim().to_lowercase();
    let page_size = config.batch_processing_size.max(1);
    let mut matches = Vec::new();
    let mut scanned = 0usize;
    let mut offset = 0usize;

    while scanned < MAX_MANUAL_SCAN_ITEMS && matches.len() < remaining_cap {
        let page = worker
            .list_page(root, folder, offset, page_size)
            .await
            .map_err(|e| e.to_string())?;
        if page.is_empty() {
            break;
        }
        offset += page.len();

        for message in page {
            if scanned >= MAX_MANUAL_SCAN_ITEMS || matches.len() >= remaining_cap {
                break;
            }
            scanned += 1;

            let record = match worker.fetch_detail(&message, mailbox).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::debug!(entry_id = %message.entry_id, error = %e, "manual scan skipping item");
                    continue;
                }
            };
            if record_matches(&record, &needle, config.max_search_body_chars) {
                matches.push(message);
            }
        }
    }
    Ok(matches)
}

fn record_matches(record: &EmailRecord, needle: &str, body_char_limit: usize) -> bool {
    if record.subject.to_lowercase().contains(needle) {
        return true;
    }
    if body_char_limit == 0 {
        return false;
    }
    let prefix: String = record.body.chars().take(body_char_limit).collect();
    prefix.to_lowercase().contains(needle)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use crate::config::BridgeConfig;
    use crate::models::{MailboxKind, SearchRequest, SearchScope, StrategyKind};
    use crate::store::adapter::{StoreAdapter, StoreWorker};
    use crate::store::memory::{MemoryStore, StoredMessage};
    use crate::store::FolderKind;

    use super::{search_mailbox, MailboxOutcome};

    async fn worker_for(store: &MemoryStore, config: &BridgeConfig) -> StoreWorker {
        let adapter = StoreAdapter::new(Arc::new(store.clone()), Arc::new(config.clone()));
        adapter.connect().await.expect("connect");
        adapter.worker().await.expect("worker")
    }

    async fn run_personal(
        store: &MemoryStore,
        config: &BridgeConfig,
        request: &SearchRequest,
    ) -> MailboxOutcome {
        let mut worker = worker_for(store, config).await;
        let handle = worker
            .resolve_mailbox(MailboxKind::Personal, config)
            .await
            .expect("resolve personal");
        search_mailbox(&mut worker, &handle, request, config)
            .await
            .expect("search must succeed")
    }

    fn message(id: &str, subject: &str, body: &str, hour: u32) -> StoredMessage {
        StoredMessage::new(
            id,
            subject,
            body,
            "sender@example.com",
            Utc.with_ymd_and_hms(2026, 8, 15, hour, 0, 0).unwrap(),
        )
    }

    fn request(phrase: &str) -> SearchRequest {
        SearchRequest::new(
            phrase,
            vec![MailboxKind::Personal],
            SearchScope::InboxOnly,
            100,
        )
    }

    #[tokio::test]
    async fn index_search_wins_when_available() {
        let store = MemoryStore::new();
        store.seed(
            FolderKind::Inbox,
            false,
            message("m-1", "weekly report", "the outage is resolved", 9),
        );
        let config = BridgeConfig::default();

        let outcome = run_personal(&store, &config, &request("outage")).await;
        assert_eq!(outcome.strategy, StrategyKind::IndexSearch);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].entry_id, "m-1");
    }

    #[tokio::test]
    async fn zero_hits_from_index_is_terminal() {
        let store = MemoryStore::new();
        store.seed(
            FolderKind::Inbox,
            false,
            message("m-1", "weekly report", "nothing relevant", 9),
        );
        let config = BridgeConfig::default();

        let outcome = run_personal(&store, &config, &request("ghost")).await;
        assert_eq!(outcome.strategy, StrategyKind::IndexSearch);
        assert!(outcome.records.is_empty());
    }

    #[tokio::test]
    async fn disabled_index_falls_through_to_subject_filter() {
        let store = MemoryStore::new();
        store.disable_index();
        store.seed(
            FolderKind::Inbox,
            false,
            message("m-1", "outage follow-up", "see thread", 9),
        );
        let config = BridgeConfig::default();

        let outcome = run_personal(&store, &config, &request("outage")).await;
        assert_eq!(outcome.strategy, StrategyKind::SubjectFilter);
        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn index_timeout_falls_through_to_subject_filter() {
        let store = MemoryStore::new();
        store.delay_index(Duration::from_secs(40));
        store.seed(
            FolderKind::Inbox,
            false,
            message("m-1", "outage follow-up", "see thread", 9),
        );
        let config = BridgeConfig::default();

        let outcome = run_personal(&store, &config, &request("outage")).await;
        assert_eq!(outcome.strategy, StrategyKind::SubjectFilter);
        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test]
    async fn empty_subject_filter_falls_through_to_manual_scan() {
        let store = MemoryStore::new();
        store.disable_index();
        store.seed(
            FolderKind::Inbox,
            false,
            message("m-1", "weekly report", "the outage started at 09:00", 9),
        );
        let config = BridgeConfig::default();

        let outcome = run_personal(&store, &config, &request("outage")).await;
        assert_eq!(outcome.strategy, StrategyKind::ManualScan);
        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test]
    async fn manual_scan_ignores_body_when_limit_is_zero() {
        let store = MemoryStore::new();
        store.disable_index();
        store.seed(
            FolderKind::Inbox,
            false,
            message("m-1", "weekly report", "the outage started at 09:00", 9),
        );
        let config = BridgeConfig {
            max_search_body_chars: 0,
            ..BridgeConfig::default()
        };

        let outcome = run_personal(&store, &config, &request("outage")).await;
        assert!(outcome.records.is_empty());
    }

    #[tokio::test]
    async fn cap_truncates_and_sets_flag() {
        let store = MemoryStore::new();
        for i in 0..10 {
            store.seed(
                FolderKind::Inbox,
                false,
                message(&format!("m-{i}"), "outage update", "details", i),
            );
        }
        let config = BridgeConfig::default();
        let capped = SearchRequest::new(
            "outage",
            vec![MailboxKind::Personal],
            SearchScope::InboxOnly,
            4,
        );

        let outcome = run_personal(&store, &config, &capped).await;
        assert_eq!(outcome.records.len(), 4);
        assert!(outcome.truncated);
    }

    #[tokio::test]
    async fn all_folders_scope_reaches_sent_items() {
        let store = MemoryStore::new();
        store.seed(
            FolderKind::Inbox,
            false,
            message("m-1", "outage update", "inbox copy", 9),
        );
        store.seed(
            FolderKind::SentItems,
            false,
            message("m-2", "RE: outage update", "our reply", 10),
        );
        let config = BridgeConfig::default();
        let all = SearchRequest::new(
            "outage",
            vec![MailboxKind::Personal],
            SearchScope::AllFolders,
            100,
        );

        let outcome = run_personal(&store, &config, &all).await;
        assert_eq!(outcome.records.len(), 2);
        let folders: Vec<&str> = outcome.records.iter().map(|r| r.folder.as_str()).collect();
        assert!(folders.contains(&"Sent Items"));
    }

    #[tokio::test]
    async fn no_live_handles_remain_after_search() {
        let store = MemoryStore::new();
        store.seed(
            FolderKind::Inbox,
            false,
            message("m-1", "outage update", "details", 9),
        );
        let config = BridgeConfig::default();

        let outcome = run_personal(&store, &config, &request("outage")).await;
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(store.live_handles(), 0);
    }
}
