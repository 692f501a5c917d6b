//! End-to-end flows through the mailbox access layer
//!
//! Drives [`MailboxService`] against the seeded in-memory store, the same
//! path the binary's `--demo` mode serves.

use std::sync::Arc;

use mail_bridge_mcp_rs::config::BridgeConfig;
use mail_bridge_mcp_rs::mailbox::MailboxService;
use mail_bridge_mcp_rs::models::MailboxKind;
use mail_bridge_mcp_rs::store::memory::MemoryStore;

fn demo_service() -> MailboxService {
    let config = BridgeConfig {
        shared_mailbox_email: "escalations@example.com".to_owned(),
        search_all_folders: true,
        ..BridgeConfig::default()
    };
    MailboxService::new(Arc::new(MemoryStore::demo()), Arc::new(config))
}

#[tokio::test]
async fn demo_seed_reports_full_access() {
    let svc = demo_service();

    let access = svc.check_access().await.expect("check access");
    assert_eq!(access.status, "ok");
    assert!(access.personal_mailbox.accessible);
    assert!(access.shared_mailbox.configured);
    assert!(access.shared_mailbox.accessible);
    assert_eq!(
        access.shared_mailbox.name.as_deref(),
        Some("Operations Escalations")
    );
}

#[tokio::test]
async fn demo_seed_serves_a_grouped_chain() {
    let svc = demo_service();

    let data = svc
        .search_chain("ALERT-4417", true, true)
        .await
        .expect("chain search");

    // four seeded messages form one conversation across both mailboxes
    assert_eq!(data.summary.total_messages, 4);
    assert_eq!(data.conversations.len(), 1);
    let conversation = &data.conversations[0];
    assert_eq!(conversation.stats.message_count, 4);
    assert_eq!(conversation.stats.mailbox_counts.len(), 2);

    // chronological inside the conversation
    let times: Vec<&str> = conversation
        .messages
        .iter()
        .map(|m| m.received_at.as_str())
        .collect();
    let mut sorted = times.clone();
    sorted.sort();
    assert_eq!(times, sorted);

    assert!(data.summary.failed_mailboxes.is_empty());
    assert!(!data.summary.from_cache);
}

#[tokio::test]
async fn personal_only_search_excludes_shared_matches() {
    let svc = demo_service();

    let data = svc
        .search_chain("ALERT-4417", true, false)
        .await
        .expect("personal-only search");
    assert_eq!(data.summary.total_messages, 2);
    assert!(data
        .conversations
        .iter()
        .flat_map(|c| &c.messages)
        .all(|m| m.mailbox == MailboxKind::Personal));
}

#[tokio::test]
async fn repeated_chain_search_hits_the_cache() {
    let svc = demo_service();

    let first = svc
        .search_chain("ALERT-4417", true, true)
        .await
        .expect("first search");
    assert!(!first.summary.from_cache);

    let second = svc
        .search_chain("alert-4417", true, true)
        .await
        .expect("second search");
    assert!(second.summary.from_cache);
    assert_eq!(
        second.summary.total_messages,
        first.summary.total_messages
    );
}

#[tokio::test]
async fn alert_analysis_shares_the_search_path() {
    let svc = demo_service();

    let data = svc
        .analyze_alert_history("ALERT-4417", true, true)
        .await
        .expect("analysis");
    assert_eq!(data.total_matches, 4);
    assert_eq!(data.urgency.urgent, 4);
    assert!(data.first_seen.is_some());
    assert!(data.last_seen.is_some());
    assert_eq!(data.per_day.get("2026-08-20"), Some(&4));
}
