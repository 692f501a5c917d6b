//! Conversation grouping, formatting, and alert statistics
//!
//! Groups raw records into conversations keyed by store thread key when
//! present, else by normalized subject (lowercased, reply/forward prefixes
//! stripped). Each conversation is ordered chronologically; conversations are
//! ordered newest-activity-first. Display limits (`max_body_chars`,
//! `max_recipients_display`, HTML flattening) are applied here at format
//! time, never at fetch time, so cached records keep full fidelity.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::config::BridgeConfig;
use crate::models::{
    AlertAnalysisData, ChainSummary, ConversationStats, ConversationView, EmailRecord,
    MessageView, SearchResult, SenderCount, Timeline, UrgencyBreakdown,
};

/// Keywords marking a message urgent (high importance also counts)
const URGENT_KEYWORDS: [&str; 10] = [
    "urgent", "critical", "down", "outage", "error", "failure", "issue", "problem", "alert",
    "incident",
];
/// Keywords marking a message a warning
const WARNING_KEYWORDS: [&str; 6] = [
    "warning",
    "caution",
    "attention",
    "investigate",
    "check",
    "review",
];
/// Senders reported by alert analysis
const TOP_SENDER_COUNT: usize = 5;

/// Group records into formatted conversations
pub fn build_conversations(
    records: &[EmailRecord],
    config: &BridgeConfig,
) -> Vec<ConversationView> {
    let mut groups: BTreeMap<String, Vec<&EmailRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(group_key(record)).or_default().push(record);
    }

    let mut conversations: Vec<ConversationView> = groups
        .into_values()
        .filter_map(|mut members| {
            members.sort_by_key(|r| r.received_at);
            conversation_view(&members, config)
        })
        .collect();
    // newest activity first
    conversations.sort_by(|a, b| b.timeline.last.cmp(&a.timeline.last));
    conversations
}

/// Aggregate summary over one search result
pub fn build_summary(
    result: &SearchResult,
    conversation_count: usize,
    from_cache: bool,
) -> ChainSummary {
    let mut mailbox_counts: BTreeMap<String, usize> = BTreeMap::new();
    for record in &result.records {
        *mailbox_counts
            .entry(record.mailbox.label().to_owned())
            .or_default() += 1;
    }

    let date_range = match (
        result.records.iter().map(|r| r.received_at).min(),
        result.records.iter().map(|r| r.received_at).max(),
    ) {
        (Some(first), Some(last)) => Some(Timeline {
            first: rfc3339(first),
            last: rfc3339(last),
        }),
        _ => None,
    };

    ChainSummary {
        total_messages: result.records.len(),
        conversation_count,
        mailbox_counts,
        date_range,
        strategies: result.mailbox_strategies.clone(),
        failed_mailboxes: result.failures.clone(),
        from_cache,
        truncated: result.truncated,
        search_elapsed_ms: result.elapsed_ms,
    }
}

/// Compute alert-pattern statistics over matched records
pub fn analyze_alerts(
    records: &[EmailRecord],
    pattern: &str,
) -> AlertAnalysisData {
    let mut per_day: BTreeMap<String, usize> = BTreeMap::new();
    let mut sender_counts: HashMap<String, usize> = HashMap::new();
    let mut urgency = UrgencyBreakdown {
        urgent: 0,
        warning: 0,
        normal: 0,
    };

    for record in records {
        *per_day
            .entry(record.received_at.format("%Y-%m-%d").to_string())
            .or_default() += 1;
        *sender_counts.entry(display_sender(record)).or_default() += 1;

        match classify_urgency(record) {
            Urgency::Urgent => urgency.urgent += 1,
            Urgency::Warning => urgency.warning += 1,
            Urgency::Normal => urgency.normal += 1,
        }
    }

    let mut top_senders: Vec<SenderCount> = sender_counts
        .into_iter()
        .map(|(sender, count)| SenderCount { sender, count })
        .collect();
    top_senders.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.sender.cmp(&b.sender)));
    top_senders.truncate(TOP_SENDER_COUNT);

    let first_seen = records.iter().map(|r| r.received_at).min().map(rfc3339);
    let last_seen = records.iter().map(|r| r.received_at).max().map(rfc3339);

    let summary = if records.is_empty() {
        format!("No emails matched alert pattern '{pattern}'")
    } else {
        format!(
            "{} email(s) matched '{pattern}' across {} day(s): {} urgent, {} warning, {} normal",
            records.len(),
            per_day.len(),
            urgency.urgent,
            urgency.warning,
            urgency.normal
        )
    };

    AlertAnalysisData {
        alert_pattern: pattern.to_owned(),
        total_matches: records.len(),
        first_seen,
        last_seen,
        per_day,
        top_senders,
        urgency,
        summary,
        failed_mailboxes: Vec::new(),
    }
}

enum Urgency {
    Urgent,
    Warning,
    Normal,
}

/// Classify one record by keyword lists and importance
fn classify_urgency(record: &EmailRecord) -> Urgency {
    let subject = record.subject.to_lowercase();
    let body = record.body.to_lowercase();
    let hit = |keywords: &[&str]| {
        keywords
            .iter()
            .any(|k| subject.contains(k) || body.contains(k))
    };

    if record.importance > 1 || hit(&URGENT_KEYWORDS) {
        Urgency::Urgent
    } else if hit(&WARNING_KEYWORDS) {
        Urgency::Warning
    } else {
        Urgency::Normal
    }
}

/// Grouping key: store thread key when present, else normalized subject
fn group_key(record: &EmailRecord) -> String {
    record
        .thread_key
        .clone()
        .unwrap_or_else(|| normalize_subject(&record.subject))
}

/// Lowercase a subject and strip reply/forward prefixes
pub fn normalize_subject(subject: &str) -> String {
    let mut topic = subject.trim().to_lowercase();
    loop {
        let stripped = topic
            .strip_prefix("re:")
            .or_else(|| topic.strip_prefix("fw:"))
            .or_else(|| topic.strip_prefix("fwd:"));
        match stripped {
            Some(rest) => topic = rest.trim_start().to_owned(),
            None => break,
        }
    }
    topic
}

/// Strip reply/forward prefixes while preserving case, for display
fn display_topic(subject: &str) -> String {
    let mut topic = subject.trim();
    loop {
        let lower = topic.to_lowercase();
        let prefix_len = ["re:", "fw:"]
            .iter()
            .find(|p| lower.starts_with(**p))
            .map(|p| p.len())
            .or_else(|| lower.starts_with("fwd:").then_some(4));
        match prefix_len {
            Some(len) => topic = topic[len..].trim_start(),
            None => break,
        }
    }
    topic.to_owned()
}

fn conversation_view(members: &[&EmailRecord], config: &BridgeConfig) -> Option<ConversationView> {
    let first = members.first()?;
    let last = members.last()?;

    let mut participants: BTreeSet<String> = BTreeSet::new();
    let mut mailbox_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut folder_counts: BTreeMap<String, usize> = BTreeMap::new();
    for record in members {
        participants.insert(display_sender(record));
        for recipient in &record.recipients {
            participants.insert(recipient.clone());
        }
        *mailbox_counts
            .entry(record.mailbox.label().to_owned())
            .or_default() += 1;
        *folder_counts.entry(record.folder.clone()).or_default() += 1;
    }

    let messages: Vec<MessageView> = members
        .iter()
        .map(|record| message_view(record, config))
        .collect();

    Some(ConversationView {
        topic: display_topic(&first.subject),
        participants: participants.iter().cloned().collect(),
        timeline: Timeline {
            first: rfc3339(first.received_at),
            last: rfc3339(last.received_at),
        },
        stats: ConversationStats {
            message_count: members.len(),
            participant_count: participants.len(),
            mailbox_counts,
            folder_counts,
        },
        messages,
    })
}

/// Apply display limits to one record
fn message_view(record: &EmailRecord, config: &BridgeConfig) -> MessageView {
    let mut recipients = record.recipients.clone();
    let cap = config.max_recipients_display.max(1);
    let recipients_omitted = recipients.len().saturating_sub(cap);
    recipients.truncate(cap);

    MessageView {
        subject: record.subject.clone(),
        sender_name: record.sender_name.clone(),
        sender_email: record.sender_email.clone(),
        recipients,
        recipients_omitted,
        received_at: rfc3339(record.received_at),
        folder: record.folder.clone(),
        mailbox: record.mailbox,
        importance: record.importance,
        unread: record.unread,
        attachment_count: record.attachment_count,
        body: format_body(&record.body, config),
    }
}

/// Flatten HTML-looking bodies and apply the body character limit
fn format_body(body: &str, config: &BridgeConfig) -> String {
    let cleaned = if config.clean_html_content && looks_like_html(body) {
        html2text::from_read(body.as_bytes(), 80).unwrap_or_else(|_| body.to_owned())
    } else {
        body.to_owned()
    };

    if config.max_body_chars == 0 || cleaned.chars().count() <= config.max_body_chars {
        return cleaned;
    }
    let truncated: String = cleaned.chars().take(config.max_body_chars).collect();
    format!("{truncated} [truncated]")
}

fn looks_like_html(body: &str) -> bool {
    body.contains('<') && body.contains("</")
}

fn display_sender(record: &EmailRecord) -> String {
    if record.sender_name.trim().is_empty() {
        record.sender_email.clone()
    } else {
        record.sender_name.clone()
    }
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::config::BridgeConfig;
    use crate::models::{EmailRecord, MailboxKind};

    use super::{analyze_alerts, build_conversations, normalize_subject};

    fn record(subject: &str, body: &str, hour: u32) -> EmailRecord {
        EmailRecord {
            entry_id: format!("{subject}-{hour}"),
            subject: subject.to_owned(),
            body: body.to_owned(),
            sender_name: "Monitor".to_owned(),
            sender_email: "monitor@example.com".to_owned(),
            recipients: vec!["ops@example.com".to_owned()],
            received_at: Utc.with_ymd_and_hms(2026, 8, 10, hour, 0, 0).unwrap(),
            folder: "Inbox".to_owned(),
            mailbox: MailboxKind::Personal,
            thread_key: None,
            importance: 1,
            unread: false,
            attachment_count: 0,
            size_bytes: 1024,
        }
    }

    #[test]
    fn normalize_subject_strips_stacked_reply_prefixes() {
        assert_eq!(normalize_subject("RE: Fwd: Issue A"), "issue a");
        assert_eq!(normalize_subject("  Issue A  "), "issue a");
    }

    #[test]
    fn groups_by_normalized_subject_in_chronological_order() {
        let records = vec![
            record("Issue A", "first", 1),
            record("RE: Issue A", "reply", 3),
            record("Issue B", "other", 2),
        ];

        let conversations = build_conversations(&records, &BridgeConfig::default());
        assert_eq!(conversations.len(), 2);

        // newest activity first: Issue A's last message is at hour 3
        let first = &conversations[0];
        assert_eq!(first.topic, "Issue A");
        assert_eq!(first.stats.message_count, 2);
        assert!(first.messages[0].received_at < first.messages[1].received_at);

        assert_eq!(conversations[1].topic, "Issue B");
    }

    #[test]
    fn thread_key_overrides_subject_grouping() {
        let mut a = record("Totally different subject", "x", 1);
        a.thread_key = Some("t-1".to_owned());
        let mut b = record("Issue A", "y", 2);
        b.thread_key = Some("t-1".to_owned());

        let conversations = build_conversations(&[a, b], &BridgeConfig::default());
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].stats.message_count, 2);
    }

    #[test]
    fn body_truncation_appends_marker() {
        let config = BridgeConfig {
            max_body_chars: 10,
            ..BridgeConfig::default()
        };
        let records = vec![record("Issue A", "0123456789abcdef", 1)];
        let conversations = build_conversations(&records, &config);
        assert_eq!(conversations[0].messages[0].body, "0123456789 [truncated]");
    }

    #[test]
    fn unlimited_body_is_left_intact() {
        let records = vec![record("Issue A", "0123456789abcdef", 1)];
        let conversations = build_conversations(&records, &BridgeConfig::default());
        assert_eq!(conversations[0].messages[0].body, "0123456789abcdef");
    }

    #[test]
    fn html_bodies_are_flattened_at_format_time() {
        let records = vec![record("Issue A", "<p>alert <b>fired</b></p>", 1)];
        let conversations = build_conversations(&records, &BridgeConfig::default());
        let body = &conversations[0].messages[0].body;
        assert!(!body.contains('<'));
        assert!(body.contains("alert"));
    }

    #[test]
    fn recipient_display_cap_reports_omissions() {
        let config = BridgeConfig {
            max_recipients_display: 2,
            ..BridgeConfig::default()
        };
        let mut r = record("Issue A", "x", 1);
        r.recipients = vec![
            "a@example.com".to_owned(),
            "b@example.com".to_owned(),
            "c@example.com".to_owned(),
        ];

        let conversations = build_conversations(&[r], &config);
        let message = &conversations[0].messages[0];
        assert_eq!(message.recipients.len(), 2);
        assert_eq!(message.recipients_omitted, 1);
    }

    #[test]
    fn alert_analysis_classifies_urgency_and_counts_days() {
        let mut high = record("FYI", "routine note", 9);
        high.importance = 2;
        let records = vec![
            record("ALERT-1 critical outage", "db down", 8),
            record("Please review the report", "check the numbers", 10),
            record("Lunch plans", "pizza?", 11),
            high,
        ];

        let analysis = analyze_alerts(&records, "ALERT-1");
        assert_eq!(analysis.total_matches, 4);
        assert_eq!(analysis.urgency.urgent, 2);
        assert_eq!(analysis.urgency.warning, 1);
        assert_eq!(analysis.urgency.normal, 1);
        assert_eq!(analysis.per_day.len(), 1);
        assert_eq!(analysis.top_senders[0].sender, "Monitor");
        assert_eq!(analysis.top_senders[0].count, 4);
    }
}
