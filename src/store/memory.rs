//! In-memory mail store
//!
//! Backs the test suite and the binary's `--demo` mode. Implements the full
//! store trait family, including the failure modes the search cascade and
//! connect retry logic must tolerate: attach failures, a disabled or slow
//! search index, a failing subject filter, and denied shared-mailbox access.
//!
//! Live native handles are counted so tests can assert that every handle is
//! released after field extraction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use super::{
    ConnectOptions, FolderKind, MailStore, MailboxRoot, MessageRef, NativeMessage,
    ResolvedMailbox, StoreError, StoreSession,
};

/// Root key for the personal mailbox
const PERSONAL_ROOT: &str = "personal";
/// Root key for the shared mailbox
const SHARED_ROOT: &str = "shared";

/// One stored message
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub entry_id: String,
    pub subject: String,
    pub body: String,
    pub sender_name: String,
    pub sender_email: String,
    pub recipients: Vec<String>,
    pub received_at: DateTime<Utc>,
    pub thread_key: Option<String>,
    pub importance: u8,
    pub unread: bool,
    pub attachment_count: u32,
    pub size_bytes: u64,
}

impl StoredMessage {
    /// Build a message with sensible defaults for the remaining fields
    pub fn new(
        entry_id: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        sender_email: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let sender_email = sender_email.into();
        let sender_name = sender_email
            .split('@')
            .next()
            .unwrap_or_default()
            .to_owned();
        Self {
            entry_id: entry_id.into(),
            subject: subject.into(),
            body: body.into(),
            sender_name,
            sender_email,
            recipients: vec!["user@example.com".to_owned()],
            received_at,
            thread_key: None,
            importance: 1,
            unread: false,
            attachment_count: 0,
            size_bytes: 4_096,
        }
    }
}

#[derive(Debug, Default)]
struct MailboxData {
    display_name: String,
    folders: HashMap<FolderKind, Vec<StoredMessage>>,
}

#[derive(Debug, Default)]
struct Inner {
    connected: bool,
    personal: MailboxData,
    shared: Option<MailboxData>,
    shared_access_denied: bool,
    index_available: bool,
    index_delay: Option<Duration>,
    subject_filter_fails: bool,
    attach_failures_remaining: u32,
    launch_fails: bool,
    attach_calls: u32,
    launch_calls: u32,
}

/// In-memory store with configurable failure modes
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    live_handles: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let inner = Inner {
            personal: MailboxData {
                display_name: "Personal Mailbox".to_owned(),
                folders: HashMap::new(),
            },
            index_available: true,
            ..Inner::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            live_handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A store pre-seeded with a plausible escalation-mailbox history
    ///
    /// Serves the `--demo` mode so the server can run end to end without a
    /// desktop mail client.
    pub fn demo() -> Self {
        let store = Self::new();
        store.enable_shared("Operations Escalations");

        let at = |day: u32, hour: u32| Utc.with_ymd_and_hms(2026, 8, day, hour, 0, 0).unwrap();

        store.seed(
            FolderKind::Inbox,
            false,
            StoredMessage::new(
                "p-1001",
                "ALERT-4417 database connection pool exhausted",
                "Pool exhaustion detected on db-prod-3. Failover engaged. ALERT-4417 raised.",
                "monitor@example.com",
                at(20, 9),
            ),
        );
        store.seed(
            FolderKind::Inbox,
            false,
            StoredMessage::new(
                "p-1002",
                "RE: ALERT-4417 database connection pool exhausted",
                "Root cause was a leaked cursor in the billing batch. Fix deployed.",
                "dba-team@example.com",
                at(20, 14),
            ),
        );
        store.seed(FolderKind::Inbox, false, {
            let mut msg = StoredMessage::new(
                "p-1003",
                "Quarterly maintenance window",
                "Maintenance is scheduled for Saturday. No action needed.",
                "itops@example.com",
                at(21, 8),
            );
            msg.unread = true;
            msg
        });
        store.seed(FolderKind::Inbox, true, {
            let mut msg = StoredMessage::new(
                "s-2001",
                "ALERT-4417 database connection pool exhausted",
                "Urgent: customers reporting timeouts, incident bridge open.",
                "oncall@example.com",
                at(20, 10),
            );
            msg.importance = 2;
            msg
        });
        store.seed(
            FolderKind::SentItems,
            true,
            StoredMessage::new(
                "s-2002",
                "RE: ALERT-4417 database connection pool exhausted",
                "Acknowledged, investigating the connection pool metrics now.",
                "escalations@example.com",
                at(20, 11),
            ),
        );
        store
    }

    /// Seed one message into a mailbox folder
    ///
    /// `shared=true` targets the shared mailbox, which must be enabled first.
    pub fn seed(&self, folder: FolderKind, shared: bool, message: StoredMessage) {
        let mut inner = self.inner.lock().expect("store lock");
        let mailbox = if shared {
            inner.shared.as_mut().expect("shared mailbox not enabled")
        } else {
            &mut inner.personal
        };
        let messages = mailbox.folders.entry(folder).or_default();
        messages.push(message);
        messages.sort_by(|a, b| b.received_at.cmp(&a.received_at));
    }

    /// Make a shared mailbox resolvable under the given display name
    pub fn enable_shared(&self, display_name: &str) {
        let mut inner = self.inner.lock().expect("store lock");
        inner.shared = Some(MailboxData {
            display_name: display_name.to_owned(),
            folders: HashMap::new(),
        });
    }

    /// Shared mailbox resolves but permission is denied
    pub fn deny_shared_access(&self) {
        self.inner.lock().expect("store lock").shared_access_denied = true;
    }

    /// Index queries fail with `IndexUnavailable`
    pub fn disable_index(&self) {
        self.inner.lock().expect("store lock").index_available = false;
    }

    /// Index queries stall for the given duration before answering
    pub fn delay_index(&self, delay: Duration) {
        self.inner.lock().expect("store lock").index_delay = Some(delay);
    }

    /// Subject filter fails with a backend error
    pub fn fail_subject_filter(&self) {
        self.inner.lock().expect("store lock").subject_filter_fails = true;
    }

    /// The next `count` attach attempts fail with `Unavailable`
    pub fn fail_attach_times(&self, count: u32) {
        self.inner.lock().expect("store lock").attach_failures_remaining = count;
    }

    /// Launch attempts fail with `Unavailable`
    pub fn fail_launch(&self) {
        self.inner.lock().expect("store lock").launch_fails = true;
    }

    /// Number of native handles currently alive
    pub fn live_handles(&self) -> usize {
        self.live_handles.load(Ordering::SeqCst)
    }

    /// Attach and launch attempt counts observed so far
    pub fn connect_attempts(&self) -> (u32, u32) {
        let inner = self.inner.lock().expect("store lock");
        (inner.attach_calls, inner.launch_calls)
    }

    fn root_data<'a>(
        inner: &'a Inner,
        root: &MailboxRoot,
    ) -> Result<&'a MailboxData, StoreError> {
        match root.0.as_str() {
            PERSONAL_ROOT => Ok(&inner.personal),
            SHARED_ROOT => inner
                .shared
                .as_ref()
                .ok_or_else(|| StoreError::NotFound("shared mailbox not present".to_owned())),
            other => Err(StoreError::NotFound(format!("unknown mailbox root '{other}'"))),
        }
    }

    fn folder_messages<'a>(
        inner: &'a Inner,
        root: &MailboxRoot,
        folder: FolderKind,
    ) -> Result<&'a [StoredMessage], StoreError> {
        let data = Self::root_data(inner, root)?;
        Ok(data
            .folders
            .get(&folder)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    fn message_ref(root: &MailboxRoot, folder: FolderKind, message: &StoredMessage) -> MessageRef {
        MessageRef {
            entry_id: message.entry_id.clone(),
            root: root.clone(),
            folder,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MailStore for MemoryStore {
    async fn attach(&self, _options: &ConnectOptions) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.attach_calls += 1;
        if inner.attach_failures_remaining > 0 {
            inner.attach_failures_remaining -= 1;
            return Err(StoreError::Unavailable("no running client instance".to_owned()));
        }
        inner.connected = true;
        Ok(())
    }

    async fn launch(&self, _options: &ConnectOptions) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.launch_calls += 1;
        if inner.launch_fails {
            return Err(StoreError::Unavailable("client failed to start".to_owned()));
        }
        inner.connected = true;
        Ok(())
    }

    async fn open_session(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        let inner = self.inner.lock().expect("store lock");
        if !inner.connected {
            return Err(StoreError::Unavailable("not connected".to_owned()));
        }
        Ok(Box::new(MemorySession {
            store: self.clone(),
        }))
    }
}

/// Per-worker session over the in-memory store
struct MemorySession {
    store: MemoryStore,
}

#[async_trait::async_trait]
impl StoreSession for MemorySession {
    async fn resolve_personal(&mut self) -> Result<ResolvedMailbox, StoreError> {
        let inner = self.store.inner.lock().expect("store lock");
        Ok(ResolvedMailbox {
            root: MailboxRoot(PERSONAL_ROOT.to_owned()),
            display_name: inner.personal.display_name.clone(),
        })
    }

    async fn resolve_shared(&mut self, email: &str) -> Result<ResolvedMailbox, StoreError> {
        let inner = self.store.inner.lock().expect("store lock");
        let Some(shared) = inner.shared.as_ref() else {
            return Err(StoreError::NotFound(format!("cannot resolve '{email}'")));
        };
        if inner.shared_access_denied {
            return Err(StoreError::AccessDenied(format!(
                "no permission for '{email}'"
            )));
        }
        Ok(ResolvedMailbox {
            root: MailboxRoot(SHARED_ROOT.to_owned()),
            display_name: shared.display_name.clone(),
        })
    }

    async fn search_index(
        &mut self,
        root: &MailboxRoot,
        folder: FolderKind,
        phrase: &str,
    ) -> Result<Vec<MessageRef>, StoreError> {
        let delay = {
            let inner = self.store.inner.lock().expect("store lock");
            if !inner.index_available {
                return Err(StoreError::IndexUnavailable("indexing disabled".to_owned()));
            }
            inner.index_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let inner = self.store.inner.lock().expect("store lock");
        let needle = phrase.to_lowercase();
        let matches = MemoryStore::folder_messages(&inner, root, folder)?
            .iter()
            .filter(|m| {
                m.subject.to_lowercase().contains(&needle)
                    || m.body.to_lowercase().contains(&needle)
            })
            .map(|m| MemoryStore::message_ref(root, folder, m))
            .collect();
        Ok(matches)
    }

    async fn filter_subjects(
        &mut self,
        root: &MailboxRoot,
        folder: FolderKind,
        phrase: &str,
    ) -> Result<Vec<MessageRef>, StoreError> {
        let inner = self.store.inner.lock().expect("store lock");
        if inner.subject_filter_fails {
            return Err(StoreError::Backend("subject filter rejected".to_owned()));
        }
        let needle = phrase.to_lowercase();
        let matches = MemoryStore::folder_messages(&inner, root, folder)?
            .iter()
            .filter(|m| m.subject.to_lowercase().contains(&needle))
            .map(|m| MemoryStore::message_ref(root, folder, m))
            .collect();
        Ok(matches)
    }

    async fn list_page(
        &mut self,
        root: &MailboxRoot,
        folder: FolderKind,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MessageRef>, StoreError> {
        let inner = self.store.inner.lock().expect("store lock");
        let messages = MemoryStore::folder_messages(&inner, root, folder)?;
        Ok(messages
            .iter()
            .skip(offset)
            .take(limit)
            .map(|m| MemoryStore::message_ref(root, folder, m))
            .collect())
    }

    async fn open_message(
        &mut self,
        message: &MessageRef,
    ) -> Result<Box<dyn NativeMessage>, StoreError> {
        let inner = self.store.inner.lock().expect("store lock");
        let stored = MemoryStore::folder_messages(&inner, &message.root, message.folder)?
            .iter()
            .find(|m| m.entry_id == message.entry_id)
            .cloned()
            .ok_or_else(|| {
                StoreError::NotFound(format!("message '{}' not found", message.entry_id))
            })?;

        self.store.live_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryHandle {
            message: stored,
            live_handles: Arc::clone(&self.store.live_handles),
        }))
    }
}

/// A "native" handle over a stored message
///
/// Decrements the live-handle counter on drop, mirroring COM-style release.
struct MemoryHandle {
    message: StoredMessage,
    live_handles: Arc<AtomicUsize>,
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

impl NativeMessage for MemoryHandle {
    fn entry_id(&self) -> String {
        self.message.entry_id.clone()
    }

    fn subject(&self) -> String {
        self.message.subject.clone()
    }

    fn body(&self) -> String {
        self.message.body.clone()
    }

    fn sender_name(&self) -> String {
        self.message.sender_name.clone()
    }

    fn sender_email(&self) -> String {
        self.message.sender_email.clone()
    }

    fn recipients(&self) -> Vec<String> {
        self.message.recipients.clone()
    }

    fn received_at(&self) -> DateTime<Utc> {
        self.message.received_at
    }

    fn thread_key(&self) -> Option<String> {
        self.message.thread_key.clone()
    }

    fn importance(&self) -> u8 {
        self.message.importance
    }

    fn unread(&self) -> bool {
        self.message.unread
    }

    fn attachment_count(&self) -> u32 {
        self.message.attachment_count
    }

    fn size_bytes(&self) -> u64 {
        self.message.size_bytes
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::{MemoryStore, StoredMessage};
    use crate::store::{ConnectOptions, FolderKind, MailStore, StoreError};

    fn options() -> ConnectOptions {
        ConnectOptions {
            extended_login: true,
        }
    }

    #[tokio::test]
    async fn attach_fails_the_configured_number_of_times() {
        let store = MemoryStore::new();
        store.fail_attach_times(2);

        assert!(store.attach(&options()).await.is_err());
        assert!(store.attach(&options()).await.is_err());
        store.attach(&options()).await.expect("third attach succeeds");
        assert_eq!(store.connect_attempts().0, 3);
    }

    #[tokio::test]
    async fn handles_are_released_on_drop() {
        let store = MemoryStore::new();
        store.seed(
            FolderKind::Inbox,
            false,
            StoredMessage::new(
                "m-1",
                "hello",
                "world",
                "a@example.com",
                Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap(),
            ),
        );
        store.attach(&options()).await.expect("attach");
        let mut session = store.open_session().await.expect("session");

        let root = session.resolve_personal().await.expect("personal").root;
        let refs = session
            .filter_subjects(&root, FolderKind::Inbox, "hello")
            .await
            .expect("filter");
        assert_eq!(refs.len(), 1);

        {
            let handle = session.open_message(&refs[0]).await.expect("open");
            assert_eq!(store.live_handles(), 1);
            assert_eq!(handle.subject(), "hello");
        }
        assert_eq!(store.live_handles(), 0);
    }

    #[tokio::test]
    async fn disabled_index_is_distinct_from_zero_hits() {
        let store = MemoryStore::new();
        store.attach(&options()).await.expect("attach");
        let mut session = store.open_session().await.expect("session");
        let root = session.resolve_personal().await.expect("personal").root;

        let empty = session
            .search_index(&root, FolderKind::Inbox, "nothing")
            .await
            .expect("empty result is success");
        assert!(empty.is_empty());

        store.disable_index();
        let err = session
            .search_index(&root, FolderKind::Inbox, "nothing")
            .await
            .expect_err("disabled index must error");
        assert!(matches!(err, StoreError::IndexUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn index_delay_stalls_queries() {
        let store = MemoryStore::new();
        store.delay_index(Duration::from_secs(5));
        store.attach(&options()).await.expect("attach");
        let mut session = store.open_session().await.expect("session");
        let root = session.resolve_personal().await.expect("personal").root;

        let started = tokio::time::Instant::now();
        session
            .search_index(&root, FolderKind::Inbox, "x")
            .await
            .expect("search");
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
