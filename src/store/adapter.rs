//! Store adapter with retrying connect and per-worker sessions
//!
//! Wraps the external [`MailStore`] behind timeout-bounded operations. The
//! adapter owns connection state for the process; each concurrent search path
//! asks it for a [`StoreWorker`], which holds its own store session so native
//! per-thread initialization requirements are honored.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::config::BridgeConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{EmailRecord, MailboxHandle, MailboxKind};
use crate::store::{
    ConnectOptions, FolderKind, MailStore, MailboxRoot, MessageRef, StoreError, StoreSession,
};

/// Connection orchestrator for the external mail store
pub struct StoreAdapter {
    store: Arc<dyn MailStore>,
    config: Arc<BridgeConfig>,
    /// Serializes connect attempts; true once a connection is established
    connected: Mutex<bool>,
}

impl StoreAdapter {
    pub fn new(store: Arc<dyn MailStore>, config: Arc<BridgeConfig>) -> Self {
        Self {
            store,
            config,
            connected: Mutex::new(false),
        }
    }

    /// Establish a connection, retrying with exponential backoff
    ///
    /// Each attempt tries the cheap attach path first and falls back to
    /// launching a new client instance. The whole attach-or-launch sequence
    /// is retried up to `max_connection_retries` times with 1s, 2s, 4s, …
    /// pauses between attempts; each attempt is bounded by
    /// `connection_timeout_minutes`. Idempotent once connected.
    ///
    /// The first attach per session may trigger an OS-level permission
    /// prompt; the per-attempt deadline tolerates that wait.
    ///
    /// # Errors
    ///
    /// Returns `Connection` after exhausting all attempts.
    pub async fn connect(&self) -> AppResult<()> {
        let mut connected = self.connected.lock().await;
        if *connected {
            return Ok(());
        }

        let options = ConnectOptions {
            extended_login: self.config.use_extended_mapi_login,
        };
        let deadline = self.config.connection_timeout();
        let attempts = self.config.max_connection_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.attach_or_launch(&options, deadline).await {
                Ok(()) => {
                    tracing::info!(attempt, "connected to mail store");
                    *connected = true;
                    return Ok(());
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(attempt, error = %last_error, "connect attempt failed");
                }
            }
            if attempt < attempts {
                let backoff = Duration::from_secs(1 << (attempt - 1));
                tokio::time::sleep(backoff).await;
            }
        }

        Err(AppError::Connection(format!(
            "mail store unreachable after {attempts} attempt(s): {last_error}"
        )))
    }

    async fn attach_or_launch(
        &self,
        options: &ConnectOptions,
        deadline: Duration,
    ) -> AppResult<()> {
        let attached = timeout(deadline, self.store.attach(options))
            .await
            .map_err(|_| AppError::Timeout("attach timed out".to_owned()))?;
        match attached {
            Ok(()) => Ok(()),
            Err(attach_err) => {
                tracing::debug!(error = %attach_err, "attach failed, launching new instance");
                timeout(deadline, self.store.launch(options))
                    .await
                    .map_err(|_| AppError::Timeout("launch timed out".to_owned()))?
                    .map_err(AppError::from)
            }
        }
    }

    /// Open a fresh per-worker session
    ///
    /// Must be called after [`connect`](Self::connect). Each concurrent
    /// search path needs its own worker; sessions are never shared.
    pub async fn worker(&self) -> AppResult<StoreWorker> {
        let session = timeout(self.config.connection_timeout(), self.store.open_session())
            .await
            .map_err(|_| AppError::Timeout("open session timed out".to_owned()))?
            .map_err(AppError::from)?;
        Ok(StoreWorker {
            session,
            op_timeout: self.config.connection_timeout(),
            batch_size: self.config.batch_processing_size.max(1),
        })
    }
}

/// One worker's session with timeout-bounded operations
pub struct StoreWorker {
    session: Box<dyn StoreSession>,
    op_timeout: Duration,
    batch_size: usize,
}

impl StoreWorker {
    /// Resolve a mailbox into a session-scoped handle
    ///
    /// Shared-mailbox permission denial yields a non-accessible handle
    /// rather than an error; only resolution failures propagate.
    ///
    /// # Errors
    ///
    /// - `MailboxNotFound` if the identity cannot be resolved
    /// - `Timeout` / `Internal` for store failures
    pub async fn resolve_mailbox(
        &mut self,
        kind: MailboxKind,
        config: &BridgeConfig,
    ) -> AppResult<MailboxHandle> {
        match kind {
            MailboxKind::Personal => {
                let resolved = timeout(self.op_timeout, self.session.resolve_personal())
                    .await
                    .map_err(|_| AppError::Timeout("resolve personal mailbox timed out".to_owned()))?
                    .map_err(AppError::from)?;
                Ok(MailboxHandle {
                    kind,
                    display_name: resolved.display_name,
                    root: resolved.root,
                    accessible: true,
                    retention_months: Some(config.personal_retention_months),
                })
            }
            MailboxKind::Shared => {
                if !config.shared_configured() {
                    return Err(AppError::MailboxNotFound(
                        "shared mailbox is not configured".to_owned(),
                    ));
                }
                let email = config.shared_mailbox_email.trim();
                let resolved = timeout(self.op_timeout, self.session.resolve_shared(email))
                    .await
                    .map_err(|_| AppError::Timeout("resolve shared mailbox timed out".to_owned()))?;
                match resolved {
                    Ok(resolved) => Ok(MailboxHandle {
                        kind,
                        display_name: resolved.display_name,
                        root: resolved.root,
                        accessible: true,
                        retention_months: Some(config.shared_retention_months),
                    }),
                    // denied permission is a reportable state, not an error
                    Err(StoreError::AccessDenied(_)) => Ok(MailboxHandle {
                        kind,
                        display_name: config.shared_mailbox_name.clone(),
                        root: MailboxRoot(String::new()),
                        accessible: false,
                        retention_months: Some(config.shared_retention_months),
                    }),
                    Err(e) => Err(AppError::from(e)),
                }
            }
        }
    }

    /// Index-accelerated phrase query; errors pass through for the cascade
    pub async fn search_index(
        &mut self,
        root: &MailboxRoot,
        folder: FolderKind,
        phrase: &str,
    ) -> Result<Vec<MessageRef>, StoreError> {
        self.session.search_index(root, folder, phrase).await
    }

    /// Subject-substring filter; errors pass through for the cascade
    pub async fn filter_subjects(
        &mut self,
        root: &MailboxRoot,
        folder: FolderKind,
        phrase: &str,
    ) -> Result<Vec<MessageRef>, StoreError> {
        self.session.filter_subjects(root, folder, phrase).await
    }

    /// Page through a folder, newest first
    pub async fn list_page(
        &mut self,
        root: &MailboxRoot,
        folder: FolderKind,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MessageRef>, StoreError> {
        self.session.list_page(root, folder, offset, limit).await
    }

    /// Extract one message into an owned record
    ///
    /// Acquires the native handle, copies every field, and drops the handle
    /// before returning on every path, so native resource usage stays
    /// bounded.
    pub async fn fetch_detail(
        &mut self,
        message: &MessageRef,
        mailbox: MailboxKind,
    ) -> AppResult<EmailRecord> {
        let handle = timeout(self.op_timeout, self.session.open_message(message))
            .await
            .map_err(|_| AppError::Timeout("message fetch timed out".to_owned()))?
            .map_err(AppError::from)?;

        let record = EmailRecord {
            entry_id: handle.entry_id(),
            subject: handle.subject(),
            body: handle.body(),
            sender_name: handle.sender_name(),
            sender_email: handle.sender_email(),
            recipients: handle.recipients(),
            received_at: handle.received_at(),
            folder: message.folder.display_name().to_owned(),
            mailbox,
            thread_key: handle.thread_key(),
            importance: handle.importance(),
            unread: handle.unread(),
            attachment_count: handle.attachment_count(),
            size_bytes: handle.size_bytes(),
        };
        drop(handle);
        Ok(record)
    }

    /// Extract a batch of messages in `batch_processing_size` chunks
    ///
    /// A single unreadable message is skipped with a log line rather than
    /// failing the whole batch.
    pub async fn fetch_details(
        &mut self,
        messages: &[MessageRef],
        mailbox: MailboxKind,
    ) -> AppResult<Vec<EmailRecord>> {
        let mut records = Vec::with_capacity(messages.len());
        for chunk in messages.chunks(self.batch_size) {
            tracing::debug!(count = chunk.len(), %mailbox, "extracting record batch");
            for message in chunk {
                match self.fetch_detail(message, mailbox).await {
                    Ok(record) => records.push(record),
                    Err(AppError::Timeout(msg)) => return Err(AppError::Timeout(msg)),
                    Err(e) => {
                        tracing::warn!(entry_id = %message.entry_id, error = %e, "skipping unreadable message");
                    }
                }
            }
        }
        Ok(records)
    }
}
