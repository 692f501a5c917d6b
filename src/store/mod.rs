//! Mail store boundary
//!
//! The desktop mail client is an external capability behind the
//! [`MailStore`] / [`StoreSession`] / [`NativeMessage`] trait family. The
//! crate ships one in-tree implementation, [`memory::MemoryStore`], used by
//! the test suite and `--demo` mode; platform-native desktop backends
//! implement the same traits out of tree.
//!
//! Sessions are per-worker: native bindings commonly require per-thread
//! initialization, so each concurrent search path opens its own
//! [`StoreSession`] rather than sharing one.

pub mod adapter;
pub mod memory;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised at the store boundary
///
/// `IndexUnavailable` is distinct from an empty search result: a successful
/// query with zero hits is not an error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The mail client cannot be reached (not running, attach/launch failed)
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A mailbox or folder does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// The mailbox exists but permission was denied
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// The search index cannot serve queries (e.g. indexing disabled)
    #[error("search index unavailable: {0}")]
    IndexUnavailable(String),
    /// Any other backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

/// Opaque reference to a mailbox's root folder
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MailboxRoot(pub String);

/// Well-known folders a search may cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FolderKind {
    Inbox,
    SentItems,
    Drafts,
}

impl FolderKind {
    /// Display name matching the desktop client's folder naming
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Inbox => "Inbox",
            Self::SentItems => "Sent Items",
            Self::Drafts => "Drafts",
        }
    }
}

/// Lightweight reference to a message within a folder
///
/// Carries enough context to reopen the message later; holds no native
/// resources.
#[derive(Debug, Clone)]
pub struct MessageRef {
    pub entry_id: String,
    pub root: MailboxRoot,
    pub folder: FolderKind,
}

/// Options applied when attaching to or launching the mail client
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Use the alternate logon path that reduces permission prompts
    pub extended_login: bool,
}

/// A resolved mailbox as reported by the store
#[derive(Debug, Clone)]
pub struct ResolvedMailbox {
    pub root: MailboxRoot,
    pub display_name: String,
}

/// The external mail client
#[async_trait::async_trait]
pub trait MailStore: Send + Sync {
    /// Attach to an already-running client instance (cheap path)
    async fn attach(&self, options: &ConnectOptions) -> Result<(), StoreError>;

    /// Launch a new client instance (slow path)
    async fn launch(&self, options: &ConnectOptions) -> Result<(), StoreError>;

    /// Open a session for one worker
    ///
    /// Each concurrent search path must hold its own session; sharing one
    /// across workers is not supported by native bindings.
    async fn open_session(&self) -> Result<Box<dyn StoreSession>, StoreError>;
}

/// One worker's view of the connected store
#[async_trait::async_trait]
pub trait StoreSession: Send {
    /// Resolve the signed-in user's mailbox via the default profile root
    async fn resolve_personal(&mut self) -> Result<ResolvedMailbox, StoreError>;

    /// Resolve a shared mailbox by email address
    ///
    /// Returns `AccessDenied` when the mailbox exists but permission is
    /// lacking, `NotFound` when the address does not resolve.
    async fn resolve_shared(&mut self, email: &str) -> Result<ResolvedMailbox, StoreError>;

    /// Index-accelerated case-insensitive exact-phrase query over subject
    /// and body
    ///
    /// Fails with `IndexUnavailable` when the index cannot serve queries;
    /// zero hits is a successful result.
    async fn search_index(
        &mut self,
        root: &MailboxRoot,
        folder: FolderKind,
        phrase: &str,
    ) -> Result<Vec<MessageRef>, StoreError>;

    /// Always-available subject-substring filter
    async fn filter_subjects(
        &mut self,
        root: &MailboxRoot,
        folder: FolderKind,
        phrase: &str,
    ) -> Result<Vec<MessageRef>, StoreError>;

    /// Page through folder contents, newest first
    async fn list_page(
        &mut self,
        root: &MailboxRoot,
        folder: FolderKind,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MessageRef>, StoreError>;

    /// Acquire a native handle for one message
    async fn open_message(
        &mut self,
        message: &MessageRef,
    ) -> Result<Box<dyn NativeMessage>, StoreError>;
}

/// A live native message handle
///
/// Field accessors copy data out of the native object. Implementations
/// release the underlying handle in `Drop`, so extracting fields into an
/// owned record and letting the box fall out of scope bounds native resource
/// usage on every exit path.
pub trait NativeMessage: Send {
    fn entry_id(&self) -> String;
    fn subject(&self) -> String;
    fn body(&self) -> String;
    fn sender_name(&self) -> String;
    fn sender_email(&self) -> String;
    fn recipients(&self) -> Vec<String>;
    fn received_at(&self) -> DateTime<Utc>;
    fn thread_key(&self) -> Option<String>;
    fn importance(&self) -> u8;
    fn unread(&self) -> bool;
    fn attachment_count(&self) -> u32;
    fn size_bytes(&self) -> u64;
}
