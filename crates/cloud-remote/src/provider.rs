use crate::error::Result;
use crate::item::{ItemId, RemoteListing};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::fmt;

/// An authenticated handle to a remote provider.
///
/// The filesystem core never looks inside a session; it only hands it back
/// to the provider that created it.
#[derive(Clone)]
pub struct Session {
    /// Identity the session was opened for.
    pub identity: String,
    /// Provider-specific token (bearer token, cookie value, ...).
    pub token: SecretString,
    /// When the session was established.
    pub established_at: DateTime<Utc>,
}

impl Session {
    pub fn new(identity: impl Into<String>, token: SecretString) -> Self {
        Self {
            identity: identity.into(),
            token,
            established_at: Utc::now(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("token", &"[redacted]")
            .field("established_at", &self.established_at)
            .finish()
    }
}

/// Content fetched for a single remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    /// Full file body.
    pub data: Vec<u8>,
    /// Content type reported by the provider, if any.
    pub content_type: Option<String>,
}

impl FetchedContent {
    pub fn new(data: Vec<u8>, content_type: Option<String>) -> Self {
        Self { data, content_type }
    }
}

/// A remote content hierarchy the filesystem mirrors.
///
/// All calls are blocking. Implementations should honor their configured
/// request deadline and report a timed-out call as `Error::Transport`.
pub trait RemoteProvider: Send + Sync {
    /// Identifier of the root folder.
    fn root_id(&self) -> ItemId;

    /// Open a session for `identity`.
    fn authenticate(&self, identity: &str, secret: &SecretString) -> Result<Session>;

    /// List the direct children of a folder, in provider order.
    fn list_children(&self, session: &Session, folder: &ItemId) -> Result<Vec<RemoteListing>>;

    /// Download the full content of a file.
    fn fetch_content(&self, session: &Session, identifier: &ItemId) -> Result<FetchedContent>;
}
