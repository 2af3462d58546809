//! In-memory provider for tests and offline use.

use crate::error::{Error, Result};
use crate::item::{file_name, normalize_path, parent_path, ItemId, RemoteListing};
use crate::provider::{FetchedContent, RemoteProvider, Session};
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::Duration;

/// Identifier of the root folder of a `MemoryProvider`.
pub const MEMORY_ROOT_ID: &str = "root";

/// A deterministic provider that serves a tree held in memory.
///
/// Items are declared by path. Missing parent folders are created on the
/// fly with their path as identifier. Listings keep insertion order.
#[derive(Debug)]
pub struct MemoryProvider {
    root: ItemId,
    credentials: Option<(String, String)>,
    folder_ids: HashMap<String, ItemId>,
    listings: HashMap<ItemId, Vec<RemoteListing>>,
    contents: HashMap<ItemId, FetchedContent>,
    fetch_delay: Option<Duration>,
    failing_listings: Mutex<HashSet<ItemId>>,
    failing_fetches: Mutex<HashSet<ItemId>>,
    fetches: Mutex<HashMap<ItemId, usize>>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        let root = ItemId::new(MEMORY_ROOT_ID);
        let mut folder_ids = HashMap::new();
        folder_ids.insert("/".to_string(), root.clone());
        let mut listings = HashMap::new();
        listings.insert(root.clone(), Vec::new());

        Self {
            root,
            credentials: None,
            folder_ids,
            listings,
            contents: HashMap::new(),
            fetch_delay: None,
            failing_listings: Mutex::new(HashSet::new()),
            failing_fetches: Mutex::new(HashSet::new()),
            fetches: Mutex::new(HashMap::new()),
        }
    }

    /// Only accept this identity/secret pair in `authenticate`.
    pub fn with_credentials(mut self, identity: &str, secret: &str) -> Self {
        self.credentials = Some((identity.to_string(), secret.to_string()));
        self
    }

    /// Sleep this long inside every `fetch_content` call.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Declare a folder at `path`.
    pub fn folder(mut self, path: &str, id: impl Into<ItemId>) -> Self {
        let path = normalize_path(path);
        let id = id.into();
        let parent = self.ensure_folder(&parent_path(&path));
        self.push_listing(&parent, RemoteListing::folder(id.clone(), file_name(&path)));
        self.folder_ids.insert(path, id.clone());
        self.listings.entry(id).or_default();
        self
    }

    /// Declare a file at `path` with the given content.
    pub fn file(
        mut self,
        path: &str,
        id: impl Into<ItemId>,
        data: impl Into<Vec<u8>>,
        content_type: Option<&str>,
    ) -> Self {
        let path = normalize_path(path);
        let id = id.into();
        let parent = self.ensure_folder(&parent_path(&path));
        self.push_listing(&parent, RemoteListing::file(id.clone(), file_name(&path)));
        self.contents.insert(
            id,
            FetchedContent::new(data.into(), content_type.map(str::to_string)),
        );
        self
    }

    /// Make listings of `folder` fail with a transport error.
    pub fn fail_listing(&self, folder: impl Into<ItemId>) {
        self.failing_listings.lock().insert(folder.into());
    }

    /// Make fetches of `id` fail with a transport error.
    pub fn fail_fetch(&self, id: impl Into<ItemId>) {
        self.failing_fetches.lock().insert(id.into());
    }

    /// Remove every injected failure.
    pub fn clear_failures(&self) {
        self.failing_listings.lock().clear();
        self.failing_fetches.lock().clear();
    }

    /// Number of `fetch_content` calls made for `id`.
    pub fn fetch_count(&self, id: impl Into<ItemId>) -> usize {
        self.fetches.lock().get(&id.into()).copied().unwrap_or(0)
    }

    /// Number of `fetch_content` calls made overall.
    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().values().sum()
    }

    fn ensure_folder(&mut self, path: &str) -> ItemId {
        if let Some(id) = self.folder_ids.get(path) {
            return id.clone();
        }
        let id = ItemId::new(path);
        let parent = self.ensure_folder(&parent_path(path));
        self.push_listing(&parent, RemoteListing::folder(id.clone(), file_name(path)));
        self.folder_ids.insert(path.to_string(), id.clone());
        self.listings.entry(id.clone()).or_default();
        id
    }

    fn push_listing(&mut self, folder: &ItemId, listing: RemoteListing) {
        self.listings.entry(folder.clone()).or_default().push(listing);
    }
}

impl RemoteProvider for MemoryProvider {
    fn root_id(&self) -> ItemId {
        self.root.clone()
    }

    fn authenticate(&self, identity: &str, secret: &SecretString) -> Result<Session> {
        if let Some((expected_identity, expected_secret)) = &self.credentials {
            if identity != expected_identity || secret.expose_secret() != expected_secret {
                return Err(Error::Authentication("incorrect password".to_string()));
            }
        }
        Ok(Session::new(
            identity,
            SecretString::new(format!("memory:{}", identity)),
        ))
    }

    fn list_children(&self, _session: &Session, folder: &ItemId) -> Result<Vec<RemoteListing>> {
        if self.failing_listings.lock().contains(folder) {
            return Err(Error::Transport(format!("listing {} failed", folder)));
        }
        self.listings
            .get(folder)
            .cloned()
            .ok_or_else(|| Error::NotFound(folder.clone()))
    }

    fn fetch_content(&self, _session: &Session, identifier: &ItemId) -> Result<FetchedContent> {
        *self.fetches.lock().entry(identifier.clone()).or_insert(0) += 1;

        if let Some(delay) = self.fetch_delay {
            thread::sleep(delay);
        }
        if self.failing_fetches.lock().contains(identifier) {
            return Err(Error::Transport(format!("download of {} failed", identifier)));
        }
        self.contents
            .get(identifier)
            .cloned()
            .ok_or_else(|| Error::NotFound(identifier.clone()))
    }
}
