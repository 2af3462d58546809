//! On-demand content fetching.

use crate::error::{Error, Result};
use crate::namespace::{Namespace, NamespaceEntry};
use crate::registry::HydrationRegistry;
use chrono::Utc;
use cloud_remote::{RemoteProvider, Session};
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Content types that mark a download as a zip archive.
const ARCHIVE_CONTENT_TYPES: &[&str] = &["application/zip", "application/x-zip-compressed"];

/// Local file header signature of a zip archive.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Turns placeholder files into fetched content.
///
/// Concurrent requests for the same path are coalesced: the first caller
/// downloads while the others wait on a per-path gate and then find the
/// entry hydrated.
pub struct HydrationEngine {
    provider: Arc<dyn RemoteProvider>,
    session: Session,
    namespace: Arc<Namespace>,
    registry: Arc<HydrationRegistry>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl HydrationEngine {
    pub fn new(
        provider: Arc<dyn RemoteProvider>,
        session: Session,
        namespace: Arc<Namespace>,
        registry: Arc<HydrationRegistry>,
    ) -> Self {
        Self {
            provider,
            session,
            namespace,
            registry,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn provider(&self) -> &Arc<dyn RemoteProvider> {
        &self.provider
    }

    /// Make sure `entry` holds its content.
    ///
    /// Returns `true` if this call performed the download, `false` if the
    /// entry was already hydrated. On failure the entry stays `Registered`
    /// so the next access retries.
    pub fn ensure_hydrated(&self, entry: &NamespaceEntry) -> Result<bool> {
        if entry.is_dir() {
            return Err(Error::IsDirectory(entry.path().to_string()));
        }
        if entry.is_hydrated() {
            return Ok(false);
        }

        let gate = self.gate(entry.path());
        let result = {
            let _flight = gate.lock();
            if entry.is_hydrated() {
                Ok(false)
            } else {
                self.fetch_into(entry).map(|_| true)
            }
        };
        self.release_gate(entry.path(), &gate);
        result
    }

    /// Hydrate `entry` with empty content without fetching anything.
    ///
    /// Used when a file is opened for truncation and whatever the provider
    /// holds would be discarded anyway.
    pub fn hydrate_empty(&self, entry: &NamespaceEntry) -> Result<()> {
        if entry.is_dir() {
            return Err(Error::IsDirectory(entry.path().to_string()));
        }

        let gate = self.gate(entry.path());
        {
            let _flight = gate.lock();
            let at = Utc::now();
            entry.hydrate(Vec::new(), at);
            self.registry.record(entry.path(), at);
        }
        self.release_gate(entry.path(), &gate);

        debug!("Truncated {} without fetching", entry.path());
        Ok(())
    }

    fn gate(&self, path: &str) -> Arc<Mutex<()>> {
        self.in_flight
            .lock()
            .entry(path.to_string())
            .or_default()
            .clone()
    }

    fn release_gate(&self, path: &str, gate: &Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock();
        if let Some(current) = in_flight.get(path) {
            if Arc::ptr_eq(current, gate) && Arc::strong_count(gate) <= 2 {
                in_flight.remove(path);
            }
        }
    }

    fn fetch_into(&self, entry: &NamespaceEntry) -> Result<()> {
        debug!("Hydrating {} (id {})", entry.path(), entry.identifier());

        let fetched = self
            .provider
            .fetch_content(&self.session, entry.identifier())
            .map_err(|e| {
                warn!("Failed to hydrate {}: {}", entry.path(), e);
                Error::from(e)
            })?;

        let archive = is_archive(fetched.content_type.as_deref(), &fetched.data);
        let size = fetched.data.len();
        if archive {
            self.namespace.rename_as_archive(entry);
        }
        let at = Utc::now();
        entry.hydrate(fetched.data, at);
        self.registry.record(entry.path(), at);

        debug!(
            "Hydrated {} ({} bytes{})",
            entry.path(),
            size,
            if archive { ", archive" } else { "" }
        );
        Ok(())
    }
}

/// Whether fetched content is a zip archive, by content type or magic.
pub fn is_archive(content_type: Option<&str>, data: &[u8]) -> bool {
    let by_type = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| {
            let ct = ct.trim();
            ARCHIVE_CONTENT_TYPES
                .iter()
                .any(|known| ct.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false);

    by_type || data.starts_with(ZIP_MAGIC)
}
