use crate::config::MountConfig;
use crate::error::{Error, Result};
use crate::hydrate::HydrationEngine;
use crate::namespace::{MaterializeStats, Namespace, NamespaceEntry};
use crate::registry::HydrationRegistry;
use crate::sweeper::{SweepReport, Sweeper};
use chrono::{DateTime, Utc};
use cloud_remote::{build_tree, RemoteProvider, SecretString, Session};
use log::{debug, info, trace};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Upper bound (exclusive) of the size reported for un-hydrated files.
pub const PLACEHOLDER_SIZE_LIMIT: u64 = 999_999;

/// Hydrations tried for one read or write before giving up on a file that
/// keeps getting evicted.
const HYDRATION_ATTEMPTS: usize = 3;

/// Size reported for a file whose content has not been fetched yet.
///
/// Many clients never issue a read against a file that reports zero
/// length, so placeholders advertise a random nonzero size. The first read
/// triggers hydration, after which the true length is reported.
pub fn placeholder_size() -> u64 {
    rand::thread_rng().gen_range(1..PLACEHOLDER_SIZE_LIMIT)
}

/// Attributes of a namespace node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAttr {
    /// Byte length, or a placeholder for un-hydrated files.
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub is_dir: bool,
    /// Permission bits: 0555 for directories, 0644 for files.
    pub perm: u16,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// How a file is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    /// Allow writes through the handle.
    pub write: bool,
    /// Discard existing content on open (only with `write`).
    pub truncate: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self::default()
    }

    pub fn read_write() -> Self {
        Self {
            write: true,
            truncate: false,
        }
    }
}

/// An open file handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(pub u64);

impl FileHandle {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Counters describing the current state of the filesystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsStats {
    /// Items in the installed remote tree.
    pub items: usize,
    /// Materialized namespace slots.
    pub slots: usize,
    /// Files tracked as hydrated.
    pub hydrated: usize,
    /// Open file handles.
    pub open_handles: usize,
}

struct OpenFile {
    entry: Arc<NamespaceEntry>,
    flags: OpenFlags,
}

struct CloudFsInner {
    config: MountConfig,
    namespace: Arc<Namespace>,
    registry: Arc<HydrationRegistry>,
    engine: HydrationEngine,
    sweeper: Sweeper,
    handles: Mutex<HashMap<u64, OpenFile>>,
    next_handle: AtomicU64,
    refresh_lock: Mutex<()>,
}

/// A lazily hydrated view of a remote content tree.
///
/// `CloudFs` is cheap to clone; clones share the same namespace, registry
/// and handle table.
#[derive(Clone)]
pub struct CloudFs {
    inner: Arc<CloudFsInner>,
}

impl CloudFs {
    /// Authenticate, build the remote tree and materialize it.
    pub fn connect(
        provider: Arc<dyn RemoteProvider>,
        config: MountConfig,
        secret: &SecretString,
    ) -> Result<Self> {
        config.validate()?;
        info!("Authenticating as {}", config.identity);
        let session = provider.authenticate(&config.identity, secret)?;

        let fs = Self::with_session(provider, session, config);
        fs.refresh()?;
        Ok(fs)
    }

    /// Create a filesystem over an existing session with an empty
    /// namespace. Nothing is fetched until `refresh` is called.
    pub fn with_session(
        provider: Arc<dyn RemoteProvider>,
        session: Session,
        config: MountConfig,
    ) -> Self {
        let namespace = Arc::new(Namespace::new());
        let registry = Arc::new(HydrationRegistry::new());
        let engine = HydrationEngine::new(provider, session, namespace.clone(), registry.clone());
        let sweeper = Sweeper::new(
            namespace.clone(),
            registry.clone(),
            config.stale_after(),
            config.max_cached_files,
        );

        Self {
            inner: Arc::new(CloudFsInner {
                config,
                namespace,
                registry,
                engine,
                sweeper,
                handles: Mutex::new(HashMap::new()),
                next_handle: AtomicU64::new(1),
                refresh_lock: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &MountConfig {
        &self.inner.config
    }

    pub fn namespace(&self) -> &Namespace {
        &self.inner.namespace
    }

    pub fn registry(&self) -> &HydrationRegistry {
        &self.inner.registry
    }

    /// Rebuild the remote tree and materialize it.
    ///
    /// On failure the current namespace is left untouched.
    pub fn refresh(&self) -> Result<MaterializeStats> {
        let _refresh = self.inner.refresh_lock.lock();
        let engine = &self.inner.engine;
        let tree = build_tree(engine.provider().as_ref(), engine.session())?;
        Ok(self.inner.namespace.materialize(&tree))
    }

    /// Fetch the content of `path` if it is still a placeholder.
    pub fn ensure_hydrated(&self, path: &str) -> Result<()> {
        let entry = self.inner.namespace.lookup(path)?;
        self.inner.engine.ensure_hydrated(&entry)?;
        Ok(())
    }

    /// Run one eviction sweep as of `now`.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        self.inner.sweeper.sweep(now)
    }

    pub fn stats(&self) -> FsStats {
        FsStats {
            items: self.inner.namespace.item_count(),
            slots: self.inner.namespace.len(),
            hydrated: self.inner.registry.len(),
            open_handles: self.inner.handles.lock().len(),
        }
    }

    /// Attributes of `path`.
    pub fn attr(&self, path: &str) -> Result<NodeAttr> {
        trace!("attr({})", path);
        let entry = self.inner.namespace.lookup(path)?;
        Ok(node_attr(&entry))
    }

    /// Look up `name` in the directory `dir`.
    pub fn lookup(&self, dir: &str, name: &str) -> Result<Arc<NamespaceEntry>> {
        trace!("lookup({}, {})", dir, name);
        self.inner.namespace.lookup_child(dir, name)
    }

    /// List the directory `dir` in provider order.
    pub fn read_dir_all(&self, dir: &str) -> Result<Vec<DirEntry>> {
        trace!("read_dir_all({})", dir);
        let children = self.inner.namespace.list_children(dir)?;
        Ok(children
            .iter()
            .map(|entry| DirEntry {
                name: entry.display_name(),
                is_dir: entry.is_dir(),
            })
            .collect())
    }

    /// Open `path`, hydrating it first.
    ///
    /// Opening for write with truncation starts from empty content and
    /// fetches nothing.
    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle> {
        trace!("open({}, {:?})", path, flags);
        let entry = self.inner.namespace.lookup(path)?;
        if flags.write && flags.truncate {
            self.inner.engine.hydrate_empty(&entry)?;
        } else {
            self.inner.engine.ensure_hydrated(&entry)?;
        }
        entry.touch(Utc::now());

        let fh = self.inner.next_handle.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handles
            .lock()
            .insert(fh, OpenFile { entry, flags });
        debug!("Opened {} as handle {}", path, fh);
        Ok(FileHandle(fh))
    }

    /// Read up to `size` bytes at `offset`.
    ///
    /// Content evicted while the handle was open is fetched again.
    pub fn read(&self, fh: FileHandle, offset: u64, size: usize) -> Result<Vec<u8>> {
        trace!("read(fh={}, offset={}, size={})", fh.0, offset, size);
        let (entry, _) = self.open_file(fh)?;
        self.with_hydrated(&entry, |entry| entry.read_if_hydrated(offset, size, Utc::now()))
    }

    /// Write `data` at `offset`. Returns the number of bytes written.
    pub fn write(&self, fh: FileHandle, offset: u64, data: &[u8]) -> Result<usize> {
        trace!("write(fh={}, offset={}, len={})", fh.0, offset, data.len());
        let (entry, flags) = self.open_file(fh)?;
        if !flags.write {
            return Err(Error::Unsupported(format!(
                "handle {} is not open for writing",
                fh.0
            )));
        }
        self.with_hydrated(&entry, |entry| entry.write_if_hydrated(offset, data, Utc::now()))?
    }

    /// Close a handle. Hydration state is left as it is.
    pub fn release(&self, fh: FileHandle) -> Result<()> {
        trace!("release(fh={})", fh.0);
        if let Some(open) = self.inner.handles.lock().remove(&fh.0) {
            open.entry.touch(Utc::now());
        }
        Ok(())
    }

    /// Extended attributes are not supported.
    pub fn getxattr(&self, path: &str, name: &str) -> Result<Vec<u8>> {
        trace!("getxattr({}, {})", path, name);
        Err(Error::NoXattr)
    }

    /// Run `access` against the content of `entry`, hydrating it first.
    ///
    /// `access` sees the slot under its own lock and answers `None` if a
    /// sweep evicted the content after hydration; the fetch is then
    /// repeated.
    fn with_hydrated<T>(
        &self,
        entry: &NamespaceEntry,
        access: impl Fn(&NamespaceEntry) -> Option<T>,
    ) -> Result<T> {
        for _ in 0..HYDRATION_ATTEMPTS {
            self.inner.engine.ensure_hydrated(entry)?;
            if let Some(value) = access(entry) {
                return Ok(value);
            }
            debug!("{} was evicted before access, hydrating again", entry.path());
        }
        Err(Error::Io(io::Error::new(
            io::ErrorKind::Interrupted,
            format!("{} was evicted {} times in a row", entry.path(), HYDRATION_ATTEMPTS),
        )))
    }

    fn open_file(&self, fh: FileHandle) -> Result<(Arc<NamespaceEntry>, OpenFlags)> {
        self.inner
            .handles
            .lock()
            .get(&fh.0)
            .map(|open| (open.entry.clone(), open.flags))
            .ok_or_else(|| Error::Unsupported(format!("handle {} was never opened", fh.0)))
    }
}

fn node_attr(entry: &NamespaceEntry) -> NodeAttr {
    let (size, perm) = if entry.is_dir() {
        (0, 0o555)
    } else if entry.is_hydrated() {
        (entry.content_len(), 0o644)
    } else {
        (placeholder_size(), 0o644)
    };

    NodeAttr {
        size,
        modified: entry.modified(),
        created: entry.created(),
        is_dir: entry.is_dir(),
        perm,
    }
}
