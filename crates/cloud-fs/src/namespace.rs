//! Addressable directory and file slots built from the remote tree.
//!
//! The namespace keeps two layers:
//! - an index of the installed `RemoteItem` tree (what exists remotely)
//! - the materialized `NamespaceEntry` slots (what the filesystem serves)
//!
//! Slots are created eagerly by `materialize` or lazily on first lookup.
//! Creating a slot never fetches content; hydration is a separate step.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use cloud_remote::{file_name, join_path, normalize_path, parent_path, ItemId, RemoteItem};
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Largest size a write may grow a file to (64 GiB).
pub const MAX_FILE_SIZE: u64 = 1 << 36;

/// Suffix shown on files whose content is a zip archive.
const ARCHIVE_SUFFIX: &str = ".zip";

/// Whether a slot is a directory or a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// Hydration state of a file slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// The slot exists but holds no fetched content.
    Registered,
    /// Content has been fetched and stored.
    Hydrated,
}

#[derive(Debug)]
struct FileSlot {
    content: Vec<u8>,
    state: FileState,
    hydrated_at: Option<DateTime<Utc>>,
    modified: DateTime<Utc>,
    last_access: DateTime<Utc>,
    display_name: String,
}

/// A materialized directory or file.
///
/// Structure (path, identifier, kind) is fixed at creation. Content and
/// hydration state live behind a per-entry lock so hydration and eviction
/// of one file never contend with another.
#[derive(Debug)]
pub struct NamespaceEntry {
    path: String,
    name: String,
    identifier: ItemId,
    kind: EntryKind,
    created: DateTime<Utc>,
    slot: Mutex<FileSlot>,
}

impl NamespaceEntry {
    fn new(path: &str, node: &IndexNode, now: DateTime<Utc>) -> Self {
        Self {
            path: path.to_string(),
            name: node.name.clone(),
            identifier: node.identifier.clone(),
            kind: node.kind(),
            created: now,
            slot: Mutex::new(FileSlot {
                content: Vec::new(),
                state: FileState::Registered,
                hydrated_at: None,
                modified: now,
                last_access: now,
                display_name: node.name.clone(),
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name as listed by the provider.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name shown in directory listings. Gains a `.zip` suffix once the
    /// fetched content turns out to be an archive.
    pub fn display_name(&self) -> String {
        self.slot.lock().display_name.clone()
    }

    pub fn identifier(&self) -> &ItemId {
        &self.identifier
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Hydration state. Directories always report `Registered`.
    pub fn state(&self) -> FileState {
        self.slot.lock().state
    }

    pub fn is_hydrated(&self) -> bool {
        self.state() == FileState::Hydrated
    }

    pub fn hydrated_at(&self) -> Option<DateTime<Utc>> {
        self.slot.lock().hydrated_at
    }

    pub fn modified(&self) -> DateTime<Utc> {
        self.slot.lock().modified
    }

    pub fn last_access(&self) -> DateTime<Utc> {
        self.slot.lock().last_access
    }

    /// Length of the stored content in bytes.
    pub fn content_len(&self) -> u64 {
        self.slot.lock().content.len() as u64
    }

    /// Whether `name` addresses this entry, by listed or display name.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.slot.lock().display_name == name
    }

    /// Store fetched content and move the slot to `Hydrated`.
    pub(crate) fn hydrate(&self, content: Vec<u8>, at: DateTime<Utc>) {
        let mut slot = self.slot.lock();
        slot.content = content;
        slot.state = FileState::Hydrated;
        slot.hydrated_at = Some(at);
        slot.modified = at;
        slot.last_access = at;
    }

    /// Drop the content if the slot is still the hydration recorded at
    /// `hydrated_at`. Returns whether the slot was evicted.
    pub(crate) fn evict_if_hydrated_at(&self, hydrated_at: DateTime<Utc>) -> bool {
        let mut slot = self.slot.lock();
        if slot.state != FileState::Hydrated || slot.hydrated_at != Some(hydrated_at) {
            return false;
        }
        slot.content = Vec::new();
        slot.state = FileState::Registered;
        slot.hydrated_at = None;
        true
    }

    pub(crate) fn touch(&self, at: DateTime<Utc>) {
        let mut slot = self.slot.lock();
        if at > slot.last_access {
            slot.last_access = at;
        }
    }

    /// Read up to `size` bytes at `offset`. Short at end of content.
    ///
    /// Returns `None` without reading if the slot holds no content.
    pub(crate) fn read_if_hydrated(
        &self,
        offset: u64,
        size: usize,
        at: DateTime<Utc>,
    ) -> Option<Vec<u8>> {
        let mut slot = self.slot.lock();
        if slot.state != FileState::Hydrated {
            return None;
        }
        if at > slot.last_access {
            slot.last_access = at;
        }

        let len = slot.content.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(len);
        let end = start.saturating_add(size).min(len);
        Some(slot.content[start..end].to_vec())
    }

    /// Write `data` at `offset`, zero-filling any gap past the end.
    ///
    /// Returns `None` without writing if the slot holds no content.
    pub(crate) fn write_if_hydrated(
        &self,
        offset: u64,
        data: &[u8],
        at: DateTime<Utc>,
    ) -> Option<Result<usize>> {
        let mut slot = self.slot.lock();
        if slot.state != FileState::Hydrated {
            return None;
        }
        Some(slot.write(&self.path, offset, data, at))
    }
}

impl FileSlot {
    fn write(&mut self, path: &str, offset: u64, data: &[u8], at: DateTime<Utc>) -> Result<usize> {
        let too_large = || Error::FileTooLarge(format!("{} at offset {}", path, offset));
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= MAX_FILE_SIZE)
            .ok_or_else(too_large)?;
        let end = usize::try_from(end).map_err(|_| too_large())?;
        let start = end - data.len();

        if self.content.len() < end {
            self.content
                .try_reserve(end - self.content.len())
                .map_err(|_| too_large())?;
            self.content.resize(end, 0);
        }
        self.content[start..end].copy_from_slice(data);
        self.modified = at;
        self.last_access = at;
        Ok(data.len())
    }
}

#[derive(Debug, Clone)]
struct IndexNode {
    identifier: ItemId,
    name: String,
    is_folder: bool,
    children: Vec<String>,
}

impl IndexNode {
    fn kind(&self) -> EntryKind {
        if self.is_folder {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

#[derive(Debug, Default)]
struct NamespaceInner {
    index: HashMap<String, IndexNode>,
    entries: HashMap<String, Arc<NamespaceEntry>>,
}

impl NamespaceInner {
    fn slot(&mut self, path: &str, now: DateTime<Utc>) -> Result<Arc<NamespaceEntry>> {
        if let Some(entry) = self.entries.get(path) {
            return Ok(entry.clone());
        }
        let node = self
            .index
            .get(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        let entry = Arc::new(NamespaceEntry::new(path, node, now));
        debug!("Created slot for {}", path);
        self.entries.insert(path.to_string(), entry.clone());
        Ok(entry)
    }
}

/// Counters returned by `Namespace::materialize`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeStats {
    pub created: usize,
    pub reused: usize,
    pub dropped: usize,
}

/// The in-memory directory/file namespace.
#[derive(Debug, Default)]
pub struct Namespace {
    inner: RwLock<NamespaceInner>,
}

impl Namespace {
    /// Create an empty namespace. Every lookup fails until a tree is
    /// installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `tree` and create a slot for every item.
    ///
    /// Slots whose path, identifier and kind are unchanged are kept as they
    /// are, hydrated content included. Calling this twice with the same
    /// tree leaves the namespace unchanged.
    pub fn materialize(&self, tree: &RemoteItem) -> MaterializeStats {
        self.rebuild(tree, true)
    }

    /// Install `tree` without creating slots beyond the root. Slots are
    /// created on first lookup.
    pub fn install(&self, tree: &RemoteItem) -> MaterializeStats {
        self.rebuild(tree, false)
    }

    fn rebuild(&self, tree: &RemoteItem, eager: bool) -> MaterializeStats {
        let now = Utc::now();
        let index = build_index(tree);

        let mut inner = self.inner.write();
        let mut old_entries = std::mem::take(&mut inner.entries);
        let mut stats = MaterializeStats::default();

        for (path, node) in &index {
            let reused = match old_entries.remove(path) {
                Some(entry) if entry.identifier == node.identifier && entry.kind == node.kind() => {
                    Some(entry)
                }
                Some(_) => {
                    stats.dropped += 1;
                    None
                }
                None => None,
            };
            match reused {
                Some(entry) => {
                    inner.entries.insert(path.clone(), entry);
                    stats.reused += 1;
                }
                None if eager || path == "/" => {
                    inner
                        .entries
                        .insert(path.clone(), Arc::new(NamespaceEntry::new(path, node, now)));
                    stats.created += 1;
                }
                None => {}
            }
        }
        stats.dropped += old_entries.len();
        inner.index = index;

        info!(
            "Namespace installed: {} items, {} slots created, {} reused, {} dropped",
            inner.index.len(),
            stats.created,
            stats.reused,
            stats.dropped
        );
        stats
    }

    /// Look up the entry at `path`, creating its slot (and its ancestors')
    /// if the item exists but has not been materialized yet.
    ///
    /// The last segment may be a display name, as in `lookup_child`.
    pub fn lookup(&self, path: &str) -> Result<Arc<NamespaceEntry>> {
        let path = normalize_path(path);
        if let Some(entry) = self.get(&path) {
            return Ok(entry);
        }
        match self.ensure_slot(&path) {
            Err(Error::NotFound(_)) if path != "/" => self
                .lookup_child(&parent_path(&path), file_name(&path))
                .map_err(|_| Error::NotFound(path)),
            result => result,
        }
    }

    /// Look up `name` among the children of the directory `dir`.
    ///
    /// `name` may be either the listed name or the display name.
    pub fn lookup_child(&self, dir: &str, name: &str) -> Result<Arc<NamespaceEntry>> {
        let dir = normalize_path(dir);
        let children = self.child_paths(&dir)?;

        let direct = join_path(&dir, name);
        if children.contains(&direct) {
            return self.ensure_slot(&direct);
        }

        for child in &children {
            if let Some(entry) = self.get(child) {
                if entry.answers_to(name) {
                    return Ok(entry);
                }
            }
        }
        Err(Error::NotFound(direct))
    }

    /// Children of `dir` in provider order. Missing slots are created.
    pub fn list_children(&self, dir: &str) -> Result<Vec<Arc<NamespaceEntry>>> {
        let dir = normalize_path(dir);
        let children = self.child_paths(&dir)?;

        let now = Utc::now();
        let mut inner = self.inner.write();
        children
            .iter()
            .map(|child| inner.slot(child, now))
            .collect()
    }

    /// The materialized entry at `path`, without creating one.
    pub fn get(&self, path: &str) -> Option<Arc<NamespaceEntry>> {
        self.inner.read().entries.get(path).cloned()
    }

    /// Create the slot for `path` and any missing ancestors. Never
    /// hydrates.
    pub fn ensure_slot(&self, path: &str) -> Result<Arc<NamespaceEntry>> {
        let path = normalize_path(path);
        let now = Utc::now();
        let mut inner = self.inner.write();

        if !inner.index.contains_key(&path) {
            return Err(Error::NotFound(path));
        }

        let mut chain = vec![path.clone()];
        let mut current = path.clone();
        while current != "/" {
            current = parent_path(&current);
            chain.push(current.clone());
        }
        for ancestor in chain[1..].iter().rev() {
            inner.slot(ancestor, now)?;
        }
        inner.slot(&path, now)
    }

    /// Show `entry` under a `.zip` name that no sibling already uses.
    ///
    /// Listed names that already end in `.zip` and entries renamed by an
    /// earlier hydration are left alone. On a clash a counter is inserted,
    /// `slides` becoming `slides (2).zip`.
    pub(crate) fn rename_as_archive(&self, entry: &NamespaceEntry) {
        if entry.name.ends_with(ARCHIVE_SUFFIX) {
            return;
        }

        // Held for writing so two siblings never claim the same name.
        let inner = self.inner.write();
        if entry.display_name() != entry.name {
            return;
        }

        let siblings = inner
            .index
            .get(&parent_path(&entry.path))
            .map(|parent| parent.children.clone())
            .unwrap_or_default();
        let mut taken = HashSet::new();
        for sibling in siblings.iter().filter(|path| **path != entry.path) {
            if let Some(node) = inner.index.get(sibling) {
                taken.insert(node.name.clone());
            }
            if let Some(other) = inner.entries.get(sibling) {
                taken.insert(other.display_name());
            }
        }

        let mut name = format!("{}{}", entry.name, ARCHIVE_SUFFIX);
        let mut n = 2;
        while taken.contains(&name) {
            name = format!("{} ({}){}", entry.name, n, ARCHIVE_SUFFIX);
            n += 1;
        }

        debug!("Showing archive {} as '{}'", entry.path, name);
        entry.slot.lock().display_name = name;
    }

    /// Number of materialized slots.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Number of items in the installed tree.
    pub fn item_count(&self) -> usize {
        self.inner.read().index.len()
    }

    fn child_paths(&self, dir: &str) -> Result<Vec<String>> {
        let inner = self.inner.read();
        let node = inner
            .index
            .get(dir)
            .ok_or_else(|| Error::NotFound(dir.to_string()))?;
        if !node.is_folder {
            return Err(Error::NotDirectory(dir.to_string()));
        }
        Ok(node.children.clone())
    }
}

fn build_index(tree: &RemoteItem) -> HashMap<String, IndexNode> {
    tree.walk()
        .map(|item| {
            let node = IndexNode {
                identifier: item.identifier.clone(),
                name: item.name.clone(),
                is_folder: item.is_folder,
                children: item.children.iter().map(|c| c.path.clone()).collect(),
            };
            (item.path.clone(), node)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(parent: &RemoteItem, id: &str, name: &str) -> RemoteItem {
        RemoteItem {
            identifier: ItemId::new(id),
            parent_identifier: Some(parent.identifier.clone()),
            name: name.to_string(),
            path: join_path(&parent.path, name),
            is_folder: false,
            children: Vec::new(),
        }
    }

    fn sample_tree() -> RemoteItem {
        let mut root = RemoteItem::root("-1");
        let mut course = RemoteItem {
            identifier: ItemId::new("cs101"),
            parent_identifier: Some(root.identifier.clone()),
            name: "CS101".to_string(),
            path: "/CS101".to_string(),
            is_folder: true,
            children: Vec::new(),
        };
        course.children.push(file(&course, "42", "syllabus.pdf"));
        course.children.push(file(&course, "43", "notes.txt"));
        root.children.push(course);
        root.children.push(file(&root, "7", "readme.md"));
        root
    }

    #[test]
    fn test_materialize_creates_every_slot() {
        let ns = Namespace::new();
        let stats = ns.materialize(&sample_tree());

        assert_eq!(stats.created, 5);
        assert_eq!(ns.len(), 5);
        assert!(ns.get("/CS101/syllabus.pdf").is_some());
    }

    #[test]
    fn test_materialize_is_idempotent() {
        let ns = Namespace::new();
        let tree = sample_tree();
        ns.materialize(&tree);
        let before = ns.get("/CS101/notes.txt").unwrap();

        let stats = ns.materialize(&tree);
        let after = ns.get("/CS101/notes.txt").unwrap();

        assert_eq!(stats.created, 0);
        assert_eq!(stats.reused, 5);
        assert_eq!(ns.len(), 5);
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_materialize_drops_vanished_and_replaced_slots() {
        let ns = Namespace::new();
        ns.materialize(&sample_tree());

        let mut tree = sample_tree();
        tree.children.retain(|c| c.name != "readme.md");
        tree.children[0].children[0].identifier = ItemId::new("99");
        let stats = ns.materialize(&tree);

        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.created, 1);
        assert!(ns.get("/readme.md").is_none());
        assert_eq!(
            ns.get("/CS101/syllabus.pdf").unwrap().identifier().as_str(),
            "99"
        );
    }

    #[test]
    fn test_lazy_lookup_creates_slots_without_hydrating() {
        let ns = Namespace::new();
        ns.install(&sample_tree());
        assert_eq!(ns.len(), 1);
        assert!(ns.get("/CS101/syllabus.pdf").is_none());

        let entry = ns.lookup("/CS101/syllabus.pdf").unwrap();
        assert_eq!(entry.state(), FileState::Registered);
        assert_eq!(entry.content_len(), 0);
        assert!(ns.get("/CS101").is_some());
        assert_eq!(ns.len(), 3);
    }

    #[test]
    fn test_lookup_child_and_listing() {
        let ns = Namespace::new();
        ns.install(&sample_tree());

        let dir = ns.lookup_child("/", "CS101").unwrap();
        assert!(dir.is_dir());

        let names: Vec<_> = ns
            .list_children("/CS101")
            .unwrap()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["syllabus.pdf", "notes.txt"]);

        assert!(matches!(
            ns.lookup_child("/CS101", "missing"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            ns.list_children("/readme.md"),
            Err(Error::NotDirectory(_))
        ));
    }

    #[test]
    fn test_lookup_child_accepts_display_name() {
        let ns = Namespace::new();
        ns.materialize(&sample_tree());
        let entry = ns.lookup("/CS101/notes.txt").unwrap();
        ns.rename_as_archive(&entry);
        entry.hydrate(b"PK\x03\x04".to_vec(), Utc::now());

        assert_eq!(entry.display_name(), "notes.txt.zip");
        let by_display = ns.lookup_child("/CS101", "notes.txt.zip").unwrap();
        let by_name = ns.lookup_child("/CS101", "notes.txt").unwrap();
        assert!(Arc::ptr_eq(&by_display, &by_name));

        let by_path = ns.lookup("/CS101/notes.txt.zip").unwrap();
        assert!(Arc::ptr_eq(&by_path, &by_name));
        assert!(matches!(
            ns.lookup("/CS101/notes.zip"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_archive_rename_avoids_sibling_names() {
        let mut tree = sample_tree();
        let course = tree.children[0].clone();
        tree.children[0]
            .children
            .push(file(&course, "44", "notes.txt.zip"));
        tree.children[0]
            .children
            .push(file(&course, "45", "notes.txt (2).zip"));
        let ns = Namespace::new();
        ns.materialize(&tree);

        let entry = ns.lookup("/CS101/notes.txt").unwrap();
        ns.rename_as_archive(&entry);
        assert_eq!(entry.display_name(), "notes.txt (3).zip");

        // A second hydration keeps the name it was given
        ns.rename_as_archive(&entry);
        assert_eq!(entry.display_name(), "notes.txt (3).zip");

        let real = ns.lookup_child("/CS101", "notes.txt.zip").unwrap();
        assert_eq!(real.path(), "/CS101/notes.txt.zip");
        ns.rename_as_archive(&real);
        assert_eq!(real.display_name(), "notes.txt.zip");
    }

    #[test]
    fn test_empty_namespace_has_no_root() {
        let ns = Namespace::new();
        assert!(matches!(ns.lookup("/"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_entry_read_write() {
        let ns = Namespace::new();
        ns.materialize(&sample_tree());
        let entry = ns.lookup("/readme.md").unwrap();
        let now = Utc::now();
        entry.hydrate(Vec::new(), now);

        assert_eq!(entry.write_if_hydrated(2, b"abc", now).unwrap().unwrap(), 3);
        assert_eq!(entry.read_if_hydrated(0, 10, now).unwrap(), b"\0\0abc");
        assert_eq!(entry.read_if_hydrated(4, 10, now).unwrap(), b"c");
        assert!(entry.read_if_hydrated(99, 10, now).unwrap().is_empty());
    }

    #[test]
    fn test_write_past_size_limit_is_rejected() {
        let ns = Namespace::new();
        ns.materialize(&sample_tree());
        let entry = ns.lookup("/readme.md").unwrap();
        let now = Utc::now();
        entry.hydrate(b"readme".to_vec(), now);

        for offset in [MAX_FILE_SIZE, u64::MAX - 1, (i64::MAX - 10) as u64] {
            assert!(matches!(
                entry.write_if_hydrated(offset, b"x", now),
                Some(Err(Error::FileTooLarge(_)))
            ));
        }
        assert_eq!(entry.read_if_hydrated(0, 64, now).unwrap(), b"readme");
    }

    #[test]
    fn test_evicted_entry_refuses_access() {
        let ns = Namespace::new();
        ns.materialize(&sample_tree());
        let entry = ns.lookup("/readme.md").unwrap();
        let now = Utc::now();

        assert!(entry.read_if_hydrated(0, 10, now).is_none());
        entry.hydrate(b"readme".to_vec(), now);
        assert!(entry.evict_if_hydrated_at(now));

        assert!(entry.read_if_hydrated(0, 10, now).is_none());
        assert!(entry.write_if_hydrated(0, b"late", now).is_none());
        assert_eq!(entry.state(), FileState::Registered);
        assert_eq!(entry.content_len(), 0);
    }

    #[test]
    fn test_evict_compares_hydration_time() {
        let ns = Namespace::new();
        ns.materialize(&sample_tree());
        let entry = ns.lookup("/readme.md").unwrap();
        let first = Utc::now();
        let second = first + chrono::Duration::seconds(1);

        entry.hydrate(b"one".to_vec(), first);
        entry.hydrate(b"two".to_vec(), second);

        assert!(!entry.evict_if_hydrated_at(first));
        assert!(entry.is_hydrated());
        assert!(entry.evict_if_hydrated_at(second));
        assert_eq!(entry.state(), FileState::Registered);
        assert_eq!(entry.content_len(), 0);
    }
}
