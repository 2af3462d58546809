use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier assigned to an item by the remote provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A single child entry as reported by `RemoteProvider::list_children`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteListing {
    /// Provider identifier of the entry.
    pub identifier: ItemId,
    /// Raw entry name.
    pub name: String,
    /// Whether the provider classified the entry as a folder.
    pub is_folder: bool,
}

impl RemoteListing {
    pub fn folder(identifier: impl Into<ItemId>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            is_folder: true,
        }
    }

    pub fn file(identifier: impl Into<ItemId>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            is_folder: false,
        }
    }
}

/// A node of the remote content tree.
///
/// The tree is rooted at `/`. Every non-root item has exactly one parent and
/// its `path` is the join of its ancestors' names, unique across the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    /// Provider identifier.
    pub identifier: ItemId,
    /// Identifier of the parent folder (`None` for the root).
    pub parent_identifier: Option<ItemId>,
    /// Entry name (empty for the root).
    pub name: String,
    /// Absolute path inside the tree.
    pub path: String,
    /// Whether this item is a folder.
    pub is_folder: bool,
    /// Children in the order the provider returned them.
    pub children: Vec<RemoteItem>,
}

impl RemoteItem {
    /// Create the root folder of a tree.
    pub fn root(identifier: impl Into<ItemId>) -> Self {
        Self {
            identifier: identifier.into(),
            parent_identifier: None,
            name: String::new(),
            path: "/".to_string(),
            is_folder: true,
            children: Vec::new(),
        }
    }

    /// Find an item by absolute path.
    pub fn find(&self, path: &str) -> Option<&RemoteItem> {
        let path = normalize_path(path);
        if self.path == path {
            return Some(self);
        }

        let mut current = self;
        let mut prefix = String::from("/");
        for segment in path.trim_start_matches('/').split('/') {
            prefix = join_path(&prefix, segment);
            current = current.children.iter().find(|c| c.path == prefix)?;
        }
        Some(current)
    }

    /// Iterate over this item and all of its descendants in pre-order.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    /// Number of items in this subtree, including `self`.
    pub fn len(&self) -> usize {
        self.walk().count()
    }

    /// Always false: a tree contains at least its root.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Pre-order iterator over a `RemoteItem` subtree.
pub struct Walk<'a> {
    stack: Vec<&'a RemoteItem>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a RemoteItem;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.stack.pop()?;
        self.stack.extend(item.children.iter().rev());
        Some(item)
    }
}

/// Normalize a path: leading slash, no trailing slash, `/` for empty.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.is_empty() || path == "/" {
        return "/".to_string();
    }

    let mut normalized = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }

    normalized
}

/// Join a child name onto a parent path.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" || parent.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Parent of a path (`/` for top-level entries and the root itself).
pub fn parent_path(path: &str) -> String {
    let normalized = normalize_path(path);
    match normalized.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(pos) => normalized[..pos].to_string(),
    }
}

/// Last segment of a path (empty for the root).
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim().trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}
