//! Breadth-first construction of the remote item tree.

use crate::error::{Error, Result};
use crate::item::{join_path, ItemId, RemoteItem};
use crate::provider::{RemoteProvider, Session};
use log::{debug, info, warn};
use std::collections::{HashSet, VecDeque};

/// Name used for entries the provider reports without a usable name.
const UNNAMED: &str = "unnamed";

/// Build the full item tree by walking the provider breadth-first.
///
/// Any provider error aborts the whole build; no partial tree is returned.
pub fn build_tree(provider: &dyn RemoteProvider, session: &Session) -> Result<RemoteItem> {
    TreeBuilder::new(provider, session).build()
}

/// Breadth-first tree builder over a `RemoteProvider`.
pub struct TreeBuilder<'a> {
    provider: &'a dyn RemoteProvider,
    session: &'a Session,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(provider: &'a dyn RemoteProvider, session: &'a Session) -> Self {
        Self { provider, session }
    }

    /// Walk the provider and assemble the tree.
    pub fn build(&self) -> Result<RemoteItem> {
        let root_id = self.provider.root_id();

        // Flat arena; children always land after their parent.
        let mut items: Vec<Option<RemoteItem>> = vec![Some(RemoteItem::root(root_id.clone()))];
        let mut children: Vec<Vec<usize>> = vec![Vec::new()];
        let mut queue: VecDeque<usize> = VecDeque::from([0]);
        let mut visited: HashSet<ItemId> = HashSet::from([root_id]);
        let (mut folders, mut files) = (0usize, 0usize);

        while let Some(index) = queue.pop_front() {
            let (folder_id, folder_path) = match &items[index] {
                Some(item) => (item.identifier.clone(), item.path.clone()),
                None => continue,
            };

            let listings = self.provider.list_children(self.session, &folder_id)?;
            debug!(
                "Listed {} entries under '{}' ({})",
                listings.len(),
                folder_path,
                folder_id
            );

            let mut names = SiblingNames::default();
            for listing in listings {
                let name = names.claim(sanitize_name(&listing.name));
                let path = join_path(&folder_path, &name);
                let child_index = items.len();

                if listing.is_folder {
                    folders += 1;
                    if visited.insert(listing.identifier.clone()) {
                        queue.push_back(child_index);
                    } else {
                        warn!(
                            "Folder {} listed more than once, not descending into '{}'",
                            listing.identifier, path
                        );
                    }
                } else {
                    files += 1;
                }

                items.push(Some(RemoteItem {
                    identifier: listing.identifier,
                    parent_identifier: Some(folder_id.clone()),
                    name,
                    path,
                    is_folder: listing.is_folder,
                    children: Vec::new(),
                }));
                children.push(Vec::new());
                children[index].push(child_index);
            }
        }

        info!("Built remote tree: {} folders, {} files", folders, files);
        assemble(items, children)
    }
}

/// Fold the arena back into a nested tree, leaves first.
fn assemble(mut items: Vec<Option<RemoteItem>>, children: Vec<Vec<usize>>) -> Result<RemoteItem> {
    for index in (0..items.len()).rev() {
        let kids: Vec<RemoteItem> = children[index]
            .iter()
            .filter_map(|&child| items[child].take())
            .collect();
        if let Some(item) = items[index].as_mut() {
            item.children = kids;
        }
    }

    items
        .into_iter()
        .next()
        .flatten()
        .ok_or_else(|| Error::ProviderFormat("tree has no root".to_string()))
}

/// Make a provider name safe to use as a single path segment.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\0' { '_' } else { c })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => UNNAMED.to_string(),
        _ => cleaned,
    }
}

/// Tracks names already used inside one folder.
#[derive(Default)]
struct SiblingNames {
    taken: HashSet<String>,
}

impl SiblingNames {
    fn claim(&mut self, name: String) -> String {
        if self.taken.insert(name.clone()) {
            return name;
        }

        let mut n = 2;
        loop {
            let candidate = with_counter(&name, n);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

fn with_counter(name: &str, n: usize) -> String {
    match name.rfind('.') {
        Some(pos) if pos > 0 => format!("{} ({}){}", &name[..pos], n, &name[pos..]),
        _ => format!("{} ({})", name, n),
    }
}
