//! # cloud-remote
//!
//! The remote side of a lazily hydrated virtual filesystem.
//!
//! This crate provides:
//! - The `RemoteItem` tree model and path helpers
//! - The `RemoteProvider` collaborator trait and its opaque `Session`
//! - A breadth-first tree builder
//! - A blocking HTTP/JSON provider and an in-memory provider
//!
//! ## Example
//!
//! ```ignore
//! use cloud_remote::{build_tree, HttpProvider, HttpProviderConfig, RemoteProvider};
//! use secrecy::SecretString;
//!
//! let provider = HttpProvider::new(HttpProviderConfig::default())?;
//! let session = provider.authenticate("alice", &SecretString::new("pw".into()))?;
//! let tree = build_tree(&provider, &session)?;
//!
//! for item in tree.walk() {
//!     println!("{} ({})", item.path, item.identifier);
//! }
//! ```

mod error;
mod http;
mod item;
mod memory;
mod provider;
mod tree;

pub use error::{Error, Result};
pub use http::{parse_listing, HttpProvider, HttpProviderConfig};
pub use item::{
    file_name, join_path, normalize_path, parent_path, ItemId, RemoteItem, RemoteListing, Walk,
};
pub use memory::{MemoryProvider, MEMORY_ROOT_ID};
pub use provider::{FetchedContent, RemoteProvider, Session};
pub use tree::{build_tree, sanitize_name, TreeBuilder};

// Re-export secrecy for consumers building sessions and credentials
pub use secrecy::{ExposeSecret, SecretString};
