//! # cloud-fs
//!
//! A lazily hydrated virtual filesystem over a remote content tree.
//!
//! This crate provides:
//! - An in-memory namespace materialized from the remote tree
//! - On-demand hydration of file content with per-path coalescing
//! - A hydration registry and a periodic eviction sweeper
//! - Node operations (attr, lookup, readdir, open, read, write, release)
//! - FUSE filesystem support (optional, with `fuse` feature)
//!
//! ## Example
//!
//! ```ignore
//! use cloud_fs::{CloudFs, MountConfig, OpenFlags};
//! use cloud_remote::{MemoryProvider, SecretString};
//! use std::sync::Arc;
//!
//! let provider = MemoryProvider::new().file("/CS101/syllabus.pdf", "42", "...", None);
//! let fs = CloudFs::connect(Arc::new(provider), MountConfig::default(), &SecretString::new("pw".into()))?;
//!
//! // Placeholder size until the first open
//! println!("{}", fs.attr("/CS101/syllabus.pdf")?.size);
//!
//! let fh = fs.open("/CS101/syllabus.pdf", OpenFlags::read_only())?;
//! let data = fs.read(fh, 0, 4096)?;
//! fs.release(fh)?;
//! ```
//!
//! ## FUSE Support (Optional)
//!
//! Enable the `fuse` feature to mount a `CloudFs` on Linux or macOS:
//!
//! ```ignore
//! use cloud_fs::fuse::mount;
//!
//! mount(fs, "/mnt/cloud")?;
//! ```

mod config;
mod error;
mod hydrate;
mod namespace;
mod registry;
pub mod sweeper;
mod vfs;

#[cfg(feature = "fuse")]
pub mod fuse;

pub use config::MountConfig;
pub use error::{Error, Result};
pub use hydrate::{is_archive, HydrationEngine};
pub use namespace::{
    EntryKind, FileState, MaterializeStats, Namespace, NamespaceEntry, MAX_FILE_SIZE,
};
pub use registry::HydrationRegistry;
pub use sweeper::{SweepReport, Sweeper, SweeperHandle};
pub use vfs::{
    placeholder_size, CloudFs, DirEntry, FileHandle, FsStats, NodeAttr, OpenFlags,
    PLACEHOLDER_SIZE_LIMIT,
};

// Re-export cloud-remote types for convenience
pub use cloud_remote::{RemoteItem, RemoteProvider, SecretString, Session};
