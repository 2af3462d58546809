//! FUSE filesystem adapter for `CloudFs`.
//!
//! Exposes the namespace as a mounted filesystem. Files appear with a
//! placeholder size until they are opened; the first open or read fetches
//! their content from the provider.
//!
//! # Example
//!
//! ```ignore
//! use cloud_fs::fuse::mount_background;
//! use cloud_fs::{CloudFs, MountConfig};
//!
//! let fs = CloudFs::connect(provider, config, &secret)?;
//! let session = mount_background(fs, "/mnt/cloud")?;
//! // Unmounted when `session` is dropped
//! ```

mod adapter;

pub use adapter::*;
