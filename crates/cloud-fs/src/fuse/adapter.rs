//! FUSE adapter implementation for `CloudFs`.
//!
//! This module implements the `fuser::Filesystem` trait for `CloudFuseFs`,
//! translating inode-based kernel requests into path-based node operations.

use crate::vfs::{CloudFs, FileHandle, NodeAttr, OpenFlags};
use cloud_remote::parent_path;
use fuser::consts::FOPEN_DIRECT_IO;
use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, ReplyXattr, Request, FUSE_ROOT_ID,
};
use libc::ENOENT;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Time-to-live for cached attributes.
const TTL: Duration = Duration::from_secs(1);

/// Block size for filesystem statistics.
const BLOCK_SIZE: u32 = 512;

/// Maximum name length reported by statfs.
const MAX_NAME_LEN: u32 = 255;

/// Bidirectional inode ↔ path table. Inodes are never reused.
#[derive(Debug)]
struct InodeTable {
    paths: HashMap<u64, String>,
    inodes: HashMap<String, u64>,
    next: u64,
}

impl InodeTable {
    fn new() -> Self {
        let mut table = Self {
            paths: HashMap::new(),
            inodes: HashMap::new(),
            next: FUSE_ROOT_ID + 1,
        };
        table.paths.insert(FUSE_ROOT_ID, "/".to_string());
        table.inodes.insert("/".to_string(), FUSE_ROOT_ID);
        table
    }

    fn path(&self, ino: u64) -> Option<&str> {
        self.paths.get(&ino).map(String::as_str)
    }

    fn inode(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.inodes.get(path) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.paths.insert(ino, path.to_string());
        self.inodes.insert(path.to_string(), ino);
        trace!("Mapped {} to inode {}", path, ino);
        ino
    }

    fn len(&self) -> usize {
        self.paths.len()
    }
}

/// FUSE filesystem adapter over a `CloudFs`.
pub struct CloudFuseFs {
    fs: CloudFs,
    inodes: InodeTable,
    /// User ID for file ownership (defaults to current user).
    uid: u32,
    /// Group ID for file ownership (defaults to current group).
    gid: u32,
}

impl CloudFuseFs {
    pub fn new(fs: CloudFs) -> Self {
        // Get current user/group IDs
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };

        Self {
            fs,
            inodes: InodeTable::new(),
            uid,
            gid,
        }
    }

    /// Number of inodes handed out so far, root included.
    pub fn inode_count(&self) -> usize {
        self.inodes.len()
    }

    fn file_attr(&self, ino: u64, attr: &NodeAttr) -> FileAttr {
        let mtime = SystemTime::from(attr.modified);
        let crtime = SystemTime::from(attr.created);

        FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(BLOCK_SIZE as u64),
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime,
            kind: if attr.is_dir {
                FileType::Directory
            } else {
                FileType::RegularFile
            },
            perm: attr.perm,
            nlink: if attr.is_dir { 2 } else { 1 },
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.inodes.path(ino).map(str::to_string)
    }
}

impl Filesystem for CloudFuseFs {
    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        trace!("getattr(ino={})", ino);

        let Some(path) = self.path_of(ino) else {
            warn!("getattr: inode {} not found", ino);
            reply.error(ENOENT);
            return;
        };

        match self.fs.attr(&path) {
            Ok(attr) => reply.attr(&TTL, &self.file_attr(ino, &attr)),
            Err(e) => {
                debug!("getattr: {}: {}", path, e);
                reply.error(e.errno());
            }
        }
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name_str = name.to_string_lossy();
        trace!("lookup(parent={}, name='{}')", parent, name_str);

        let Some(dir) = self.path_of(parent) else {
            reply.error(ENOENT);
            return;
        };

        let result = self
            .fs
            .lookup(&dir, &name_str)
            .and_then(|entry| Ok((entry.path().to_string(), self.fs.attr(entry.path())?)));
        match result {
            Ok((path, attr)) => {
                let ino = self.inodes.inode(&path);
                reply.entry(&TTL, &self.file_attr(ino, &attr), 0);
            }
            Err(e) => {
                debug!("lookup: '{}' in {}: {}", name_str, dir, e);
                reply.error(e.errno());
            }
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!("readdir(ino={}, offset={})", ino, offset);

        let Some(dir) = self.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };

        let children = match self.fs.namespace().list_children(&dir) {
            Ok(children) => children,
            Err(e) => {
                warn!("readdir: {}: {}", dir, e);
                reply.error(e.errno());
                return;
            }
        };

        // Build entry list: ".", "..", and actual entries
        let parent_ino = self.inodes.inode(&parent_path(&dir));
        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_ino, FileType::Directory, "..".to_string()),
        ];
        for child in &children {
            let kind = if child.is_dir() {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            let child_ino = self.inodes.inode(child.path());
            entries.push((child_ino, kind, child.display_name()));
        }

        for (i, (ino, kind, name)) in entries
            .into_iter()
            .enumerate()
            .skip(offset.max(0) as usize)
        {
            if reply.add(ino, (i + 1) as i64, kind, name) {
                break;
            }
        }

        reply.ok();
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        trace!("open(ino={}, flags={:#x})", ino, flags);

        let Some(path) = self.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };

        let open_flags = OpenFlags {
            write: flags & libc::O_ACCMODE != libc::O_RDONLY,
            truncate: flags & libc::O_TRUNC != 0,
        };
        let was_hydrated = self
            .fs
            .namespace()
            .lookup(&path)
            .map(|entry| entry.is_hydrated())
            .unwrap_or(false);
        match self.fs.open(&path, open_flags) {
            Ok(fh) => reply.opened(fh.as_u64(), open_reply_flags(was_hydrated, open_flags)),
            Err(e) => {
                warn!("open: {}: {}", path, e);
                reply.error(e.errno());
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!("read(ino={}, fh={}, offset={}, size={})", ino, fh, offset, size);

        match self
            .fs
            .read(FileHandle(fh), offset.max(0) as u64, size as usize)
        {
            Ok(data) => reply.data(&data),
            Err(e) => {
                warn!("read: inode {}: {}", ino, e);
                reply.error(e.errno());
            }
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        trace!("write(ino={}, fh={}, offset={}, len={})", ino, fh, offset, data.len());

        match self.fs.write(FileHandle(fh), offset.max(0) as u64, data) {
            Ok(written) => reply.written(written as u32),
            Err(e) => {
                warn!("write: inode {}: {}", ino, e);
                reply.error(e.errno());
            }
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        trace!("release(ino={}, fh={})", ino, fh);

        match self.fs.release(FileHandle(fh)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn getxattr(&mut self, _req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        let name_str = name.to_string_lossy();
        trace!("getxattr(ino={}, name='{}', size={})", ino, name_str, size);

        let path = self.path_of(ino).unwrap_or_default();
        match self.fs.getxattr(&path, &name_str) {
            Ok(value) if size == 0 => reply.size(value.len() as u32),
            Ok(value) => reply.data(&value),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: fuser::ReplyStatfs) {
        trace!("statfs");

        let stats = self.fs.stats();
        reply.statfs(
            0,                  // total blocks
            0,                  // free blocks
            0,                  // available blocks
            stats.items as u64, // total inodes
            0,                  // free inodes
            BLOCK_SIZE,
            MAX_NAME_LEN,
            BLOCK_SIZE,
        );
    }
}

/// Flags for the `open` reply.
///
/// The kernel may still hold a placeholder size for a file that was not
/// hydrated before this open, and would stop reads there. Such files, and
/// files truncated on open, bypass the page cache.
fn open_reply_flags(was_hydrated: bool, flags: OpenFlags) -> u32 {
    if was_hydrated && !flags.truncate {
        0
    } else {
        FOPEN_DIRECT_IO
    }
}

fn mount_options() -> Vec<MountOption> {
    vec![
        MountOption::FSName("cloudfs".to_string()),
        MountOption::Subtype("cloud".to_string()),
        MountOption::DefaultPermissions,
    ]
}

/// Mount a `CloudFs` and block until it is unmounted.
pub fn mount<P: AsRef<Path>>(fs: CloudFs, mount_point: P) -> io::Result<()> {
    let mount_point = mount_point.as_ref();
    debug!(
        "Mounting at {} with {} items",
        mount_point.display(),
        fs.stats().items
    );

    fuser::mount2(CloudFuseFs::new(fs), mount_point, &mount_options())
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("FUSE mount failed: {}", e)))
}

/// Mount a `CloudFs` in the background.
///
/// The filesystem stays mounted until the returned `BackgroundSession` is
/// dropped or joined.
pub fn mount_background<P: AsRef<Path>>(
    fs: CloudFs,
    mount_point: P,
) -> io::Result<fuser::BackgroundSession> {
    let mount_point = mount_point.as_ref();
    debug!(
        "Mounting at {} (background) with {} items",
        mount_point.display(),
        fs.stats().items
    );

    fuser::spawn_mount2(CloudFuseFs::new(fs), mount_point, &mount_options())
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("FUSE mount failed: {}", e)))
}
