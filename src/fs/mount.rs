//! Mount-point table: tracks which filesystem is mounted at which
//! (host filesystem, inode) pair, in both directions, so the resolver can
//! cross forward (descending into a mounted filesystem) and backward
//! (`..` climbing back out through the mount point) in O(mounts).

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::fs::fs_ops::{FsOps, InodeId};

struct Mount {
    host_fs: Arc<dyn FsOps>,
    host_inode: InodeId,
    target_fs: Arc<dyn FsOps>,
}

pub struct MountTable {
    root: Arc<dyn FsOps>,
    mounts: Vec<Mount>,
}

impl MountTable {
    pub fn new(root: Arc<dyn FsOps>) -> Self {
        MountTable { root, mounts: Vec::new() }
    }

    pub fn root(&self) -> Arc<dyn FsOps> {
        self.root.clone()
    }

    pub fn is_absolute_root(&self, fs: &Arc<dyn FsOps>) -> bool {
        Arc::ptr_eq(fs, &self.root)
    }

    pub fn mount(&mut self, host_fs: Arc<dyn FsOps>, host_inode: InodeId, target_fs: Arc<dyn FsOps>) {
        self.mounts.push(Mount { host_fs, host_inode, target_fs });
    }

    /// Forward crossing: is another filesystem mounted at `(fs, inode)`?
    pub fn mounted_at(&self, fs: &Arc<dyn FsOps>, inode: InodeId) -> Option<Arc<dyn FsOps>> {
        self.mounts
            .iter()
            .find(|m| Arc::ptr_eq(&m.host_fs, fs) && m.host_inode == inode)
            .map(|m| m.target_fs.clone())
    }

    /// Backward crossing: given a filesystem that is itself a mount
    /// target, return its host filesystem and the inode it is mounted on.
    pub fn host_of(&self, fs: &Arc<dyn FsOps>) -> Option<(Arc<dyn FsOps>, InodeId)> {
        self.mounts
            .iter()
            .find(|m| Arc::ptr_eq(&m.target_fs, fs))
            .map(|m| (m.host_fs.clone(), m.host_inode))
    }
}
