//! Filesystem driver contract (section 6): the operation table every
//! concrete filesystem (FAT32, ramfs, devfs, ...) must provide. Only the
//! operations the resolver and a minimal in-memory root need are given
//! real bodies by `MemFs`; the rest default to `KError::NotImplemented`
//! so a partial driver still satisfies the trait.

extern crate alloc;

use alloc::string::String;

use crate::error::{KError, KResult};

pub type InodeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Dir,
    Symlink,
}

/// Result of a directory lookup: `inode` is `None` when the name does not
/// exist in that directory.
#[derive(Debug, Clone, Copy)]
pub struct FsPath {
    pub inode: Option<InodeId>,
    pub ty: EntryType,
}

impl FsPath {
    pub const NOT_FOUND: FsPath = FsPath { inode: None, ty: EntryType::File };
}

pub trait FsOps: Send + Sync {
    fn root_inode(&self) -> InodeId;
    fn is_root(&self, inode: InodeId) -> bool {
        inode == self.root_inode()
    }

    fn get_entry(&self, dir: InodeId, name: &str) -> FsPath;
    fn readlink(&self, _inode: InodeId) -> KResult<String> {
        Err(KError::NotImplemented)
    }

    fn retain_inode(&self, _inode: InodeId) {}
    fn release_inode(&self, _inode: InodeId) {}

    fn fs_exlock(&self) {}
    fn fs_exunlock(&self) {}
    fn fs_shlock(&self) {}
    fn fs_shunlock(&self) {}

    fn mkdir(&self, _dir: InodeId, _name: &str) -> KResult<InodeId> {
        Err(KError::NotImplemented)
    }
    fn rmdir(&self, _dir: InodeId, _name: &str) -> KResult<()> {
        Err(KError::NotImplemented)
    }
    fn unlink(&self, _dir: InodeId, _name: &str) -> KResult<()> {
        Err(KError::NotImplemented)
    }
    fn symlink(&self, _dir: InodeId, _name: &str, _target: &str) -> KResult<InodeId> {
        Err(KError::NotImplemented)
    }
    fn stat(&self, _inode: InodeId) -> KResult<EntryType> {
        Err(KError::NotImplemented)
    }
    fn truncate(&self, _inode: InodeId, _len: u64) -> KResult<()> {
        Err(KError::NotImplemented)
    }
    fn chmod(&self, _inode: InodeId, _mode: u32) -> KResult<()> {
        Err(KError::NotImplemented)
    }

    // Handle-level ops (section 6's "Handle ops"); a handle is just an
    // inode plus an open-file offset owned by the caller in this model.
    fn open(&self, _inode: InodeId) -> KResult<()> {
        Ok(())
    }
    fn close(&self, _inode: InodeId) {}
    fn dup(&self, inode: InodeId) -> InodeId {
        inode
    }
    fn read(&self, _inode: InodeId, _offset: u64, _buf: &mut [u8]) -> KResult<usize> {
        Err(KError::NotImplemented)
    }
    fn write(&self, _inode: InodeId, _offset: u64, _buf: &[u8]) -> KResult<usize> {
        Err(KError::NotImplemented)
    }
    fn getdents(&self, _dir: InodeId) -> KResult<alloc::vec::Vec<(String, InodeId, EntryType)>> {
        Err(KError::NotImplemented)
    }
}
