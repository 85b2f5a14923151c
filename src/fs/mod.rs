//! VFS path-resolution engine (C9): the driver contract (`fs_ops`), the
//! mount table, and the resolver itself.

pub mod fs_ops;
pub mod mount;
pub mod vfs;

pub use fs_ops::{EntryType, FsOps, FsPath, InodeId};
pub use mount::MountTable;
pub use vfs::{resolve, ResolvedPath};
