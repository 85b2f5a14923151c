//! Path resolution engine (C9): walks a path across mount points with
//! bounded-depth symlink expansion, keeping the returned filesystem
//! retained (via `Arc`) and locked, crossing mount points in both
//! directions with the retain/unlock/lock/release ordering from
//! section 4.9.

extern crate alloc;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::config::VFS_RESOLVE_MAX_DEPTH;
use crate::error::{KError, KResult};
use crate::fs::fs_ops::{EntryType, FsOps, InodeId};
use crate::fs::mount::MountTable;

pub struct ResolvedPath {
    pub fs: Arc<dyn FsOps>,
    pub inode: InodeId,
    pub ty: EntryType,
    pub last_comp: String,
}

impl core::fmt::Debug for ResolvedPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResolvedPath")
            .field("inode", &self.inode)
            .field("ty", &self.ty)
            .field("last_comp", &self.last_comp)
            .finish()
    }
}

fn lock_fs(fs: &Arc<dyn FsOps>, exclusive: bool) {
    if exclusive {
        fs.fs_exlock();
    } else {
        fs.fs_shlock();
    }
}

fn unlock_fs(fs: &Arc<dyn FsOps>, exclusive: bool) {
    if exclusive {
        fs.fs_exunlock();
    } else {
        fs.fs_shunlock();
    }
}

/// Resolves `path` starting from the root (if absolute) or `cwd` (if
/// relative). On success, the returned filesystem is locked; the caller
/// is responsible for unlocking it with the same `exclusive` flag once
/// done (`fs_exunlock`/`fs_shunlock`).
pub fn resolve(
    path: &str,
    cwd: (Arc<dyn FsOps>, InodeId),
    mount_table: &MountTable,
    exclusive: bool,
    resolve_last_symlink: bool,
) -> KResult<ResolvedPath> {
    let (fs, inode) = if path.starts_with('/') {
        let root = mount_table.root();
        let root_inode = root.root_inode();
        (root, root_inode)
    } else {
        cwd
    };

    lock_fs(&fs, exclusive);
    resolve_inner(mount_table, fs, inode, path, exclusive, resolve_last_symlink, 0)
}

/// Lexically joins `path` against `cwd` the way a shell's `pwd`-style
/// resolver would, with no filesystem lookups: `.` components are
/// dropped, `..` pops the last pushed component, and popping past root
/// clamps at `/` instead of erroring.
pub fn compute_abs_path(cwd: &str, path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();

    let base = if path.starts_with('/') { path } else { cwd };
    let to_join = if path.starts_with('/') { "" } else { path };

    for comp in base.split('/').chain(to_join.split('/')) {
        match comp {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            c => stack.push(c),
        }
    }

    let mut out = String::from("/");
    out.push_str(&stack.join("/"));
    out
}

fn resolve_inner(
    mount_table: &MountTable,
    mut fs: Arc<dyn FsOps>,
    mut inode: InodeId,
    path: &str,
    exclusive: bool,
    resolve_last_symlink: bool,
    depth: usize,
) -> KResult<ResolvedPath> {
    if depth >= VFS_RESOLVE_MAX_DEPTH {
        unlock_fs(&fs, exclusive);
        return Err(KError::SymlinkLoop);
    }

    let mut cur_ty = EntryType::Dir;
    let mut last_comp = String::new();
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty() && *c != ".").collect();
    let n = components.len();

    for (i, &comp) in components.iter().enumerate() {
        let is_last = i + 1 == n;

        if comp == ".." {
            if fs.is_root(inode) && !mount_table.is_absolute_root(&fs) {
                if let Some((host_fs, host_inode)) = mount_table.host_of(&fs) {
                    host_fs.retain_inode(host_inode);
                    unlock_fs(&fs, exclusive);
                    lock_fs(&host_fs, exclusive);
                    fs.release_inode(inode);
                    fs = host_fs;
                    inode = host_inode;
                }
            }

            let parent = fs.get_entry(inode, "..");
            match parent.inode {
                Some(p) => {
                    inode = p;
                    cur_ty = parent.ty;
                    last_comp = String::from("..");
                }
                None => {
                    unlock_fs(&fs, exclusive);
                    return Err(KError::NotFound);
                }
            }
            continue;
        }

        let dir_inode = inode;
        let entry = fs.get_entry(inode, comp);
        let Some(entry_inode) = entry.inode else {
            unlock_fs(&fs, exclusive);
            return Err(KError::NotFound);
        };
        inode = entry_inode;
        cur_ty = entry.ty;
        last_comp = String::from(comp);

        if let Some(target_fs) = mount_table.mounted_at(&fs, inode) {
            unlock_fs(&fs, exclusive);
            lock_fs(&target_fs, exclusive);
            fs = target_fs;
            inode = fs.root_inode();
            cur_ty = EntryType::Dir;
        }

        if cur_ty == EntryType::Symlink && (!is_last || resolve_last_symlink) {
            let target = match fs.readlink(inode) {
                Ok(t) => t,
                Err(e) => {
                    unlock_fs(&fs, exclusive);
                    return Err(e);
                }
            };
            let original_comp = last_comp.clone();

            let resolved = if let Some(abs) = target.strip_prefix('/') {
                let root = mount_table.root();
                if !Arc::ptr_eq(&root, &fs) {
                    unlock_fs(&fs, exclusive);
                    lock_fs(&root, exclusive);
                }
                let root_inode = root.root_inode();
                resolve_inner(mount_table, root, root_inode, abs, exclusive, resolve_last_symlink, depth + 1)?
            } else {
                resolve_inner(mount_table, fs.clone(), dir_inode, &target, exclusive, resolve_last_symlink, depth + 1)?
            };

            fs = resolved.fs;
            inode = resolved.inode;
            cur_ty = resolved.ty;
            last_comp = original_comp;
        }
    }

    if path.len() > 1 && path.ends_with('/') && cur_ty != EntryType::Dir {
        unlock_fs(&fs, exclusive);
        return Err(KError::NotADirectory);
    }

    Ok(ResolvedPath { fs, inode, ty: cur_ty, last_comp })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use spin::Mutex;

    struct MemEntry {
        parent: InodeId,
        name: String,
        ty: EntryType,
        symlink_target: Option<String>,
    }

    struct MemFs {
        entries: Mutex<Vec<MemEntry>>,
    }

    impl MemFs {
        fn new() -> Arc<Self> {
            Arc::new(MemFs {
                entries: Mutex::new(vec![MemEntry { parent: 0, name: String::from("/"), ty: EntryType::Dir, symlink_target: None }]),
            })
        }

        fn mkdir(&self, parent: InodeId, name: &str) -> InodeId {
            let mut entries = self.entries.lock();
            entries.push(MemEntry { parent, name: String::from(name), ty: EntryType::Dir, symlink_target: None });
            (entries.len() - 1) as InodeId
        }

        fn touch(&self, parent: InodeId, name: &str) -> InodeId {
            let mut entries = self.entries.lock();
            entries.push(MemEntry { parent, name: String::from(name), ty: EntryType::File, symlink_target: None });
            (entries.len() - 1) as InodeId
        }

        fn symlink(&self, parent: InodeId, name: &str, target: &str) -> InodeId {
            let mut entries = self.entries.lock();
            entries.push(MemEntry {
                parent,
                name: String::from(name),
                ty: EntryType::Symlink,
                symlink_target: Some(String::from(target)),
            });
            (entries.len() - 1) as InodeId
        }
    }

    impl FsOps for MemFs {
        fn root_inode(&self) -> InodeId {
            0
        }

        fn get_entry(&self, dir: InodeId, name: &str) -> crate::fs::fs_ops::FsPath {
            let entries = self.entries.lock();
            if name == ".." {
                return match entries.get(dir as usize) {
                    Some(e) => crate::fs::fs_ops::FsPath { inode: Some(e.parent), ty: entries[e.parent as usize].ty },
                    None => crate::fs::fs_ops::FsPath::NOT_FOUND,
                };
            }
            for (idx, e) in entries.iter().enumerate() {
                if e.parent == dir && e.name == name {
                    return crate::fs::fs_ops::FsPath { inode: Some(idx as InodeId), ty: e.ty };
                }
            }
            crate::fs::fs_ops::FsPath::NOT_FOUND
        }

        fn readlink(&self, inode: InodeId) -> KResult<String> {
            self.entries
                .lock()
                .get(inode as usize)
                .and_then(|e| e.symlink_target.clone())
                .ok_or(KError::InvalidArgument)
        }
    }

    #[test_case]
    fn resolves_plain_nested_path() {
        let root = MemFs::new();
        let dir = root.mkdir(0, "a");
        root.touch(dir, "b");

        let mt = MountTable::new(root.clone());
        let resolved = resolve("/a/b", (root.clone(), 0), &mt, false, false).unwrap();
        assert_eq!(resolved.ty, EntryType::File);
        assert_eq!(resolved.last_comp, "b");
        unlock_fs(&resolved.fs, false);
    }

    #[test_case]
    fn missing_component_is_not_found() {
        let root = MemFs::new();
        let mt = MountTable::new(root.clone());
        assert_eq!(resolve("/nope", (root, 0), &mt, false, false).unwrap_err(), KError::NotFound);
    }

    #[test_case]
    fn crosses_mount_point_forward_and_backward() {
        let root = MemFs::new();
        let mnt = root.mkdir(0, "mnt");
        let target = MemFs::new();
        target.touch(0, "inside");

        let mut mt = MountTable::new(root.clone());
        mt.mount(root.clone(), mnt, target.clone());

        let resolved = resolve("/mnt/inside", (root.clone(), 0), &mt, false, false).unwrap();
        assert!(Arc::ptr_eq(&resolved.fs, &(target.clone() as Arc<dyn FsOps>)));
        assert_eq!(resolved.ty, EntryType::File);
        unlock_fs(&resolved.fs, false);

        let back = resolve("/mnt/..", (root.clone(), 0), &mt, false, false).unwrap();
        assert!(Arc::ptr_eq(&back.fs, &(root.clone() as Arc<dyn FsOps>)));
        assert_eq!(back.inode, 0);
        unlock_fs(&back.fs, false);
    }

    #[test_case]
    fn symlink_across_mount_resolves_and_keeps_original_last_comp() {
        let root = MemFs::new();
        let mnt = root.mkdir(0, "mnt");
        root.symlink(0, "link", "/mnt/inside");
        let target = MemFs::new();
        target.touch(0, "inside");

        let mut mt = MountTable::new(root.clone());
        mt.mount(root.clone(), mnt, target.clone());

        let resolved = resolve("/link", (root.clone(), 0), &mt, false, true).unwrap();
        assert!(Arc::ptr_eq(&resolved.fs, &(target.clone() as Arc<dyn FsOps>)));
        assert_eq!(resolved.ty, EntryType::File);
        assert_eq!(resolved.last_comp, "link");
        unlock_fs(&resolved.fs, false);
    }

    #[test_case]
    fn self_referential_symlink_hits_loop_bound() {
        let root = MemFs::new();
        root.symlink(0, "loop", "/loop");
        let mt = MountTable::new(root.clone());
        assert_eq!(resolve("/loop", (root, 0), &mt, false, true).unwrap_err(), KError::SymlinkLoop);
    }

    #[test_case]
    fn trailing_slash_on_a_file_is_rejected() {
        let root = MemFs::new();
        root.touch(0, "f");
        let mt = MountTable::new(root.clone());
        assert_eq!(resolve("/f/", (root, 0), &mt, false, false).unwrap_err(), KError::NotADirectory);
    }

    #[test_case]
    fn compute_abs_path_joins_relative_against_cwd() {
        assert_eq!(compute_abs_path("/a/b", "c/d"), "/a/b/c/d");
    }

    #[test_case]
    fn compute_abs_path_dotdot_pops_a_component() {
        assert_eq!(compute_abs_path("/", "/a/b/c/.."), "/a/b");
    }

    #[test_case]
    fn compute_abs_path_absolute_ignores_cwd() {
        assert_eq!(compute_abs_path("/wherever", "/x/y"), "/x/y");
    }

    #[test_case]
    fn compute_abs_path_clamps_at_root() {
        assert_eq!(compute_abs_path("/a/b/c/", "../../.."), "/");
        assert_eq!(compute_abs_path("/", "../../.."), "/");
    }

    #[test_case]
    fn compute_abs_path_skips_dot_components() {
        assert_eq!(compute_abs_path("/a", "./b/./c"), "/a/b/c");
    }
}
