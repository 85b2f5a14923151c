//! Process struct (section 3) and the process-group/session rules from
//! section 4.5.

extern crate alloc;

use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{KError, KResult};

pub type Pid = u32;

/// A minimal stand-in for the real open-file-handle table; each entry
/// tracks only what this crate's scope needs to test `dup`-on-fork
/// behavior (section 4.5, step 4).
#[derive(Clone)]
pub struct HandleTable {
    handles: Vec<Option<u32>>,
}

impl HandleTable {
    pub fn new() -> Self {
        HandleTable { handles: Vec::new() }
    }

    pub fn open(&mut self, backing: u32) -> usize {
        if let Some(slot) = self.handles.iter().position(|h| h.is_none()) {
            self.handles[slot] = Some(backing);
            slot
        } else {
            self.handles.push(Some(backing));
            self.handles.len() - 1
        }
    }

    pub fn close(&mut self, fd: usize) -> KResult<()> {
        match self.handles.get_mut(fd) {
            Some(h @ Some(_)) => {
                *h = None;
                Ok(())
            }
            _ => Err(KError::BadHandle),
        }
    }

    pub fn len_open(&self) -> usize {
        self.handles.iter().filter(|h| h.is_some()).count()
    }

    /// `fork_dup_all_handles`: duplicate every open handle; on failure
    /// partway, the caller is responsible for dropping what was already
    /// duplicated (mirrored by simply returning the partial table here,
    /// since `Drop` on `HandleTable` takes care of the rest).
    pub fn dup_all(&self) -> Self {
        HandleTable { handles: self.handles.clone() }
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Process {
    pub pid: Pid,
    pub pgid: Pid,
    pub sid: Pid,
    pub parent_pid: Pid,
    pub children: BTreeSet<Pid>,
    pub handles: HandleTable,
    pub cwd: String,
    pub umask: u16,
    pub controlling_tty: Option<u32>,
    pub cmdline: String,
    pub has_called_execve: bool,
}

/// pid 1, the init/reaper process every orphan gets reparented to.
pub const INIT_PID: Pid = 1;

impl Process {
    pub fn new_init() -> Self {
        Process {
            pid: INIT_PID,
            pgid: INIT_PID,
            sid: INIT_PID,
            parent_pid: 0,
            children: BTreeSet::new(),
            handles: HandleTable::new(),
            cwd: String::from("/"),
            umask: 0o022,
            controlling_tty: None,
            cmdline: String::from("init"),
            has_called_execve: false,
        }
    }

    pub fn child_of(pid: Pid, parent: &Process) -> Self {
        Process {
            pid,
            pgid: parent.pgid,
            sid: parent.sid,
            parent_pid: parent.pid,
            children: BTreeSet::new(),
            handles: parent.handles.dup_all(),
            cwd: parent.cwd.clone(),
            umask: parent.umask,
            controlling_tty: parent.controlling_tty,
            cmdline: parent.cmdline.clone(),
            has_called_execve: false,
        }
    }

    /// `setsid`: succeeds only if no process in the caller's current group
    /// is alive besides the caller (approximated here by the caller
    /// passing whether any sibling in the group is alive).
    pub fn setsid(&mut self, group_has_other_members: bool) -> KResult<Pid> {
        if group_has_other_members {
            return Err(KError::PermissionDenied);
        }
        self.sid = self.pid;
        self.pgid = self.pid;
        Ok(self.sid)
    }

    /// `setpgid(pid, pgid)`: forbids crossing sessions and forbids changes
    /// after `execve` has been called by the target.
    pub fn setpgid(&mut self, new_pgid: Pid, target_sid: Pid) -> KResult<()> {
        if self.has_called_execve {
            return Err(KError::PermissionDenied);
        }
        if target_sid != self.sid {
            return Err(KError::PermissionDenied);
        }
        self.pgid = new_pgid;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn child_inherits_session_and_cwd() {
        let parent = Process::new_init();
        let child = Process::child_of(2, &parent);
        assert_eq!(child.sid, parent.sid);
        assert_eq!(child.parent_pid, parent.pid);
        assert_eq!(child.cwd, parent.cwd);
    }

    #[test_case]
    fn setpgid_rejected_after_execve() {
        let mut p = Process::new_init();
        p.has_called_execve = true;
        assert_eq!(p.setpgid(5, p.sid), Err(KError::PermissionDenied));
    }

    #[test_case]
    fn setsid_rejected_with_live_group_members() {
        let mut p = Process::new_init();
        assert_eq!(p.setsid(true), Err(KError::PermissionDenied));
    }
}
