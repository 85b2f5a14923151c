//! Kernel-internal error taxonomy, used in place of raw negative-errno ints
//! everywhere except the syscall-dispatch boundary.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KError {
    OutOfMemory,
    NotFound,
    NotADirectory,
    IsADirectory,
    Exists,
    Busy,
    ReadOnly,
    PermissionDenied,
    BadHandle,
    InvalidArgument,
    BrokenPipe,
    WouldBlock,
    SymlinkLoop,
    NameTooBig,
    NotATty,
    NotImplemented,
    Interrupted,
    TooManyOpenFiles,
}

impl KError {
    /// Standard POSIX errno magnitude (always returned negated at the
    /// syscall boundary).
    pub const fn errno(self) -> i32 {
        match self {
            KError::OutOfMemory => 12,        // ENOMEM
            KError::NotFound => 2,            // ENOENT
            KError::NotADirectory => 20,      // ENOTDIR
            KError::IsADirectory => 21,       // EISDIR
            KError::Exists => 17,             // EEXIST
            KError::Busy => 16,               // EBUSY
            KError::ReadOnly => 30,           // EROFS
            KError::PermissionDenied => 13,   // EACCES
            KError::BadHandle => 9,           // EBADF
            KError::InvalidArgument => 22,    // EINVAL
            KError::BrokenPipe => 32,         // EPIPE
            KError::WouldBlock => 11,         // EAGAIN
            KError::SymlinkLoop => 40,        // ELOOP
            KError::NameTooBig => 7,          // E2BIG
            KError::NotATty => 25,            // ENOTTY
            KError::NotImplemented => 38,     // ENOSYS
            KError::Interrupted => 4,         // EINTR
            KError::TooManyOpenFiles => 24,   // EMFILE
        }
    }

    /// Negated errno, the value a syscall handler actually returns.
    pub const fn as_syscall_ret(self) -> isize {
        -(self.errno() as isize)
    }
}

impl fmt::Display for KError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KError::OutOfMemory => "out of memory",
            KError::NotFound => "no such file or directory",
            KError::NotADirectory => "not a directory",
            KError::IsADirectory => "is a directory",
            KError::Exists => "already exists",
            KError::Busy => "resource busy",
            KError::ReadOnly => "read-only filesystem",
            KError::PermissionDenied => "permission denied",
            KError::BadHandle => "bad file descriptor",
            KError::InvalidArgument => "invalid argument",
            KError::BrokenPipe => "broken pipe",
            KError::WouldBlock => "operation would block",
            KError::SymlinkLoop => "too many levels of symbolic links",
            KError::NameTooBig => "argument list too long",
            KError::NotATty => "not a tty",
            KError::NotImplemented => "function not implemented",
            KError::Interrupted => "interrupted system call",
            KError::TooManyOpenFiles => "too many open files",
        };
        write!(f, "{}", msg)
    }
}

pub type KResult<T> = Result<T, KError>;
