//! Locating `/proc/<pid>/*` pseudo-files, either in the live procfs or in a
//! snapshot directory copied alongside a core file.

use {
    super::errors::ProcPathError,
    crate::Pid,
    std::{
        ffi::OsString,
        path::{Path, PathBuf},
    },
};

/// Longest file name component accepted by the kernel, the composed path has
/// to stay below this so the consumer can append a NUL.
pub const NAME_MAX: usize = libc::NAME_MAX as usize;

/// The pseudo-files of `/proc/<pid>/` that dumpers read
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ProcNode {
    Auxv,
    Cmdline,
    Environ,
    Exe,
    Limits,
    Maps,
    Status,
    Task,
}

impl ProcNode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auxv => "auxv",
            Self::Cmdline => "cmdline",
            Self::Environ => "environ",
            Self::Exe => "exe",
            Self::Limits => "limits",
            Self::Maps => "maps",
            Self::Status => "status",
            Self::Task => "task",
        }
    }
}

impl AsRef<str> for ProcNode {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for ProcNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds paths to procfs nodes, rooted either at `/proc/<pid>` or at a
/// snapshot directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcfsLocator {
    snapshot: Option<PathBuf>,
}

impl ProcfsLocator {
    /// Paths point into the live `/proc` of the running system
    pub fn live() -> Self {
        Self { snapshot: None }
    }

    /// Paths point into `dir`, the pid is ignored
    pub fn snapshot(dir: impl Into<PathBuf>) -> Self {
        Self {
            snapshot: Some(dir.into()),
        }
    }

    pub fn snapshot_dir(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    /// Composes the path of `node` for `pid`.
    ///
    /// Fails if the node is empty or if the result would not fit in
    /// [`NAME_MAX`] bytes including a trailing NUL.
    pub fn build_proc_path(
        &self,
        pid: Pid,
        node: impl AsRef<str>,
    ) -> Result<PathBuf, ProcPathError> {
        let node = node.as_ref();
        if node.is_empty() {
            return Err(ProcPathError::EmptyNode);
        }
        if node.len() >= NAME_MAX {
            return Err(ProcPathError::NodeTooLong(node.len()));
        }
        if node.contains('\0') {
            return Err(ProcPathError::NulInNode(node.to_owned()));
        }

        let mut path = match &self.snapshot {
            Some(dir) => dir.as_os_str().to_owned(),
            None => {
                if pid <= 0 {
                    return Err(ProcPathError::InvalidPid(pid));
                }
                OsString::from(format!("/proc/{pid}"))
            }
        };

        let length = path.len() + 1 + node.len();
        if length >= NAME_MAX {
            return Err(ProcPathError::PathTooLong {
                length,
                max: NAME_MAX,
            });
        }

        path.reserve_exact(1 + node.len());
        path.push("/");
        path.push(node);
        Ok(PathBuf::from(path))
    }
}
