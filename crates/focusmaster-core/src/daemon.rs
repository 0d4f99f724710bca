//! Daemon status checking
//!
//! A daemon advertises itself with two runtime files: its socket and a pid
//! file. Both must exist and the pid must be alive for it to count as running.

use crate::paths::Paths;
use crate::process;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Status of a daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    Running,
    Stopped,
    /// Runtime files exist but the process is gone
    Stale,
}

impl DaemonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Stale => "stale",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Running => "●",
            Self::Stopped => "○",
            Self::Stale => "?",
        }
    }
}

/// Information about a daemon
#[derive(Debug, Clone)]
pub struct DaemonInfo {
    pub name: String,
    pub status: DaemonStatus,
    pub socket_path: Option<PathBuf>,
    pub pid: Option<u32>,
}

/// Check the status of a named daemon
pub fn check_daemon(paths: &Paths, name: &str) -> DaemonInfo {
    let socket_path = paths.socket(name);
    let socket_exists = socket_path.exists();

    let pid = fs::read_to_string(paths.pid_file(name))
        .ok()
        .and_then(|content| content.trim().parse::<u32>().ok());
    let alive = pid.map(process::is_alive).unwrap_or(false);

    let status = match (socket_exists, alive) {
        (true, true) => DaemonStatus::Running,
        (false, false) if pid.is_none() => DaemonStatus::Stopped,
        _ => DaemonStatus::Stale,
    };

    DaemonInfo {
        name: name.to_string(),
        status,
        socket_path: if socket_exists { Some(socket_path) } else { None },
        pid: if alive { pid } else { None },
    }
}

/// Record the calling process as the daemon's owner
pub fn write_pid_file(paths: &Paths, name: &str) -> io::Result<()> {
    let path = paths.pid_file(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, process::current_pid().to_string())
}

/// Remove the socket and pid file left by a daemon
pub fn remove_runtime_files(paths: &Paths, name: &str) -> io::Result<()> {
    for path in [paths.socket(name), paths.pid_file(name)] {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stopped_when_nothing_exists() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_root(dir.path());
        let info = check_daemon(&paths, "focus");
        assert_eq!(info.status, DaemonStatus::Stopped);
        assert!(info.pid.is_none());
    }

    #[test]
    fn test_pid_without_socket_is_stale() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_root(dir.path());
        write_pid_file(&paths, "focus").unwrap();

        let info = check_daemon(&paths, "focus");
        assert_eq!(info.status, DaemonStatus::Stale);

        remove_runtime_files(&paths, "focus").unwrap();
        assert_eq!(check_daemon(&paths, "focus").status, DaemonStatus::Stopped);
    }

    #[test]
    fn test_running_with_socket_and_live_pid() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_root(dir.path());
        write_pid_file(&paths, "focus").unwrap();
        fs::write(paths.socket("focus"), "").unwrap();

        let info = check_daemon(&paths, "focus");
        assert_eq!(info.status, DaemonStatus::Running);
        assert_eq!(info.pid, Some(process::current_pid()));
    }
}
