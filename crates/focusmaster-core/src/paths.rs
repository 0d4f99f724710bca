//! Standard paths used by focusmaster tools

use std::path::{Path, PathBuf};

/// Environment variable that relocates every focusmaster directory
pub const DATA_DIR_ENV: &str = "FOCUSMASTER_DATA_DIR";

/// Standard focusmaster paths
#[derive(Debug, Clone)]
pub struct Paths {
    /// Data directory (~/.local/share/focusmaster)
    pub data: PathBuf,
    /// Runtime directory for sockets and pid files ($XDG_RUNTIME_DIR/focusmaster or the data dir)
    pub runtime: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        if let Some(root) = std::env::var_os(DATA_DIR_ENV) {
            return Self::with_root(Path::new(&root));
        }

        let data = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("focusmaster");

        let runtime = dirs::runtime_dir()
            .map(|dir| dir.join("focusmaster"))
            .unwrap_or_else(|| data.clone());

        Self { data, runtime }
    }

    /// All directories under a single root (tests, portable installs)
    pub fn with_root(root: &Path) -> Self {
        Self {
            data: root.join("data"),
            runtime: root.join("run"),
        }
    }

    /// Get socket path for a daemon
    pub fn socket(&self, daemon: &str) -> PathBuf {
        self.runtime.join(daemon).join(format!("{}.sock", daemon))
    }

    /// Get pid file path for a daemon
    pub fn pid_file(&self, daemon: &str) -> PathBuf {
        self.runtime.join(daemon).join(format!("{}.pid", daemon))
    }

    /// Get state directory for a tool
    pub fn state(&self, tool: &str) -> PathBuf {
        self.data.join(tool)
    }
}
