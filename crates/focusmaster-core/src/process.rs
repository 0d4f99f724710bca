//! Process management utilities

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Check if a process with the given pid is alive
pub fn is_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).is_some()
}

/// Pid of the calling process
pub fn current_pid() -> u32 {
    std::process::id()
}
