//! Desktop notifications for finished sessions

use anyhow::{Context, Result};
use std::process::{Command, Stdio};
use std::thread;
use tracing::warn;

use crate::session::{Completion, SessionType};

/// Default notification title
pub const DEFAULT_TITLE: &str = "Focus";

/// A notification to display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    /// Whether to play a sound
    pub sound: bool,
}

impl Notification {
    /// Create a new notification with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            message: message.into(),
            sound: true,
            ..Default::default()
        }
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Announce a completed session and what comes next
    pub fn for_completion(completion: &Completion, next_minutes: u32) -> Self {
        match completion.session_type {
            SessionType::Focus => Notification::new(format!(
                "Focus session complete: {} minutes credited. Time for a {}-minute break.",
                completion.credited_minutes, next_minutes
            ))
            .with_title("Focus session complete"),
            SessionType::Break => Notification::new(format!(
                "Break is over. Ready for a {}-minute focus session?",
                next_minutes
            ))
            .with_title("Break over"),
        }
    }
}

/// Something that can show a notification to the user
pub trait Notifier: Send {
    fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Available notification backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// macOS osascript
    Osascript,
    /// Linux notify-send
    NotifySend,
    /// KDE kdialog
    Kdialog,
    /// Fallback to stderr
    Echo,
}

impl Backend {
    /// Detect the best available backend for the current platform
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            return Self::Osascript;
        }
        if cfg!(target_os = "linux") {
            if Self::command_exists("notify-send") {
                return Self::NotifySend;
            }
            if Self::command_exists("kdialog") {
                return Self::Kdialog;
            }
        }
        Self::Echo
    }

    /// Check if a command exists
    fn command_exists(cmd: &str) -> bool {
        Command::new("which")
            .arg(cmd)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Get the name of this backend
    pub fn name(&self) -> &'static str {
        match self {
            Self::Osascript => "osascript",
            Self::NotifySend => "notify-send",
            Self::Kdialog => "kdialog",
            Self::Echo => "echo",
        }
    }

    /// Send a notification using this backend
    pub fn send(&self, notification: &Notification) -> Result<()> {
        match self {
            Self::Osascript => self.send_osascript(notification),
            Self::NotifySend => self.send_notify_send(notification),
            Self::Kdialog => self.send_kdialog(notification),
            Self::Echo => {
                eprintln!("[{}] {}", notification.title, notification.message);
                Ok(())
            }
        }
    }

    fn send_osascript(&self, notification: &Notification) -> Result<()> {
        // Escape quotes in the message and title
        let title = notification.title.replace('"', r#"\""#);
        let message = notification.message.replace('"', r#"\""#);

        let mut script = format!(r#"display notification "{}" with title "{}""#, message, title);
        if notification.sound {
            script.push_str(r#" sound name "default""#);
        }

        let mut cmd = Command::new("osascript");
        cmd.args(["-e", &script]);
        launch(cmd, "osascript")
    }

    fn send_notify_send(&self, notification: &Notification) -> Result<()> {
        let mut cmd = Command::new("notify-send");
        cmd.args([&notification.title, &notification.message]);
        cmd.args(["--urgency", "normal"]);
        launch(cmd, "notify-send")
    }

    fn send_kdialog(&self, notification: &Notification) -> Result<()> {
        let mut cmd = Command::new("kdialog");
        cmd.args([
            "--passivepopup",
            &notification.message,
            "5",
            "--title",
            &notification.title,
        ]);
        launch(cmd, "kdialog")
    }
}

/// Start a notification tool without waiting for it to exit.
///
/// The caller is the timer owner, so a hung tool must not hold it up. The
/// child is reaped on a detached thread and a failed exit is only logged.
fn launch(mut cmd: Command, name: &'static str) -> Result<()> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to start {}", name))?;

    thread::spawn(move || match child.wait() {
        Ok(status) if !status.success() => warn!("{} failed with status: {}", name, status),
        Ok(_) => {}
        Err(e) => warn!("Failed to wait for {}: {}", name, e),
    });
    Ok(())
}

/// Notifier backed by the platform's desktop notification tool
pub struct DesktopNotifier {
    backend: Backend,
}

impl DesktopNotifier {
    pub fn detect() -> Self {
        Self {
            backend: Backend::detect(),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, notification: &Notification) -> Result<()> {
        self.backend.send(notification)
    }
}
