//! Focus daemon
//!
//! Owns the [`TimerController`] in a single task and serves commands over a
//! Unix socket. Each request is one line of JSON, answered by one line:
//!
//! ```text
//! -> {"action":"startTimer"}
//! <- {"ok":true,"snapshot":{...}}
//! ```
//!
//! Connections never touch the controller themselves. They hand commands to
//! the owner task through a channel, so read-modify-write sequences on the
//! store never interleave. The owner also polls once a second, which is what
//! turns an elapsed deadline into a completion while nobody is asking.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::blocking::{RequestBlocker, RuleSet};
use crate::error::FocusError;
use crate::session::{Completion, TimerSnapshot};
use crate::store::KvStore;
use crate::timer::{Clock, Outcome, TimerController};

/// Name the daemon registers its runtime files under
pub const DAEMON_NAME: &str = "focus";

/// How often the owner checks for an elapsed deadline
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

const QUEUE_DEPTH: usize = 32;

/// A request on the command channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    StartTimer,
    PauseTimer,
    ResetTimer,
    UpdateBlockRules,
    GetState,
    ClearStats,
}

/// Reply to a [`Command`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<TimerSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<Completion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<RuleSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn from_outcome(outcome: Outcome) -> Self {
        Self {
            ok: true,
            snapshot: Some(outcome.snapshot),
            completion: outcome.completion,
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Run one command against the controller
pub fn dispatch<S, B, C>(controller: &mut TimerController<S, B, C>, command: Command) -> Response
where
    S: KvStore,
    B: RequestBlocker,
    C: Clock,
{
    let result = match command {
        Command::StartTimer => controller.start().map(Response::from_outcome),
        Command::PauseTimer => controller.pause().map(Response::from_outcome),
        Command::ResetTimer => controller.reset().map(Response::from_outcome),
        Command::GetState => controller.poll().map(Response::from_outcome),
        Command::UpdateBlockRules => controller.update_block_rules().and_then(|rules| {
            let mut response = Response::from_outcome(controller.poll()?);
            response.rules = Some(rules);
            Ok(response)
        }),
        Command::ClearStats => controller
            .clear_stats()
            .and_then(|()| controller.poll())
            .map(Response::from_outcome),
    };

    result.unwrap_or_else(|e| {
        warn!("Command {:?} failed: {}", command, e);
        Response::failure(e.to_string())
    })
}

type Job = (Command, oneshot::Sender<Response>);

/// The single owner of the timer state
async fn own<S, B, C>(mut controller: TimerController<S, B, C>, mut jobs: mpsc::Receiver<Job>)
where
    S: KvStore,
    B: RequestBlocker,
    C: Clock,
{
    // Installed rules may not match the state left by the previous owner
    if let Err(e) = controller.update_block_rules() {
        error!("Failed to reconcile block rules at startup: {}", e);
    }

    let mut ticker = interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            job = jobs.recv() => match job {
                Some((command, reply)) => {
                    let response = dispatch(&mut controller, command);
                    if reply.send(response).is_err() {
                        debug!("Client went away before {:?} finished", command);
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if let Err(e) = controller.poll() {
                    error!("Timer poll failed: {}", e);
                }
            }
        }
    }

    debug!("Owner task stopped");
}

/// Unix socket server in front of the owner task
pub struct FocusServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl FocusServer {
    /// Bind the socket, replacing a leftover socket file
    pub fn bind(socket_path: impl Into<PathBuf>) -> Result<Self> {
        let socket_path = socket_path.into();
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)
                .with_context(|| format!("Failed to remove stale socket {}", socket_path.display()))?;
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind {}", socket_path.display()))?;

        Ok(Self {
            listener,
            socket_path,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serve until interrupted with Ctrl-C
    pub async fn run<S, B, C>(self, controller: TimerController<S, B, C>) -> Result<()>
    where
        S: KvStore + 'static,
        B: RequestBlocker + 'static,
        C: Clock + 'static,
    {
        self.run_until(controller, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves, then remove the socket
    pub async fn run_until<S, B, C, F>(self, controller: TimerController<S, B, C>, shutdown: F) -> Result<()>
    where
        S: KvStore + 'static,
        B: RequestBlocker + 'static,
        C: Clock + 'static,
        F: Future<Output = ()>,
    {
        let (jobs, queue) = mpsc::channel(QUEUE_DEPTH);
        let owner = tokio::spawn(own(controller, queue));
        info!("Focus daemon listening on {}", self.socket_path.display());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let jobs = jobs.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, jobs).await {
                                debug!("Connection ended with error: {}", e);
                            }
                        });
                    }
                    Err(e) => warn!("Failed to accept connection: {}", e),
                },
                _ = &mut shutdown => {
                    info!("Shutting down focus daemon");
                    break;
                }
            }
        }

        drop(jobs);
        if let Err(e) = owner.await {
            error!("Owner task panicked: {}", e);
        }
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            debug!("Could not remove socket {}: {}", self.socket_path.display(), e);
        }
        Ok(())
    }
}

/// Answer every request line on one connection
async fn handle_connection(stream: UnixStream, jobs: mpsc::Sender<Job>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        debug!("Received: {}", line);

        let response = match serde_json::from_str::<Command>(line) {
            Ok(command) => submit(&jobs, command).await,
            Err(e) => Response::failure(FocusError::Protocol(format!("bad request: {}", e)).to_string()),
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
    }

    Ok(())
}

async fn submit(jobs: &mpsc::Sender<Job>, command: Command) -> Response {
    let (reply, answer) = oneshot::channel();
    if jobs.send((command, reply)).await.is_err() {
        return Response::failure("focus daemon is shutting down");
    }
    answer
        .await
        .unwrap_or_else(|_| Response::failure("focus daemon dropped the request"))
}

/// Send one command to a running daemon and wait for its reply
pub async fn send(socket_path: &Path, command: Command) -> Result<Response> {
    let stream = UnixStream::connect(socket_path)
        .await
        .context("Failed to connect to focus daemon")?;
    let (reader, mut writer) = stream.into_split();

    let mut request = serde_json::to_vec(&command)?;
    request.push(b'\n');
    writer.write_all(&request).await?;
    writer.shutdown().await?;

    let mut line = String::new();
    BufReader::new(reader).read_line(&mut line).await?;
    serde_json::from_str(&line).context("Failed to parse daemon response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocking::BlockRule;
    use crate::config::FocusConfig;
    use crate::session::{SessionType, TimerMode};
    use crate::store::FocusStore;
    use crate::testing::{ManualClock, MemoryKvStore, RecordingBlocker};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn controller() -> (TimerController<MemoryKvStore, RecordingBlocker, ManualClock>, MemoryKvStore, ManualClock) {
        let kv = MemoryKvStore::new();
        let mut config = FocusConfig::default();
        config.set_block_list(["example.com"]);
        FocusStore::new(kv.clone()).save_config(&config).unwrap();

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap());
        let controller = TimerController::with_clock(kv.clone(), RecordingBlocker::new(), clock.clone());
        (controller, kv, clock)
    }

    #[test]
    fn test_command_wire_format() {
        assert_eq!(serde_json::to_value(Command::StartTimer).unwrap(), json!({ "action": "startTimer" }));
        let parsed: Command = serde_json::from_str(r#"{"action":"updateBlockRules"}"#).unwrap();
        assert_eq!(parsed, Command::UpdateBlockRules);
        assert!(serde_json::from_str::<Command>(r#"{"action":"selfDestruct"}"#).is_err());
    }

    #[test]
    fn test_failure_response_shape() {
        let value = serde_json::to_value(Response::failure("nope")).unwrap();
        assert_eq!(value, json!({ "ok": false, "error": "nope" }));
    }

    #[test]
    fn test_dispatch_commands() {
        let (mut controller, _kv, clock) = controller();

        let started = dispatch(&mut controller, Command::StartTimer);
        assert!(started.ok);
        let snapshot = started.snapshot.unwrap();
        assert_eq!(snapshot.state.mode, TimerMode::Running);
        assert!(snapshot.blocking_active);

        clock.advance_secs(60);
        let state = dispatch(&mut controller, Command::GetState).snapshot.unwrap();
        assert_eq!(state.remaining_seconds, 1440);

        let rules = dispatch(&mut controller, Command::UpdateBlockRules).rules.unwrap();
        assert!(rules.active);
        assert_eq!(rules.rules.len(), 1);

        let paused = dispatch(&mut controller, Command::PauseTimer).snapshot.unwrap();
        assert_eq!(paused.state.mode, TimerMode::Paused);

        let reset = dispatch(&mut controller, Command::ResetTimer).snapshot.unwrap();
        assert_eq!(reset.state.mode, TimerMode::Idle);
        assert_eq!(reset.remaining_seconds, 1500);
    }

    #[test]
    fn test_dispatch_reports_completion_and_clear() {
        let (mut controller, kv, clock) = controller();
        dispatch(&mut controller, Command::StartTimer);
        clock.advance_secs(1500);

        let response = dispatch(&mut controller, Command::GetState);
        assert_eq!(response.completion.unwrap().credited_minutes, 25);
        assert_eq!(response.snapshot.unwrap().state.session_type, SessionType::Break);

        let cleared = dispatch(&mut controller, Command::ClearStats);
        assert!(cleared.ok);
        assert!(FocusStore::new(kv).load_stats().unwrap().is_empty());
    }

    #[test]
    fn test_dispatch_storage_failure_is_reported() {
        let (mut controller, kv, _clock) = controller();
        kv.fail_writes(true);

        let response = dispatch(&mut controller, Command::StartTimer);
        assert!(!response.ok);
        assert!(response.snapshot.is_none());
        assert!(response.error.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_owner_removes_stale_rules_at_startup() {
        let kv = MemoryKvStore::new();
        let mut blocker = RecordingBlocker::new();
        blocker
            .update_rules(&[], &[BlockRule::for_domain(1, "example.com")])
            .unwrap();
        assert_eq!(blocker.installed_domains(), vec!["example.com"]);

        // Idle focus state: nothing should stay blocked
        let controller = TimerController::with_clock(
            kv,
            blocker.clone(),
            ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()),
        );
        let (jobs, queue) = mpsc::channel(1);
        drop(jobs);
        own(controller, queue).await;

        assert!(blocker.installed_domains().is_empty());
    }

    #[tokio::test]
    async fn test_owner_installs_missing_rules_at_startup() {
        let (mut controller, _kv, _clock) = controller();
        let blocker = controller.rules().blocker().clone();
        blocker.fail_installs(true);
        controller.start().unwrap();
        assert!(blocker.installed_domains().is_empty());

        // Blocker works again by the time the daemon restarts
        blocker.fail_installs(false);
        let (jobs, queue) = mpsc::channel(1);
        drop(jobs);
        own(controller, queue).await;

        assert_eq!(blocker.installed_domains(), vec!["example.com"]);
    }

    #[tokio::test]
    async fn test_socket_roundtrip() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("run").join("focus.sock");
        let (controller, _kv, _clock) = controller();

        let server = FocusServer::bind(&socket).unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(controller, async move {
            let _ = stopped.await;
        }));

        let started = send(&socket, Command::StartTimer).await.unwrap();
        assert!(started.ok);
        assert_eq!(started.snapshot.unwrap().state.mode, TimerMode::Running);

        let state = send(&socket, Command::GetState).await.unwrap();
        assert_eq!(state.snapshot.unwrap().state.mode, TimerMode::Running);

        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn test_bad_request_gets_protocol_error() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("focus.sock");
        let (controller, _kv, _clock) = controller();

        let server = FocusServer::bind(&socket).unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(controller, async move {
            let _ = stopped.await;
        }));

        let stream = UnixStream::connect(&socket).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"{\"action\":\"launch\"}\n").await.unwrap();
        writer.shutdown().await.unwrap();

        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).await.unwrap();
        let response: Response = serde_json::from_str(&line).unwrap();
        assert!(!response.ok);
        assert!(response.error.unwrap().starts_with("Protocol error"));

        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
