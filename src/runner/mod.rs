//! Supervision of the bot process (`node main.js`).
//!
//! The runner owns a single child at a time. Output lines stream to the
//! caller; the first line matching a known failure signature ends the run:
//! the child is killed and the mapped suggestion is surfaced. Every exit,
//! whether user stop, crash or external termination, resets the runner to
//! Idle. Restarts are always user initiated.

pub mod registry;
pub mod remediation;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use registry::BotRegistry;
use remediation::{suggested_fix, RunContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Starting,
    Running,
}

#[derive(Debug, Clone)]
pub enum RunnerEvent {
    /// The child spawned; carries the agents-online summary for display.
    Started {
        pid: u32,
        agents_online: usize,
        host: String,
        port: String,
    },
    /// One line of combined stdout/stderr output.
    Line(String),
    /// A failure signature matched; the child has been killed.
    Remediation(String),
    /// The child is gone, for any reason.
    Exited { code: Option<i32> },
}

/// Everything needed to start the bot process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub install_dir: PathBuf,
    pub settings_path: PathBuf,
    pub context: RunContext,
    pub agents_online: usize,
    pub host: String,
}

pub struct Runner {
    registry: Arc<BotRegistry>,
    state: Arc<Mutex<RunnerState>>,
    /// One remediation episode per run; set on the first trigger hit.
    episode: Arc<AtomicBool>,
}

impl Runner {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(BotRegistry::new()),
            state: Arc::new(Mutex::new(RunnerState::Idle)),
            episode: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> RunnerState {
        *self.state.lock()
    }

    /// Locates the node binary, falling back to the bare name so PATH
    /// resolution still gets a chance at spawn time.
    fn node_binary() -> PathBuf {
        which::which("node").unwrap_or_else(|_| PathBuf::from("node"))
    }

    /// Starts `node main.js` in the installation directory.
    pub fn launch(&self, spec: LaunchSpec, events: UnboundedSender<RunnerEvent>) -> Result<u32> {
        let mut command = tokio::process::Command::new(Self::node_binary());
        command
            .arg("main.js")
            .current_dir(&spec.install_dir)
            .env("SETTINGS_PATH", &spec.settings_path);
        #[cfg(windows)]
        {
            // CREATE_NO_WINDOW, the child must not open a console.
            command.creation_flags(0x0800_0000);
        }
        self.spawn_supervised(command, spec, events)
    }

    /// Spawns and supervises an arbitrary command with the runner's output
    /// and exit handling. Split out from launch so the machinery is
    /// exercisable without a node installation.
    pub fn spawn_supervised(
        &self,
        mut command: tokio::process::Command,
        spec: LaunchSpec,
        events: UnboundedSender<RunnerEvent>,
    ) -> Result<u32> {
        {
            let mut state = self.state.lock();
            if *state != RunnerState::Idle {
                anyhow::bail!("the bot process is already running");
            }
            *state = RunnerState::Starting;
        }
        self.episode.store(false, Ordering::SeqCst);

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn().context("failed to start the bot process") {
            Ok(child) => child,
            Err(e) => {
                *self.state.lock() = RunnerState::Idle;
                return Err(e);
            }
        };

        let pid = child.id().unwrap_or_default();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let handle = self.registry.register(pid, child);
        *self.state.lock() = RunnerState::Running;
        info!("bot process started (PID: {pid})");

        let _ = events.send(RunnerEvent::Started {
            pid,
            agents_online: spec.agents_online,
            host: spec.host.clone(),
            port: spec.context.port.clone(),
        });

        if let Some(stdout) = stdout {
            self.pump_output(stdout, spec.context.clone(), events.clone());
        }
        if let Some(stderr) = stderr {
            self.pump_output(stderr, spec.context.clone(), events.clone());
        }
        self.watch_exit(handle, events);

        Ok(pid)
    }

    /// Forwards lines and runs the trigger check on each one. Checking stops
    /// for the rest of the run once a trigger has fired.
    fn pump_output<R>(&self, stream: R, ctx: RunContext, events: UnboundedSender<RunnerEvent>)
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let episode = self.episode.clone();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if events.send(RunnerEvent::Line(line.clone())).is_err() {
                    break;
                }
                if episode.load(Ordering::SeqCst) {
                    continue;
                }
                if let Some(fix) = suggested_fix(&line, &ctx) {
                    // First hit claims the episode; a concurrent stderr hit loses.
                    if episode.swap(true, Ordering::SeqCst) {
                        continue;
                    }
                    warn!("known failure signature in bot output: {line}");
                    let _ = events.send(RunnerEvent::Remediation(fix));
                    registry.kill_current();
                }
            }
        });
    }

    /// Polls for process exit and resets the runner state when it happens.
    fn watch_exit(
        &self,
        handle: Arc<registry::BotHandle>,
        events: UnboundedSender<RunnerEvent>,
    ) {
        let state = self.state.clone();
        let registry = self.registry.clone();
        let episode = self.episode.clone();
        tokio::spawn(async move {
            let code = loop {
                match handle.try_wait() {
                    Ok(Some(status)) => break status.code(),
                    Ok(None) => tokio::time::sleep(Duration::from_millis(200)).await,
                    Err(e) => {
                        warn!("failed to poll bot process: {e}");
                        break None;
                    }
                }
            };

            // Uniform reset regardless of why the process went away.
            registry.clear();
            episode.store(false, Ordering::SeqCst);
            *state.lock() = RunnerState::Idle;
            info!("bot process exited (code: {code:?})");
            let _ = events.send(RunnerEvent::Exited { code });
        });
    }

    /// User-initiated stop. The exit watcher performs the state reset.
    pub fn stop(&self) {
        info!("stopping bot process");
        self.registry.kill_current();
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the launch spec from the on-disk settings document the way the
/// shell does: string conversions with fixed fallbacks.
pub fn launch_spec_from_settings(
    install_dir: &Path,
    raw_settings: &serde_json::Map<String, serde_json::Value>,
) -> LaunchSpec {
    let display = |value: &serde_json::Value| match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let port = raw_settings
        .get("port")
        .map(&display)
        .unwrap_or_else(|| "25565".into());
    let minecraft_version = raw_settings
        .get("minecraft_version")
        .map(&display)
        .unwrap_or_else(|| "the correct version".into());
    let host = raw_settings
        .get("host")
        .map(&display)
        .unwrap_or_else(|| "Unknown".into());
    let agents_online = raw_settings
        .get("profiles")
        .and_then(serde_json::Value::as_array)
        .map(|a| a.len())
        .unwrap_or(0);

    LaunchSpec {
        install_dir: install_dir.to_path_buf(),
        settings_path: install_dir.join("settings.json"),
        context: RunContext {
            port,
            minecraft_version,
        },
        agents_online,
        host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn spec_for(dir: &Path, port: &str) -> LaunchSpec {
        LaunchSpec {
            install_dir: dir.to_path_buf(),
            settings_path: dir.join("settings.json"),
            context: RunContext {
                port: port.into(),
                minecraft_version: "1.21.1".into(),
            },
            agents_online: 1,
            host: "127.0.0.1".into(),
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<RunnerEvent>) -> RunnerEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for runner event")
            .expect("event channel closed")
    }

    #[test]
    fn launch_spec_reads_settings_with_fallbacks() {
        let raw = match json!({
            "port": "25565",
            "minecraft_version": "1.21.1",
            "host": "127.0.0.1",
            "profiles": ["./gui_agents/andy.json", "./gui_agents/rocky.json"]
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let spec = launch_spec_from_settings(Path::new("/opt/mc"), &raw);
        assert_eq!(spec.context.port, "25565");
        assert_eq!(spec.agents_online, 2);
        assert_eq!(spec.settings_path, PathBuf::from("/opt/mc/settings.json"));

        let empty = serde_json::Map::new();
        let defaults = launch_spec_from_settings(Path::new("/opt/mc"), &empty);
        assert_eq!(defaults.context.port, "25565");
        assert_eq!(defaults.context.minecraft_version, "the correct version");
        assert_eq!(defaults.host, "Unknown");
        assert_eq!(defaults.agents_online, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn trigger_line_kills_child_and_surfaces_suggestion() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut command = tokio::process::Command::new("sh");
        command.arg("-c").arg(
            "echo 'Error: connect ECONNREFUSED 127.0.0.1:25565'; sleep 30",
        );
        runner
            .spawn_supervised(command, spec_for(dir.path(), "25565"), tx)
            .unwrap();
        assert_eq!(runner.state(), RunnerState::Running);

        let mut saw_suggestion = false;
        loop {
            match next_event(&mut rx).await {
                RunnerEvent::Remediation(fix) => {
                    assert!(fix.contains("Open to LAN on port 25565"));
                    saw_suggestion = true;
                }
                RunnerEvent::Exited { .. } => break,
                _ => {}
            }
        }
        assert!(saw_suggestion);
        // The kill path resets the runner like any other exit.
        assert_eq!(runner.state(), RunnerState::Idle);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn natural_exit_resets_state() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut command = tokio::process::Command::new("sh");
        command.arg("-c").arg("echo 'agent is online'; exit 0");
        runner
            .spawn_supervised(command, spec_for(dir.path(), "55916"), tx)
            .unwrap();

        let mut exit_code = None;
        loop {
            match next_event(&mut rx).await {
                RunnerEvent::Exited { code } => {
                    exit_code = code;
                    break;
                }
                RunnerEvent::Remediation(_) => panic!("no trigger expected"),
                _ => {}
            }
        }
        assert_eq!(exit_code, Some(0));
        assert_eq!(runner.state(), RunnerState::Idle);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn user_stop_resets_state() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut command = tokio::process::Command::new("sleep");
        command.arg("30");
        runner
            .spawn_supervised(command, spec_for(dir.path(), "55916"), tx)
            .unwrap();
        assert_eq!(runner.state(), RunnerState::Running);

        runner.stop();
        loop {
            if matches!(next_event(&mut rx).await, RunnerEvent::Exited { .. }) {
                break;
            }
        }
        assert_eq!(runner.state(), RunnerState::Idle);
    }

    #[tokio::test]
    async fn second_launch_while_running_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Runner::new();
        *runner.state.lock() = RunnerState::Running;

        let (tx, _rx) = mpsc::unbounded_channel();
        let command = tokio::process::Command::new("sh");
        let err = runner
            .spawn_supervised(command, spec_for(dir.path(), "55916"), tx)
            .unwrap_err();
        assert!(err.to_string().contains("already running"));
    }
}
