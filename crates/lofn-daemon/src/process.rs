//! Managed subprocess supervision
//!
//! A [`ManagedProcess`] wraps one external executable: a readiness-checked
//! `start`, an infallible idempotent `stop`, and broadcast state/log feeds.
//!
//! The `Child` handle is moved into a dedicated `wait_for_exit` background
//! task that calls `child.wait()`, so the real exit code is always captured.
//! Reader tasks deliver raw output chunks (not lines) to a pump task that
//! drives the readiness probe, splits complete lines into the log feed, and
//! owns every asynchronous state transition.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc, oneshot, Notify};
use tokio::time::timeout;

use lofn_core::prelude::*;
use lofn_core::{OutputStream, ProcessEvent, ProcessRole, ProcessState};

use crate::feed::{LogFeed, StateCell};
use crate::readiness::{Readiness, ReadinessProbe, ReadyInfo};

/// Grace period between the group SIGTERM and a force kill.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// What to run, and how.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Environment overlay on top of the inherited environment
    pub envs: Vec<(String, String)>,
    /// Mirror raw child output onto the host's own streams (debug
    /// passthrough). This does not change the log feed contract.
    pub mirror_output: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            envs: Vec::new(),
            mirror_output: false,
        }
    }

    pub fn with_envs(mut self, envs: Vec<(String, String)>) -> Self {
        self.envs = envs;
        self
    }

    pub fn with_mirror_output(mut self, mirror: bool) -> Self {
        self.mirror_output = mirror;
        self
    }
}

/// Handles onto a spawned child, present only while one may be alive.
struct LiveProcess {
    pid: Option<u32>,
    /// One-shot sender that tells the wait task to force-kill the child.
    /// Consumed on first use.
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set by the wait task once the child has exited.
    exited: Arc<AtomicBool>,
    /// Notified by the wait task immediately after the child exits.
    exit_notify: Arc<Notify>,
}

/// A supervised external process with an observable lifecycle.
pub struct ManagedProcess {
    name: String,
    role: ProcessRole,
    state: StateCell,
    logs: LogFeed,
    live: Option<LiveProcess>,
}

impl ManagedProcess {
    pub fn new(name: impl Into<String>, role: ProcessRole) -> Self {
        Self {
            name: name.into(),
            role,
            state: StateCell::new(),
            logs: LogFeed::new(),
            live: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> ProcessRole {
        self.role
    }

    pub fn current_state(&self) -> ProcessState {
        self.state.current()
    }

    /// State feed: current value, then every transition in order.
    pub fn subscribe_state(&self) -> (ProcessState, broadcast::Receiver<ProcessState>) {
        self.state.subscribe()
    }

    /// Log feed: retained history, then live lines.
    pub fn subscribe_logs(&self) -> (Vec<String>, broadcast::Receiver<String>) {
        self.logs.subscribe()
    }

    pub fn log_snapshot(&self) -> Vec<String> {
        self.logs.snapshot()
    }

    /// Spawn the process and wait for its readiness probe to match.
    ///
    /// Transitions `Stopped -> Starting` immediately and resolves only when
    /// the probe reports ready (state becomes `Running`), the probe reports a
    /// terminal failure, or the process exits first
    /// ([`Error::ProcessExitedBeforeReady`]). There is no timeout: a process
    /// that never signals readiness and never exits keeps `start` pending.
    pub async fn start(
        &mut self,
        spec: CommandSpec,
        probe: Box<dyn ReadinessProbe>,
    ) -> Result<ReadyInfo> {
        let current = self.state.current();
        if current != ProcessState::Stopped {
            return Err(Error::process(format!(
                "cannot start '{}' while {current}",
                self.name
            )));
        }

        info!(
            "Spawning {}: {} {}",
            self.name,
            spec.program,
            spec.args.join(" ")
        );
        self.state.set(ProcessState::Starting);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.envs.iter().cloned())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group so stop() can signal the child and any helpers
        // it forks in one shot.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.state.set(ProcessState::Errored);
                return Err(if e.kind() == std::io::ErrorKind::NotFound {
                    Error::spawn(format!("'{}' not found in PATH", spec.program))
                } else {
                    Error::spawn(e.to_string())
                });
            }
        };

        let pid = child.id();
        info!("{} started with PID: {:?}", self.name, pid);

        let (event_tx, event_rx) = mpsc::channel::<ProcessEvent>(256);

        let stdout = child.stdout.take().expect("stdout was configured");
        tokio::spawn(chunk_reader(stdout, OutputStream::Stdout, event_tx.clone()));

        let stderr = child.stderr.take().expect("stderr was configured");
        tokio::spawn(chunk_reader(stderr, OutputStream::Stderr, event_tx.clone()));

        // Shared exit-state primitives
        let exited = Arc::new(AtomicBool::new(false));
        let exit_notify = Arc::new(Notify::new());
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        // The wait task takes ownership of `child`.
        tokio::spawn(wait_for_exit(
            child,
            kill_rx,
            event_tx,
            Arc::clone(&exited),
            Arc::clone(&exit_notify),
        ));

        let (ready_tx, ready_rx) = oneshot::channel::<Result<ReadyInfo>>();
        tokio::spawn(pump(
            self.name.clone(),
            event_rx,
            probe,
            ready_tx,
            self.state.clone(),
            self.logs.clone(),
            spec.mirror_output,
        ));

        self.live = Some(LiveProcess {
            pid,
            kill_tx: Some(kill_tx),
            exited,
            exit_notify,
        });

        match ready_rx.await {
            Ok(Ok(info)) => Ok(info),
            Ok(Err(e)) => {
                // Readiness failed; make sure the child is fully gone before
                // reporting, so Errored never has a live child behind it.
                self.reap().await;
                Err(e)
            }
            Err(_) => {
                self.reap().await;
                self.state.set(ProcessState::Errored);
                Err(Error::process(format!(
                    "readiness channel closed for '{}'",
                    self.name
                )))
            }
        }
    }

    /// Halt the process. Never fails, and a second call on an
    /// already-stopped process resolves immediately without emitting a
    /// duplicate transition.
    ///
    /// Sends SIGTERM to the whole process group (a runner may fork helper
    /// processes), waits for exit with a grace period, and force-kills if the
    /// group ignores the signal. Termination failures are logged, never
    /// surfaced; shutdown always makes progress.
    pub async fn stop(&mut self) {
        match self.state.current() {
            ProcessState::Stopped => return,
            ProcessState::Errored => {
                // An errored process has no live child left; settle to
                // Stopped without passing through Stopping.
                self.live = None;
                self.state.set(ProcessState::Stopped);
                return;
            }
            _ => {}
        }

        let Some(live) = self.live.as_mut() else {
            warn!("stop: '{}' has no process handle", self.name);
            return;
        };

        self.state.set(ProcessState::Stopping);
        info!("Stopping {} (pid {:?})", self.name, live.pid);

        #[cfg(unix)]
        if let Some(pid) = live.pid {
            signal_group(pid);
        }

        // Race-free pattern: create the notified() future before checking the
        // flag, so an exit between the check and the await cannot be missed.
        // Scoped so the notified futures (which borrow `live`) drop before the
        // `self.live` reassignment below.
        {
            let notified = live.exit_notify.notified();
            if !live.exited.load(Ordering::Acquire)
                && timeout(STOP_GRACE, notified).await.is_err()
            {
                warn!("Timeout waiting for {} to exit, force killing", self.name);
                let notified = live.exit_notify.notified();
                if let Some(tx) = live.kill_tx.take() {
                    let _ = tx.send(());
                }
                if !live.exited.load(Ordering::Acquire) {
                    notified.await;
                }
            }
        }

        self.live = None;
        // The pump may have already settled Stopping -> Stopped on the exit
        // event; the cell suppresses the duplicate either way.
        self.state.set(ProcessState::Stopped);
        info!("{} stopped", self.name);
    }

    /// Mark a running process as failed and tear its child down.
    ///
    /// Used when a post-readiness step (e.g. emulator env-init) fails: the
    /// process itself may be healthy but the role it plays is broken.
    pub async fn fail(&mut self, reason: &str) {
        warn!("{} failed: {}", self.name, reason);
        self.state.set(ProcessState::Errored);
        self.reap().await;
    }

    /// Kill the child (if any) and wait for the wait task to reap it.
    /// The group gets a SIGTERM too so forked helpers do not linger.
    async fn reap(&mut self) {
        if let Some(live) = self.live.as_mut() {
            if !live.exited.load(Ordering::Acquire) {
                #[cfg(unix)]
                if let Some(pid) = live.pid {
                    signal_group(pid);
                }
                let notified = live.exit_notify.notified();
                if let Some(tx) = live.kill_tx.take() {
                    let _ = tx.send(());
                }
                if !live.exited.load(Ordering::Acquire) {
                    notified.await;
                }
            }
        }
        self.live = None;
    }
}

/// SIGTERM the whole process group; a negative PID addresses the group.
#[cfg(unix)]
fn signal_group(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Err(e) = kill(Pid::from_raw(-(pid as i32)), Signal::SIGTERM) {
        warn!("Failed to signal process group {}: {}", pid, e);
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if let Some(live) = self.live.as_mut() {
            if !live.exited.load(Ordering::Acquire) {
                warn!("{} dropped while its process may still be running", self.name);
                // Ask the wait task to tear the child down; kill_on_drop on
                // the Child is the final safety net.
                if let Some(tx) = live.kill_tx.take() {
                    let _ = tx.send(());
                }
            }
        }
    }
}

/// Background task: owns `child`, waits for it to exit, emits
/// [`ProcessEvent::Exited`] with the real exit code.
///
/// Two ways the task can end: the process exits naturally, or `kill_rx`
/// fires and the child is killed first.
async fn wait_for_exit(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    event_tx: mpsc::Sender<ProcessEvent>,
    exited: Arc<AtomicBool>,
    exit_notify: Arc<Notify>,
) {
    let code: Option<i32> = tokio::select! {
        result = child.wait() => {
            match result {
                Ok(status) => {
                    info!("Process exited with status: {:?}", status);
                    status.code()
                }
                Err(e) => {
                    error!("Error waiting for process: {}", e);
                    None
                }
            }
        }
        _ = kill_rx => {
            if let Err(e) = child.kill().await {
                error!("Failed to kill process: {}", e);
            }
            match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    error!("Error waiting after kill: {}", e);
                    None
                }
            }
        }
    };

    // Mark exited and wake waiters before sending the event, so stop() and
    // reap() observe the flag no later than the pump observes the event.
    exited.store(true, Ordering::Release);
    exit_notify.notify_waiters();

    let _ = event_tx.send(ProcessEvent::Exited { code }).await;
}

/// Read raw chunks from one pipe and forward them as events.
///
/// Chunked (not line-buffered) on purpose: readiness markers may arrive
/// split across arbitrary boundaries and the probes handle that.
async fn chunk_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    stream: OutputStream,
    tx: mpsc::Sender<ProcessEvent>,
) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx.send(ProcessEvent::Output { stream, chunk }).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("{:?} reader error: {}", stream, e);
                break;
            }
        }
    }
    debug!("{:?} reader finished", stream);
}

/// Single consumer of process events: drives the readiness probe, splits
/// complete lines into the log feed, and applies every asynchronous state
/// transition (ready, readiness failure, exit).
async fn pump(
    name: String,
    mut events: mpsc::Receiver<ProcessEvent>,
    mut probe: Box<dyn ReadinessProbe>,
    ready_tx: oneshot::Sender<Result<ReadyInfo>>,
    state: StateCell,
    logs: LogFeed,
    mirror_output: bool,
) {
    let mut ready_tx = Some(ready_tx);
    let mut line_buf = String::new();

    while let Some(event) = events.recv().await {
        match event {
            ProcessEvent::Output { stream, chunk } => {
                if mirror_output {
                    match stream {
                        OutputStream::Stdout => print!("{chunk}"),
                        OutputStream::Stderr => eprint!("{chunk}"),
                    }
                }
                split_lines(&mut line_buf, &chunk, &logs);

                if let Some(tx) = ready_tx.take() {
                    match probe.observe(&chunk) {
                        Readiness::Pending => ready_tx = Some(tx),
                        Readiness::Ready(info) => {
                            state.set(ProcessState::Running);
                            let _ = tx.send(Ok(info));
                        }
                        Readiness::Failed(failure) => {
                            state.set(ProcessState::Errored);
                            let _ = tx.send(Err(failure.into_error(&name)));
                        }
                    }
                }
            }
            ProcessEvent::Exited { code } => match state.current() {
                ProcessState::Starting => {
                    state.set(ProcessState::Errored);
                    if let Some(tx) = ready_tx.take() {
                        let _ = tx.send(Err(Error::exited_before_ready(&name, code)));
                    }
                }
                ProcessState::Running => {
                    warn!("{} exited unexpectedly with code {:?}", name, code);
                    state.set(ProcessState::Errored);
                }
                ProcessState::Stopping => {
                    state.set(ProcessState::Stopped);
                    if let Some(tx) = ready_tx.take() {
                        let _ = tx.send(Err(Error::process(format!(
                            "'{name}' was stopped before becoming ready"
                        ))));
                    }
                }
                _ => {}
            },
        }
    }

    if !line_buf.is_empty() {
        logs.publish(std::mem::take(&mut line_buf));
    }
    debug!("{} event pump finished", name);
}

/// Accumulate chunk text and publish each completed line to the log feed.
fn split_lines(buf: &mut String, chunk: &str, logs: &LogFeed) {
    buf.push_str(chunk);
    while let Some(pos) = buf.find('\n') {
        let mut line: String = buf.drain(..=pos).collect();
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        logs.publish(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Generic marker probe for tests: ready once `marker` appears.
    struct MarkerProbe {
        marker: &'static str,
        buffer: String,
    }

    impl MarkerProbe {
        fn new(marker: &'static str) -> Box<Self> {
            Box::new(Self {
                marker,
                buffer: String::new(),
            })
        }
    }

    impl ReadinessProbe for MarkerProbe {
        fn observe(&mut self, chunk: &str) -> Readiness {
            self.buffer.push_str(chunk);
            if self.buffer.contains(self.marker) {
                Readiness::Ready(ReadyInfo::default())
            } else {
                Readiness::Pending
            }
        }
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    async fn await_state(
        rx: &mut broadcast::Receiver<ProcessState>,
        wanted: ProcessState,
    ) -> bool {
        for _ in 0..50 {
            match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
                Ok(Ok(state)) if state == wanted => return true,
                Ok(Ok(_)) => continue,
                _ => return false,
            }
        }
        false
    }

    #[tokio::test]
    async fn test_start_resolves_on_readiness_marker() {
        let mut process = ManagedProcess::new("test", ProcessRole::Function);
        process
            .start(sh("echo READY; sleep 30"), MarkerProbe::new("READY"))
            .await
            .expect("start should resolve on marker");

        assert_eq!(process.current_state(), ProcessState::Running);
        process.stop().await;
        assert_eq!(process.current_state(), ProcessState::Stopped);
    }

    #[tokio::test]
    async fn test_start_resolves_on_marker_split_across_writes() {
        let mut process = ManagedProcess::new("test", ProcessRole::Function);
        process
            .start(
                sh("printf 'REA'; sleep 0.1; printf 'DY\\n'; sleep 30"),
                MarkerProbe::new("READY"),
            )
            .await
            .expect("split marker should still resolve start");

        assert_eq!(process.current_state(), ProcessState::Running);
        process.stop().await;
    }

    #[tokio::test]
    async fn test_exit_before_ready_fails_start() {
        let mut process = ManagedProcess::new("fn-a", ProcessRole::Function);
        let result = process
            .start(sh("echo nope; exit 7"), MarkerProbe::new("READY"))
            .await;

        match result {
            Err(Error::ProcessExitedBeforeReady { name, code }) => {
                assert_eq!(name, "fn-a");
                assert_eq!(code, Some(7));
            }
            other => panic!("expected ProcessExitedBeforeReady, got {other:?}"),
        }
        assert_eq!(process.current_state(), ProcessState::Errored);
    }

    #[tokio::test]
    async fn test_spawn_failure_errors_and_reports_program() {
        let mut process = ManagedProcess::new("test", ProcessRole::Function);
        let result = process
            .start(
                CommandSpec::new("definitely-not-a-real-binary", vec![]),
                MarkerProbe::new("READY"),
            )
            .await;

        assert!(matches!(result, Err(Error::ProcessSpawn { .. })));
        assert_eq!(process.current_state(), ProcessState::Errored);
    }

    #[tokio::test]
    async fn test_start_refused_unless_stopped() {
        let mut process = ManagedProcess::new("test", ProcessRole::Function);
        process
            .start(sh("echo READY; sleep 30"), MarkerProbe::new("READY"))
            .await
            .unwrap();

        let result = process
            .start(sh("echo READY"), MarkerProbe::new("READY"))
            .await;
        assert!(matches!(result, Err(Error::Process { .. })));

        process.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_single_stopped_transition() {
        let mut process = ManagedProcess::new("test", ProcessRole::Function);
        process
            .start(sh("echo READY; sleep 30"), MarkerProbe::new("READY"))
            .await
            .unwrap();

        let (_, mut rx) = process.subscribe_state();
        process.stop().await;
        process.stop().await;

        let mut stopped_count = 0;
        while let Ok(state) = rx.try_recv() {
            if state == ProcessState::Stopped {
                stopped_count += 1;
            }
        }
        assert_eq!(stopped_count, 1, "expected exactly one Stopped transition");
    }

    #[tokio::test]
    async fn test_unsolicited_exit_transitions_to_errored() {
        let mut process = ManagedProcess::new("test", ProcessRole::Function);
        process
            .start(sh("echo READY; sleep 0.1; exit 3"), MarkerProbe::new("READY"))
            .await
            .unwrap();
        assert_eq!(process.current_state(), ProcessState::Running);

        let (current, mut rx) = process.subscribe_state();
        assert!(
            current == ProcessState::Errored
                || await_state(&mut rx, ProcessState::Errored).await,
            "crash should surface as Errored without polling"
        );
    }

    #[tokio::test]
    async fn test_stop_from_errored_settles_to_stopped() {
        let mut process = ManagedProcess::new("test", ProcessRole::Function);
        let _ = process
            .start(sh("exit 1"), MarkerProbe::new("READY"))
            .await;
        assert_eq!(process.current_state(), ProcessState::Errored);

        let (_, mut rx) = process.subscribe_state();
        process.stop().await;
        assert_eq!(process.current_state(), ProcessState::Stopped);
        assert_eq!(rx.try_recv().unwrap(), ProcessState::Stopped);
        assert!(rx.try_recv().is_err(), "exactly one settling transition");
    }

    #[tokio::test]
    async fn test_log_feed_delivers_lines_in_order_with_replay() {
        let mut process = ManagedProcess::new("test", ProcessRole::Function);
        process
            .start(
                sh("echo one; echo two; echo READY; sleep 30"),
                MarkerProbe::new("READY"),
            )
            .await
            .unwrap();

        // Late subscriber still sees the full stream from the start.
        for _ in 0..50 {
            if process.log_snapshot().len() >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let (history, _rx) = process.subscribe_logs();
        assert_eq!(history, vec!["one", "two", "READY"]);

        process.stop().await;
    }

    #[tokio::test]
    async fn test_stop_kills_process_that_ignores_nothing() {
        // A plain sleep exits on the group SIGTERM.
        let mut process = ManagedProcess::new("test", ProcessRole::Function);
        process
            .start(sh("echo READY; sleep 60"), MarkerProbe::new("READY"))
            .await
            .unwrap();

        let started = std::time::Instant::now();
        process.stop().await;
        assert_eq!(process.current_state(), ProcessState::Stopped);
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "stop should not hang on a cooperative process"
        );
    }
}
