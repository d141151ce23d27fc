//! Session orchestration
//!
//! Owns every process lifecycle for one development session: start the
//! emulator, then start all function runners while push subscriptions are
//! reconciled against the resolved emulator endpoint, then hold until the
//! shutdown signal and tear everything down.
//!
//! The TEA loop never touches processes directly; it only sees the messages
//! the feed forwarders and this orchestrator emit.

use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};

use lofn_core::prelude::*;
use lofn_daemon::{
    reconcile_push_subscription, EmulatorOptions, EmulatorPubSubClient, FunctionRunner,
    FunctionRunnerOptions, PubSubEmulator, SubscriptionSpec, EMULATOR_PROCESS_NAME,
};

use crate::config::HarnessConfig;
use crate::message::Message;

/// The managed processes of one session.
pub struct SessionProcesses {
    pub emulator: PubSubEmulator,
    pub runners: Vec<FunctionRunner>,
}

/// Build the emulator and one runner per configured function.
///
/// Ports are assigned deterministically: base port plus the function's index
/// in configured order.
pub fn build_processes(config: &HarnessConfig, debug: bool) -> Result<SessionProcesses> {
    let emulator = PubSubEmulator::new(EmulatorOptions {
        project: config.project.clone(),
        data_dir: config.emulator_data_dir.clone(),
        host_port: config.emulator_host_port.clone(),
        debug,
    })?;

    let runners = config
        .functions
        .iter()
        .enumerate()
        .map(|(index, descriptor)| {
            FunctionRunner::new(
                descriptor.clone(),
                FunctionRunnerOptions {
                    port: config.base_port + index as u16,
                    debug,
                    extra_env: config.env_overlay.clone(),
                },
            )
        })
        .collect();

    Ok(SessionProcesses { emulator, runners })
}

/// Forward one process's state and log feeds into the message channel.
fn spawn_feed_forwarders(
    name: String,
    state_feed: (
        lofn_core::ProcessState,
        tokio::sync::broadcast::Receiver<lofn_core::ProcessState>,
    ),
    log_feed: (Vec<String>, tokio::sync::broadcast::Receiver<String>),
    msg_tx: mpsc::Sender<Message>,
) {
    use tokio::sync::broadcast::error::RecvError;

    let (_, mut state_rx) = state_feed;
    let state_name = name.clone();
    let state_tx = msg_tx.clone();
    tokio::spawn(async move {
        loop {
            match state_rx.recv().await {
                Ok(state) => {
                    if state_tx
                        .send(Message::ProcessState {
                            name: state_name.clone(),
                            state,
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("{}: state feed lagged by {}", state_name, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let (history, mut log_rx) = log_feed;
    tokio::spawn(async move {
        for line in history {
            if msg_tx
                .send(Message::ProcessLog {
                    name: name.clone(),
                    line,
                })
                .await
                .is_err()
            {
                return;
            }
        }
        loop {
            match log_rx.recv().await {
                Ok(line) => {
                    if msg_tx
                        .send(Message::ProcessLog {
                            name: name.clone(),
                            line,
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("{}: log feed lagged by {}", name, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Subscribe the TEA loop to every process's feeds. Call before the session
/// starts so no transition is missed.
pub fn spawn_all_forwarders(processes: &SessionProcesses, msg_tx: &mpsc::Sender<Message>) {
    spawn_feed_forwarders(
        processes.emulator.name().to_string(),
        processes.emulator.subscribe_state(),
        processes.emulator.subscribe_logs(),
        msg_tx.clone(),
    );
    for runner in &processes.runners {
        spawn_feed_forwarders(
            runner.name().to_string(),
            runner.subscribe_state(),
            runner.subscribe_logs(),
            msg_tx.clone(),
        );
    }
}

/// Drive the session: emulator first, then runners and subscription
/// reconciliation concurrently, then hold until shutdown and tear down.
///
/// Fatal errors (emulator startup, unreachable backend) are reported as a
/// fatal [`Message::SessionError`] and returned after teardown so the caller
/// can exit non-zero. A single runner failing to start is reported non-fatal
/// and does not disturb its siblings.
pub async fn run_session(
    mut processes: SessionProcesses,
    msg_tx: mpsc::Sender<Message>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let startup_task = startup(&mut processes, &msg_tx);

    let result = tokio::select! {
        result = startup_task => result,
        _ = wait_for_shutdown(&mut shutdown_rx) => {
            info!("Shutdown requested during startup");
            Ok(())
        }
    };

    match &result {
        Err(e) => {
            let _ = msg_tx
                .send(Message::SessionError {
                    message: e.to_string(),
                    fatal: true,
                })
                .await;
        }
        Ok(()) => {
            wait_for_shutdown(&mut shutdown_rx).await;
        }
    }

    // Teardown always completes: stop runners concurrently, tolerate any of
    // them already being stopped or errored, then stop the emulator (which
    // also removes its environment variables and temp data dir).
    info!("Stopping all session processes");
    join_all(processes.runners.iter_mut().map(|runner| runner.stop())).await;
    processes.emulator.stop().await;

    result
}

async fn startup(
    processes: &mut SessionProcesses,
    msg_tx: &mpsc::Sender<Message>,
) -> Result<()> {
    // Phase 1: nothing can usefully run without the emulator.
    processes.emulator.start().await?;

    if let Some(port) = processes.emulator.port() {
        let _ = msg_tx
            .send(Message::ProcessPort {
                name: EMULATOR_PROCESS_NAME.to_string(),
                port,
            })
            .await;
    }

    let endpoint = processes
        .emulator
        .endpoint()
        .ok_or_else(|| Error::process("emulator readiness did not resolve a port"))?;
    let project = processes.emulator.project_id().to_string();

    // Phase 2: subscriptions only need each runner's assigned port, not a
    // running process, so provisioning and startup proceed concurrently.
    let specs: Vec<SubscriptionSpec> = processes
        .runners
        .iter()
        .filter_map(|runner| {
            runner.descriptor().trigger.topic().map(|topic| SubscriptionSpec {
                project: project.clone(),
                topic: topic.to_string(),
                function_name: runner.name().to_string(),
                push_endpoint: runner.push_endpoint(),
            })
        })
        .collect();

    let api = EmulatorPubSubClient::new(endpoint);
    let reconcile = async {
        for spec in &specs {
            reconcile_push_subscription(&api, spec).await?;
        }
        Ok::<usize, Error>(specs.len())
    };

    let names: Vec<String> = processes
        .runners
        .iter()
        .map(|runner| runner.name().to_string())
        .collect();
    let starts = join_all(processes.runners.iter_mut().map(|runner| runner.start()));

    let (reconciled, start_results) = tokio::join!(reconcile, starts);

    // A runner failing in isolation surfaces as an Errored row plus a status
    // note; its siblings keep going.
    for (name, start_result) in names.iter().zip(start_results) {
        if let Err(e) = start_result {
            warn!("Function runner '{}' failed to start: {}", name, e);
            let _ = msg_tx
                .send(Message::SessionError {
                    message: format!("{name}: {e}"),
                    fatal: false,
                })
                .await;
        }
    }

    // A missing subscription means silent message loss; that aborts the
    // session rather than being retried quietly.
    let count = reconciled?;
    let _ = msg_tx
        .send(Message::SubscriptionsReconciled { count })
        .await;

    info!("Session startup complete");
    Ok(())
}

async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    if *shutdown_rx.borrow() {
        return;
    }
    // A closed channel means the session owner is gone; treat as shutdown.
    while shutdown_rx.changed().await.is_ok() {
        if *shutdown_rx.borrow() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lofn_core::{FunctionDescriptor, TriggerKind};
    use std::collections::BTreeMap;

    fn config(functions: Vec<FunctionDescriptor>) -> HarnessConfig {
        HarnessConfig {
            project: "demo".to_string(),
            base_port: 8080,
            functions,
            emulator_data_dir: None,
            emulator_host_port: None,
            env_overlay: Vec::new(),
        }
    }

    fn descriptor(name: &str, trigger: TriggerKind) -> FunctionDescriptor {
        FunctionDescriptor {
            name: name.to_string(),
            entry_point: None,
            source: None,
            trigger,
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn test_build_processes_assigns_sequential_ports() {
        let processes = build_processes(
            &config(vec![
                descriptor("a", TriggerKind::Http),
                descriptor("b", TriggerKind::Http),
                descriptor("c", TriggerKind::Http),
            ]),
            false,
        )
        .unwrap();

        let ports: Vec<u16> = processes.runners.iter().map(|r| r.port()).collect();
        assert_eq!(ports, vec![8080, 8081, 8082]);
    }

    #[test]
    fn test_build_processes_validates_data_dir_before_spawn() {
        let mut cfg = config(vec![]);
        cfg.emulator_data_dir = Some(std::path::PathBuf::from("/not/a/real/dir"));
        assert!(matches!(
            build_processes(&cfg, false),
            Err(Error::InvalidDataDirectory { .. })
        ));
    }

    #[test]
    fn test_subscription_specs_only_for_event_functions() {
        let processes = build_processes(
            &config(vec![
                descriptor("a", TriggerKind::PubSub { topic: "t1".to_string() }),
                descriptor("web", TriggerKind::Http),
                descriptor("b", TriggerKind::PubSub { topic: "t1".to_string() }),
            ]),
            false,
        )
        .unwrap();

        let specs: Vec<SubscriptionSpec> = processes
            .runners
            .iter()
            .filter_map(|runner| {
                runner.descriptor().trigger.topic().map(|topic| SubscriptionSpec {
                    project: "demo".to_string(),
                    topic: topic.to_string(),
                    function_name: runner.name().to_string(),
                    push_endpoint: runner.push_endpoint(),
                })
            })
            .collect();

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].function_name, "a");
        assert_eq!(specs[0].push_endpoint, "http://localhost:8080");
        assert_eq!(specs[1].function_name, "b");
        assert_eq!(specs[1].push_endpoint, "http://localhost:8082");
    }

    #[tokio::test]
    async fn test_forwarders_deliver_state_and_logs() {
        use lofn_core::ProcessState;
        use lofn_daemon::{LogFeed, StateCell};

        let cell = StateCell::new();
        let logs = LogFeed::new();
        logs.publish("replayed");

        let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(64);
        spawn_feed_forwarders(
            "a".to_string(),
            cell.subscribe(),
            logs.subscribe(),
            msg_tx,
        );

        cell.set(ProcessState::Starting);
        logs.publish("live");

        let mut got_state = false;
        let mut got_lines = Vec::new();
        for _ in 0..3 {
            match tokio::time::timeout(std::time::Duration::from_millis(500), msg_rx.recv())
                .await
                .expect("forwarded message")
                .expect("channel open")
            {
                Message::ProcessState { name, state } => {
                    assert_eq!(name, "a");
                    assert_eq!(state, ProcessState::Starting);
                    got_state = true;
                }
                Message::ProcessLog { line, .. } => got_lines.push(line),
                other => panic!("unexpected message {other:?}"),
            }
        }

        assert!(got_state);
        assert_eq!(got_lines, vec!["replayed".to_string(), "live".to_string()]);
    }
}
