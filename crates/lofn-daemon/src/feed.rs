//! Broadcast feeds with replay for process state and log output
//!
//! Both feeds are small fan-out primitives over a tokio broadcast channel
//! plus a retained buffer, so a subscriber arriving late still sees what it
//! missed: the log feed replays its full retained history, the state cell
//! replays the latest value.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use lofn_core::prelude::*;
use lofn_core::ProcessState;

/// Retained log lines per process
const LOG_HISTORY: usize = 2000;

/// Broadcast channel capacity; slow subscribers that lag past this lose
/// intermediate lines, which the TUI tolerates (it redraws from history).
const CHANNEL_CAPACITY: usize = 512;

/// Append-only line feed: broadcast fan-out with full-history replay for
/// late subscribers.
#[derive(Clone)]
pub struct LogFeed {
    history: Arc<Mutex<VecDeque<String>>>,
    tx: broadcast::Sender<String>,
}

impl LogFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            history: Arc::new(Mutex::new(VecDeque::new())),
            tx,
        }
    }

    /// Append a line and fan it out to all current subscribers.
    pub fn publish(&self, line: impl Into<String>) {
        let line = line.into();
        {
            let mut history = self.history.lock().expect("log feed lock");
            if history.len() == LOG_HISTORY {
                history.pop_front();
            }
            history.push_back(line.clone());
        }
        // No subscribers yet is fine; history covers them.
        let _ = self.tx.send(line);
    }

    /// Subscribe: returns the retained history plus a live receiver.
    ///
    /// The lock is held while subscribing so no line can fall between the
    /// replayed history and the live stream.
    pub fn subscribe(&self) -> (Vec<String>, broadcast::Receiver<String>) {
        let history = self.history.lock().expect("log feed lock");
        let rx = self.tx.subscribe();
        (history.iter().cloned().collect(), rx)
    }

    /// The retained history at this instant.
    pub fn snapshot(&self) -> Vec<String> {
        self.history
            .lock()
            .expect("log feed lock")
            .iter()
            .cloned()
            .collect()
    }
}

impl Default for LogFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Current-state cell with ordered change fan-out.
///
/// New subscribers receive the current value, then every subsequent
/// transition in emission order, exactly once. `set` refuses transitions the
/// lifecycle graph does not allow, so no subscriber can ever observe an
/// illegal sequence.
#[derive(Clone)]
pub struct StateCell {
    current: Arc<Mutex<ProcessState>>,
    tx: broadcast::Sender<ProcessState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            current: Arc::new(Mutex::new(ProcessState::Stopped)),
            tx,
        }
    }

    pub fn current(&self) -> ProcessState {
        *self.current.lock().expect("state cell lock")
    }

    /// Apply a transition if the lifecycle graph allows it.
    ///
    /// Returns whether the transition was applied (and published). A repeated
    /// or illegal target is refused without emitting anything, which is what
    /// makes halts idempotent: the second path to `Stopped` is a no-op.
    pub fn set(&self, next: ProcessState) -> bool {
        let mut current = self.current.lock().expect("state cell lock");
        if *current == next {
            return false;
        }
        if !current.can_transition_to(next) {
            debug!("refused state transition {} -> {}", *current, next);
            return false;
        }
        trace!("state transition {} -> {}", *current, next);
        *current = next;
        let _ = self.tx.send(next);
        true
    }

    /// Subscribe: returns the current state plus a live receiver for all
    /// subsequent transitions.
    pub fn subscribe(&self) -> (ProcessState, broadcast::Receiver<ProcessState>) {
        let current = self.current.lock().expect("state cell lock");
        (*current, self.tx.subscribe())
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
