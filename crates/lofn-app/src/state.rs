//! Application state (Model in TEA pattern)
//!
//! Holds the status snapshot: one row per managed process plus the active
//! selection whose log history is displayed. The state owns no process
//! lifecycles; it is a projection rebuilt from messages.

use std::collections::VecDeque;

use lofn_core::{ProcessRole, ProcessState};

/// Retained log lines per process row
const MAX_PROCESS_LOG: usize = 2000;

/// One row of the status snapshot.
#[derive(Debug)]
pub struct ProcessEntry {
    pub name: String,
    pub role: ProcessRole,
    pub state: ProcessState,
    pub port: Option<u16>,
    logs: VecDeque<String>,
}

impl ProcessEntry {
    fn new(name: impl Into<String>, role: ProcessRole, port: Option<u16>) -> Self {
        Self {
            name: name.into(),
            role,
            state: ProcessState::Stopped,
            port,
            logs: VecDeque::new(),
        }
    }

    /// The port column, with a placeholder until the port is known.
    pub fn port_display(&self) -> String {
        match self.port {
            Some(port) => port.to_string(),
            None => "----".to_string(),
        }
    }

    pub fn logs(&self) -> &VecDeque<String> {
        &self.logs
    }

    fn push_log(&mut self, line: String) {
        if self.logs.len() == MAX_PROCESS_LOG {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }
}

/// The application model: snapshot rows, selection, log view, status line.
pub struct AppState {
    pub project: String,
    processes: Vec<ProcessEntry>,
    selected: usize,
    pub should_quit: bool,
    pub status_message: Option<String>,

    /// Log view: lines scrolled up from the bottom; 0 means following
    pub log_offset: usize,

    revision: u64,
}

impl AppState {
    /// The emulator is always row 0; functions follow in configured order.
    pub fn new(
        project: impl Into<String>,
        emulator_name: &str,
        functions: &[(String, u16)],
    ) -> Self {
        let mut processes =
            vec![ProcessEntry::new(emulator_name, ProcessRole::Emulator, None)];
        processes.extend(
            functions
                .iter()
                .map(|(name, port)| ProcessEntry::new(name, ProcessRole::Function, Some(*port))),
        );

        Self {
            project: project.into(),
            processes,
            selected: 0,
            should_quit: false,
            status_message: None,
            log_offset: 0,
            revision: 0,
        }
    }

    pub fn processes(&self) -> &[ProcessEntry] {
        &self.processes
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_entry(&self) -> &ProcessEntry {
        &self.processes[self.selected]
    }

    /// Bumped on every snapshot-affecting change; the render loop redraws
    /// when it moves.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.processes.iter().position(|entry| entry.name == name)
    }

    pub fn apply_state(&mut self, name: &str, state: ProcessState) {
        if let Some(index) = self.index_of(name) {
            self.processes[index].state = state;
            self.touch();
        }
    }

    pub fn apply_log(&mut self, name: &str, line: String) {
        if let Some(index) = self.index_of(name) {
            self.processes[index].push_log(line);
            if index == self.selected {
                self.touch();
            }
        }
    }

    pub fn apply_port(&mut self, name: &str, port: u16) {
        if let Some(index) = self.index_of(name) {
            self.processes[index].port = Some(port);
            self.touch();
        }
    }

    /// Swap the active selection and reset the log view to the newly
    /// selected process's history.
    pub fn select(&mut self, index: usize) {
        if index < self.processes.len() && index != self.selected {
            self.selected = index;
            self.log_offset = 0;
            self.touch();
        }
    }

    pub fn select_previous(&mut self) {
        if self.selected > 0 {
            self.select(self.selected - 1);
        }
    }

    pub fn select_next(&mut self) {
        self.select(self.selected + 1);
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.touch();
    }

    // ─────────────────────────────────────────────────────────
    // Log view scrolling
    // ─────────────────────────────────────────────────────────

    pub fn scroll_up(&mut self, lines: usize) {
        let max = self.selected_entry().logs().len();
        self.log_offset = (self.log_offset + lines).min(max);
        self.touch();
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.log_offset = self.log_offset.saturating_sub(lines);
        self.touch();
    }

    pub fn scroll_to_top(&mut self) {
        self.log_offset = self.selected_entry().logs().len();
        self.touch();
    }

    pub fn scroll_to_bottom(&mut self) {
        self.log_offset = 0;
        self.touch();
    }

    /// Whether the log view is following new output.
    pub fn auto_scroll(&self) -> bool {
        self.log_offset == 0
    }
}
