//! Process table widget
//!
//! One row per managed process: name, lifecycle state, port (or a
//! placeholder until resolved). The emulator is always the first row.

use lofn_app::state::AppState;
use lofn_core::ProcessState;
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Row, Table, Widget},
};

pub struct ProcessTable<'a> {
    state: &'a AppState,
}

impl<'a> ProcessTable<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }
}

/// Color a lifecycle state for the table.
fn state_style(state: ProcessState) -> Style {
    let color = match state {
        ProcessState::Stopped => Color::DarkGray,
        ProcessState::Starting | ProcessState::Stopping => Color::Yellow,
        ProcessState::Running => Color::Green,
        ProcessState::Errored => Color::Red,
    };
    Style::default().fg(color)
}

impl Widget for ProcessTable<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let selected = self.state.selected_index();

        let rows = self.state.processes().iter().enumerate().map(|(index, entry)| {
            let row = Row::new(vec![
                entry.name.clone(),
                entry.state.label().to_string(),
                entry.port_display(),
            ])
            .style(state_style(entry.state));

            if index == selected {
                row.style(state_style(entry.state).add_modifier(Modifier::REVERSED))
            } else {
                row
            }
        });

        let widths = [
            Constraint::Length(24),
            Constraint::Length(10),
            Constraint::Length(6),
        ];

        let table = Table::new(rows, widths)
            .header(
                Row::new(vec!["Process", "State", "Port"])
                    .style(Style::default().add_modifier(Modifier::BOLD))
                    .bottom_margin(1),
            )
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Active Processes "),
            );

        table.render(area, buf);
    }
}
