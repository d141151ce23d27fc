//! Log view widget
//!
//! Shows the selected process's retained log history, following new output
//! unless the user has scrolled up.

use lofn_app::state::AppState;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph, Widget},
};

pub struct LogView<'a> {
    state: &'a AppState,
}

impl<'a> LogView<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }
}

impl Widget for LogView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let entry = self.state.selected_entry();
        let logs = entry.logs();

        let height = area.height.saturating_sub(2) as usize;
        let total = logs.len();
        let offset = self.state.log_offset.min(total);
        let end = total - offset;
        let start = end.saturating_sub(height);

        let lines: Vec<Line> = logs
            .iter()
            .skip(start)
            .take(end - start)
            .map(|line| Line::raw(line.as_str()))
            .collect();

        let title = format!(" {} Log ", entry.name);
        let mut block = Block::default().borders(Borders::ALL).title(title);
        if !self.state.auto_scroll() {
            block = block.title_bottom(
                Line::styled(" scrolled ", Style::default().fg(Color::Yellow)).right_aligned(),
            );
        }

        Paragraph::new(lines).block(block).render(area, buf);
    }
}
