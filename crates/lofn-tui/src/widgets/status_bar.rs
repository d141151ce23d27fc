//! Status bar widget
//!
//! Project name, key hints, and the latest session note (errors included).

use lofn_app::state::AppState;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};

pub struct StatusBar<'a> {
    state: &'a AppState,
}

impl<'a> StatusBar<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let mut spans = vec![
            Span::styled(
                format!(" {} ", self.state.project),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                " ↑/↓ select · PgUp/PgDn scroll · q quit ",
                Style::default().fg(Color::DarkGray),
            ),
        ];

        if let Some(message) = &self.state.status_message {
            spans.push(Span::styled(
                format!(" {message} "),
                Style::default().fg(Color::Yellow),
            ));
        }

        Paragraph::new(Line::from(spans)).render(area, buf);
    }
}
