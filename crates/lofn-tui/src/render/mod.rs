//! Frame composition

use ratatui::Frame;

use lofn_app::state::AppState;

use crate::layout;
use crate::widgets::{LogView, ProcessTable, StatusBar};

/// Draw the whole screen from the current state.
pub fn view(frame: &mut Frame, state: &AppState) {
    let chunks = layout::chunks(frame.area(), state.processes().len());

    frame.render_widget(ProcessTable::new(state), chunks.table);
    frame.render_widget(LogView::new(state), chunks.log);
    frame.render_widget(StatusBar::new(state), chunks.status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use lofn_core::ProcessState;
    use ratatui::{backend::TestBackend, Terminal};

    fn state() -> AppState {
        AppState::new(
            "demo",
            "PubSub Emulator",
            &[("a".to_string(), 8080), ("b".to_string(), 8081)],
        )
    }

    fn render_to_text(state: &AppState) -> String {
        let backend = TestBackend::new(80, 24);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|frame| view(frame, state)).unwrap();

        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                if let Some(cell) = buffer.cell((x, y)) {
                    text.push_str(cell.symbol());
                }
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_view_renders_table_headers_and_rows() {
        let text = render_to_text(&state());
        assert!(text.contains("Active Processes"));
        assert!(text.contains("Process"));
        assert!(text.contains("State"));
        assert!(text.contains("Port"));
        assert!(text.contains("PubSub Emulator"));
        assert!(text.contains("a"));
        assert!(text.contains("b"));
    }

    #[test]
    fn test_view_shows_port_placeholder_and_assigned_ports() {
        let text = render_to_text(&state());
        assert!(text.contains("----"), "emulator port placeholder");
        assert!(text.contains("8080"));
        assert!(text.contains("8081"));
    }

    #[test]
    fn test_view_reflects_state_changes() {
        let mut state = state();
        state.apply_state("a", ProcessState::Starting);
        state.apply_state("PubSub Emulator", ProcessState::Starting);
        state.apply_state("PubSub Emulator", ProcessState::Running);
        state.apply_port("PubSub Emulator", 8085);

        let text = render_to_text(&state);
        assert!(text.contains("running"));
        assert!(text.contains("starting"));
        assert!(text.contains("8085"));
    }

    #[test]
    fn test_view_shows_selected_process_log() {
        let mut state = state();
        state.apply_log("PubSub Emulator", "[pubsub] server booting".to_string());
        let text = render_to_text(&state);
        assert!(text.contains("PubSub Emulator Log"));
        assert!(text.contains("server booting"));

        state.select(1);
        state.apply_log("a", "function output".to_string());
        let text = render_to_text(&state);
        assert!(text.contains("a Log"));
        assert!(text.contains("function output"));
        assert!(!text.contains("server booting"), "log view swapped on select");
    }

    #[test]
    fn test_view_shows_status_message() {
        let mut state = state();
        state.note("fn-a: exited before ready");
        let text = render_to_text(&state);
        assert!(text.contains("exited before ready"));
    }
}
