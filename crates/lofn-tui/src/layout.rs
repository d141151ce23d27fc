//! Screen layout

use ratatui::layout::{Constraint, Layout, Rect};

/// The three regions of the screen, top to bottom.
pub struct ScreenChunks {
    pub table: Rect,
    pub log: Rect,
    pub status: Rect,
}

/// Split the frame: process table sized to its rows, log view takes the
/// rest, one status line at the bottom.
pub fn chunks(area: Rect, process_count: usize) -> ScreenChunks {
    // Rows + header + borders
    let table_height = process_count as u16 + 4;
    let regions = Layout::vertical([
        Constraint::Length(table_height),
        Constraint::Min(5),
        Constraint::Length(1),
    ])
    .split(area);

    ScreenChunks {
        table: regions[0],
        log: regions[1],
        status: regions[2],
    }
}
