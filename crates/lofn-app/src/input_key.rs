//! Terminal-agnostic input keys
//!
//! The TUI layer converts crossterm key events into these before they enter
//! the update loop, so handlers stay free of terminal dependencies.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKey {
    Char(char),
    CharCtrl(char),
    Enter,
    Esc,
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,
}
