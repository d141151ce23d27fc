//! TEA update function and key handling

use crate::input_key::InputKey;
use crate::message::Message;
use crate::state::AppState;

use lofn_core::prelude::*;

/// Lines moved by a page scroll
const PAGE_SIZE: usize = 10;

/// Result of processing one message
#[derive(Debug, Default)]
pub struct UpdateResult {
    /// Follow-up message to process immediately
    pub message: Option<Message>,
}

impl UpdateResult {
    fn none() -> Self {
        Self::default()
    }

    fn message(message: Message) -> Self {
        Self {
            message: Some(message),
        }
    }
}

/// Process a message, mutating state. Pure with respect to the outside
/// world: no IO, no process control.
pub fn update(state: &mut AppState, message: Message) -> UpdateResult {
    match message {
        Message::Key(key) => handle_key(state, key),

        Message::ProcessState { name, state: next } => {
            state.apply_state(&name, next);
            UpdateResult::none()
        }

        Message::ProcessLog { name, line } => {
            state.apply_log(&name, line);
            UpdateResult::none()
        }

        Message::ProcessPort { name, port } => {
            state.apply_port(&name, port);
            UpdateResult::none()
        }

        Message::SubscriptionsReconciled { count } => {
            if count > 0 {
                state.note(format!("{count} push subscription(s) provisioned"));
            }
            UpdateResult::none()
        }

        Message::SessionError { message, fatal } => {
            warn!("session error (fatal: {}): {}", fatal, message);
            state.note(message);
            if fatal {
                UpdateResult::message(Message::Quit)
            } else {
                UpdateResult::none()
            }
        }

        Message::Tick => UpdateResult::none(),

        Message::Quit => {
            state.should_quit = true;
            UpdateResult::none()
        }
    }
}

fn handle_key(state: &mut AppState, key: InputKey) -> UpdateResult {
    match key {
        InputKey::Char('q') | InputKey::Esc | InputKey::CharCtrl('c') => {
            UpdateResult::message(Message::Quit)
        }

        InputKey::Up | InputKey::Char('k') => {
            state.select_previous();
            UpdateResult::none()
        }
        InputKey::Down | InputKey::Char('j') => {
            state.select_next();
            UpdateResult::none()
        }

        InputKey::PageUp => {
            state.scroll_up(PAGE_SIZE);
            UpdateResult::none()
        }
        InputKey::PageDown => {
            state.scroll_down(PAGE_SIZE);
            UpdateResult::none()
        }
        InputKey::Home => {
            state.scroll_to_top();
            UpdateResult::none()
        }
        InputKey::End => {
            state.scroll_to_bottom();
            UpdateResult::none()
        }

        _ => UpdateResult::none(),
    }
}
