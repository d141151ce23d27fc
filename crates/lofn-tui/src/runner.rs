//! Main TUI runner - entry point and event loop

use tokio::sync::mpsc;

use lofn_app::handler;
use lofn_app::message::Message;
use lofn_app::state::AppState;
use lofn_core::prelude::*;

use crate::{event, render, terminal};

/// Run the TUI until the state says quit.
///
/// Takes over the terminal and restores it on exit (and on panic, via the
/// panic hook). Blocking is fine here: the event poll has a 50ms timeout and
/// session tasks run on other runtime workers.
pub async fn run(state: &mut AppState, mut msg_rx: mpsc::Receiver<Message>) -> Result<()> {
    terminal::install_panic_hook();
    let mut term = ratatui::init();

    let result = run_loop(&mut term, state, &mut msg_rx);

    ratatui::restore();
    result
}

/// Main event loop: drain session messages, redraw, poll input.
fn run_loop(
    terminal: &mut ratatui::DefaultTerminal,
    state: &mut AppState,
    msg_rx: &mut mpsc::Receiver<Message>,
) -> Result<()> {
    while !state.should_quit {
        // Process session messages (from forwarders, orchestrator, signals)
        while let Ok(message) = msg_rx.try_recv() {
            process_message(state, message);
        }

        // Redraw; ratatui diffs against the previous frame, so an unchanged
        // snapshot costs nothing and resizes are always handled.
        terminal.draw(|frame| render::view(frame, state))?;

        // Handle terminal events (Tick on timeout keeps the loop going)
        if let Some(message) = event::poll()? {
            process_message(state, message);
        }
    }

    Ok(())
}

/// Run a message and any follow-ups it produces to completion.
fn process_message(state: &mut AppState, message: Message) {
    let mut next = Some(message);
    while let Some(message) = next {
        next = handler::update(state, message).message;
    }
}
