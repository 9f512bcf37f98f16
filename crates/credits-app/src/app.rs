// Watcher event loop.
//
// Owns the balance session for the configured account, forwards balance and
// connection changes to the display, and reacts to user commands.

use std::sync::Arc;

use credits_core::api::WalletApi;
use credits_core::consumer::StreamState;
use credits_core::session::{BalanceSession, SessionOptions};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Commands typed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    /// Drop the live stream and reconnect with a fresh retry budget.
    Reconnect,
    Quit,
}

/// Updates pushed to the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiUpdate {
    Balance(i64),
    Connection(StreamState),
}

/// Parse one line of user input. Unknown input yields `None`.
pub fn parse_command(line: &str) -> Option<UserCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "r" | "reconnect" => Some(UserCommand::Reconnect),
        "q" | "quit" | "exit" => Some(UserCommand::Quit),
        _ => None,
    }
}

/// Render an update as a single display line.
pub fn format_update(update: &UiUpdate) -> String {
    match update {
        UiUpdate::Balance(1) => "balance: 1 credit".to_string(),
        UiUpdate::Balance(n) => format!("balance: {n} credits"),
        UiUpdate::Connection(state) => format!("live updates: {state}"),
    }
}

/// Run the watcher until a `Quit` command arrives or the command channel
/// closes. The session is deactivated before returning.
pub async fn run(
    api: Arc<dyn WalletApi>,
    options: SessionOptions,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
) -> anyhow::Result<()> {
    let mut session = BalanceSession::new(options);
    let mut balance_rx = session.store().subscribe();
    let mut state_rx = session.state();

    session.activate(api).await;
    info!("Watcher event loop started");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Reconnect) => {
                        info!("Manual reconnect requested");
                        session.reconnect().await;
                    }
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }

            changed = balance_rx.changed() => {
                if changed.is_err() {
                    warn!("Balance store closed");
                    break;
                }
                let balance = *balance_rx.borrow_and_update();
                if let Some(balance) = balance {
                    if ui_tx.send(UiUpdate::Balance(balance)).await.is_err() {
                        break;
                    }
                }
            }

            changed = state_rx.changed() => {
                if changed.is_err() {
                    warn!("Stream state channel closed");
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                if ui_tx.send(UiUpdate::Connection(state)).await.is_err() {
                    break;
                }
            }
        }
    }

    session.deactivate().await;
    info!("Watcher event loop exiting");
    Ok(())
}
