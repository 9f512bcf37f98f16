// Credits watcher entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file; stdout shows the balance)
// 2. Load config
// 3. Require a session token
// 4. Create mpsc channels
// 5. Spawn stdin command reader and Ctrl+C handler
// 6. Spawn display task
// 7. Run the watcher loop until quit
// 8. Cleanup on exit

use std::io::BufRead;
use std::sync::Arc;

use anyhow::Context;
use credits_app::app::{self, UiUpdate, UserCommand};
use credits_app::config;
use credits_core::api::HttpWalletApi;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    let log_path = init_tracing()?;
    info!("Credits watcher starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: base_url={}, poll every {}s, up to {} reconnects",
        config.api.base_url, config.poll.interval_secs, config.reconnect.max_attempts
    );

    // 3. The stream only runs for an authenticated session.
    let Some(token) = config.session_token() else {
        warn!("No session token configured");
        anyhow::bail!("no session token configured; set session_token in config/credentials.toml");
    };
    let api = HttpWalletApi::new(config.api.base_url.clone(), token)
        .with_paths(config.api.wallet_path.clone(), config.api.stream_path.clone());

    // 4. Channels
    let (cmd_tx, cmd_rx) = mpsc::channel::<UserCommand>(16);
    let (ui_tx, mut ui_rx) = mpsc::channel::<UiUpdate>(64);

    // 5. Input: typed commands and Ctrl+C both feed the command channel.
    // Stdin is read on a plain thread so a pending read never holds up
    // runtime shutdown.
    let stdin_tx = cmd_tx.clone();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match app::parse_command(&line) {
                Some(cmd) => {
                    if stdin_tx.blocking_send(cmd).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => println!("commands: r (reconnect), q (quit)"),
            }
        }
    });
    let ctrl_c_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cmd_tx.send(UserCommand::Quit).await;
        }
    });

    // 6. Display
    let display_handle = tokio::spawn(async move {
        while let Some(update) = ui_rx.recv().await {
            println!("{}", app::format_update(&update));
        }
    });

    println!(
        "watching credits at {} (logs: {})",
        config.api.base_url,
        log_path.display()
    );

    // 7. Watcher loop
    let result = app::run(Arc::new(api), config.session_options(), cmd_rx, ui_tx).await;

    // 8. Cleanup. The display task drains once `run` drops its sender.
    let _ = tokio::time::timeout(std::time::Duration::from_secs(2), display_handle).await;
    ctrl_c_handle.abort();

    info!("Credits watcher shut down cleanly");
    result
}

/// Initialize tracing to a log file under the platform data directory,
/// falling back to `./logs`. Returns the log file path.
fn init_tracing() -> anyhow::Result<std::path::PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = match directories::ProjectDirs::from("", "", "credits-watch") {
        Some(dirs) => dirs.data_local_dir().join("logs"),
        None => std::env::current_dir()?.join("logs"),
    };
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let log_path = log_dir.join("credits-watch.log");
    let log_file = std::fs::File::create(&log_path)?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("credits_core=info,credits_app=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(log_path)
}
