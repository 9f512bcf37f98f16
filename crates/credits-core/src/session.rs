// Per-session supervisor for the balance stream and the baseline poller.
//
// Holds at most one live stream task. Activating, reconnecting, or
// deactivating always cancels and awaits the previous task first, so the old
// response body is dropped before a new request goes out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::WalletApi;
use crate::backoff::ReconnectPolicy;
use crate::consumer::{run_stream, StopReason, StreamState};
use crate::poller::{run_poller, DEFAULT_POLL_INTERVAL};
use crate::store::BalanceStore;

/// Tunables for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub reconnect: ReconnectPolicy,
    pub poll_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

struct StreamTask {
    cancel: CancellationToken,
    handle: JoinHandle<StopReason>,
}

struct ActiveSession {
    api: Arc<dyn WalletApi>,
    /// Parent of the stream token; cancelling it stops everything.
    cancel: CancellationToken,
    stream: StreamTask,
    poller: JoinHandle<()>,
}

/// Live balance for one authenticated session.
pub struct BalanceSession {
    options: SessionOptions,
    store: Arc<BalanceStore>,
    state: Arc<watch::Sender<StreamState>>,
    active: Option<ActiveSession>,
}

impl BalanceSession {
    pub fn new(options: SessionOptions) -> Self {
        let (state, _) = watch::channel(StreamState::Idle);
        Self {
            options,
            store: Arc::new(BalanceStore::new()),
            state: Arc::new(state),
            active: None,
        }
    }

    /// The store every display consumer reads from. Survives reactivation.
    pub fn store(&self) -> Arc<BalanceStore> {
        Arc::clone(&self.store)
    }

    /// Subscribe to stream connection state.
    pub fn state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Start the stream consumer and the poller against `api`, replacing any
    /// running session.
    pub async fn activate(&mut self, api: Arc<dyn WalletApi>) {
        self.deactivate().await;

        let cancel = CancellationToken::new();
        let poller = tokio::spawn(run_poller(
            Arc::clone(&api),
            Arc::clone(&self.store),
            self.options.poll_interval,
            cancel.clone(),
        ));
        let stream = self.spawn_stream(&api, &cancel);

        info!("balance session activated");
        self.active = Some(ActiveSession {
            api,
            cancel,
            stream,
            poller,
        });
    }

    /// Drop the current stream and open a fresh one with a clean retry
    /// budget. The poller keeps running. Returns `false` when no session is
    /// active.
    pub async fn reconnect(&mut self) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };

        active.stream.cancel.cancel();
        if let Err(e) = (&mut active.stream.handle).await {
            warn!("balance stream task failed: {e}");
        }
        // Overwrite the old task's `Stopped` before anyone observes it.
        self.state.send_replace(StreamState::Connecting);

        let api = Arc::clone(&active.api);
        let parent = active.cancel.clone();
        let stream = self.spawn_stream(&api, &parent);
        if let Some(active) = self.active.as_mut() {
            active.stream = stream;
        }
        debug!("balance stream restarted");
        true
    }

    /// Tear down the session: cancel the in-flight request, any pending
    /// reconnect timer, and the poller, and wait for them to finish.
    pub async fn deactivate(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        active.cancel.cancel();
        if let Err(e) = active.stream.handle.await {
            warn!("balance stream task failed: {e}");
        }
        if let Err(e) = active.poller.await {
            warn!("wallet poller task failed: {e}");
        }
        self.state
            .send_replace(StreamState::Stopped(StopReason::Cancelled));
        info!("balance session deactivated");
    }

    fn spawn_stream(&self, api: &Arc<dyn WalletApi>, parent: &CancellationToken) -> StreamTask {
        let cancel = parent.child_token();
        let handle = tokio::spawn(run_stream(
            Arc::clone(api),
            Arc::clone(&self.store),
            self.options.reconnect,
            cancel.clone(),
            Arc::clone(&self.state),
        ));
        StreamTask { cancel, handle }
    }
}

impl Drop for BalanceSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            active.stream.handle.abort();
            active.poller.abort();
        }
    }
}
