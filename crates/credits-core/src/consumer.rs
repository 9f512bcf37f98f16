// Live balance stream consumer.
//
// Opens the balance event stream and writes every `credits` event into the
// shared store. When the stream drops it reconnects
// under the `ReconnectPolicy`; once the retry budget is spent it stops and
// leaves the baseline poller in charge.
//
// States: Idle -> Connecting -> Streaming -> Backoff(n) -> Connecting ...
// and any state -> Stopped on cancellation or exhaustion.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiError, EventStream, WalletApi};
use crate::backoff::ReconnectPolicy;
use crate::protocol::{parse_event, StreamEvent};
use crate::store::BalanceStore;

// ---------------------------------------------------------------------------
// Observable state
// ---------------------------------------------------------------------------

/// Why the consumer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit teardown.
    Cancelled,
    /// Every reconnect in the budget failed.
    RetriesExhausted,
}

/// Connection state of the balance stream, published on a `watch` channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Streaming,
    /// Waiting `delay` before reconnect number `attempt` (1-based).
    Backoff { attempt: u32, delay: Duration },
    Stopped(StopReason),
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamState::Idle => write!(f, "idle"),
            StreamState::Connecting => write!(f, "connecting"),
            StreamState::Streaming => write!(f, "live"),
            StreamState::Backoff { attempt, delay } => {
                write!(f, "reconnecting in {}ms (attempt {attempt})", delay.as_millis())
            }
            StreamState::Stopped(StopReason::Cancelled) => write!(f, "stopped"),
            StreamState::Stopped(StopReason::RetriesExhausted) => {
                write!(f, "disconnected (polling only)")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Event application
// ---------------------------------------------------------------------------

/// Apply one message payload to the store. Returns the new balance when the
/// payload was an actionable `credits` event; anything else is ignored.
pub fn apply_event(store: &BalanceStore, data: &str) -> Option<i64> {
    match parse_event(data) {
        Some(StreamEvent::Credits { balance }) => {
            store.set_balance(balance);
            Some(balance)
        }
        Some(StreamEvent::Other { kind }) => {
            debug!(kind = %kind, "ignoring stream event");
            None
        }
        None => {
            debug!("ignoring unparseable stream event");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Read loop
// ---------------------------------------------------------------------------

/// How a single connection ended.
#[derive(Debug)]
enum StreamEnd {
    Cancelled,
    Closed,
    Failed(ApiError),
}

/// Read one open stream to completion, applying events in arrival order.
async fn consume(mut messages: EventStream, store: &BalanceStore, cancel: &CancellationToken) -> StreamEnd {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamEnd::Cancelled,
            next = messages.next() => next,
        };

        match next {
            Some(Ok(data)) => {
                apply_event(store, &data);
            }
            Some(Err(e)) => return StreamEnd::Failed(e),
            None => return StreamEnd::Closed,
        }
    }
}

// ---------------------------------------------------------------------------
// Connection loop
// ---------------------------------------------------------------------------

/// Run the stream consumer until it is cancelled or runs out of retries.
///
/// Every suspension point (opening the request, each read, each backoff
/// sleep) races against `cancel`; observing cancellation ends the loop without
/// another reconnect. A successful open resets the attempt counter.
pub async fn run_stream(
    api: Arc<dyn WalletApi>,
    store: Arc<BalanceStore>,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
    state: Arc<watch::Sender<StreamState>>,
) -> StopReason {
    let mut attempt: u32 = 0;

    loop {
        state.send_replace(StreamState::Connecting);
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return stop(&state, StopReason::Cancelled),
            opened = api.open_stream() => opened,
        };

        match opened {
            Ok(messages) => {
                if attempt > 0 {
                    info!(after_attempts = attempt, "balance stream reconnected");
                } else {
                    info!("balance stream connected");
                }
                attempt = 0;
                state.send_replace(StreamState::Streaming);

                match consume(messages, &store, &cancel).await {
                    StreamEnd::Cancelled => return stop(&state, StopReason::Cancelled),
                    StreamEnd::Closed => info!("balance stream closed by server"),
                    StreamEnd::Failed(e) => warn!("balance stream failed: {e}"),
                }
            }
            Err(e) => warn!("failed to open balance stream: {e}"),
        }

        let Some(delay) = policy.delay_for(attempt) else {
            warn!(
                attempts = attempt,
                "balance stream retries exhausted, relying on periodic refresh"
            );
            return stop(&state, StopReason::RetriesExhausted);
        };
        attempt += 1;
        debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        state.send_replace(StreamState::Backoff { attempt, delay });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return stop(&state, StopReason::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

fn stop(state: &watch::Sender<StreamState>, reason: StopReason) -> StopReason {
    info!(?reason, "balance stream stopped");
    state.send_replace(StreamState::Stopped(reason));
    reason
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
