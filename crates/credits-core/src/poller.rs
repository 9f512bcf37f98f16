// Baseline wallet poller.
//
// Runs alongside the stream consumer for the whole session. It seeds the
// store with the first wallet fetch and keeps it fresh when the stream is
// down or has given up.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::WalletApi;
use crate::store::BalanceStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Floor applied to the poll interval; a zero period cannot be scheduled.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Fetch the wallet immediately and then every `interval` until cancelled.
/// Fetch failures keep the last known value. Intervals below
/// `MIN_POLL_INTERVAL` are raised to it.
pub async fn run_poller(
    api: Arc<dyn WalletApi>,
    store: Arc<BalanceStore>,
    interval: Duration,
    cancel: CancellationToken,
) {
    if interval < MIN_POLL_INTERVAL {
        warn!(?interval, "poll interval too short, using {:?}", MIN_POLL_INTERVAL);
    }
    let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            fetched = api.fetch_wallet() => fetched,
        };

        match fetched {
            Ok(wallet) => {
                debug!(
                    balance = wallet.balance,
                    transactions = wallet.transactions.len(),
                    "wallet refreshed"
                );
                store.replace_wallet(wallet);
            }
            Err(e) => warn!("wallet refresh failed: {e}"),
        }
    }

    debug!("wallet poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Wallet;
    use crate::test_support::{unavailable, FakeApi};
    use std::sync::atomic::Ordering;

    fn wallet(balance: i64) -> Wallet {
        Wallet {
            balance,
            transactions: vec![],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_fetch_happens_immediately() {
        let api = Arc::new(FakeApi::with_wallets(vec![Ok(wallet(25))]));
        let store = Arc::new(BalanceStore::new());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_poller(
            api.clone(),
            Arc::clone(&store),
            Duration::from_secs(30),
            cancel.clone(),
        ));

        store.subscribe().wait_for(|b| *b == Some(25)).await.unwrap();
        assert_eq!(api.fetch_count.load(Ordering::SeqCst), 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_interval_and_keeps_value_on_failure() {
        let api = Arc::new(FakeApi::with_wallets(vec![
            Ok(wallet(10)),
            Err(unavailable()),
            Ok(wallet(4)),
        ]));
        let store = Arc::new(BalanceStore::new());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_poller(
            api.clone(),
            Arc::clone(&store),
            Duration::from_secs(30),
            cancel.clone(),
        ));

        store.subscribe().wait_for(|b| *b == Some(10)).await.unwrap();

        // Second tick: fetch fails, balance stays.
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(api.fetch_count.load(Ordering::SeqCst), 2);
        assert_eq!(store.balance(), Some(10));

        // Third tick picks up the new value.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.fetch_count.load(Ordering::SeqCst), 3);
        assert_eq!(store.balance(), Some(4));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let api = Arc::new(FakeApi::with_wallets(vec![Ok(wallet(1))]));
        let store = Arc::new(BalanceStore::new());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_poller(
            api.clone(),
            store,
            Duration::from_secs(5),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.fetch_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_still_polls() {
        let api = Arc::new(FakeApi::with_wallets(vec![Ok(wallet(8)), Ok(wallet(6))]));
        let store = Arc::new(BalanceStore::new());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_poller(
            api.clone(),
            Arc::clone(&store),
            Duration::ZERO,
            cancel.clone(),
        ));

        store.subscribe().wait_for(|b| *b == Some(6)).await.unwrap();
        assert!(api.fetch_count.load(Ordering::SeqCst) >= 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}
