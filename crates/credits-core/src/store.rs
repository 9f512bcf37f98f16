// Shared balance store.
//
// One store per authenticated session, shared by `Arc` between the stream
// consumer, the baseline poller, and any number of display consumers. Writers
// go through `replace_wallet` / `set_balance`; readers take snapshots or
// subscribe to a `watch` channel that always holds the latest balance.

use tokio::sync::watch;
use tracing::debug;

use crate::protocol::Wallet;

/// Identifier the balance is cached under; used as log context.
pub const BALANCE_KEY: &str = "wallet-balance";

pub struct BalanceStore {
    balance: watch::Sender<Option<i64>>,
    wallet: watch::Sender<Option<Wallet>>,
}

impl Default for BalanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BalanceStore {
    pub fn new() -> Self {
        let (balance, _) = watch::channel(None);
        let (wallet, _) = watch::channel(None);
        Self { balance, wallet }
    }

    /// Latest known balance, if any source has reported one yet.
    pub fn balance(&self) -> Option<i64> {
        *self.balance.borrow()
    }

    /// Latest wallet snapshot from the baseline fetch, with the balance kept
    /// current by stream updates.
    pub fn wallet(&self) -> Option<Wallet> {
        self.wallet.borrow().clone()
    }

    /// Subscribe to balance changes. Receivers are woken only when the value
    /// actually changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<i64>> {
        self.balance.subscribe()
    }

    /// Replace the whole cached wallet (baseline fetch).
    pub fn replace_wallet(&self, wallet: Wallet) {
        let balance = wallet.balance;
        self.wallet.send_replace(Some(wallet));
        self.publish(balance, "poll");
    }

    /// Overwrite only the balance (stream event). Cached transactions are
    /// left as they are.
    pub fn set_balance(&self, balance: i64) {
        self.wallet.send_if_modified(|wallet| match wallet {
            Some(w) if w.balance != balance => {
                w.balance = balance;
                true
            }
            _ => false,
        });
        self.publish(balance, "stream");
    }

    fn publish(&self, balance: i64, source: &'static str) {
        let changed = self.balance.send_if_modified(|current| {
            if *current == Some(balance) {
                false
            } else {
                *current = Some(balance);
                true
            }
        });
        if changed {
            debug!(key = BALANCE_KEY, balance, source, "balance updated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Transaction;
    use chrono::{TimeZone, Utc};

    fn wallet_with_history(balance: i64) -> Wallet {
        Wallet {
            balance,
            transactions: vec![Transaction {
                id: "tx_1".into(),
                amount: balance,
                description: Some("Top-up".into()),
                created_at: Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap(),
            }],
        }
    }

    #[test]
    fn new_store_is_empty() {
        let store = BalanceStore::new();
        assert_eq!(store.balance(), None);
        assert!(store.wallet().is_none());
    }

    #[test]
    fn replace_wallet_sets_balance_and_history() {
        let store = BalanceStore::new();
        store.replace_wallet(wallet_with_history(50));
        assert_eq!(store.balance(), Some(50));
        assert_eq!(store.wallet().unwrap().transactions.len(), 1);
    }

    #[test]
    fn set_balance_keeps_transactions() {
        let store = BalanceStore::new();
        store.replace_wallet(wallet_with_history(50));
        store.set_balance(38);

        assert_eq!(store.balance(), Some(38));
        let wallet = store.wallet().unwrap();
        assert_eq!(wallet.balance, 38);
        assert_eq!(wallet.transactions, wallet_with_history(50).transactions);
    }

    #[test]
    fn set_balance_before_any_fetch() {
        let store = BalanceStore::new();
        store.set_balance(9);
        assert_eq!(store.balance(), Some(9));
        assert!(store.wallet().is_none());
    }

    #[tokio::test]
    async fn subscribers_see_latest_value() {
        let store = BalanceStore::new();
        let mut rx = store.subscribe();

        store.set_balance(5);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(5));

        store.set_balance(12);
        store.set_balance(7);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(7));
    }

    #[tokio::test]
    async fn unchanged_balance_does_not_wake_subscribers() {
        let store = BalanceStore::new();
        store.set_balance(5);
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        store.set_balance(5);
        assert!(!rx.has_changed().unwrap());

        store.replace_wallet(wallet_with_history(5));
        assert!(!rx.has_changed().unwrap());
    }
}
