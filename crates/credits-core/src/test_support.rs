// Scripted `WalletApi` fake shared by the consumer, poller and session tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::time::Instant;

use crate::api::{ApiError, EventStream, WalletApi};
use crate::protocol::Wallet;

/// What the next `open_stream` call does.
pub enum Open {
    /// The request fails before the stream opens.
    Fail,
    /// The stream yields these messages, then ends.
    Chunks(Vec<Result<String, ApiError>>),
    /// The stream yields these messages, then stays open until dropped.
    Hold(Vec<Result<String, ApiError>>),
}

pub fn unavailable() -> ApiError {
    ApiError::Status {
        endpoint: "/test".into(),
        status: 503,
    }
}

pub fn credits_event(balance: i64) -> String {
    format!(r#"{{"type":"credits","data":{{"balance":{balance}}}}}"#)
}

#[derive(Default)]
pub struct FakeApi {
    opens: Mutex<VecDeque<Open>>,
    wallets: Mutex<VecDeque<Result<Wallet, ApiError>>>,
    pub open_times: Mutex<Vec<Instant>>,
    pub fetch_count: AtomicUsize,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl FakeApi {
    pub fn new(opens: Vec<Open>, wallets: Vec<Result<Wallet, ApiError>>) -> Self {
        Self {
            opens: Mutex::new(opens.into()),
            wallets: Mutex::new(wallets.into()),
            ..Self::default()
        }
    }

    pub fn with_opens(opens: Vec<Open>) -> Self {
        Self {
            opens: Mutex::new(opens.into()),
            ..Self::default()
        }
    }

    pub fn with_wallets(wallets: Vec<Result<Wallet, ApiError>>) -> Self {
        Self {
            wallets: Mutex::new(wallets.into()),
            ..Self::default()
        }
    }

    pub fn open_count(&self) -> usize {
        self.open_times.lock().unwrap().len()
    }

    /// Gaps between consecutive `open_stream` calls.
    pub fn open_gaps(&self) -> Vec<std::time::Duration> {
        let times = self.open_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn active_streams(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_streams(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletApi for FakeApi {
    async fn fetch_wallet(&self) -> Result<Wallet, ApiError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.wallets
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unavailable()))
    }

    async fn open_stream(&self) -> Result<EventStream, ApiError> {
        self.open_times.lock().unwrap().push(Instant::now());
        let next = self.opens.lock().unwrap().pop_front().unwrap_or(Open::Fail);

        let (chunks, hold) = match next {
            Open::Fail => return Err(unavailable()),
            Open::Chunks(chunks) => (chunks, false),
            Open::Hold(chunks) => (chunks, true),
        };

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let guard = ActiveGuard(Arc::clone(&self.active));

        let body = stream::iter(chunks);
        let body: EventStream = if hold {
            Box::pin(body.chain(stream::pending()).map(move |item| {
                let _keep = &guard;
                item
            }))
        } else {
            Box::pin(body.map(move |item| {
                let _keep = &guard;
                item
            }))
        };
        Ok(body)
    }
}
