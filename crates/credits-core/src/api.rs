// Wallet HTTP endpoints: the baseline wallet fetch and the balance event
// stream.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{future, Stream, StreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest_eventsource::retry::Never;
use reqwest_eventsource::{Event, RequestBuilderExt};
use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::Wallet;

pub const DEFAULT_WALLET_PATH: &str = "/api/wallet";
pub const DEFAULT_STREAM_PATH: &str = "/api/wallet/balance/stream";

const EVENT_STREAM: &str = "text/event-stream";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("event stream error: {0}")]
    EventStream(String),
}

/// An open event stream: the `data` payload of each message, in arrival
/// order. Ends when the server closes the connection.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<String, ApiError>> + Send>>;

// ---------------------------------------------------------------------------
// WalletApi
// ---------------------------------------------------------------------------

/// The two wallet operations the balance client depends on.
#[async_trait]
pub trait WalletApi: Send + Sync {
    /// Fetch the full wallet snapshot.
    async fn fetch_wallet(&self) -> Result<Wallet, ApiError>;

    /// Open the balance event stream. Resolves once the connection is open,
    /// before any message arrives.
    async fn open_stream(&self) -> Result<EventStream, ApiError>;
}

/// `reqwest`-backed client authenticated with a session bearer token.
pub struct HttpWalletApi {
    http: reqwest::Client,
    base_url: String,
    wallet_path: String,
    stream_path: String,
    session_token: String,
}

impl HttpWalletApi {
    /// Create a client using the default endpoint paths.
    pub fn new(base_url: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            wallet_path: DEFAULT_WALLET_PATH.to_string(),
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            session_token: session_token.into(),
        }
    }

    /// Override the wallet and stream endpoint paths.
    pub fn with_paths(mut self, wallet_path: impl Into<String>, stream_path: impl Into<String>) -> Self {
        self.wallet_path = wallet_path.into();
        self.stream_path = stream_path.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(self.url(path))
            .header(AUTHORIZATION, format!("Bearer {}", self.session_token))
    }
}

#[async_trait]
impl WalletApi for HttpWalletApi {
    async fn fetch_wallet(&self) -> Result<Wallet, ApiError> {
        let response = self.get(&self.wallet_path).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: self.wallet_path.clone(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn open_stream(&self) -> Result<EventStream, ApiError> {
        let mut source = self
            .get(&self.stream_path)
            .header(ACCEPT, EVENT_STREAM)
            .eventsource()
            .map_err(|e| ApiError::EventStream(e.to_string()))?;
        // Reconnects are scheduled by the consumer, never by the source.
        source.set_retry_policy(Box::new(Never));

        match source.next().await {
            Some(Ok(Event::Open)) => {
                debug!(path = %self.stream_path, "balance stream opened");
            }
            Some(Ok(Event::Message(_))) => {
                source.close();
                return Err(ApiError::EventStream("message before open".into()));
            }
            Some(Err(err)) => {
                source.close();
                return Err(stream_error(&self.stream_path, err));
            }
            None => return Err(ApiError::EventStream("closed before open".into())),
        }

        let endpoint = self.stream_path.clone();
        let messages = source.filter_map(move |event| {
            future::ready(match event {
                Ok(Event::Message(msg)) => Some(Ok(msg.data)),
                Ok(Event::Open) => None,
                Err(reqwest_eventsource::Error::StreamEnded) => None,
                Err(err) => Some(Err(stream_error(&endpoint, err))),
            })
        });
        Ok(Box::pin(messages))
    }
}

fn stream_error(endpoint: &str, err: reqwest_eventsource::Error) -> ApiError {
    match err {
        reqwest_eventsource::Error::Transport(e) => ApiError::Transport(e),
        reqwest_eventsource::Error::InvalidStatusCode(status, _) => ApiError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        },
        other => {
            warn!(?other, "balance stream protocol error");
            ApiError::EventStream(other.to_string())
        }
    }
}
