// Library root for the live wallet balance client: the wallet API and its
// event stream, reconnect policy, the shared balance store, and the session
// that ties the stream consumer and the baseline poller together.

pub mod api;
pub mod backoff;
pub mod consumer;
pub mod poller;
pub mod protocol;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;
