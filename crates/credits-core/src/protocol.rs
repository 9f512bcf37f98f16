// Wire types for the wallet endpoints and the balance event stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Wallet snapshot (GET wallet endpoint)
// ---------------------------------------------------------------------------

/// Response body of the baseline wallet fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub balance: i64,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// A single credit ledger entry. Positive amounts are purchases or grants,
/// negative amounts are usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Stream events
// ---------------------------------------------------------------------------

/// Discriminator of the only actionable stream event.
pub const CREDITS_EVENT: &str = "credits";

/// A decoded stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A `credits` event carrying the new balance.
    Credits { balance: i64 },
    /// Any other well-formed event; carries its `type` for logging.
    Other { kind: String },
}

/// Parse the JSON payload of one `data:` frame.
///
/// Expected shape: `{ "type": "credits", "data": { "balance": N } }`
///
/// Returns `None` for malformed JSON, a missing `type`, or a `credits` event
/// whose `data.balance` is missing or not an integral number. Callers treat
/// `None` as "ignore this frame".
pub fn parse_event(data: &str) -> Option<StreamEvent> {
    let v: Value = serde_json::from_str(data).ok()?;
    let kind = v.get("type")?.as_str()?;
    if kind != CREDITS_EVENT {
        return Some(StreamEvent::Other {
            kind: kind.to_string(),
        });
    }
    let balance = as_balance(v.get("data")?.get("balance")?)?;
    Some(StreamEvent::Credits { balance })
}

/// Accept JSON integers, and floats only when they hold a whole number
/// within `i64` range.
fn as_balance(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    let f = v.as_f64()?;
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}
