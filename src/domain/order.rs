//! Order records as they arrive on the stream and as they are cached.
//!
//! Every field carries `#[serde(default)]` semantics: a field missing from the
//! payload decodes to its zero value and is reported later by validation. Only
//! syntactically malformed payloads fail to decode.

use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::DomainError;

/// Unix timestamp of `0001-01-01T00:00:00Z`, the zero instant used by upstream producers.
const ZERO_INSTANT_UNIX: i64 = -62_135_596_800;

/// Globally unique order identifier; the cache key and the store primary key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderUid(String);

impl OrderUid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<String> for OrderUid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for OrderUid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for OrderUid {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Order {
    #[serde(rename = "order_uid")]
    pub uid: OrderUid,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    #[serde(rename = "shardkey")]
    pub shard_key: String,
    pub sm_id: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub date_created: Option<OffsetDateTime>,
    pub oof_shard: String,
}

impl Order {
    /// Decode an order from a raw stream payload.
    pub fn decode(payload: &[u8]) -> Result<Self, DomainError> {
        serde_json::from_slice(payload).map_err(DomainError::from)
    }

    /// Returns true when `date_created` carries a real instant.
    pub fn has_creation_time(&self) -> bool {
        self.date_created
            .is_some_and(|created| created.unix_timestamp() > ZERO_INSTANT_UNIX)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// Unix seconds.
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i64,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i64,
}
