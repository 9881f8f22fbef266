//! Ledger input types: object ids and transactions

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use super::{LedgerdayError, Result};

/// 12-byte document id, rendered as 24 lowercase hex characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

impl ObjectId {
    /// Generate a fresh id: unix seconds, per-process random bytes, counter
    pub fn new() -> Self {
        let seconds = Utc::now().timestamp() as u32;
        let process = PROCESS_UNIQUE.get_or_init(|| {
            let mut bytes = [0u8; 5];
            rand::thread_rng().fill_bytes(&mut bytes);
            bytes
        });
        let counter = COUNTER
            .get_or_init(|| AtomicU32::new(rand::thread_rng().next_u32()))
            .fetch_add(1, Ordering::Relaxed);

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(process);
        // low 24 bits of the counter
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Coerce a raw document value into an id.
    ///
    /// Accepts a 24-char hex string or an extended-JSON `{"$oid": "..."}`
    /// object; anything else is not an object id.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => s.parse().ok(),
            serde_json::Value::Object(map) => map.get("$oid")?.as_str()?.parse().ok(),
            _ => None,
        }
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = LedgerdayError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 24 {
            return Err(LedgerdayError::Parse(format!(
                "object id must be 24 hex characters, got '{}'",
                s
            )));
        }
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| LedgerdayError::Parse(format!("invalid object id '{}': {}", s, e)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ObjectIdVisitor;

        impl de::Visitor<'_> for ObjectIdVisitor {
            type Value = ObjectId;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a 24-character hex object id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<ObjectId, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(ObjectIdVisitor)
    }
}

/// Transaction type as stored on the ledger row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionType {
    Income,
    Expense,
    Transfer,
    Other(String),
}

impl TransactionType {
    /// Summary entry type, or None for rows that never reach a summary
    pub fn entry_type(&self) -> Option<EntryType> {
        match self {
            TransactionType::Income => Some(EntryType::Income),
            TransactionType::Expense => Some(EntryType::Expense),
            TransactionType::Transfer | TransactionType::Other(_) => None,
        }
    }
}

impl From<String> for TransactionType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "income" => TransactionType::Income,
            "expense" => TransactionType::Expense,
            "transfer" => TransactionType::Transfer,
            _ => TransactionType::Other(s),
        }
    }
}

impl From<TransactionType> for String {
    fn from(t: TransactionType) -> Self {
        match t {
            TransactionType::Income => "income".into(),
            TransactionType::Expense => "expense".into(),
            TransactionType::Transfer => "transfer".into(),
            TransactionType::Other(s) => s,
        }
    }
}

/// The two transaction types a daily summary accounts for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Income,
    Expense,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::Income => f.write_str("income"),
            EntryType::Expense => f.write_str("expense"),
        }
    }
}

/// A ledger transaction as read from the transaction source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: f64,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub category_id: Option<ObjectId>,
    #[serde(default)]
    pub pocket_from_id: Option<ObjectId>,
    #[serde(default)]
    pub pocket_to_id: Option<ObjectId>,
    #[serde(default)]
    pub platform_from_id: Option<ObjectId>,
    #[serde(default)]
    pub platform_to_id: Option<ObjectId>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
