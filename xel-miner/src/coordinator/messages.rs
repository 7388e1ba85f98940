//! Coordinator request and response types.
//!
//! Requests are sent as `POST {url}?requestType=...` with a form-encoded
//! body. Field names and fixed fee/amount/deadline values follow the
//! coordinator's HTTP API. Responses are JSON objects; any of them may carry
//! an `errorDescription`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::types::Target;

/// Substring identifying an "already submitted" error.
pub const DUPLICATE_TRANSACTION: &str = "Duplicate unconfirmed transaction:";

/// Requests the miner sends to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Fetch the list of mineable work packages.
    GetMineableWork,

    /// Block until the coordinator has an event to report.
    LongPoll,

    /// Announce the hash of a bounty solution.
    BountyAnnouncement {
        work_id: u64,
        hash_announcement: String,
    },

    /// Ask whether an announcement has been approved.
    GetApprovedBounties {
        work_id: u64,
        hash_announcement: String,
    },

    /// Claim a bounty or submit a proof of work.
    CreatePox {
        work_id: u64,
        multiplicator: String,
        is_pow: bool,
    },
}

impl Request {
    /// Value of the `requestType` query parameter.
    pub fn request_type(&self) -> &'static str {
        match self {
            Request::GetMineableWork => "getMineableWork",
            Request::LongPoll => "longpoll",
            Request::BountyAnnouncement { .. } => "bountyAnnouncement",
            Request::GetApprovedBounties { .. } => "getApprovedBounties",
            Request::CreatePox { .. } => "createPoX",
        }
    }

    /// Whether the request is signed with the account's secret phrase.
    pub fn is_signed(&self) -> bool {
        !matches!(self, Request::GetMineableWork | Request::LongPoll)
    }

    /// Form body, without the secret phrase.
    pub fn form(&self) -> Vec<(&'static str, String)> {
        match self {
            Request::GetMineableWork => vec![("n", "1".to_string())],
            Request::LongPoll => vec![("randomId", "1".to_string())],
            Request::BountyAnnouncement {
                work_id,
                hash_announcement,
            } => vec![
                ("deadline", "3".to_string()),
                ("feeNQT", "0".to_string()),
                ("amountNQT", "5000".to_string()),
                ("work_id", work_id.to_string()),
                ("hash_announcement", hash_announcement.clone()),
            ],
            Request::GetApprovedBounties {
                work_id,
                hash_announcement,
            } => vec![
                ("work_id", work_id.to_string()),
                ("hash_announcement", hash_announcement.clone()),
            ],
            Request::CreatePox {
                work_id,
                multiplicator,
                is_pow,
            } => vec![
                ("deadline", "3".to_string()),
                ("feeNQT", "0".to_string()),
                ("amountNQT", "0".to_string()),
                ("work_id", work_id.to_string()),
                ("multiplicator", multiplicator.clone()),
                ("is_pow", is_pow.to_string()),
            ],
        }
    }

    /// Form body rendered for logs, secret phrase masked.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self
            .form()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        if self.is_signed() {
            parts.push("secretPhrase=***".to_string());
        }
        format!("requestType={}&{}", self.request_type(), parts.join("&"))
    }
}

/// Response to [`Request::GetMineableWork`].
#[derive(Debug, Clone, Deserialize)]
pub struct MineableWork {
    pub work_packages: Vec<PackageDescriptor>,
}

/// One work package as offered by the coordinator.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageDescriptor {
    #[serde(deserialize_with = "de::u64_lenient")]
    pub work_id: u64,

    #[serde(deserialize_with = "de::u64_lenient")]
    pub block_id: u64,

    #[serde(default)]
    pub title: String,

    #[serde(deserialize_with = "de::target")]
    pub target: Target,

    #[serde(default)]
    pub source: String,

    #[serde(default, deserialize_with = "de::u32_lenient")]
    pub bounty_limit: u32,

    #[serde(default, deserialize_with = "de::u64_lenient")]
    pub xel_per_bounty: u64,

    #[serde(default, deserialize_with = "de::u64_lenient")]
    pub xel_per_pow: u64,

    #[serde(default, deserialize_with = "de::u32_lenient")]
    pub received_bounties: u32,
}

/// Response to [`Request::LongPoll`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LongPollEvent {
    #[serde(default)]
    pub event: Option<EventField>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EventField {
    One(String),
    Many(Vec<String>),
}

impl LongPollEvent {
    fn values(&self) -> Vec<&str> {
        match &self.event {
            Some(EventField::One(s)) => vec![s.as_str()],
            Some(EventField::Many(v)) => v.iter().map(String::as_str).collect(),
            None => Vec::new(),
        }
    }

    /// The coordinator had nothing to report before its own deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(&self.event, Some(EventField::One(s)) if s == "timeout")
    }

    /// Any event value mentions a block.
    pub fn is_new_block(&self) -> bool {
        self.values().iter().any(|v| v.contains("block"))
    }
}

/// Answer to a `getApprovedBounties` poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    Approved,
    Deprecated,
    Pending,
}

/// Response to submission requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitResponse {
    #[serde(default, rename = "errorDescription")]
    pub error_description: Option<String>,

    #[serde(default)]
    pub approved: Option<Value>,
}

impl SubmitResponse {
    pub fn is_duplicate(&self) -> bool {
        self.error_description
            .as_deref()
            .is_some_and(|e| e.contains(DUPLICATE_TRANSACTION))
    }

    pub fn approval(&self) -> Approval {
        match &self.approved {
            Some(Value::String(s)) if s == "true" => Approval::Approved,
            Some(Value::Bool(true)) => Approval::Approved,
            Some(Value::String(s)) if s == "deprecated" => Approval::Deprecated,
            _ => Approval::Pending,
        }
    }
}

/// Deserializers for the coordinator's loosely typed fields.
///
/// Identifiers arrive as decimal strings, amounts as JSON numbers that may
/// carry a fraction; both forms are accepted for every numeric field.
mod de {
    use super::*;
    use serde::de::Error;

    pub fn u64_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        match Value::deserialize(d)? {
            Value::String(s) => s.trim().parse().map_err(D::Error::custom),
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .ok_or_else(|| D::Error::custom(format!("invalid number {}", n))),
            Value::Null => Ok(0),
            other => Err(D::Error::custom(format!("expected number, got {}", other))),
        }
    }

    pub fn u32_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        let value = u64_lenient(d)?;
        u32::try_from(value).map_err(D::Error::custom)
    }

    pub fn target<'de, D: Deserializer<'de>>(d: D) -> Result<Target, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(D::Error::custom)
    }
}
