use serde::{Deserialize, Serialize};

use crate::error::ObserverError;
use crate::record::{AcknowledgedMessage, CommittedMessage, ConsumedMessage, PublishedMessage};

// ════════════════════════════════════════════════════════════════
//  Bridge requests
// ════════════════════════════════════════════════════════════════

/// One unary bridge call. Each frame on the wire carries exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "body", rename_all = "snake_case")]
pub enum BridgeRequest {
    HealthCheck,
    OnPublished(PublishedMessage),
    OnConsumed(ConsumedMessage),
    OnCommitted(CommittedMessage),
    OnAcknowledged(AcknowledgedMessage),
}

impl BridgeRequest {
    pub fn method(&self) -> &'static str {
        match self {
            BridgeRequest::HealthCheck => "health_check",
            BridgeRequest::OnPublished(_) => "on_published",
            BridgeRequest::OnConsumed(_) => "on_consumed",
            BridgeRequest::OnCommitted(_) => "on_committed",
            BridgeRequest::OnAcknowledged(_) => "on_acknowledged",
        }
    }

    /// Topic of the carried record, if any.
    pub fn topic(&self) -> Option<&str> {
        match self {
            BridgeRequest::HealthCheck => None,
            BridgeRequest::OnPublished(m) => Some(&m.topic),
            BridgeRequest::OnConsumed(m) => Some(&m.topic),
            BridgeRequest::OnCommitted(m) => Some(&m.topic),
            BridgeRequest::OnAcknowledged(m) => Some(&m.topic),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ObserverError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ObserverError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// ════════════════════════════════════════════════════════════════
//  Acknowledgement
// ════════════════════════════════════════════════════════════════

/// Status code returned for every bridge call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// Record accepted.
    Ok,
    /// Health check answer.
    Serving,
    /// Request could not be decoded.
    Malformed,
}

/// Minimal reply: the caller does not wait for processing beyond receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: AckStatus,
}

impl Ack {
    pub fn ok() -> Self {
        Self { status: AckStatus::Ok }
    }

    pub fn serving() -> Self {
        Self { status: AckStatus::Serving }
    }

    pub fn malformed() -> Self {
        Self { status: AckStatus::Malformed }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ObserverError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ObserverError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
