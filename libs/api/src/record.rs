use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ObserverError;
use crate::payload;

/// Message headers with values decoded as (lossy) UTF-8.
pub type Headers = BTreeMap<String, String>;

/// Fresh identifier for one observation event. Not a business key.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ════════════════════════════════════════════════════════════════
//  Record kinds
// ════════════════════════════════════════════════════════════════

/// Lifecycle bucket an observation is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Published,
    Consumed,
    Committed,
    Acknowledged,
    Retried,
    Failed,
}

impl RecordKind {
    pub const ALL: [RecordKind; 6] = [
        RecordKind::Published,
        RecordKind::Consumed,
        RecordKind::Committed,
        RecordKind::Acknowledged,
        RecordKind::Retried,
        RecordKind::Failed,
    ];

    /// Dense index, stable for the lifetime of the process.
    pub fn index(self) -> usize {
        match self {
            RecordKind::Published => 0,
            RecordKind::Consumed => 1,
            RecordKind::Committed => 2,
            RecordKind::Acknowledged => 3,
            RecordKind::Retried => 4,
            RecordKind::Failed => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Published => "published",
            RecordKind::Consumed => "consumed",
            RecordKind::Committed => "committed",
            RecordKind::Acknowledged => "acknowledged",
            RecordKind::Retried => "retried",
            RecordKind::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = ObserverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ObserverError::UnknownKind(s.to_string()))
    }
}

// ════════════════════════════════════════════════════════════════
//  Records
// ════════════════════════════════════════════════════════════════

/// A producer call observed at send time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedMessage {
    pub id: String,
    pub topic: String,
    #[serde(with = "payload")]
    pub message: Vec<u8>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub headers: Headers,
}

impl PublishedMessage {
    pub fn new(topic: impl Into<String>, message: Vec<u8>) -> Self {
        Self {
            id: new_id(),
            topic: topic.into(),
            message,
            key: None,
            headers: Headers::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn metadata(&self) -> MessageMetadata {
        MessageMetadata {
            topic: self.topic.clone(),
            key: self.key.clone(),
            headers: self.headers.clone(),
            partition: None,
            offset: None,
        }
    }
}

/// A record delivered by the consumer to application handler code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedMessage {
    pub id: String,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    #[serde(with = "payload")]
    pub message: Vec<u8>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub headers: Headers,
}

impl ConsumedMessage {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, message: Vec<u8>) -> Self {
        Self {
            id: new_id(),
            topic: topic.into(),
            partition,
            offset,
            message,
            key: None,
            headers: Headers::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn metadata(&self) -> MessageMetadata {
        MessageMetadata {
            topic: self.topic.clone(),
            key: self.key.clone(),
            headers: self.headers.clone(),
            partition: Some(self.partition),
            offset: Some(self.offset),
        }
    }
}

/// An offset commit for `(topic, partition)`.
///
/// Kafka commits the *next* offset to read, so a commit at `offset` covers
/// every record strictly below it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedMessage {
    pub id: String,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    #[serde(default)]
    pub metadata: String,
}

impl CommittedMessage {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            id: new_id(),
            topic: topic.into(),
            partition,
            offset,
            metadata: String::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    /// `true` when this commit covers the record at `offset`.
    pub fn covers(&self, offset: i64) -> bool {
        offset < self.offset
    }
}

/// Application-level processing of a consumed message completed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgedMessage {
    pub id: String,
    pub topic: String,
    #[serde(with = "payload")]
    pub message: Vec<u8>,
}

impl AcknowledgedMessage {
    pub fn new(topic: impl Into<String>, message: Vec<u8>) -> Self {
        Self {
            id: new_id(),
            topic: topic.into(),
            message,
        }
    }
}

/// Why a message ended up on an error topic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: String,
    pub message: String,
}

impl FailureReason {
    /// Header pairs dead-letter publishers use to carry the original exception.
    pub const HEADER_PAIRS: [(&'static str, &'static str); 2] = [
        ("kafka_dlt-exception-fqcn", "kafka_dlt-exception-message"),
        ("x-exception-type", "x-exception-message"),
    ];

    /// Kind used when the record carries no exception headers.
    pub const ROUTED_TO_ERROR_TOPIC: &'static str = "routed-to-error-topic";

    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Extract the reason from dead-letter headers, falling back to a
    /// synthetic reason naming the error topic.
    pub fn from_headers(topic: &str, headers: &Headers) -> Self {
        for (kind_header, message_header) in Self::HEADER_PAIRS {
            if let Some(kind) = headers.get(kind_header) {
                let message = headers.get(message_header).cloned().unwrap_or_default();
                return Self::new(kind.clone(), message);
            }
        }
        Self::new(
            Self::ROUTED_TO_ERROR_TOPIC,
            format!("message arrived on error topic '{topic}'"),
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

/// A consumed or published record that landed on an error topic.
///
/// Derived on the test-process side, never bridged. Keeps the id of the
/// observation it was derived from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedMessage {
    pub id: String,
    pub topic: String,
    #[serde(with = "payload")]
    pub message: Vec<u8>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub partition: Option<i32>,
    #[serde(default)]
    pub offset: Option<i64>,
    pub reason: FailureReason,
}

impl FailedMessage {
    pub fn from_consumed(consumed: ConsumedMessage, reason: FailureReason) -> Self {
        Self {
            id: consumed.id,
            topic: consumed.topic,
            message: consumed.message,
            key: consumed.key,
            headers: consumed.headers,
            partition: Some(consumed.partition),
            offset: Some(consumed.offset),
            reason,
        }
    }

    pub fn from_published(published: PublishedMessage, reason: FailureReason) -> Self {
        Self {
            id: published.id,
            topic: published.topic,
            message: published.message,
            key: published.key,
            headers: published.headers,
            partition: None,
            offset: None,
            reason,
        }
    }

    pub fn metadata(&self) -> MessageMetadata {
        MessageMetadata {
            topic: self.topic.clone(),
            key: self.key.clone(),
            headers: self.headers.clone(),
            partition: self.partition,
            offset: self.offset,
        }
    }
}

/// Broker-side context of an observed message, handed to predicates next
/// to the deserialized value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub topic: String,
    pub key: Option<String>,
    pub headers: Headers,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
}

// ════════════════════════════════════════════════════════════════
//  Observation
// ════════════════════════════════════════════════════════════════

/// One stored record, tagged with the bucket it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    Published(PublishedMessage),
    Consumed(ConsumedMessage),
    Committed(CommittedMessage),
    Acknowledged(AcknowledgedMessage),
    Retried(ConsumedMessage),
    Failed(FailedMessage),
}

impl Observation {
    pub fn kind(&self) -> RecordKind {
        match self {
            Observation::Published(_) => RecordKind::Published,
            Observation::Consumed(_) => RecordKind::Consumed,
            Observation::Committed(_) => RecordKind::Committed,
            Observation::Acknowledged(_) => RecordKind::Acknowledged,
            Observation::Retried(_) => RecordKind::Retried,
            Observation::Failed(_) => RecordKind::Failed,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Observation::Published(m) => &m.id,
            Observation::Consumed(m) | Observation::Retried(m) => &m.id,
            Observation::Committed(m) => &m.id,
            Observation::Acknowledged(m) => &m.id,
            Observation::Failed(m) => &m.id,
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            Observation::Published(m) => &m.topic,
            Observation::Consumed(m) | Observation::Retried(m) => &m.topic,
            Observation::Committed(m) => &m.topic,
            Observation::Acknowledged(m) => &m.topic,
            Observation::Failed(m) => &m.topic,
        }
    }

    /// Raw message bytes. Commits carry no payload.
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Observation::Published(m) => Some(&m.message),
            Observation::Consumed(m) | Observation::Retried(m) => Some(&m.message),
            Observation::Committed(_) => None,
            Observation::Acknowledged(m) => Some(&m.message),
            Observation::Failed(m) => Some(&m.message),
        }
    }

    pub fn metadata(&self) -> MessageMetadata {
        match self {
            Observation::Published(m) => m.metadata(),
            Observation::Consumed(m) | Observation::Retried(m) => m.metadata(),
            Observation::Committed(m) => MessageMetadata {
                topic: m.topic.clone(),
                partition: Some(m.partition),
                offset: Some(m.offset),
                ..MessageMetadata::default()
            },
            Observation::Acknowledged(m) => MessageMetadata {
                topic: m.topic.clone(),
                ..MessageMetadata::default()
            },
            Observation::Failed(m) => m.metadata(),
        }
    }

    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match self {
            Observation::Failed(m) => Some(&m.reason),
            _ => None,
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] id={} topic={}", self.kind(), self.id(), self.topic())?;
        let metadata = self.metadata();
        if let Some(partition) = metadata.partition {
            write!(f, " partition={partition}")?;
        }
        if let Some(offset) = metadata.offset {
            write!(f, " offset={offset}")?;
        }
        if let Some(key) = &metadata.key {
            write!(f, " key={key}")?;
        }
        if !metadata.headers.is_empty() {
            write!(f, " headers={:?}", metadata.headers)?;
        }
        if let Some(reason) = self.failure_reason() {
            write!(f, " reason=\"{reason}\"")?;
        }
        if let Some(bytes) = self.payload() {
            write!(f, " message={}", payload::display(bytes))?;
        }
        Ok(())
    }
}
