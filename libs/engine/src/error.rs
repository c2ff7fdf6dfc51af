use std::time::Duration;

use observer_api::{FailureReason, RecordKind};

/// Error a caller-supplied predicate may return.
pub type PredicateError = Box<dyn std::error::Error + Send + Sync>;

/// Test-facing assertion failure.
#[derive(Debug, thiserror::Error)]
pub enum AssertionError {
    /// Nothing matched before the deadline.
    #[error(
        "expected {subject} to be {kind} within {elapsed:?}, \
         but nothing matched ({examined} {kind} record(s) examined)\n{dump}"
    )]
    Timeout {
        subject: String,
        kind: RecordKind,
        elapsed: Duration,
        examined: usize,
        dump: String,
    },

    #[error("predicate for {subject} returned an error: {source}")]
    Predicate {
        subject: String,
        source: PredicateError,
    },

    #[error("{subject} failed, but not for the expected reason; observed: {reasons}\n{dump}")]
    UnexpectedFailureReason {
        subject: String,
        reasons: String,
        dump: String,
    },

    #[error("expected {subject} to be consumed, but it failed: {reason}\n{dump}")]
    FailedInsteadOfConsumed {
        subject: String,
        reason: FailureReason,
        dump: String,
    },
}

impl AssertionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AssertionError::Timeout { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("serialize payload for '{topic}': {source}")]
    Serialize {
        topic: String,
        source: serde_json::Error,
    },

    #[error("send to '{topic}': {detail}")]
    Send { topic: String, detail: String },

    #[cfg(feature = "rdkafka")]
    #[error("kafka client: {0}")]
    Client(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config (read): '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("config (parse): '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Failure to bring up an [`crate::ObserverSystem`].
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Bridge(#[from] observer_bridge::BridgeError),

    #[error("bridge at {addr} did not answer its health check: {source}")]
    Unhealthy {
        addr: String,
        source: observer_bridge::BridgeError,
    },
}
