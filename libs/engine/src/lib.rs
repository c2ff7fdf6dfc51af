//! Test-process side of the observer.
//!
//! Bridged observations land in an [`ObservationStore`] through the
//! [`ObservationSink`]; tests then wait on them with [`Assertions`]. An
//! [`ObserverSystem`] wires the pieces to a bridge server and a
//! [`Publisher`].

mod assertions;
pub mod config;
mod error;
mod expectation;
mod publish;
mod sink;
mod system;

pub use assertions::{Assertions, DEFAULT_POLL_INTERVAL};
pub use config::{AssertionConfig, BridgeConfig, ObserverConfig};
pub use error::{AssertionError, ConfigError, PredicateError, PublishError, SystemError};
pub use expectation::{
    DEFAULT_TIMEOUT, Expectation, FailureExpectation, ObservedFailure, ObservedMessage,
};
#[cfg(feature = "rdkafka")]
pub use publish::KafkaPublisher;
pub use publish::{
    OutgoingMessage, PublishFuture, PublishReceipt, Publisher, RecordingPublisher, TEST_CASE_HEADER,
};
pub use sink::ObservationSink;
pub use system::ObserverSystem;

pub use observation_store::{ObservationStore, StoreSummary};
pub use observer_api::{
    FailureReason, MessageMetadata, Observation, RecordKind, TopicKind, TopicSuffixes,
};
