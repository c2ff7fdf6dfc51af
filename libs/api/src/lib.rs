//! Shared vocabulary of the message observer: the records an interceptor
//! observes inside the application process, the topic classifier, and the
//! bridge wire types that carry records into the test process.

pub mod classify;
pub mod error;
pub mod payload;
pub mod record;
pub mod wire;

pub use classify::{classify, TopicKind, TopicSuffixes};
pub use error::ObserverError;
pub use record::{
    AcknowledgedMessage, CommittedMessage, ConsumedMessage, FailedMessage, FailureReason,
    Headers, MessageMetadata, Observation, PublishedMessage, RecordKind, new_id,
};
pub use wire::{Ack, AckStatus, BridgeRequest};
