//! Hooks that run inside the application under test.
//!
//! The application's broker client calls a [`ProducerInterceptor`] on every
//! send and a [`ConsumerInterceptor`] on every poll and commit. The
//! [`BridgeInterceptor`] turns each event into one bridge call on a
//! background forwarder, so the client thread only pays for a copy and a
//! channel push.

mod forwarder;
#[cfg(feature = "rdkafka")]
mod kafka;
mod view;

pub use forwarder::{BridgeInterceptor, InterceptorError};
#[cfg(feature = "rdkafka")]
pub use kafka::{ObservingConsumerContext, observe_base_record, observe_message, observe_record};
pub use view::{CommitOffset, InboundRecord, OutboundRecord};

/// Hook for producer `send` calls.
pub trait ProducerInterceptor: Send + Sync {
    fn on_send(&self, record: &OutboundRecord<'_>);
}

/// Hook for consumer `poll` and `commit` calls.
pub trait ConsumerInterceptor: Send + Sync {
    fn on_consume(&self, records: &[InboundRecord<'_>]);

    fn on_commit(&self, offsets: &[CommitOffset<'_>]);

    /// Application handler finished with `record`.
    fn on_acknowledged(&self, _record: &InboundRecord<'_>) {}
}
