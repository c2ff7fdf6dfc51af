use std::sync::Arc;

use observer_api::{
    Ack, AcknowledgedMessage, BridgeRequest, CommittedMessage, ConsumedMessage, FailedMessage,
    FailureReason, PublishedMessage, TopicKind, TopicSuffixes,
};
use observation_store::ObservationStore;
use observer_bridge::BridgeHandler;

/// Receives bridged observations and files them into the store.
///
/// Topics are classified here, on the test-process side, whatever the
/// interceptor thought of them.
pub struct ObservationSink {
    store: Arc<ObservationStore>,
    suffixes: TopicSuffixes,
}

impl ObservationSink {
    pub fn new(store: Arc<ObservationStore>, suffixes: TopicSuffixes) -> Self {
        Self { store, suffixes }
    }

    pub fn store(&self) -> &Arc<ObservationStore> {
        &self.store
    }

    pub fn suffixes(&self) -> &TopicSuffixes {
        &self.suffixes
    }

    pub fn accept(&self, request: BridgeRequest) -> Ack {
        match request {
            BridgeRequest::HealthCheck => return Ack::serving(),
            BridgeRequest::OnPublished(message) => self.on_published(message),
            BridgeRequest::OnConsumed(message) => self.on_consumed(message),
            BridgeRequest::OnCommitted(message) => self.on_committed(message),
            BridgeRequest::OnAcknowledged(message) => self.on_acknowledged(message),
        }
        Ack::ok()
    }

    /// Always stored as published. On an error topic it also counts as a failure.
    pub fn on_published(&self, message: PublishedMessage) {
        if self.suffixes.is_error_topic(&message.topic) {
            let reason = FailureReason::from_headers(&message.topic, &message.headers);
            tracing::debug!(topic = %message.topic, %reason, "published to error topic");
            self.store
                .record_failure(FailedMessage::from_published(message.clone(), reason));
        }
        self.store.record_published(message);
    }

    /// Exactly one bucket: failed, retried or consumed.
    pub fn on_consumed(&self, message: ConsumedMessage) {
        match self.suffixes.classify(&message.topic) {
            TopicKind::Error => {
                let reason = FailureReason::from_headers(&message.topic, &message.headers);
                tracing::debug!(topic = %message.topic, %reason, "consumed from error topic");
                self.store
                    .record_failure(FailedMessage::from_consumed(message, reason));
            }
            TopicKind::Retry => self.store.record_retry(message),
            TopicKind::Normal => self.store.record_consumed(message),
        }
    }

    pub fn on_committed(&self, message: CommittedMessage) {
        self.store.record_committed(message);
    }

    pub fn on_acknowledged(&self, message: AcknowledgedMessage) {
        self.store.record_acknowledged(message);
    }
}

impl BridgeHandler for ObservationSink {
    fn handle(&self, request: BridgeRequest) -> Ack {
        self.accept(request)
    }
}

#[cfg(test)]
mod tests {
    use observer_api::{Headers, RecordKind};

    use super::*;

    fn sink() -> ObservationSink {
        ObservationSink::new(Arc::new(ObservationStore::new()), TopicSuffixes::default())
    }

    #[test]
    fn health_check_answers_serving_and_records_nothing() {
        let sink = sink();
        assert_eq!(sink.accept(BridgeRequest::HealthCheck), Ack::serving());
        assert!(sink.store().is_empty());
    }

    #[test]
    fn consumed_on_error_topic_is_only_a_failure() {
        let sink = sink();
        let ack = sink.accept(BridgeRequest::OnConsumed(ConsumedMessage::new(
            "orders.error",
            0,
            0,
            b"{}".to_vec(),
        )));
        assert_eq!(ack, Ack::ok());
        assert!(sink.store().consumed_messages().is_empty());
        let failed = sink.store().failed_messages();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].reason.kind, FailureReason::ROUTED_TO_ERROR_TOPIC);
    }

    #[test]
    fn consumed_on_retry_topic_is_retried() {
        let sink = sink();
        sink.on_consumed(ConsumedMessage::new("orders.retry", 0, 0, Vec::new()));
        assert_eq!(sink.store().len(RecordKind::Retried), 1);
        assert_eq!(sink.store().len(RecordKind::Consumed), 0);
    }

    #[test]
    fn consumed_on_normal_topic_is_consumed() {
        let sink = sink();
        sink.on_consumed(ConsumedMessage::new("orders", 0, 0, Vec::new()));
        assert_eq!(sink.store().len(RecordKind::Consumed), 1);
    }

    #[test]
    fn published_on_error_topic_is_stored_twice_with_reason() {
        let sink = sink();
        let mut headers = Headers::new();
        headers.insert("x-exception-type".into(), "Timeout".into());
        headers.insert("x-exception-message".into(), "db".into());
        sink.on_published(PublishedMessage::new("orders.DLT", b"{}".to_vec()).with_headers(headers));

        assert_eq!(sink.store().len(RecordKind::Published), 1);
        let failed = sink.store().failed_messages();
        assert_eq!(failed[0].reason, FailureReason::new("Timeout", "db"));
    }

    #[test]
    fn commits_and_acks_bypass_classification() {
        let sink = sink();
        sink.accept(BridgeRequest::OnCommitted(CommittedMessage::new("orders.error", 0, 1)));
        sink.accept(BridgeRequest::OnAcknowledged(AcknowledgedMessage::new(
            "orders.retry",
            Vec::new(),
        )));
        assert_eq!(sink.store().len(RecordKind::Committed), 1);
        assert_eq!(sink.store().len(RecordKind::Acknowledged), 1);
        assert!(sink.store().is_committed("orders.error", 0, 0));
    }

    #[test]
    fn custom_suffixes_change_routing() {
        let sink = ObservationSink::new(
            Arc::new(ObservationStore::new()),
            TopicSuffixes::new(vec!["-dlq".into()], Vec::new()),
        );
        sink.on_consumed(ConsumedMessage::new("orders.error", 0, 0, Vec::new()));
        sink.on_consumed(ConsumedMessage::new("orders-DLQ", 0, 0, Vec::new()));
        assert_eq!(sink.store().len(RecordKind::Consumed), 1);
        assert_eq!(sink.store().len(RecordKind::Failed), 1);
    }
}
