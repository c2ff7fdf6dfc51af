use rdkafka::consumer::ConsumerContext;
use rdkafka::error::KafkaResult;
use rdkafka::message::{Headers, Message, OwnedHeaders, ToBytes};
use rdkafka::producer::{BaseRecord, FutureRecord};
use rdkafka::util::IntoOpaque;
use rdkafka::{ClientContext, Offset, TopicPartitionList};

use crate::{
    CommitOffset, ConsumerInterceptor, InboundRecord, OutboundRecord, ProducerInterceptor,
};

/// Consumer context that reports every successful offset commit.
pub struct ObservingConsumerContext<I> {
    interceptor: I,
}

impl<I> ObservingConsumerContext<I> {
    pub fn new(interceptor: I) -> Self {
        Self { interceptor }
    }

    pub fn interceptor(&self) -> &I {
        &self.interceptor
    }
}

impl<I: ConsumerInterceptor + 'static> ClientContext for ObservingConsumerContext<I> {}

impl<I: ConsumerInterceptor + 'static> ConsumerContext for ObservingConsumerContext<I> {
    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        if let Err(e) = result {
            tracing::debug!(error = %e, "offset commit failed, not observed");
            return;
        }
        let elements = offsets.elements();
        let commits: Vec<CommitOffset<'_>> = elements
            .iter()
            .filter_map(|element| match element.offset() {
                Offset::Offset(offset) => Some(
                    CommitOffset::new(element.topic(), element.partition(), offset)
                        .with_metadata(element.metadata()),
                ),
                _ => None,
            })
            .collect();
        if !commits.is_empty() {
            self.interceptor.on_commit(&commits);
        }
    }
}

/// Report one polled message to `interceptor`.
pub fn observe_message<I, M>(interceptor: &I, message: &M)
where
    I: ConsumerInterceptor + ?Sized,
    M: Message,
{
    let mut record = InboundRecord::new(
        message.topic(),
        message.partition(),
        message.offset(),
        message.payload().unwrap_or_default(),
    );
    if let Some(key) = message.key() {
        record = record.with_key(key);
    }
    if let Some(headers) = message.headers() {
        for header in headers.iter() {
            if let Some(value) = header.value {
                record = record.with_header(header.key, value);
            }
        }
    }
    interceptor.on_consume(std::slice::from_ref(&record));
}

/// Report a record about to go through a `FutureProducer` to `interceptor`.
pub fn observe_record<I, K, P>(interceptor: &I, record: &FutureRecord<'_, K, P>)
where
    I: ProducerInterceptor + ?Sized,
    K: ToBytes + ?Sized,
    P: ToBytes + ?Sized,
{
    interceptor.on_send(&outbound(
        record.topic,
        record.partition,
        record.key.map(|key| key.to_bytes()),
        record.payload.map(|payload| payload.to_bytes()),
        record.headers.as_ref(),
    ));
}

/// Same as [`observe_record`], for `BaseProducer` / `ThreadedProducer` records.
pub fn observe_base_record<I, K, P, D>(interceptor: &I, record: &BaseRecord<'_, K, P, D>)
where
    I: ProducerInterceptor + ?Sized,
    K: ToBytes + ?Sized,
    P: ToBytes + ?Sized,
    D: IntoOpaque,
{
    interceptor.on_send(&outbound(
        record.topic,
        record.partition,
        record.key.map(|key| key.to_bytes()),
        record.payload.map(|payload| payload.to_bytes()),
        record.headers.as_ref(),
    ));
}

fn outbound<'a>(
    topic: &'a str,
    partition: Option<i32>,
    key: Option<&'a [u8]>,
    payload: Option<&'a [u8]>,
    headers: Option<&'a OwnedHeaders>,
) -> OutboundRecord<'a> {
    let mut record = OutboundRecord::new(topic, payload.unwrap_or_default());
    if let Some(key) = key {
        record = record.with_key(key);
    }
    if let Some(partition) = partition {
        record = record.with_partition(partition);
    }
    for header in headers.into_iter().flat_map(|headers| headers.iter()) {
        if let Some(value) = header.value {
            record = record.with_header(header.key, value);
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use observer_api::PublishedMessage;
    use rdkafka::message::Header;

    use super::*;

    #[derive(Default)]
    struct Sent {
        records: Mutex<Vec<PublishedMessage>>,
    }

    impl ProducerInterceptor for Sent {
        fn on_send(&self, record: &OutboundRecord<'_>) {
            self.records.lock().unwrap().push(record.to_published());
        }
    }

    #[test]
    fn future_record_becomes_one_send() {
        let sent = Sent::default();
        let headers = OwnedHeaders::new().insert(Header {
            key: "x-exception-type",
            value: Some("InvalidOrder"),
        });
        let record = FutureRecord::to("orders.DLT")
            .key("k1")
            .payload(r#"{"id":1}"#)
            .partition(2)
            .headers(headers);

        observe_record(&sent, &record);

        let records = sent.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].topic, "orders.DLT");
        assert_eq!(records[0].key.as_deref(), Some("k1"));
        assert_eq!(records[0].message, br#"{"id":1}"#);
        assert_eq!(records[0].headers["x-exception-type"], "InvalidOrder");
    }

    #[test]
    fn base_record_without_key_or_payload() {
        let sent = Sent::default();
        let record: BaseRecord<'_, str, str> = BaseRecord::to("orders");

        observe_base_record(&sent, &record);

        let records = sent.records.lock().unwrap();
        assert_eq!(records[0].topic, "orders");
        assert!(records[0].key.is_none());
        assert!(records[0].message.is_empty());
    }
}
