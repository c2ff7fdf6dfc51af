use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tokio::sync::Mutex;

use observer_api::{Headers, PublishedMessage};

use crate::error::PublishError;

/// Header carrying the name of the test that injected a message.
pub const TEST_CASE_HEADER: &str = "testCase";

/// A message the test injects into the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub key: Option<String>,
    pub headers: Headers,
    pub partition: Option<i32>,
}

impl OutgoingMessage {
    /// Payload serialized as JSON.
    pub fn json<V: Serialize + ?Sized>(topic: impl Into<String>, value: &V) -> Result<Self, PublishError> {
        let topic = topic.into();
        let payload = serde_json::to_vec(value).map_err(|source| PublishError::Serialize {
            topic: topic.clone(),
            source,
        })?;
        Ok(Self::raw(topic, payload))
    }

    pub fn raw(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            key: None,
            headers: Headers::new(),
            partition: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_test_case(self, name: impl Into<String>) -> Self {
        self.with_header(TEST_CASE_HEADER, name)
    }

    /// The observation recorded when harness publishes are listened to.
    pub fn to_published(&self) -> PublishedMessage {
        let mut published =
            PublishedMessage::new(self.topic.clone(), self.payload.clone()).with_headers(self.headers.clone());
        published.key = self.key.clone();
        published
    }
}

/// Where the broker put a published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

pub type PublishFuture<'a> =
    Pin<Box<dyn Future<Output = Result<PublishReceipt, PublishError>> + Send + 'a>>;

/// Send-and-confirm into the broker, outside the interception path.
pub trait Publisher: Send + Sync {
    fn publish(&self, message: OutgoingMessage) -> PublishFuture<'_>;
}

// ═══════════════════════════════════════════════════════════════
//  RecordingPublisher
// ═══════════════════════════════════════════════════════════════

/// Broker stand-in that keeps every message and hands out sequential
/// offsets per `(topic, partition)`.
#[derive(Default)]
pub struct RecordingPublisher {
    state: Mutex<RecordingState>,
}

#[derive(Default)]
struct RecordingState {
    sent: Vec<OutgoingMessage>,
    next_offsets: HashMap<(String, i32), i64>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<OutgoingMessage> {
        self.state.lock().await.sent.clone()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, message: OutgoingMessage) -> PublishFuture<'_> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let partition = message.partition.unwrap_or(0);
            let next = state
                .next_offsets
                .entry((message.topic.clone(), partition))
                .or_insert(0);
            let offset = *next;
            *next += 1;
            let receipt = PublishReceipt {
                topic: message.topic.clone(),
                partition,
                offset,
            };
            state.sent.push(message);
            Ok(receipt)
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  KafkaPublisher
// ═══════════════════════════════════════════════════════════════

#[cfg(feature = "rdkafka")]
pub use kafka::KafkaPublisher;

#[cfg(feature = "rdkafka")]
mod kafka {
    use std::time::Duration;

    use rdkafka::ClientConfig;
    use rdkafka::message::{Header, OwnedHeaders};
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::util::Timeout;

    use super::{OutgoingMessage, PublishFuture, PublishReceipt, Publisher};
    use crate::error::PublishError;

    /// [`Publisher`] over a real rdkafka producer.
    pub struct KafkaPublisher {
        producer: FutureProducer,
        send_timeout: Duration,
    }

    impl KafkaPublisher {
        pub fn new(bootstrap_servers: &str) -> Result<Self, PublishError> {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", bootstrap_servers)
                .set("message.timeout.ms", "5000")
                .create()
                .map_err(|e| PublishError::Client(e.to_string()))?;
            Ok(Self::from_producer(producer))
        }

        pub fn from_producer(producer: FutureProducer) -> Self {
            Self {
                producer,
                send_timeout: Duration::from_secs(5),
            }
        }

        pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
            self.send_timeout = timeout;
            self
        }
    }

    impl Publisher for KafkaPublisher {
        fn publish(&self, message: OutgoingMessage) -> PublishFuture<'_> {
            Box::pin(async move {
                let mut headers = OwnedHeaders::new();
                for (key, value) in &message.headers {
                    headers = headers.insert(Header {
                        key: key.as_str(),
                        value: Some(value.as_bytes()),
                    });
                }
                let mut record = FutureRecord::<str, [u8]>::to(&message.topic)
                    .payload(message.payload.as_slice())
                    .headers(headers);
                if let Some(key) = &message.key {
                    record = record.key(key.as_str());
                }
                if let Some(partition) = message.partition {
                    record = record.partition(partition);
                }

                match self.producer.send(record, Timeout::After(self.send_timeout)).await {
                    Ok((partition, offset)) => Ok(PublishReceipt {
                        topic: message.topic.clone(),
                        partition,
                        offset,
                    }),
                    Err((e, _)) => Err(PublishError::Send {
                        topic: message.topic.clone(),
                        detail: e.to_string(),
                    }),
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Order {
        id: u32,
    }

    #[test]
    fn json_message_carries_options() {
        let message = OutgoingMessage::json("orders", &Order { id: 1 })
            .unwrap()
            .with_key("k1")
            .with_partition(2)
            .with_test_case("checkout");
        assert_eq!(message.payload, br#"{"id":1}"#);
        assert_eq!(message.headers[TEST_CASE_HEADER], "checkout");

        let published = message.to_published();
        assert_eq!(published.key.as_deref(), Some("k1"));
        assert_eq!(published.headers[TEST_CASE_HEADER], "checkout");
    }

    #[tokio::test]
    async fn recording_publisher_assigns_offsets_per_partition() {
        let publisher = RecordingPublisher::new();
        let first = publisher.publish(OutgoingMessage::raw("t", "a")).await.unwrap();
        let second = publisher.publish(OutgoingMessage::raw("t", "b")).await.unwrap();
        let other = publisher
            .publish(OutgoingMessage::raw("t", "c").with_partition(1))
            .await
            .unwrap();
        assert_eq!((first.partition, first.offset), (0, 0));
        assert_eq!((second.partition, second.offset), (0, 1));
        assert_eq!((other.partition, other.offset), (1, 0));
        assert_eq!(publisher.sent().await.len(), 3);
    }
}
