use observer_api::{
    AcknowledgedMessage, CommittedMessage, ConsumedMessage, Headers, PublishedMessage,
};

/// Borrowed view of a record handed to the producer's `send`.
#[derive(Debug, Clone)]
pub struct OutboundRecord<'a> {
    pub topic: &'a str,
    pub partition: Option<i32>,
    pub key: Option<&'a [u8]>,
    pub payload: &'a [u8],
    pub headers: Vec<(&'a str, &'a [u8])>,
}

impl<'a> OutboundRecord<'a> {
    pub fn new(topic: &'a str, payload: &'a [u8]) -> Self {
        Self {
            topic,
            partition: None,
            key: None,
            payload,
            headers: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: &'a [u8]) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_header(mut self, key: &'a str, value: &'a [u8]) -> Self {
        self.headers.push((key, value));
        self
    }

    pub fn to_published(&self) -> PublishedMessage {
        let mut message =
            PublishedMessage::new(self.topic, self.payload.to_vec()).with_headers(headers(&self.headers));
        message.key = self.key.map(lossy);
        message
    }
}

/// Borrowed view of a record returned by the consumer's `poll`.
#[derive(Debug, Clone)]
pub struct InboundRecord<'a> {
    pub topic: &'a str,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<&'a [u8]>,
    pub payload: &'a [u8],
    pub headers: Vec<(&'a str, &'a [u8])>,
}

impl<'a> InboundRecord<'a> {
    pub fn new(topic: &'a str, partition: i32, offset: i64, payload: &'a [u8]) -> Self {
        Self {
            topic,
            partition,
            offset,
            key: None,
            payload,
            headers: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: &'a [u8]) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_header(mut self, key: &'a str, value: &'a [u8]) -> Self {
        self.headers.push((key, value));
        self
    }

    pub fn to_consumed(&self) -> ConsumedMessage {
        let mut message =
            ConsumedMessage::new(self.topic, self.partition, self.offset, self.payload.to_vec())
                .with_headers(headers(&self.headers));
        message.key = self.key.map(lossy);
        message
    }

    pub fn to_acknowledged(&self) -> AcknowledgedMessage {
        AcknowledgedMessage::new(self.topic, self.payload.to_vec())
    }
}

/// One `(topic, partition)` entry of a consumer offset commit.
#[derive(Debug, Clone, Copy)]
pub struct CommitOffset<'a> {
    pub topic: &'a str,
    pub partition: i32,
    /// Next offset to read, as sent to the broker.
    pub offset: i64,
    pub metadata: &'a str,
}

impl<'a> CommitOffset<'a> {
    pub fn new(topic: &'a str, partition: i32, offset: i64) -> Self {
        Self {
            topic,
            partition,
            offset,
            metadata: "",
        }
    }

    pub fn with_metadata(mut self, metadata: &'a str) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn to_committed(&self) -> CommittedMessage {
        CommittedMessage::new(self.topic, self.partition, self.offset).with_metadata(self.metadata)
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn headers(pairs: &[(&str, &[u8])]) -> Headers {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), lossy(value)))
        .collect()
}
