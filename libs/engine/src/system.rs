use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use observation_store::{ObservationStore, StoreSummary};
use observer_bridge::{BRIDGE_PORT_ENV, BridgeClient, BridgeServer, LengthPrefixed};

use crate::error::{AssertionError, PublishError, SystemError};
use crate::expectation::{Expectation, FailureExpectation, ObservedMessage};
use crate::publish::{OutgoingMessage, PublishReceipt, Publisher};
use crate::{Assertions, ObservationSink, ObserverConfig};

/// Test-process side of the observer: store, sink, bridge server, publish
/// path and assertions, wired together.
///
/// Start it before the application under test and hand the application
/// [`Self::bridge_env`].
pub struct ObserverSystem {
    config: ObserverConfig,
    store: Arc<ObservationStore>,
    sink: Arc<ObservationSink>,
    assertions: Assertions,
    publisher: Arc<dyn Publisher>,
    bridge_addr: SocketAddr,
    token: CancellationToken,
    server: Option<JoinHandle<()>>,
}

impl ObserverSystem {
    /// Bind the bridge and return once it answers a health check.
    pub async fn start(
        config: ObserverConfig,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self, SystemError> {
        let store = Arc::new(ObservationStore::new());
        let sink = Arc::new(ObservationSink::new(
            store.clone(),
            config.topic_suffixes.clone(),
        ));

        let framing = LengthPrefixed::new(config.bridge.max_frame_bytes);
        let server = BridgeServer::bind(&config.bridge.addr(), framing).await?;
        let bridge_addr = server.local_addr();
        let token = CancellationToken::new();
        let handle = server.spawn(sink.clone(), token.clone());

        let probe = BridgeClient::new(bridge_addr.to_string())
            .with_framing(framing)
            .with_call_timeout(Duration::from_secs(2));
        if let Err(source) = probe.health_check().await {
            token.cancel();
            return Err(SystemError::Unhealthy {
                addr: bridge_addr.to_string(),
                source,
            });
        }

        let assertions =
            Assertions::new(store.clone()).with_poll_interval(config.assertions.poll_interval());
        tracing::info!(
            bridge = %bridge_addr,
            listen_published = config.listen_published_messages,
            "observer system started"
        );

        Ok(Self {
            config,
            store,
            sink,
            assertions,
            publisher,
            bridge_addr,
            token,
            server: Some(handle),
        })
    }

    pub fn bridge_addr(&self) -> SocketAddr {
        self.bridge_addr
    }

    pub fn bridge_port(&self) -> u16 {
        self.bridge_addr.port()
    }

    /// Environment entry telling the application's interceptor where to connect.
    pub fn bridge_env(&self) -> (&'static str, String) {
        (BRIDGE_PORT_ENV, self.bridge_port().to_string())
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ObservationStore> {
        &self.store
    }

    pub fn sink(&self) -> &ObservationSink {
        &self.sink
    }

    pub fn assertions(&self) -> &Assertions {
        &self.assertions
    }

    /// Send through the real publish path. With `listen_published_messages`
    /// the message is also recorded as published once the broker confirms.
    pub async fn publish(&self, message: OutgoingMessage) -> Result<PublishReceipt, PublishError> {
        let observed = self
            .config
            .listen_published_messages
            .then(|| message.to_published());
        let receipt = self.publisher.publish(message).await?;
        tracing::debug!(
            topic = %receipt.topic,
            partition = receipt.partition,
            offset = receipt.offset,
            "published"
        );
        if let Some(observed) = observed {
            self.sink.on_published(observed);
        }
        Ok(receipt)
    }

    pub fn report(&self) -> StoreSummary {
        self.store.summary()
    }

    /// Forget every observation. Between test cases only.
    pub fn clear(&self) {
        self.store.clear();
    }

    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(server) = self.server.take() {
            let _ = server.await;
        }
        tracing::info!(summary = %self.store.summary(), "observer system stopped");
    }

    // ==================== Assertions ====================

    pub fn should_be_consumed<'a, T, F>(&'a self, timeout: Duration, predicate: F) -> Expectation<'a, T>
    where
        T: DeserializeOwned + 'a,
        F: FnMut(&ObservedMessage<T>) -> bool + Send + 'a,
    {
        self.assertions.should_be_consumed(timeout, predicate)
    }

    pub fn should_be_published<'a, T, F>(&'a self, timeout: Duration, predicate: F) -> Expectation<'a, T>
    where
        T: DeserializeOwned + 'a,
        F: FnMut(&ObservedMessage<T>) -> bool + Send + 'a,
    {
        self.assertions.should_be_published(timeout, predicate)
    }

    pub fn should_be_retried<'a, T, F>(
        &'a self,
        timeout: Duration,
        times: usize,
        predicate: F,
    ) -> Expectation<'a, T>
    where
        T: DeserializeOwned + 'a,
        F: FnMut(&ObservedMessage<T>) -> bool + Send + 'a,
    {
        self.assertions.should_be_retried(timeout, times, predicate)
    }

    pub fn should_be_failed<'a, T, F>(&'a self, timeout: Duration, predicate: F) -> FailureExpectation<'a, T>
    where
        T: DeserializeOwned + 'a,
        F: FnMut(&ObservedMessage<T>) -> bool + Send + 'a,
    {
        self.assertions.should_be_failed(timeout, predicate)
    }

    pub async fn should_be_committed(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
        timeout: Duration,
    ) -> Result<(), AssertionError> {
        self.assertions
            .should_be_committed(topic, partition, offset, timeout)
            .await
    }
}

impl Drop for ObserverSystem {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
