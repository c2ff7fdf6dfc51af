use tokio::runtime::Handle;
use tokio::sync::mpsc;

use observer_api::{AckStatus, BridgeRequest, TopicSuffixes};
use observer_bridge::BridgeClient;

use crate::{CommitOffset, ConsumerInterceptor, InboundRecord, OutboundRecord, ProducerInterceptor};

#[derive(Debug, thiserror::Error)]
pub enum InterceptorError {
    #[error("failed to start bridge forwarder: {0}")]
    Spawn(#[from] std::io::Error),
}

// ═══════════════════════════════════════════════════════════════
//  BridgeInterceptor: broker callbacks → channel → bridge client
// ═══════════════════════════════════════════════════════════════

/// Forwards every observed event to the bridge server.
///
/// Callbacks never block on the network: events are queued on an unbounded
/// channel and sent one call each by a background task. A failed call is
/// logged and dropped.
#[derive(Clone)]
pub struct BridgeInterceptor {
    tx: mpsc::UnboundedSender<BridgeRequest>,
    suffixes: TopicSuffixes,
}

impl BridgeInterceptor {
    /// Connect to `127.0.0.1` on the port from `KAFKA_OBSERVER_BRIDGE_PORT`.
    pub fn from_env() -> Result<Self, InterceptorError> {
        Self::start(BridgeClient::from_env())
    }

    pub fn connect(addr: impl Into<String>) -> Result<Self, InterceptorError> {
        Self::start(BridgeClient::new(addr))
    }

    /// Run the forwarder on a dedicated thread with its own runtime.
    /// For applications whose broker client is not driven by tokio.
    pub fn start(client: BridgeClient) -> Result<Self, InterceptorError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("observer-forwarder".into())
            .spawn(move || runtime.block_on(forward(client, rx)))?;
        Ok(Self::with_sender(tx))
    }

    /// Run the forwarder as a task on an existing runtime.
    pub fn spawn_on(client: BridgeClient, handle: &Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(forward(client, rx));
        Self::with_sender(tx)
    }

    fn with_sender(tx: mpsc::UnboundedSender<BridgeRequest>) -> Self {
        Self {
            tx,
            suffixes: TopicSuffixes::default(),
        }
    }

    /// Suffixes used to label events in logs. Routing happens in the sink.
    pub fn with_topic_suffixes(mut self, suffixes: TopicSuffixes) -> Self {
        self.suffixes = suffixes;
        self
    }

    fn emit(&self, request: BridgeRequest) {
        tracing::trace!(
            method = request.method(),
            topic = request.topic().unwrap_or_default(),
            topic_kind = ?request.topic().map(|t| self.suffixes.classify(t)),
            "observed"
        );
        if let Err(mpsc::error::SendError(request)) = self.tx.send(request) {
            tracing::warn!(
                method = request.method(),
                "bridge forwarder stopped, observation dropped"
            );
        }
    }
}

impl ProducerInterceptor for BridgeInterceptor {
    fn on_send(&self, record: &OutboundRecord<'_>) {
        self.emit(BridgeRequest::OnPublished(record.to_published()));
    }
}

impl ConsumerInterceptor for BridgeInterceptor {
    fn on_consume(&self, records: &[InboundRecord<'_>]) {
        for record in records {
            self.emit(BridgeRequest::OnConsumed(record.to_consumed()));
        }
    }

    fn on_commit(&self, offsets: &[CommitOffset<'_>]) {
        for offset in offsets {
            self.emit(BridgeRequest::OnCommitted(offset.to_committed()));
        }
    }

    fn on_acknowledged(&self, record: &InboundRecord<'_>) {
        self.emit(BridgeRequest::OnAcknowledged(record.to_acknowledged()));
    }
}

async fn forward(client: BridgeClient, mut rx: mpsc::UnboundedReceiver<BridgeRequest>) {
    match client.health_check().await {
        Ok(()) => tracing::info!(addr = client.addr(), "bridge reachable"),
        Err(e) => tracing::warn!(addr = client.addr(), error = %e, "bridge health check failed"),
    }

    while let Some(request) = rx.recv().await {
        match client.call(&request).await {
            Ok(ack) if ack.status == AckStatus::Ok => {}
            Ok(ack) => tracing::warn!(
                method = request.method(),
                status = ?ack.status,
                "bridge rejected observation"
            ),
            Err(e) => tracing::warn!(
                method = request.method(),
                topic = request.topic().unwrap_or_default(),
                error = %e,
                "bridge call failed, observation dropped"
            ),
        }
    }
    tracing::debug!(addr = client.addr(), "bridge forwarder finished");
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use observer_api::Ack;
    use observer_bridge::{BridgeHandler, BridgeServer, LengthPrefixed};
    use tokio_util::sync::CancellationToken;

    use super::*;

    #[derive(Default)]
    struct Collect {
        requests: Mutex<Vec<BridgeRequest>>,
    }

    impl BridgeHandler for Collect {
        fn handle(&self, request: BridgeRequest) -> Ack {
            if request == BridgeRequest::HealthCheck {
                return Ack::serving();
            }
            self.requests.lock().unwrap().push(request);
            Ack::ok()
        }
    }

    impl Collect {
        async fn wait_for(&self, count: usize) -> Vec<BridgeRequest> {
            for _ in 0..200 {
                {
                    let requests = self.requests.lock().unwrap();
                    if requests.len() >= count {
                        return requests.clone();
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("expected {count} bridged requests");
        }
    }

    async fn serve(collect: Arc<Collect>) -> (String, CancellationToken) {
        let server = BridgeServer::bind("127.0.0.1:0", LengthPrefixed::default())
            .await
            .unwrap();
        let addr = server.local_addr().to_string();
        let token = CancellationToken::new();
        server.spawn(collect, token.clone());
        (addr, token)
    }

    #[tokio::test]
    async fn one_call_per_event_in_callback_order() {
        let collect = Arc::new(Collect::default());
        let (addr, token) = serve(collect.clone()).await;
        let interceptor = BridgeInterceptor::spawn_on(BridgeClient::new(addr), &Handle::current());

        interceptor.on_send(&OutboundRecord::new("orders", b"{}").with_key(b"k1"));
        interceptor.on_consume(&[
            InboundRecord::new("orders", 0, 0, b"a"),
            InboundRecord::new("orders", 0, 1, b"b"),
        ]);
        interceptor.on_commit(&[CommitOffset::new("orders", 0, 2)]);
        interceptor.on_acknowledged(&InboundRecord::new("orders", 0, 1, b"b"));

        let methods: Vec<_> = collect
            .wait_for(5)
            .await
            .iter()
            .map(BridgeRequest::method)
            .collect();
        assert_eq!(
            methods,
            ["on_published", "on_consumed", "on_consumed", "on_committed", "on_acknowledged"]
        );
        token.cancel();
    }

    #[test]
    fn dedicated_thread_forwarder_works_without_caller_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let collect = Arc::new(Collect::default());
        let (addr, token) = runtime.block_on(serve(collect.clone()));

        let interceptor = BridgeInterceptor::connect(addr).unwrap();
        interceptor.on_consume(&[InboundRecord::new("orders.retry", 0, 3, b"{}")]);

        let requests = runtime.block_on(collect.wait_for(1));
        assert!(matches!(&requests[0], BridgeRequest::OnConsumed(m) if m.offset == 3));
        token.cancel();
    }

    #[tokio::test]
    async fn unreachable_bridge_never_fails_the_callback() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let interceptor = BridgeInterceptor::spawn_on(BridgeClient::new(addr), &Handle::current());
        for offset in 0..10 {
            interceptor.on_consume(&[InboundRecord::new("t", 0, offset, b"")]);
        }
        interceptor.on_commit(&[CommitOffset::new("t", 0, 10)]);
    }
}
