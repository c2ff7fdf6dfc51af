use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Mutex;

use observer_api::{Ack, AckStatus, BridgeRequest};

use crate::{BridgeError, LengthPrefixed, bridge_port_from_env};

/// Per-call deadline covering connect, write and reply.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Unary client for the bridge. One lazily opened connection, reused
/// across calls and dropped on the first error. No retries.
pub struct BridgeClient {
    addr: String,
    framing: LengthPrefixed,
    connection: Mutex<Option<TcpStream>>,
    call_timeout: Duration,
}

impl BridgeClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            framing: LengthPrefixed::default(),
            connection: Mutex::new(None),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// `127.0.0.1:<port>` with the port taken from the environment.
    pub fn from_env() -> Self {
        Self::new(format!("127.0.0.1:{}", bridge_port_from_env()))
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_framing(mut self, framing: LengthPrefixed) -> Self {
        self.framing = framing;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn call(&self, request: &BridgeRequest) -> Result<Ack, BridgeError> {
        let payload = request.encode()?;
        let mut connection = self.connection.lock().await;

        let result = tokio::time::timeout(self.call_timeout, self.exchange(&mut connection, &payload))
            .await
            .unwrap_or(Err(BridgeError::Timeout));

        if result.is_err() {
            *connection = None;
        }
        result
    }

    async fn exchange(
        &self,
        connection: &mut Option<TcpStream>,
        payload: &[u8],
    ) -> Result<Ack, BridgeError> {
        if connection.is_none() {
            let stream = TcpStream::connect(&self.addr)
                .await
                .map_err(|source| BridgeError::Connect {
                    addr: self.addr.clone(),
                    source,
                })?;
            stream.set_nodelay(true)?;
            *connection = Some(stream);
        }
        let Some(stream) = connection.as_mut() else {
            return Err(BridgeError::ConnectionClosed);
        };
        self.framing.write_frame(stream, payload).await?;
        match self.framing.read_frame(stream).await? {
            Some(reply) => Ok(Ack::decode(&reply)?),
            None => Err(BridgeError::ConnectionClosed),
        }
    }

    /// `Ok(())` only when the server answers `serving`.
    pub async fn health_check(&self) -> Result<(), BridgeError> {
        match self.call(&BridgeRequest::HealthCheck).await?.status {
            AckStatus::Serving => Ok(()),
            other => Err(BridgeError::UnexpectedReply(other)),
        }
    }
}
