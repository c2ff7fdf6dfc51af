use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use observer_bridge::{BRIDGE_PORT_ENV, BridgeServer, LengthPrefixed, bridge_port_from_env};
use observer_engine::{ObservationSink, ObservationStore};

use crate::api;
use crate::config::{ServeArgs, ServerConfig};
use crate::error::ServerError;

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("observer starting");

    let config = ServerConfig::load(&args.config)?;
    let token = CancellationToken::new();

    let store = Arc::new(ObservationStore::new());
    let sink = Arc::new(ObservationSink::new(
        store.clone(),
        config.observer.topic_suffixes.clone(),
    ));

    // Standalone bridge: an unset port falls back to the interceptor's env/default.
    let mut bridge = config.observer.bridge.clone();
    if bridge.port == 0 {
        bridge.port = bridge_port_from_env();
    }
    let server = BridgeServer::bind(&bridge.addr(), LengthPrefixed::new(bridge.max_frame_bytes)).await?;
    tracing::info!(
        addr = %server.local_addr(),
        "bridge listening, point {BRIDGE_PORT_ENV}={} at it",
        server.local_addr().port()
    );
    let bridge_task = server.spawn(sink, token.clone());

    let listener = api::bind(&config.http.addr()).await?;
    tracing::info!(addr = %config.http.addr(), "inspection api listening");
    let api_store = store.clone();
    let api_token = token.clone();
    let api_task = tokio::spawn(async move {
        if let Err(e) = api::serve(listener, api_store, api_token).await {
            tracing::error!(error = %e, "inspection api failed");
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down...");
    token.cancel();

    let _ = bridge_task.await;
    let _ = api_task.await;
    tracing::info!(summary = %store.summary(), "shutdown complete");
    Ok(())
}
