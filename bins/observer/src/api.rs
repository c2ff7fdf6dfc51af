use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use observer_engine::{ObservationStore, RecordKind};

use crate::error::ServerError;

#[derive(Clone)]
struct AppState {
    store: Arc<ObservationStore>,
}

/// Bind the inspection API. Serving starts with [`serve`].
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::ApiBind {
            addr: addr.to_string(),
            source,
        })
}

/// Read-only view over the store, plus a reset between test runs.
pub async fn serve(
    listener: TcpListener,
    store: Arc<ObservationStore>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(store))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

fn router(store: Arc<ObservationStore>) -> Router {
    Router::new()
        .route(
            "/api/observations",
            get(handle_summary).delete(handle_clear),
        )
        .route("/api/observations/{kind}", get(handle_list))
        .with_state(AppState { store })
}

// --- GET /api/observations ---

async fn handle_summary(State(state): State<AppState>) -> Response {
    axum::Json(state.store.summary()).into_response()
}

// --- GET /api/observations/{kind} ---

async fn handle_list(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
    match kind.parse::<RecordKind>() {
        Ok(kind) => axum::Json(state.store.snapshot(kind)).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

// --- DELETE /api/observations ---

async fn handle_clear(State(state): State<AppState>) -> Response {
    let before = state.store.summary();
    state.store.clear();
    tracing::info!(%before, "observations cleared over api");
    StatusCode::NO_CONTENT.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use observer_engine::Observation;
    use observer_api::ConsumedMessage;

    fn state() -> AppState {
        let store = Arc::new(ObservationStore::new());
        store.record(Observation::Consumed(ConsumedMessage::new(
            "orders",
            0,
            4,
            b"{}".to_vec(),
        )));
        AppState { store }
    }

    #[tokio::test]
    async fn unknown_kind_is_not_found() {
        let response = handle_list(State(state()), Path("delivered".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn known_kind_lists_snapshot() {
        let response = handle_list(State(state()), Path("consumed".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn delete_clears_the_store() {
        let state = state();
        let store = state.store.clone();
        let response = handle_clear(State(state)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn serve_stops_on_cancel() {
        let listener = bind("127.0.0.1:0").await.unwrap();
        let token = CancellationToken::new();
        let task = tokio::spawn(serve(listener, Arc::new(ObservationStore::new()), token.clone()));
        token.cancel();
        task.await.unwrap().unwrap();
    }
}
