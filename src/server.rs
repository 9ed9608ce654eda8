//! HTTP surface for on-demand reconciliation.
//!
//! `POST /reconcile` takes `{"clientId": "<uuid>"}` and answers with the
//! run summary, or `{"error": ...}` with a 4xx/5xx status.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info};

use crate::models::{ErrorResponse, ReconcileResponse};
use crate::reconcile::{self, ProgressStore, ReconcileError, ReconcileRequest};

pub type SharedStore = Arc<dyn ProgressStore>;

impl IntoResponse for ReconcileError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn create_router(store: SharedStore) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/reconcile", post(reconcile_handler))
        .with_state(store)
}

pub async fn serve(listen: SocketAddr, store: SharedStore) -> anyhow::Result<()> {
    let app = create_router(store);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!("Reconciler listening on http://{}", listen);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    "OK"
}

fn parse_request(body: &[u8]) -> Result<ReconcileRequest, ReconcileError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ReconcileRequest::default());
    }
    serde_json::from_slice(body).map_err(|err| ReconcileError::MalformedRequest(err.to_string()))
}

async fn reconcile_handler(
    State(store): State<SharedStore>,
    body: Bytes,
) -> Result<Json<ReconcileResponse>, ReconcileError> {
    let client_id = parse_request(&body)?.client_id()?;
    let run = reconcile::reconcile_client(store.as_ref(), client_id)
        .await
        .map_err(|err| {
            error!(%client_id, error = %err, "reconciliation aborted");
            err
        })?;
    Ok(Json(run.response()))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::*;
    use crate::models::{ActiveParticipation, HealthSample, ProgressUpdate};
    use crate::reconcile::StoreError;

    struct StaticStore {
        reachable: bool,
    }

    #[async_trait]
    impl ProgressStore for StaticStore {
        async fn active_participations(
            &self,
            _client_id: Uuid,
        ) -> Result<Vec<ActiveParticipation>, StoreError> {
            if self.reachable {
                Ok(Vec::new())
            } else {
                Err(StoreError::Database(sqlx::Error::PoolClosed))
            }
        }

        async fn wearable_samples(
            &self,
            _client_id: Uuid,
            _data_type: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<HealthSample>, StoreError> {
            Ok(Vec::new())
        }

        async fn apply_update(&self, _update: &ProgressUpdate) -> Result<bool, StoreError> {
            Ok(true)
        }
    }

    fn store(reachable: bool) -> SharedStore {
        Arc::new(StaticStore { reachable })
    }

    #[test]
    fn empty_body_means_missing_client_id() {
        let request = parse_request(b"  ").unwrap();
        assert!(matches!(
            request.client_id(),
            Err(ReconcileError::MissingClientId)
        ));
    }

    #[test]
    fn invalid_json_is_a_client_error() {
        let err = parse_request(b"{not json").unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn handler_returns_empty_success_for_client_without_challenges() {
        let body = Bytes::from(format!(r#"{{"clientId": "{}"}}"#, Uuid::new_v4()));
        let Json(response) = reconcile_handler(State(store(true)), body).await.unwrap();

        assert!(response.success);
        assert_eq!(response.updated, 0);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({"success": true, "updated": 0, "failed": 0, "results": []})
        );
    }

    #[tokio::test]
    async fn handler_rejects_missing_client_id() {
        let err = reconcile_handler(State(store(true)), Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unreachable_store_is_a_server_error() {
        let body = Bytes::from(format!(r#"{{"clientId": "{}"}}"#, Uuid::new_v4()));
        let err = reconcile_handler(State(store(false)), body)
            .await
            .unwrap_err();
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
