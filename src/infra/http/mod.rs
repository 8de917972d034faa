//! HTTP surface: the purge endpoint and a liveness probe.

mod error;
mod middleware;
mod purge;

pub use error::{ApiError, ApiErrorBody};
pub use middleware::{REQUEST_ID_HEADER, RequestContext};
pub use purge::{RequestError, parse_purge_request};

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware::from_fn,
    routing::{get, post},
};

use crate::application::purge::{PurgeService, VerificationDispatch};

#[derive(Clone)]
pub struct PurgeState {
    pub purge: Arc<PurgeService>,
    pub verifier: Arc<dyn VerificationDispatch>,
}

pub fn build_router(state: PurgeState) -> Router {
    Router::new()
        .route("/api/v1/purge", post(purge::purge))
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(from_fn(middleware::log_responses))
        .layer(from_fn(middleware::set_request_context))
}

async fn healthz() -> StatusCode {
    StatusCode::NO_CONTENT
}
