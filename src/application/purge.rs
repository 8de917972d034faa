//! Purge forwarding: translate a validated request into a Fast Purge call and
//! decide whether a post-purge verification sweep should follow.

use std::{error::Error as StdError, sync::Arc, time::Instant};

use async_trait::async_trait;
use axum::http::StatusCode;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::info;

use crate::domain::{
    bypass::duplicate_with_bypass,
    purge::{PurgePayload, PurgeRequest, PurgeResponse, PurgeType, PurgeTypeError, purge_endpoint},
};

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Failures while talking to the purge API. Each aborts the request.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to encode purge payload")]
    Encode(#[source] serde_json::Error),
    #[error("failed to create purge request")]
    Request(#[source] BoxError),
    #[error("failed to sign purge request")]
    Sign(#[source] BoxError),
    #[error("failed to communicate with purge api")]
    Transport(#[source] BoxError),
    #[error("failed to decode purge api response")]
    Decode(#[source] BoxError),
}

#[derive(Debug, Error)]
pub enum PurgeError {
    #[error(transparent)]
    InvalidPurgeType(#[from] PurgeTypeError),
    #[error(transparent)]
    Forward(#[from] ForwardError),
}

/// Upstream status line plus the decoded body.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: PurgeResponse,
}

/// Transport to the purge API; signing happens inside the implementation.
#[async_trait]
pub trait PurgeApi: Send + Sync {
    async fn submit(
        &self,
        endpoint: &str,
        payload: &PurgePayload,
    ) -> Result<UpstreamReply, ForwardError>;
}

/// Receives paths to re-request once a purge has been accepted. Implementations
/// run the work detached; nothing about it reaches the original caller.
pub trait VerificationDispatch: Send + Sync {
    fn dispatch(&self, paths: Vec<String>);
}

#[derive(Debug, Clone)]
pub struct PurgeOutcome {
    pub reply: UpstreamReply,
    /// Paths to verify after the response has been produced, when requested.
    pub verification: Option<Vec<String>>,
}

pub struct PurgeService {
    host: String,
    api: Arc<dyn PurgeApi>,
    post_purge_enabled: bool,
}

impl PurgeService {
    pub fn new(host: impl Into<String>, api: Arc<dyn PurgeApi>, post_purge_enabled: bool) -> Self {
        Self {
            host: host.into(),
            api,
            post_purge_enabled,
        }
    }

    pub async fn forward(&self, request: PurgeRequest) -> Result<PurgeOutcome, PurgeError> {
        let purge_type = match request.purge_type() {
            Ok(purge_type) => purge_type,
            Err(err) => {
                counter!("edgepurge_purge_requests_total", "outcome" => "rejected").increment(1);
                return Err(err.into());
            }
        };

        let endpoint = purge_endpoint(
            &self.host,
            purge_type,
            &request.action_type,
            &request.environment,
        );
        let objects = match purge_type {
            PurgeType::Urls => duplicate_with_bypass(&request.paths),
            PurgeType::CacheTags => request.paths.clone(),
        };
        let payload = PurgePayload { objects };

        let started = Instant::now();
        let result = self.api.submit(&endpoint, &payload).await;
        histogram!("edgepurge_upstream_latency_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                counter!("edgepurge_purge_requests_total", "outcome" => "failed").increment(1);
                return Err(err.into());
            }
        };
        counter!("edgepurge_purge_requests_total", "outcome" => "forwarded").increment(1);

        info!(
            target = "edgepurge::purge",
            purge_type = %purge_type,
            objects = payload.objects.len(),
            status = reply.status.as_u16(),
            http_status = reply.body.http_status,
            detail = %reply.body.detail,
            "purge api responded"
        );

        let verification = (reply.body.is_success()
            && request.post_purge_request
            && self.post_purge_enabled)
            .then_some(request.paths);

        Ok(PurgeOutcome {
            reply,
            verification,
        })
    }
}
