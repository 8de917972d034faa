//! Fast Purge (CCU v3) client.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::http::{HeaderValue, header::CONTENT_TYPE};
use reqwest::Client;
use tracing::debug;

use crate::{
    application::purge::{ForwardError, PurgeApi, UpstreamReply},
    domain::purge::{PurgePayload, PurgeResponse},
};

use super::{error::InfraError, signing::RequestSigner};

pub struct AkamaiPurgeClient {
    client: Client,
    signer: Arc<dyn RequestSigner>,
}

impl AkamaiPurgeClient {
    pub fn new(timeout: Duration, signer: Arc<dyn RequestSigner>) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self { client, signer })
    }
}

pub(crate) fn user_agent() -> &'static str {
    concat!("edgepurge/", env!("CARGO_PKG_VERSION"))
}

#[async_trait]
impl PurgeApi for AkamaiPurgeClient {
    async fn submit(
        &self,
        endpoint: &str,
        payload: &PurgePayload,
    ) -> Result<UpstreamReply, ForwardError> {
        let body = serde_json::to_vec(payload).map_err(ForwardError::Encode)?;

        let mut request = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(body)
            .build()
            .map_err(|err| ForwardError::Request(Box::new(err)))?;

        self.signer
            .sign(&mut request)
            .await
            .map_err(|err| ForwardError::Sign(Box::new(err)))?;

        debug!(
            target = "edgepurge::akamai",
            endpoint = %endpoint,
            objects = payload.objects.len(),
            "sending purge request"
        );

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|err| ForwardError::Transport(Box::new(err)))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ForwardError::Decode(Box::new(err)))?;
        let body: PurgeResponse =
            serde_json::from_slice(&bytes).map_err(|err| ForwardError::Decode(Box::new(err)))?;

        Ok(UpstreamReply { status, body })
    }
}
