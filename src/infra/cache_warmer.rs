//! Post-purge verification: re-request purged URLs so the edge refetches them.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use axum::http::{HeaderMap, StatusCode};
use futures::stream::{self, StreamExt};
use metrics::counter;
use reqwest::Client;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    application::purge::VerificationDispatch, config::PostPurgeSettings, domain::bypass::with_bypass,
};

use super::{akamai::user_agent, error::InfraError};

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("failed to create GET request for `{url}`: {source}")]
    Build {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to send GET request to `{url}`: {source}")]
    Send {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to read response body from `{url}`: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Counts of verification GETs by outcome.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct CacheWarmer {
    client: Client,
    headers: HeaderMap,
    delay: Duration,
    concurrency: usize,
}

impl CacheWarmer {
    pub fn new(settings: &PostPurgeSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(user_agent())
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            client,
            headers: settings.headers.clone(),
            delay: settings.delay,
            concurrency: settings.concurrency.get() as usize,
        })
    }

    /// Wait for the configured delay, then sweep `paths` on a detached task.
    pub fn spawn(&self, paths: Vec<String>) -> JoinHandle<SweepSummary> {
        let warmer = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(warmer.delay).await;
            warmer.sweep(&paths).await
        })
    }

    /// Request every path and its bypass variant. A failure only affects the
    /// single GET it belongs to.
    pub async fn sweep(&self, paths: &[String]) -> SweepSummary {
        info!(
            target = "edgepurge::cache_warmer",
            paths = paths.len(),
            "starting post-purge requests"
        );

        let succeeded = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        stream::iter(paths)
            .for_each_concurrent(Some(self.concurrency.max(1)), |path| {
                let succeeded = &succeeded;
                let failed = &failed;
                async move {
                    let summary = self.warm_path(path).await;
                    succeeded.fetch_add(summary.succeeded, Ordering::Relaxed);
                    failed.fetch_add(summary.failed, Ordering::Relaxed);
                }
            })
            .await;

        let summary = SweepSummary {
            succeeded: succeeded.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        };
        info!(
            target = "edgepurge::cache_warmer",
            succeeded = summary.succeeded,
            failed = summary.failed,
            "post-purge requests finished"
        );
        summary
    }

    async fn warm_path(&self, path: &str) -> SweepSummary {
        let mut targets = vec![path.to_string()];
        match with_bypass(path) {
            Ok(variant) => targets.push(variant),
            Err(err) => warn!(
                target = "edgepurge::cache_warmer",
                path = %path,
                error = %err,
                "failed to add imbypass parameter"
            ),
        }

        let mut summary = SweepSummary::default();
        for url in targets {
            match self.fetch(&url).await {
                Ok(status) => {
                    counter!("edgepurge_verification_requests_total", "outcome" => "ok")
                        .increment(1);
                    info!(
                        target = "edgepurge::cache_warmer",
                        url = %url,
                        status = status.as_u16(),
                        "post-purge request completed"
                    );
                    summary.succeeded += 1;
                }
                Err(err) => {
                    counter!("edgepurge_verification_requests_total", "outcome" => "failed")
                        .increment(1);
                    error!(
                        target = "edgepurge::cache_warmer",
                        url = %url,
                        error = %err,
                        "post-purge request failed"
                    );
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    async fn fetch(&self, url: &str) -> Result<StatusCode, VerificationError> {
        let request = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .build()
            .map_err(|source| VerificationError::Build {
                url: url.to_string(),
                source,
            })?;

        let mut response =
            self.client
                .execute(request)
                .await
                .map_err(|source| VerificationError::Send {
                    url: url.to_string(),
                    source,
                })?;
        let status = response.status();

        // Drain the body so the connection can go back to the pool.
        while response
            .chunk()
            .await
            .map_err(|source| VerificationError::Body {
                url: url.to_string(),
                source,
            })?
            .is_some()
        {}

        Ok(status)
    }
}

impl VerificationDispatch for CacheWarmer {
    fn dispatch(&self, paths: Vec<String>) {
        if paths.is_empty() {
            return;
        }
        // Detached: the caller already has its response.
        drop(self.spawn(paths));
    }
}
