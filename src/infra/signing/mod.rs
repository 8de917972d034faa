//! Request signing for the Akamai OPEN APIs.

use std::path::PathBuf;

use async_trait::async_trait;
use axum::http::header::InvalidHeaderValue;
use thiserror::Error;

mod edgegrid;
mod edgerc;

pub use edgegrid::{EdgeGridSigner, authorization_header, edgegrid_timestamp};
pub use edgerc::{DEFAULT_MAX_BODY, EdgeGridCredentials, EdgercError, parse_edgerc};

#[derive(Debug, Error)]
pub enum SignError {
    #[error("failed to read credentials file `{path}`: {source}")]
    ReadCredentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid credentials file `{path}`: {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: EdgercError,
    },
    #[error("request url `{0}` has no host")]
    MissingHost(String),
    #[error("failed to format signing timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
    #[error("invalid signing key")]
    SigningKey,
    #[error("signed authorization header is not a valid header value: {0}")]
    Header(#[from] InvalidHeaderValue),
}

/// Augments an outbound request with authentication headers.
#[async_trait]
pub trait RequestSigner: Send + Sync {
    async fn sign(&self, request: &mut reqwest::Request) -> Result<(), SignError>;
}
