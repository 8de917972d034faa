//! EG1-HMAC-SHA256 request signing.

use std::path::PathBuf;

use async_trait::async_trait;
use axum::http::{HeaderValue, Method, header::AUTHORIZATION};
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use time::{OffsetDateTime, macros::format_description};
use tracing::debug;
use uuid::Uuid;

use super::{EdgeGridCredentials, RequestSigner, SignError, parse_edgerc};

const ALGORITHM: &str = "EG1-HMAC-SHA256";

/// Signs requests with credentials read from an `.edgerc` section.
///
/// The file is read on every call so rotated credentials are picked up
/// without a restart.
#[derive(Debug, Clone)]
pub struct EdgeGridSigner {
    path: PathBuf,
    section: String,
}

impl EdgeGridSigner {
    pub fn new(path: impl Into<PathBuf>, section: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            section: section.into(),
        }
    }

    /// The `host` named by the credentials section, if it has one.
    pub async fn credentials_host(&self) -> Result<Option<String>, SignError> {
        Ok(self.load_credentials().await?.host)
    }

    async fn load_credentials(&self) -> Result<EdgeGridCredentials, SignError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SignError::ReadCredentials {
                path: self.path.clone(),
                source,
            })?;

        parse_edgerc(&contents, &self.section).map_err(|source| SignError::Credentials {
            path: self.path.clone(),
            source,
        })
    }
}

#[async_trait]
impl RequestSigner for EdgeGridSigner {
    async fn sign(&self, request: &mut reqwest::Request) -> Result<(), SignError> {
        let credentials = self.load_credentials().await?;
        let timestamp = edgegrid_timestamp(OffsetDateTime::now_utc())?;
        let nonce = Uuid::new_v4().to_string();

        let header = authorization_header(&credentials, request, &timestamp, &nonce)?;
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_str(&header)?);

        debug!(
            target = "edgepurge::signing",
            url = %request.url(),
            nonce = %nonce,
            "request signed"
        );
        Ok(())
    }
}

/// Timestamp in the `yyyyMMddTHH:mm:ss+0000` form EdgeGrid expects.
pub fn edgegrid_timestamp(now: OffsetDateTime) -> Result<String, SignError> {
    let format = format_description!("[year][month][day]T[hour]:[minute]:[second]+0000");
    Ok(now.to_offset(time::UtcOffset::UTC).format(&format)?)
}

/// Build the full `Authorization` header value for `request`.
pub fn authorization_header(
    credentials: &EdgeGridCredentials,
    request: &reqwest::Request,
    timestamp: &str,
    nonce: &str,
) -> Result<String, SignError> {
    let auth_header = format!(
        "{ALGORITHM} client_token={};access_token={};timestamp={timestamp};nonce={nonce};",
        credentials.client_token, credentials.access_token
    );

    let url = request.url();
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => return Err(SignError::MissingHost(url.to_string())),
    };
    let path_and_query = match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    };

    let body = request
        .body()
        .and_then(|body| body.as_bytes())
        .unwrap_or_default();
    let content_hash = content_hash(request.method(), body, credentials.max_body);

    let data_to_sign = [
        request.method().as_str(),
        url.scheme(),
        host.as_str(),
        path_and_query.as_str(),
        "",
        content_hash.as_str(),
        auth_header.as_str(),
    ]
    .join("\t");

    let signing_key = base64_hmac(credentials.client_secret.as_bytes(), timestamp.as_bytes())?;
    let signature = base64_hmac(signing_key.as_bytes(), data_to_sign.as_bytes())?;

    Ok(format!("{auth_header}signature={signature}"))
}

fn content_hash(method: &Method, body: &[u8], max_body: usize) -> String {
    if *method != Method::POST || body.is_empty() {
        return String::new();
    }
    let signed = &body[..body.len().min(max_body)];
    STANDARD.encode(Sha256::digest(signed))
}

fn base64_hmac(key: &[u8], data: &[u8]) -> Result<String, SignError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|_| SignError::SigningKey)?;
    mac.update(data);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
