//! Purge request and response shapes exchanged with clients and the Fast Purge API.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// What kind of identifiers a purge targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeType {
    Urls,
    CacheTags,
}

impl PurgeType {
    pub fn as_str(self) -> &'static str {
        match self {
            PurgeType::Urls => "urls",
            PurgeType::CacheTags => "cache-tags",
        }
    }

    /// Path segment used by the CCU v3 endpoint for this purge type.
    pub fn endpoint_segment(self) -> &'static str {
        match self {
            PurgeType::Urls => "url",
            PurgeType::CacheTags => "tag",
        }
    }
}

impl fmt::Display for PurgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported purge type `{0}`")]
pub struct PurgeTypeError(pub String);

impl FromStr for PurgeType {
    type Err = PurgeTypeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "urls" => Ok(PurgeType::Urls),
            "cache-tags" => Ok(PurgeType::CacheTags),
            other => Err(PurgeTypeError(other.to_string())),
        }
    }
}

/// Inbound purge instruction. Absent fields take their zero value so that
/// field-level validation stays with the upstream API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PurgeRequest {
    pub purge_type: String,
    pub action_type: String,
    pub environment: String,
    pub paths: Vec<String>,
    pub post_purge_request: bool,
}

impl PurgeRequest {
    pub fn purge_type(&self) -> Result<PurgeType, PurgeTypeError> {
        self.purge_type.parse()
    }
}

/// Body of the outbound purge call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgePayload {
    pub objects: Vec<String>,
}

/// Decoded Fast Purge response. Fields beyond `httpStatus` and `detail` are
/// carried through untouched so the client sees the upstream body as sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeResponse {
    #[serde(default)]
    pub http_status: u16,
    #[serde(default)]
    pub detail: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PurgeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.http_status)
    }
}

/// CCU v3 endpoint for the given purge coordinates.
pub fn purge_endpoint(
    host: &str,
    purge_type: PurgeType,
    action_type: &str,
    environment: &str,
) -> String {
    format!(
        "{}/ccu/v3/{}/{}/{}",
        host.trim_end_matches('/'),
        action_type,
        purge_type.endpoint_segment(),
        environment
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_purges_use_url_segment() {
        assert_eq!(
            purge_endpoint(
                "https://akab.example.net",
                PurgeType::Urls,
                "invalidate",
                "production"
            ),
            "https://akab.example.net/ccu/v3/invalidate/url/production"
        );
    }

    #[test]
    fn tag_purges_use_tag_segment() {
        assert_eq!(
            purge_endpoint(
                "https://akab.example.net/",
                PurgeType::CacheTags,
                "delete",
                "staging"
            ),
            "https://akab.example.net/ccu/v3/delete/tag/staging"
        );
    }

    #[test]
    fn unknown_purge_type_is_rejected() {
        assert_eq!(
            "foo".parse::<PurgeType>(),
            Err(PurgeTypeError("foo".to_string()))
        );
        assert!("URLS".parse::<PurgeType>().is_err());
    }

    #[test]
    fn request_fields_default_when_absent() {
        let request: PurgeRequest =
            serde_json::from_value(json!({ "purgeType": "urls" })).expect("valid request");
        assert_eq!(request.purge_type().expect("known type"), PurgeType::Urls);
        assert!(request.paths.is_empty());
        assert!(!request.post_purge_request);
        assert_eq!(request.action_type, "");
    }

    #[test]
    fn response_keeps_unknown_fields() {
        let body = json!({
            "httpStatus": 201,
            "detail": "Request accepted",
            "estimatedSeconds": 5,
            "purgeId": "edcp-123",
            "supportId": "17PY1"
        });
        let response: PurgeResponse = serde_json::from_value(body.clone()).expect("decodes");
        assert!(response.is_success());
        assert_eq!(response.detail, "Request accepted");
        assert_eq!(serde_json::to_value(&response).expect("encodes"), body);
    }

    #[test]
    fn non_2xx_status_is_not_success() {
        let response = PurgeResponse {
            http_status: 403,
            ..Default::default()
        };
        assert!(!response.is_success());
    }
}
