use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use metrics::counter;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    application::{error::ErrorReport, purge::UpstreamReply},
    domain::purge::PurgeRequest,
};

use super::{PurgeState, error::ApiError};

const JSON_CONTENT_TYPE: &str = "application/json";
const RELAY_SOURCE: &str = "infra::http::purge::relay";

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("unsupported content type `{0}`")]
    InvalidContentType(String),
    #[error("request body is not valid json")]
    InvalidBody(#[source] serde_json::Error),
    #[error("request body does not match the purge request shape")]
    InvalidPayload(#[source] serde_json::Error),
}

/// Validate an inbound purge call. The content type has to be exactly
/// `application/json`; the body is only inspected once that holds.
///
/// The body must be a JSON object. Explicit `null` fields read as absent.
pub fn parse_purge_request(headers: &HeaderMap, body: &[u8]) -> Result<PurgeRequest, RequestError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default();
    if content_type != JSON_CONTENT_TYPE {
        return Err(RequestError::InvalidContentType(content_type));
    }

    let value: Value = serde_json::from_slice(body).map_err(RequestError::InvalidBody)?;
    let mut fields: Map<String, Value> =
        serde_json::from_value(value).map_err(RequestError::InvalidPayload)?;
    fields.retain(|_, field| !field.is_null());
    serde_json::from_value(Value::Object(fields)).map_err(RequestError::InvalidPayload)
}

pub(super) async fn purge(
    State(state): State<PurgeState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = parse_purge_request(&headers, &body).map_err(|err| {
        counter!("edgepurge_purge_requests_total", "outcome" => "rejected").increment(1);
        ApiError::from(err)
    })?;
    let outcome = state.purge.forward(request).await?;

    let response = relay_response(outcome.reply);
    if let Some(paths) = outcome.verification {
        state.verifier.dispatch(paths);
    }
    Ok(response)
}

/// Pass the purge API reply through. Non-2xx replies carry a report so the
/// response log names the upstream rejection.
fn relay_response(reply: UpstreamReply) -> Response {
    let diagnostic = (!reply.status.is_success()).then(|| {
        ErrorReport::from_message(
            RELAY_SOURCE,
            reply.status,
            format!(
                "purge api returned {} (httpStatus {}): {}",
                reply.status.as_u16(),
                reply.body.http_status,
                reply.body.detail
            ),
        )
    });

    let mut response = (reply.status, Json(reply.body)).into_response();
    if let Some(report) = diagnostic {
        report.attach(&mut response);
    }
    response
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, StatusCode};

    use crate::domain::purge::PurgeResponse;

    use super::*;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn accepts_well_formed_request() {
        let body = br#"{
            "purgeType": "urls",
            "actionType": "invalidate",
            "environment": "production",
            "paths": ["https://www.example.com/a"],
            "postPurgeRequest": true
        }"#;

        let request = parse_purge_request(&json_headers(), body).expect("valid request");
        assert_eq!(request.purge_type, "urls");
        assert_eq!(request.action_type, "invalidate");
        assert_eq!(request.environment, "production");
        assert_eq!(request.paths, vec!["https://www.example.com/a".to_string()]);
        assert!(request.post_purge_request);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let request = parse_purge_request(&json_headers(), b"{}").expect("valid request");
        assert!(request.paths.is_empty());
        assert!(request.action_type.is_empty());
        assert!(!request.post_purge_request);
    }

    #[test]
    fn content_type_must_match_exactly() {
        for value in ["text/plain", "application/json; charset=utf-8", "APPLICATION/JSON"] {
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(value));
            let err = parse_purge_request(&headers, b"{}").unwrap_err();
            assert!(matches!(err, RequestError::InvalidContentType(_)), "{value}");
        }
    }

    #[test]
    fn missing_content_type_is_rejected_before_the_body() {
        let err = parse_purge_request(&HeaderMap::new(), b"not json").unwrap_err();
        assert!(matches!(err, RequestError::InvalidContentType(ref ct) if ct.is_empty()));
    }

    #[test]
    fn malformed_json_is_invalid_body() {
        let err = parse_purge_request(&json_headers(), b"{\"paths\": [").unwrap_err();
        assert!(matches!(err, RequestError::InvalidBody(_)));
    }

    #[test]
    fn wrong_shape_is_invalid_payload() {
        for body in [
            &br#"{"paths": "https://www.example.com/a"}"#[..],
            br#"{"postPurgeRequest": "yes"}"#,
            br#"["urls"]"#,
        ] {
            let err = parse_purge_request(&json_headers(), body).unwrap_err();
            assert!(matches!(err, RequestError::InvalidPayload(_)));
        }
    }

    #[test]
    fn positional_array_is_invalid_payload() {
        let body = br#"["urls","invalidate","production",["https://x.test/a"],true]"#;
        let err = parse_purge_request(&json_headers(), body).unwrap_err();
        assert!(matches!(err, RequestError::InvalidPayload(_)));

        for scalar in [&b"\"urls\""[..], b"42", b"null", b"true"] {
            let err = parse_purge_request(&json_headers(), scalar).unwrap_err();
            assert!(matches!(err, RequestError::InvalidPayload(_)));
        }
    }

    #[test]
    fn null_fields_read_as_absent() {
        let body = br#"{
            "purgeType": "cache-tags",
            "actionType": null,
            "environment": null,
            "paths": null,
            "postPurgeRequest": null
        }"#;

        let request = parse_purge_request(&json_headers(), body).expect("valid request");
        assert_eq!(request.purge_type, "cache-tags");
        assert!(request.action_type.is_empty());
        assert!(request.environment.is_empty());
        assert!(request.paths.is_empty());
        assert!(!request.post_purge_request);
    }

    #[test]
    fn relayed_rejection_carries_upstream_detail() {
        let reply = UpstreamReply {
            status: StatusCode::FORBIDDEN,
            body: PurgeResponse {
                http_status: 403,
                detail: "Unauthorized arl".to_string(),
                ..Default::default()
            },
        };

        let response = relay_response(reply);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.source, RELAY_SOURCE);
        assert_eq!(
            report.messages,
            vec!["purge api returned 403 (httpStatus 403): Unauthorized arl".to_string()]
        );
    }

    #[test]
    fn accepted_reply_has_no_report() {
        let reply = UpstreamReply {
            status: StatusCode::CREATED,
            body: PurgeResponse {
                http_status: 201,
                detail: "Request accepted".to_string(),
                ..Default::default()
            },
        };

        let response = relay_response(reply);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.extensions().get::<ErrorReport>().is_none());
    }
}
