use std::{num::NonZeroU32, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
};
use edgepurge::{
    application::purge::{PurgeApi, PurgeService, VerificationDispatch},
    config::PostPurgeSettings,
    infra::{
        akamai::AkamaiPurgeClient,
        cache_warmer::CacheWarmer,
        http::{PurgeState, build_router},
        signing::{RequestSigner, SignError},
    },
};
use httpmock::{Mock, prelude::*};
use serde_json::json;
use tower::ServiceExt;

struct StaticSigner;

#[async_trait]
impl RequestSigner for StaticSigner {
    async fn sign(&self, request: &mut reqwest::Request) -> Result<(), SignError> {
        request.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("EG1-HMAC-SHA256 signature=fake"),
        );
        Ok(())
    }
}

fn post_purge(delay: Duration) -> PostPurgeSettings {
    let mut headers = HeaderMap::new();
    headers.insert("x-purge-check", HeaderValue::from_static("1"));
    PostPurgeSettings {
        enabled: true,
        delay,
        request_timeout: Duration::from_secs(5),
        concurrency: NonZeroU32::new(2).expect("non-zero"),
        headers,
    }
}

fn router(akamai_host: &str, settings: &PostPurgeSettings) -> Router {
    let api: Arc<dyn PurgeApi> = Arc::new(
        AkamaiPurgeClient::new(Duration::from_secs(5), Arc::new(StaticSigner))
            .expect("purge client builds"),
    );
    let purge = Arc::new(PurgeService::new(akamai_host, api, settings.enabled));
    let verifier: Arc<dyn VerificationDispatch> =
        Arc::new(CacheWarmer::new(settings).expect("warmer builds"));
    build_router(PurgeState { purge, verifier })
}

async fn wait_for_calls(mock: &Mock<'_>, expected: usize) {
    for _ in 0..100 {
        if mock.calls_async().await >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected at least {expected} calls");
}

#[tokio::test]
async fn accepted_purge_triggers_original_and_bypass_requests() {
    let akamai = MockServer::start_async().await;
    akamai
        .mock_async(|when, then| {
            when.method(POST).path("/ccu/v3/invalidate/url/production");
            then.status(201)
                .json_body(json!({ "httpStatus": 201, "detail": "Request accepted" }));
        })
        .await;

    let origin = MockServer::start_async().await;
    let plain = origin
        .mock_async(|when, then| {
            when.method(GET)
                .path("/a")
                .query_param_missing("imbypass")
                .header("x-purge-check", "1");
            then.status(200).body("fresh");
        })
        .await;
    let bypass = origin
        .mock_async(|when, then| {
            when.method(GET)
                .path("/a")
                .query_param("imbypass", "true")
                .header("x-purge-check", "1");
            then.status(200).body("fresh");
        })
        .await;
    let missing = origin
        .mock_async(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        })
        .await;

    let app = router(&akamai.base_url(), &post_purge(Duration::from_millis(10)));
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/purge")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "purgeType": "urls",
                "actionType": "invalidate",
                "environment": "production",
                "paths": [origin.url("/a"), origin.url("/missing")],
                "postPurgeRequest": true
            })
            .to_string(),
        ))
        .expect("request builds");

    let response = app.oneshot(request).await.expect("router responds");
    assert_eq!(response.status(), StatusCode::CREATED);

    wait_for_calls(&plain, 1).await;
    wait_for_calls(&bypass, 1).await;
    wait_for_calls(&missing, 2).await;
}

#[tokio::test]
async fn rejected_purge_does_not_touch_origin() {
    let akamai = MockServer::start_async().await;
    akamai
        .mock_async(|when, then| {
            when.method(POST);
            then.status(400)
                .json_body(json!({ "httpStatus": 400, "detail": "bad environment" }));
        })
        .await;

    let origin = MockServer::start_async().await;
    let page = origin
        .mock_async(|when, then| {
            when.method(GET);
            then.status(200);
        })
        .await;

    let app = router(&akamai.base_url(), &post_purge(Duration::ZERO));
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/purge")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "purgeType": "urls",
                "actionType": "invalidate",
                "environment": "nowhere",
                "paths": [origin.url("/a")],
                "postPurgeRequest": true
            })
            .to_string(),
        ))
        .expect("request builds");

    let response = app.oneshot(request).await.expect("router responds");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    tokio::time::sleep(Duration::from_millis(100)).await;
    page.assert_calls_async(0).await;
}
