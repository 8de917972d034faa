use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::application::{
    error::ErrorReport,
    purge::{ForwardError, PurgeError},
};

use super::purge::RequestError;

const SOURCE: &str = "infra::http::purge";

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: &'static str,
}

/// Client-facing failure: a fixed message for the body, plus the full cause
/// chain for the logs.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(status: StatusCode, message: &'static str, cause: &dyn StdError) -> Self {
        Self {
            status,
            message,
            report: ErrorReport::from_error(SOURCE, status, cause),
        }
    }

    pub fn bad_request(message: &'static str, cause: &dyn StdError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, cause)
    }

    pub fn internal(message: &'static str, cause: &dyn StdError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, cause)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &'static str {
        self.message
    }
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        let message = match &err {
            RequestError::InvalidContentType(_) => "Invalid content type",
            RequestError::InvalidBody(_) => "Invalid JSON body",
            RequestError::InvalidPayload(_) => "Invalid request payload",
        };
        Self::bad_request(message, &err)
    }
}

impl From<PurgeError> for ApiError {
    fn from(err: PurgeError) -> Self {
        match &err {
            PurgeError::InvalidPurgeType(_) => Self::bad_request("Invalid purge type", &err),
            PurgeError::Forward(forward) => {
                let message = match forward {
                    ForwardError::Encode(_) => "Failed to encode payload",
                    ForwardError::Request(_) => "Failed to create request",
                    ForwardError::Sign(_) => "Failed to sign the request with given credentials",
                    ForwardError::Transport(_) => "Failed to communicate with Akamai",
                    ForwardError::Decode(_) => "Failed to decode Akamai response",
                };
                Self::internal(message, forward)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.message,
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}
