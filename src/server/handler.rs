//! Request handling
//!
//! # Endpoints
//!
//! * `GET /health` - liveness check
//! * `GET /metrics` - Prometheus metrics (when enabled)
//! * `{upload_path}` - upload endpoint, POST only, bearer token required
//!
//! The upload endpoint answers 403 for a bad or missing token, 405 for any
//! method other than POST, 200 on success and 500 for every other failure.

use super::ServerError;
use crate::auth::{AuthRequest, Authenticator, BearerTokenAuthenticator};
use crate::config::Config;
use crate::envelope;
use crate::metrics;
use crate::upload::{UploadError, UploadOrchestrator, UploadOutcome};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

/// Shared per-server state
pub struct AppState {
    upload_path: String,
    max_body_bytes: usize,
    metrics_enabled: bool,
    authenticator: Box<dyn Authenticator>,
    orchestrator: UploadOrchestrator,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        let orchestrator = UploadOrchestrator::from_config(config)
            .map_err(|e| ServerError::SetupError(e.to_string()))?;

        Ok(Self {
            upload_path: config.server.upload_path.clone(),
            max_body_bytes: config.server.max_body_bytes,
            metrics_enabled: config.metrics.enabled,
            authenticator: Box::new(BearerTokenAuthenticator::new(&config.auth.api_token)),
            orchestrator,
        })
    }

    pub fn upload_path(&self) -> &str {
        &self.upload_path
    }
}

/// Handle one HTTP request
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!(
        "http.request",
        request_id = %request_id,
        http.method = %req.method(),
        http.path = %req.uri().path(),
        http.status_code = tracing::field::Empty
    );

    async move {
        let response = route(req, &state).await;
        tracing::Span::current().record("http.status_code", response.status().as_u16());
        Ok(response)
    }
    .instrument(span)
    .await
}

async fn route<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let path = req.uri().path();

    if path == "/health" && req.method() == Method::GET {
        return json_response(StatusCode::OK, json!({ "status": "ok" }));
    }

    if path == "/metrics" && req.method() == Method::GET && state.metrics_enabled {
        return metrics_response();
    }

    if path == state.upload_path {
        return handle_upload(req, state).await;
    }

    json_response(StatusCode::NOT_FOUND, json!({ "message": "Not Found" }))
}

async fn handle_upload<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    // Token is checked before the method, so a bad token is always 403
    let auth_request = AuthRequest::from_parts(req.method().as_str(), req.uri().path(), req.headers());
    match state.authenticator.authenticate(&auth_request).await {
        Ok(result) => {
            metrics::record_auth_attempt(true);
            tracing::debug!(subject = %result.subject, "Authenticated");
        }
        Err(e) => {
            metrics::record_auth_attempt(false);
            warn!("Rejected upload: {}", e);
            return json_response(StatusCode::FORBIDDEN, json!({ "message": "Unauthorized" }));
        }
    }

    if req.method() != Method::POST {
        return json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({ "message": "Method Not Allowed" }),
        );
    }

    let (parts, body) = req.into_parts();

    let body = match Limited::new(body, state.max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read upload body: {}", e);
            metrics::record_error("body");
            return upload_failed(format!("Failed to read body: {}", e));
        }
    };

    info!(bytes = body.len(), "Upload request received");

    let request = match envelope::parse(&parts.headers, body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed upload request: {}", e);
            metrics::record_error("envelope");
            return upload_failed(e.to_string());
        }
    };

    match state.orchestrator.handle(request).await {
        Ok(UploadOutcome::Complete {
            file_name,
            file_url,
        }) => {
            info!(file_name = %file_name, file_url = %file_url, "Upload complete");
            json_response(
                StatusCode::OK,
                json!({ "message": "File uploaded successfully", "fileUrl": file_url }),
            )
        }
        Ok(UploadOutcome::PartAccepted {
            file_id,
            part_number,
        }) => json_response(
            StatusCode::OK,
            json!({
                "message": format!("Part {} received successfully", part_number),
                "fileId": file_id,
            }),
        ),
        Err(e) => {
            log_upload_error(&e);
            metrics::record_error(e.kind());
            upload_failed(e.to_string())
        }
    }
}

fn log_upload_error(e: &UploadError) {
    if e.is_client_error() {
        warn!(error = %e, "Upload rejected");
    } else {
        error!(error = %e, "Upload failed");
    }
}

fn upload_failed(reason: String) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "message": "Error uploading file", "error": reason }),
    )
}

fn metrics_response() -> Response<Full<Bytes>> {
    match metrics::render() {
        Ok((content_type, body)) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
            response
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "message": "Failed to encode metrics" }),
            )
        }
    }
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
