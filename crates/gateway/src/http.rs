use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hex::ToHex;
use linkform_token::LinkVerifier;
use serde::Deserialize;
use sha2::Digest;
use tracing::Instrument;
use ulid::Ulid;

use crate::config::{GatewayConfig, StartupError};
use crate::store::{AirtableStore, RecordFields, RecordStore, StoreError};

mod view;

use self::view::resolve_view;

#[derive(Clone)]
pub struct AppState {
    pub(crate) verifier: LinkVerifier,
    pub(crate) store: Arc<dyn RecordStore>,
}

/// Surfaced to callers as a bare status code with no body; `code` and
/// `message` exist for server-side logs only so bad-token and missing-record
/// failures stay indistinguishable on the wire.
struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.status.into_response()
    }
}

fn api_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> ApiError {
    ApiError {
        status,
        code,
        message: message.into(),
    }
}

pub fn router(config: GatewayConfig) -> Result<Router, StartupError> {
    let store = AirtableStore::new(
        config.store_base_url.clone(),
        config.store_api_key.clone(),
        Duration::from_millis(config.store_timeout_ms),
    )
    .map_err(|_| StartupError {
        code: "ERR_STORE_CLIENT",
        message: "failed to initialize record store client".to_string(),
    })?;

    let verifier = LinkVerifier::new(
        &config.app_secret,
        Duration::from_secs(config.token_leeway_secs),
    );

    let state = AppState {
        verifier,
        store: Arc::new(store),
    };

    Ok(Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/save", post(save))
        .route("/api/confirm", post(confirm))
        .route("/{jwt}", get(view_link))
        .with_state(state))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics() -> impl IntoResponse {
    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn view_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(jwt): Path<String>,
) -> Response {
    let request_id = extract_request_id(&headers);
    let span = tracing::info_span!(
        "link.view",
        request_id = %request_id,
        token_hash = %token_hash(&jwt),
        outcome = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );
    let started = Instant::now();

    let result = async {
        let claims = state.verifier.decode(&jwt).map_err(|err| {
            api_error(StatusCode::NOT_FOUND, err.code, err.message)
        })?;

        // Every fetch failure resolves the same not-found view state; the
        // cause is visible only in logs.
        let record = state
            .store
            .find(&claims.base, &claims.table, &claims.record)
            .await
            .map_err(|err| {
                api_error(
                    StatusCode::NOT_FOUND,
                    "ERR_RECORD_FETCH",
                    format!("record fetch failed: {}", err),
                )
            })?;

        Ok(Json(resolve_view(&claims, &record, &jwt)).into_response())
    }
    .instrument(span.clone())
    .await;

    finish_request(span, "/{jwt}", "GET", started, result)
}

#[derive(Debug, Deserialize)]
struct SaveRequest {
    jwt: String,
    #[serde(default)]
    edits: RecordFields,
}

async fn save(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: Result<Json<SaveRequest>, JsonRejection>,
) -> Response {
    let request_id = extract_request_id(&headers);
    let span = tracing::info_span!(
        "link.save",
        request_id = %request_id,
        token_hash = tracing::field::Empty,
        outcome = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );
    let started = Instant::now();

    let result = async {
        let Json(req) = req.map_err(|_| {
            api_error(
                StatusCode::BAD_REQUEST,
                "ERR_INVALID_BODY",
                "invalid JSON body",
            )
        })?;
        tracing::Span::current().record("token_hash", token_hash(&req.jwt).as_str());

        let claims = state.verifier.decode(&req.jwt).map_err(|err| {
            api_error(StatusCode::NOT_FOUND, err.code, err.message)
        })?;

        // A save token must declare its editable fields; one without them
        // cannot permit any write.
        let descriptors = claims.field_descriptors();
        if descriptors.is_empty() {
            return Err(api_error(
                StatusCode::NOT_FOUND,
                "ERR_TOKEN_SHAPE",
                "save token carries no fields claim",
            ));
        }

        let filtered =
            linkform_policy::map_for_write(descriptors, &req.edits).map_err(|err| {
                api_error(StatusCode::BAD_REQUEST, "ERR_VALIDATION", err.to_string())
            })?;

        let write = state
            .store
            .update(&claims.base, &claims.table, &claims.record, filtered)
            .await;

        match write {
            Ok(()) => {
                crate::metrics::observe_record_write("save", "ok");
                Ok("ok".into_response())
            }
            Err(err) => {
                crate::metrics::observe_record_write("save", "error");
                Err(store_write_error("save", err))
            }
        }
    }
    .instrument(span.clone())
    .await;

    finish_request(span, "/api/save", "POST", started, result)
}

#[derive(Debug, Deserialize)]
struct ConfirmRequest {
    jwt: String,
}

async fn confirm(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: Result<Json<ConfirmRequest>, JsonRejection>,
) -> Response {
    let request_id = extract_request_id(&headers);
    let span = tracing::info_span!(
        "link.confirm",
        request_id = %request_id,
        token_hash = tracing::field::Empty,
        outcome = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );
    let started = Instant::now();

    let result = async {
        let Json(req) = req.map_err(|_| {
            api_error(
                StatusCode::BAD_REQUEST,
                "ERR_INVALID_BODY",
                "invalid JSON body",
            )
        })?;
        tracing::Span::current().record("token_hash", token_hash(&req.jwt).as_str());

        let claims = state.verifier.decode(&req.jwt).map_err(|err| {
            api_error(StatusCode::NOT_FOUND, err.code, err.message)
        })?;

        let Some(confirm_field) = claims.confirm_field.as_deref() else {
            return Err(api_error(
                StatusCode::NOT_FOUND,
                "ERR_TOKEN_SHAPE",
                "confirm token carries no confirmField claim",
            ));
        };

        // The only permitted mutation: one fixed field to one fixed value.
        // Repeat confirms write the same value and are idempotent.
        let fields = linkform_policy::confirm_write(confirm_field, claims.confirm_state.as_ref());

        let write = state
            .store
            .update(&claims.base, &claims.table, &claims.record, fields)
            .await;

        match write {
            Ok(()) => {
                crate::metrics::observe_record_write("confirm", "ok");
                Ok("ok".into_response())
            }
            Err(err) => {
                crate::metrics::observe_record_write("confirm", "error");
                Err(store_write_error("confirm", err))
            }
        }
    }
    .instrument(span.clone())
    .await;

    finish_request(span, "/api/confirm", "POST", started, result)
}

fn finish_request(
    span: tracing::Span,
    route: &'static str,
    method: &'static str,
    started: Instant,
    result: Result<Response, ApiError>,
) -> Response {
    let latency = started.elapsed();
    span.record("latency_ms", latency.as_millis() as u64);

    let response = match result {
        Ok(response) => {
            span.record("outcome", "ok");
            response
        }
        Err(err) => {
            span.record("outcome", err.code);
            span.in_scope(|| {
                tracing::warn!(code = err.code, message = %err.message, "request failed");
            });
            err.into_response()
        }
    };

    crate::metrics::observe_http_request(route, method, response.status().as_u16(), latency);
    response
}

fn store_write_error(op: &'static str, err: StoreError) -> ApiError {
    match err {
        StoreError::Timeout => api_error(
            StatusCode::GATEWAY_TIMEOUT,
            "ERR_STORE_TIMEOUT",
            format!("record store timed out during {}", op),
        ),
        StoreError::NotFound => api_error(
            StatusCode::NOT_FOUND,
            "ERR_RECORD_NOT_FOUND",
            format!("record missing during {}", op),
        ),
        err => api_error(
            StatusCode::BAD_GATEWAY,
            "ERR_STORE_WRITE",
            format!("record store {} failed: {}", op, err),
        ),
    }
}

/// Tokens never reach logs raw; spans carry a digest instead.
fn token_hash(token: &str) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().encode_hex::<String>()
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-linkform-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    const MAX_LEN: usize = 64;
    let mut out = String::with_capacity(raw.len().min(MAX_LEN));

    for ch in raw.chars() {
        if out.len() >= MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        }
    }

    (!out.is_empty()).then_some(out)
}
