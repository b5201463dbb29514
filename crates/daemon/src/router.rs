//! HTTP router exposing the gateway operations.
//!
//! Every route except `/healthz` requires the `X-API-Key` header. Failures are
//! rendered as `{"ok": false, "code", "detail"}` with a stable [`ErrorCode`].

use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Query, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Form, Json, Router};
use futures_util::TryStreamExt;
use protocol::messages::{
    upload_fields, DeleteDirQuery, DeleteDirResponse, DeleteFileResponse, ErrorBody, ErrorCode,
    HealthResponse, ListQuery, ListResponse, MkdirForm, MkdirResponse, RemotePathQuery,
    UploadResponse,
};
use protocol::API_KEY_HEADER;
use sha2::{Digest, Sha256};
use tokio_util::io::StreamReader;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::files::remote::{RemoteEntry, SessionConnector};
use crate::gateway::Gateway;

/// Result type for HTTP handlers.
pub type RouterResult<T> = Result<T, RouterError>;

/// Errors surfaced by the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// A gateway operation failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The API key was missing or wrong.
    #[error("Invalid API key")]
    Unauthorized,

    /// The request could not be parsed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RouterError {
    /// Status, stable code and caller-facing detail for this error.
    pub fn classify(&self) -> (StatusCode, ErrorCode, String) {
        match self {
            RouterError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorCode::Unauthorized,
                "Invalid API key".to_string(),
            ),
            RouterError::InvalidRequest(reason) => {
                (StatusCode::BAD_REQUEST, ErrorCode::InvalidRequest, reason.clone())
            }
            RouterError::Gateway(err) => match err {
                GatewayError::OutsideRoot(_) => (
                    StatusCode::BAD_REQUEST,
                    ErrorCode::OutsideRoot,
                    "path outside confined root".to_string(),
                ),
                GatewayError::ProtectedPath(_) => (
                    StatusCode::BAD_REQUEST,
                    ErrorCode::ProtectedPath,
                    "cannot delete confinement root".to_string(),
                ),
                GatewayError::NotFound(_) => (
                    StatusCode::NOT_FOUND,
                    ErrorCode::NotFound,
                    "does not exist".to_string(),
                ),
                GatewayError::InvalidTarget { reason, .. } => {
                    (StatusCode::BAD_REQUEST, ErrorCode::InvalidTarget, reason.to_string())
                }
                GatewayError::DirectoryNotEmpty(_) => (
                    StatusCode::BAD_REQUEST,
                    ErrorCode::DirectoryNotEmpty,
                    "directory not empty (use recursive=true)".to_string(),
                ),
                GatewayError::TreeTooDeep { limit, .. } => (
                    StatusCode::BAD_REQUEST,
                    ErrorCode::TreeTooDeep,
                    format!("directory tree deeper than {limit} levels"),
                ),
                GatewayError::Inbound(e) => (
                    StatusCode::BAD_REQUEST,
                    ErrorCode::InvalidRequest,
                    format!("upload body failed: {e}"),
                ),
                GatewayError::Remote { source, .. } => (
                    StatusCode::BAD_GATEWAY,
                    ErrorCode::RemoteFailure,
                    source.to_string(),
                ),
            },
        }
    }
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        let (status, code, detail) = self.classify();
        if status.is_server_error() {
            warn!(error = %self, "Request failed");
        } else {
            debug!(error = %self, "Request rejected");
        }
        (status, Json(ErrorBody::new(code, detail))).into_response()
    }
}

fn invalid_request(err: impl std::fmt::Display) -> RouterError {
    RouterError::InvalidRequest(err.to_string())
}

/// Shared state of all handlers.
pub struct AppState<C: SessionConnector> {
    gateway: Gateway<C>,
    api_key_digest: Vec<u8>,
}

impl<C: SessionConnector> AppState<C> {
    /// Wrap a gateway, requiring `api_key` on protected routes.
    pub fn new(gateway: Gateway<C>, api_key: &str) -> Self {
        Self {
            gateway,
            api_key_digest: Sha256::digest(api_key.as_bytes()).to_vec(),
        }
    }

    /// The wrapped gateway.
    pub fn gateway(&self) -> &Gateway<C> {
        &self.gateway
    }

    fn accepts(&self, provided: &[u8]) -> bool {
        Sha256::digest(provided).as_slice() == self.api_key_digest.as_slice()
    }
}

/// Build the HTTP router.
///
/// `max_upload_size` bounds request bodies in bytes; `0` removes the limit.
pub fn build_router<C: SessionConnector>(state: Arc<AppState<C>>, max_upload_size: u64) -> Router {
    let body_limit = if max_upload_size == 0 {
        DefaultBodyLimit::disable()
    } else {
        DefaultBodyLimit::max(usize::try_from(max_upload_size).unwrap_or(usize::MAX))
    };

    let protected = Router::new()
        .route("/list", get(list::<C>))
        .route("/mkdir", post(mkdir::<C>))
        .route("/upload", post(upload::<C>))
        .route("/download", get(download::<C>))
        .route("/delete-file", delete(delete_file::<C>))
        .route("/delete-dir", delete(delete_dir::<C>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key::<C>,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(protected)
        .layer(body_limit)
        .layer(middleware::from_fn(request_span))
        .with_state(state)
}

async fn request_span(request: Request, next: Next) -> Response {
    let span = info_span!(
        "request",
        id = %Uuid::new_v4(),
        method = %request.method(),
        op = %request.uri().path(),
    );
    next.run(request).instrument(span).await
}

async fn require_api_key<C: SessionConnector>(
    State(state): State<Arc<AppState<C>>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(API_KEY_HEADER)
        .map(|value| state.accepts(value.as_bytes()))
        .unwrap_or(false);

    if !authorized {
        warn!("Rejected request with missing or invalid API key");
        return RouterError::Unauthorized.into_response();
    }
    next.run(request).await
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

async fn list<C: SessionConnector>(
    State(state): State<Arc<AppState<C>>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> RouterResult<Json<ListResponse>> {
    let Query(query) = query.map_err(invalid_request)?;
    let listing = state.gateway.list(&query.path).await?;

    Ok(Json(ListResponse {
        ok: true,
        path: listing.path,
        items: listing.entries.iter().map(RemoteEntry::to_protocol).collect(),
    }))
}

async fn mkdir<C: SessionConnector>(
    State(state): State<Arc<AppState<C>>>,
    form: Result<Form<MkdirForm>, FormRejection>,
) -> RouterResult<Json<MkdirResponse>> {
    let Form(form) = form.map_err(invalid_request)?;
    let created = state.gateway.make_directory(&form.path).await?;

    Ok(Json(MkdirResponse { ok: true, created }))
}

fn multipart_error(err: MultipartError) -> RouterError {
    RouterError::InvalidRequest(err.body_text())
}

async fn upload<C: SessionConnector>(
    State(state): State<Arc<AppState<C>>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> RouterResult<Json<UploadResponse>> {
    let mut multipart = multipart.map_err(invalid_request)?;

    // The target path must arrive before the file body so the body can be
    // streamed straight to the remote side.
    let remote_path = match multipart.next_field().await.map_err(multipart_error)? {
        Some(field) if field.name() == Some(upload_fields::REMOTE_PATH) => {
            field.text().await.map_err(multipart_error)?
        }
        _ => {
            return Err(RouterError::InvalidRequest(format!(
                "first multipart field must be '{}'",
                upload_fields::REMOTE_PATH
            )))
        }
    };

    let field = match multipart.next_field().await.map_err(multipart_error)? {
        Some(field) if field.name() == Some(upload_fields::FILE) => field,
        _ => {
            return Err(RouterError::InvalidRequest(format!(
                "missing multipart field '{}'",
                upload_fields::FILE
            )))
        }
    };

    let reader = StreamReader::new(field.map_err(|e| io::Error::other(e.body_text())));
    tokio::pin!(reader);

    let (path, bytes_written) = state.gateway.upload(&remote_path, &mut reader).await?;

    Ok(Json(UploadResponse {
        ok: true,
        path,
        bytes_written,
    }))
}

/// `Content-Disposition` for a download.
///
/// Names outside printable ASCII get an ASCII `filename` with `_` in place of
/// each offending character, plus the exact name as an RFC 5987
/// `filename*`.
fn content_disposition(file_name: &str) -> HeaderValue {
    let mut fallback = String::with_capacity(file_name.len());
    let mut exact = true;
    for c in file_name.chars() {
        match c {
            '"' | '\\' => {
                fallback.push('\\');
                fallback.push(c);
            }
            ' '..='~' => fallback.push(c),
            _ => {
                fallback.push('_');
                exact = false;
            }
        }
    }

    let value = if exact {
        format!("attachment; filename=\"{fallback}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            percent_encode(file_name)
        )
    };
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Percent-encode every byte that is not an RFC 5987 `attr-char`.
fn percent_encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'!'
            | b'#'
            | b'$'
            | b'&'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~' => encoded.push(char::from(byte)),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

async fn download<C: SessionConnector>(
    State(state): State<Arc<AppState<C>>>,
    query: Result<Query<RemotePathQuery>, QueryRejection>,
) -> RouterResult<Response> {
    let Query(query) = query.map_err(invalid_request)?;
    let download = state.gateway.download(&query.remote_path).await?;

    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        ),
        (
            header::CONTENT_DISPOSITION,
            content_disposition(&download.file_name),
        ),
    ];
    Ok((headers, Body::from_stream(download.stream)).into_response())
}

async fn delete_file<C: SessionConnector>(
    State(state): State<Arc<AppState<C>>>,
    query: Result<Query<RemotePathQuery>, QueryRejection>,
) -> RouterResult<Json<DeleteFileResponse>> {
    let Query(query) = query.map_err(invalid_request)?;
    let deleted = state.gateway.delete_file(&query.remote_path).await?;

    Ok(Json(DeleteFileResponse { ok: true, deleted }))
}

async fn delete_dir<C: SessionConnector>(
    State(state): State<Arc<AppState<C>>>,
    query: Result<Query<DeleteDirQuery>, QueryRejection>,
) -> RouterResult<Json<DeleteDirResponse>> {
    let Query(query) = query.map_err(invalid_request)?;
    let removal = state
        .gateway
        .delete_directory(&query.remote_path, query.recursive)
        .await?;

    Ok(Json(DeleteDirResponse {
        ok: true,
        deleted: removal.path,
        recursive: removal.recursive,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::confinement::ConfinementError;
    use crate::files::remote::RemoteError;

    #[test]
    fn test_classify_gateway_errors() {
        let cases = [
            (
                GatewayError::OutsideRoot(ConfinementError::OutsideRoot("..".to_string())),
                StatusCode::BAD_REQUEST,
                ErrorCode::OutsideRoot,
            ),
            (
                GatewayError::ProtectedPath("/srv".to_string()),
                StatusCode::BAD_REQUEST,
                ErrorCode::ProtectedPath,
            ),
            (
                GatewayError::NotFound("/srv/x".to_string()),
                StatusCode::NOT_FOUND,
                ErrorCode::NotFound,
            ),
            (
                GatewayError::DirectoryNotEmpty("/srv/d".to_string()),
                StatusCode::BAD_REQUEST,
                ErrorCode::DirectoryNotEmpty,
            ),
            (
                GatewayError::TreeTooDeep {
                    path: "/srv/d".to_string(),
                    limit: 4,
                },
                StatusCode::BAD_REQUEST,
                ErrorCode::TreeTooDeep,
            ),
            (
                GatewayError::remote("/srv/x", RemoteError::Connection("refused".to_string())),
                StatusCode::BAD_GATEWAY,
                ErrorCode::RemoteFailure,
            ),
        ];

        for (err, status, code) in cases {
            let (got_status, got_code, _) = RouterError::from(err).classify();
            assert_eq!(got_status, status);
            assert_eq!(got_code, code);
        }
    }

    #[test]
    fn test_invalid_target_detail_is_reason() {
        let err = RouterError::from(GatewayError::invalid_target("/srv/a/", "no trailing /"));
        let (_, _, detail) = err.classify();
        assert_eq!(detail, "no trailing /");
    }

    #[test]
    fn test_content_disposition_escapes_quotes() {
        let value = content_disposition("a\"b.txt");
        assert_eq!(value.to_str().unwrap(), "attachment; filename=\"a\\\"b.txt\"");
    }

    #[test]
    fn test_content_disposition_non_ascii_adds_encoded_name() {
        let value = content_disposition("r\u{e9}sum\u{e9}.pdf");
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"r_sum_.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"
        );
    }

    #[test]
    fn test_content_disposition_control_characters() {
        let value = content_disposition("a\tb \"c\".txt");
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"a_b \\\"c\\\".txt\"; filename*=UTF-8''a%09b%20%22c%22.txt"
        );
    }

    #[test]
    fn test_percent_encode_keeps_attr_chars() {
        assert_eq!(percent_encode("Report-2024_v1.0~final"), "Report-2024_v1.0~final");
        assert_eq!(percent_encode("a b/c%"), "a%20b%2Fc%25");
    }

    #[test]
    fn test_api_key_digest_comparison() {
        let state = AppState::new(
            Gateway::new(
                crate::gateway::GatewayConfig::new("/srv"),
                crate::backend::LocalConnector::new(),
            ),
            "secret",
        );
        assert!(state.accepts(b"secret"));
        assert!(!state.accepts(b"secret "));
        assert!(!state.accepts(b""));
    }
}
