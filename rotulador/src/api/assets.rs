//! Image bytes and embedded static files

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::io::ErrorKind;
use tracing::debug;

use crate::{ApiError, ApiResult, AppState};

const STYLE_CSS: &str = include_str!("../../static/style.css");
const ANNOTATE_JS: &str = include_str!("../../static/annotate.js");

/// Public static routes
pub fn static_routes() -> Router<AppState> {
    Router::new()
        .route("/static/style.css", get(serve_style_css))
        .route("/static/annotate.js", get(serve_annotate_js))
}

/// GET /static/style.css
pub async fn serve_style_css() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        STYLE_CSS,
    )
        .into_response()
}

/// GET /static/annotate.js
///
/// Keyboard shortcuts for the annotation form
pub async fn serve_annotate_js() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/javascript")],
        ANNOTATE_JS,
    )
        .into_response()
}

/// GET /asset/:sha256
///
/// Serves an image by content hash. The content type is sniffed from the
/// file's magic bytes since stored names need not carry an extension.
pub async fn serve_asset(
    State(state): State<AppState>,
    Path(sha256): Path<String>,
) -> ApiResult<Response> {
    let image = state
        .images()
        .get(&sha256)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("image {}", sha256)))?;

    let path = state.images_dir.join(&image.filename);
    debug!("serving asset {} from {}", sha256, path.display());

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!(
                "image file {} is missing",
                image.filename
            )))
        }
        Err(e) => return Err(e.into()),
    };

    let content_type = infer::get(&bytes)
        .map(|kind| kind.mime_type())
        .unwrap_or("application/octet-stream");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "private, max-age=86400, immutable"),
        ],
        bytes,
    )
        .into_response())
}
