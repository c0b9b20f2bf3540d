use crate::AppState;
use crate::api::error::AppError;
use crate::services::key_validator::KeyError;
use crate::services::streaming::{ObjectStream, StreamError, StreamWindow};
use crate::utils::validation::validate_object_key;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Deserialize, IntoParams)]
pub struct StreamQuery {
    /// API key authorizing the read
    pub key: Option<String>,
}

static IMAGE_PNG: mime::Mime = mime::IMAGE_PNG;
static IMAGE_JPEG: mime::Mime = mime::IMAGE_JPEG;
static APPLICATION_JSON: mime::Mime = mime::APPLICATION_JSON;
static APPLICATION_OCTET_STREAM: mime::Mime = mime::APPLICATION_OCTET_STREAM;

/// Media type advertised for a served object, by extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("tif") | Some("tiff") => "image/tiff",
        Some("h5") | Some("hdf") | Some("hdf5") | Some("he5") => "application/x-hdf",
        Some("png") => IMAGE_PNG.as_ref(),
        Some("jpg") | Some("jpeg") => IMAGE_JPEG.as_ref(),
        Some("json") | Some("geojson") => APPLICATION_JSON.as_ref(),
        _ => APPLICATION_OCTET_STREAM.as_ref(),
    }
}

#[utoipa::path(
    get,
    path = "/file/{name}",
    params(
        ("name" = String, Path, description = "Object key in the serving bucket"),
        StreamQuery
    ),
    responses(
        (status = 200, description = "Full object"),
        (status = 206, description = "Requested byte range"),
        (status = 400, description = "API key missing or key invalid"),
        (status = 403, description = "Invalid or expired API key"),
        (status = 404, description = "Object not found"),
        (status = 416, description = "Range not satisfiable")
    ),
    tag = "files"
)]
pub async fn stream_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let api_key = query
        .key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            AppError::BadRequest("API key is required as a query parameter".to_string())
        })?;

    validate_object_key(&name).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let owner_id = state.key_validator.validate(&api_key).await.map_err(|e| match e {
        KeyError::Unauthorized => AppError::Forbidden("Invalid or expired API key".to_string()),
        KeyError::Lookup(e) => AppError::Anyhow(e),
    })?;

    let range_header = headers.get(header::RANGE).and_then(|h| h.to_str().ok());

    let object = state
        .streamer
        .stream(&name, range_header)
        .await
        .map_err(|e| match e {
            StreamError::NotFound(_) => AppError::NotFound("File not found".to_string()),
            StreamError::RangeNotSatisfiable { size } => AppError::RangeNotSatisfiable(size),
            StreamError::Storage(e) => {
                tracing::error!("Error streaming {}: {:?}", name, e);
                AppError::Internal("Error streaming file".to_string())
            }
        })?;

    tracing::debug!(
        "Streaming {} to owner {} ({} of {} bytes)",
        name,
        owner_id,
        object.content_length(),
        object.size
    );

    build_response(&name, object)
}

fn build_response(name: &str, object: ObjectStream) -> Result<Response, AppError> {
    let status = match object.window {
        StreamWindow::Full => StatusCode::OK,
        StreamWindow::Partial { .. } => StatusCode::PARTIAL_CONTENT,
    };

    let display_name = name.rsplit('/').next().unwrap_or(name);
    let encoded_filename = utf8_percent_encode(display_name, NON_ALPHANUMERIC).to_string();

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type_for(name))
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, object.content_length())
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename*=UTF-8''{}", encoded_filename),
        );

    if let Some(content_range) = object.content_range() {
        builder = builder.header(header::CONTENT_RANGE, content_range);
    }
    if let Some(e_tag) = &object.e_tag {
        builder = builder.header(header::ETAG, e_tag);
    }
    if let Some(last_modified) = object.last_modified {
        builder = builder.header(
            header::LAST_MODIFIED,
            last_modified
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string(),
        );
    }

    builder
        .body(Body::from_stream(object.body))
        .map_err(|e| AppError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("LC08_B4.TIF"), "image/tiff");
        assert_eq!(content_type_for("scene.h5"), "application/x-hdf");
        assert_eq!(content_type_for("footprint.geojson"), "application/json");
        assert_eq!(content_type_for("preview.PNG"), "image/png");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
