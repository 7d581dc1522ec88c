//! Upload dispatch and the two transfer-mode writers.
//!
//! `/upload/{file}` supports two modes:
//! 1. streaming (chunked transfer): one request, the whole body copied in
//!    order into a fresh file,
//! 2. multishot: several requests, each placing a `Content-Range` window at
//!    an explicit offset, collectively assembling one file.

use axum::Error as AxumError;
use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_util::stream::StreamExt;
use http_body_util::BodyExt;
use std::io::SeekFrom;
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::files;
use crate::locking::LockManager;
use crate::range::{self, ByteRange};
use crate::storage::UploadRoot;

/// Entry point for `/upload/{file}`: GET downloads, PUT/POST upload, and the
/// presence of a `Content-Range` header selects the transfer mode.
pub async fn file_service(
    Path(file): Path<String>,
    method: Method,
    headers: HeaderMap,
    Extension(root): Extension<Arc<UploadRoot>>,
    Extension(locks): Extension<Arc<LockManager>>,
    body: AxumBody,
) -> Result<Response, ApiError> {
    let target = root.resolve_entry(&file, true).await?;

    if method == Method::GET {
        return files::download_file(&file, &target).await;
    }
    if method != Method::PUT && method != Method::POST {
        return Err(ApiError::MethodNotAllowed);
    }

    match headers.get(header::CONTENT_RANGE) {
        None => Ok(chunked_upload(&target, body).await?.into_response()),
        Some(value) => {
            let (window, length) = parse_upload_window(value, &headers)?;
            // Serialize ranged writes to the same name; an interleaving
            // second uploader waits here instead of racing the seek/write.
            let _guard = locks.lock_name(&file).await;
            Ok(ranged_upload(&target, window, length, body)
                .await?
                .into_response())
        }
    }
}

/// Parses the ranged-mode headers. Any malformed field means no write
/// happens and the caller answers with the severe-error status.
fn parse_upload_window(
    value: &HeaderValue,
    headers: &HeaderMap,
) -> Result<(ByteRange, u64), ApiError> {
    let content_range = value.to_str().map_err(|_| severe_error())?;
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(severe_error)?;

    let window = range::parse_content_range(content_range).map_err(|err| {
        warn!(content_range, ?err, "rejected content range");
        severe_error()
    })?;
    let length = range::parse_transfer_length(content_length).map_err(|err| {
        warn!(content_length, ?err, "rejected transfer length");
        severe_error()
    })?;
    Ok((window, length))
}

fn severe_error() -> ApiError {
    ApiError::Internal("Severe internal error!".into())
}

/// Whole-body streaming upload: create (or truncate) the target, then copy
/// the body in order until exhausted. A mid-stream failure leaves the file
/// truncated; there is no rollback.
async fn chunked_upload(target: &FsPath, body: AxumBody) -> Result<StatusCode, ApiError> {
    let mut file = match File::create(target).await {
        Ok(file) => file,
        Err(err) => {
            warn!(path = ?target, error = %err, "cannot create upload target");
            return Err(ApiError::NotFound(
                "404 error, file cannot be created!\n".into(),
            ));
        }
    };

    let mut stream = BodyExt::into_data_stream(body);
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err: AxumError| ApiError::Internal(err.to_string()))?;
        if chunk.is_empty() {
            continue;
        }
        file.write_all(&chunk)
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    info!(path = ?target, bytes = written, "streamed upload complete");
    Ok(StatusCode::OK)
}

/// One multishot call: place up to `min(end - start + 1, length)` body bytes
/// at the window's offset. 201 when the call brought the file into
/// existence, 200 when it extended an in-progress upload.
async fn ranged_upload(
    target: &FsPath,
    window: ByteRange,
    length: u64,
    body: AxumBody,
) -> Result<StatusCode, ApiError> {
    // Existence decides the response status, so check before any mutation.
    let existed = fs::metadata(target).await.is_ok();
    let bytes_to_go = window.span().min(length);

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(target)
        .await
        .map_err(|err| {
            warn!(path = ?target, error = %err, "failed to open file for writing");
            ApiError::Internal("Failed to open file for writing".into())
        })?;

    // The first chunk of a new upload sequence resets prior content, even
    // if an unrelated file of the same name was left behind.
    if window.start == 0 {
        file.set_len(0)
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
    }

    file.seek(SeekFrom::Start(window.start))
        .await
        .map_err(|err| {
            warn!(path = ?target, start = window.start, error = %err, "seek failed");
            ApiError::Internal("Failed to seek in file for writing".into())
        })?;

    if bytes_to_go > 0 {
        let written = copy_capped(body, &mut file, bytes_to_go).await?;
        if written != bytes_to_go {
            warn!(
                written,
                required = bytes_to_go,
                "failed to write uploaded data"
            );
            return Err(ApiError::Internal("Failed to write uploaded data".into()));
        }
        file.flush()
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
    }

    debug!(
        path = ?target,
        start = window.start,
        end = window.end,
        bytes = bytes_to_go,
        existed,
        "ranged upload chunk written"
    );
    Ok(if existed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    })
}

/// Copies at most `cap` bytes from the body into the file. Surplus body
/// bytes are discarded unread; already-written bytes persist on error.
async fn copy_capped(body: AxumBody, file: &mut File, cap: u64) -> Result<u64, ApiError> {
    let mut stream = BodyExt::into_data_stream(body);
    let mut remaining = cap;
    while remaining > 0 {
        let Some(chunk) = stream.next().await else {
            break;
        };
        let chunk = chunk.map_err(|err: AxumError| ApiError::Internal(err.to_string()))?;
        if chunk.is_empty() {
            continue;
        }
        let take = (chunk.len() as u64).min(remaining) as usize;
        file.write_all(&chunk[..take])
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        remaining -= take as u64;
    }
    Ok(cap - remaining)
}
