//! Download, browse, and cleanup handlers.

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use httpdate::fmt_http_date;
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::storage::UploadRoot;

/// Streams a file's full contents, or the fixed not-found response when the
/// target is missing or a directory. Range requests are an upload-only
/// feature; downloads are always whole-file.
pub(crate) async fn download_file(name: &str, target: &FsPath) -> Result<Response, ApiError> {
    let metadata = match fs::metadata(target).await {
        Ok(metadata) if !metadata.is_dir() => metadata,
        Ok(_) => return Err(ApiError::NotFound("404 error, file not found!\n".into())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("404 error, file not found!\n".into()));
        }
        Err(err) => return Err(ApiError::Internal(err.to_string())),
    };

    let file_size = metadata.len();
    let mime = mime_guess::from_path(name).first_or_octet_stream();

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|_| ApiError::Internal("invalid mime type".into()))?,
    );
    response_headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&file_size.to_string())
            .map_err(|_| ApiError::Internal("header build failed".into()))?,
    );
    if let Ok(modified) = metadata.modified() {
        let value = fmt_http_date(modified);
        response_headers.insert(
            header::LAST_MODIFIED,
            HeaderValue::from_str(&value)
                .map_err(|_| ApiError::Internal("header build failed".into()))?,
        );
    }

    let file = File::open(target)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    info!(name, size = file_size, "download full file");
    let stream = ReaderStream::new(file);
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(stream),
    )
        .into_response())
}

/// Lists the upload root itself.
pub async fn browse_root(
    Extension(root): Extension<Arc<UploadRoot>>,
) -> Result<Response, ApiError> {
    let entries = root.list_dir(None).await?;
    info!(count = entries.len(), "browse root");
    Ok(JsonResponse(entries).into_response())
}

/// Read-only browsing: directories list as JSON, files stream their bytes.
pub async fn browse_entry(
    Path(path): Path<String>,
    Extension(root): Extension<Arc<UploadRoot>>,
) -> Result<Response, ApiError> {
    let target = root.resolve_entry(&path, true).await?;
    if let Ok(metadata) = fs::metadata(&target).await
        && metadata.is_dir()
    {
        let entries = root.list_dir(Some(&path)).await?;
        info!(path, count = entries.len(), "browse directory");
        return Ok(JsonResponse(entries).into_response());
    }
    download_file(&path, &target).await
}

/// Deletes everything under the upload root so callers start from a clean
/// environment. Partial deletion stands if the walk fails midway.
pub async fn cleanup_files(
    Extension(root): Extension<Arc<UploadRoot>>,
) -> Result<Response, ApiError> {
    if let Err(err) = root.purge().await {
        warn!(error = %err, "cleanup walk failed");
        return Err(ApiError::Internal(
            "Found error when cleaning up uploaded files".into(),
        ));
    }
    info!("upload root cleaned");
    Ok(StatusCode::OK.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use tempfile::tempdir;

    fn make_root() -> (tempfile::TempDir, Arc<UploadRoot>) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("upload");
        std::fs::create_dir_all(&root).expect("create upload root");
        (temp, Arc::new(UploadRoot::new(root)))
    }

    async fn body_string(response: Response) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    #[tokio::test]
    async fn missing_file_yields_the_fixed_not_found_body() {
        let (_temp, root) = make_root();
        let target = root.root_path().join("nope.txt");
        let err = download_file("nope.txt", &target)
            .await
            .expect_err("missing file must fail");

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, "404 error, file not found!\n");
    }

    #[tokio::test]
    async fn directory_target_is_not_found() {
        let (_temp, root) = make_root();
        let dir = root.root_path().join("subdir");
        std::fs::create_dir(&dir).expect("mkdir");

        let err = download_file("subdir", &dir)
            .await
            .expect_err("directory must not download");
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn download_streams_exact_contents() {
        let (_temp, root) = make_root();
        let target = root.root_path().join("hello.txt");
        std::fs::write(&target, b"hello filedrop").expect("write");

        let response = download_file("hello.txt", &target).await.expect("download");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_LENGTH).unwrap(),
            "14"
        );
        assert_eq!(body_string(response).await, "hello filedrop");
    }

    #[tokio::test]
    async fn cleanup_handler_empties_root_and_repeats_cleanly() {
        let (_temp, root) = make_root();
        std::fs::write(root.root_path().join("a"), b"1").expect("write a");
        std::fs::write(root.root_path().join("b"), b"2").expect("write b");

        let response = cleanup_files(Extension(root.clone())).await.expect("cleanup");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(root.list_dir(None).await.expect("list").is_empty());
        assert!(root.root_path().is_dir());

        cleanup_files(Extension(root))
            .await
            .expect("cleanup of empty root");
    }

    #[tokio::test]
    async fn browse_lists_directories_and_serves_files() {
        let (_temp, root) = make_root();
        std::fs::create_dir(root.root_path().join("docs")).expect("mkdir");
        std::fs::write(root.root_path().join("docs").join("note.txt"), b"note").expect("write");

        let response = browse_entry(Path("docs".to_string()), Extension(root.clone()))
            .await
            .expect("browse dir");
        assert_eq!(response.status(), StatusCode::OK);
        let listing: serde_json::Value =
            serde_json::from_str(&body_string(response).await).expect("json listing");
        assert_eq!(listing[0]["name"], "note.txt");
        assert_eq!(listing[0]["is_dir"], false);

        let response = browse_entry(Path("docs/note.txt".to_string()), Extension(root))
            .await
            .expect("browse file");
        assert_eq!(body_string(response).await, "note");
    }
}
