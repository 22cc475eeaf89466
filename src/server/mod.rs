//! HTTP boundary: multipart upload endpoint in front of the batch coordinator.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::info;

use crate::config::Config;
use crate::parallel::BatchCoordinator;

pub(crate) mod errors;
pub mod handlers;

pub use handlers::{HealthResponse, UploadResponse, NO_FILES_MESSAGE, SUCCESS_MESSAGE};

/// State shared by every request.
pub(crate) struct AppState {
    pub(crate) coordinator: BatchCoordinator,
    pub(crate) upload_field: String,
}

/// Axum router wrapper hosting the upload endpoint.
pub struct UploadServer {
    router: Router,
    addr: SocketAddr,
}

impl UploadServer {
    /// Wire the coordinator and middleware from configuration.
    pub fn new(config: &Config) -> Self {
        let state = Arc::new(AppState {
            coordinator: BatchCoordinator::new(config.conversion.clone()),
            upload_field: config.server.upload_field.clone(),
        });

        Self {
            router: build_router(state, config.server.max_body_bytes),
            addr: config.server.socket_addr(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Router with all routes and layers applied.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until the process receives Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or the server terminates unexpectedly.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("Server stopped");
        Ok(())
    }
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/upload", post(handlers::upload))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header::CONTENT_TYPE},
    };
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;

    const BOUNDARY: &str = "fastconvert-test-boundary";

    struct Part<'a> {
        name: &'a str,
        filename: Option<&'a str>,
        body: Vec<u8>,
    }

    fn file(filename: &str, body: Vec<u8>) -> Part<'_> {
        Part {
            name: "files",
            filename: Some(filename),
            body,
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, image::ImageOutputFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn upload_request(parts: Vec<Part<'_>>) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part.filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        part.name, filename
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name)
                        .as_bytes(),
                ),
            }
            body.extend_from_slice(&part.body);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    fn server_in(dir: &TempDir) -> UploadServer {
        let mut config = Config::default();
        config.conversion.upload_dir = dir.path().join("uploads");
        UploadServer::new(&config)
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn upload_returns_ordered_paths() {
        let dir = TempDir::new().unwrap();
        let uploads = dir.path().join("uploads");
        let request = upload_request(vec![file("a.png", png(10, 10)), file("b.png", png(10, 10))]);

        let response = server_in(&dir).router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: UploadResponse = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body.message, SUCCESS_MESSAGE);
        assert_eq!(
            body.results,
            vec![
                uploads.join("a.png.webp").to_string_lossy().into_owned(),
                uploads.join("b.png.webp").to_string_lossy().into_owned(),
            ]
        );
    }

    #[tokio::test]
    async fn upload_without_files_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let request = upload_request(vec![Part {
            name: "comment",
            filename: None,
            body: b"hello".to_vec(),
        }]);

        let response = server_in(&dir).router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, NO_FILES_MESSAGE);
        assert!(!dir.path().join("uploads").exists());
    }

    #[tokio::test]
    async fn empty_file_input_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let request = upload_request(vec![file("", Vec::new())]);

        let response = server_in(&dir).router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, NO_FILES_MESSAGE);
        assert!(!dir.path().join("uploads").exists());
    }

    #[tokio::test]
    async fn upload_keeps_declared_filename() {
        let dir = TempDir::new().unwrap();
        let uploads = dir.path().join("uploads");
        let request = upload_request(vec![file("a.png ", png(3, 3))]);

        let response = server_in(&dir).router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: UploadResponse = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(
            body.results,
            vec![uploads.join("a.png .webp").to_string_lossy().into_owned()]
        );
        assert!(uploads.join("a.png ").exists());
    }

    #[tokio::test]
    async fn upload_ignores_other_file_fields() {
        let dir = TempDir::new().unwrap();
        let request = upload_request(vec![Part {
            name: "attachments",
            filename: Some("a.png"),
            body: png(2, 2),
        }]);

        let response = server_in(&dir).router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn corrupt_upload_is_server_error() {
        let dir = TempDir::new().unwrap();
        let uploads = dir.path().join("uploads");
        let request = upload_request(vec![
            file("a.png", png(10, 10)),
            file("corrupt.png", b"garbage".to_vec()),
        ]);

        let response = server_in(&dir).router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let text = body_text(response).await;
        assert!(text.contains("Decode error"), "{text}");
        assert!(uploads.join("a.png.webp").exists());
        assert!(uploads.join("corrupt.png").exists());
        assert!(!uploads.join("corrupt.png.webp").exists());
    }

    #[tokio::test]
    async fn non_multipart_request_is_rejected() {
        let dir = TempDir::new().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = server_in(&dir).router().oneshot(request).await.unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let dir = TempDir::new().unwrap();
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = server_in(&dir).router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: HealthResponse = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body.status, "ok");
    }
}
