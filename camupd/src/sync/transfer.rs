use std::{io, path::Path, sync::Arc};

use reqwest::Client;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::io::ReaderStream;
use url::Url;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("transfer limiter is closed")]
    LimiterClosed,
}

/// Streams staged files to upload links.
///
/// Holds a single upload permit: a second submission waits for the first one to
/// finish instead of running alongside it.
#[derive(Clone)]
pub struct TransferClient {
    http: Client,
    upload_limit: Arc<Semaphore>,
}

impl TransferClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            upload_limit: Arc::new(Semaphore::new(1)),
        }
    }

    pub async fn upload_from_path(&self, href: &str, source: &Path) -> Result<(), TransferError> {
        let _permit = self
            .upload_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransferError::LimiterClosed)?;
        let url = Url::parse(href)?;
        let file = tokio::fs::File::open(source).await?;
        let stream = ReaderStream::new(file);
        let body = reqwest::Body::wrap_stream(stream);
        self.http
            .put(url)
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;
    use wiremock::matchers::{body_bytes, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn uploads_file_contents() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/upload"))
            .and(body_bytes(b"payload"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let source = dir.path().join("in.jpg");
        std::fs::write(&source, b"payload").unwrap();

        let client = TransferClient::new();
        client
            .upload_from_path(&format!("{}/upload", server.uri()), &source)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(507))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let source = dir.path().join("in.jpg");
        std::fs::write(&source, b"payload").unwrap();

        let err = TransferClient::new()
            .upload_from_path(&format!("{}/upload", server.uri()), &source)
            .await
            .expect_err("expected upload failure");
        assert!(matches!(err, TransferError::Request(_)));
    }

    #[tokio::test]
    async fn missing_source_is_io_error() {
        let dir = tempdir().unwrap();
        let err = TransferClient::new()
            .upload_from_path("http://127.0.0.1:9/upload", &dir.path().join("gone.jpg"))
            .await
            .expect_err("expected missing source");
        assert!(matches!(err, TransferError::Io(_)));
    }

    #[tokio::test]
    async fn concurrent_submissions_are_serialized() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let source = dir.path().join("in.jpg");
        std::fs::write(&source, b"payload").unwrap();

        let client = TransferClient::new();
        let href = format!("{}/upload", server.uri());
        let started = Instant::now();
        let (a, b) = tokio::join!(
            client.upload_from_path(&href, &source),
            client.upload_from_path(&href, &source)
        );
        a.unwrap();
        b.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(400));
    }
}
