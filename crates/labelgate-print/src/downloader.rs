// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Remote document downloader.
//
// Fetches a PDF over HTTP(S) into the temp store.  Concurrency is bounded by
// a semaphore; callers beyond the limit wait for a permit.  Both the declared
// and the actually streamed size are capped, and any failure removes the
// partial file before the error is returned.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use labelgate_core::config::DownloadConfig;
use labelgate_core::error::{LabelgateError, Result};

use crate::temp::{TempStore, remove_artifact};

/// Parse and check a caller-supplied URL.  Only http and https are fetched.
pub fn parse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| LabelgateError::Validation(format!("invalid URL {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(LabelgateError::Validation(format!(
            "unsupported URL scheme {other:?}"
        ))),
    }
}

/// Bounded-concurrency HTTP downloader writing into a `TempStore`.
#[derive(Clone)]
pub struct Downloader {
    client: Client,
    temp: TempStore,
    slots: Arc<Semaphore>,
    max_bytes: u64,
    timeout: Duration,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("max_bytes", &self.max_bytes)
            .field("timeout", &self.timeout)
            .field("available", &self.slots.available_permits())
            .finish()
    }
}

impl Downloader {
    pub fn new(temp: TempStore, config: &DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("labelgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LabelgateError::Resource(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            temp,
            slots: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
        })
    }

    /// Free download slots right now.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Download `url` to a new temp file and return its path.
    pub async fn download(&self, url: &str) -> Result<PathBuf> {
        let url = parse_url(url)?;
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| LabelgateError::Resource("download slots closed".into()))?;

        self.temp.ensure_dir().await?;
        let path = self.temp.artifact_path("download", "pdf");
        debug!(url = %url, path = %path.display(), "download started");

        let outcome = tokio::time::timeout(self.timeout, self.fetch_into(&url, &path)).await;
        match outcome {
            Ok(Ok(bytes)) => {
                info!(url = %url, bytes, "download complete");
                Ok(path)
            }
            Ok(Err(e)) => {
                remove_artifact(&path).await;
                warn!(url = %url, error = %e, "download failed");
                Err(e)
            }
            Err(_) => {
                remove_artifact(&path).await;
                warn!(url = %url, "download timed out");
                Err(LabelgateError::Timeout(format!(
                    "download of {url} exceeded {}s",
                    self.timeout.as_secs()
                )))
            }
        }
    }

    async fn fetch_into(&self, url: &Url, path: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(LabelgateError::Download(format!(
                "HTTP status {} for {url}",
                status.as_u16()
            )));
        }

        if let Some(declared) = response.content_length()
            && declared > self.max_bytes
        {
            return Err(LabelgateError::Download(format!(
                "declared size {declared} bytes exceeds the {} byte limit",
                self.max_bytes
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !content_type.to_ascii_lowercase().contains("pdf") {
            warn!(url = %url, content_type, "response does not look like a PDF");
        }

        let mut file = tokio::fs::File::create(path).await.map_err(|e| {
            LabelgateError::Resource(format!("create {}: {e}", path.display()))
        })?;

        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(|e| request_error(url, e))? {
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(LabelgateError::Download(format!(
                    "body exceeds the {} byte limit",
                    self.max_bytes
                )));
            }
            file.write_all(&chunk).await.map_err(|e| {
                LabelgateError::Resource(format!("write {}: {e}", path.display()))
            })?;
        }
        file.flush().await?;
        Ok(written)
    }
}

fn request_error(url: &Url, e: reqwest::Error) -> LabelgateError {
    if e.is_timeout() {
        LabelgateError::Timeout(format!("request to {url} timed out"))
    } else {
        LabelgateError::Download(format!("request to {url} failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve_once;

    fn downloader(dir: &Path, max_bytes: u64) -> Downloader {
        let config = DownloadConfig {
            max_bytes,
            ..DownloadConfig::default()
        };
        Downloader::new(TempStore::new(dir), &config).expect("client")
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(true)
    }

    #[tokio::test]
    async fn successful_download_lands_in_temp_dir() {
        let body = b"%PDF-1.4 test document";
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);
        let base = serve_once(response).await;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = downloader(dir.path(), 1024)
            .download(&format!("{base}/doc.pdf"))
            .await
            .expect("download");

        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read(&path).expect("read"), body);
    }

    #[tokio::test]
    async fn not_found_reports_status_and_leaves_nothing() {
        let base = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
        )
        .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let err = downloader(dir.path(), 1024)
            .download(&format!("{base}/doc.pdf"))
            .await
            .expect_err("404");

        assert!(err.to_string().contains("404"));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn oversized_declared_length_is_rejected() {
        let base = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: 20000000\r\nConnection: close\r\n\r\n%PDF"
                .to_vec(),
        )
        .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let err = downloader(dir.path(), 15 * 1024 * 1024)
            .download(&format!("{base}/big.pdf"))
            .await
            .expect_err("too big");

        assert!(err.to_string().contains("exceeds"));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn oversized_stream_is_rejected_and_removed() {
        let mut response =
            b"HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nConnection: close\r\n\r\n"
                .to_vec();
        response.extend_from_slice(&[b'x'; 4096]);
        let base = serve_once(response).await;

        let dir = tempfile::tempdir().expect("tempdir");
        let err = downloader(dir.path(), 1024)
            .download(&format!("{base}/stream.pdf"))
            .await
            .expect_err("too big");

        assert!(matches!(err, LabelgateError::Download(_)));
        assert!(dir_is_empty(dir.path()));
    }

    #[test]
    fn non_http_urls_are_validation_errors() {
        assert!(matches!(
            parse_url("ftp://host/doc.pdf"),
            Err(LabelgateError::Validation(_))
        ));
        assert!(matches!(parse_url("not a url"), Err(LabelgateError::Validation(_))));
        assert!(parse_url("https://example.com/doc.pdf").is_ok());
    }

    #[test]
    fn concurrency_limit_comes_from_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(downloader(dir.path(), 1024).available_slots(), 2);
    }
}
