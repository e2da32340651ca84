//! Capped archive download
//!
//! Module archives are streamed into memory and the transfer is abandoned as
//! soon as the byte count passes the configured limit, so an oversized or
//! malicious response never reaches the decompressor.

use bytes::Bytes;
use deckhand_core::types::StoreConfig;
use futures_util::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Download failures
#[derive(Error, Debug)]
pub enum DownloadError {
    /// The archive is larger than the allowed size
    #[error("Module is too large to download safely (limit {limit} bytes)")]
    TooLarge { limit: u64 },

    /// The server answered with a non-success status
    #[error("Download failed with status: {0}")]
    Status(reqwest::StatusCode),

    /// Transport failure
    #[error("Download failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// HTTP client for module archives
#[derive(Debug, Clone)]
pub struct ArchiveDownloader {
    client: reqwest::Client,
}

impl ArchiveDownloader {
    /// Build a downloader with the store's timeout and user agent
    pub fn new(config: &StoreConfig) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download `url` into memory, aborting once more than `limit` bytes arrive
    pub async fn download_capped(&self, url: &str, limit: u64) -> Result<Bytes, DownloadError> {
        debug!("Downloading module archive from {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status()));
        }

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(declared) = declared {
            if declared > limit {
                debug!("Rejecting {}: declared {} bytes", url, declared);
                return Err(DownloadError::TooLarge { limit });
            }
        }

        let mut buffer = Vec::with_capacity(declared.unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if (buffer.len() + chunk.len()) as u64 > limit {
                debug!("Aborting {}: exceeded {} bytes", url, limit);
                return Err(DownloadError::TooLarge { limit });
            }
            buffer.extend_from_slice(&chunk);
        }

        debug!("Downloaded {} bytes from {}", buffer.len(), url);
        Ok(Bytes::from(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn downloader() -> ArchiveDownloader {
        ArchiveDownloader::new(&StoreConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_download_within_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pkg.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 512]))
            .mount(&server)
            .await;

        let data = downloader()
            .download_capped(&format!("{}/pkg.tgz", server.uri()), 1024)
            .await
            .unwrap();
        assert_eq!(data.len(), 512);
    }

    #[tokio::test]
    async fn test_download_exactly_at_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 1024]))
            .mount(&server)
            .await;

        let data = downloader()
            .download_capped(&server.uri(), 1024)
            .await
            .unwrap();
        assert_eq!(data.len(), 1024);
    }

    #[tokio::test]
    async fn test_download_over_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&server)
            .await;

        let result = downloader().download_capped(&server.uri(), 1024).await;
        assert!(matches!(result, Err(DownloadError::TooLarge { limit: 1024 })));
    }

    /// Answer one request with a chunked body of `size` bytes and no Content-Length
    async fn chunked_server(size: usize) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;

            let mut response =
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_vec();
            for chunk in vec![0u8; size].chunks(256) {
                response.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
                response.extend_from_slice(chunk);
                response.extend_from_slice(b"\r\n");
            }
            response.extend_from_slice(b"0\r\n\r\n");
            let _ = socket.write_all(&response).await;
        });
        format!("http://{}/pkg.tgz", addr)
    }

    #[tokio::test]
    async fn test_chunked_download_over_limit() {
        let url = chunked_server(4096).await;

        let result = downloader().download_capped(&url, 1024).await;
        assert!(matches!(result, Err(DownloadError::TooLarge { limit: 1024 })));
    }

    #[tokio::test]
    async fn test_chunked_download_within_limit() {
        let url = chunked_server(700).await;

        let data = downloader().download_capped(&url, 1024).await.unwrap();
        assert_eq!(data.len(), 700);
    }

    #[tokio::test]
    async fn test_download_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = downloader().download_capped(&server.uri(), 1024).await;
        assert!(matches!(result, Err(DownloadError::Status(s)) if s.as_u16() == 404));
    }
}
