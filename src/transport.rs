//! HTTP access for release metadata and installer downloads.

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// A download that stalls this long without a single chunk is abandoned
const DOWNLOAD_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("no data received for {}s", .0.as_secs())]
    Stalled(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` and parse the body as JSON.
    async fn get_json(&self, url: &str) -> Result<serde_json::Value, TransportError>;

    /// Stream `url` into `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, TransportError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    api_timeout: Duration,
    show_progress: bool,
}

impl HttpTransport {
    /// `api_timeout` bounds metadata requests and connection setup; downloads
    /// are bounded by inactivity instead of total time.
    pub fn new(api_timeout: Duration, show_progress: bool) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(api_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(format!("winsetup/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_timeout,
            show_progress,
        })
    }

    fn progress_bar(&self, dest: &Path, total: Option<u64>) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }

        let pb = ProgressBar::new(total.unwrap_or(0));
        let style = ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        pb.set_message(format!("⬇ {}", name));
        Some(pb)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, url: &str) -> Result<serde_json::Value, TransportError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .timeout(self.api_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64, TransportError> {
        let mut response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let pb = self.progress_bar(dest, response.content_length());
        let mut file = fs::File::create(dest).await?;
        let mut downloaded: u64 = 0;

        loop {
            let chunk = tokio::time::timeout(DOWNLOAD_INACTIVITY_TIMEOUT, response.chunk())
                .await
                .map_err(|_| TransportError::Stalled(DOWNLOAD_INACTIVITY_TIMEOUT))??;
            let Some(chunk) = chunk else { break };

            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if let Some(pb) = &pb {
                pb.set_position(downloaded);
            }
        }

        file.flush().await?;

        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }

        tracing::debug!(url, bytes = downloaded, dest = %dest.display(), "download complete");
        Ok(downloaded)
    }
}

/// Lowercase hex SHA-256 of a file
pub async fn sha256_file(path: &Path) -> std::io::Result<String> {
    use sha2::{Digest, Sha256};
    use tokio::io::AsyncReadExt;

    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 8192];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_get_json() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/o/r/releases/latest")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"tag_name": "v1.2.3", "assets": []}"#)
            .create_async()
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5), false).unwrap();
        let url = format!("{}/repos/o/r/releases/latest", server.url());
        let json = transport.get_json(&url).await.unwrap();
        assert_eq!(json["tag_name"], "v1.2.3");
    }

    #[tokio::test]
    async fn test_get_json_http_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5), false).unwrap();
        let err = transport
            .get_json(&format!("{}/missing", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/setup.exe")
            .with_status(200)
            .with_body(b"MZ fake installer".as_slice())
            .create_async()
            .await;

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("setup.exe");
        let transport = HttpTransport::new(Duration::from_secs(5), false).unwrap();
        let bytes = transport
            .download(&format!("{}/setup.exe", server.url()), &dest)
            .await
            .unwrap();

        assert_eq!(bytes, 17);
        assert_eq!(std::fs::read(&dest).unwrap(), b"MZ fake installer");
    }

    #[tokio::test]
    async fn test_sha256_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();

        assert_eq!(
            sha256_file(&path).await.unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
