//! HTTP client for file metadata probes and streamed transfers.
//!
//! Bodies are never written to the destination path directly. They are
//! streamed into `<name>.part` beside it and renamed only once the full body
//! has arrived and matches the advertised size, so an interrupted transfer
//! can never leave a truncated file that passes the next size check.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, RETRY_AFTER};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::PART_FILE_SUFFIX;
use super::error::RetrievalError;
use crate::error::TransportError;
use crate::http::{HttpTimeouts, build_http_client};

/// HTTP client used by the retrieval engine.
///
/// Cheap to clone; the underlying reqwest client is reference counted.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use etsi_sync::download::HttpClient;
/// use url::Url;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new()?;
/// let url = Url::parse("http://www.etsi.org/deliver/etsi_ts/121100_121199/121101/11.01.00_60/ts_121101v110100p.pdf")?;
/// let expected = client.remote_size(&url).await?;
/// let bytes = client
///     .download_to_path(&url, Path::new("series_21/ts_121101v110100p.pdf"), expected)
///     .await?;
/// println!("received {bytes} bytes");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with the transfer timeouts (30s connect, 5min total).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeouts(HttpTimeouts::transfer())
    }

    /// Creates a client with explicit timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ClientBuild`] if the HTTP client cannot be built.
    pub fn with_timeouts(timeouts: HttpTimeouts) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_http_client(timeouts, false)?,
        })
    }

    /// Asks the server for the size of `url` without transferring the body.
    ///
    /// Returns `Ok(None)` when the response carries no usable
    /// `Content-Length` header.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on connection failure, timeout or non-2xx status.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn remote_size(&self, url: &Url) -> Result<Option<u64>, TransportError> {
        let response = self.send(self.client.head(url.clone()), url).await?;

        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        debug!(expected_bytes = ?size, "remote size probed");
        Ok(size)
    }

    /// Streams the body of `url` to `destination`, returning the bytes received.
    ///
    /// The body goes to a sibling `.part` file first. It is renamed onto
    /// `destination` when `expected_bytes` is unknown or equals the received
    /// size; otherwise the part file is deleted and
    /// [`RetrievalError::SizeMismatch`] is returned. Any stale part file from
    /// an earlier run is truncated.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Transport`] if the request or body stream
    /// fails, [`RetrievalError::Io`] on file system errors, and
    /// [`RetrievalError::SizeMismatch`] as described above.
    #[instrument(skip(self), fields(url = %url, path = %destination.display()))]
    pub async fn download_to_path(
        &self,
        url: &Url,
        destination: &Path,
        expected_bytes: Option<u64>,
    ) -> Result<u64, RetrievalError> {
        let response = self.send(self.client.get(url.clone()), url).await?;

        let part_path = part_path_for(destination);
        let mut file = File::create(&part_path)
            .await
            .map_err(|e| RetrievalError::io(part_path.clone(), e))?;

        let stream_result = stream_to_file(&mut file, response, url, &part_path).await;
        drop(file);

        let received = match stream_result {
            Ok(received) => received,
            Err(e) => {
                debug!(path = %part_path.display(), "cleaning up part file after error");
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(e);
            }
        };

        if let Some(expected) = expected_bytes {
            if expected != received {
                warn!(
                    expected_bytes = expected,
                    actual_bytes = received,
                    "received body does not match advertised size"
                );
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(RetrievalError::size_mismatch(destination, expected, received));
            }
        }

        if let Err(e) = tokio::fs::rename(&part_path, destination).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(RetrievalError::io(destination, e));
        }

        debug!(bytes = received, "transfer finalised");
        Ok(received)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &Url,
    ) -> Result<reqwest::Response, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(std::string::ToString::to_string);
            return Err(TransportError::http_status_with_retry_after(
                url.as_str(),
                status.as_u16(),
                retry_after,
            ));
        }

        Ok(response)
    }
}

/// Returns the staging path for `destination` (`name.pdf` -> `name.pdf.part`).
#[must_use]
pub fn part_path_for(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map_or_else(OsString::new, std::ffi::OsStr::to_os_string);
    name.push(PART_FILE_SUFFIX);
    destination.with_file_name(name)
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &Url,
    file_path: &Path,
) -> Result<u64, RetrievalError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| TransportError::from_reqwest(url.as_str(), e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| RetrievalError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| RetrievalError::io(file_path, e))?;

    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn url_for(server: &MockServer, route: &str) -> Url {
        Url::parse(&format!("{}{route}", server.uri())).unwrap()
    }

    #[test]
    fn test_part_path_for_appends_suffix() {
        let part = part_path_for(Path::new("/out/series_21/ts_121101v110100p.pdf"));
        assert_eq!(part, PathBuf::from("/out/series_21/ts_121101v110100p.pdf.part"));
    }

    #[tokio::test]
    async fn test_remote_size_reads_content_length() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/doc.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 42]))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let size = client.remote_size(&url_for(&server, "/doc.pdf")).await.unwrap();
        assert_eq!(size, Some(42));
    }

    #[tokio::test]
    async fn test_remote_size_404_is_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/gone.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let result = client.remote_size(&url_for(&server, "/gone.pdf")).await;
        assert_eq!(result.unwrap_err().status(), Some(404));
    }

    #[tokio::test]
    async fn test_download_writes_destination_and_removes_part() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 body".to_vec()))
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("ts_121101v110100p.pdf");
        let client = HttpClient::new().unwrap();

        let bytes = client
            .download_to_path(&url_for(&server, "/doc.pdf"), &destination, Some(13))
            .await
            .unwrap();

        assert_eq!(bytes, 13);
        assert_eq!(std::fs::read(&destination).unwrap(), b"%PDF-1.4 body");
        assert!(!part_path_for(&destination).exists());
    }

    #[tokio::test]
    async fn test_download_unknown_size_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc".to_vec()))
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("doc.pdf");
        let client = HttpClient::new().unwrap();

        let bytes = client
            .download_to_path(&url_for(&server, "/doc.pdf"), &destination, None)
            .await
            .unwrap();
        assert_eq!(bytes, 3);
        assert!(destination.exists());
    }

    #[tokio::test]
    async fn test_download_size_mismatch_leaves_nothing_behind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/short.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"short".to_vec()))
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("short.pdf");
        let client = HttpClient::new().unwrap();

        let result = client
            .download_to_path(&url_for(&server, "/short.pdf"), &destination, Some(100))
            .await;

        assert!(matches!(
            result,
            Err(RetrievalError::SizeMismatch {
                expected_bytes: 100,
                actual_bytes: 5,
                ..
            })
        ));
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert!(entries.is_empty(), "found leftovers: {entries:?}");
    }

    #[tokio::test]
    async fn test_download_404_creates_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("missing.pdf");
        let client = HttpClient::new().unwrap();

        let result = client
            .download_to_path(&url_for(&server, "/missing.pdf"), &destination, None)
            .await;
        assert!(matches!(
            result,
            Err(RetrievalError::Transport(TransportError::HttpStatus { status: 404, .. }))
        ));
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_download_timeout_cleans_up_part_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"data".to_vec())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("slow.pdf");
        let client = HttpClient::with_timeouts(HttpTimeouts {
            connect_secs: 30,
            read_secs: 1,
        })
        .unwrap();

        let result = client
            .download_to_path(&url_for(&server, "/slow.pdf"), &destination, Some(4))
            .await;
        assert!(result.is_err(), "expected timeout or network error");

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert!(
            entries.is_empty(),
            "part file must be cleaned up after stream error, found: {entries:?}"
        );
    }

    #[tokio::test]
    async fn test_stale_part_file_is_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new".to_vec()))
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("doc.pdf");
        std::fs::write(part_path_for(&destination), b"stale leftovers from a killed run").unwrap();

        let client = HttpClient::new().unwrap();
        client
            .download_to_path(&url_for(&server, "/doc.pdf"), &destination, Some(3))
            .await
            .unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"new");
        assert!(!part_path_for(&destination).exists());
    }

    #[test]
    fn test_download_unreachable_host_leaves_no_file() {
        let temp_dir = TempDir::new().unwrap();
        let destination = temp_dir.path().join("doc.pdf");
        let url = Url::parse("http://127.0.0.1:9/doc.pdf").unwrap();

        let client = HttpClient::new().unwrap();
        let result = tokio_test::block_on(client.download_to_path(&url, &destination, None));

        assert!(result.is_err());
        assert!(!destination.exists());
        assert!(!part_path_for(&destination).exists());
    }
}
