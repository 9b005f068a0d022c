//! Download of remotely published proof artifacts.

use std::path::Path;
use std::time::Duration;

use backoff::ExponentialBackoff;
use tracing::{debug, info};
use zerosync_program_input::temporary_sibling;

use crate::error::StepError;

/// Default HTTP request timeout
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Give up retrying transient failures after this long
pub const DOWNLOAD_RETRY_WINDOW: Duration = Duration::from_secs(60);

/// HTTP client fetching artifacts into local files, with retry on transient errors
#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
    backoff: ExponentialBackoff,
}

impl Downloader {
    pub fn new(backoff: ExponentialBackoff, request_timeout: Duration) -> Result<Self, StepError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(StepError::HttpClient)?;
        Ok(Self { client, backoff })
    }

    /// Default request timeout and retry window
    pub fn with_defaults() -> Result<Self, StepError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(DOWNLOAD_RETRY_WINDOW),
            ..ExponentialBackoff::default()
        };
        Self::new(backoff, HTTP_REQUEST_TIMEOUT)
    }

    /// Download `url` into `output`, returning the number of bytes written
    ///
    /// The file is replaced only after the whole body has been received.
    pub async fn fetch_to_file(&self, url: &str, output: &Path) -> Result<u64, StepError> {
        info!("Downloading {} ...", url);

        let body = request_with_retry(self.backoff.clone(), || async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .and_then(|res| res.error_for_status())?;
            response.bytes().await
        })
        .await
        .map_err(|source| StepError::Download {
            url: url.to_string(),
            source,
        })?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StepError::io(parent, e))?;
        }

        let tmp = temporary_sibling(output);
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| StepError::io(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, output).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StepError::io(output, e));
        }

        debug!("Saved {} bytes to {}", body.len(), output.display());
        Ok(body.len() as u64)
    }
}

async fn request_with_retry<F, Fut, T>(
    backoff: ExponentialBackoff,
    operation: F,
) -> Result<T, reqwest::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, reqwest::Error>>,
{
    use backoff::{future::retry_notify, Error};

    retry_notify(
        backoff,
        || async {
            match operation().await {
                Ok(result) => Ok(result),
                Err(err) => {
                    if is_retryable_error(&err) {
                        Err(Error::transient(err))
                    } else {
                        Err(Error::permanent(err))
                    }
                }
            }
        },
        |err, duration| {
            info!("Request failed, retrying in {:?}: {}", duration, err);
        },
    )
    .await
}

/// Connection problems, timeouts, server errors and rate limiting are worth retrying
fn is_retryable_error(err: &reqwest::Error) -> bool {
    if err.is_connect() || err.is_timeout() {
        return true;
    }
    match err.status() {
        Some(status) => {
            status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        }
        None => err.is_request() || err.is_body(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn quick_backoff() -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(20),
            max_elapsed_time: Some(Duration::from_millis(500)),
            ..ExponentialBackoff::default()
        }
    }

    fn downloader() -> Downloader {
        Downloader::new(quick_backoff(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_download_binary_artifact() {
        let server = MockServer::start().await;
        let body: Vec<u8> = (0..=255u8).collect();
        Mock::given(method("GET"))
            .and(path("/demo/proofs/latest/aggregated_proof.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("aggregated_proof.bin");
        let url = format!("{}/demo/proofs/latest/aggregated_proof.bin", server.uri());

        let size = downloader()
            .fetch_to_file(&url, &output)
            .await
            .unwrap();
        assert_eq!(size, 256);
        assert_eq!(std::fs::read(&output).unwrap(), body);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("air-public-input.json");
        let url = format!("{}/air-public-input.json", server.uri());

        let err = downloader()
            .fetch_to_file(&url, &output)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Download { .. }));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("air-public-input.json");
        let url = format!("{}/air-public-input.json", server.uri());

        downloader()
            .fetch_to_file(&url, &output)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_failed_download_keeps_previous_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("aggregated_proof.bin");
        std::fs::write(&output, "previous").unwrap();
        let url = format!("{}/aggregated_proof.bin", server.uri());

        let err = downloader()
            .fetch_to_file(&url, &output)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Download { .. }));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "previous");
    }

    #[tokio::test]
    async fn test_request_timeout_is_applied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("air-public-input.json");
        let url = format!("{}/air-public-input.json", server.uri());

        let downloader = Downloader::new(quick_backoff(), Duration::from_millis(100)).unwrap();
        let start = std::time::Instant::now();
        let err = downloader.fetch_to_file(&url, &output).await.unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(3));
        match err {
            StepError::Download { source, .. } => assert!(source.is_timeout()),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!output.exists());
    }
}
