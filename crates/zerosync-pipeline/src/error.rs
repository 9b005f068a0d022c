use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;
use zerosync_program_input::InputError;

/// Error types for pipeline steps
#[derive(Error, Debug)]
pub enum StepError {
    /// A file the step depends on does not exist
    #[error("Required input {} is missing", .0.display())]
    MissingInput(PathBuf),
    /// The step completed but did not produce a file it declares
    #[error("Expected output {} was not produced", .0.display())]
    MissingOutput(PathBuf),
    /// External tool could not be started
    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// External tool exited unsuccessfully
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    /// External tool did not finish in time and was killed
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    /// Remote artifact could not be fetched
    #[error("Failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// HTTP client could not be configured
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    /// Program input preparation failed
    #[error(transparent)]
    Prepare(#[from] InputError),
    /// Local file operation failed
    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Blocking task panicked or was aborted
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// Pipeline was interrupted by a shutdown signal
    #[error("Cancelled by shutdown signal")]
    Cancelled,
}

impl StepError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
