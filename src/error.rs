use thiserror::Error;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// An error message relayed in-band as a `data: {"error": ...}` record.
    #[error("{0}")]
    Upstream(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("stream ended before the terminal sentinel")]
    TruncatedStream,

    #[error("operation cancelled")]
    Cancelled,

    #[error("image-synthesis response carried no task id")]
    MissingTaskId,

    #[error("task {0} failed upstream")]
    TaskFailed(String),

    #[error("task {0} succeeded without a result url")]
    MissingResultUrl(String),
}
