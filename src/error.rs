use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop the requested operation.
///
/// Configuration variants are raised before any network activity.
/// `LocalState` aborts an orchestrator run: once the store cannot be
/// written there is no point in fetching more artifacts.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown domain: {0}")]
    UnknownDomain(String),

    #[error("unknown variable for domain {domain}: {variable}")]
    UnknownVariable { domain: String, variable: String },

    #[error("domain {domain} does not publish a {hour:02}z run")]
    InvalidRunHour { domain: String, hour: u32 },

    #[error("run time {time} is not aligned to the {cadence} cadence of {domain}")]
    UnalignedRunTime {
        domain: String,
        time: String,
        cadence: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("local store error at {path}: {source}")]
    LocalState {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn local_state(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Error::LocalState {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// True for errors caused by the request or the static configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnknownDomain(_)
                | Error::UnknownVariable { .. }
                | Error::InvalidRunHour { .. }
                | Error::UnalignedRunTime { .. }
                | Error::InvalidRequest(_)
                | Error::InvalidConfig(_)
                | Error::Json(_)
                | Error::Url(_)
        )
    }
}

/// Per-artifact retrieval failure. Recorded in the report, never fatal.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("decompression error: {0}")]
    Decompression(String),
}

impl FetchError {
    /// 404s are expected near the edge of a publishing window.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }

    pub(crate) fn transport(url: &str, message: impl ToString) -> Self {
        FetchError::Transport {
            url: url.to_string(),
            message: message.to_string(),
        }
    }
}
