//! Error types for the download engine.

use reqwest::StatusCode;

pub type Result<T> = std::result::Result<T, VodError>;

#[derive(Debug, thiserror::Error)]
pub enum VodError {
    #[error("download cancelled")]
    Cancelled,

    #[error("manifest error: {reason}")]
    Manifest { reason: String },

    #[error("playlist error: {reason}")]
    Playlist { reason: String },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("segment `{uri}` failed after {attempts} attempts: {last_error}")]
    SegmentFetchExhausted {
        uri: String,
        attempts: u32,
        last_error: String,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("insufficient disk space: {reason}")]
    DiskPressure { reason: String },

    #[error("external tool `{tool}` failed (exit code {code:?}): {message}")]
    ExternalTool {
        tool: String,
        code: Option<i32>,
        message: String,
    },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl VodError {
    pub fn manifest(reason: impl Into<String>) -> Self {
        Self::Manifest {
            reason: reason.into(),
        }
    }

    pub fn playlist(reason: impl Into<String>) -> Self {
        Self::Playlist {
            reason: reason.into(),
        }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn disk_pressure(reason: impl Into<String>) -> Self {
        Self::DiskPressure {
            reason: reason.into(),
        }
    }

    pub fn external_tool(
        tool: impl Into<String>,
        code: Option<i32>,
        message: impl Into<String>,
    ) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            code,
            message: message.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether retrying the whole job could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled
            | Self::InvalidUrl { .. }
            | Self::Configuration { .. }
            | Self::Playlist { .. }
            | Self::Internal { .. } => false,
            Self::Manifest { .. }
            | Self::SegmentFetchExhausted { .. }
            | Self::DiskPressure { .. }
            | Self::ExternalTool { .. }
            | Self::Network { .. }
            | Self::Io { .. } => true,
        }
    }
}

/// Failure of a single HTTP fetch, classified for the segment retry loop.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("access forbidden (HTTP {status}) for {url}")]
    Forbidden { status: StatusCode, url: String },

    #[error("request failed with HTTP {status} for {url}")]
    Status { status: StatusCode, url: String },

    #[error("network error: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("transport error: {reason}")]
    Other { reason: String },
}

impl TransportError {
    pub fn from_status(status: StatusCode, url: impl Into<String>) -> Self {
        let url = url.into();
        if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
            Self::Forbidden { status, url }
        } else {
            Self::Status { status, url }
        }
    }

    pub fn other(reason: impl Into<String>) -> Self {
        Self::Other {
            reason: reason.into(),
        }
    }

    /// The platform refuses to serve this resource; retrying it unchanged is pointless.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }
}
