use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse class of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// The request could not be built; nothing was sent.
    InvalidRequest,
    /// Connecting, writing or reading failed.
    Transport,
    Timeout,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url `{0}`")]
    InvalidUrl(String),

    #[error("unsupported scheme in `{0}` (expected http:// or https://)")]
    UnsupportedScheme(String),

    #[error("invalid header `{0}`")]
    InvalidHeader(String),

    #[error("cannot build request: {0}")]
    Build(#[from] http::Error),

    #[error("request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("response body: {0}")]
    Body(#[from] hyper::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl(_)
            | Self::UnsupportedScheme(_)
            | Self::InvalidHeader(_)
            | Self::Build(_) => ErrorKind::InvalidRequest,
            Self::Transport(_) | Self::Body(_) => ErrorKind::Transport,
            Self::Timeout(_) => ErrorKind::Timeout,
        }
    }
}
