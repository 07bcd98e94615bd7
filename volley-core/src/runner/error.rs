use serde::Serialize;

use crate::protocol::UnsupportedProtocol;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop a scenario before or while it starts. Request failures are
/// never errors; they are recorded as outcomes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`threads` must be at least 1")]
    InvalidThreads,

    #[error("`iterations` must be at least 1")]
    InvalidIterations,

    #[error("`successThreshold` must be between 0 and 100, got {0}")]
    InvalidThreshold(f64),

    #[error("scenario has no requests")]
    NoRequests,

    #[error("request `{request}`: {source}")]
    Protocol {
        request: String,
        #[source]
        source: UnsupportedProtocol,
    },

    #[error("request `{request}` reads unknown data source `{data_source}`")]
    UnknownDataSource { request: String, data_source: String },

    #[error(transparent)]
    Data(#[from] crate::data::Error),

    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("scenario runner already ran; build a new one to run again")]
    AlreadyRan,
}

/// Which of the two ways a scenario can stop early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FailureKind {
    /// The scenario definition is wrong; nothing was sent.
    Configuration,
    /// Setup or execution broke (unreadable data file, crashed worker).
    Fatal,
}

impl Error {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidThreads
            | Self::InvalidIterations
            | Self::InvalidThreshold(_)
            | Self::NoRequests
            | Self::Protocol { .. }
            | Self::UnknownDataSource { .. }
            | Self::Data(crate::data::Error::Duplicate { .. }) => FailureKind::Configuration,
            Self::Data(_) | Self::Worker(_) | Self::AlreadyRan => FailureKind::Fatal,
        }
    }
}
