//! Error classification shared by the RPC transport, lookup engine, and DHT API (§7).

use thiserror::Error;

/// The small, closed set of ways a peer interaction or a storage call can fail.
///
/// Transport errors (`Timeout`/`Refused`/`Connection`) are meant to be
/// recovered locally by whoever issued the call: the lookup engine tries the
/// next-best finger, stabilization waits for the next tick. `Schema` and
/// `InvalidArgument` are fatal for the specific call only and never mutate
/// node state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChordError {
    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("connection refused by {0}")]
    Refused(String),

    #[error("connection error reaching {0}")]
    Connection(String),

    #[error("payload failed schema validation: {0}")]
    Schema(String),

    #[error("node is not responsible for this key")]
    NotResponsible,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no responsive peer found: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<tonic::Status> for ChordError {
    fn from(status: tonic::Status) -> Self {
        use tonic::Code;
        match status.code() {
            Code::DeadlineExceeded => ChordError::Timeout(status.message().to_string()),
            Code::Unavailable => ChordError::Refused(status.message().to_string()),
            Code::Cancelled | Code::Aborted => ChordError::Connection(status.message().to_string()),
            Code::InvalidArgument => ChordError::Schema(status.message().to_string()),
            Code::FailedPrecondition => ChordError::NotResponsible,
            _ => ChordError::Internal(status.message().to_string()),
        }
    }
}

impl From<ChordError> for tonic::Status {
    fn from(err: ChordError) -> Self {
        match err {
            ChordError::Timeout(m) => tonic::Status::deadline_exceeded(m),
            ChordError::Refused(m) => tonic::Status::unavailable(m),
            ChordError::Connection(m) => tonic::Status::aborted(m),
            ChordError::Schema(m) => tonic::Status::invalid_argument(m),
            ChordError::NotResponsible => tonic::Status::failed_precondition("not responsible for this key"),
            ChordError::InvalidArgument(m) => tonic::Status::invalid_argument(m),
            ChordError::Unavailable(m) => tonic::Status::unavailable(m),
            ChordError::Internal(m) => tonic::Status::internal(m),
        }
    }
}

impl From<tonic::transport::Error> for ChordError {
    fn from(err: tonic::transport::Error) -> Self {
        ChordError::Connection(err.to_string())
    }
}

pub type ChordResult<T> = Result<T, ChordError>;
