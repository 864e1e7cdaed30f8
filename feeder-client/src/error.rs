use feeder_proto::types::TimeError;
use thiserror::Error;

/// Failures surfaced to callers before any network activity. Transport
/// errors during a command cycle are logged and swallowed instead, so a
/// failed exchange never reaches the invoking flow.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("feeder not discovered yet")]
    NotReady,
    #[error(transparent)]
    InvalidArgument(#[from] TimeError),
}
