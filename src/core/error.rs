use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Validation failures raised before any period is simulated.
///
/// Ratio degeneracies (zero investment base, empty series, empty fleet) are not
/// errors; they resolve to sentinel or zero-valued metrics instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid allocation: {0}")]
    InvalidAllocation(String),

    #[error("unknown track '{0}'")]
    UnknownTrack(String),

    #[error("invalid track series: {0}")]
    InvalidTrackSeries(String),

    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("invalid date range: {0}")]
    InvalidRange(String),

    #[error("invalid fee rate: {0}")]
    InvalidFeeRate(String),
}
