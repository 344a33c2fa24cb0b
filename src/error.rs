use thiserror::Error;

/// Errors that are reported to the caller.
///
/// Prior violations and numerically degenerate parameter values are not
/// errors: they show up as a log density of `f64::NEG_INFINITY`.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CarmaError {
    #[error("time series needs at least {min} distinct timestamps, got {len}")]
    SeriesTooShort { len: usize, min: usize },

    #[error("input columns have different lengths (time: {time}, value: {value}, error: {error})")]
    LengthMismatch {
        time: usize,
        value: usize,
        error: usize,
    },

    #[error("non-finite {what} at index {index}")]
    NonFiniteInput { what: &'static str, index: usize },

    #[error("negative measurement error at index {index}")]
    NegativeError { index: usize },

    #[error("parameter vector has length {found}, expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("sampler has not been started")]
    SamplerNotStarted,

    #[error("sampler has already been started")]
    SamplerAlreadyStarted,

    #[error("sampler already finished all {num_iter} iterations")]
    SamplerFinished { num_iter: u64 },

    #[error("proposal covariance is not positive definite")]
    NotPositiveDefinite,

    #[error("no starting point with finite density after {tries} tries")]
    NoValidStart { tries: usize },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

pub type Result<T> = std::result::Result<T, CarmaError>;

pub(crate) fn check_dim(expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(CarmaError::DimensionMismatch { expected, found });
    }
    Ok(())
}
