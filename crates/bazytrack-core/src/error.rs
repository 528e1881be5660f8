use thiserror::Error;

/// Failures of the tracking lifecycle. A permission denial is a normal
/// state transition, not an error.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// The platform refused to start the tracking service. The status
    /// flag has already been reverted when this is returned.
    #[error("failed to start tracking service: {0}")]
    ServiceStart(String),

    /// The stop request could not be issued.
    #[error("failed to stop tracking service: {0}")]
    ServiceStop(String),
}
