//! Docker error mapping
use crate::common::ContainerError;
use bollard::errors::Error as BollardError;

/// Status the engine answers when a start or stop is a no-op
pub const NOT_MODIFIED: u16 = 304;

impl From<BollardError> for ContainerError {
    fn from(e: BollardError) -> Self {
        match e {
            BollardError::DockerResponseServerError {
                status_code: 404,
                message,
            } => ContainerError::NotFound(message),
            BollardError::DockerResponseServerError {
                status_code,
                message,
            } => ContainerError::Api {
                status: status_code,
                message,
            },
            other => ContainerError::Runtime(other.to_string()),
        }
    }
}

/// True when the engine reported the request as already satisfied
pub fn is_not_modified(e: &BollardError) -> bool {
    matches!(
        e,
        BollardError::DockerResponseServerError { status_code, .. } if *status_code == NOT_MODIFIED
    )
}
