use mountie_hal::{Action, HalError};
use thiserror::Error;

pub type ConvergeResult<T> = std::result::Result<T, ConvergeError>;

/// Why a convergence action did not complete.
///
/// A no-op is never an error; these only come from an invalid spec or from a
/// backend primitive that was refused or failed.
#[derive(Error, Debug)]
pub enum ConvergeError {
    #[error("Invalid mount spec: {0}")]
    InvalidSpec(String),

    #[error("{backend} backend does not support {action}")]
    UnsupportedOperation { action: Action, backend: String },

    #[error("{action} failed: {source}")]
    BackendExecution {
        action: Action,
        #[source]
        source: HalError,
    },
}

impl ConvergeError {
    pub fn from_hal(action: Action, err: HalError) -> Self {
        match err {
            HalError::Unsupported { backend, .. } => {
                ConvergeError::UnsupportedOperation { action, backend }
            }
            source => ConvergeError::BackendExecution { action, source },
        }
    }

    /// The primitive that was refused or failed, if a backend was involved.
    pub fn action(&self) -> Option<Action> {
        match self {
            ConvergeError::InvalidSpec(_) => None,
            ConvergeError::UnsupportedOperation { action, .. }
            | ConvergeError::BackendExecution { action, .. } => Some(*action),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_is_kept_distinct_from_execution_failure() {
        let err = ConvergeError::from_hal(Action::Remount, HalError::unsupported("fake", "remount"));
        assert!(matches!(err, ConvergeError::UnsupportedOperation { .. }));
        assert_eq!(err.to_string(), "fake backend does not support remount");

        let err = ConvergeError::from_hal(Action::Mount, HalError::DiskBusy);
        assert!(matches!(
            err,
            ConvergeError::BackendExecution {
                source: HalError::DiskBusy,
                ..
            }
        ));
        assert_eq!(err.action(), Some(Action::Mount));
    }
}
