use crate::model::entity::EntityValidationError;
use crate::session::EngineError;
use thiserror::Error;

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors raised by repositories and units of work.
///
/// `InvalidArgument` and `Validation` are raised before any I/O. Engine
/// failures pass through unchanged as `Engine`.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Validation(#[from] EntityValidationError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// A stored body does not decode into the requested entity type.
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("transaction misuse: {0}")]
    TransactionMisuse(String),
}

impl RepoError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Engine error behind this failure, if any.
    pub fn engine(&self) -> Option<&EngineError> {
        match self {
            Self::Engine(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.engine().is_some_and(EngineError::is_conflict)
    }

    pub fn is_constraint_violation(&self) -> bool {
        self.engine()
            .is_some_and(EngineError::is_constraint_violation)
    }
}
