use thiserror::Error;

use haggle_core::ports::CollaboratorError;

pub mod call_record;
pub mod memory;

pub use call_record::SqlCallRecordRepository;
pub use memory::InMemoryCallRecordRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for CollaboratorError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => {
                CollaboratorError::unavailable("call_records", error.to_string())
            }
            RepositoryError::Decode(message) => CollaboratorError::invalid("call_records", message),
        }
    }
}
