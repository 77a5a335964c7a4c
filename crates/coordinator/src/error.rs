use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("coordinator backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for CoordinatorError {
    fn from(err: redis::RedisError) -> Self {
        CoordinatorError::Backend(err.to_string())
    }
}
