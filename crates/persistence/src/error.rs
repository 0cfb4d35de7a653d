//! Persistence errors

use scylla::transport::errors::{NewSessionError, QueryError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<NewSessionError> for PersistenceError {
    fn from(err: NewSessionError) -> Self {
        PersistenceError::Connection(err.to_string())
    }
}

impl From<QueryError> for PersistenceError {
    fn from(err: QueryError) -> Self {
        PersistenceError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::InvalidData(err.to_string())
    }
}

impl From<PersistenceError> for ragchat_core::Error {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(msg) => ragchat_core::Error::NotFound(msg),
            other => ragchat_core::Error::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_core_error() {
        let err: ragchat_core::Error = PersistenceError::Query("timeout".into()).into();
        assert!(matches!(err, ragchat_core::Error::Store(_)));

        let err: ragchat_core::Error = PersistenceError::NotFound("s1".into()).into();
        assert!(matches!(err, ragchat_core::Error::NotFound(_)));
    }
}
