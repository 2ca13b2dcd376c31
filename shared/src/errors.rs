//! Shared error types for the supervisor workspace

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Unknown signal name: {name}")]
    InvalidSignal { name: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
