use std::io;

use thiserror::Error;

use crate::model::{FileOffset, RefType};

pub type Result<T> = std::result::Result<T, CartaError>;

#[derive(Debug, Error)]
pub enum CartaError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt data: {0}")]
    Corrupt(String),
    #[error("database is not open")]
    NotOpen,
    #[error("no {kind} record at offset {offset}")]
    IndexMiss { kind: RefType, offset: FileOffset },
    #[error("operation aborted")]
    Aborted,
}

impl CartaError {
    /// True when the error was raised by a tripped [`Breaker`](crate::db::Breaker)
    /// rather than by a storage or consistency failure.
    pub fn is_aborted(&self) -> bool {
        matches!(self, CartaError::Aborted)
    }
}
