//! Error types for the scheduler crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("queue index {0} out of range")]
    QueueIndexOutOfRange(usize),
}
