use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Deferred is already resolved or rejected")]
    AlreadySettled,
    #[error("Producer dropped before settling")]
    ProducerDropped,
    /// The background thread pool could not be started.
    #[error("executor error: {0}")]
    Executor(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
