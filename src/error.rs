use std::{error::Error as StdError, fmt};

/// Convenience alias for results returned by constructors and configuration
/// methods in this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error returned synchronously when constructing or configuring one of the
/// primitives, pools or jobs in this crate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// An argument was outside of its permitted range.
    InvalidArgument(String),

    /// A cron expression could not be parsed.
    InvalidExpression(String),

    /// A cron job was scheduled while its timer loop was already running.
    AlreadyScheduled,

    /// The global thread pool was configured after it had been initialized.
    GlobalAlreadyInitialized,
}

impl Error {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub(crate) fn invalid_expression(message: impl Into<String>) -> Self {
        Error::InvalidExpression(message.into())
    }
}

impl StdError for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(message) => write!(f, "invalid argument: {}", message),
            Error::InvalidExpression(message) => write!(f, "invalid cron expression: {}", message),
            Error::AlreadyScheduled => f.write_str("cron job is already scheduled"),
            Error::GlobalAlreadyInitialized => f.write_str("global thread pool already initialized"),
        }
    }
}

/// The reason a [`Future`](crate::Future) resolved to the failed state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskError {
    /// The task was submitted to a pool that had already been shut down.
    Rejected,

    /// The task was dropped before it could run, either because the pool was
    /// forcibly shut down or because its promise was dropped unfulfilled.
    Discarded,

    /// The task panicked. Contains the panic message, if it had one.
    Panicked(String),

    /// The task was explicitly failed through its [`Promise`](crate::Promise).
    Failed(String),
}

impl StdError for TaskError {}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Rejected => f.write_str("pool is shut down"),
            TaskError::Discarded => f.write_str("task was discarded before it could run"),
            TaskError::Panicked(message) => write!(f, "task panicked: {}", message),
            TaskError::Failed(message) => f.write_str(message),
        }
    }
}
