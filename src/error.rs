use std::fmt;

use thiserror::Error;

use crate::models::Field;
use crate::state::SessionStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Please enter a valid non-negative number for {0}")]
    InvalidField(Field),
    #[error("Please enter positive values for all parameters.")]
    NonPositiveParameters,
    #[error("no response from server: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded with {status}: {}", .message.as_deref().unwrap_or("Unknown error"))]
    Server { status: u16, message: Option<String> },
    #[error("push channel failed: {0}")]
    PushChannel(String),
    #[error("unexpected response: {0}")]
    Unexpected(String),
    #[error("{0} is unavailable while the simulation is {1}")]
    Unavailable(Operation, SessionStatus),
    #[error("{}", .operation.describe(.source))]
    Failed {
        operation: Operation,
        source: Box<Error>,
    },
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    ConfigIo(String),
    #[error("{0}")]
    ConfigParse(String),
    #[error("unsupported config format '{0}'")]
    UnsupportedConfigFormat(String),
    #[error("{0}")]
    Cli(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn failed(operation: Operation, source: Error) -> Self {
        Error::Failed {
            operation,
            source: Box::new(source),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Start,
    Stop,
    Fetch,
}

impl Operation {
    pub fn describe(self, err: &Error) -> String {
        match (self, err) {
            (_, Error::Failed { source, .. }) => self.describe(source),
            (Operation::Start, Error::InvalidField(_) | Error::NonPositiveParameters) => {
                err.to_string()
            }
            (_, Error::Unavailable(..)) => err.to_string(),
            (Operation::Start, Error::Server { message, .. }) => {
                format!("Error: {}", message.as_deref().unwrap_or("Unknown error"))
            }
            (Operation::Start, Error::Transport(_)) => {
                "Failed to start simulation: No response from server".to_string()
            }
            (Operation::Start, _) => "An unexpected error occurred".to_string(),
            (Operation::Stop, Error::Server { message, .. }) => format!(
                "Failed to stop simulation: {}",
                message.as_deref().unwrap_or("Unknown error")
            ),
            (Operation::Stop, _) => "Failed to stop simulation".to_string(),
            (Operation::Fetch, Error::Server { message, .. }) => format!(
                "Failed to fetch details: {}",
                message.as_deref().unwrap_or("Unknown error")
            ),
            (Operation::Fetch, _) => "Failed to fetch simulation details".to_string(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Start => f.write_str("start"),
            Operation::Stop => f.write_str("stop"),
            Operation::Fetch => f.write_str("fetch"),
        }
    }
}
