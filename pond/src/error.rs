//! Error types for the `pond` client interface.

use std::error::Error as StdError;
use std::fmt;

/// Error reported by a runtime implementation.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Kinds of failures a runtime can report across the client interface.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// No session could be established (runtime not reachable, manifest refused).
    Connection,
    /// The runtime refused to apply a command.
    EffectRejected,
    /// The session has been disposed.
    Disposed,
}

impl Error {
    pub fn new(error_kind: ErrorKind, message: &str) -> Self {
        Error {
            source: Some(message.to_string().into()),
            error_kind,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Pond error ({:?}): {source}", self.error_kind),
            None => write!(f, "Pond error ({:?})", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}
