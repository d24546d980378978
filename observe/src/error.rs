//! Error types for the `observe` layer.
use std::error::Error as StdError;
use std::fmt;

const MISSING_PROVIDER: &str = "No pond session in scope. Mount a PondProvider once at the top \
     level of the application and hand its PondContext down:

    let mut provider = PondProvider::builder().on_error(handle_error).build();
    provider.mount(&connector).await?;
    if let Rendered::Children(ctx) = provider.render() {
        let chat = FishObserver::new(&ctx, chat_room, Some(\"lobby\".to_string()))?;
    }
";

/// Top-level error type of the observation adapters.
///
/// Errors from the `pond` client interface are translated into
/// [`ErrorKind`]s that describe what went wrong from the observer's point of
/// view; the original error is kept as `source`.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The session could not be established.
    Connection,
    /// An observer was used without a provided session.
    Configuration,
    /// The runtime refused a command.
    EffectRejected,
    /// A command was dispatched against an identity that is no longer observed.
    StaleDispatch,
    /// A state or command did not match the fish's Rust types.
    Serialization,
}

impl Error {
    pub fn new(error_kind: ErrorKind, message: &str) -> Self {
        Error {
            source: Some(message.to_string().into()),
            error_kind,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error_kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.error_kind {
            ErrorKind::Connection => "connection error",
            ErrorKind::Configuration => "configuration error",
            ErrorKind::EffectRejected => "effect rejected",
            ErrorKind::StaleDispatch => "stale dispatch",
            ErrorKind::Serialization => "serialization error",
        };
        match &self.source {
            Some(source) => write!(f, "Observe {kind}: {source}"),
            None => write!(f, "Observe {kind}"),
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

// Translate client interface errors into the observer's view of them.
impl From<pond::Error> for Error {
    fn from(err: pond::Error) -> Self {
        let error_kind = match err.error_kind {
            pond::ErrorKind::Connection => ErrorKind::Connection,
            pond::ErrorKind::EffectRejected | pond::ErrorKind::Disposed => {
                ErrorKind::EffectRejected
            }
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Serialization,
        }
    }
}

pub(crate) fn missing_provider() -> Error {
    Error::new(ErrorKind::Configuration, MISSING_PROVIDER)
}

pub(crate) fn stale_dispatch(target: &str) -> Error {
    Error::new(
        ErrorKind::StaleDispatch,
        &format!("{target} is no longer observed; dispatch against a torn down fish"),
    )
}
