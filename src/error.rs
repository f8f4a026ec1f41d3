use thiserror::Error;

/// Errors surfaced by the orchestrator (`Native`).
#[derive(Error, Debug)]
pub enum NativeError {
    /// The language is not among the languages available to the application
    #[error("Language {0} is not supported by the application")]
    UnsupportedLanguage(String),
    /// `on`/`off` was called with a label outside the event enumeration
    #[error("'{0}' is not a valid event name")]
    UnknownEvent(String),
    /// `off` was called with a callback that was never registered
    #[error("Callback is not registered for event '{0}'")]
    CallbackNotFound(String),
    /// Precondition failure inside the CDS handler
    #[error(transparent)]
    Cds(#[from] CdsError),
    /// A push/invalidate request did not produce a usable response
    #[error("No response from CDS while {0}")]
    NoResponse(&'static str),
    /// The CDS answered with a body that is not valid JSON
    #[error("Malformed response from CDS: {0}")]
    MalformedResponse(#[from] serde_json::Error),
}

/// Errors the CDS handler returns instead of logging.
///
/// Every network or HTTP failure is logged and converted into an empty
/// result; only configuration preconditions cross this boundary.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CdsError {
    #[error("You need to use `TRANSIFEX_SECRET` when {0}")]
    MissingSecret(&'static str),
}

/// Errors raised while rendering a string.
#[derive(Error, Debug, PartialEq)]
pub enum RenderError {
    #[error("No string to render and no missing policy defined! (Source String: `{0}`)")]
    NothingToRender(String),
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// ICU message formatting failures.
#[derive(Error, Debug, PartialEq)]
pub enum FormatError {
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("Missing value for argument `{0}`")]
    MissingArgument(String),
    #[error("Argument `{0}` is not a number")]
    NotANumber(String),
    #[error("Argument `{0}` has no `other` case")]
    MissingOther(String),
    #[error("Unsupported argument type `{kind}` for `{name}`")]
    UnsupportedType { name: String, kind: String },
}

impl FormatError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        FormatError::Syntax {
            offset,
            message: message.into(),
        }
    }
}
