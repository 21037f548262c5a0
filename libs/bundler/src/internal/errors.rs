use std::fmt::{self, Display};

/// Canonical error type for the orchestration layers (backends, pipeline, CLI).
///
/// Domain failures that callers are expected to inspect (compile failures, AST shape problems,
/// RPC failures) carry their own `thiserror` enums and are folded into this type only once they
/// cross into orchestration code.
#[derive(Debug, Clone)]
pub struct Error {
  message: String,
}

impl Error {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }

  pub fn with_context(context: impl AsRef<str>, cause: impl Display) -> Self {
    let mut message = context.as_ref().to_owned();
    if !message.ends_with(':') {
      message.push(':');
    }
    message.push(' ');
    message.push_str(&cause.to_string());
    Self { message }
  }

  pub fn message(&self) -> &str {
    &self.message
  }
}

impl Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.message)
  }
}

impl std::error::Error for Error {}

/// Result alias bound to [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Annotate an error from `result` with `context`, returning the shared [`Result`] type.
pub fn map_err_with_context<T, E>(
  result: std::result::Result<T, E>,
  context: impl AsRef<str>,
) -> Result<T>
where
  E: Display,
{
  result.map_err(|err| Error::with_context(context, err))
}
