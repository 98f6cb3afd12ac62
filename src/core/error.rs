use std::error::Error as StdError;
use std::fmt;

/// Error classes; the scheduler maps each onto a [`Severity`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Internal,
    Usage,
    /// Network, timeout, or server failure. The whole run is retried later.
    Transient,
    /// The user must re-authenticate (empty profile, rejected session).
    UserFacing,
    /// Failure of an optional feature; the stage degrades instead of failing.
    Ignorable,
    Io,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Retry,
    Halt,
    Continue,
}

impl ErrorKind {
    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::UserFacing => Severity::Halt,
            ErrorKind::Ignorable => Severity::Continue,
            ErrorKind::Internal | ErrorKind::Usage | ErrorKind::Transient | ErrorKind::Io => {
                Severity::Retry
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Internal => "Internal",
            ErrorKind::Usage => "Usage",
            ErrorKind::Transient => "Transient",
            ErrorKind::UserFacing => "UserFacing",
            ErrorKind::Ignorable => "Ignorable",
            ErrorKind::Io => "Io",
        }
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    stage: Option<&'static str>,
    url: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            stage: None,
            url: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn stage(&self) -> Option<&'static str> {
        self.stage
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_stage(mut self, stage: &'static str) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Reclassifies the error, keeping message, context, and source.
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(stage) = self.stage {
            write!(f, " (stage: {stage})")?;
        }
        if let Some(url) = &self.url {
            write!(f, " (url: {url})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::Transient => 3,
        ErrorKind::UserFacing => 4,
        ErrorKind::Ignorable => 5,
        ErrorKind::Io => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, Severity, to_exit_code};

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::Usage, 2),
            (ErrorKind::Transient, 3),
            (ErrorKind::UserFacing, 4),
            (ErrorKind::Ignorable, 5),
            (ErrorKind::Io, 6),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn only_user_facing_halts() {
        assert_eq!(ErrorKind::UserFacing.severity(), Severity::Halt);
        assert_eq!(ErrorKind::Ignorable.severity(), Severity::Continue);
        assert_eq!(ErrorKind::Transient.severity(), Severity::Retry);
        assert_eq!(ErrorKind::Io.severity(), Severity::Retry);
    }

    #[test]
    fn display_includes_stage_and_url() {
        let err = Error::new(ErrorKind::Transient)
            .with_message("fetch timed out")
            .with_stage("user")
            .with_url("https://demo.example.org/");
        assert_eq!(
            err.to_string(),
            "Transient: fetch timed out (stage: user) (url: https://demo.example.org/)"
        );
    }
}
