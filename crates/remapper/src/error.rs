use thiserror::Error;

/// Classification of definition errors.
///
/// Data problems (missing properties, type mismatches, unparsable scalars)
/// never surface here; they evaluate to [`crate::EvalValue::Missing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemapErrorKind {
    UnknownOperation,
    InvalidArgs,
    InvalidPath,
    InvalidTemplate,
    InvalidDefinition,
}

impl RemapErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemapErrorKind::UnknownOperation => "UnknownOperation",
            RemapErrorKind::InvalidArgs => "InvalidArgs",
            RemapErrorKind::InvalidPath => "InvalidPath",
            RemapErrorKind::InvalidTemplate => "InvalidTemplate",
            RemapErrorKind::InvalidDefinition => "InvalidDefinition",
        }
    }
}

impl std::fmt::Display for RemapErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}{}", path_suffix(.path))]
pub struct RemapError {
    pub kind: RemapErrorKind,
    pub message: String,
    pub path: Option<String>,
}

impl RemapError {
    pub fn new(kind: RemapErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
        }
    }

    pub fn unknown_operation(tag: &str) -> Self {
        Self::new(
            RemapErrorKind::UnknownOperation,
            format!("unknown operation: {tag}"),
        )
    }

    pub fn invalid_args(tag: &str, message: impl std::fmt::Display) -> Self {
        Self::new(RemapErrorKind::InvalidArgs, format!("{tag}: {message}"))
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach `path` only when no deeper location was recorded.
    pub fn or_path(self, path: &str) -> Self {
        if self.path.is_some() {
            self
        } else {
            self.with_path(path)
        }
    }
}

fn path_suffix(path: &Option<String>) -> String {
    path.as_ref()
        .map(|p| format!(" (path: {})", p))
        .unwrap_or_default()
}

impl From<serde_yaml::Error> for RemapError {
    fn from(err: serde_yaml::Error) -> Self {
        RemapError::new(
            RemapErrorKind::InvalidDefinition,
            format!("yaml error: {}", err),
        )
    }
}
