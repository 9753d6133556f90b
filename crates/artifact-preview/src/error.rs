use crate::parser::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Why the preview cannot show the component for the current source.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreviewError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl PreviewError {
    /// Heading of the diagnostic panel that shows this error.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Compile(_) | Self::Validation(_) => "Compilation Error",
            Self::Runtime(_) => "Runtime Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// The component source is not in the supported dialect.
    #[error("{report}")]
    Parse {
        diagnostics: Vec<Diagnostic>,
        report: String,
    },
    /// The source parsed but uses a construct the transformer refuses.
    #[error("{report}")]
    Transform {
        diagnostics: Vec<Diagnostic>,
        report: String,
    },
    /// The generated text could not be turned into an executable unit.
    #[error("Generated code is not executable:\n{report}")]
    Construct {
        diagnostics: Vec<Diagnostic>,
        report: String,
    },
    #[error("The default export is assigned {count} times")]
    DuplicateExport { count: usize },
}

impl CompileError {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Parse { diagnostics, .. }
            | Self::Transform { diagnostics, .. }
            | Self::Construct { diagnostics, .. } => diagnostics,
            Self::DuplicateExport { .. } => &[],
        }
    }
}

/// Error thrown while evaluating sandboxed code, during construction or render.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct RuntimeError {
    pub name: String,
    pub message: String,
}

impl RuntimeError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn reference(identifier: &str) -> Self {
        Self::new("ReferenceError", format!("{identifier} is not defined"))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::new("RangeError", message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn not_a_component(found: &str) -> Self {
        Self {
            message: format!("The code did not produce a valid component (found {found})."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Capability '{name}' is provided by both '{first}' and '{second}'")]
    Collision {
        name: String,
        first: String,
        second: String,
    },
    #[error("'{name}' is not a valid capability name")]
    InvalidName { name: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_titles() {
        let runtime = PreviewError::from(RuntimeError::reference("Missing"));
        assert_eq!(runtime.title(), "Runtime Error");
        assert_eq!(runtime.to_string(), "ReferenceError: Missing is not defined");

        let validation = PreviewError::from(ValidationError::not_a_component("number"));
        assert_eq!(validation.title(), "Compilation Error");

        let compile = PreviewError::from(CompileError::DuplicateExport { count: 2 });
        assert_eq!(compile.title(), "Compilation Error");
    }
}
