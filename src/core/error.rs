//! PF-000: Translation errors.
//!
//! Every variant is fatal to the translation call that raised it. Non-fatal
//! findings travel as [`crate::core::resolver::Diagnostic`] values instead.

use thiserror::Error;

/// Result type alias for polyflow operations.
pub type Result<T> = std::result::Result<T, TranslateError>;

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error(
        "the tool '{tool}' did not have a container and no container override was specified; \
         pass allow_empty_container to export it without one"
    )]
    MissingContainer { tool: String },

    #[error("couldn't find the input '{selector}' for the InputSelector(\"{selector}\") in tool '{tool}'")]
    UnknownInput { selector: String, tool: String },

    #[error("no inputs table was available when translating input selector '{selector}'")]
    MissingInputTable { selector: String },

    #[error("no input was selected for an input selector")]
    EmptySelector,

    #[error("could not translate expression of type '{kind}' for {backend}")]
    UnsupportedExpression { backend: String, kind: &'static str },

    #[error("CodeTool is not supported for {backend}")]
    UnsupportedCodeTool { backend: String },

    #[error("unknown {kind} '{id}'")]
    UnknownNode { kind: &'static str, id: String },

    #[error("unknown backend '{0}' (expected nextflow, cwl or wdl)")]
    UnknownBackend(String),

    #[error("invalid IR: {0}")]
    InvalidIr(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TranslateError {
    /// Stable error code, printed by the CLI next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingContainer { .. } => "MISSING_CONTAINER",
            Self::UnknownInput { .. } | Self::MissingInputTable { .. } | Self::EmptySelector => {
                "UNRESOLVED_SELECTOR"
            }
            Self::UnsupportedExpression { .. } => "UNSUPPORTED_EXPRESSION",
            Self::UnsupportedCodeTool { .. } => "UNSUPPORTED_CODE_TOOL",
            Self::UnknownNode { .. } => "UNKNOWN_NODE",
            Self::UnknownBackend(_) => "UNKNOWN_BACKEND",
            Self::InvalidIr(_) => "INVALID_IR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Yaml(_) => "YAML_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }
}
