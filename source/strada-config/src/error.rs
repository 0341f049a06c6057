use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, Clone, PartialEq)]
#[error("{message}")]
pub struct ConfigError {
    pub message: String,

    #[help]
    pub help: Option<String>,
}

impl ConfigError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            help: None,
        }
    }

    pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            help: Some(help.into()),
        }
    }
}
