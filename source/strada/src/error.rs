//! The error taxonomy and the JSON envelope every client-visible
//! failure is rendered through.
//!
//! Domain errors (validation, not-found, conflict, ...) carry their
//! HTTP status directly. Internal kinds (`Load`, `Directory`,
//! `Config`, `DoubleInvocation`) never escape raw: the boundary maps
//! them to an INTERNAL_SERVER_ERROR envelope. Multipart `Parse`
//! failures are client-fault input and map to VALIDATION_ERROR.

use std::path::PathBuf;
use std::time::SystemTime;

use http::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use strada_config::ConfigError;

/// Stable wire identifiers for the `type` field of the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthorized,
    Forbidden,
    Conflict,
    InternalServerError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// One schema violation, addressed by dotted field path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub messages: Vec<String>,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            messages: vec![message.into()],
        }
    }
}

/// A route module that failed to load.
#[derive(Debug, Error)]
#[error("failed to load route module {file:?}: {message}")]
pub struct LoadError {
    pub file: PathBuf,
    pub message: String,
}

impl LoadError {
    pub fn new(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("routes directory {0:?} does not exist")]
    NotFound(PathBuf),
    #[error("routes path {0:?} is not a directory")]
    NotADirectory(PathBuf),
    #[error("failed to read routes directory {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Multipart parsing failures, including the limit kind on breaches.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Missing boundary")]
    MissingBoundary,
    #[error("Empty multipart request")]
    EmptyRequest,
    #[error("No valid multipart boundary found")]
    NoValidBoundary,
    #[error("Malformed part header block")]
    MalformedHeaders,
    #[error("Unexpected end of multipart stream")]
    UnexpectedEof,
    #[error("Field '{field}' exceeds the field size limit of {limit} bytes")]
    FieldTooLarge { field: String, limit: u64 },
    #[error("File '{field}' exceeds the file size limit of {limit} bytes")]
    FileTooLarge { field: String, limit: u64 },
    #[error("File count exceeds the limit of {limit}")]
    TooManyFiles { limit: usize },
    #[error("MIME type '{mimetype}' is not allowed for field '{field}'")]
    DisallowedMimeType { field: String, mimetype: String },
    #[error("multipart stream read failed")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{title}")]
    Validation {
        title: String,
        fields: Vec<FieldError>,
        section: String,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("route '{path}' is registered by both '{existing_source}' and '{incoming_source}'")]
    Conflict {
        path: String,
        existing_source: String,
        incoming_source: String,
    },
    #[error("{title}")]
    Internal {
        title: String,
        details: Option<Value>,
        original_message: Option<String>,
    },
    #[error("middleware '{middleware}' invoked its continuation more than once")]
    DoubleInvocation { middleware: String },
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn validation(fields: Vec<FieldError>, section: impl Into<String>) -> Self {
        Error::Validation {
            title: "Request validation failed".to_string(),
            fields,
            section: section.into(),
        }
    }

    pub fn internal(title: impl Into<String>) -> Self {
        Error::Internal {
            title: title.into(),
            details: None,
            original_message: None,
        }
    }

    /// Wrap a raw failure, keeping its message for the server log.
    pub fn wrap(title: impl Into<String>, source: &dyn std::error::Error) -> Self {
        Error::Internal {
            title: title.into(),
            details: None,
            original_message: Some(source.to_string()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } | Error::Parse(_) | Error::Config(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::Internal { .. }
            | Error::DoubleInvocation { .. }
            | Error::Load(_)
            | Error::Directory(_) => ErrorKind::InternalServerError,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.kind().status()
    }

    fn title(&self) -> String {
        match self {
            Error::Validation { title, .. } | Error::Internal { title, .. } => title.clone(),
            Error::Parse(err) => err.to_string(),
            Error::Config(err) => err.to_string(),
            Error::NotFound(msg) | Error::Unauthorized(msg) | Error::Forbidden(msg) => msg.clone(),
            Error::Conflict { .. } => "Route conflict".to_string(),
            // Internal kinds keep their detail out of the client title.
            Error::DoubleInvocation { .. } | Error::Load(_) | Error::Directory(_) => {
                "Internal Server Error".to_string()
            }
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Error::Validation { fields, section, .. } => Some(json!({
                "fields": fields,
                "errorCount": fields.len(),
                "section": section,
            })),
            Error::Conflict {
                path,
                existing_source,
                incoming_source,
            } => Some(json!({
                "path": path,
                "sources": [existing_source, incoming_source],
            })),
            Error::Internal { details, .. } => details.clone(),
            _ => None,
        }
    }

    /// Render the canonical envelope for this error.
    pub fn envelope(&self, correlation_id: &str) -> Value {
        let mut body = json!({
            "type": self.kind().as_str(),
            "title": self.title(),
            "status": self.status().as_u16(),
            "correlationId": correlation_id,
            "timestamp": rfc3339_now(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }
        body
    }
}

pub fn rfc3339_now() -> String {
    humantime::format_rfc3339_millis(SystemTime::now()).to_string()
}

/// Whether a JSON value already carries the canonical error shape.
/// The response validator passes such values through untouched.
pub fn is_error_envelope(value: &Value) -> bool {
    value.get("type").is_some()
        && value.get("status").is_some()
        && value.get("correlationId").is_some()
        && value.get("timestamp").is_some()
}
