//! strada — a file-system-driven HTTP framework core.
//!
//! Route modules live on disk; a watcher hot-reloads them into a
//! registry with per-file ownership and conflict detection. Requests
//! resolve through a radix matcher into a middleware pipeline with
//! one-shot continuations, schema validators generated from route
//! declarations, and a streaming multipart parser for uploads.
//!
//! The HTTP transport, the concrete validation library, and the
//! module loader are external collaborators; this crate defines their
//! contracts and everything between them.

pub mod app;
pub mod context;
pub mod correlation;
pub mod error;
pub mod multipart;
pub mod pipeline;
pub mod router;
pub mod validation;

pub use app::App;
pub use context::{Context, PathParams, Request, Response};
pub use correlation::{
    correlation_id_from, current_correlation_id, generate_correlation_id, with_correlation_id,
};
pub use error::{Error, ErrorKind, FieldError, LoadError, ParseError};
pub use multipart::{parse_multipart, MultipartData, UploadedFile};
pub use pipeline::error_boundary::ErrorBoundary;
pub use pipeline::{handler_fn, Handler, Middleware, Next, Pipeline};
pub use router::loader::RouteLoader;
pub use router::watcher::{RouteEvents, RouteWatcher, WatchOptions};
pub use router::{Route, RouteMatch, RouteMethod, Router};
pub use validation::{FnSchema, RouteSchema, Schema};

pub use strada_config as config;
