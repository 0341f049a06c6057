//! Configuration types for the strada framework core.
//!
//! This crate owns everything configuration-shaped: byte-size strings,
//! multipart upload limits, the server environment and its security
//! headers. It deliberately knows nothing about routing or request
//! dispatch; the core crate consumes these types and enforces them.

pub mod error;
pub mod multipart;
pub mod server;
pub mod size;

pub use error::ConfigError;
pub use multipart::{MultipartConfig, UploadStrategy};
pub use server::{Environment, HstsConfig, ServerConfig};
pub use size::{format_bytes, parse_size, SizeInput};
