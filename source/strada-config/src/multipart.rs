//! Upload limits for the multipart parser.

use serde::Deserialize;

use crate::error::ConfigError;
use crate::size::{parse_size, SizeInput};

/// Buffering discipline applied to file parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStrategy {
    /// Buffer each file fully into memory.
    #[default]
    Memory,
    /// Hand the consumer a chunk stream without materializing the
    /// file. Chunks are forwarded as they are parsed; an undrained
    /// stream buffers in the channel, so the consumer owns the memory
    /// ceiling.
    Stream,
    /// Spool each file to a temp path. The caller cleans the files up.
    Temp,
}

/// Limits enforced incrementally while a multipart body streams in.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartConfig {
    pub max_file_size: u64,
    pub max_field_size: u64,
    pub max_files: usize,
    /// Exact MIME types or `type/*` wildcards. Empty means allow all,
    /// as does a bare `*/*` entry.
    pub allowed_mime_types: Vec<String>,
    pub strategy: UploadStrategy,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            max_field_size: 1024 * 1024,
            max_files: 10,
            allowed_mime_types: Vec::new(),
            strategy: UploadStrategy::default(),
        }
    }
}

/// The serde-facing shape: sizes arrive as numbers or size strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MultipartConfigInput {
    pub max_file_size: Option<SizeInput>,
    pub max_field_size: Option<SizeInput>,
    pub max_files: Option<usize>,
    pub allowed_mime_types: Option<Vec<String>>,
    pub strategy: Option<UploadStrategy>,
}

impl MultipartConfigInput {
    pub fn resolve(self) -> Result<MultipartConfig, ConfigError> {
        let defaults = MultipartConfig::default();

        Ok(MultipartConfig {
            max_file_size: self
                .max_file_size
                .map(|s| parse_size(&s))
                .transpose()?
                .unwrap_or(defaults.max_file_size),
            max_field_size: self
                .max_field_size
                .map(|s| parse_size(&s))
                .transpose()?
                .unwrap_or(defaults.max_field_size),
            max_files: self.max_files.unwrap_or(defaults.max_files),
            allowed_mime_types: self.allowed_mime_types.unwrap_or_default(),
            strategy: self.strategy.unwrap_or_default(),
        })
    }
}
