//! Streaming `multipart/form-data` parsing.
//!
//! The parser consumes the request body as a chunk stream and never
//! buffers the whole request. File parts are materialized according
//! to the configured [`UploadStrategy`]: fully in memory, as a chunk
//! stream, or spooled to a temp path. Limits are enforced while bytes
//! arrive, so an oversized part fails before later parts are read.
//!
//! Wildcard MIME allowances support `type/*`; a bare `*/*` entry is
//! treated the same as an empty allow-list (everything passes).

mod parser;

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use bytes::Bytes;
use futures_util::Stream;
use serde_json::{json, Value};
use tokio::sync::mpsc;

pub use parser::parse_multipart;
pub use strada_config::{MultipartConfig, UploadStrategy};

/// Body chunks of a file part delivered under the `stream` strategy.
/// Chunks arrive in network order while the request is still being
/// parsed; an undrained stream buffers its chunks in the channel.
pub struct FileStream {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl FileStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Bytes>) -> Self {
        Self { rx }
    }

    /// Drain the remaining chunks into one buffer.
    pub async fn collect(mut self) -> Bytes {
        let mut out = bytes::BytesMut::new();
        while let Some(chunk) = self.rx.recv().await {
            out.extend_from_slice(&chunk);
        }
        out.freeze()
    }
}

impl Stream for FileStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Bytes>> {
        self.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for FileStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FileStream")
    }
}

/// One uploaded file. Exactly one of `buffer`, `stream`, `temp_path`
/// is populated, matching the strategy the parse ran with (`temp`
/// sets `temp_path` and leaves the spooled file on disk for the
/// caller).
#[derive(Debug)]
pub struct UploadedFile {
    pub fieldname: String,
    pub originalname: String,
    pub encoding: String,
    pub mimetype: String,
    pub size: u64,
    pub buffer: Option<Bytes>,
    pub stream: Option<FileStream>,
    pub temp_path: Option<PathBuf>,
}

impl UploadedFile {
    /// The serializable projection used for `request.files` and the
    /// files schema. Artifacts (buffer/stream) are not representable
    /// here; `temp_path` is, and handlers often need it.
    pub fn metadata(&self) -> Value {
        let mut meta = json!({
            "fieldname": self.fieldname,
            "originalname": self.originalname,
            "encoding": self.encoding,
            "mimetype": self.mimetype,
            "size": self.size,
        });
        if let Some(path) = &self.temp_path {
            meta["tempPath"] = json!(path.to_string_lossy());
        }
        meta
    }
}

/// A text field value: repeated names aggregate in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TextField {
    Single(String),
    Multiple(Vec<String>),
}

impl TextField {
    pub fn first(&self) -> &str {
        match self {
            TextField::Single(v) => v,
            TextField::Multiple(vs) => vs.first().map(String::as_str).unwrap_or(""),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            TextField::Single(existing) => {
                *self = TextField::Multiple(vec![std::mem::take(existing), value]);
            }
            TextField::Multiple(vs) => vs.push(value),
        }
    }
}

#[derive(Debug)]
pub enum FileField {
    Single(UploadedFile),
    Multiple(Vec<UploadedFile>),
}

impl FileField {
    pub fn first(&self) -> &UploadedFile {
        match self {
            FileField::Single(f) => f,
            FileField::Multiple(fs) => &fs[0],
        }
    }

    fn push(&mut self, file: UploadedFile) {
        match self {
            FileField::Single(_) => {
                let FileField::Single(existing) = std::mem::replace(self, FileField::Multiple(Vec::new()))
                else {
                    unreachable!()
                };
                *self = FileField::Multiple(vec![existing, file]);
            }
            FileField::Multiple(fs) => fs.push(file),
        }
    }

    fn metadata(&self) -> Value {
        match self {
            FileField::Single(f) => f.metadata(),
            FileField::Multiple(fs) => Value::Array(fs.iter().map(UploadedFile::metadata).collect()),
        }
    }
}

/// The parse result: fields and files in arrival order.
#[derive(Debug, Default)]
pub struct MultipartData {
    entries_fields: Vec<(String, TextField)>,
    entries_files: Vec<(String, FileField)>,
}

impl MultipartData {
    pub fn field(&self, name: &str) -> Option<&TextField> {
        self.entries_fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn file(&self, name: &str) -> Option<&FileField> {
        self.entries_files
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &TextField)> {
        self.entries_fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &FileField)> {
        self.entries_files.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn file_count(&self) -> usize {
        self.entries_files
            .iter()
            .map(|(_, f)| match f {
                FileField::Single(_) => 1,
                FileField::Multiple(fs) => fs.len(),
            })
            .sum()
    }

    pub(crate) fn push_field(&mut self, name: String, value: String) {
        match self.entries_fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => existing.push(value),
            None => self.entries_fields.push((name, TextField::Single(value))),
        }
    }

    pub(crate) fn push_file(&mut self, name: String, file: UploadedFile) {
        match self.entries_files.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => existing.push(file),
            None => self.entries_files.push((name, FileField::Single(file))),
        }
    }

    /// Field values as a JSON object, `string` or `[string]` per name.
    pub fn fields_value(&self) -> Value {
        let mut out = serde_json::Map::new();
        for (name, field) in &self.entries_fields {
            let value = match field {
                TextField::Single(v) => json!(v),
                TextField::Multiple(vs) => json!(vs),
            };
            out.insert(name.clone(), value);
        }
        Value::Object(out)
    }

    /// File metadata as a JSON object; this is what lands in
    /// `request.files` for the validator.
    pub fn files_metadata(&self) -> Value {
        let mut out = serde_json::Map::new();
        for (name, field) in &self.entries_files {
            out.insert(name.clone(), field.metadata());
        }
        Value::Object(out)
    }

    /// Move the artifacts into a request-shaped upload map.
    pub fn into_uploads(self) -> HashMap<String, FileField> {
        self.entries_files.into_iter().collect()
    }
}
