//! The streaming state machine behind [`parse_multipart`].
//!
//! The body is consumed chunk by chunk. Between boundary hits the
//! buffer never retains more than one delimiter-length tail plus the
//! bytes of the chunk being flushed, so memory stays flat regardless
//! of part sizes (memory-strategy buffers excepted, which is the
//! point of that strategy).

use std::path::PathBuf;

use bytes::{Buf, Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use memchr::memmem;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use strada_config::{MultipartConfig, UploadStrategy};

use super::{FileStream, MultipartData, UploadedFile};
use crate::error::ParseError;

const DEFAULT_FILE_MIME: &str = "application/octet-stream";
const DEFAULT_ENCODING: &str = "7bit";

/// Transport padding tolerated between a boundary and its CRLF.
const MAX_PADDING: usize = 64;
/// Upper bound on one part's header block.
const MAX_HEADER_BLOCK: usize = 16 * 1024;

/// Parse a `multipart/form-data` body.
///
/// `content_type` must carry a `boundary` parameter. Limits from
/// `config` are enforced as bytes arrive; a breach fails the whole
/// parse and removes any temp files spooled so far. Cancellation
/// (dropping the returned future) removes them as well.
pub async fn parse_multipart<S>(
    content_type: &str,
    body: S,
    config: &MultipartConfig,
) -> Result<MultipartData, ParseError>
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Unpin,
{
    let boundary = extract_boundary(content_type)?;
    let mut parser = Parser {
        config: config.clone(),
        temp_guard: TempGuard::default(),
        files_seen: 0,
        parts_seen: 0,
    };

    let data = parser.run(&boundary, body).await?;
    parser.temp_guard.disarm();
    Ok(data)
}

fn extract_boundary(content_type: &str) -> Result<String, ParseError> {
    let mime: mime::Mime = content_type
        .trim()
        .parse()
        .map_err(|_| ParseError::MissingBoundary)?;
    if mime.essence_str() != "multipart/form-data" {
        return Err(ParseError::MissingBoundary);
    }
    mime.get_param(mime::BOUNDARY)
        .map(|b| b.as_str().to_string())
        .ok_or(ParseError::MissingBoundary)
}

#[derive(Clone, Copy)]
enum State {
    Preamble,
    Delimiter,
    Headers,
    Body,
}

struct Parser {
    config: MultipartConfig,
    temp_guard: TempGuard,
    files_seen: usize,
    parts_seen: usize,
}

impl Parser {
    async fn run<S>(&mut self, boundary: &str, mut body: S) -> Result<MultipartData, ParseError>
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Unpin,
    {
        let delim = format!("\r\n--{boundary}").into_bytes();
        let finder = memmem::Finder::new(&delim);
        // Keeping this much tail guarantees a delimiter split across
        // chunks is still found on the next pass.
        let keep = delim.len() - 1;

        let mut data = MultipartData::default();
        let mut buf = BytesMut::with_capacity(8 * 1024);
        // Virtual leading CRLF: the opening `--boundary` now matches
        // the same needle as every later one.
        buf.extend_from_slice(b"\r\n");

        let mut state = State::Preamble;
        let mut sink: Option<PartSink> = None;
        let mut eof = false;

        loop {
            let mut progressed = true;

            match state {
                State::Preamble => {
                    if let Some(idx) = finder.find(&buf) {
                        buf.advance(idx + delim.len());
                        state = State::Delimiter;
                    } else {
                        if buf.len() > keep {
                            buf.advance(buf.len() - keep);
                        }
                        progressed = false;
                    }
                }
                State::Delimiter => {
                    if buf.len() >= 2 && &buf[..2] == b"--" {
                        // Final boundary marker.
                        if self.parts_seen == 0 {
                            return Err(ParseError::EmptyRequest);
                        }
                        return Ok(data);
                    } else if let Some(idx) = memmem::find(&buf, b"\r\n") {
                        if idx > MAX_PADDING {
                            return Err(ParseError::MalformedHeaders);
                        }
                        buf.advance(idx + 2);
                        state = State::Headers;
                    } else if buf.len() > MAX_PADDING {
                        return Err(ParseError::MalformedHeaders);
                    } else {
                        progressed = false;
                    }
                }
                State::Headers => {
                    if let Some(idx) = memmem::find(&buf, b"\r\n\r\n") {
                        let block = buf.split_to(idx + 4);
                        let headers = parse_part_headers(&block)?;
                        sink = Some(self.open_sink(headers)?);
                        self.parts_seen += 1;
                        state = State::Body;
                    } else if buf.len() > MAX_HEADER_BLOCK {
                        return Err(ParseError::MalformedHeaders);
                    } else {
                        progressed = false;
                    }
                }
                State::Body => {
                    if let Some(idx) = finder.find(&buf) {
                        let chunk = buf.split_to(idx).freeze();
                        buf.advance(delim.len());
                        let mut active = sink.take().expect("body state has an active part");
                        if !chunk.is_empty() {
                            active.write(chunk, &self.config).await?;
                        }
                        active.finish(&mut data).await?;
                        state = State::Delimiter;
                    } else if buf.len() > keep {
                        let chunk = buf.split_to(buf.len() - keep).freeze();
                        let active = sink.as_mut().expect("body state has an active part");
                        active.write(chunk, &self.config).await?;
                        progressed = false;
                    } else {
                        progressed = false;
                    }
                }
            }

            if progressed {
                continue;
            }

            if eof {
                return Err(match state {
                    State::Preamble => ParseError::NoValidBoundary,
                    _ => ParseError::UnexpectedEof,
                });
            }

            match body.next().await {
                Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(ParseError::Io(e)),
                None => eof = true,
            }
        }
    }

    fn open_sink(&mut self, headers: PartHeaders) -> Result<PartSink, ParseError> {
        let Some(originalname) = headers.filename else {
            return Ok(PartSink::Field {
                name: headers.name,
                collected: BytesMut::new(),
            });
        };

        self.files_seen += 1;
        if self.files_seen > self.config.max_files {
            return Err(ParseError::TooManyFiles {
                limit: self.config.max_files,
            });
        }

        let mimetype = headers
            .content_type
            .unwrap_or_else(|| DEFAULT_FILE_MIME.to_string());
        if !mime_allowed(&self.config.allowed_mime_types, &mimetype) {
            return Err(ParseError::DisallowedMimeType {
                field: headers.name,
                mimetype,
            });
        }

        let meta = PartMeta {
            fieldname: headers.name,
            originalname,
            encoding: headers
                .encoding
                .unwrap_or_else(|| DEFAULT_ENCODING.to_string()),
            mimetype,
        };

        let store = match self.config.strategy {
            UploadStrategy::Memory => FileStore::Memory(BytesMut::new()),
            UploadStrategy::Stream => {
                let (tx, rx) = mpsc::unbounded_channel();
                FileStore::Stream { tx, rx: Some(rx) }
            }
            UploadStrategy::Temp => {
                let tmp = tempfile::Builder::new()
                    .prefix("strada-upload-")
                    .tempfile()?;
                let (file, path) = tmp.keep().map_err(|e| ParseError::Io(e.error))?;
                self.temp_guard.push(path.clone());
                FileStore::Temp {
                    file: tokio::fs::File::from_std(file),
                    path,
                }
            }
        };

        Ok(PartSink::File {
            meta,
            store,
            size: 0,
        })
    }
}

struct PartMeta {
    fieldname: String,
    originalname: String,
    encoding: String,
    mimetype: String,
}

enum FileStore {
    Memory(BytesMut),
    Stream {
        tx: mpsc::UnboundedSender<Bytes>,
        rx: Option<mpsc::UnboundedReceiver<Bytes>>,
    },
    Temp {
        file: tokio::fs::File,
        path: PathBuf,
    },
}

enum PartSink {
    Field {
        name: String,
        collected: BytesMut,
    },
    File {
        meta: PartMeta,
        store: FileStore,
        size: u64,
    },
}

impl PartSink {
    async fn write(&mut self, chunk: Bytes, config: &MultipartConfig) -> Result<(), ParseError> {
        match self {
            PartSink::Field { name, collected } => {
                if (collected.len() + chunk.len()) as u64 > config.max_field_size {
                    return Err(ParseError::FieldTooLarge {
                        field: name.clone(),
                        limit: config.max_field_size,
                    });
                }
                collected.extend_from_slice(&chunk);
            }
            PartSink::File { meta, store, size } => {
                *size += chunk.len() as u64;
                if *size > config.max_file_size {
                    return Err(ParseError::FileTooLarge {
                        field: meta.fieldname.clone(),
                        limit: config.max_file_size,
                    });
                }
                match store {
                    FileStore::Memory(collected) => collected.extend_from_slice(&chunk),
                    // A dropped receiver just discards chunks; size
                    // and limits are still accounted.
                    FileStore::Stream { tx, .. } => {
                        let _ = tx.send(chunk);
                    }
                    FileStore::Temp { file, .. } => file.write_all(&chunk).await?,
                }
            }
        }
        Ok(())
    }

    async fn finish(self, out: &mut MultipartData) -> Result<(), ParseError> {
        match self {
            PartSink::Field { name, collected } => {
                let value = String::from_utf8_lossy(&collected).into_owned();
                out.push_field(name, value);
            }
            PartSink::File { meta, store, size } => {
                let (buffer, stream, temp_path) = match store {
                    FileStore::Memory(collected) => (Some(collected.freeze()), None, None),
                    FileStore::Stream { tx, rx } => {
                        drop(tx);
                        (None, rx.map(FileStream::new), None)
                    }
                    FileStore::Temp { mut file, path } => {
                        file.flush().await?;
                        (None, None, Some(path))
                    }
                };
                out.push_file(
                    meta.fieldname.clone(),
                    UploadedFile {
                        fieldname: meta.fieldname,
                        originalname: meta.originalname,
                        encoding: meta.encoding,
                        mimetype: meta.mimetype,
                        size,
                        buffer,
                        stream,
                        temp_path,
                    },
                );
            }
        }
        Ok(())
    }
}

/// Removes spooled temp files unless the parse completed.
#[derive(Default)]
struct TempGuard {
    paths: Vec<PathBuf>,
    disarmed: bool,
}

impl TempGuard {
    fn push(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    fn disarm(&mut self) {
        self.disarmed = true;
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if self.disarmed {
            return;
        }
        for path in &self.paths {
            let _ = std::fs::remove_file(path);
        }
    }
}

struct PartHeaders {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    encoding: Option<String>,
}

fn parse_part_headers(block: &[u8]) -> Result<PartHeaders, ParseError> {
    let text = std::str::from_utf8(block).map_err(|_| ParseError::MalformedHeaders)?;

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;
    let mut encoding = None;

    for line in text.split("\r\n").filter(|l| !l.is_empty()) {
        let Some((header, value)) = line.split_once(':') else {
            return Err(ParseError::MalformedHeaders);
        };
        let value = value.trim();

        match header.trim().to_ascii_lowercase().as_str() {
            "content-disposition" => {
                name = disposition_param(value, "name");
                filename = disposition_param(value, "filename");
            }
            "content-type" => {
                // Parameters (charset etc.) are irrelevant to typing.
                let essence = value.split(';').next().unwrap_or(value).trim();
                content_type = Some(essence.to_string());
            }
            "content-transfer-encoding" => encoding = Some(value.to_string()),
            _ => {}
        }
    }

    let name = name.ok_or(ParseError::MalformedHeaders)?;
    Ok(PartHeaders {
        name,
        filename,
        content_type,
        encoding,
    })
}

fn disposition_param(value: &str, key: &str) -> Option<String> {
    for segment in value.split(';').skip(1) {
        let Some((k, v)) = segment.split_once('=') else {
            continue;
        };
        if k.trim() != key {
            continue;
        }
        let v = v.trim();
        let unquoted = v
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .map(|s| s.replace("\\\"", "\"").replace("\\\\", "\\"))
            .unwrap_or_else(|| v.to_string());
        return Some(unquoted);
    }
    None
}

fn mime_allowed(allowed: &[String], mimetype: &str) -> bool {
    if allowed.is_empty() {
        return true;
    }
    allowed.iter().any(|entry| {
        let entry = entry.trim();
        if entry == "*/*" {
            return true;
        }
        if let Some(main_type) = entry.strip_suffix("/*") {
            return mimetype
                .split('/')
                .next()
                .is_some_and(|t| t.eq_ignore_ascii_case(main_type));
        }
        entry.eq_ignore_ascii_case(mimetype)
    })
}
