//! Per-request state: the unified request view, the response being
//! assembled, and the user-extensible state/service maps.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde_json::Value;

use crate::error::Error;
use crate::multipart::FileField;

pub type PathParams = BTreeMap<String, String>;

/// Services installed by the host application, looked up by name.
pub type ServiceMap = HashMap<String, Arc<dyn Any + Send + Sync>>;

#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    /// Captured path parameters; set by the router after a match.
    pub params: PathParams,
    /// May be replaced by the request validator with the parsed value.
    pub query: Value,
    pub body: Value,
    /// JSON metadata projection of the uploads; the files schema
    /// validates and may replace this view.
    pub files: Value,
    /// The actual upload artifacts (buffers, streams, temp paths).
    /// Validators never touch these.
    pub uploads: HashMap<String, FileField>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            params: PathParams::new(),
            query: Value::Null,
            body: Value::Null,
            files: Value::Null,
            uploads: HashMap::new(),
        }
    }
}

type JsonInterceptor = Box<dyn FnOnce(&mut Response, Value) -> Result<(), Error> + Send>;

/// The response under construction. `sent` is monotonic: once a body
/// has been written, later writes are silently dropped.
#[derive(Default)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    sent: bool,
    json_interceptor: Option<JsonInterceptor>,
}

impl Response {
    pub fn sent(&self) -> bool {
        self.sent
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Serialize `value` as the JSON body. Routes through the
    /// installed interceptor when one is present; the interceptor is
    /// taken before it runs, so it fires at most once and cannot
    /// re-enter itself when it writes through.
    pub fn json(&mut self, value: Value) -> Result<(), Error> {
        if let Some(interceptor) = self.json_interceptor.take() {
            return interceptor(self, value);
        }
        self.write_json(value)
    }

    /// The unintercepted write path.
    pub(crate) fn write_json(&mut self, value: Value) -> Result<(), Error> {
        if self.sent {
            return Ok(());
        }
        let rendered = serde_json::to_vec(&value).map_err(|e| {
            Error::wrap("Failed to serialize response body", &e)
        })?;
        self.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = Some(Bytes::from(rendered));
        self.sent = true;
        Ok(())
    }

    pub fn text(&mut self, body: impl Into<String>) {
        if self.sent {
            return;
        }
        self.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.body = Some(Bytes::from(body.into()));
        self.sent = true;
    }

    pub(crate) fn install_json_interceptor(&mut self, interceptor: JsonInterceptor) {
        self.json_interceptor = Some(interceptor);
    }

    /// Drop any uninvoked interceptor, restoring the plain write path.
    pub(crate) fn clear_json_interceptor(&mut self) {
        self.json_interceptor = None;
    }

    /// The body decoded as JSON, for assertions and the boundary log.
    pub fn body_json(&self) -> Option<Value> {
        self.body
            .as_ref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("sent", &self.sent)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .finish()
    }
}

#[derive(Debug)]
pub struct Context {
    pub request: Request,
    pub response: Response,
    pub state: HashMap<String, Value>,
    pub services: ServiceMap,
}

impl Context {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request: Request::new(method, path),
            response: Response {
                status: StatusCode::OK,
                ..Response::default()
            },
            state: HashMap::new(),
            services: ServiceMap::new(),
        }
    }
}
