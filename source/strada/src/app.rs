//! The request executor: ties the router, validators and pipeline
//! together behind one `handle` call.
//!
//! The HTTP transport is an external collaborator. It builds a
//! [`Context`] from the wire, calls [`App::handle`], and writes
//! `ctx.response` back out.

use std::path::Path;
use std::sync::Arc;

use http::{header, HeaderName, HeaderValue, Method, StatusCode};
use serde_json::json;

use strada_config::ServerConfig;

use crate::context::Context;
use crate::correlation::{correlation_id_from, with_correlation_id, CORRELATION_HEADER};
use crate::error::{Error, LoadError};
use crate::pipeline::error_boundary::ErrorBoundary;
use crate::pipeline::{Middleware, Pipeline};
use crate::router::discovery::{self, DiscoveryOptions};
use crate::router::loader::{source_key, RouteLoader};
use crate::router::{Matched, RouteMatch, Router};
use crate::validation::{RequestValidator, ResponseValidator};

pub struct App {
    router: Arc<Router>,
    config: ServerConfig,
    middleware: Vec<Arc<dyn Middleware>>,
    debug: bool,
}

impl App {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            router: Arc::new(Router::new()),
            config,
            middleware: Vec::new(),
            debug: false,
        }
    }

    /// Append an application-level middleware; these run ahead of
    /// every route's own chain.
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    /// Discover and register every route module under `dir`. Returns
    /// the per-file load failures that did not abort the mount.
    pub async fn mount(
        &self,
        dir: &Path,
        loader: &Arc<dyn RouteLoader>,
        options: &DiscoveryOptions,
    ) -> Result<Vec<LoadError>, Error> {
        self.mount_prefixed(dir, loader, None, options).await
    }

    /// Same as [`mount`](App::mount), with a path prefix applied to
    /// every loaded route (plugin directories). Prefixes are applied
    /// here, at registration time; the matcher never sees them.
    pub async fn mount_prefixed(
        &self,
        dir: &Path,
        loader: &Arc<dyn RouteLoader>,
        prefix: Option<&str>,
        options: &DiscoveryOptions,
    ) -> Result<Vec<LoadError>, Error> {
        let load = discovery::load_directory(dir, loader, options)
            .await
            .map_err(Error::Directory)?;

        for file in load.files {
            let routes = match prefix {
                Some(prefix) => file
                    .routes
                    .into_iter()
                    .map(|r| r.with_prefix(prefix))
                    .collect(),
                None => file.routes,
            };
            self.router.apply(&source_key(&file.path), routes)?;
        }
        Ok(load.failures)
    }

    /// Dispatch one request. Infallible by design: every failure ends
    /// up in `ctx.response`, as an envelope or a plain error body.
    pub async fn handle(&self, ctx: &mut Context) {
        let correlation_id = correlation_id_from(&ctx.request.headers);
        with_correlation_id(correlation_id.clone(), self.dispatch(ctx, correlation_id)).await;
    }

    async fn dispatch(&self, ctx: &mut Context, correlation_id: String) {
        ctx.response.set_header(
            HeaderName::from_static(CORRELATION_HEADER),
            HeaderValue::from_str(&correlation_id)
                .unwrap_or_else(|_| HeaderValue::from_static("unknown")),
        );

        if let Some(hsts) = self.config.hsts_header() {
            if let Ok(value) = HeaderValue::from_str(&hsts) {
                ctx.response
                    .set_header(header::STRICT_TRANSPORT_SECURITY, value);
            }
        }

        match self.router.lookup(&ctx.request.path, &ctx.request.method) {
            RouteMatch::NotFound => {
                ctx.response.status = StatusCode::NOT_FOUND;
                let _ = ctx.response.write_json(json!({"error": "Not Found"}));
            }
            RouteMatch::MethodNotAllowed { allowed } => {
                let names: Vec<&str> = allowed.iter().map(Method::as_str).collect();
                ctx.response.status = StatusCode::METHOD_NOT_ALLOWED;
                if let Ok(value) = HeaderValue::from_str(&names.join(", ")) {
                    ctx.response.set_header(header::ALLOW, value);
                }
                let _ = ctx
                    .response
                    .write_json(json!({"error": "Method Not Allowed", "allowed": names}));
            }
            RouteMatch::Matched(matched) => {
                self.run_matched(ctx, matched, &correlation_id).await;
            }
        }
    }

    async fn run_matched(&self, ctx: &mut Context, matched: Matched, correlation_id: &str) {
        ctx.request.params = matched.params;

        let route_method = matched.method;
        let mut chain: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(ErrorBoundary::with_debug(self.debug))];
        chain.extend(self.middleware.iter().cloned());

        if let Some(schema) = &route_method.schema {
            if schema.has_request_sections() {
                chain.push(Arc::new(RequestValidator::new(schema.clone())));
            }
        }
        chain.extend(route_method.middleware.iter().cloned());
        if let Some(response_schema) = route_method
            .schema
            .as_ref()
            .and_then(|s| s.response.clone())
        {
            chain.push(Arc::new(ResponseValidator::new(response_schema)));
        }

        let span = tracing::info_span!(
            "request",
            method = %ctx.request.method,
            path = %matched.path,
            correlation_id = %correlation_id,
        );

        let pipeline = Pipeline::new(chain, route_method.handler, span);
        if let Err(err) = pipeline.dispatch(ctx).await {
            // Only a failure inside the boundary itself lands here.
            tracing::error!(error = %err, %correlation_id, "error escaped the boundary");
            if !ctx.response.sent() {
                ctx.response.status = StatusCode::INTERNAL_SERVER_ERROR;
                let _ = ctx
                    .response
                    .write_json(err.envelope(correlation_id));
            }
        }
    }
}
