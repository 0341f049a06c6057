//! The error boundary: head of every request chain.
//!
//! Anything that propagates this far is rendered as the canonical
//! envelope and swallowed. If a response already went out, the
//! boundary only logs; rewriting a sent response is worse than a
//! truncated one.

use async_trait::async_trait;
use http::{HeaderName, HeaderValue};
use tracing::Span;

use crate::context::Context;
use crate::correlation::{correlation_id_or_default, CORRELATION_HEADER};
use crate::error::Error;
use crate::pipeline::{Middleware, Next};

#[derive(Default)]
pub struct ErrorBoundary {
    debug: bool,
}

impl ErrorBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_debug(debug: bool) -> Self {
        Self { debug }
    }
}

#[async_trait]
impl Middleware for ErrorBoundary {
    fn name(&self) -> &str {
        "error-boundary"
    }

    fn debug(&self) -> bool {
        self.debug
    }

    async fn execute(&self, ctx: &mut Context, next: Next, _span: Span) -> Result<(), Error> {
        let Err(err) = next.run(ctx).await else {
            return Ok(());
        };

        let correlation_id = correlation_id_or_default();

        if ctx.response.sent() {
            if self.debug {
                tracing::debug!(error = ?err, %correlation_id, "error arrived after the response was sent");
            } else {
                tracing::warn!(error = %err, %correlation_id, "error arrived after the response was sent");
            }
            return Ok(());
        }

        if self.debug {
            // Full cause, including wrapped original messages.
            tracing::debug!(error = ?err, %correlation_id, "request failed");
        } else {
            tracing::warn!(error = %err, %correlation_id, "request failed");
        }

        let envelope = err.envelope(&correlation_id);
        ctx.response.clear_json_interceptor();
        ctx.response.status = err.status();
        ctx.response.set_header(
            HeaderName::from_static(CORRELATION_HEADER),
            HeaderValue::from_str(&correlation_id)
                .unwrap_or_else(|_| HeaderValue::from_static("unknown")),
        );
        ctx.response.write_json(envelope)
    }
}
