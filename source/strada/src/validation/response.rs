//! The response validator middleware.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::Span;

use crate::context::Context;
use crate::error::{is_error_envelope, Error};
use crate::pipeline::{Middleware, Next};

use super::schema::Schema;

/// Wraps the response json path for the duration of the inner chain.
/// The wrapper validates handler output against the response schema;
/// values already shaped like an error envelope pass through
/// untouched. The original write path is reinstated on every exit:
/// after the wrapper fires (it is single-shot), after the inner chain
/// returns, and after it fails without ever writing.
pub struct ResponseValidator {
    schema: Arc<dyn Schema>,
}

impl ResponseValidator {
    pub fn new(schema: Arc<dyn Schema>) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl Middleware for ResponseValidator {
    fn name(&self) -> &str {
        "response-validator"
    }

    async fn execute(&self, ctx: &mut Context, next: Next, _span: Span) -> Result<(), Error> {
        let schema = self.schema.clone();
        ctx.response
            .install_json_interceptor(Box::new(move |response, value| {
                if is_error_envelope(&value) {
                    return response.write_json(value);
                }
                match schema.parse(&value) {
                    Ok(parsed) => response.write_json(parsed),
                    Err(fields) => Err(Error::Internal {
                        title: "Response validation failed".to_string(),
                        details: Some(json!({
                            "validationError": fields,
                            "hint": "the handler returned a body that does not match the declared response schema",
                        })),
                        original_message: None,
                    }),
                }
            }));

        let result = next.run(ctx).await;
        // Uninvoked wrapper (inner layer failed or wrote nothing):
        // restore the plain write path before unwinding.
        ctx.response.clear_json_interceptor();
        result
    }
}
