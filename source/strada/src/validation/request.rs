//! The request validator middleware.

use async_trait::async_trait;
use serde_json::Value;
use tracing::Span;

use crate::context::{Context, PathParams};
use crate::error::Error;
use crate::pipeline::{Middleware, Next};

use super::schema::RouteSchema;

/// Validates request sections in the order params, query, body,
/// files. The first failing section stops validation and fails the
/// request; successful sections are replaced with their parsed
/// values.
pub struct RequestValidator {
    schema: RouteSchema,
}

impl RequestValidator {
    pub fn new(schema: RouteSchema) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl Middleware for RequestValidator {
    fn name(&self) -> &str {
        "request-validator"
    }

    async fn execute(&self, ctx: &mut Context, next: Next, _span: Span) -> Result<(), Error> {
        if let Some(schema) = &self.schema.params {
            let current = params_to_value(&ctx.request.params);
            match schema.parse(&current) {
                Ok(parsed) => ctx.request.params = value_to_params(&parsed, &ctx.request.params),
                Err(fields) => return Err(Error::validation(fields, "params")),
            }
        }

        if let Some(schema) = &self.schema.query {
            match schema.parse(&ctx.request.query) {
                Ok(parsed) => ctx.request.query = parsed,
                Err(fields) => return Err(Error::validation(fields, "query")),
            }
        }

        if let Some(schema) = &self.schema.body {
            match schema.parse(&ctx.request.body) {
                Ok(parsed) => ctx.request.body = parsed,
                Err(fields) => return Err(Error::validation(fields, "body")),
            }
        }

        if let Some(schema) = &self.schema.files {
            match schema.parse(&ctx.request.files) {
                Ok(parsed) => ctx.request.files = parsed,
                Err(fields) => return Err(Error::validation(fields, "files")),
            }
        }

        next.run(ctx).await
    }
}

fn params_to_value(params: &PathParams) -> Value {
    let mut out = serde_json::Map::new();
    for (name, value) in params {
        out.insert(name.clone(), Value::String(value.clone()));
    }
    Value::Object(out)
}

/// Path parameters stay strings after validation; coerced values are
/// re-rendered so `ctx.request.params` keeps one shape everywhere.
fn value_to_params(parsed: &Value, fallback: &PathParams) -> PathParams {
    let Value::Object(map) = parsed else {
        return fallback.clone();
    };
    map.iter()
        .map(|(name, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (name.clone(), rendered)
        })
        .collect()
}
