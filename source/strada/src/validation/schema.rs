//! The schema contract.
//!
//! The concrete validation library is an external collaborator; the
//! core only needs `parse`: take a JSON value, return the (possibly
//! coerced) parsed value or a list of field errors.

use std::sync::Arc;

use serde_json::Value;

use crate::error::FieldError;

pub trait Schema: Send + Sync {
    fn parse(&self, value: &Value) -> Result<Value, Vec<FieldError>>;
}

/// Adapter for closure-based schemas, mostly used by tests and small
/// hand-rolled validators.
pub struct FnSchema<F>(F);

impl<F> FnSchema<F>
where
    F: Fn(&Value) -> Result<Value, Vec<FieldError>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Schema for FnSchema<F>
where
    F: Fn(&Value) -> Result<Value, Vec<FieldError>> + Send + Sync,
{
    fn parse(&self, value: &Value) -> Result<Value, Vec<FieldError>> {
        (self.0)(value)
    }
}

/// Per-section schemas attached to a route method.
#[derive(Clone, Default)]
pub struct RouteSchema {
    pub params: Option<Arc<dyn Schema>>,
    pub query: Option<Arc<dyn Schema>>,
    pub body: Option<Arc<dyn Schema>>,
    pub files: Option<Arc<dyn Schema>>,
    pub response: Option<Arc<dyn Schema>>,
}

impl RouteSchema {
    /// Section names present on this schema, sorted. Feeds the route
    /// content fingerprint.
    pub fn section_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.params.is_some() {
            names.push("params");
        }
        if self.query.is_some() {
            names.push("query");
        }
        if self.body.is_some() {
            names.push("body");
        }
        if self.files.is_some() {
            names.push("files");
        }
        if self.response.is_some() {
            names.push("response");
        }
        names.sort_unstable();
        names
    }

    pub fn has_request_sections(&self) -> bool {
        self.params.is_some()
            || self.query.is_some()
            || self.body.is_some()
            || self.files.is_some()
    }
}

impl std::fmt::Debug for RouteSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteSchema")
            .field("sections", &self.section_names())
            .finish()
    }
}
