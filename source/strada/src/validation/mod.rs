//! Schema-driven request and response validation.
//!
//! Two middlewares are generated from a route's [`RouteSchema`]: the
//! request validator runs ahead of the route's own middleware, the
//! response validator wraps the json write path behind it.

pub mod request;
pub mod response;
pub mod schema;

pub use request::RequestValidator;
pub use response::ResponseValidator;
pub use schema::{FnSchema, RouteSchema, Schema};
