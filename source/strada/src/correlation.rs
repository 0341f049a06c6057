//! Ambient per-request correlation id.
//!
//! The id lives in a tokio task-local, so it survives every await
//! within one request and is invisible to every other request. Nested
//! scopes shadow the outer id and restore it on all exit paths,
//! including panics and early returns, because scoping is structural.

use std::time::{SystemTime, UNIX_EPOCH};

use http::HeaderMap;
use rand::distr::Alphanumeric;
use rand::Rng;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

tokio::task_local! {
    static CORRELATION_ID: String;
}

/// Run `fut` with `id` as the ambient correlation id.
pub async fn with_correlation_id<F>(id: String, fut: F) -> F::Output
where
    F: std::future::Future,
{
    CORRELATION_ID.scope(id, fut).await
}

/// The ambient id, if the caller is inside a request scope.
pub fn current_correlation_id() -> Option<String> {
    CORRELATION_ID.try_with(|id| id.clone()).ok()
}

/// The ambient id, or `"unknown"` outside any request scope. Used by
/// log lines and envelopes that must always render something.
pub fn correlation_id_or_default() -> String {
    current_correlation_id().unwrap_or_else(|| "unknown".to_string())
}

/// Resolve the id for an inbound request: honor a trimmed, non-empty
/// `x-correlation-id` header, otherwise mint a fresh one.
pub fn correlation_id_from(headers: &HeaderMap) -> String {
    if let Some(value) = headers.get(CORRELATION_HEADER) {
        if let Ok(raw) = value.to_str() {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    generate_correlation_id()
}

/// `req_<base36 unix-millis>_<random suffix>`.
pub fn generate_correlation_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);

    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();

    format!("req_{}_{}", base36(millis), suffix)
}

fn base36(mut n: u128) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ASCII")
}
