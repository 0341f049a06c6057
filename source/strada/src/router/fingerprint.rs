//! Content fingerprints for change suppression.
//!
//! The projection is deliberately coarse: path, sorted method names,
//! handler source token, middleware count, schema section names. It
//! stays stable under formatting-only edits to a route module, which
//! is what de-duplicates noisy `change` events. The digest is the
//! first 16 bytes of SHA-256, hex-encoded; the use is not
//! security-sensitive, any stable 128-bit digest would do.

use sha2::{Digest, Sha256};

use super::Route;

/// Fingerprint of one route's canonical projection.
pub fn route_fingerprint(route: &Route) -> String {
    let mut canonical = String::new();
    canonical.push_str(&route.path);

    let mut methods: Vec<_> = route.methods.iter().collect();
    methods.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));

    for (method, route_method) in methods {
        let sections = route_method
            .schema
            .as_ref()
            .map(|s| s.section_names().join(","))
            .unwrap_or_default();
        canonical.push('\n');
        canonical.push_str(&format!(
            "{}|{}|{}|{}|{}",
            method.as_str(),
            route_method.handler_tag,
            route_method.middleware.len(),
            route_method.schema.is_some(),
            sections,
        ));
    }

    digest128(canonical.as_bytes())
}

/// Fingerprint of a whole file's route set, order-independent.
pub fn routes_fingerprint(routes: &[Route]) -> String {
    let mut prints: Vec<String> = routes.iter().map(route_fingerprint).collect();
    prints.sort_unstable();
    digest128(prints.join("\n").as_bytes())
}

fn digest128(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..16])
}
