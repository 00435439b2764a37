use serde::Serialize;
use sha2::{Sha256, Digest};
use shared::types::RemoteSource;

/// Hash only stable fields; last_seen/first_seen move on every re-delivery
/// without the source itself changing.
#[derive(Serialize)]
struct HashView<'a> {
    name: &'a str,
    domain: &'a str,
    url: &'a str,
    sdp: &'a str,
}

/// Computes a SHA-256 hash of the source list.
/// Sources are sorted by name and domain for deterministic output.
pub fn compute_hash(sources: &[RemoteSource]) -> String {
    let mut views: Vec<HashView<'_>> = sources
        .iter()
        .map(|s| HashView {
            name: &s.name,
            domain: &s.domain,
            url: &s.url,
            sdp: &s.sdp,
        })
        .collect();
    views.sort_by(|a, b| (a.name, a.domain).cmp(&(b.name, b.domain)));

    let mut hasher = Sha256::new();
    for view in &views {
        // Serializing borrowed strings cannot fail
        if let Ok(json) = serde_json::to_vec(view) {
            hasher.update(&json);
            hasher.update(b"\n");
        }
    }
    hex::encode(hasher.finalize())
}
