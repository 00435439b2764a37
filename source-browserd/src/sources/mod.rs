pub mod hash;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use chrono::Utc;
use tokio::sync::watch;
use shared::types::RemoteSource;
use crate::discovery::SourceSink;
use crate::rtsp::SourceDescription;

type SourceKey = (String, String);

/// Remote RTSP sources currently known to the daemon, keyed by name and domain.
///
/// Publishes a digest of the table on every change.
pub struct SourceTable {
    sources: Mutex<HashMap<SourceKey, RemoteSource>>,
    hash_tx: watch::Sender<String>,
}

impl SourceTable {
    pub fn new(hash_tx: watch::Sender<String>) -> Self {
        hash_tx.send_replace(hash::compute_hash(&[]));
        Self {
            sources: Mutex::new(HashMap::new()),
            hash_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SourceKey, RemoteSource>> {
        self.sources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All sources, sorted by name
    pub fn all(&self) -> Vec<RemoteSource> {
        let mut sources: Vec<RemoteSource> = self.lock().values().cloned().collect();
        sources.sort_by(|a, b| (&a.name, &a.domain).cmp(&(&b.name, &b.domain)));
        sources
    }

    /// Looks a source up by instance name in any domain
    pub fn get(&self, name: &str) -> Option<RemoteSource> {
        self.all().into_iter().find(|source| source.name == name)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn publish_hash(&self, sources: &HashMap<SourceKey, RemoteSource>) {
        let snapshot: Vec<RemoteSource> = sources.values().cloned().collect();
        self.hash_tx.send_replace(hash::compute_hash(&snapshot));
    }
}

impl SourceSink for SourceTable {
    fn on_new_source(&self, name: &str, domain: &str, description: &SourceDescription) {
        let now = Utc::now();
        let mut sources = self.lock();
        let key = (name.to_string(), domain.to_string());

        let changed = match sources.get_mut(&key) {
            Some(existing) => {
                let changed = existing.url != description.url || existing.sdp != description.sdp;
                existing.url = description.url.clone();
                existing.sdp = description.sdp.clone();
                existing.session_name = description.session_name.clone();
                existing.last_seen = now;
                changed
            }
            None => {
                sources.insert(
                    key,
                    RemoteSource {
                        name: name.to_string(),
                        domain: domain.to_string(),
                        url: description.url.clone(),
                        sdp: description.sdp.clone(),
                        session_name: description.session_name.clone(),
                        first_seen: now,
                        last_seen: now,
                    },
                );
                true
            }
        };

        if changed {
            tracing::info!("Added RTSP source {} at {}", name, description.url);
            self.publish_hash(&sources);
        }
    }

    fn on_remove_source(&self, name: &str, domain: &str) {
        let mut sources = self.lock();
        if sources.remove(&(name.to_string(), domain.to_string())).is_some() {
            tracing::info!("Removed RTSP source {} in {}", name, domain);
            self.publish_hash(&sources);
        }
    }
}
