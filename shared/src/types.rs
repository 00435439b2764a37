use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// A remote RTSP source discovered on the network and successfully described.
/// This is the canonical data model used by the browser daemon and its API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSource {
    /// Advertised instance name, e.g. "studio-1"
    pub name: String,

    /// Browse domain, e.g. "local"
    pub domain: String,

    /// RTSP URL the description was fetched from
    pub url: String,

    /// Session description returned by DESCRIBE
    pub sdp: String,

    /// Session name (`s=` line) taken from the SDP, if present
    pub session_name: Option<String>,

    /// First time this source was delivered
    pub first_seen: DateTime<Utc>,

    /// Last time this source was delivered
    pub last_seen: DateTime<Utc>,
}

/// Daemon status reported by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserStatus {
    /// Whether the discovery session is running
    pub running: bool,

    /// Probes dispatched but not yet observed
    pub pending_probes: usize,
}
