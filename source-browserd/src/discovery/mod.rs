//! Service discovery engine: tracks `_rtsp._tcp` advertisements, resolves
//! them and probes each resolved endpoint for its session description.
//!
//! All provider events are handled on one dedicated loop thread. Probes run on
//! their own threads and are tracked by the session's `ProbeRegistry`.

pub mod browse;
pub mod event;
pub mod mdns;
pub mod provider;
pub mod resolve;
pub mod session;

use crate::rtsp::SourceDescription;

pub use event::{BrowseEvent, ClientState, EventSink, ResolveEvent};
pub use provider::{DiscoveryProvider, LookupFlags, Protocol, ResolvedEndpoint, ServiceRecord};
pub use resolve::ResolutionHandler;
pub use session::{DiscoverySession, ProviderFactory, SessionContext, SessionStatus};

/// Owner of discovered sources.
///
/// Called from the discovery loop (removals) and from probe workers
/// (deliveries), possibly concurrently for different sources.
pub trait SourceSink: Send + Sync {
    fn on_new_source(&self, name: &str, domain: &str, description: &SourceDescription);
    fn on_remove_source(&self, name: &str, domain: &str);
}
