use crate::discovery::provider::{ResolvedEndpoint, ServiceRecord};
use crate::discovery::resolve::ResolutionHandler;

/// Connection state of the provider client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    Registering,
    Running,
    Collision,
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseEvent {
    New(ServiceRecord),
    Remove(ServiceRecord),
    AllForNow,
    CacheExhausted,
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveEvent {
    Found(ResolvedEndpoint),
    Failure(String),
}

/// Everything the discovery loop reacts to
#[derive(Debug)]
pub(crate) enum LoopEvent {
    Client(ClientState),
    Browse(BrowseEvent),
    Resolved(ResolutionHandler, ResolveEvent),
    Stop,
}

/// Provider-side handle for posting events onto the discovery loop.
///
/// Posting returns `false` once the loop has gone away.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: flume::Sender<LoopEvent>,
}

impl EventSink {
    pub(crate) fn new(tx: flume::Sender<LoopEvent>) -> Self {
        Self { tx }
    }

    pub fn client_state(&self, state: ClientState) -> bool {
        self.tx.send(LoopEvent::Client(state)).is_ok()
    }

    pub fn browse(&self, event: BrowseEvent) -> bool {
        self.tx.send(LoopEvent::Browse(event)).is_ok()
    }

    pub fn resolved(&self, handler: ResolutionHandler, event: ResolveEvent) -> bool {
        self.tx.send(LoopEvent::Resolved(handler, event)).is_ok()
    }
}
