use std::net::Ipv4Addr;
use crate::discovery::event::ResolveEvent;
use crate::discovery::provider::ServiceRecord;
use crate::discovery::session::SessionContext;
use crate::probe::{ProbeTarget, ProbeUnit};

/// Continuation handed to the provider with each resolve request.
///
/// Consumed by `handle`, so a resolver is released exactly once whatever the
/// outcome. A provider that shuts down with the request pending just drops it.
#[derive(Debug)]
pub struct ResolutionHandler {
    record: ServiceRecord,
}

impl ResolutionHandler {
    pub fn new(record: ServiceRecord) -> Self {
        Self { record }
    }

    pub fn record(&self) -> &ServiceRecord {
        &self.record
    }

    pub(crate) fn handle(self, event: ResolveEvent, ctx: &SessionContext) {
        let endpoint = match event {
            ResolveEvent::Failure(reason) => {
                tracing::error!(
                    "Resolver failed to resolve {}: {}",
                    self.record,
                    reason
                );
                return;
            }
            ResolveEvent::Found(endpoint) => endpoint,
        };

        tracing::debug!("Resolver found {}", self.record);
        tracing::debug!("Resolver {}", endpoint);

        // Only IPv4 sources are described
        let Ok(address) = endpoint.address.parse::<Ipv4Addr>() else {
            tracing::debug!(
                "Ignoring {} at non-IPv4 address {}",
                endpoint.name,
                endpoint.address
            );
            return;
        };

        let target = ProbeTarget {
            name: endpoint.name,
            domain: endpoint.domain,
            address,
            port: endpoint.port,
        };
        let label = target.to_string();

        let started = ctx.registry.register_while(&ctx.running, || {
            ProbeUnit::dispatch(&ctx.probe, target, ctx.registry.notifier())
        });

        match started {
            Ok(true) => tracing::debug!("Dispatched RTSP probe for {}", label),
            Ok(false) => tracing::debug!("Session stopping, not probing {}", label),
            Err(e) => tracing::error!("Failed to start RTSP probe for {}: {}", label, e),
        }
    }
}
