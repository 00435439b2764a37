use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use anyhow::{bail, Context, Result};
use mdns_sd::{DaemonEvent, IfKind, ServiceDaemon, ServiceEvent, ServiceInfo};
use crate::discovery::event::{BrowseEvent, ClientState, EventSink, ResolveEvent};
use crate::discovery::provider::{
    DiscoveryProvider, LookupFlags, ResolvedEndpoint, ServiceRecord,
};
use crate::discovery::resolve::ResolutionHandler;

/// Discovery provider backed by an in-process `mdns-sd` daemon.
///
/// `mdns-sd` resolves every instance it finds on its own; resolve requests are
/// matched against those results by full name, whichever arrives first.
pub struct MdnsProvider {
    daemon: Option<ServiceDaemon>,
    forwarder: Option<Forwarder>,
    browsing: Option<String>,
}

impl Default for MdnsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MdnsProvider {
    pub fn new() -> Self {
        Self {
            daemon: None,
            forwarder: None,
            browsing: None,
        }
    }

    fn started(&self) -> Result<(&ServiceDaemon, &Forwarder)> {
        match (&self.daemon, &self.forwarder) {
            (Some(daemon), Some(forwarder)) => Ok((daemon, forwarder)),
            _ => bail!("mDNS client not started"),
        }
    }
}

impl DiscoveryProvider for MdnsProvider {
    fn new_client(&mut self, interface: &str, events: EventSink) -> Result<()> {
        let daemon = ServiceDaemon::new().context("Failed to create mDNS daemon")?;
        daemon
            .disable_interface(IfKind::All)
            .context("Failed to disable default interfaces")?;
        daemon
            .enable_interface(interface)
            .with_context(|| format!("Failed to enable interface {}", interface))?;
        // IPv4 only
        daemon
            .disable_interface(IfKind::IPv6)
            .context("Failed to disable IPv6 interfaces")?;

        let forwarder = Forwarder {
            events: events.clone(),
            table: Arc::new(Mutex::new(ResolveTable::default())),
            stopping: Arc::new(AtomicBool::new(false)),
            interface: interface.to_string(),
        };

        let monitor = daemon.monitor().context("Failed to monitor mDNS daemon")?;
        let monitor_forwarder = forwarder.clone();
        thread::Builder::new()
            .name("mdns-monitor".to_string())
            .spawn(move || monitor_forwarder.forward_monitor(monitor))
            .context("Failed to spawn mDNS monitor thread")?;

        self.daemon = Some(daemon);
        self.forwarder = Some(forwarder);

        // The daemon runs in-process and is usable straight away
        events.client_state(ClientState::Connecting);
        events.client_state(ClientState::Running);
        Ok(())
    }

    fn subscribe(&mut self, service_type: &str) -> Result<()> {
        let (daemon, forwarder) = self.started()?;

        if let Some(previous) = &self.browsing {
            if let Err(e) = daemon.stop_browse(previous) {
                tracing::warn!("Failed to stop browsing {}: {}", previous, e);
            }
        }

        let receiver = daemon
            .browse(service_type)
            .with_context(|| format!("Failed to browse {}", service_type))?;

        let browse_forwarder = forwarder.clone();
        let ty_domain = service_type.to_string();
        thread::Builder::new()
            .name("mdns-browse".to_string())
            .spawn(move || browse_forwarder.forward_browse(receiver, &ty_domain))
            .context("Failed to spawn mDNS browse thread")?;

        self.browsing = Some(service_type.to_string());
        Ok(())
    }

    fn resolve(&mut self, record: &ServiceRecord, handler: ResolutionHandler) -> Result<()> {
        let (_, forwarder) = self.started()?;

        let cached = forwarder.table().request(record.fullname(), handler);
        if let Some((handler, endpoint)) = cached {
            forwarder.events.resolved(handler, ResolveEvent::Found(endpoint));
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.stopping.store(true, Ordering::SeqCst);
            // Pending resolvers are released without a callback
            *forwarder.table() = ResolveTable::default();
        }

        if let Some(daemon) = self.daemon.take() {
            if let Some(ty_domain) = self.browsing.take() {
                let _ = daemon.stop_browse(&ty_domain);
            }
            if let Err(e) = daemon.shutdown() {
                tracing::error!("Failed to shutdown mDNS daemon: {}", e);
            }
        }
    }
}

impl Drop for MdnsProvider {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Resolve requests and results keyed by DNS-SD full name
#[derive(Default)]
struct ResolveTable {
    pending: HashMap<String, ResolutionHandler>,
    resolved: HashMap<String, ResolvedEndpoint>,
}

impl ResolveTable {
    /// Parks `handler` until the instance resolves, or hands it straight back
    /// with the endpoint if it already has
    fn request(
        &mut self,
        fullname: String,
        handler: ResolutionHandler,
    ) -> Option<(ResolutionHandler, ResolvedEndpoint)> {
        match self.resolved.get(&fullname) {
            Some(endpoint) => Some((handler, endpoint.clone())),
            None => {
                self.pending.insert(fullname, handler);
                None
            }
        }
    }

    fn resolved(
        &mut self,
        fullname: &str,
        endpoint: ResolvedEndpoint,
    ) -> Option<ResolutionHandler> {
        self.resolved.insert(fullname.to_string(), endpoint);
        self.pending.remove(fullname)
    }

    fn unresolvable(&mut self, fullname: &str) -> Option<ResolutionHandler> {
        self.pending.remove(fullname)
    }

    fn withdraw(&mut self, fullname: &str) -> Option<ResolutionHandler> {
        self.resolved.remove(fullname);
        self.pending.remove(fullname)
    }
}

/// Moves `mdns-sd` channel output onto the discovery loop
#[derive(Clone)]
struct Forwarder {
    events: EventSink,
    table: Arc<Mutex<ResolveTable>>,
    stopping: Arc<AtomicBool>,
    interface: String,
}

impl Forwarder {
    fn table(&self) -> MutexGuard<'_, ResolveTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, fullname: &str, ty_domain: &str) -> Option<ServiceRecord> {
        ServiceRecord::from_fullname(fullname, ty_domain, &self.interface)
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn forward_browse(&self, receiver: flume::Receiver<ServiceEvent>, ty_domain: &str) {
        for event in receiver.iter() {
            match event {
                ServiceEvent::SearchStarted(ty) => {
                    tracing::trace!("Searching for {}", ty);
                }
                ServiceEvent::ServiceFound(ty, fullname) => {
                    let Some(record) = self.record(&fullname, &ty) else {
                        tracing::debug!("Ignoring unexpected instance {}", fullname);
                        continue;
                    };
                    self.events.browse(BrowseEvent::New(record));
                }
                ServiceEvent::ServiceResolved(info) => self.forward_resolved(&info),
                ServiceEvent::ServiceRemoved(ty, fullname) => {
                    if let Some(handler) = self.table().withdraw(&fullname) {
                        self.events.resolved(
                            handler,
                            ResolveEvent::Failure("service removed before resolution".to_string()),
                        );
                    }
                    if let Some(record) = self.record(&fullname, &ty) {
                        self.events.browse(BrowseEvent::Remove(record));
                    }
                }
                ServiceEvent::SearchStopped(ty) => {
                    tracing::debug!("Stopped browsing {}", ty);
                    return;
                }
                #[allow(unreachable_patterns)]
                other => {
                    tracing::trace!("Ignoring mDNS event {:?}", other);
                }
            }
        }

        if !self.is_stopping() {
            self.events.browse(BrowseEvent::Failure(format!(
                "browse channel for {} closed",
                ty_domain
            )));
        }
    }

    fn forward_resolved(&self, info: &ServiceInfo) {
        let fullname = info.get_fullname();
        let Some(record) = self.record(fullname, info.get_type()) else {
            return;
        };

        match endpoint_from_info(info, &record) {
            Some(endpoint) => {
                let handler = self.table().resolved(fullname, endpoint.clone());
                if let Some(handler) = handler {
                    self.events.resolved(handler, ResolveEvent::Found(endpoint));
                }
            }
            None => {
                if let Some(handler) = self.table().unresolvable(fullname) {
                    self.events.resolved(
                        handler,
                        ResolveEvent::Failure("no address in resolution".to_string()),
                    );
                }
            }
        }
    }

    fn forward_monitor(&self, monitor: flume::Receiver<DaemonEvent>) {
        for event in monitor.iter() {
            if let DaemonEvent::Error(e) = event {
                tracing::warn!("mDNS daemon error: {}", e);
            }
        }

        if !self.is_stopping() {
            self.events
                .client_state(ClientState::Failure("mDNS daemon exited".to_string()));
        }
    }
}

/// Builds the endpoint for a resolved instance, preferring an IPv4 address
fn endpoint_from_info(info: &ServiceInfo, record: &ServiceRecord) -> Option<ResolvedEndpoint> {
    let addresses = info.get_addresses();
    let address = addresses
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addresses.iter().next())?;

    Some(ResolvedEndpoint {
        name: record.name.clone(),
        domain: record.domain.clone(),
        host: info.get_hostname().trim_end_matches('.').to_string(),
        address: address.to_string(),
        port: info.get_port(),
        flags: LookupFlags {
            multicast: true,
            ..Default::default()
        },
    })
}
