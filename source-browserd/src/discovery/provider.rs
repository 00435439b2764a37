use std::fmt;
use anyhow::Result;
use crate::discovery::event::EventSink;
use crate::discovery::resolve::ResolutionHandler;

/// Address family a service instance was seen on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Inet,
    Inet6,
}

/// One advertised service instance, as reported by a browse event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    /// Service type without domain, e.g. "_rtsp._tcp"
    pub service_type: String,
    pub domain: String,
    pub interface: String,
    pub protocol: Protocol,
}

impl ServiceRecord {
    /// Splits a DNS-SD full name like "studio-1._rtsp._tcp.local." using the
    /// browsed type and domain "_rtsp._tcp.local."
    pub fn from_fullname(fullname: &str, ty_domain: &str, interface: &str) -> Option<Self> {
        let name = fullname.strip_suffix(ty_domain)?.strip_suffix('.')?;
        if name.is_empty() {
            return None;
        }

        let mut labels = ty_domain.trim_end_matches('.').splitn(3, '.');
        let service = labels.next()?;
        let proto = labels.next()?;
        let domain = labels.next()?;

        Some(Self {
            name: name.to_string(),
            service_type: format!("{}.{}", service, proto),
            domain: domain.to_string(),
            interface: interface.to_string(),
            protocol: Protocol::Inet,
        })
    }

    pub fn fullname(&self) -> String {
        format!("{}.{}.{}.", self.name, self.service_type, self.domain)
    }
}

impl fmt::Display for ServiceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "service {} of type {} in domain {}",
            self.name, self.service_type, self.domain
        )
    }
}

/// Provenance of a resolution result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupFlags {
    pub local: bool,
    pub our_own: bool,
    pub wide_area: bool,
    pub multicast: bool,
    pub cached: bool,
}

/// Result of a successful resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub name: String,
    pub domain: String,
    pub host: String,
    /// Textual address, validated by the resolution handler
    pub address: String,
    pub port: u16,
    pub flags: LookupFlags,
}

impl fmt::Display for ResolvedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} ({}), local: {}, our_own: {}, wide_area: {}, multicast: {}, cached: {}",
            self.host,
            self.port,
            self.address,
            self.flags.local as u8,
            self.flags.our_own as u8,
            self.flags.wide_area as u8,
            self.flags.multicast as u8,
            self.flags.cached as u8,
        )
    }
}

/// Capabilities the discovery session needs from a service discovery backend.
///
/// Every method is called from the discovery loop thread. Providers report
/// back exclusively through the `EventSink` handed to `new_client`; a resolve
/// request carries its continuation, which the provider either returns through
/// `EventSink::resolved` exactly once or drops.
pub trait DiscoveryProvider: Send {
    /// Allocates the client bound to `interface`. Connection state changes are
    /// posted to `events`.
    fn new_client(&mut self, interface: &str, events: EventSink) -> Result<()>;

    /// (Re-)creates the browse subscription for `service_type`, replacing any
    /// previous one.
    fn subscribe(&mut self, service_type: &str) -> Result<()>;

    /// Starts resolving `record`, handing back `handler` with the outcome.
    fn resolve(&mut self, record: &ServiceRecord, handler: ResolutionHandler) -> Result<()>;

    /// Releases the client and every pending request. Idempotent.
    fn stop(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_fullname() {
        let record =
            ServiceRecord::from_fullname("studio-1._rtsp._tcp.local.", "_rtsp._tcp.local.", "eth0")
                .unwrap();

        assert_eq!(record.name, "studio-1");
        assert_eq!(record.service_type, "_rtsp._tcp");
        assert_eq!(record.domain, "local");
        assert_eq!(record.interface, "eth0");
        assert_eq!(record.fullname(), "studio-1._rtsp._tcp.local.");
    }

    #[test]
    fn test_record_name_may_contain_dots() {
        let record = ServiceRecord::from_fullname(
            "Desk Mic 2.0._rtsp._tcp.local.",
            "_rtsp._tcp.local.",
            "eth0",
        )
        .unwrap();

        assert_eq!(record.name, "Desk Mic 2.0");
    }

    #[test]
    fn test_record_from_foreign_fullname() {
        let ty = "_rtsp._tcp.local.";
        assert!(ServiceRecord::from_fullname("x._http._tcp.local.", ty, "eth0").is_none());
        assert!(ServiceRecord::from_fullname("_rtsp._tcp.local.", ty, "eth0").is_none());
    }

    #[test]
    fn test_endpoint_display_lists_flags() {
        let endpoint = ResolvedEndpoint {
            name: "studio-1".into(),
            domain: "local".into(),
            host: "studio.local".into(),
            address: "10.0.0.5".into(),
            port: 8554,
            flags: LookupFlags {
                multicast: true,
                ..Default::default()
            },
        };

        assert_eq!(
            endpoint.to_string(),
            "studio.local:8554 (10.0.0.5), \
             local: 0, our_own: 0, wide_area: 0, multicast: 1, cached: 0"
        );
    }
}
