//! Fakes shared by the unit tests

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use anyhow::{anyhow, bail, Result};
use crate::discovery::{
    BrowseEvent, ClientState, DiscoveryProvider, EventSink, LookupFlags, Protocol,
    ResolutionHandler, ResolveEvent, ResolvedEndpoint, ServiceRecord, SessionContext, SourceSink,
};
use crate::probe::ProbeContext;
use crate::rtsp::{Describe, SourceDescription};

/// Polls `cond` for up to five seconds
pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub fn record(name: &str) -> ServiceRecord {
    ServiceRecord {
        name: name.to_string(),
        service_type: "_rtsp._tcp".to_string(),
        domain: "local".to_string(),
        interface: "eth0".to_string(),
        protocol: Protocol::Inet,
    }
}

pub fn endpoint(name: &str, address: &str, port: u16) -> ResolvedEndpoint {
    ResolvedEndpoint {
        name: name.to_string(),
        domain: "local".to_string(),
        host: format!("{}.local", name),
        address: address.to_string(),
        port,
        flags: LookupFlags {
            multicast: true,
            ..Default::default()
        },
    }
}

pub fn probe_context(prober: FakeProber, sink: RecordingSink) -> ProbeContext {
    ProbeContext {
        prober: Arc::new(prober),
        sink: Arc::new(sink),
        path_prefix: "/by-name/".to_string(),
    }
}

/// A running session context, as seen by handlers on the loop
pub fn context(prober: FakeProber, sink: RecordingSink) -> SessionContext {
    let ctx = SessionContext::new("_rtsp._tcp.local.", probe_context(prober, sink));
    ctx.running.store(true, Ordering::SeqCst);
    ctx
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Added(String, String, SourceDescription),
    Removed(String, String),
}

/// Records every delivery callback in order
#[derive(Clone, Default)]
pub struct RecordingSink {
    calls: Arc<Mutex<Vec<SinkCall>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn added_names(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Added(name, _, _) => Some(name),
                SinkCall::Removed(..) => None,
            })
            .collect()
    }
}

impl SourceSink for RecordingSink {
    fn on_new_source(&self, name: &str, domain: &str, description: &SourceDescription) {
        self.calls.lock().unwrap().push(SinkCall::Added(
            name.to_string(),
            domain.to_string(),
            description.clone(),
        ));
    }

    fn on_remove_source(&self, name: &str, domain: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(SinkCall::Removed(name.to_string(), domain.to_string()));
    }
}

#[derive(Clone, Copy)]
enum Behaviour {
    Ok,
    Fail,
    Panic,
}

/// Scripted probe client. A gated prober blocks every call until released.
#[derive(Clone)]
pub struct FakeProber {
    sdp: String,
    behaviour: Behaviour,
    gate: Option<Arc<(Mutex<bool>, Condvar)>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeProber {
    fn with(sdp: &str, behaviour: Behaviour, gated: bool) -> Self {
        Self {
            sdp: sdp.to_string(),
            behaviour,
            gate: gated.then(|| Arc::new((Mutex::new(false), Condvar::new()))),
            calls: Arc::default(),
        }
    }

    pub fn ok(sdp: &str) -> Self {
        Self::with(sdp, Behaviour::Ok, false)
    }

    pub fn gated(sdp: &str) -> Self {
        Self::with(sdp, Behaviour::Ok, true)
    }

    pub fn failing() -> Self {
        Self::with("", Behaviour::Fail, false)
    }

    pub fn panicking() -> Self {
        Self::with("", Behaviour::Panic, false)
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            *gate.0.lock().unwrap() = true;
            gate.1.notify_all();
        }
    }

    /// "path address:port" for every describe call so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Describe for FakeProber {
    fn describe(&self, path: &str, address: Ipv4Addr, port: u16) -> Result<SourceDescription> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}:{}", path, address, port));

        if let Some(gate) = &self.gate {
            let mut open = gate.0.lock().unwrap();
            while !*open {
                open = gate.1.wait(open).unwrap();
            }
        }

        match self.behaviour {
            Behaviour::Ok => Ok(SourceDescription::new(
                format!("rtsp://{}:{}{}", address, port, path),
                self.sdp.clone(),
            )),
            Behaviour::Fail => Err(anyhow!("connection refused")),
            Behaviour::Panic => panic!("probe client blew up"),
        }
    }
}

#[derive(Default)]
struct FakeState {
    clients: usize,
    stops: usize,
    subscriptions: Vec<String>,
    resolved: Vec<String>,
    scripted: HashMap<String, ResolveEvent>,
    parked: Vec<ResolutionHandler>,
    events: Option<EventSink>,
    fail_client: bool,
    fail_subscribe: bool,
    fail_resolve: bool,
}

/// Test-side handle on a fake provider's state
#[derive(Clone, Default)]
pub struct FakeHandle {
    state: Arc<Mutex<FakeState>>,
}

impl FakeHandle {
    fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn clients(&self) -> usize {
        self.with(|s| s.clients)
    }

    pub fn stops(&self) -> usize {
        self.with(|s| s.stops)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.with(|s| s.subscriptions.clone())
    }

    /// Names of instances a resolution was started for
    pub fn resolved_names(&self) -> Vec<String> {
        self.with(|s| s.resolved.clone())
    }

    pub fn fail_client(&self, fail: bool) {
        self.with(|s| s.fail_client = fail);
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.with(|s| s.fail_subscribe = fail);
    }

    pub fn fail_resolve(&self, fail: bool) {
        self.with(|s| s.fail_resolve = fail);
    }

    /// Answer resolve requests for `name` immediately with `event`
    pub fn script_resolution(&self, name: &str, event: ResolveEvent) {
        self.with(|s| s.scripted.insert(name.to_string(), event));
    }

    fn events(&self) -> EventSink {
        self.with(|s| s.events.clone()).expect("no client connected")
    }

    pub fn browse(&self, event: BrowseEvent) {
        self.events().browse(event);
    }

    pub fn client_state(&self, state: ClientState) {
        self.events().client_state(state);
    }
}

pub struct FakeProvider {
    handle: FakeHandle,
}

impl FakeProvider {
    pub fn new() -> (Self, FakeHandle) {
        let handle = FakeHandle::default();
        (Self::attached(handle.clone()), handle)
    }

    pub fn attached(handle: FakeHandle) -> Self {
        Self { handle }
    }
}

impl DiscoveryProvider for FakeProvider {
    fn new_client(&mut self, _interface: &str, events: EventSink) -> Result<()> {
        self.handle.with(|s| {
            if s.fail_client {
                bail!("daemon not running");
            }
            s.clients += 1;
            s.events = Some(events.clone());
            Ok(())
        })?;
        events.client_state(ClientState::Connecting);
        events.client_state(ClientState::Running);
        Ok(())
    }

    fn subscribe(&mut self, service_type: &str) -> Result<()> {
        self.handle.with(|s| {
            if s.fail_subscribe {
                bail!("bad service type");
            }
            s.subscriptions.push(service_type.to_string());
            Ok(())
        })
    }

    fn resolve(&mut self, record: &ServiceRecord, handler: ResolutionHandler) -> Result<()> {
        self.handle.with(|s| {
            if s.fail_resolve {
                bail!("too many resolvers");
            }
            match s.scripted.get(&record.name) {
                Some(event) => {
                    if let Some(events) = &s.events {
                        events.resolved(handler, event.clone());
                    }
                }
                None => s.parked.push(handler),
            }
            s.resolved.push(record.name.clone());
            Ok(())
        })
    }

    fn stop(&mut self) {
        self.handle.with(|s| {
            s.stops += 1;
            s.parked.clear();
        });
    }
}
