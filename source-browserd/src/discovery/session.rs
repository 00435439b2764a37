use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use anyhow::{anyhow, Context, Result};
use shared::types::BrowserStatus;
use crate::discovery::browse;
use crate::discovery::event::{ClientState, EventSink, LoopEvent};
use crate::discovery::provider::DiscoveryProvider;
use crate::discovery::SourceSink;
use crate::probe::{ProbeContext, ProbeRegistry};

/// Builds a fresh, unconnected provider for each `init`
pub type ProviderFactory = Box<dyn Fn() -> Box<dyn DiscoveryProvider> + Send + Sync>;

/// State shared with the discovery loop and every handler it runs
pub struct SessionContext {
    pub registry: Arc<ProbeRegistry>,
    pub probe: Arc<ProbeContext>,
    /// Cleared by `terminate` before draining; no probe starts once it is false
    pub running: Arc<AtomicBool>,
    pub service_type: String,
}

impl SessionContext {
    pub fn new(service_type: impl Into<String>, probe: ProbeContext) -> Self {
        Self {
            registry: Arc::new(ProbeRegistry::new()),
            probe: Arc::new(probe),
            running: Arc::new(AtomicBool::new(false)),
            service_type: service_type.into(),
        }
    }

    pub(crate) fn sink(&self) -> &dyn SourceSink {
        self.probe.sink.as_ref()
    }
}

struct RunLoop {
    tx: flume::Sender<LoopEvent>,
    thread: JoinHandle<()>,
}

enum SessionState {
    NotRunning,
    Running(RunLoop),
}

/// Owns the provider connection and the discovery loop thread
pub struct DiscoverySession {
    interface: String,
    ctx: Arc<SessionContext>,
    make_provider: ProviderFactory,
    state: SessionState,
}

impl DiscoverySession {
    pub fn new(
        interface: impl Into<String>,
        ctx: SessionContext,
        make_provider: ProviderFactory,
    ) -> Self {
        Self {
            interface: interface.into(),
            ctx: Arc::new(ctx),
            make_provider,
            state: SessionState::NotRunning,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, SessionState::Running(_))
    }

    pub fn registry(&self) -> &Arc<ProbeRegistry> {
        &self.ctx.registry
    }

    /// Cheap handle for reporting session status from other tasks
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            running: self.ctx.running.clone(),
            registry: self.ctx.registry.clone(),
        }
    }

    /// Connects the provider and starts the discovery loop. Does nothing if
    /// the session is already running.
    pub fn init(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let (tx, rx) = flume::unbounded();
        let mut provider = (self.make_provider)();
        provider
            .new_client(&self.interface, EventSink::new(tx.clone()))
            .with_context(|| format!("Failed to create mDNS client on {}", self.interface))?;

        self.ctx.running.store(true, Ordering::SeqCst);
        let ctx = self.ctx.clone();
        let spawned = thread::Builder::new()
            .name("discovery-loop".to_string())
            .spawn(move || run_loop(provider, rx, ctx));

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.ctx.running.store(false, Ordering::SeqCst);
                return Err(e).context("Failed to spawn discovery loop");
            }
        };

        tracing::info!(
            "Discovery session started on {} for {}",
            self.interface,
            self.ctx.service_type
        );
        self.state = SessionState::Running(RunLoop { tx, thread });
        Ok(())
    }

    /// Removes finished probes without blocking
    pub fn reap(&self) -> usize {
        self.ctx.registry.reap()
    }

    /// Stops accepting probes, waits for in-flight ones, then stops the loop.
    /// Does nothing if the session is not running.
    pub fn terminate(&mut self) -> Result<()> {
        let SessionState::Running(run_loop) =
            std::mem::replace(&mut self.state, SessionState::NotRunning)
        else {
            return Ok(());
        };

        self.ctx.running.store(false, Ordering::SeqCst);

        tracing::info!(
            "Waiting for {} RTSP probes",
            self.ctx.registry.len()
        );
        self.ctx.registry.drain();

        // The loop may already be gone after a fatal provider failure
        let _ = run_loop.tx.send(LoopEvent::Stop);
        run_loop
            .thread
            .join()
            .map_err(|_| anyhow!("Discovery loop panicked"))?;

        tracing::info!("Discovery session stopped");
        Ok(())
    }
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            tracing::error!("Failed to terminate discovery session: {:#}", e);
        }
    }
}

/// Read-only view of a session for the API
#[derive(Clone)]
pub struct SessionStatus {
    running: Arc<AtomicBool>,
    registry: Arc<ProbeRegistry>,
}

impl SessionStatus {
    pub fn snapshot(&self) -> BrowserStatus {
        BrowserStatus {
            running: self.running.load(Ordering::SeqCst),
            pending_probes: self.registry.len(),
        }
    }
}

fn run_loop(
    mut provider: Box<dyn DiscoveryProvider>,
    events: flume::Receiver<LoopEvent>,
    ctx: Arc<SessionContext>,
) {
    tracing::debug!("Discovery loop running");

    for event in events.iter() {
        let flow = match event {
            LoopEvent::Client(state) => on_client_state(state, provider.as_mut(), &ctx),
            LoopEvent::Browse(event) => browse::handle(event, provider.as_mut(), &ctx),
            LoopEvent::Resolved(handler, event) => {
                handler.handle(event, &ctx);
                ControlFlow::Continue(())
            }
            LoopEvent::Stop => ControlFlow::Break(()),
        };
        if flow.is_break() {
            break;
        }
    }

    provider.stop();
    tracing::debug!("Discovery loop exited");
}

fn on_client_state(
    state: ClientState,
    provider: &mut dyn DiscoveryProvider,
    ctx: &SessionContext,
) -> ControlFlow<()> {
    match state {
        ClientState::Registering | ClientState::Running | ClientState::Collision => {
            if let Err(e) = provider.subscribe(&ctx.service_type) {
                tracing::error!("Failed to create service browser: {:#}", e);
                return ControlFlow::Break(());
            }
            tracing::info!("Browsing for {}", ctx.service_type);
        }
        ClientState::Failure(reason) => {
            // TODO: reconnect instead of stopping the loop
            tracing::error!("mDNS client failure: {}", reason);
            return ControlFlow::Break(());
        }
        ClientState::Connecting => {}
    }
    ControlFlow::Continue(())
}
