pub mod registry;

use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use crate::discovery::SourceSink;
use crate::rtsp::Describe;

pub use registry::ProbeRegistry;

static NEXT_PROBE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a probe in completion notices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeId(u64);

/// Shared by every probe worker
pub struct ProbeContext {
    pub prober: Arc<dyn Describe>,
    pub sink: Arc<dyn SourceSink>,
    /// Prepended to the instance name to form the DESCRIBE path
    pub path_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub name: String,
    pub domain: String,
    pub address: Ipv4Addr,
    pub port: u16,
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}:{}", self.name, self.domain, self.address, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Delivered,
    Failed,
}

/// Posts the completion notice when the worker exits, unwinding included
struct NotifyOnExit {
    id: ProbeId,
    done: flume::Sender<ProbeId>,
}

impl Drop for NotifyOnExit {
    fn drop(&mut self) {
        let _ = self.done.send(self.id);
    }
}

/// One in-flight describe request, running on its own thread.
///
/// The unit lives until its outcome is observed by the registry, which may be
/// well after the worker thread has finished.
pub struct ProbeUnit {
    id: ProbeId,
    target: ProbeTarget,
    handle: Option<JoinHandle<ProbeOutcome>>,
}

impl ProbeUnit {
    /// Starts describing `target` on a new thread. A successful describe is
    /// delivered to the sink from that thread; failures are only logged.
    pub fn dispatch(
        ctx: &Arc<ProbeContext>,
        target: ProbeTarget,
        done: flume::Sender<ProbeId>,
    ) -> io::Result<Self> {
        let id = ProbeId(NEXT_PROBE_ID.fetch_add(1, Ordering::Relaxed));
        let ctx = ctx.clone();
        let worker_target = target.clone();

        let handle = thread::Builder::new()
            .name(format!("probe-{}", id.0))
            .spawn(move || {
                let _notify = NotifyOnExit { id, done };
                run_probe(&ctx, &worker_target)
            })?;

        Ok(Self {
            id,
            target,
            handle: Some(handle),
        })
    }

    pub fn id(&self) -> ProbeId {
        self.id
    }

    /// True once the outcome can be observed without blocking, or when there
    /// is no worker left to observe
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the worker if still running and records its outcome
    pub fn observe(mut self) -> Option<ProbeOutcome> {
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(outcome) => {
                tracing::trace!("Probe for {} finished: {:?}", self.target, outcome);
                Some(outcome)
            }
            Err(_) => {
                tracing::error!("Probe worker for {} panicked", self.target);
                None
            }
        }
    }
}

fn run_probe(ctx: &ProbeContext, target: &ProbeTarget) -> ProbeOutcome {
    let path = format!("{}{}", ctx.path_prefix, target.name);
    match ctx.prober.describe(&path, target.address, target.port) {
        Ok(description) => {
            tracing::info!("Described RTSP source {} at {}", target.name, description.url);
            ctx.sink.on_new_source(&target.name, &target.domain, &description);
            ProbeOutcome::Delivered
        }
        Err(e) => {
            tracing::debug!("RTSP probe of {} failed: {:#}", target, e);
            ProbeOutcome::Failed
        }
    }
}
