use std::ops::ControlFlow;
use crate::discovery::event::BrowseEvent;
use crate::discovery::provider::DiscoveryProvider;
use crate::discovery::resolve::ResolutionHandler;
use crate::discovery::session::SessionContext;

/// Reacts to one browse event on the discovery loop.
/// Returns `Break` when the subscription failed and the loop must stop.
pub(crate) fn handle(
    event: BrowseEvent,
    provider: &mut dyn DiscoveryProvider,
    ctx: &SessionContext,
) -> ControlFlow<()> {
    match event {
        BrowseEvent::Failure(reason) => {
            // No resubscription; the session stays down until restarted
            tracing::error!("Service browser failed: {}", reason);
            return ControlFlow::Break(());
        }
        BrowseEvent::New(record) => {
            tracing::info!("Browser NEW: {}", record);
            let handler = ResolutionHandler::new(record.clone());
            if let Err(e) = provider.resolve(&record, handler) {
                tracing::error!("Failed to resolve service {}: {:#}", record.name, e);
            }
        }
        BrowseEvent::Remove(record) => {
            tracing::info!("Browser REMOVE: {}", record);
            ctx.sink().on_remove_source(&record.name, &record.domain);
        }
        BrowseEvent::AllForNow => {
            tracing::debug!("Browser ALL_FOR_NOW");
        }
        BrowseEvent::CacheExhausted => {
            tracing::debug!("Browser CACHE_EXHAUSTED");
        }
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, record, FakeProber, FakeProvider, RecordingSink, SinkCall};

    #[test]
    fn test_new_requests_resolution() {
        let (mut provider, state) = FakeProvider::new();
        let sink = RecordingSink::new();
        let ctx = context(FakeProber::ok("v=0\r\n"), sink.clone());

        let flow = handle(BrowseEvent::New(record("studio-1")), &mut provider, &ctx);

        assert!(flow.is_continue());
        assert_eq!(state.resolved_names(), vec!["studio-1".to_string()]);
        assert!(sink.calls().is_empty());
    }

    #[test]
    fn test_resolve_request_failure_is_local() {
        let (mut provider, state) = FakeProvider::new();
        state.fail_resolve(true);
        let ctx = context(FakeProber::ok("v=0\r\n"), RecordingSink::new());

        let flow = handle(BrowseEvent::New(record("studio-1")), &mut provider, &ctx);

        assert!(flow.is_continue());
        assert!(state.resolved_names().is_empty());
    }

    #[test]
    fn test_remove_notifies_sink_synchronously() {
        let (mut provider, state) = FakeProvider::new();
        let sink = RecordingSink::new();
        let ctx = context(FakeProber::ok("v=0\r\n"), sink.clone());

        let flow = handle(BrowseEvent::Remove(record("studio-1")), &mut provider, &ctx);

        assert!(flow.is_continue());
        assert_eq!(
            sink.calls(),
            vec![SinkCall::Removed("studio-1".into(), "local".into())]
        );
        assert!(state.resolved_names().is_empty());
    }

    #[test]
    fn test_informational_events_change_nothing() {
        let (mut provider, state) = FakeProvider::new();
        let sink = RecordingSink::new();
        let ctx = context(FakeProber::ok("v=0\r\n"), sink.clone());

        assert!(handle(BrowseEvent::AllForNow, &mut provider, &ctx).is_continue());
        assert!(handle(BrowseEvent::CacheExhausted, &mut provider, &ctx).is_continue());

        assert!(sink.calls().is_empty());
        assert!(state.resolved_names().is_empty());
    }

    #[test]
    fn test_failure_stops_loop() {
        let (mut provider, _state) = FakeProvider::new();
        let ctx = context(FakeProber::ok("v=0\r\n"), RecordingSink::new());

        let flow = handle(BrowseEvent::Failure("daemon gone".into()), &mut provider, &ctx);

        assert!(flow.is_break());
    }
}
