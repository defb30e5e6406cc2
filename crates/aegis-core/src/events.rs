//! Typed event plumbing for admission and resilience patterns.
//!
//! Each pattern crate defines an event enum implementing [`PatternEvent`]
//! and carries a [`Listeners`] collection in its configuration. Handlers
//! run synchronously on the emitting worker.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// An event emitted by a pattern instance.
pub trait PatternEvent: Send + Sync + fmt::Debug {
    /// The event kind, e.g. `"state_transition"` or `"call_rejected"`.
    fn kind(&self) -> &'static str;

    /// When the event occurred.
    fn occurred_at(&self) -> Instant;

    /// The name of the pattern instance that emitted the event.
    fn source(&self) -> &str;
}

/// A handler for pattern events.
pub trait EventListener<E: PatternEvent>: Send + Sync {
    /// Called synchronously for each emitted event.
    fn on_event(&self, event: &E);
}

/// Shared handle to a registered listener.
pub type SharedListener<E> = Arc<dyn EventListener<E>>;

/// An ordered collection of event listeners.
///
/// Cloning is cheap; the listeners themselves are shared.
#[derive(Clone)]
pub struct Listeners<E: PatternEvent> {
    inner: Vec<SharedListener<E>>,
}

impl<E: PatternEvent> Listeners<E> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self { inner: Vec::new() }
    }

    /// Registers a listener.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.inner.push(Arc::new(listener));
    }

    /// Emits an event to every registered listener.
    ///
    /// A panicking listener does not prevent the remaining listeners from
    /// running; the panic is caught, logged, and (with the `metrics`
    /// feature) counted.
    pub fn emit(&self, event: &E) {
        for (index, listener) in self.inner.iter().enumerate() {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            if outcome.is_err() {
                tracing::warn!(
                    listener_index = index,
                    source = event.source(),
                    kind = event.kind(),
                    "event listener panicked"
                );

                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "aegis_event_listener_panics_total",
                    "source" => event.source().to_string(),
                    "kind" => event.kind().to_string()
                )
                .increment(1);
            }
        }
    }

    /// Returns true when no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<E: PatternEvent> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapts a closure into an [`EventListener`].
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _marker: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Wraps the closure.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: PatternEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct ProbeEvent {
        name: String,
        at: Instant,
    }

    impl PatternEvent for ProbeEvent {
        fn kind(&self) -> &'static str {
            "probe"
        }

        fn occurred_at(&self) -> Instant {
            self.at
        }

        fn source(&self) -> &str {
            &self.name
        }
    }

    fn probe() -> ProbeEvent {
        ProbeEvent {
            name: "probe".to_string(),
            at: Instant::now(),
        }
    }

    #[test]
    fn listeners_receive_every_emit() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);

        let mut listeners = Listeners::new();
        listeners.add(FnListener::new(move |_: &ProbeEvent| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        listeners.emit(&probe());
        listeners.emit(&probe());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_listener_does_not_starve_the_rest() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);

        let mut listeners = Listeners::new();
        listeners.add(FnListener::new(|_: &ProbeEvent| panic!("boom")));
        listeners.add(FnListener::new(move |_: &ProbeEvent| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        listeners.emit(&probe());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_and_len() {
        let mut listeners: Listeners<ProbeEvent> = Listeners::new();
        assert!(listeners.is_empty());
        listeners.add(FnListener::new(|_: &ProbeEvent| ()));
        assert_eq!(listeners.len(), 1);
    }
}
