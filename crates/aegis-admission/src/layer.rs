//! Tower integration: gate requests at a service boundary.
//!
//! The layer extracts a [`GateRequest`] from each inner request, asks the
//! [`AdmissionGate`], and short-circuits denials with
//! [`AdmissionError::Denied`]. Transports render the denial via
//! [`GateDecision::to_http`].

use crate::gate::{AdmissionGate, GateDecision, GateRequest};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Error type of the gated service.
#[derive(Debug)]
pub enum AdmissionError<E> {
    /// The gate denied the request.
    Denied(GateDecision),
    /// The inner service failed.
    Inner(E),
}

impl<E> AdmissionError<E> {
    /// Whether the request was denied by the gate.
    pub fn is_denied(&self) -> bool {
        matches!(self, AdmissionError::Denied(_))
    }

    /// The gate decision behind a denial.
    pub fn decision(&self) -> Option<&GateDecision> {
        match self {
            AdmissionError::Denied(decision) => Some(decision),
            AdmissionError::Inner(_) => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for AdmissionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::Denied(decision) => {
                let code = decision
                    .reason
                    .as_ref()
                    .map(|r| r.code())
                    .unwrap_or("denied");
                write!(f, "request denied: {code}")
            }
            AdmissionError::Inner(e) => write!(f, "service error: {e}"),
        }
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for AdmissionError<E> {}

/// Extracts gate metadata from an inner request.
pub type Extractor<Req> = Arc<dyn Fn(&Req) -> GateRequest + Send + Sync>;

/// Layer that wraps a service with the admission gate.
pub struct AdmissionLayer<Req> {
    gate: Arc<AdmissionGate>,
    extractor: Extractor<Req>,
}

impl<Req> AdmissionLayer<Req> {
    /// Creates a layer with a metadata extractor.
    pub fn new<F>(gate: Arc<AdmissionGate>, extractor: F) -> Self
    where
        F: Fn(&Req) -> GateRequest + Send + Sync + 'static,
    {
        Self {
            gate,
            extractor: Arc::new(extractor),
        }
    }
}

impl<Req> Clone for AdmissionLayer<Req> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            extractor: Arc::clone(&self.extractor),
        }
    }
}

impl<S, Req> Layer<S> for AdmissionLayer<Req> {
    type Service = Admission<S, Req>;

    fn layer(&self, inner: S) -> Self::Service {
        Admission {
            inner,
            gate: Arc::clone(&self.gate),
            extractor: Arc::clone(&self.extractor),
        }
    }
}

/// A service gated by admission control.
pub struct Admission<S, Req> {
    inner: S,
    gate: Arc<AdmissionGate>,
    extractor: Extractor<Req>,
}

impl<S: Clone, Req> Clone for Admission<S, Req> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gate: Arc::clone(&self.gate),
            extractor: Arc::clone(&self.extractor),
        }
    }
}

impl<S, Req> Service<Req> for Admission<S, Req>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = AdmissionError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(AdmissionError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let meta = (self.extractor)(&req);
        let gate = Arc::clone(&self.gate);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let decision = gate.gate(meta).await;
            if !decision.allowed {
                return Err(AdmissionError::Denied(decision));
            }
            inner.call(req).await.map_err(AdmissionError::Inner)
        })
    }
}
