//! Per-route fault containment.
//!
//! Each routed page renders inside its own boundary. A fault while rendering
//! (an `Err` return or a panic in the view closure) trips the boundary into
//! `Errored`: the captured fault is reported once to the operational log
//! sink and the fallback view renders in place of the children. The state is
//! terminal for the instance; only remounting a fresh boundary returns the
//! route to `Normal`. Boundaries nest per route, so a fault in one subtree
//! is invisible to sibling routes.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tracing::error;

/// Fault raised by a routed view.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct RenderFault(pub String);

impl RenderFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Boundary state machine: `Normal` until a descendant faults, `Errored`
/// forever after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryState {
    Normal,
    Errored,
}

/// Fault captured by a boundary, with the route it happened under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFault {
    pub route: String,
    pub message: String,
}

/// One-way notification sink for captured faults.
///
/// The boundary's rendering behavior never depends on whether the sink
/// accepted the report.
pub trait FaultSink: Send + Sync {
    fn report(&self, fault: &CapturedFault);
}

/// Default sink: the tracing pipeline.
#[derive(Debug, Default)]
pub struct TracingFaultSink;

impl FaultSink for TracingFaultSink {
    fn report(&self, fault: &CapturedFault) {
        error!(route = %fault.route, message = %fault.message, "route render fault captured");
    }
}

/// Fault boundary for a single routed subtree.
pub struct RouteFaultBoundary {
    route: String,
    fallback: Option<String>,
    sink: Arc<dyn FaultSink>,
    fault: Option<CapturedFault>,
}

impl RouteFaultBoundary {
    pub fn new(route: impl Into<String>, sink: Arc<dyn FaultSink>) -> Self {
        Self {
            route: route.into(),
            fallback: None,
            sink,
            fault: None,
        }
    }

    /// Replace the default diagnostic panel with a caller-supplied view.
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    pub fn state(&self) -> BoundaryState {
        if self.fault.is_some() {
            BoundaryState::Errored
        } else {
            BoundaryState::Normal
        }
    }

    pub fn fault(&self) -> Option<&CapturedFault> {
        self.fault.as_ref()
    }

    /// Render the routed view inside this boundary.
    ///
    /// In `Errored` the children are not invoked again; the fallback renders
    /// until the boundary is remounted.
    pub fn render<F>(&mut self, view: F) -> String
    where
        F: FnOnce() -> Result<String, RenderFault>,
    {
        if self.fault.is_some() {
            return self.fallback_view();
        }

        match catch_unwind(AssertUnwindSafe(view)) {
            Ok(Ok(rendered)) => rendered,
            Ok(Err(fault)) => self.trip(fault.0),
            Err(panic) => self.trip(panic_message(panic)),
        }
    }

    fn trip(&mut self, message: String) -> String {
        let fault = CapturedFault {
            route: self.route.clone(),
            message,
        };
        self.sink.report(&fault);
        self.fault = Some(fault);
        self.fallback_view()
    }

    fn fallback_view(&self) -> String {
        match (&self.fallback, &self.fault) {
            (Some(fallback), _) => fallback.clone(),
            (None, Some(fault)) => {
                format!("something went wrong rendering this page: {}", fault.message)
            }
            (None, None) => String::new(),
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Routes composed of independent fault boundaries.
///
/// Each route gets its own boundary on first render; remounting a route
/// replaces its boundary with a fresh instance, which is the only path back
/// to `Normal`.
pub struct RouteTable {
    sink: Arc<dyn FaultSink>,
    boundaries: HashMap<String, RouteFaultBoundary>,
}

impl RouteTable {
    pub fn new(sink: Arc<dyn FaultSink>) -> Self {
        Self {
            sink,
            boundaries: HashMap::new(),
        }
    }

    /// Render one route inside its own boundary.
    pub fn render_route<F>(&mut self, route: &str, view: F) -> String
    where
        F: FnOnce() -> Result<String, RenderFault>,
    {
        let sink = self.sink.clone();
        self.boundaries
            .entry(route.to_string())
            .or_insert_with(|| RouteFaultBoundary::new(route, sink))
            .render(view)
    }

    pub fn route_state(&self, route: &str) -> Option<BoundaryState> {
        self.boundaries.get(route).map(RouteFaultBoundary::state)
    }

    /// Remount a route with a fresh boundary instance.
    pub fn remount(&mut self, route: &str) {
        self.boundaries.remove(route);
    }
}
