//! Access gate for privileged routes.
//!
//! Session state is owned by the authentication collaborator; the gate only
//! reads whether a session exists and which access level it carries. An
//! unauthenticated visit to a gated route resolves as a redirect to the
//! login route with the originally requested path preserved, never as an
//! error.

use std::sync::Arc;

/// Route the login flow lives at.
pub const LOGIN_ROUTE: &str = "/login";
/// Landing route for general operators (levels 0 and 1).
pub const DASHBOARD_ROUTE: &str = "/dashboard";
/// Landing route for the elevated application view (level 2 and above).
pub const APPLICATION_ROUTE: &str = "/application";

/// Read-only view of the authenticated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// Totally ordered privilege tier.
    pub access_level: u8,
}

/// Seam to the authentication collaborator.
pub trait SessionProvider: Send + Sync {
    fn current_session(&self) -> Option<Session>;
}

/// Outcome of gating one route visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Redirect { to: String },
}

/// Resolves authentication and landing routes for gated pages.
pub struct AccessGate {
    provider: Arc<dyn SessionProvider>,
}

impl AccessGate {
    pub fn new(provider: Arc<dyn SessionProvider>) -> Self {
        Self { provider }
    }

    pub fn is_authenticated(&self) -> bool {
        self.provider.current_session().is_some()
    }

    /// Fixed access-level → landing-route table.
    pub fn landing_route(access_level: u8) -> &'static str {
        match access_level {
            0 | 1 => DASHBOARD_ROUTE,
            _ => APPLICATION_ROUTE,
        }
    }

    /// Gate one route visit.
    ///
    /// No session redirects to login, carrying the requested path in the
    /// `next` query parameter so the login flow can return the user. An
    /// authenticated session below the required level is sent to its own
    /// landing route instead.
    pub fn check(&self, requested_path: &str, required_level: u8) -> GateDecision {
        match self.provider.current_session() {
            None => GateDecision::Redirect {
                to: format!(
                    "{}?next={}",
                    LOGIN_ROUTE,
                    urlencoding::encode(requested_path)
                ),
            },
            Some(session) if session.access_level >= required_level => GateDecision::Allow,
            Some(session) => GateDecision::Redirect {
                to: Self::landing_route(session.access_level).to_string(),
            },
        }
    }
}
