//! Dispatch decisions for inbound requests.
//!
//! The gateway is a two-state machine. It starts `Unconfigured`, serving the
//! setup wizard for every path, and moves to `Configured` once a setup
//! submission has persisted the completion marker. The state is re-derived
//! from storage on every request, so the transition is visible immediately
//! and never needs a restart of this process.

use axum::http::Method;

pub const SETUP_PAGE_PATH: &str = "/setup";
pub const SETUP_API_PATH: &str = "/api/setup";
pub const HEALTH_API_PATH: &str = "/api/health";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupState {
    Unconfigured,
    Configured,
}

impl SetupState {
    pub fn from_marker(marker_exists: bool) -> Self {
        if marker_exists {
            SetupState::Configured
        } else {
            SetupState::Unconfigured
        }
    }

    pub fn is_configured(self) -> bool {
        matches!(self, SetupState::Configured)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Serve the setup wizard page.
    Wizard,
    /// Return the persisted setup fields.
    ReadSetup,
    /// Validate and persist a setup submission, then restart the upstream.
    SubmitSetup,
    /// Probe the upstream for readiness.
    Health,
    /// Forward to the upstream.
    Proxy,
}

impl Route {
    /// Special paths win regardless of state; everything else is gated.
    pub fn resolve(state: SetupState, method: &Method, path: &str) -> Route {
        match path {
            SETUP_API_PATH if method == Method::POST => Route::SubmitSetup,
            SETUP_API_PATH if method == Method::GET => Route::ReadSetup,
            HEALTH_API_PATH => Route::Health,
            SETUP_PAGE_PATH => Route::Wizard,
            _ if state.is_configured() => Route::Proxy,
            _ => Route::Wizard,
        }
    }
}

/// What to do with a connection-upgrade request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeRoute {
    /// Answer 503 and close without touching the upstream.
    Refuse,
    Proxy,
}

impl UpgradeRoute {
    pub fn resolve(state: SetupState) -> UpgradeRoute {
        match state {
            SetupState::Configured => UpgradeRoute::Proxy,
            SetupState::Unconfigured => UpgradeRoute::Refuse,
        }
    }
}
