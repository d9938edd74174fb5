//! Setup gateway for an OpenClaw deployment.
//!
//! Serves a first-run wizard until a configuration has been submitted, then
//! proxies HTTP and upgraded connections to the upstream with its gateway
//! credential attached.

pub mod config;
pub mod credential;
pub mod gate;
pub mod probe;
pub mod proxy;
pub mod routes;
pub mod setup;
pub mod state;
