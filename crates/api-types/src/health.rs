use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Response of `GET /api/health`: whether the upstream accepts TCP connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HealthResponse {
    pub ready: bool,
}
