use std::time::Duration;

use tokio::net::TcpStream;

use crate::config::UpstreamTarget;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Whether the upstream accepts a TCP connection within `timeout`.
///
/// The probe connection is dropped as soon as it is established; nothing is
/// written to it. Resolution failures, refusals and timeouts all read as "not
/// ready".
pub async fn probe_upstream(target: &UpstreamTarget, timeout: Duration) -> bool {
    let connect = TcpStream::connect((target.host.as_str(), target.port));
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => {
            drop(stream);
            true
        }
        Ok(Err(e)) => {
            tracing::debug!(upstream = %target, error = %e, "Upstream probe failed");
            false
        }
        Err(_) => {
            tracing::debug!(upstream = %target, ?timeout, "Upstream probe timed out");
            false
        }
    }
}
