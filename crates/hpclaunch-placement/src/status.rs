//! Wait for a freshly created instance to settle.

use tracing::debug;

use hpclaunch_cloud::{CloudApi, ServerStatus};

use crate::error::PlacementResult;
use crate::poll::{PollPolicy, poll_until};

/// What the provider said about an instance once polling stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub active: bool,
    /// Fault message when the provider attached one, otherwise a
    /// description of the last observed status. Empty when active.
    pub reason: String,
    pub status: ServerStatus,
}

/// Poll `server_id` until it is `ACTIVE` or `ERROR`, or the policy's
/// budget runs out, then fetch it once more to read the outcome.
///
/// A timeout is not an error; lookup failures are.
pub async fn check_active(
    cloud: &dyn CloudApi,
    region: &str,
    server_id: &str,
    policy: PollPolicy,
) -> PlacementResult<StatusReport> {
    let settled = poll_until(policy, || async move {
        let server = cloud.get_server(region, server_id).await?;
        debug!(region, server = server_id, status = server.status.as_str(), "polled instance");
        Ok::<_, crate::error::PlacementError>(server.status.is_terminal())
    })
    .await?;

    let server = cloud.get_server(region, server_id).await?;
    if server.status == ServerStatus::Active {
        return Ok(StatusReport {
            active: true,
            reason: String::new(),
            status: server.status,
        });
    }

    let reason = match server.fault {
        Some(fault) if !fault.message.is_empty() => fault.message,
        _ if settled => format!("instance entered {} without a fault", server.status.as_str()),
        _ => format!(
            "instance still {} after {}s",
            server.status.as_str(),
            policy.budget.as_secs()
        ),
    };

    Ok(StatusReport {
        active: false,
        reason,
        status: server.status,
    })
}
