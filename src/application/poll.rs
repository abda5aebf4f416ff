use crate::domain::ports::PaymentTransportRef;
use crate::domain::remote::PollResponse;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Repeatedly polls a terminal transaction until the backend reports a terminal status.
///
/// Transport errors are treated as transient: they are logged and the next
/// cycle runs after the usual interval. The loop has no deadline of its own;
/// the orchestrator races it against one.
pub struct PollLoop {
    transport: PaymentTransportRef,
    transaction_id: String,
    interval: Duration,
}

impl PollLoop {
    pub fn new(
        transport: PaymentTransportRef,
        transaction_id: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            transport,
            transaction_id: transaction_id.into(),
            interval,
        }
    }

    /// Runs until a terminal status is observed (`Some`) or `cancel` fires (`None`).
    pub async fn run(&self, cancel: &CancellationToken) -> Option<PollResponse> {
        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            let response = tokio::select! {
                _ = cancel.cancelled() => return None,
                response = self.transport.poll_status(&self.transaction_id) => response,
            };

            match response {
                Ok(response) if response.status.is_terminal() => {
                    debug!(
                        transaction_id = %self.transaction_id,
                        cycle,
                        status = ?response.status,
                        "terminal status observed"
                    );
                    return Some(response);
                }
                Ok(response) => {
                    debug!(
                        transaction_id = %self.transaction_id,
                        cycle,
                        status = ?response.status,
                        "{}",
                        response.status.label()
                    );
                }
                Err(e) => {
                    warn!(
                        transaction_id = %self.transaction_id,
                        cycle,
                        "Poll failed, retrying: {}",
                        e
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
