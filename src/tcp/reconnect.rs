use std::sync::Arc;

use tokio::time::sleep;
use tracing::debug;

use crate::packer::Packer;
use crate::tcp::send_socket::connect_to_neighbor;
use crate::tcp::transport::SharedTransport;

/// Periodic healing of failed outbound connections.
///
/// Every tick retries a connect for each neighbor currently marked as
/// needing reconnection; a successful connect removes the mark (inside
/// registration), a failed one leaves it for the next tick. The pause runs
/// from the point where all attempts of a tick have settled, not on a fixed
/// rate. Armed by `run`, aborted by `shutdown`.
pub(crate) async fn run_reconnect_loop<P: Packer>(shared: Arc<SharedTransport<P>>) {
    loop {
        sleep(shared.config.reconnect_interval).await;

        let pending = shared
            .state
            .read()
            .await
            .needs_reconnect
            .iter()
            .cloned()
            .collect::<Vec<_>>();
        if pending.is_empty() {
            continue;
        }
        debug!("reconnection tick: {} neighbor(s) pending", pending.len());

        let mut attempts = Vec::new();
        for neighbor in pending {
            let shared = shared.clone();
            attempts.push(tokio::spawn(async move {
                if let Err(e) = connect_to_neighbor(&shared, &neighbor).await {
                    debug!("reconnect to {:?} failed: {}", neighbor, e);
                }
            }));
        }
        for attempt in attempts {
            let _ = attempt.await;
        }
    }
}
