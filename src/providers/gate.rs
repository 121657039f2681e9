use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Shared minimum-interval gate for outbound provider requests
///
/// Every provider call acquires the gate before hitting the network, so the
/// spacing policy holds across heterogeneous call sites (address lookup,
/// geocoding, leg fetches) and across stops within the same batch. This is
/// the single place the rate policy lives.
pub struct RequestGate {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until at least `min_interval` has passed since the previous
    /// acquisition, then claim the slot
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
