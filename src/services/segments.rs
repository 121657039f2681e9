use std::future::Future;
use std::sync::Arc;

use crate::models::{Coordinates, RouteLeg, Stop};
use crate::providers::routing::{RoutingClient, RoutingError};

/// Outcome counters for one segmenting pass
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SegmentOutcome {
    pub updated: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Annotates an ordered stop sequence with per-leg metrics and geometry
pub struct SegmentService {
    router: Arc<RoutingClient>,
}

impl SegmentService {
    pub fn new(router: Arc<RoutingClient>) -> Self {
        Self { router }
    }

    /// Compute legs pairwise and sequentially from `origin` through the
    /// given ordering, mutating each stop's incoming leg in place
    pub async fn segments(&self, origin: Option<Coordinates>, stops: &mut [Stop]) -> SegmentOutcome {
        apply_legs(origin, stops, |from, to| self.router.route(from, to)).await
    }
}

/// Pairwise leg computation over an ordered stop slice
///
/// Legs are fetched one consecutive pair at a time rather than as a single
/// multi-waypoint route, so each leg stays independently re-fetchable when
/// stops are reordered, added or removed. Stops without finite coordinates
/// pass through unchanged and do not advance the chain origin. A failed or
/// empty leg response leaves that stop's existing leg fields untouched.
pub async fn apply_legs<F, Fut>(
    origin: Option<Coordinates>,
    stops: &mut [Stop],
    mut fetch: F,
) -> SegmentOutcome
where
    F: FnMut(Coordinates, Coordinates) -> Fut,
    Fut: Future<Output = Result<RouteLeg, RoutingError>>,
{
    let mut outcome = SegmentOutcome::default();
    let mut current_origin = origin;

    for stop in stops.iter_mut() {
        let destination = match stop.coordinates() {
            Some(coords) => coords,
            None => {
                outcome.skipped += 1;
                continue;
            }
        };

        if let Some(from) = current_origin {
            match fetch(from, destination).await {
                Ok(leg) => {
                    stop.leg = Some(leg);
                    outcome.updated += 1;
                }
                Err(e) => {
                    tracing::debug!(
                        stop_id = %stop.id,
                        error = %e,
                        "Leg fetch failed, keeping existing leg data"
                    );
                    outcome.failed += 1;
                }
            }
        }

        // The chain advances past every stop with valid coordinates,
        // including ones whose leg fetch failed
        current_origin = Some(destination);
    }

    outcome
}
