use std::collections::{HashMap, HashSet};

use crate::models::{PlanResult, Stop};

/// Merge an advisory plan into the authoritative stop collection
///
/// Guarantees, regardless of plan quality:
/// - Completed/Skipped stops keep their content and prior relative order,
///   as a prefix of the result.
/// - Plan ids that do not exist in the Pending subset are silently dropped
///   (stale or hallucinated references).
/// - Pending stops the plan did not reference are appended after the
///   placed ones, in their prior relative order. No stop is ever lost.
/// - Fleet plans overwrite the vehicle label of placed stops only;
///   leftovers keep their prior label.
pub fn reconcile(stops: Vec<Stop>, plan: &PlanResult) -> Vec<Stop> {
    let (done, pending): (Vec<Stop>, Vec<Stop>) =
        stops.into_iter().partition(|s| !s.is_pending());

    let prior_order: Vec<_> = pending.iter().map(|s| s.id).collect();
    let mut pool: HashMap<_, Stop> = pending.into_iter().map(|s| (s.id, s)).collect();

    let mut placed = Vec::new();
    let mut seen = HashSet::new();

    for assignment in &plan.assignments {
        for id in &assignment.stop_ids {
            // Membership check against the known pending set; duplicates
            // within the plan are placed once
            if !seen.insert(*id) {
                continue;
            }
            if let Some(mut stop) = pool.remove(id) {
                if plan.fleet {
                    stop.vehicle = Some(assignment.vehicle.clone());
                }
                placed.push(stop);
            }
        }
    }

    // Leftovers: pending stops the plan never mentioned, prior order
    let mut result = done;
    result.extend(placed);
    for id in prior_order {
        if let Some(stop) = pool.remove(&id) {
            result.push(stop);
        }
    }

    result
}
