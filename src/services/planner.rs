use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Coordinates, PlanResult, Stop, VehicleAssignment};
use crate::providers::reasoning::ReasoningClient;

const SYSTEM_PROMPT: &str = "You are a delivery route planner. Given a start \
position and a list of pending delivery stops, propose an efficient visiting \
order. Honor time windows where possible. Respond only with JSON matching \
the provided schema; reference stops strictly by the given ids.";

/// Proposes a visiting order (and vehicle assignment in fleet mode) for the
/// pending stops
///
/// The reasoning provider is advisory: its output is validated for shape
/// and id membership, and any failure degrades to a deterministic
/// identity-order plan.
pub struct Planner {
    /// None when the provider is not configured (e.g. missing API key);
    /// every plan request then takes the deterministic fallback
    reasoning: Option<Arc<ReasoningClient>>,
}

impl Planner {
    pub fn new(reasoning: Option<Arc<ReasoningClient>>) -> Self {
        Self { reasoning }
    }

    pub async fn plan(
        &self,
        origin: Option<Coordinates>,
        pending: &[Stop],
        vehicle_count: u32,
    ) -> PlanResult {
        // Optimization is meaningless for fewer than two points; skip the
        // external call entirely
        if pending.is_empty() {
            return PlanResult::empty();
        }
        if pending.len() == 1 {
            return PlanResult::identity(
                vec![pending[0].id],
                "Single pending stop, order is trivial",
            );
        }

        let Some(reasoning) = &self.reasoning else {
            tracing::debug!("Reasoning provider not configured, using identity order");
            return fallback(pending);
        };

        let problem = build_problem(origin, pending, vehicle_count);
        let known: HashSet<Uuid> = pending.iter().map(|s| s.id).collect();

        let content = match reasoning
            .complete(SYSTEM_PROMPT, &problem, "route_plan", plan_schema())
            .await
        {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(error = %e, "Planning call failed, using identity order");
                return fallback(pending);
            }
        };

        match parse_plan(&content, &known, vehicle_count) {
            Some(plan) => plan,
            None => {
                tracing::warn!("Planning response failed validation, using identity order");
                fallback(pending)
            }
        }
    }
}

/// Deterministic fallback: current relative order under one synthetic
/// vehicle label
fn fallback(pending: &[Stop]) -> PlanResult {
    PlanResult::identity(
        pending.iter().map(|s| s.id).collect(),
        "Planner unavailable; kept the current stop order",
    )
}

/// Structured problem description handed to the reasoning provider
pub fn build_problem(origin: Option<Coordinates>, pending: &[Stop], vehicle_count: u32) -> String {
    let mut problem = String::new();

    match origin {
        Some(o) => {
            let _ = writeln!(problem, "Start position: {:.6}, {:.6}", o.lat, o.lon);
        }
        None => {
            let _ = writeln!(problem, "Start position: unknown, assume a central position");
        }
    }
    let _ = writeln!(problem, "Vehicles available: {}", vehicle_count);
    let _ = writeln!(problem, "Pending stops:");

    for stop in pending {
        let coords = match stop.coordinates() {
            Some(c) => format!("{:.6}, {:.6}", c.lat, c.lon),
            None => "unknown".to_string(),
        };
        let window = match &stop.time_window {
            Some(w) => format!("{}-{}", w.start.format("%H:%M"), w.end.format("%H:%M")),
            None => "any time".to_string(),
        };
        let _ = writeln!(
            problem,
            "- id: {} | address: {} | coordinates: {} | window: {}",
            stop.id,
            stop.address.summary(),
            coords,
            window
        );
    }

    if vehicle_count > 1 {
        let _ = writeln!(
            problem,
            "Partition the stops across the vehicles and order each vehicle's stops."
        );
    } else {
        let _ = writeln!(problem, "Return a single ordered visiting sequence.");
    }

    problem
}

/// Strict output schema requested from the provider
pub fn plan_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "assignments": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "vehicle": { "type": "string" },
                        "stop_ids": {
                            "type": "array",
                            "items": { "type": "string" }
                        }
                    },
                    "required": ["vehicle", "stop_ids"],
                    "additionalProperties": false
                }
            },
            "rationale": { "type": "string" }
        },
        "required": ["assignments", "rationale"],
        "additionalProperties": false
    })
}

#[derive(Debug, Deserialize)]
struct PlanPayload {
    assignments: Vec<AssignmentPayload>,
    #[serde(default)]
    rationale: String,
}

#[derive(Debug, Deserialize)]
struct AssignmentPayload {
    vehicle: String,
    stop_ids: Vec<String>,
}

/// Validate an oracle response: parse, drop ids that are malformed or not
/// members of the known pending set, and collapse to a single sequence in
/// single-vehicle mode. Returns None when nothing usable remains.
pub fn parse_plan(
    content: &str,
    known_ids: &HashSet<Uuid>,
    vehicle_count: u32,
) -> Option<PlanResult> {
    let payload: PlanPayload = serde_json::from_str(content).ok()?;

    let mut assignments: Vec<VehicleAssignment> = payload
        .assignments
        .into_iter()
        .map(|a| VehicleAssignment {
            vehicle: a.vehicle,
            stop_ids: a
                .stop_ids
                .iter()
                .filter_map(|raw| Uuid::parse_str(raw).ok())
                .filter(|id| known_ids.contains(id))
                .collect(),
        })
        .filter(|a| !a.stop_ids.is_empty())
        .collect();

    if assignments.is_empty() {
        return None;
    }

    // Single-vehicle mode expects one ordered list; tolerate an oracle that
    // split it anyway by flattening in order
    if vehicle_count <= 1 && assignments.len() > 1 {
        let merged: Vec<Uuid> = assignments.iter().flat_map(|a| a.stop_ids.clone()).collect();
        assignments = vec![VehicleAssignment {
            vehicle: "Vehicle 1".to_string(),
            stop_ids: merged,
        }];
    }

    Some(PlanResult {
        assignments,
        rationale: payload.rationale,
        fleet: vehicle_count > 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Address, TimeWindow};

    fn stop(seq: usize, coords: Option<Coordinates>) -> Stop {
        let mut s = Stop::new(
            format!("0000000{}", seq),
            Address {
                postal_code: format!("0000000{}", seq),
                street: format!("Rua {}", seq),
                district: "Centro".to_string(),
                city: "São Paulo".to_string(),
                state: "SP".to_string(),
                coordinates: coords,
            },
            seq,
        );
        s.time_window = (seq == 0).then(|| TimeWindow::parse("09:00", "11:00").unwrap());
        s
    }

    #[test]
    fn problem_describes_unknowns_explicitly() {
        let stops = vec![
            stop(0, Some(Coordinates { lat: -23.56, lon: -46.65 })),
            stop(1, None),
        ];
        let problem = build_problem(None, &stops, 1);
        assert!(problem.contains("unknown, assume a central position"));
        assert!(problem.contains("coordinates: unknown"));
        assert!(problem.contains("window: 09:00-11:00"));
        assert!(problem.contains("window: any time"));
        assert!(problem.contains(&stops[0].id.to_string()));
    }

    #[test]
    fn parse_drops_unknown_and_malformed_ids() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let known: HashSet<Uuid> = [a, b].into_iter().collect();

        let content = format!(
            r#"{{"assignments": [{{"vehicle": "Van 1", "stop_ids": ["{}", "{}", "not-a-uuid", "{}"]}}], "rationale": "ok"}}"#,
            a,
            Uuid::new_v4(), // hallucinated
            b
        );

        let plan = parse_plan(&content, &known, 1).unwrap();
        assert_eq!(plan.assignments.len(), 1);
        assert_eq!(plan.assignments[0].stop_ids, vec![a, b]);
        assert!(!plan.fleet);
    }

    #[test]
    fn parse_rejects_garbage_payloads() {
        let known = HashSet::new();
        assert!(parse_plan("not json", &known, 1).is_none());
        assert!(parse_plan(r#"{"assignments": [], "rationale": ""}"#, &known, 1).is_none());
        // Shape is valid but every id is unknown
        let content = format!(
            r#"{{"assignments": [{{"vehicle": "V", "stop_ids": ["{}"]}}], "rationale": ""}}"#,
            Uuid::new_v4()
        );
        assert!(parse_plan(&content, &known, 1).is_none());
    }

    #[test]
    fn single_vehicle_mode_flattens_split_assignments() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let known: HashSet<Uuid> = [a, b].into_iter().collect();

        let content = format!(
            r#"{{"assignments": [
                {{"vehicle": "Van 1", "stop_ids": ["{}"]}},
                {{"vehicle": "Van 2", "stop_ids": ["{}"]}}
            ], "rationale": "split"}}"#,
            a, b
        );

        let plan = parse_plan(&content, &known, 1).unwrap();
        assert_eq!(plan.assignments.len(), 1);
        assert_eq!(plan.assignments[0].stop_ids, vec![a, b]);
    }

    #[test]
    fn fleet_mode_keeps_assignments_apart() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let known: HashSet<Uuid> = [a, b].into_iter().collect();

        let content = format!(
            r#"{{"assignments": [
                {{"vehicle": "Van 1", "stop_ids": ["{}"]}},
                {{"vehicle": "Van 2", "stop_ids": ["{}"]}}
            ], "rationale": "split"}}"#,
            a, b
        );

        let plan = parse_plan(&content, &known, 2).unwrap();
        assert_eq!(plan.assignments.len(), 2);
        assert!(plan.fleet);
    }
}
