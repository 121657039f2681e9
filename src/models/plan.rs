use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One vehicle's ordered visiting sequence within a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VehicleAssignment {
    /// Vehicle label (e.g., "Vehicle 1")
    pub vehicle: String,
    /// Ordered stop ids; ids unknown to the current pending set are
    /// tolerated and dropped at reconcile time
    pub stop_ids: Vec<Uuid>,
}

/// Advisory ordering/assignment proposal for the pending stops
///
/// Coverage of all pending ids is not guaranteed; the reconciler preserves
/// unreferenced stops. `fleet` distinguishes multi-vehicle plans, whose
/// vehicle labels are written back to the placed stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlanResult {
    pub assignments: Vec<VehicleAssignment>,
    /// Human-readable explanation of the proposed order
    pub rationale: String,
    pub fleet: bool,
}

impl PlanResult {
    /// Identity-order plan over the given ids, used when optimization is
    /// trivial (0 or 1 stop) or the reasoning provider failed
    pub fn identity(stop_ids: Vec<Uuid>, rationale: impl Into<String>) -> Self {
        Self {
            assignments: vec![VehicleAssignment {
                vehicle: "Vehicle 1".to_string(),
                stop_ids,
            }],
            rationale: rationale.into(),
            fleet: false,
        }
    }

    pub fn empty() -> Self {
        Self {
            assignments: Vec::new(),
            rationale: "No pending stops to order".to_string(),
            fleet: false,
        }
    }
}
