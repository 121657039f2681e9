pub mod plan;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub use plan::{PlanResult, VehicleAssignment};

/// Geographic coordinates in signed decimal degrees (WGS84)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// Both components must be finite for the point to be usable
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Resolved postal data for a stop
///
/// Coordinates are optional: an address whose geocoding failed (or is still
/// pending) stays in the collection but is excluded from segmenting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Address {
    /// Normalized 8-digit postal code
    pub postal_code: String,
    pub street: String,
    pub district: String,
    pub city: String,
    pub state: String,
    pub coordinates: Option<Coordinates>,
}

impl Address {
    /// Short human-readable form used in planner prompts and logs
    pub fn summary(&self) -> String {
        format!("{}, {} - {}/{}", self.street, self.district, self.city, self.state)
    }
}

/// Lifecycle status of a stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StopStatus {
    Pending,
    Completed,
    Skipped,
}

/// Wall-clock delivery window, start strictly before end
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TimeWindow {
    #[schema(value_type = String, example = "08:00")]
    pub start: NaiveTime,
    #[schema(value_type = String, example = "12:00")]
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::TimeWindowOrder);
        }
        Ok(Self { start, end })
    }

    /// Parse a window from "HH:MM" strings
    pub fn parse(start: &str, end: &str) -> Result<Self, ValidationError> {
        let start = NaiveTime::parse_from_str(start, "%H:%M")
            .map_err(|_| ValidationError::TimeFormat(start.to_string()))?;
        let end = NaiveTime::parse_from_str(end, "%H:%M")
            .map_err(|_| ValidationError::TimeFormat(end.to_string()))?;
        Self::new(start, end)
    }
}

/// Rejected edits: the prior value is always retained by the caller
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("time window end must be after start")]
    TimeWindowOrder,
    #[error("invalid time format: {0} (expected HH:MM)")]
    TimeFormat(String),
}

/// Travel segment arriving at a stop from its predecessor in the current
/// ordering. Stale whenever the predecessor or this stop's position changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RouteLeg {
    pub distance_meters: f64,
    pub duration_seconds: f64,
    /// Path as [lon, lat] pairs from origin to this stop
    pub geometry: Vec<[f64; 2]>,
}

/// Proof of delivery captured when a stop is completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeliveryProof {
    pub receiver: String,
    pub completed_at: DateTime<Utc>,
    pub photo_reference: Option<String>,
}

/// A single delivery/pickup point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Stop {
    /// Immutable, unique within the collection
    pub id: Uuid,
    /// Raw postal code as submitted
    pub postal_code: String,
    pub address: Address,
    pub status: StopStatus,
    /// Insertion-order index at creation time
    pub sequence: usize,
    pub notes: Option<String>,
    /// Assigned vehicle label, set by fleet plans
    pub vehicle: Option<String>,
    pub time_window: Option<TimeWindow>,
    /// Incoming leg metrics/geometry; None until segmented
    pub leg: Option<RouteLeg>,
    pub proof: Option<DeliveryProof>,
}

impl Stop {
    pub fn new(postal_code: String, address: Address, sequence: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            postal_code,
            address,
            status: StopStatus::Pending,
            sequence,
            notes: None,
            vehicle: None,
            time_window: None,
            leg: None,
            proof: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == StopStatus::Pending
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.address.coordinates.filter(Coordinates::is_finite)
    }

    /// Clone as a fresh pending stop: new id, no leg, no proof, no vehicle
    pub fn duplicate(&self, sequence: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            postal_code: self.postal_code.clone(),
            address: self.address.clone(),
            status: StopStatus::Pending,
            sequence,
            notes: self.notes.clone(),
            vehicle: None,
            time_window: self.time_window,
            leg: None,
            proof: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Address {
        Address {
            postal_code: "01310100".to_string(),
            street: "Avenida Paulista".to_string(),
            district: "Bela Vista".to_string(),
            city: "São Paulo".to_string(),
            state: "SP".to_string(),
            coordinates: None,
        }
    }

    #[test]
    fn time_window_rejects_inverted_bounds() {
        let err = TimeWindow::parse("18:00", "09:00").unwrap_err();
        assert!(matches!(err, ValidationError::TimeWindowOrder));
    }

    #[test]
    fn time_window_rejects_garbage() {
        assert!(matches!(
            TimeWindow::parse("8am", "12:00"),
            Err(ValidationError::TimeFormat(_))
        ));
    }

    #[test]
    fn time_window_accepts_ordered_bounds() {
        let tw = TimeWindow::parse("08:30", "12:00").unwrap();
        assert!(tw.start < tw.end);
    }

    #[test]
    fn duplicate_resets_delivery_state() {
        let mut stop = Stop::new("01310-100".to_string(), address(), 0);
        stop.status = StopStatus::Completed;
        stop.vehicle = Some("Van 1".to_string());
        stop.leg = Some(RouteLeg {
            distance_meters: 1200.0,
            duration_seconds: 300.0,
            geometry: vec![[-46.65, -23.56]],
        });
        stop.proof = Some(DeliveryProof {
            receiver: "Ana".to_string(),
            completed_at: Utc::now(),
            photo_reference: None,
        });

        let copy = stop.duplicate(7);
        assert_ne!(copy.id, stop.id);
        assert_eq!(copy.status, StopStatus::Pending);
        assert_eq!(copy.sequence, 7);
        assert!(copy.leg.is_none());
        assert!(copy.proof.is_none());
        assert!(copy.vehicle.is_none());
        assert_eq!(copy.address, stop.address);
    }

    #[test]
    fn non_finite_coordinates_are_not_usable() {
        let mut stop = Stop::new("01310-100".to_string(), address(), 0);
        stop.address.coordinates = Some(Coordinates {
            lat: f64::NAN,
            lon: -46.65,
        });
        assert!(stop.coordinates().is_none());
    }
}
