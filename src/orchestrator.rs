use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::models::{
    Address, Coordinates, DeliveryProof, PlanResult, Stop, StopStatus, TimeWindow, ValidationError,
};
use crate::providers::cep::CepClient;
use crate::providers::gate::RequestGate;
use crate::providers::geocode::GeocodeClient;
use crate::providers::reasoning::{ReasoningClient, ReasoningError};
use crate::providers::routing::RoutingClient;
use crate::services::planner::Planner;
use crate::services::reconcile::reconcile;
use crate::services::resolver::{ResolveError, Resolver};
use crate::services::segments::SegmentService;

/// Shared, authoritative stop collection
pub type StopCollection = Arc<RwLock<Vec<Stop>>>;

/// Event published on every collection change
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum CollectionEvent {
    /// A stop was created during batch intake (incremental progress)
    StopCreated { stop: Stop },
    /// A single stop was patched by a direct mutation
    StopUpdated { stop: Stop },
    StopRemoved { id: Uuid },
    /// The whole collection was replaced (optimize, reverse, clear)
    CollectionReplaced { stops: Vec<Stop> },
    /// A batch intake finished
    BatchFinished { summary: BatchSummary },
}

/// Sender for collection events
pub type EventSender = broadcast::Sender<CollectionEvent>;

/// Summary of one batch intake
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct BatchSummary {
    pub submitted: usize,
    pub created: usize,
    /// Inputs that did not reduce to 8 digits (never reached the network)
    pub invalid_format: usize,
    /// Codes the address provider had no answer for (no stop created)
    pub not_found: usize,
    /// Stops created without coordinates (geocoding exhausted)
    pub without_coordinates: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Another batch or optimize run holds the pipeline
    #[error("Another batch operation is in progress")]
    Busy,
    #[error("Unknown stop: {0}")]
    UnknownStop(Uuid),
    #[error("Stop is already completed")]
    AlreadyCompleted,
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("Failed to initialize provider client: {0}")]
    Provider(String),
}

/// Drives the route-planning pipeline and owns all shared state
///
/// All outbound provider calls go through one [`RequestGate`], so the rate
/// policy is enforced in a single place across address lookups, geocoding,
/// leg fetches and planning calls. Per user action there is one logical
/// task stream; a second concurrent batch/optimize is rejected with
/// [`OrchestratorError::Busy`].
pub struct Orchestrator {
    stops: StopCollection,
    resolver: Resolver,
    segmenter: SegmentService,
    planner: Planner,
    events_tx: EventSender,
    /// Held for the duration of a batch or optimize run
    pipeline: Mutex<()>,
    /// Bumped by clear-all; in-flight batches observing a stale value
    /// discard their remaining results
    generation: AtomicU64,
}

impl Orchestrator {
    pub fn new(config: &Config) -> Result<Self, InitError> {
        let providers = &config.providers;
        let timeout = Duration::from_secs(providers.request_timeout_secs);
        let gate = Arc::new(RequestGate::new(Duration::from_millis(
            providers.min_request_interval_ms,
        )));

        let cep = Arc::new(
            CepClient::new(providers.cep.base_url.clone(), timeout, gate.clone())
                .map_err(|e| InitError::Provider(e.to_string()))?,
        );
        let geocoder = Arc::new(
            GeocodeClient::new(
                providers.geocoder.base_url.clone(),
                &providers.geocoder.user_agent,
                timeout,
                gate.clone(),
            )
            .map_err(|e| InitError::Provider(e.to_string()))?,
        );
        let router = Arc::new(
            RoutingClient::new(
                providers.router.base_url.clone(),
                providers.router.profile.clone(),
                timeout,
                gate.clone(),
            )
            .map_err(|e| InitError::Provider(e.to_string()))?,
        );

        let reasoning = match ReasoningClient::new(
            providers.reasoning.base_url.clone(),
            providers.reasoning.model.clone(),
            &providers.reasoning.api_key_env,
            Duration::from_secs(providers.reasoning.timeout_secs),
            gate.clone(),
        ) {
            Ok(client) => Some(Arc::new(client)),
            Err(ReasoningError::MissingApiKey(var)) => {
                warn!(var = %var, "Reasoning API key not set; plans will use identity order");
                None
            }
            Err(e) => return Err(InitError::Provider(e.to_string())),
        };

        // Capacity 100: slow websocket consumers just miss old events
        let (events_tx, _) = broadcast::channel(100);

        Ok(Self {
            stops: Arc::new(RwLock::new(Vec::new())),
            resolver: Resolver::new(cep, geocoder),
            segmenter: SegmentService::new(router),
            planner: Planner::new(reasoning),
            events_tx,
            pipeline: Mutex::new(()),
            generation: AtomicU64::new(0),
        })
    }

    /// Get the event sender for passing to the websocket handler
    pub fn events_sender(&self) -> EventSender {
        self.events_tx.clone()
    }

    pub async fn snapshot(&self) -> Vec<Stop> {
        self.stops.read().await.clone()
    }

    fn emit(&self, event: CollectionEvent) {
        // Ignore send errors - they just mean no one is listening
        let _ = self.events_tx.send(event);
    }

    /// Batch intake: resolve each code sequentially, appending stops in
    /// submission order and emitting one event per created stop so partial
    /// progress is visible even when later codes fail
    pub async fn add_batch(&self, codes: Vec<String>) -> Result<BatchSummary, OrchestratorError> {
        let _guard = self.pipeline.try_lock().map_err(|_| OrchestratorError::Busy)?;
        let generation = self.generation.load(Ordering::SeqCst);

        let summary = self
            .run_intake(codes, generation, |code| async move {
                self.resolver.locate(&code).await
            })
            .await;
        Ok(summary)
    }

    /// Intake loop over raw codes, generic over the resolution function so
    /// the append and event path can be exercised without the network
    async fn run_intake<F, Fut>(
        &self,
        codes: Vec<String>,
        generation: u64,
        mut fetch: F,
    ) -> BatchSummary
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<Address, ResolveError>>,
    {
        let mut summary = BatchSummary {
            submitted: codes.len(),
            ..BatchSummary::default()
        };
        info!(codes = summary.submitted, "Starting batch intake");

        for code in codes {
            let address = match fetch(code.clone()).await {
                Ok(address) => address,
                Err(ResolveError::InvalidFormat(raw)) => {
                    info!(code = %raw, "Skipping malformed postal code");
                    summary.invalid_format += 1;
                    continue;
                }
                Err(ResolveError::NotFound(code)) => {
                    info!(code = %code, "Postal code not found");
                    summary.not_found += 1;
                    continue;
                }
            };
            if address.coordinates.is_none() {
                summary.without_coordinates += 1;
            }

            let appended = self
                .append_if_current(generation, |sequence| Stop::new(code, address, sequence))
                .await;
            let stop = match appended {
                Some(stop) => stop,
                None => {
                    // A clear-all happened mid-batch: discard from here on
                    warn!("Collection cleared during batch; discarding remaining results");
                    break;
                }
            };
            summary.created += 1;
            self.emit(CollectionEvent::StopCreated { stop });
        }

        info!(
            created = summary.created,
            invalid = summary.invalid_format,
            not_found = summary.not_found,
            without_coordinates = summary.without_coordinates,
            "Completed batch intake"
        );
        self.emit(CollectionEvent::BatchFinished {
            summary: summary.clone(),
        });
        summary
    }

    /// Append a stop under the write lock unless the collection was cleared
    /// after `generation` was captured. The generation is re-checked while
    /// the lock is held, so a clear-all can never interleave between the
    /// check and the append.
    async fn append_if_current(
        &self,
        generation: u64,
        make: impl FnOnce(usize) -> Stop,
    ) -> Option<Stop> {
        let mut stops = self.stops.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            return None;
        }
        let sequence = stops.iter().map(|s| s.sequence + 1).max().unwrap_or(0);
        let stop = make(sequence);
        stops.push(stop.clone());
        Some(stop)
    }

    /// Explicit optimize action: plan over the pending stops, reconcile the
    /// advisory result into the collection, then segment the reconciled
    /// pending sequence from the given origin
    pub async fn optimize(
        &self,
        origin: Option<Coordinates>,
        vehicle_count: u32,
    ) -> Result<(Vec<Stop>, PlanResult), OrchestratorError> {
        let _guard = self.pipeline.try_lock().map_err(|_| OrchestratorError::Busy)?;
        let generation = self.generation.load(Ordering::SeqCst);

        let current = self.snapshot().await;
        let pending: Vec<Stop> = current.iter().filter(|s| s.is_pending()).cloned().collect();
        info!(
            pending = pending.len(),
            vehicles = vehicle_count,
            "Starting optimize run"
        );

        let plan = self.planner.plan(origin, &pending, vehicle_count).await;
        let mut reconciled = reconcile(current, &plan);

        // Segment only the pending suffix; the settled prefix keeps its data
        let settled = reconciled.iter().filter(|s| !s.is_pending()).count();
        let outcome = self
            .segmenter
            .segments(origin, &mut reconciled[settled..])
            .await;
        info!(
            updated = outcome.updated,
            failed = outcome.failed,
            skipped = outcome.skipped,
            "Completed leg computation"
        );

        {
            let mut stops = self.stops.write().await;
            // Re-checked under the lock so a clear-all cannot slip in
            // between the check and the replacement
            if self.generation.load(Ordering::SeqCst) != generation {
                warn!("Collection cleared during optimize; discarding result");
                return Ok((stops.clone(), plan));
            }
            *stops = reconciled.clone();
        }
        self.emit(CollectionEvent::CollectionReplaced {
            stops: reconciled.clone(),
        });
        Ok((reconciled, plan))
    }

    /// Patch one stop in place under the write lock, emitting an update
    /// event; the mutation is rejected (prior state retained) when the
    /// closure returns an error
    async fn patch<F>(&self, id: Uuid, mutate: F) -> Result<Stop, OrchestratorError>
    where
        F: FnOnce(&mut Stop) -> Result<(), OrchestratorError>,
    {
        let updated = {
            let mut stops = self.stops.write().await;
            let stop = stops
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or(OrchestratorError::UnknownStop(id))?;
            mutate(stop)?;
            stop.clone()
        };
        self.emit(CollectionEvent::StopUpdated {
            stop: updated.clone(),
        });
        Ok(updated)
    }

    pub async fn edit_notes(
        &self,
        id: Uuid,
        notes: Option<String>,
    ) -> Result<Stop, OrchestratorError> {
        self.patch(id, |stop| {
            stop.notes = notes;
            Ok(())
        })
        .await
    }

    /// Validated at the edit boundary: an inverted window is rejected and
    /// the prior value kept
    pub async fn edit_time_window(
        &self,
        id: Uuid,
        start: &str,
        end: &str,
    ) -> Result<Stop, OrchestratorError> {
        let window = TimeWindow::parse(start, end)?;
        self.patch(id, |stop| {
            stop.time_window = Some(window);
            Ok(())
        })
        .await
    }

    /// Mark a stop completed with proof of delivery. A completed stop never
    /// reverts and cannot be completed twice.
    pub async fn complete(
        &self,
        id: Uuid,
        receiver: String,
        photo_reference: Option<String>,
    ) -> Result<Stop, OrchestratorError> {
        self.patch(id, |stop| {
            if stop.status == StopStatus::Completed {
                return Err(OrchestratorError::AlreadyCompleted);
            }
            stop.status = StopStatus::Completed;
            stop.proof = Some(DeliveryProof {
                receiver,
                completed_at: Utc::now(),
                photo_reference,
            });
            Ok(())
        })
        .await
    }

    pub async fn skip(&self, id: Uuid) -> Result<Stop, OrchestratorError> {
        self.patch(id, |stop| {
            if stop.status == StopStatus::Completed {
                return Err(OrchestratorError::AlreadyCompleted);
            }
            stop.status = StopStatus::Skipped;
            Ok(())
        })
        .await
    }

    /// Clone a stop as a fresh pending one appended at the end
    pub async fn duplicate(&self, id: Uuid) -> Result<Stop, OrchestratorError> {
        let copy = {
            let mut stops = self.stops.write().await;
            let sequence = stops.iter().map(|s| s.sequence + 1).max().unwrap_or(0);
            let source = stops
                .iter()
                .find(|s| s.id == id)
                .ok_or(OrchestratorError::UnknownStop(id))?;
            let copy = source.duplicate(sequence);
            stops.push(copy.clone());
            copy
        };
        self.emit(CollectionEvent::StopCreated { stop: copy.clone() });
        Ok(copy)
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), OrchestratorError> {
        {
            let mut stops = self.stops.write().await;
            let before = stops.len();
            stops.retain(|s| s.id != id);
            if stops.len() == before {
                return Err(OrchestratorError::UnknownStop(id));
            }
        }
        self.emit(CollectionEvent::StopRemoved { id });
        Ok(())
    }

    /// Reverse the pending sequence, keeping settled stops in front. Leg
    /// data is left in place and is stale until the next segmenting run.
    pub async fn reverse_pending(&self) -> Vec<Stop> {
        let reversed = {
            let mut stops = self.stops.write().await;
            let current = std::mem::take(&mut *stops);
            let (settled, mut pending): (Vec<Stop>, Vec<Stop>) =
                current.into_iter().partition(|s| !s.is_pending());
            pending.reverse();
            let mut result = settled;
            result.extend(pending);
            *stops = result.clone();
            result
        };
        self.emit(CollectionEvent::CollectionReplaced {
            stops: reversed.clone(),
        });
        reversed
    }

    /// Drop every stop and invalidate in-flight batch results
    pub async fn clear_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut stops = self.stops.write().await;
            stops.clear();
        }
        self.emit(CollectionEvent::CollectionReplaced { stops: Vec::new() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let yaml = r#"
cors_permissive: true
providers:
  min_request_interval_ms: 0
  cep:
    base_url: "http://localhost:1/ws"
  geocoder:
    base_url: "http://localhost:1"
    user_agent: "test"
  router:
    base_url: "http://localhost:1"
  reasoning:
    base_url: "http://localhost:1"
    model: "test"
    api_key_env: "ROTA_TEST_KEY_THAT_IS_NOT_SET"
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    fn sample_address(code: &str) -> Address {
        Address {
            postal_code: code.chars().filter(|c| c.is_ascii_digit()).collect(),
            street: format!("Rua {}", code),
            district: "Centro".to_string(),
            city: "São Paulo".to_string(),
            state: "SP".to_string(),
            coordinates: Some(Coordinates {
                lat: -23.56,
                lon: -46.65,
            }),
        }
    }

    async fn orchestrator_with_stops(n: usize) -> (Orchestrator, Vec<Uuid>) {
        let orch = Orchestrator::new(&test_config()).unwrap();
        let mut ids = Vec::new();
        {
            let mut stops = orch.stops.write().await;
            for seq in 0..n {
                let stop = Stop::new(
                    format!("0000000{}", seq),
                    Address {
                        postal_code: format!("0000000{}", seq),
                        street: format!("Rua {}", seq),
                        district: "Centro".to_string(),
                        city: "São Paulo".to_string(),
                        state: "SP".to_string(),
                        coordinates: None,
                    },
                    seq,
                );
                ids.push(stop.id);
                stops.push(stop);
            }
        }
        (orch, ids)
    }

    #[tokio::test]
    async fn time_window_edit_rejection_keeps_prior_value() {
        let (orch, ids) = orchestrator_with_stops(1).await;
        orch.edit_time_window(ids[0], "08:00", "12:00").await.unwrap();

        let err = orch.edit_time_window(ids[0], "18:00", "09:00").await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Validation(ValidationError::TimeWindowOrder)
        ));

        let stops = orch.snapshot().await;
        let window = stops[0].time_window.unwrap();
        assert_eq!(window.start.format("%H:%M").to_string(), "08:00");
    }

    #[tokio::test]
    async fn complete_sets_proof_and_refuses_second_completion() {
        let (orch, ids) = orchestrator_with_stops(1).await;
        let stop = orch
            .complete(ids[0], "Maria".to_string(), Some("photo-1".to_string()))
            .await
            .unwrap();
        assert_eq!(stop.status, StopStatus::Completed);
        assert_eq!(stop.proof.as_ref().unwrap().receiver, "Maria");

        let err = orch.complete(ids[0], "João".to_string(), None).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::AlreadyCompleted));
    }

    #[tokio::test]
    async fn duplicate_appends_fresh_pending_stop() {
        let (orch, ids) = orchestrator_with_stops(2).await;
        orch.complete(ids[0], "Maria".to_string(), None).await.unwrap();

        let copy = orch.duplicate(ids[0]).await.unwrap();
        assert_eq!(copy.status, StopStatus::Pending);
        assert!(copy.proof.is_none());
        assert_eq!(copy.sequence, 2);

        let stops = orch.snapshot().await;
        assert_eq!(stops.len(), 3);
        assert_eq!(stops.last().unwrap().id, copy.id);
    }

    #[tokio::test]
    async fn reverse_keeps_settled_prefix() {
        let (orch, ids) = orchestrator_with_stops(3).await;
        orch.complete(ids[1], "Maria".to_string(), None).await.unwrap();

        let result = orch.reverse_pending().await;
        let ordered: Vec<_> = result.iter().map(|s| s.id).collect();
        assert_eq!(ordered, vec![ids[1], ids[2], ids[0]]);
    }

    #[tokio::test]
    async fn remove_unknown_stop_fails() {
        let (orch, _) = orchestrator_with_stops(1).await;
        let err = orch.remove(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownStop(_)));
    }

    #[tokio::test]
    async fn batch_counts_invalid_and_unreachable_codes() {
        // The test endpoints are unreachable, so well-formed codes degrade
        // to not_found; malformed ones are rejected before any request
        let orch = Orchestrator::new(&test_config()).unwrap();
        let summary = orch
            .add_batch(vec![
                "01310-100".to_string(),
                "bad-code".to_string(),
                "04538-132".to_string(),
            ])
            .await
            .unwrap();

        assert_eq!(summary.submitted, 3);
        assert_eq!(summary.invalid_format, 1);
        assert_eq!(summary.not_found, 2);
        assert_eq!(summary.created, 0);
        assert!(orch.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn intake_creates_stops_in_submission_order() {
        let orch = Orchestrator::new(&test_config()).unwrap();
        let mut rx = orch.events_sender().subscribe();
        let generation = orch.generation.load(Ordering::SeqCst);

        let summary = orch
            .run_intake(
                vec![
                    "01310-100".to_string(),
                    "bad-code".to_string(),
                    "04538-132".to_string(),
                ],
                generation,
                |code| async move {
                    if code == "bad-code" {
                        return Err(ResolveError::InvalidFormat(code));
                    }
                    Ok(sample_address(&code))
                },
            )
            .await;

        assert_eq!(summary.submitted, 3);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.invalid_format, 1);
        assert_eq!(summary.without_coordinates, 0);

        let stops = orch.snapshot().await;
        assert_eq!(stops.len(), 2);
        // Submission order, with dense sequence numbers
        assert_eq!(stops[0].postal_code, "01310-100");
        assert_eq!(stops[1].postal_code, "04538-132");
        assert_eq!(stops[0].sequence, 0);
        assert_eq!(stops[1].sequence, 1);

        // One creation event per stop, then the summary
        assert!(matches!(
            rx.try_recv().unwrap(),
            CollectionEvent::StopCreated { .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            CollectionEvent::StopCreated { .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            CollectionEvent::BatchFinished { .. }
        ));
    }

    #[tokio::test]
    async fn append_with_stale_generation_is_discarded() {
        let (orch, _) = orchestrator_with_stops(1).await;
        let generation = orch.generation.load(Ordering::SeqCst);
        orch.clear_all().await;

        let appended = orch
            .append_if_current(generation, |sequence| {
                Stop::new("01310-100".to_string(), sample_address("01310-100"), sequence)
            })
            .await;
        assert!(appended.is_none());
        assert!(orch.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn batch_started_before_clear_all_discards_its_results() {
        let orch = Orchestrator::new(&test_config()).unwrap();
        let generation = orch.generation.load(Ordering::SeqCst);
        orch.clear_all().await;

        let summary = orch
            .run_intake(vec!["01310-100".to_string()], generation, |code| async move {
                Ok(sample_address(&code))
            })
            .await;
        assert_eq!(summary.created, 0);
        assert!(orch.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn clear_all_empties_collection() {
        let (orch, _) = orchestrator_with_stops(3).await;
        orch.clear_all().await;
        assert!(orch.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn optimize_with_single_pending_stop_is_trivial() {
        // One pending stop: no planning call is attempted (and none could
        // succeed against the unreachable test endpoints)
        let (orch, ids) = orchestrator_with_stops(1).await;
        let (stops, plan) = orch.optimize(None, 1).await.unwrap();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].id, ids[0]);
        assert_eq!(plan.assignments.len(), 1);
        assert_eq!(plan.assignments[0].stop_ids, vec![ids[0]]);
    }

    #[tokio::test]
    async fn optimize_with_no_pending_stops_makes_no_calls() {
        let (orch, _) = orchestrator_with_stops(0).await;
        let (stops, plan) = orch.optimize(None, 1).await.unwrap();
        assert!(stops.is_empty());
        assert!(plan.assignments.is_empty());
    }

    #[tokio::test]
    async fn events_are_broadcast_on_mutations() {
        let (orch, ids) = orchestrator_with_stops(1).await;
        let mut rx = orch.events_sender().subscribe();

        orch.edit_notes(ids[0], Some("fragile".to_string())).await.unwrap();
        match rx.recv().await.unwrap() {
            CollectionEvent::StopUpdated { stop } => {
                assert_eq!(stop.notes.as_deref(), Some("fragile"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
