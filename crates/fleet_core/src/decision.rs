//! External decision service: wire types, directive application and the polling task.
//!
//! The poller runs on its own thread and never touches the fleet. The tick loop
//! publishes the latest [`DecisionRequest`] (a status report of the controlled vehicle
//! and all targets) and drains the [`Directive`]s the poller sends back, applying them
//! with [`apply_directive`] between ticks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bevy_ecs::prelude::World;
use serde::{Deserialize, Serialize};

use crate::config::DecisionConfig;
use crate::ecs::{FleetIndex, Target, TargetId, TargetStatus, VehicleId};
use crate::error::{DecisionError, FleetError};
use crate::geo::distance_m;
use crate::orchestrator::{handle_target_request, RequestOutcome};
use crate::telemetry::{record_event, FleetEvent};
use crate::vehicle::Vehicle;

/// Longest uninterrupted sleep; cancellation is noticed within this slice.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarReport {
    pub id: VehicleId,
    pub lat: f64,
    pub lng: f64,
    pub busy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub id: TargetId,
    pub lat: f64,
    pub lng: f64,
    pub status: TargetStatus,
    /// Meters from the controlled vehicle.
    pub distance: f64,
}

/// Status report sent with every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub car: CarReport,
    pub targets: Vec<TargetReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveAction {
    Go,
}

/// Instruction from the decision service. `action: None` means "nothing to do";
/// `Go` without a target means "nearest pending target".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Directive {
    #[serde(default)]
    pub action: Option<DirectiveAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetId>,
}

#[derive(Debug, Deserialize)]
struct DirectivePayload {
    #[serde(default)]
    action: Option<DirectiveAction>,
    #[serde(default)]
    target: Option<TargetId>,
    #[serde(default)]
    error: Option<String>,
}

impl Directive {
    pub fn go(target: Option<TargetId>) -> Self {
        Self {
            action: Some(DirectiveAction::Go),
            target,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_actionable(&self) -> bool {
        self.action.is_some()
    }

    /// Decode a service response; an `{"error": ...}` body is a service error.
    pub fn from_json(raw: &str) -> Result<Self, DecisionError> {
        let payload: DirectivePayload = serde_json::from_str(raw)?;
        if let Some(error) = payload.error {
            return Err(DecisionError::Service(error));
        }
        Ok(Self {
            action: payload.action,
            target: payload.target,
        })
    }
}

/// Trait for decision backends. Called from the poller thread.
pub trait DecisionProvider: Send {
    fn next_action(&self, request: &DecisionRequest) -> Result<Directive, DecisionError>;
}

// ---------------------------------------------------------------------------
// Applying directives to the fleet
// ---------------------------------------------------------------------------

/// Why a directive was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoVehicle,
    VehicleBusy,
    UnknownTarget(TargetId),
    TargetNotPending(TargetId),
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::NoVehicle => f.write_str("no vehicle to control"),
            IgnoreReason::VehicleBusy => f.write_str("vehicle is busy"),
            IgnoreReason::UnknownTarget(target) => write!(f, "{target} does not exist"),
            IgnoreReason::TargetNotPending(target) => write!(f, "{target} was already picked"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DirectiveOutcome {
    NoAction,
    Ignored(IgnoreReason),
    Applied(RequestOutcome),
}

/// Status report for the controlled vehicle (the lowest id), or `None` without vehicles.
pub fn decision_request(world: &World) -> Option<DecisionRequest> {
    let index = world.get_resource::<FleetIndex>()?;
    let vehicle = world.get::<Vehicle>(index.vehicle(index.first_vehicle()?)?)?;
    let position = vehicle.position();

    let targets = index
        .targets
        .values()
        .filter_map(|entity| world.get::<Target>(*entity))
        .map(|target| TargetReport {
            id: target.id,
            lat: target.position.lat,
            lng: target.position.lng,
            status: target.status,
            distance: distance_m(position, target.position),
        })
        .collect();

    Some(DecisionRequest {
        car: CarReport {
            id: vehicle.id,
            lat: position.lat,
            lng: position.lng,
            busy: !vehicle.is_idle(),
        },
        targets,
    })
}

/// Apply one directive to the controlled vehicle.
///
/// Directives are advisory: a busy vehicle, an unknown target or a target that was
/// already picked makes the directive a no-op rather than an error.
pub fn apply_directive(world: &mut World, directive: Directive) -> Result<DirectiveOutcome, FleetError> {
    if !directive.is_actionable() {
        return Ok(DirectiveOutcome::NoAction);
    }

    match check_directive(world, directive) {
        Ok(vehicle) => {
            let outcome = handle_target_request(world, vehicle, directive.target)?;
            Ok(DirectiveOutcome::Applied(outcome))
        }
        Err(reason) => {
            record_event(
                world,
                FleetEvent::DirectiveIgnored {
                    reason: reason.to_string(),
                },
            );
            Ok(DirectiveOutcome::Ignored(reason))
        }
    }
}

fn check_directive(world: &World, directive: Directive) -> Result<VehicleId, IgnoreReason> {
    let index = world.get_resource::<FleetIndex>().ok_or(IgnoreReason::NoVehicle)?;
    let vehicle_id = index.first_vehicle().ok_or(IgnoreReason::NoVehicle)?;
    let vehicle = index
        .vehicle(vehicle_id)
        .and_then(|entity| world.get::<Vehicle>(entity))
        .ok_or(IgnoreReason::NoVehicle)?;
    if !vehicle.is_idle() {
        return Err(IgnoreReason::VehicleBusy);
    }

    if let Some(target_id) = directive.target {
        let target = index
            .target(target_id)
            .and_then(|entity| world.get::<Target>(entity))
            .ok_or(IgnoreReason::UnknownTarget(target_id))?;
        if !target.is_pending() {
            return Err(IgnoreReason::TargetNotPending(target_id));
        }
    }
    Ok(vehicle_id)
}

// ---------------------------------------------------------------------------
// Backoff and poller
// ---------------------------------------------------------------------------

/// Exponential backoff: doubles from `initial` up to `max`, back to `initial` on reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; the following call returns twice as much (capped).
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Why the poller thread stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerExit {
    Cancelled,
    /// `max_polls` polls were made.
    Exhausted,
    /// The receiving side was dropped.
    Disconnected,
    Panicked,
}

#[derive(Debug, Clone, Copy)]
struct PollSettings {
    max_polls: Option<u64>,
    initial_backoff: Duration,
    max_backoff: Duration,
    idle_interval: Duration,
}

impl From<&DecisionConfig> for PollSettings {
    fn from(config: &DecisionConfig) -> Self {
        Self {
            max_polls: config.max_polls,
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
            idle_interval: config.idle_interval(),
        }
    }
}

/// Handle to the background polling thread.
pub struct DecisionPoller {
    status: Arc<Mutex<Option<DecisionRequest>>>,
    directives: Receiver<Directive>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<PollerExit>>,
}

impl DecisionPoller {
    pub fn spawn(provider: Box<dyn DecisionProvider>, config: &DecisionConfig) -> std::io::Result<Self> {
        let status = Arc::new(Mutex::new(None));
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        let settings = PollSettings::from(config);

        let handle = thread::Builder::new().name("decision-poller".to_string()).spawn({
            let status = Arc::clone(&status);
            let cancel = Arc::clone(&cancel);
            move || poll_loop(provider, status, tx, cancel, settings)
        })?;

        Ok(Self {
            status,
            directives: rx,
            cancel,
            handle: Some(handle),
        })
    }

    /// Replace the status report sent with the next poll.
    pub fn publish(&self, request: DecisionRequest) {
        if let Ok(mut status) = self.status.lock() {
            *status = Some(request);
        }
    }

    pub fn try_recv(&self) -> Option<Directive> {
        match self.directives.try_recv() {
            Ok(directive) => Some(directive),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Every directive received since the last drain, oldest first.
    pub fn drain(&self) -> Vec<Directive> {
        self.directives.try_iter().collect()
    }

    /// Wait up to `timeout` for the next directive.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Directive> {
        self.directives.recv_timeout(timeout).ok()
    }

    /// Ask the thread to stop; an in-flight request is allowed to finish.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the thread to stop on its own (`max_polls`) or after [`Self::cancel`].
    pub fn join(mut self) -> PollerExit {
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(PollerExit::Panicked),
            None => PollerExit::Cancelled,
        }
    }
}

impl Drop for DecisionPoller {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn poll_loop(
    provider: Box<dyn DecisionProvider>,
    status: Arc<Mutex<Option<DecisionRequest>>>,
    tx: Sender<Directive>,
    cancel: Arc<AtomicBool>,
    settings: PollSettings,
) -> PollerExit {
    let mut backoff = Backoff::new(settings.initial_backoff, settings.max_backoff);
    let mut polls: u64 = 0;

    loop {
        if cancel.load(Ordering::SeqCst) {
            return PollerExit::Cancelled;
        }
        if settings.max_polls.is_some_and(|max| polls >= max) {
            tracing::debug!(polls, "decision poller reached its poll budget");
            return PollerExit::Exhausted;
        }

        let request = status.lock().ok().and_then(|status| status.clone());
        let Some(request) = request else {
            if !sleep_unless_cancelled(&cancel, settings.idle_interval) {
                return PollerExit::Cancelled;
            }
            continue;
        };

        polls += 1;
        match provider.next_action(&request) {
            Ok(directive) => {
                backoff.reset();
                if directive.is_actionable() {
                    if tx.send(directive).is_err() {
                        return PollerExit::Disconnected;
                    }
                } else if !sleep_unless_cancelled(&cancel, settings.idle_interval) {
                    return PollerExit::Cancelled;
                }
            }
            Err(err) => {
                let delay = backoff.next_delay();
                tracing::warn!(error = %err, delay_ms = delay.as_millis() as u64, "decision poll failed, backing off");
                if !sleep_unless_cancelled(&cancel, delay) {
                    return PollerExit::Cancelled;
                }
            }
        }
    }
}

/// Sleep for `total` in short slices. Returns `false` if cancelled meanwhile.
fn sleep_unless_cancelled(cancel: &AtomicBool, total: Duration) -> bool {
    let mut left = total;
    while !left.is_zero() {
        if cancel.load(Ordering::SeqCst) {
            return false;
        }
        let slice = left.min(SLEEP_SLICE);
        thread::sleep(slice);
        left -= slice;
    }
    !cancel.load(Ordering::SeqCst)
}

// ---------------------------------------------------------------------------
// HTTP provider
// ---------------------------------------------------------------------------

#[cfg(feature = "decision-http")]
pub use http::HttpDecisionProvider;

#[cfg(feature = "decision-http")]
mod http {
    use reqwest::blocking::Client;

    use super::{DecisionProvider, DecisionRequest, Directive};
    use crate::config::DecisionConfig;
    use crate::error::DecisionError;

    /// Long-polls `GET {endpoint}/api/get_next_action?body=<status json>`.
    pub struct HttpDecisionProvider {
        client: Client,
        url: String,
    }

    impl HttpDecisionProvider {
        pub fn new(endpoint: &str, config: &DecisionConfig) -> Result<Self, DecisionError> {
            let client = Client::builder().timeout(config.request_timeout()).build()?;
            Ok(Self {
                client,
                url: format!("{}/api/get_next_action", endpoint.trim_end_matches('/')),
            })
        }
    }

    impl DecisionProvider for HttpDecisionProvider {
        fn next_action(&self, request: &DecisionRequest) -> Result<Directive, DecisionError> {
            let body = serde_json::to_string(request)?;
            let response = self.client.get(&self.url).query(&[("body", body)]).send()?;
            let status = response.status();
            let raw = response.text()?;
            if !status.is_success() {
                // The service explains rejections in an {"error": ...} body.
                return match Directive::from_json(&raw) {
                    Err(DecisionError::Service(message)) => Err(DecisionError::Service(message)),
                    _ => Err(DecisionError::Status(status.as_u16())),
                };
            }
            Directive::from_json(&raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_wire_format() {
        assert_eq!(
            Directive::from_json(r#"{"action":"go","target":3}"#).expect("go"),
            Directive::go(Some(TargetId(3)))
        );
        assert_eq!(
            Directive::from_json(r#"{"action":"go"}"#).expect("nearest"),
            Directive::go(None)
        );
        assert_eq!(Directive::from_json(r#"{"action":null}"#).expect("none"), Directive::none());
        assert!(matches!(
            Directive::from_json(r#"{"error":"Unknown action"}"#),
            Err(DecisionError::Service(message)) if message == "Unknown action"
        ));
        assert!(matches!(
            Directive::from_json("not json"),
            Err(DecisionError::Decode(_))
        ));
    }

    #[test]
    fn request_serializes_with_service_field_names() {
        let request = DecisionRequest {
            car: CarReport {
                id: VehicleId(1),
                lat: 35.012,
                lng: 135.768,
                busy: false,
            },
            targets: vec![TargetReport {
                id: TargetId(2),
                lat: 35.0156,
                lng: 135.7512,
                status: TargetStatus::Pending,
                distance: 1570.0,
            }],
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["car"]["id"], 1);
        assert_eq!(json["car"]["busy"], false);
        assert_eq!(json["targets"][0]["status"], "initial");
        assert_eq!(json["targets"][0]["distance"], 1570.0);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(3));
        let delays: Vec<u128> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![500, 1000, 2000, 3000, 3000]);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn interrupted_sleep_reports_cancellation() {
        let cancel = AtomicBool::new(true);
        assert!(!sleep_unless_cancelled(&cancel, Duration::from_secs(10)));
        let running = AtomicBool::new(false);
        assert!(sleep_unless_cancelled(&running, Duration::from_millis(1)));
    }
}
