//! Observation subsystem: turns host accessibility notifications into
//! observation event streams.
//!
//! Per process there is at most one native observer; all observations for a
//! pid share its notification feed. Before fan-out every event passes two
//! gates: the self-activation mask (activations the SDK itself caused must
//! not masquerade as user events) and a per-pid circuit breaker that caps
//! runaway activation storms. Fan-out uses a broadcast ring per
//! observation, so a slow stream consumer loses the oldest events first and
//! the loss is counted on the observation record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::error::AutomationError;
use crate::error::Result;
use crate::error::reason;
use crate::platform::AxNotification;
use crate::platform::AxNotificationKind;
use crate::platform::SystemOperations;
use crate::util::now_timestamp;

use macos_use_proto::macosusesdk::v1::Observation;
use macos_use_proto::macosusesdk::v1::ObservationEvent;
use macos_use_proto::macosusesdk::v1::ObservationState;
use macos_use_proto::macosusesdk::v1::ObservationType;

/// Events within this window of a `mark_sdk_activation` call are treated as
/// self-inflicted and suppressed.
pub const SDK_ACTIVATION_WINDOW: Duration = Duration::from_millis(500);

/// Circuit breaker: more than this many activation events for one pid
/// within [`BREAKER_WINDOW`] suppresses the rest of the window.
pub const BREAKER_THRESHOLD: u32 = 5;
pub const BREAKER_WINDOW: Duration = Duration::from_secs(1);

/// Per-consumer event buffer; overflow drops the oldest events.
pub const STREAM_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy)]
struct BreakerState {
    count: u32,
    window_start: Instant,
}

/// Level-sensitive rate gate. Counts every activation event; once the count
/// exceeds the threshold the remainder of the window is suppressed, and the
/// first event past the window boundary resets it.
fn breaker_allows(state: &mut BreakerState, now: Instant) -> bool {
    if now.duration_since(state.window_start) >= BREAKER_WINDOW {
        state.count = 0;
        state.window_start = now;
    }
    state.count += 1;
    state.count <= BREAKER_THRESHOLD
}

fn is_sdk_activation_at(map: &HashMap<i32, Instant>, pid: i32, now: Instant) -> bool {
    map.get(&pid)
        .is_some_and(|marked| now.duration_since(*marked) < SDK_ACTIVATION_WINDOW)
}

/// Prunes expired marks and reports whether any remain. Deactivation
/// handlers use this because the deactivated pid is never the one the SDK
/// activated; the accepted trade-off is that rapid consecutive SDK
/// activations suppress all deactivations across pids for the window.
fn has_recent_sdk_activation_at(map: &mut HashMap<i32, Instant>, now: Instant) -> bool {
    map.retain(|_, marked| now.duration_since(*marked) < SDK_ACTIVATION_WINDOW);
    !map.is_empty()
}

fn kind_matches(observation_type: ObservationType, kind: AxNotificationKind) -> bool {
    match observation_type {
        ObservationType::All | ObservationType::Unspecified => true,
        ObservationType::Focus => matches!(
            kind,
            AxNotificationKind::ApplicationActivated
                | AxNotificationKind::ApplicationDeactivated
                | AxNotificationKind::FocusedUiElementChanged
        ),
        ObservationType::Window => matches!(
            kind,
            AxNotificationKind::WindowCreated
                | AxNotificationKind::WindowMoved
                | AxNotificationKind::WindowResized
                | AxNotificationKind::WindowMiniaturized
                | AxNotificationKind::WindowDeminiaturized
        ),
        ObservationType::Element => matches!(
            kind,
            AxNotificationKind::ValueChanged
                | AxNotificationKind::UiElementDestroyed
                | AxNotificationKind::FocusedUiElementChanged
        ),
    }
}

struct ObservationEntry {
    observation: Observation,
    pid: i32,
    sequence: i64,
    sender: broadcast::Sender<ObservationEvent>,
}

struct Pump {
    task: JoinHandle<()>,
    observation_count: usize,
}

#[derive(Default)]
struct Inner {
    observations: HashMap<String, ObservationEntry>,
    pumps: HashMap<i32, Pump>,
    sdk_activations: HashMap<i32, Instant>,
    breakers: HashMap<i32, BreakerState>,
}

pub struct ObservationManager {
    system: Arc<dyn SystemOperations>,
    inner: Arc<Mutex<Inner>>,
}

impl ObservationManager {
    pub fn new(system: Arc<dyn SystemOperations>) -> Self {
        Self {
            system,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Attaches the native observer (if this pid has none yet) and records
    /// the observation as active. Called from the CreateObservation
    /// operation's background task.
    pub async fn start_observation(
        &self,
        name: String,
        pid: i32,
        observation_type: ObservationType,
        filter: String,
    ) -> Result<Observation> {
        let needs_pump = {
            let inner = self.inner.lock().await;
            if inner.observations.contains_key(&name) {
                // Ids are minted from uuids, so a collision is a bug.
                return Err(AutomationError::internal(
                    reason::PLATFORM_FAILURE,
                    format!("observation {name} already registered"),
                ));
            }
            !inner.pumps.contains_key(&pid)
        };

        if needs_pump {
            // One native observer per process; the adapter's channel already
            // carries events in host arrival order.
            let receiver = self.system.observe_application(pid, None).await?;
            let task = spawn_pump(Arc::clone(&self.inner), pid, receiver);
            let mut inner = self.inner.lock().await;
            inner.pumps.insert(
                pid,
                Pump {
                    task,
                    observation_count: 0,
                },
            );
        }

        let observation = Observation {
            name: name.clone(),
            observation_type: observation_type as i32,
            filter,
            state: ObservationState::Active as i32,
            events_delivered: 0,
            events_dropped: 0,
            create_time: Some(now_timestamp()),
        };

        let (sender, _) = broadcast::channel(STREAM_BUFFER);
        let mut inner = self.inner.lock().await;
        if let Some(pump) = inner.pumps.get_mut(&pid) {
            pump.observation_count += 1;
        }
        inner.observations.insert(
            name,
            ObservationEntry {
                observation: observation.clone(),
                pid,
                sequence: 0,
                sender,
            },
        );
        Ok(observation)
    }

    pub async fn get(&self, name: &str) -> Result<Observation> {
        let inner = self.inner.lock().await;
        inner
            .observations
            .get(name)
            .map(|entry| entry.observation.clone())
            .ok_or_else(|| not_found(name))
    }

    /// Observations under `parent` (or all when empty), sorted by name.
    pub async fn list(&self, parent: &str) -> Vec<Observation> {
        let inner = self.inner.lock().await;
        let mut observations: Vec<Observation> = inner
            .observations
            .values()
            .filter(|entry| parent.is_empty() || entry.observation.name.starts_with(parent))
            .map(|entry| entry.observation.clone())
            .collect();
        observations.sort_by(|a, b| a.name.cmp(&b.name));
        observations
    }

    /// Detaches the observer when this was the pid's last live observation
    /// and completes every subscribed stream.
    pub async fn cancel(&self, name: &str) -> Result<Observation> {
        let (observation, release_pid) = {
            let mut inner = self.inner.lock().await;
            let entry = inner
                .observations
                .get_mut(name)
                .ok_or_else(|| not_found(name))?;
            let was_active = entry.observation.state == ObservationState::Active as i32;
            entry.observation.state = ObservationState::Cancelled as i32;
            // Dropping the sender completes all current receivers.
            let (closed, _) = broadcast::channel(1);
            entry.sender = closed;
            let pid = entry.pid;
            let observation = entry.observation.clone();

            let drained = was_active
                && match inner.pumps.get_mut(&pid) {
                    Some(pump) => {
                        pump.observation_count = pump.observation_count.saturating_sub(1);
                        pump.observation_count == 0
                    }
                    None => false,
                };
            let release_pid = if drained {
                if let Some(pump) = inner.pumps.remove(&pid) {
                    pump.task.abort();
                }
                Some(pid)
            } else {
                None
            };
            (observation, release_pid)
        };

        if let Some(pid) = release_pid
            && let Err(err) = self.system.stop_observing(pid).await
        {
            warn!("failed to detach observer for pid {pid}: {err}");
        }
        Ok(observation)
    }

    /// A live observation yields a receiver onto its broadcast ring; a
    /// cancelled one yields an already-completed subscription.
    pub async fn subscribe(&self, name: &str) -> Result<broadcast::Receiver<ObservationEvent>> {
        let inner = self.inner.lock().await;
        let entry = inner.observations.get(name).ok_or_else(|| not_found(name))?;
        if entry.observation.state == ObservationState::Cancelled as i32 {
            let (sender, receiver) = broadcast::channel(1);
            drop(sender);
            return Ok(receiver);
        }
        Ok(entry.sender.subscribe())
    }

    /// Accounts events a lagging consumer lost to ring overflow.
    pub async fn add_dropped(&self, name: &str, dropped: u64) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.observations.get_mut(name) {
            entry.observation.events_dropped += dropped as i64;
        }
    }

    /// Records that the SDK itself is about to activate `pid`, so the
    /// resulting activation notifications are suppressed.
    pub async fn mark_sdk_activation(&self, pid: i32) {
        let mut inner = self.inner.lock().await;
        inner.sdk_activations.insert(pid, Instant::now());
    }

    pub async fn is_sdk_activation(&self, pid: i32) -> bool {
        let inner = self.inner.lock().await;
        is_sdk_activation_at(&inner.sdk_activations, pid, Instant::now())
    }

    pub async fn has_recent_sdk_activation(&self) -> bool {
        let mut inner = self.inner.lock().await;
        has_recent_sdk_activation_at(&mut inner.sdk_activations, Instant::now())
    }

    /// Aborts every pump and detaches every native observer. Called on
    /// graceful shutdown.
    pub async fn shutdown(&self) {
        let pids: Vec<i32> = {
            let mut inner = self.inner.lock().await;
            let pids: Vec<i32> = inner.pumps.keys().copied().collect();
            for (_, pump) in inner.pumps.drain() {
                pump.task.abort();
            }
            pids
        };
        for pid in pids {
            if let Err(err) = self.system.stop_observing(pid).await {
                debug!("stop_observing({pid}) during shutdown: {err}");
            }
        }
    }
}

fn not_found(name: &str) -> AutomationError {
    AutomationError::not_found(reason::OBSERVATION_NOT_FOUND, "observation", name)
}

/// Forwards one pid's notification feed into every matching observation.
/// Ends when the adapter closes the channel or the pump is aborted.
fn spawn_pump(
    inner: Arc<Mutex<Inner>>,
    pid: i32,
    mut receiver: mpsc::Receiver<AxNotification>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = receiver.recv().await {
            dispatch_notification(&inner, pid, notification).await;
        }
        debug!("observer feed for pid {pid} closed");
    })
}

async fn dispatch_notification(inner: &Mutex<Inner>, pid: i32, notification: AxNotification) {
    let mut inner = inner.lock().await;
    let now = Instant::now();

    match notification.kind {
        AxNotificationKind::ApplicationActivated => {
            if is_sdk_activation_at(&inner.sdk_activations, notification.pid, now) {
                debug!("suppressing self-activation for pid {}", notification.pid);
                return;
            }
            let breaker = inner
                .breakers
                .entry(notification.pid)
                .or_insert(BreakerState {
                    count: 0,
                    window_start: now,
                });
            if !breaker_allows(breaker, now) {
                debug!("circuit breaker open for pid {}", notification.pid);
                return;
            }
        }
        AxNotificationKind::ApplicationDeactivated => {
            // The deactivated pid is not the activated one, so any recent
            // SDK activation suppresses deactivations across the board.
            if has_recent_sdk_activation_at(&mut inner.sdk_activations, now) {
                debug!("suppressing deactivation during SDK activation window");
                return;
            }
        }
        _ => {}
    }

    let event_time = now_timestamp();
    for entry in inner.observations.values_mut() {
        if entry.pid != pid
            || entry.observation.state != ObservationState::Active as i32
        {
            continue;
        }
        let observation_type = entry.observation.observation_type();
        if !kind_matches(observation_type, notification.kind) {
            continue;
        }
        if !entry.observation.filter.is_empty()
            && entry.observation.filter != notification.kind.as_str()
        {
            continue;
        }

        entry.sequence += 1;
        entry.observation.events_delivered += 1;
        let event = ObservationEvent {
            observation: entry.observation.name.clone(),
            event_type: notification.kind.as_str().to_string(),
            pid: notification.pid,
            element_description: notification.element_description.clone(),
            sequence: entry.sequence,
            event_time: Some(event_time.clone()),
        };
        // Send only fails when nobody is subscribed, which is fine: the
        // ring keeps the most recent events for late subscribers anyway.
        let _ = entry.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn breaker_suppresses_the_sixth_event_in_a_window() {
        let start = Instant::now();
        let mut state = BreakerState {
            count: 0,
            window_start: start,
        };

        for i in 0..5 {
            assert!(
                breaker_allows(&mut state, start + Duration::from_millis(i * 100)),
                "event {i} should pass"
            );
        }
        assert!(!breaker_allows(&mut state, start + Duration::from_millis(500)));
        assert!(!breaker_allows(&mut state, start + Duration::from_millis(900)));

        // First event past the window boundary resets the breaker.
        assert!(breaker_allows(&mut state, start + BREAKER_WINDOW));
    }

    #[test]
    fn sdk_activation_mask_expires_after_the_window() {
        let marked = Instant::now();
        let map = HashMap::from([(7, marked)]);

        assert!(is_sdk_activation_at(
            &map,
            7,
            marked + SDK_ACTIVATION_WINDOW - Duration::from_millis(1)
        ));
        assert!(!is_sdk_activation_at(&map, 7, marked + SDK_ACTIVATION_WINDOW));
        assert!(!is_sdk_activation_at(&map, 8, marked));
    }

    #[test]
    fn has_recent_prunes_expired_marks() {
        let marked = Instant::now();
        let mut map = HashMap::from([(1, marked), (2, marked + Duration::from_millis(400))]);

        // At +450ms both marks are inside their windows.
        assert!(has_recent_sdk_activation_at(
            &mut map,
            marked + Duration::from_millis(450)
        ));
        assert_eq!(map.len(), 2);

        // At +600ms only pid 2's mark (set at +400ms) survives.
        assert!(has_recent_sdk_activation_at(
            &mut map,
            marked + Duration::from_millis(600)
        ));
        assert_eq!(map.len(), 1);

        // Past every window: pruned empty.
        assert!(!has_recent_sdk_activation_at(
            &mut map,
            marked + Duration::from_secs(2)
        ));
        assert!(map.is_empty());
    }

    #[test]
    fn type_matching_routes_kinds() {
        assert!(kind_matches(
            ObservationType::Focus,
            AxNotificationKind::ApplicationActivated
        ));
        assert!(!kind_matches(
            ObservationType::Focus,
            AxNotificationKind::WindowMoved
        ));
        assert!(kind_matches(
            ObservationType::Window,
            AxNotificationKind::WindowMiniaturized
        ));
        assert!(kind_matches(ObservationType::All, AxNotificationKind::ValueChanged));
    }
}
