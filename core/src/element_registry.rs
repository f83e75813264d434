//! TTL-cached registry of accessibility element handles.
//!
//! Element ids are minted as `elem_<msEpoch>_<rand6>`. Entries expire after
//! 30 seconds; a read that observes an expired entry evicts it and reports
//! not-found, and a periodic reaper sweeps whatever reads never touch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::AutomationError;
use crate::error::Result;
use crate::error::reason;
use crate::platform::AxElement;
use crate::resource_name::element_name;
use crate::util::epoch_millis;

use macos_use_proto::macosusesdk::v1::Element;

pub const ELEMENT_TTL: Duration = Duration::from_secs(30);
const REAPER_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct RegisteredElement {
    element: Element,
    handle: Option<AxElement>,
    pid: i32,
    registered_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementRegistryStats {
    pub total: usize,
    pub per_pid: HashMap<i32, usize>,
}

#[derive(Default)]
pub struct ElementRegistry {
    entries: Mutex<HashMap<String, RegisteredElement>>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate_id() -> String {
        let suffix: u32 = rand::rng().random_range(0..1_000_000);
        format!("elem_{}_{suffix:06}", epoch_millis())
    }

    /// Registers (or re-registers) an element under its id. The element's
    /// `name`/`element_id`/`pid` fields are expected to be populated by the
    /// caller.
    pub async fn register(&self, element: Element, handle: Option<AxElement>) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            element.element_id.clone(),
            RegisteredElement {
                pid: element.pid,
                element,
                handle,
                registered_at: Instant::now(),
            },
        );
    }

    pub async fn get(&self, element_id: &str) -> Result<Element> {
        let mut entries = self.entries.lock().await;
        live_entry(&mut entries, element_id, Instant::now())
            .map(|entry| entry.element.clone())
            .ok_or_else(|| not_found(element_id))
    }

    pub async fn get_handle(&self, element_id: &str) -> Result<AxElement> {
        let mut entries = self.entries.lock().await;
        live_entry(&mut entries, element_id, Instant::now())
            .and_then(|entry| entry.handle)
            .ok_or_else(|| not_found(element_id))
    }

    /// Replaces the payload of a live entry and refreshes its TTL.
    pub async fn update(&self, element: Element) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let element_id = element.element_id.clone();
        if live_entry(&mut entries, &element_id, Instant::now()).is_none() {
            return Err(not_found(&element_id));
        }
        let handle = entries
            .get(&element_id)
            .and_then(|existing| existing.handle);
        entries.insert(
            element_id,
            RegisteredElement {
                pid: element.pid,
                element,
                handle,
                registered_at: Instant::now(),
            },
        );
        Ok(())
    }

    pub async fn remove(&self, element_id: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .remove(element_id)
            .map(|_| ())
            .ok_or_else(|| not_found(element_id))
    }

    pub async fn list_by_pid(&self, pid: i32) -> Vec<Element> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.registered_at) < ELEMENT_TTL);
        let mut elements: Vec<Element> = entries
            .values()
            .filter(|entry| entry.pid == pid)
            .map(|entry| entry.element.clone())
            .collect();
        elements.sort_by(|a, b| a.element_id.cmp(&b.element_id));
        elements
    }

    /// Drops every entry for a process; returns how many were removed.
    pub async fn clear_pid(&self, pid: i32) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.pid != pid);
        before - entries.len()
    }

    pub async fn stats(&self) -> ElementRegistryStats {
        let entries = self.entries.lock().await;
        let mut per_pid: HashMap<i32, usize> = HashMap::new();
        for entry in entries.values() {
            *per_pid.entry(entry.pid).or_default() += 1;
        }
        ElementRegistryStats {
            total: entries.len(),
            per_pid,
        }
    }

    /// Background sweep for entries no read ever evicts. Ends when the
    /// shutdown token fires.
    pub fn spawn_reaper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(REAPER_INTERVAL) => {}
                }
                let evicted = registry.evict_expired().await;
                if evicted > 0 {
                    let stats = registry.stats().await;
                    debug!(
                        "element reaper evicted {evicted}, {} remaining",
                        stats.total
                    );
                }
            }
        })
    }

    async fn evict_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.registered_at) < ELEMENT_TTL);
        before - entries.len()
    }
}

/// Returns the live entry, evicting it first when expired.
fn live_entry<'a>(
    entries: &'a mut HashMap<String, RegisteredElement>,
    element_id: &str,
    now: Instant,
) -> Option<&'a RegisteredElement> {
    let expired = entries
        .get(element_id)
        .is_some_and(|entry| now.duration_since(entry.registered_at) >= ELEMENT_TTL);
    if expired {
        entries.remove(element_id);
        return None;
    }
    entries.get(element_id)
}

fn not_found(element_id: &str) -> AutomationError {
    AutomationError::not_found(reason::ELEMENT_NOT_FOUND, "element", element_id)
}

/// Builds the resource record for a newly registered element.
pub fn new_element(pid: i32, element_id: &str) -> Element {
    Element {
        name: element_name(pid, element_id),
        element_id: element_id.to_string(),
        pid,
        register_time: Some(crate::util::now_timestamp()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn entry_at(pid: i32, registered_at: Instant) -> RegisteredElement {
        RegisteredElement {
            element: Element {
                element_id: "elem_test".to_string(),
                pid,
                ..Default::default()
            },
            handle: Some(AxElement(1)),
            pid,
            registered_at,
        }
    }

    #[test]
    fn generated_ids_have_the_documented_shape() {
        let id = ElementRegistry::generate_id();
        let parts: Vec<&str> = id.splitn(3, '_').collect();
        assert_eq!(parts[0], "elem");
        assert!(parts[1].bytes().all(|b| b.is_ascii_digit()));
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn live_entry_is_visible_until_the_ttl_and_evicted_after() {
        let registered = Instant::now();
        let mut entries = HashMap::from([("e".to_string(), entry_at(1, registered))]);

        let just_before = registered + ELEMENT_TTL - Duration::from_millis(1);
        assert!(live_entry(&mut entries, "e", just_before).is_some());
        assert_eq!(entries.len(), 1);

        let at_expiry = registered + ELEMENT_TTL;
        assert!(live_entry(&mut entries, "e", at_expiry).is_none());
        // The same lookup that observed expiry evicted the entry.
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn clear_pid_removes_only_that_process() {
        let registry = ElementRegistry::new();
        for (id, pid) in [("a", 1), ("b", 1), ("c", 2)] {
            registry
                .register(
                    Element {
                        element_id: id.to_string(),
                        pid,
                        ..Default::default()
                    },
                    None,
                )
                .await;
        }

        assert_eq!(registry.clear_pid(1).await, 2);
        let stats = registry.stats().await;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.per_pid.get(&2), Some(&1));
    }

    #[tokio::test]
    async fn get_handle_requires_a_handle() {
        let registry = ElementRegistry::new();
        registry
            .register(
                Element {
                    element_id: "no-handle".to_string(),
                    pid: 1,
                    ..Default::default()
                },
                None,
            )
            .await;
        assert!(registry.get_handle("no-handle").await.is_err());
        assert!(registry.get("no-handle").await.is_ok());
    }

    #[tokio::test]
    async fn reaper_stops_on_shutdown() {
        let registry = Arc::new(ElementRegistry::new());
        let shutdown = CancellationToken::new();
        let handle = registry.spawn_reaper(shutdown.clone());
        shutdown.cancel();
        handle.await.unwrap();
    }
}
