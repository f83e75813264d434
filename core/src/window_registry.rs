//! TTL-cached snapshot of the host window list.
//!
//! The host window list is authoritative for z-order and bundle identity
//! but can lag mutations, so entries here are only trusted for one second.
//! A refresh stamps every returned window with a single `now` and then
//! evicts whatever fell out of the TTL window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::platform::Rect;
use crate::platform::SystemOperations;
use crate::platform::WindowInfo;

/// Cached entries are fresh iff `now - refreshed_at < TTL`.
pub const WINDOW_CACHE_TTL: Duration = Duration::from_secs(1);

/// Position/bounds matches accept up to this many points of drift.
pub const MATCH_TOLERANCE: f64 = 5.0;

#[derive(Debug, Clone)]
struct CachedWindow {
    info: WindowInfo,
    refreshed_at: Instant,
}

pub struct WindowRegistry {
    system: Arc<dyn SystemOperations>,
    entries: Mutex<HashMap<u32, CachedWindow>>,
}

impl WindowRegistry {
    pub fn new(system: Arc<dyn SystemOperations>) -> Self {
        Self {
            system,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Re-reads the host window list (optionally scoped to one pid),
    /// overwrites the matching entries under a single timestamp, and evicts
    /// anything stale.
    pub async fn refresh(&self, pid: Option<i32>) -> Result<()> {
        let windows = self.system.list_windows(pid).await?;
        let mut entries = self.entries.lock().await;
        apply_refresh(&mut entries, windows, Instant::now());
        Ok(())
    }

    /// The cached entry if fresh; otherwise refreshes everything and
    /// returns whatever the new snapshot has (possibly nothing).
    pub async fn get(&self, window_id: u32) -> Result<Option<WindowInfo>> {
        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(&window_id)
                && entry.refreshed_at.elapsed() < WINDOW_CACHE_TTL
            {
                return Ok(Some(entry.info.clone()));
            }
        }
        self.refresh(None).await?;
        let entries = self.entries.lock().await;
        Ok(entries.get(&window_id).map(|entry| entry.info.clone()))
    }

    /// Refreshes scoped to `pid` and returns its windows ordered by layer
    /// ascending.
    pub async fn list_for_pid(&self, pid: i32) -> Result<Vec<WindowInfo>> {
        self.refresh(Some(pid)).await?;
        let entries = self.entries.lock().await;
        let mut windows: Vec<WindowInfo> = entries
            .values()
            .filter(|entry| entry.info.pid == pid)
            .map(|entry| entry.info.clone())
            .collect();
        windows.sort_by_key(|window| window.layer);
        Ok(windows)
    }

    /// Drops one entry; used after mutations so the next read re-queries.
    pub async fn invalidate(&self, window_id: u32) {
        if self.entries.lock().await.remove(&window_id).is_some() {
            debug!("invalidated window {window_id}");
        }
    }

    /// Pure lookup with no refresh, stale entries included. Used on
    /// latency-sensitive paths and for pre-mutation capture.
    pub async fn last_known(&self, window_id: u32) -> Option<WindowInfo> {
        self.entries
            .lock()
            .await
            .get(&window_id)
            .map(|entry| entry.info.clone())
    }

    /// The unique window of `pid` whose origin lies within the tolerance of
    /// `(x, y)`. Ambiguity counts as no match.
    pub async fn find_by_position(&self, pid: i32, x: f64, y: f64) -> Option<WindowInfo> {
        let entries = self.entries.lock().await;
        unique_match(&entries, pid, |info| {
            (info.bounds.x - x).abs() <= MATCH_TOLERANCE
                && (info.bounds.y - y).abs() <= MATCH_TOLERANCE
        })
    }

    /// The unique window of `pid` whose full bounds lie within the
    /// tolerance of `bounds`.
    pub async fn find_by_bounds(&self, pid: i32, bounds: Rect) -> Option<WindowInfo> {
        let entries = self.entries.lock().await;
        unique_match(&entries, pid, |info| {
            (info.bounds.x - bounds.x).abs() <= MATCH_TOLERANCE
                && (info.bounds.y - bounds.y).abs() <= MATCH_TOLERANCE
                && (info.bounds.width - bounds.width).abs() <= MATCH_TOLERANCE
                && (info.bounds.height - bounds.height).abs() <= MATCH_TOLERANCE
        })
    }
}

fn apply_refresh(
    entries: &mut HashMap<u32, CachedWindow>,
    windows: Vec<WindowInfo>,
    now: Instant,
) {
    for info in windows {
        entries.insert(
            info.window_id,
            CachedWindow {
                info,
                refreshed_at: now,
            },
        );
    }
    entries.retain(|_, entry| now.duration_since(entry.refreshed_at) < WINDOW_CACHE_TTL);
}

fn unique_match(
    entries: &HashMap<u32, CachedWindow>,
    pid: i32,
    matches: impl Fn(&WindowInfo) -> bool,
) -> Option<WindowInfo> {
    let mut found: Option<WindowInfo> = None;
    for entry in entries.values() {
        if entry.info.pid == pid && matches(&entry.info) {
            if found.is_some() {
                return None;
            }
            found = Some(entry.info.clone());
        }
    }
    found
}
