//! Window responses reconcile two sources of truth that routinely disagree:
//! a fresh per-element attribute read (right about geometry and
//! minimized/hidden, knows nothing of stacking) and the cached window-list
//! snapshot (right about z-order and bundle identity, up to a second
//! stale). The authority table:
//!
//! | field                           | source                        |
//! |---------------------------------|-------------------------------|
//! | bounds, title, minimized/hidden | attribute read, every response |
//! | z-index, bundle id              | registry entry or caller hint |
//! | visible                         | derived, see [`derive_visible`] |
//!
//! Geometry mutations may regenerate the host window id, so move/resize
//! re-locate the window by its requested geometry after the fact and answer
//! with the new id.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::convert::rect_to_proto;
use crate::error::AutomationError;
use crate::error::Result;
use crate::error::reason;
use crate::platform::AxElement;
use crate::platform::PlatformError;
use crate::platform::Point;
use crate::platform::Rect;
use crate::platform::SystemOperations;
use crate::platform::WindowAttributes;
use crate::platform::WindowInfo;
use crate::resource_name::window_name;
use crate::resource_name::window_state_name;
use crate::window_registry::WindowRegistry;

use macos_use_proto::macosusesdk::v1::Window;
use macos_use_proto::macosusesdk::v1::WindowState;

/// Minimize/restore verification polls the attribute at this cadence…
const VERIFY_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// …for at most this long before giving up on convergence.
const VERIFY_TIMEOUT: Duration = Duration::from_secs(2);

pub struct WindowService {
    system: Arc<dyn SystemOperations>,
    registry: Arc<WindowRegistry>,
}

/// The split-brain visibility rule: trust the fresh attribute read when it
/// says the window is neither minimized nor hidden, even if the stale
/// snapshot still claims it is off-screen.
pub fn derive_visible(is_on_screen: bool, minimized: bool, hidden: bool) -> bool {
    (is_on_screen || (!minimized && !hidden)) && !minimized && !hidden
}

impl WindowService {
    pub fn new(system: Arc<dyn SystemOperations>, registry: Arc<WindowRegistry>) -> Self {
        Self { system, registry }
    }

    /// Composes a full window response from a fresh attribute read plus the
    /// cached metadata.
    pub async fn get_window(&self, pid: i32, window_id: u32) -> Result<Window> {
        let (element, info) = self.acquire_element(pid, window_id).await?;
        let attributes = self.system.window_attributes(element).await?;
        Ok(compose_window(pid, window_id, &attributes, info.as_ref()))
    }

    pub async fn get_window_state(&self, pid: i32, window_id: u32) -> Result<WindowState> {
        let (element, _) = self.acquire_element(pid, window_id).await?;
        let state = self.system.window_state(element).await?;
        Ok(WindowState {
            name: window_state_name(pid, window_id),
            resizable: state.resizable,
            minimizable: state.minimizable,
            closable: state.closable,
            modal: state.modal,
            floating: state.floating,
            ax_hidden: state.ax_hidden,
            minimized: state.minimized,
            focused: state.focused,
            fullscreen: state.fullscreen,
        })
    }

    /// Listing composes from the registry snapshot alone. No per-window
    /// attribute reads happen here, which keeps latency flat in the number
    /// of windows; clients that need authoritative state call
    /// `GetWindowState`.
    pub async fn list_windows(&self, pid: i32) -> Result<Vec<Window>> {
        let windows = self.registry.list_for_pid(pid).await?;
        Ok(windows.into_iter().map(window_from_info).collect())
    }

    /// Moves the window and answers with the (possibly regenerated) id.
    pub async fn move_window(&self, pid: i32, window_id: u32, x: f64, y: f64) -> Result<Window> {
        let pre_info = self.registry.last_known(window_id).await;
        let (element, _) = self.acquire_element(pid, window_id).await?;

        if let Err(err) = self.system.set_window_position(element, Point::new(x, y)).await {
            self.registry.invalidate(window_id).await;
            return Err(err.into());
        }

        self.registry.refresh(Some(pid)).await?;
        let relocated = self.registry.find_by_position(pid, x, y).await;
        self.finish_geometry_mutation(pid, window_id, element, pre_info, relocated)
            .await
    }

    /// Resizes the window and answers with the (possibly regenerated) id.
    pub async fn resize_window(
        &self,
        pid: i32,
        window_id: u32,
        width: f64,
        height: f64,
    ) -> Result<Window> {
        let pre_info = self.registry.last_known(window_id).await;
        let (element, acquired_info) = self.acquire_element(pid, window_id).await?;

        if let Err(err) = self.system.set_window_size(element, width, height).await {
            self.registry.invalidate(window_id).await;
            return Err(err.into());
        }

        self.registry.refresh(Some(pid)).await?;
        // The requested bounds keep the pre-mutation origin; fall back to a
        // fresh read when the origin was never cached.
        let origin = match pre_info.as_ref().or(acquired_info.as_ref()) {
            Some(info) => info.bounds.origin(),
            None => self.system.window_attributes(element).await?.bounds.origin(),
        };
        let relocated = self
            .registry
            .find_by_bounds(pid, Rect::new(origin.x, origin.y, width, height))
            .await;
        self.finish_geometry_mutation(pid, window_id, element, pre_info, relocated)
            .await
    }

    /// Sets the minimized attribute and verifies it took effect before
    /// answering, so the response never reflects the pre-mutation state.
    pub async fn set_minimized(
        &self,
        pid: i32,
        window_id: u32,
        minimized: bool,
    ) -> Result<Window> {
        let pre_info = self.registry.last_known(window_id).await;
        let (element, _) = self.acquire_element(pid, window_id).await?;

        if let Err(err) = self.system.set_window_minimized(element, minimized).await {
            self.registry.invalidate(window_id).await;
            return Err(err.into());
        }

        let attributes = self.verify_minimized(element, minimized).await?;
        self.registry.refresh(Some(pid)).await?;
        self.registry.invalidate(window_id).await;
        Ok(compose_window(pid, window_id, &attributes, pre_info.as_ref()))
    }

    /// Presses the close button. A window without one is a precondition
    /// failure, not an internal error.
    pub async fn close_window(&self, pid: i32, window_id: u32) -> Result<()> {
        let (element, _) = self.acquire_element(pid, window_id).await?;
        match self.system.press_close_button(element).await {
            Ok(()) => {
                self.registry.invalidate(window_id).await;
                Ok(())
            }
            Err(PlatformError::NotFound(_)) => Err(AutomationError::failed_precondition(
                reason::NO_CLOSE_BUTTON,
                format!("window {window_id} has no close button"),
            )),
            Err(err) => {
                self.registry.invalidate(window_id).await;
                Err(err.into())
            }
        }
    }

    /// Locates the accessibility element for a window id, using the cached
    /// bounds and title as the lookup hint. A zero-rect hint (nothing
    /// cached) still scores across the pid's windows.
    async fn acquire_element(
        &self,
        pid: i32,
        window_id: u32,
    ) -> Result<(AxElement, Option<WindowInfo>)> {
        let info = self.registry.get(window_id).await?;
        let (expected_bounds, title) = match &info {
            Some(info) => (info.bounds, Some(info.title.clone())),
            None => (Rect::default(), None),
        };
        let element = self
            .system
            .find_window_element(pid, expected_bounds, title.as_deref())
            .await?
            .ok_or_else(|| {
                AutomationError::not_found(
                    reason::WINDOW_NOT_FOUND,
                    "window",
                    window_name(pid, window_id),
                )
            })?;
        Ok((element, info))
    }

    /// Shared tail of move/resize: pick up a regenerated id when the
    /// post-mutation snapshot shows a unique window at the requested
    /// geometry, then compose from the freshest element available.
    async fn finish_geometry_mutation(
        &self,
        pid: i32,
        old_window_id: u32,
        element: AxElement,
        pre_info: Option<WindowInfo>,
        relocated: Option<WindowInfo>,
    ) -> Result<Window> {
        let mut element = element;
        let mut window_id = old_window_id;
        let mut info = relocated.clone().or(pre_info);

        if let Some(new_info) = relocated
            && new_info.window_id != old_window_id
        {
            debug!(
                "window id regenerated {old_window_id} -> {} after geometry mutation",
                new_info.window_id
            );
            window_id = new_info.window_id;
            if let Some(reacquired) = self
                .system
                .find_window_element(pid, new_info.bounds, Some(&new_info.title))
                .await?
            {
                element = reacquired;
            }
            info = Some(new_info);
        }

        self.registry.invalidate(old_window_id).await;

        let attributes = self.system.window_attributes(element).await?;
        Ok(compose_window(pid, window_id, &attributes, info.as_ref()))
    }

    async fn verify_minimized(
        &self,
        element: AxElement,
        expected: bool,
    ) -> Result<WindowAttributes> {
        let deadline = Instant::now() + VERIFY_TIMEOUT;
        loop {
            let attributes = self.system.window_attributes(element).await?;
            if attributes.minimized == expected {
                return Ok(attributes);
            }
            if Instant::now() >= deadline {
                warn!(
                    "minimized attribute did not reach {expected} within {VERIFY_TIMEOUT:?}; \
                     answering with the last read"
                );
                return Ok(attributes);
            }
            tokio::time::sleep(VERIFY_POLL_INTERVAL).await;
        }
    }
}

fn compose_window(
    pid: i32,
    window_id: u32,
    attributes: &WindowAttributes,
    info: Option<&WindowInfo>,
) -> Window {
    let is_on_screen = info.is_some_and(|info| info.is_on_screen);
    Window {
        name: window_name(pid, window_id),
        title: attributes.title.clone(),
        bounds: Some(rect_to_proto(attributes.bounds)),
        z_index: info.map(|info| info.layer).unwrap_or_default(),
        visible: derive_visible(is_on_screen, attributes.minimized, attributes.hidden),
        bundle_id: info
            .and_then(|info| info.bundle_id.clone())
            .unwrap_or_default(),
    }
}

/// List composition: registry data only, `visible` straight from the
/// snapshot's on-screen flag.
fn window_from_info(info: WindowInfo) -> Window {
    Window {
        name: window_name(info.pid, info.window_id),
        title: info.title,
        bounds: Some(rect_to_proto(info.bounds)),
        z_index: info.layer,
        visible: info.is_on_screen,
        bundle_id: info.bundle_id.unwrap_or_default(),
    }
}
