//! The input primitive shared by the PerformInput endpoint, the macro
//! executor, and file dragging.

use std::sync::Arc;
use std::time::Duration;

use crate::convert::point_from_proto;
use crate::error::AutomationError;
use crate::error::Result;
use crate::error::reason;
use crate::platform::MouseButtonKind;
use crate::platform::Point;
use crate::platform::SystemOperations;
use crate::validation::require_coordinate;
use crate::validation::require_non_negative;

use macos_use_proto::macosusesdk::v1::InputAction;
use macos_use_proto::macosusesdk::v1::MouseButton;
use macos_use_proto::macosusesdk::v1::input_action::Kind;

/// Validates an input action without touching the host. Called before the
/// input record is created so malformed requests have no side effects.
pub fn validate_action(action: &InputAction) -> Result<()> {
    let kind = action
        .kind
        .as_ref()
        .ok_or_else(|| AutomationError::required_field("action"))?;
    match kind {
        Kind::Click(click) => {
            let position = click
                .position
                .as_ref()
                .ok_or_else(|| AutomationError::required_field("action.click.position"))?;
            require_coordinate("action.click.position.x", position.x)?;
            require_coordinate("action.click.position.y", position.y)?;
        }
        Kind::TypeText(type_text) => {
            if type_text.text.is_empty() {
                return Err(AutomationError::required_field("action.type_text.text"));
            }
        }
        Kind::KeyPress(key_press) => {
            if key_press.key.is_empty() {
                return Err(AutomationError::required_field("action.key_press.key"));
            }
        }
        Kind::Scroll(scroll) => {
            let position = scroll
                .position
                .as_ref()
                .ok_or_else(|| AutomationError::required_field("action.scroll.position"))?;
            require_coordinate("action.scroll.position.x", position.x)?;
            require_coordinate("action.scroll.position.y", position.y)?;
            require_coordinate("action.scroll.delta_x", scroll.delta_x)?;
            require_coordinate("action.scroll.delta_y", scroll.delta_y)?;
        }
        Kind::Drag(drag) => {
            let from = drag
                .from
                .as_ref()
                .ok_or_else(|| AutomationError::required_field("action.drag.from"))?;
            let to = drag
                .to
                .as_ref()
                .ok_or_else(|| AutomationError::required_field("action.drag.to"))?;
            require_coordinate("action.drag.from.x", from.x)?;
            require_coordinate("action.drag.from.y", from.y)?;
            require_coordinate("action.drag.to.x", to.x)?;
            require_coordinate("action.drag.to.y", to.y)?;
            require_non_negative("action.drag.duration", drag.duration)?;
        }
    }
    Ok(())
}

/// Synthesizes the action through the platform adapter. Callers are
/// expected to have validated first.
pub async fn perform_action(
    system: &Arc<dyn SystemOperations>,
    action: &InputAction,
) -> Result<()> {
    let kind = action
        .kind
        .as_ref()
        .ok_or_else(|| AutomationError::required_field("action"))?;
    match kind {
        Kind::Click(click) => {
            let position = click
                .position
                .as_ref()
                .map(point_from_proto)
                .unwrap_or_default();
            let button = match click.button() {
                MouseButton::Right => MouseButtonKind::Right,
                MouseButton::Middle => MouseButtonKind::Middle,
                MouseButton::Left | MouseButton::Unspecified => MouseButtonKind::Left,
            };
            let click_count = if click.click_count <= 0 {
                1
            } else {
                click.click_count as u32
            };
            system.post_click(position, button, click_count).await?;
        }
        Kind::TypeText(type_text) => {
            system.type_text(&type_text.text).await?;
        }
        Kind::KeyPress(key_press) => {
            system.press_key(&key_press.modifiers, &key_press.key).await?;
        }
        Kind::Scroll(scroll) => {
            let position = scroll
                .position
                .as_ref()
                .map(point_from_proto)
                .unwrap_or_default();
            system
                .scroll(position, scroll.delta_x, scroll.delta_y)
                .await?;
        }
        Kind::Drag(drag) => {
            let from = drag.from.as_ref().map(point_from_proto).unwrap_or_default();
            let to = drag.to.as_ref().map(point_from_proto).unwrap_or_default();
            drag_path(system, from, to, drag.duration).await?;
        }
    }
    Ok(())
}

/// Number of intermediate move events for a drag of `duration` seconds.
pub fn drag_steps(duration: f64) -> u32 {
    ((duration * 60.0).round() as u32).max(10)
}

/// Presses at `from`, interpolates `drag_steps` move events spaced
/// `duration / steps` apart, and releases at `to`.
pub async fn drag_path(
    system: &Arc<dyn SystemOperations>,
    from: Point,
    to: Point,
    duration: f64,
) -> Result<()> {
    let steps = drag_steps(duration);
    let pause = Duration::from_secs_f64((duration.max(0.0)) / steps as f64);

    system.mouse_down(from).await?;
    for step in 1..=steps {
        let t = step as f64 / steps as f64;
        let point = Point::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t);
        system.mouse_move(point).await?;
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
    system.mouse_up(to).await?;
    Ok(())
}

pub fn invalid_unknown_method(method: &str) -> AutomationError {
    AutomationError::invalid_argument_with(
        reason::INVALID_ACTION,
        format!("unknown method {method:?}"),
        [("method", method.to_string())],
    )
}
