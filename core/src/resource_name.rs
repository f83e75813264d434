//! Canonical resource-name grammars (AIP-122).
//!
//! Every parser accepts exactly one shape and nothing else; failures are
//! invalid-argument errors carrying `{resourceType, value, expectedFormat}`
//! metadata. The wildcard segment `-` in `applications/-` means
//! "collection-wide / desktop scope".

use crate::error::AutomationError;
use crate::error::Result;

pub const APPLICATION_COLLECTION: &str = "applications";
pub const DESKTOP_INPUT_COLLECTION: &str = "desktopInputs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplicationName {
    pub pid: i32,
}

/// Parent scope for collection endpoints: a concrete application or the
/// desktop-wide wildcard `applications/-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationScope {
    All,
    Pid(i32),
}

impl ApplicationScope {
    pub fn pid(self) -> Option<i32> {
        match self {
            Self::All => None,
            Self::Pid(pid) => Some(pid),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowName {
    pub pid: i32,
    pub window_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationName {
    pub pid: i32,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementName {
    pub pid: i32,
    pub id: String,
}

/// `applications/{pid}/inputs/{id}`, or `desktopInputs/{id}` for inputs
/// performed outside any application scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputName {
    Application { pid: i32, id: String },
    Desktop { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionName {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroName {
    pub id: String,
}

/// `operations/{kind}/{id}` for typed operations, `operations/{id}` for
/// generic ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationName {
    pub kind: Option<String>,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayName {
    pub display_id: u32,
}

fn positive_i32(segment: &str) -> Option<i32> {
    // Reject leading '+' and leading zeros-with-sign forms that FromStr
    // would accept; a pid segment is plain digits.
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse::<i32>().ok().filter(|v| *v > 0)
}

fn positive_u32(segment: &str) -> Option<u32> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse::<u32>().ok().filter(|v| *v > 0)
}

fn nonempty_id(segment: &str) -> Option<&str> {
    (!segment.is_empty() && !segment.contains('/')).then_some(segment)
}

pub fn parse_application_name(name: &str) -> Result<ApplicationName> {
    let fail = || AutomationError::invalid_resource_name("application", name, "applications/{pid}");
    match name.split('/').collect::<Vec<_>>().as_slice() {
        [APPLICATION_COLLECTION, pid] => Ok(ApplicationName {
            pid: positive_i32(pid).ok_or_else(fail)?,
        }),
        _ => Err(fail()),
    }
}

/// Accepts `applications/{pid}` and the wildcard `applications/-`. An empty
/// string also means desktop scope for endpoints whose parent is optional.
pub fn parse_application_scope(name: &str) -> Result<ApplicationScope> {
    if name.is_empty() {
        return Ok(ApplicationScope::All);
    }
    let fail = || {
        AutomationError::invalid_resource_name(
            "application",
            name,
            "applications/{pid} or applications/-",
        )
    };
    match name.split('/').collect::<Vec<_>>().as_slice() {
        [APPLICATION_COLLECTION, "-"] => Ok(ApplicationScope::All),
        [APPLICATION_COLLECTION, pid] => Ok(ApplicationScope::Pid(
            positive_i32(pid).ok_or_else(fail)?,
        )),
        _ => Err(fail()),
    }
}

pub fn parse_window_name(name: &str) -> Result<WindowName> {
    let fail = || {
        AutomationError::invalid_resource_name(
            "window",
            name,
            "applications/{pid}/windows/{windowId}",
        )
    };
    match name.split('/').collect::<Vec<_>>().as_slice() {
        [APPLICATION_COLLECTION, pid, "windows", window_id] => Ok(WindowName {
            pid: positive_i32(pid).ok_or_else(fail)?,
            window_id: positive_u32(window_id).ok_or_else(fail)?,
        }),
        _ => Err(fail()),
    }
}

/// `applications/{pid}/windows/{windowId}/state` names the derived state
/// sub-resource; the parsed record is the owning window.
pub fn parse_window_state_name(name: &str) -> Result<WindowName> {
    let fail = || {
        AutomationError::invalid_resource_name(
            "windowState",
            name,
            "applications/{pid}/windows/{windowId}/state",
        )
    };
    match name.split('/').collect::<Vec<_>>().as_slice() {
        [APPLICATION_COLLECTION, pid, "windows", window_id, "state"] => Ok(WindowName {
            pid: positive_i32(pid).ok_or_else(fail)?,
            window_id: positive_u32(window_id).ok_or_else(fail)?,
        }),
        _ => Err(fail()),
    }
}

pub fn parse_observation_name(name: &str) -> Result<ObservationName> {
    let fail = || {
        AutomationError::invalid_resource_name(
            "observation",
            name,
            "applications/{pid}/observations/{id}",
        )
    };
    match name.split('/').collect::<Vec<_>>().as_slice() {
        [APPLICATION_COLLECTION, pid, "observations", id] => Ok(ObservationName {
            pid: positive_i32(pid).ok_or_else(fail)?,
            id: nonempty_id(id).ok_or_else(fail)?.to_string(),
        }),
        _ => Err(fail()),
    }
}

pub fn parse_element_name(name: &str) -> Result<ElementName> {
    let fail = || {
        AutomationError::invalid_resource_name(
            "element",
            name,
            "applications/{pid}/elements/{id}",
        )
    };
    match name.split('/').collect::<Vec<_>>().as_slice() {
        [APPLICATION_COLLECTION, pid, "elements", id] => Ok(ElementName {
            pid: positive_i32(pid).ok_or_else(fail)?,
            id: nonempty_id(id).ok_or_else(fail)?.to_string(),
        }),
        _ => Err(fail()),
    }
}

pub fn parse_input_name(name: &str) -> Result<InputName> {
    let fail = || {
        AutomationError::invalid_resource_name(
            "input",
            name,
            "applications/{pid}/inputs/{id} or desktopInputs/{id}",
        )
    };
    match name.split('/').collect::<Vec<_>>().as_slice() {
        [APPLICATION_COLLECTION, pid, "inputs", id] => Ok(InputName::Application {
            pid: positive_i32(pid).ok_or_else(fail)?,
            id: nonempty_id(id).ok_or_else(fail)?.to_string(),
        }),
        [DESKTOP_INPUT_COLLECTION, id] => Ok(InputName::Desktop {
            id: nonempty_id(id).ok_or_else(fail)?.to_string(),
        }),
        _ => Err(fail()),
    }
}

pub fn parse_session_name(name: &str) -> Result<SessionName> {
    let fail = || AutomationError::invalid_resource_name("session", name, "sessions/{id}");
    match name.split('/').collect::<Vec<_>>().as_slice() {
        ["sessions", id] => Ok(SessionName {
            id: nonempty_id(id).ok_or_else(fail)?.to_string(),
        }),
        _ => Err(fail()),
    }
}

pub fn parse_macro_name(name: &str) -> Result<MacroName> {
    let fail = || AutomationError::invalid_resource_name("macro", name, "macros/{id}");
    match name.split('/').collect::<Vec<_>>().as_slice() {
        ["macros", id] => Ok(MacroName {
            id: nonempty_id(id).ok_or_else(fail)?.to_string(),
        }),
        _ => Err(fail()),
    }
}

pub fn parse_operation_name(name: &str) -> Result<OperationName> {
    let fail = || {
        AutomationError::invalid_resource_name(
            "operation",
            name,
            "operations/{kind}/{id} or operations/{id}",
        )
    };
    match name.split('/').collect::<Vec<_>>().as_slice() {
        ["operations", kind, id] => Ok(OperationName {
            kind: Some(nonempty_id(kind).ok_or_else(fail)?.to_string()),
            id: nonempty_id(id).ok_or_else(fail)?.to_string(),
        }),
        ["operations", id] => Ok(OperationName {
            kind: None,
            id: nonempty_id(id).ok_or_else(fail)?.to_string(),
        }),
        _ => Err(fail()),
    }
}

pub fn parse_display_name(name: &str) -> Result<DisplayName> {
    let fail = || AutomationError::invalid_resource_name("display", name, "displays/{displayId}");
    match name.split('/').collect::<Vec<_>>().as_slice() {
        // Display 0 is the main display, so zero is legal here.
        ["displays", display_id]
            if !display_id.is_empty() && display_id.bytes().all(|b| b.is_ascii_digit()) =>
        {
            Ok(DisplayName {
                display_id: display_id.parse::<u32>().map_err(|_| fail())?,
            })
        }
        _ => Err(fail()),
    }
}

pub fn application_name(pid: i32) -> String {
    format!("applications/{pid}")
}

pub fn window_name(pid: i32, window_id: u32) -> String {
    format!("applications/{pid}/windows/{window_id}")
}

pub fn window_state_name(pid: i32, window_id: u32) -> String {
    format!("applications/{pid}/windows/{window_id}/state")
}

pub fn observation_name(pid: i32, id: &str) -> String {
    format!("applications/{pid}/observations/{id}")
}

pub fn element_name(pid: i32, id: &str) -> String {
    format!("applications/{pid}/elements/{id}")
}

pub fn input_name(scope: ApplicationScope, id: &str) -> String {
    match scope {
        ApplicationScope::Pid(pid) => format!("applications/{pid}/inputs/{id}"),
        ApplicationScope::All => format!("desktopInputs/{id}"),
    }
}

pub fn session_name(id: &str) -> String {
    format!("sessions/{id}")
}

pub fn macro_name(id: &str) -> String {
    format!("macros/{id}")
}

pub fn operation_name(kind: &str, id: &str) -> String {
    format!("operations/{kind}/{id}")
}

pub fn display_name(display_id: u32) -> String {
    format!("displays/{display_id}")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn application_name_round_trips_positive_pids() {
        for pid in [1, 42, 65_535, i32::MAX] {
            let parsed = parse_application_name(&application_name(pid)).unwrap();
            assert_eq!(parsed.pid, pid);
        }
    }

    #[test]
    fn application_name_rejects_other_shapes() {
        for bad in [
            "",
            "applications",
            "applications/",
            "applications/0",
            "applications/-7",
            "applications/abc",
            "applications/1/windows/2",
            "apps/1",
            "applications/1/",
            "Applications/1",
        ] {
            assert!(parse_application_name(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn scope_wildcard_and_empty_mean_desktop() {
        assert_eq!(
            parse_application_scope("applications/-").unwrap(),
            ApplicationScope::All
        );
        assert_eq!(parse_application_scope("").unwrap(), ApplicationScope::All);
        assert_eq!(
            parse_application_scope("applications/7").unwrap(),
            ApplicationScope::Pid(7)
        );
        assert!(parse_application_scope("applications/x").is_err());
    }

    #[test]
    fn window_name_requires_positive_ids() {
        let parsed = parse_window_name("applications/42/windows/1001").unwrap();
        assert_eq!(parsed.pid, 42);
        assert_eq!(parsed.window_id, 1001);

        for bad in [
            "applications/42/windows/0",
            "applications/0/windows/1",
            "applications/42/windows/",
            "applications/42/windows/1/state/extra",
        ] {
            assert!(parse_window_name(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn window_state_name_is_the_state_subresource() {
        let parsed = parse_window_state_name("applications/9/windows/3/state").unwrap();
        assert_eq!((parsed.pid, parsed.window_id), (9, 3));
        assert!(parse_window_state_name("applications/9/windows/3").is_err());
    }

    #[test]
    fn input_name_accepts_both_shapes() {
        assert_eq!(
            parse_input_name("applications/5/inputs/in_1").unwrap(),
            InputName::Application {
                pid: 5,
                id: "in_1".to_string()
            }
        );
        assert_eq!(
            parse_input_name("desktopInputs/in_2").unwrap(),
            InputName::Desktop {
                id: "in_2".to_string()
            }
        );
        assert!(parse_input_name("inputs/in_3").is_err());
    }

    #[test]
    fn operation_name_supports_kinded_and_generic() {
        let kinded = parse_operation_name("operations/open/abc").unwrap();
        assert_eq!(kinded.kind.as_deref(), Some("open"));
        assert_eq!(kinded.id, "abc");

        let generic = parse_operation_name("operations/abc").unwrap();
        assert_eq!(generic.kind, None);
        assert_eq!(generic.id, "abc");

        assert!(parse_operation_name("operations").is_err());
        assert!(parse_operation_name("operations/a/b/c").is_err());
    }

    #[test]
    fn display_zero_is_the_main_display() {
        assert_eq!(parse_display_name("displays/0").unwrap().display_id, 0);
        assert!(parse_display_name("displays/-1").is_err());
    }
}
