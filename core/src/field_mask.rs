//! Read-mask handling (AIP-157).
//!
//! An absent or empty mask, or one containing `"*"`, selects every field.
//! Otherwise the response keeps exactly the listed fields plus the
//! identifier (`name`), which is always populated. Unknown paths are
//! ignored silently; update masks (AIP-134) are stricter and live with the
//! resource that supports them (see the macro registry).

use prost_types::FieldMask;

use macos_use_proto::macosusesdk::v1::Application;
use macos_use_proto::macosusesdk::v1::Window;

pub fn is_full_read_mask(mask: Option<&FieldMask>) -> bool {
    match mask {
        None => true,
        Some(mask) => mask.paths.is_empty() || mask.paths.iter().any(|p| p == "*"),
    }
}

fn keeps(mask: &FieldMask, path: &str) -> bool {
    mask.paths.iter().any(|p| p == path)
}

pub fn apply_application_read_mask(application: &mut Application, mask: Option<&FieldMask>) {
    if is_full_read_mask(mask) {
        return;
    }
    let Some(mask) = mask else { return };
    if !keeps(mask, "display_name") {
        application.display_name = String::new();
    }
    if !keeps(mask, "pid") {
        application.pid = 0;
    }
    if !keeps(mask, "bundle_id") {
        application.bundle_id = String::new();
    }
}

pub fn apply_window_read_mask(window: &mut Window, mask: Option<&FieldMask>) {
    if is_full_read_mask(mask) {
        return;
    }
    let Some(mask) = mask else { return };
    if !keeps(mask, "title") {
        window.title = String::new();
    }
    if !keeps(mask, "bounds") {
        window.bounds = None;
    }
    if !keeps(mask, "z_index") {
        window.z_index = 0;
    }
    if !keeps(mask, "visible") {
        window.visible = false;
    }
    if !keeps(mask, "bundle_id") {
        window.bundle_id = String::new();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use macos_use_proto::macosusesdk::v1::Rect;

    fn mask(paths: &[&str]) -> FieldMask {
        FieldMask {
            paths: paths.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn sample_window() -> Window {
        Window {
            name: "applications/42/windows/7".to_string(),
            title: "Untitled".to_string(),
            bounds: Some(Rect {
                x: 0.0,
                y: 0.0,
                width: 640.0,
                height: 480.0,
            }),
            z_index: 3,
            visible: true,
            bundle_id: "com.example.app".to_string(),
        }
    }

    #[test]
    fn empty_and_star_masks_keep_everything() {
        for m in [None, Some(mask(&[])), Some(mask(&["*"])), Some(mask(&["title", "*"]))] {
            let mut window = sample_window();
            apply_window_read_mask(&mut window, m.as_ref());
            assert_eq!(window, sample_window());
        }
    }

    #[test]
    fn identifier_survives_a_mask_that_excludes_it() {
        let mut window = sample_window();
        apply_window_read_mask(&mut window, Some(&mask(&["bounds"])));
        assert_eq!(window.name, "applications/42/windows/7");
        assert_eq!(window.bounds, sample_window().bounds);
        assert_eq!(window.title, "");
        assert_eq!(window.z_index, 0);
        assert!(!window.visible);
        assert_eq!(window.bundle_id, "");
    }

    #[test]
    fn unknown_paths_are_ignored() {
        let mut window = sample_window();
        apply_window_read_mask(&mut window, Some(&mask(&["title", "no_such_field"])));
        assert_eq!(window.title, "Untitled");
        assert_eq!(window.bounds, None);
    }

    #[test]
    fn application_mask_keeps_listed_fields_only() {
        let mut application = Application {
            name: "applications/42".to_string(),
            display_name: "Example".to_string(),
            pid: 42,
            bundle_id: "com.example.app".to_string(),
        };
        apply_application_read_mask(&mut application, Some(&mask(&["pid"])));
        assert_eq!(
            application,
            Application {
                name: "applications/42".to_string(),
                display_name: String::new(),
                pid: 42,
                bundle_id: String::new(),
            }
        );
    }
}
