//! File-dialog orchestration: open/save dialogs, programmatic selection,
//! and drag-and-drop of files onto an element.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use crate::element_registry::ElementRegistry;
use crate::error::AutomationError;
use crate::error::Result;
use crate::error::reason;
use crate::input::drag_path;
use crate::platform::OpenDialogOptions;
use crate::platform::Point;
use crate::platform::SaveDialogOptions;
use crate::platform::SystemOperations;
use crate::resource_name::parse_element_name;
use crate::validation::require_non_negative;
use crate::validation::require_string;

use macos_use_proto::macosusesdk::v1::DragFilesRequest;
use macos_use_proto::macosusesdk::v1::OpenFileDialogRequest;
use macos_use_proto::macosusesdk::v1::OpenFileDialogResponse;
use macos_use_proto::macosusesdk::v1::SaveFileDialogRequest;
use macos_use_proto::macosusesdk::v1::SaveFileDialogResponse;
use macos_use_proto::macosusesdk::v1::SelectDirectoryRequest;
use macos_use_proto::macosusesdk::v1::SelectFileRequest;

/// The drag origin is nudged off the drop point so the host registers an
/// actual movement before the drop.
const DRAG_ORIGIN_OFFSET: f64 = 40.0;

pub struct FileDialogService {
    system: Arc<dyn SystemOperations>,
    elements: Arc<ElementRegistry>,
}

impl FileDialogService {
    pub fn new(system: Arc<dyn SystemOperations>, elements: Arc<ElementRegistry>) -> Self {
        Self { system, elements }
    }

    pub async fn open(&self, request: OpenFileDialogRequest) -> Result<OpenFileDialogResponse> {
        let paths = self
            .system
            .open_file_dialog(OpenDialogOptions {
                allow_multiple: request.allow_multiple,
                allowed_extensions: request.allowed_extensions.clone(),
                default_directory: non_empty_path(&request.default_directory),
            })
            .await?;
        Ok(OpenFileDialogResponse {
            cancelled: paths.is_empty(),
            paths: paths
                .into_iter()
                .map(|path| path.to_string_lossy().into_owned())
                .collect(),
        })
    }

    pub async fn save(&self, request: SaveFileDialogRequest) -> Result<SaveFileDialogResponse> {
        let chosen = self
            .system
            .save_file_dialog(SaveDialogOptions {
                default_directory: non_empty_path(&request.default_directory),
                default_filename: if request.default_filename.is_empty() {
                    None
                } else {
                    Some(request.default_filename.clone())
                },
                confirm_overwrite: request.confirm_overwrite,
            })
            .await?;
        Ok(SaveFileDialogResponse {
            cancelled: chosen.is_none(),
            path: chosen
                .map(|path| path.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })
    }

    /// Programmatic file selection. The path must exist and be readable;
    /// `reveal` additionally shows it in the host file viewer.
    pub async fn select_file(&self, request: SelectFileRequest) -> Result<String> {
        require_string("path", &request.path)?;
        let path = Path::new(&request.path);
        let metadata = tokio::fs::metadata(path).await.map_err(|err| {
            AutomationError::permission_denied(
                reason::FILE_PERMISSION_DENIED,
                format!("cannot read {}: {err}", request.path),
            )
        })?;
        if metadata.is_dir() {
            return Err(AutomationError::invalid_argument(
                reason::INVALID_ACTION,
                format!("{} is a directory, expected a file", request.path),
            ));
        }
        if request.reveal {
            self.system.reveal_in_file_viewer(path).await?;
        }
        Ok(request.path)
    }

    /// Programmatic directory selection, optionally creating it first.
    pub async fn select_directory(&self, request: SelectDirectoryRequest) -> Result<String> {
        require_string("path", &request.path)?;
        let path = Path::new(&request.path);

        if request.create_missing && tokio::fs::metadata(path).await.is_err() {
            tokio::fs::create_dir_all(path).await.map_err(|err| {
                AutomationError::permission_denied(
                    reason::FILE_PERMISSION_DENIED,
                    format!("cannot create {}: {err}", request.path),
                )
            })?;
        }

        let metadata = tokio::fs::metadata(path).await.map_err(|err| {
            AutomationError::permission_denied(
                reason::FILE_PERMISSION_DENIED,
                format!("cannot read {}: {err}", request.path),
            )
        })?;
        if !metadata.is_dir() {
            return Err(AutomationError::invalid_argument(
                reason::NOT_A_DIRECTORY,
                format!("{} is not a directory", request.path),
            ));
        }
        Ok(request.path)
    }

    /// Drags the named files onto the target element: press at a slightly
    /// offset origin, interpolate move events, release over the element's
    /// center.
    pub async fn drag_files(&self, request: DragFilesRequest) -> Result<()> {
        if request.paths.is_empty() {
            return Err(AutomationError::required_field("paths"));
        }
        for path in &request.paths {
            require_string("paths", path)?;
        }
        require_non_negative("duration", request.duration)?;

        let parsed = parse_element_name(&request.target_element)?;
        let element = self.elements.get(&parsed.id).await?;
        let bounds = element.bounds.as_ref().ok_or_else(|| {
            AutomationError::failed_precondition(
                reason::ELEMENT_WITHOUT_BOUNDS,
                format!("element {} has no bounds to drop onto", parsed.id),
            )
        })?;

        let target = crate::convert::rect_from_proto(bounds).center();
        let origin = Point::new(target.x - DRAG_ORIGIN_OFFSET, target.y - DRAG_ORIGIN_OFFSET);
        drag_path(&self.system, origin, target, request.duration).await
    }
}

fn non_empty_path(raw: &str) -> Option<PathBuf> {
    if raw.is_empty() {
        None
    } else {
        Some(PathBuf::from(raw))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::platform::UnsupportedSystem;

    fn service() -> FileDialogService {
        FileDialogService::new(
            Arc::new(UnsupportedSystem),
            Arc::new(ElementRegistry::new()),
        )
    }

    #[tokio::test]
    async fn select_file_requires_a_path() {
        let err = service()
            .select_file(SelectFileRequest {
                path: String::new(),
                reveal: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.reason(), reason::REQUIRED_FIELD_MISSING);
    }

    #[tokio::test]
    async fn select_file_rejects_directories_and_unreadable_paths() {
        let dir = tempfile::tempdir().unwrap();

        let err = service()
            .select_file(SelectFileRequest {
                path: dir.path().to_string_lossy().into_owned(),
                reveal: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.reason(), reason::INVALID_ACTION);

        let err = service()
            .select_file(SelectFileRequest {
                path: dir.path().join("missing.txt").to_string_lossy().into_owned(),
                reveal: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.reason(), reason::FILE_PERMISSION_DENIED);
    }

    #[tokio::test]
    async fn select_directory_creates_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("fresh/nested");

        let err = service()
            .select_directory(SelectDirectoryRequest {
                path: target.to_string_lossy().into_owned(),
                create_missing: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.reason(), reason::FILE_PERMISSION_DENIED);

        let selected = service()
            .select_directory(SelectDirectoryRequest {
                path: target.to_string_lossy().into_owned(),
                create_missing: true,
            })
            .await
            .unwrap();
        assert_eq!(selected, target.to_string_lossy());
        assert!(target.is_dir());
    }

    #[tokio::test]
    async fn drag_requires_paths_and_finite_duration() {
        let err = service()
            .drag_files(DragFilesRequest {
                paths: vec![],
                target_element: "applications/1/elements/e".to_string(),
                duration: 1.0,
            })
            .await
            .unwrap_err();
        assert_eq!(err.reason(), reason::REQUIRED_FIELD_MISSING);

        let err = service()
            .drag_files(DragFilesRequest {
                paths: vec!["/tmp/a".to_string()],
                target_element: "applications/1/elements/e".to_string(),
                duration: f64::NAN,
            })
            .await
            .unwrap_err();
        assert_eq!(err.reason(), reason::INVALID_DIMENSION);
    }
}
