//! File-dialog handlers: delegates over the core orchestration.

use macos_use_core::error::Result;

use macos_use_proto::macosusesdk::v1::DragFilesRequest;
use macos_use_proto::macosusesdk::v1::OpenFileDialogRequest;
use macos_use_proto::macosusesdk::v1::OpenFileDialogResponse;
use macos_use_proto::macosusesdk::v1::SaveFileDialogRequest;
use macos_use_proto::macosusesdk::v1::SaveFileDialogResponse;
use macos_use_proto::macosusesdk::v1::SelectDirectoryRequest;
use macos_use_proto::macosusesdk::v1::SelectFileRequest;
use macos_use_proto::macosusesdk::v1::SelectionResponse;

use super::AutomationService;

impl AutomationService {
    pub(crate) async fn handle_open_file_dialog(
        &self,
        request: OpenFileDialogRequest,
    ) -> Result<OpenFileDialogResponse> {
        self.file_dialogs.open(request).await
    }

    pub(crate) async fn handle_save_file_dialog(
        &self,
        request: SaveFileDialogRequest,
    ) -> Result<SaveFileDialogResponse> {
        self.file_dialogs.save(request).await
    }

    pub(crate) async fn handle_select_file(
        &self,
        request: SelectFileRequest,
    ) -> Result<SelectionResponse> {
        let path = self.file_dialogs.select_file(request).await?;
        Ok(SelectionResponse { path })
    }

    pub(crate) async fn handle_select_directory(
        &self,
        request: SelectDirectoryRequest,
    ) -> Result<SelectionResponse> {
        let path = self.file_dialogs.select_directory(request).await?;
        Ok(SelectionResponse { path })
    }

    pub(crate) async fn handle_drag_files(&self, request: DragFilesRequest) -> Result<()> {
        self.file_dialogs.drag_files(request).await
    }
}
