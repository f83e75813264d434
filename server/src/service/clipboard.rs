//! Clipboard handlers over the singleton `clipboard` resource.

use macos_use_core::clipboard::CLIPBOARD_HISTORY_RESOURCE;
use macos_use_core::clipboard::CLIPBOARD_RESOURCE;
use macos_use_core::error::AutomationError;
use macos_use_core::error::Result;
use macos_use_core::error::reason;

use macos_use_proto::macosusesdk::v1::Clipboard;
use macos_use_proto::macosusesdk::v1::ClearClipboardRequest;
use macos_use_proto::macosusesdk::v1::ClipboardHistory;
use macos_use_proto::macosusesdk::v1::GetClipboardHistoryRequest;
use macos_use_proto::macosusesdk::v1::GetClipboardRequest;
use macos_use_proto::macosusesdk::v1::WriteClipboardRequest;

use super::AutomationService;

impl AutomationService {
    pub(crate) async fn handle_get_clipboard(
        &self,
        request: GetClipboardRequest,
    ) -> Result<Clipboard> {
        // Only the singleton exists; any other name is not found.
        if !request.name.is_empty() && request.name != CLIPBOARD_RESOURCE {
            return Err(AutomationError::not_found(
                reason::CLIPBOARD_NOT_FOUND,
                "clipboard",
                request.name,
            ));
        }
        self.clipboard.read().await
    }

    pub(crate) async fn handle_write_clipboard(
        &self,
        request: WriteClipboardRequest,
    ) -> Result<Clipboard> {
        let content = request
            .content
            .ok_or_else(|| AutomationError::required_field("content"))?;
        let written = self.clipboard.write(content).await;
        match &written {
            Ok(_) => {
                self.record_session_op(
                    &request.session,
                    "writeClipboard",
                    CLIPBOARD_RESOURCE,
                    true,
                    "",
                )
                .await;
            }
            Err(err) => {
                self.record_session_op(
                    &request.session,
                    "writeClipboard",
                    CLIPBOARD_RESOURCE,
                    false,
                    &err.to_string(),
                )
                .await;
            }
        }
        written
    }

    pub(crate) async fn handle_clear_clipboard(
        &self,
        request: ClearClipboardRequest,
    ) -> Result<()> {
        self.clipboard.clear().await?;
        self.record_session_op(
            &request.session,
            "clearClipboard",
            CLIPBOARD_RESOURCE,
            true,
            "",
        )
        .await;
        Ok(())
    }

    pub(crate) async fn handle_get_clipboard_history(
        &self,
        request: GetClipboardHistoryRequest,
    ) -> Result<ClipboardHistory> {
        if !request.name.is_empty() && request.name != CLIPBOARD_HISTORY_RESOURCE {
            return Err(AutomationError::not_found(
                reason::CLIPBOARD_NOT_FOUND,
                "clipboardHistory",
                request.name,
            ));
        }
        Ok(self.clipboard.history().await)
    }
}
