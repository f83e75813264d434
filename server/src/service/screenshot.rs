//! Screenshot handler: a direct delegate, validation included.

use macos_use_core::error::Result;

use macos_use_proto::macosusesdk::v1::Screenshot;
use macos_use_proto::macosusesdk::v1::TakeScreenshotRequest;

use super::AutomationService;

impl AutomationService {
    pub(crate) async fn handle_take_screenshot(
        &self,
        request: TakeScreenshotRequest,
    ) -> Result<Screenshot> {
        self.screenshots.take(request).await
    }
}
