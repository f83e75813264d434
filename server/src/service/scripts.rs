//! Script handlers: delegate to the executor and its safety preflight.

use macos_use_core::error::Result;

use macos_use_proto::macosusesdk::v1::ExecuteScriptRequest;
use macos_use_proto::macosusesdk::v1::ScriptResult;
use macos_use_proto::macosusesdk::v1::ValidateScriptRequest;
use macos_use_proto::macosusesdk::v1::ValidateScriptResponse;

use super::AutomationService;

impl AutomationService {
    pub(crate) async fn handle_execute_script(
        &self,
        request: ExecuteScriptRequest,
    ) -> Result<ScriptResult> {
        self.scripts.execute(request).await
    }

    pub(crate) async fn handle_validate_script(
        &self,
        request: ValidateScriptRequest,
    ) -> Result<ValidateScriptResponse> {
        let language = request.language();
        self.scripts.validate(language, &request.source).await
    }
}
