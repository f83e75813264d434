//! Window resource handlers: thin parsing/masking shims over the window
//! service, plus session recording for mutations.

use macos_use_core::error::Result;
use macos_use_core::field_mask::apply_window_read_mask;
use macos_use_core::page_token::effective_page_size;
use macos_use_core::page_token::paginate;
use macos_use_core::resource_name::parse_application_name;
use macos_use_core::resource_name::parse_window_name;
use macos_use_core::resource_name::parse_window_state_name;
use macos_use_core::validation::require_coordinate;
use macos_use_core::validation::require_dimension;

use macos_use_proto::macosusesdk::v1::CloseWindowRequest;
use macos_use_proto::macosusesdk::v1::GetWindowRequest;
use macos_use_proto::macosusesdk::v1::GetWindowStateRequest;
use macos_use_proto::macosusesdk::v1::ListWindowsRequest;
use macos_use_proto::macosusesdk::v1::ListWindowsResponse;
use macos_use_proto::macosusesdk::v1::MinimizeWindowRequest;
use macos_use_proto::macosusesdk::v1::MoveWindowRequest;
use macos_use_proto::macosusesdk::v1::ResizeWindowRequest;
use macos_use_proto::macosusesdk::v1::RestoreWindowRequest;
use macos_use_proto::macosusesdk::v1::Window;
use macos_use_proto::macosusesdk::v1::WindowState;

use super::AutomationService;
use super::DEFAULT_PAGE_SIZE;

impl AutomationService {
    pub(crate) async fn handle_list_windows(
        &self,
        request: ListWindowsRequest,
    ) -> Result<ListWindowsResponse> {
        let parent = parse_application_name(&request.parent)?;
        let all = self.windows.list_windows(parent.pid).await?;
        let page_size = effective_page_size(request.page_size, DEFAULT_PAGE_SIZE);
        let (mut page, next_page_token) = paginate(&all, page_size, &request.page_token)?;
        for window in &mut page {
            apply_window_read_mask(window, request.read_mask.as_ref());
        }
        Ok(ListWindowsResponse {
            windows: page,
            next_page_token,
        })
    }

    pub(crate) async fn handle_get_window(&self, request: GetWindowRequest) -> Result<Window> {
        let parsed = parse_window_name(&request.name)?;
        let mut window = self.windows.get_window(parsed.pid, parsed.window_id).await?;
        apply_window_read_mask(&mut window, request.read_mask.as_ref());
        Ok(window)
    }

    pub(crate) async fn handle_get_window_state(
        &self,
        request: GetWindowStateRequest,
    ) -> Result<WindowState> {
        let parsed = parse_window_state_name(&request.name)?;
        self.windows
            .get_window_state(parsed.pid, parsed.window_id)
            .await
    }

    pub(crate) async fn handle_move_window(&self, request: MoveWindowRequest) -> Result<Window> {
        let parsed = parse_window_name(&request.name)?;
        require_coordinate("x", request.x)?;
        require_coordinate("y", request.y)?;

        let moved = self
            .windows
            .move_window(parsed.pid, parsed.window_id, request.x, request.y)
            .await;
        self.record_mutation(&request.session, "moveWindow", &request.name, &moved)
            .await;
        moved
    }

    pub(crate) async fn handle_resize_window(
        &self,
        request: ResizeWindowRequest,
    ) -> Result<Window> {
        let parsed = parse_window_name(&request.name)?;
        require_dimension("width", request.width)?;
        require_dimension("height", request.height)?;

        let resized = self
            .windows
            .resize_window(parsed.pid, parsed.window_id, request.width, request.height)
            .await;
        self.record_mutation(&request.session, "resizeWindow", &request.name, &resized)
            .await;
        resized
    }

    pub(crate) async fn handle_minimize_window(
        &self,
        request: MinimizeWindowRequest,
    ) -> Result<Window> {
        let parsed = parse_window_name(&request.name)?;
        let minimized = self
            .windows
            .set_minimized(parsed.pid, parsed.window_id, true)
            .await;
        self.record_mutation(&request.session, "minimizeWindow", &request.name, &minimized)
            .await;
        minimized
    }

    pub(crate) async fn handle_restore_window(
        &self,
        request: RestoreWindowRequest,
    ) -> Result<Window> {
        let parsed = parse_window_name(&request.name)?;
        let restored = self
            .windows
            .set_minimized(parsed.pid, parsed.window_id, false)
            .await;
        self.record_mutation(&request.session, "restoreWindow", &request.name, &restored)
            .await;
        restored
    }

    pub(crate) async fn handle_close_window(&self, request: CloseWindowRequest) -> Result<()> {
        let parsed = parse_window_name(&request.name)?;
        let closed = self.windows.close_window(parsed.pid, parsed.window_id).await;
        match &closed {
            Ok(()) => {
                self.record_session_op(&request.session, "closeWindow", &request.name, true, "")
                    .await;
            }
            Err(err) => {
                self.record_session_op(
                    &request.session,
                    "closeWindow",
                    &request.name,
                    false,
                    &err.to_string(),
                )
                .await;
            }
        }
        closed
    }

    async fn record_mutation(
        &self,
        session: &str,
        operation_type: &str,
        resource: &str,
        outcome: &Result<Window>,
    ) {
        match outcome {
            Ok(window) => {
                // The response may carry a regenerated id; record that one.
                self.record_session_op(session, operation_type, &window.name, true, "")
                    .await;
            }
            Err(err) => {
                self.record_session_op(session, operation_type, resource, false, &err.to_string())
                    .await;
            }
        }
    }
}
