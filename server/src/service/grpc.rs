//! `macosusesdk.v1.Automation` trait implementation: one delegation per
//! RPC onto the handler modules. Errors convert to `tonic::Status` (with
//! the `ErrorInfo` detail trailer) at this boundary and nowhere else.

use tonic::Request;
use tonic::Response;
use tonic::Status;

use macos_use_proto::google::longrunning::Operation;
use macos_use_proto::macosusesdk::v1::automation_server::Automation;
use macos_use_proto::macosusesdk::v1::*;

use super::AutomationService;
use super::observations::ObservationEventStream;

type RpcResult<T> = std::result::Result<Response<T>, Status>;

#[tonic::async_trait]
impl Automation for AutomationService {
    async fn open_application(
        &self,
        request: Request<OpenApplicationRequest>,
    ) -> RpcResult<Operation> {
        Ok(Response::new(
            self.handle_open_application(request.into_inner()).await?,
        ))
    }

    async fn get_application(
        &self,
        request: Request<GetApplicationRequest>,
    ) -> RpcResult<Application> {
        Ok(Response::new(
            self.handle_get_application(request.into_inner()).await?,
        ))
    }

    async fn list_applications(
        &self,
        request: Request<ListApplicationsRequest>,
    ) -> RpcResult<ListApplicationsResponse> {
        Ok(Response::new(
            self.handle_list_applications(request.into_inner()).await?,
        ))
    }

    async fn delete_application(
        &self,
        request: Request<DeleteApplicationRequest>,
    ) -> RpcResult<()> {
        self.handle_delete_application(request.into_inner()).await?;
        Ok(Response::new(()))
    }

    async fn activate_application(
        &self,
        request: Request<ActivateApplicationRequest>,
    ) -> RpcResult<Application> {
        Ok(Response::new(
            self.handle_activate_application(request.into_inner())
                .await?,
        ))
    }

    async fn list_windows(
        &self,
        request: Request<ListWindowsRequest>,
    ) -> RpcResult<ListWindowsResponse> {
        Ok(Response::new(
            self.handle_list_windows(request.into_inner()).await?,
        ))
    }

    async fn get_window(&self, request: Request<GetWindowRequest>) -> RpcResult<Window> {
        Ok(Response::new(
            self.handle_get_window(request.into_inner()).await?,
        ))
    }

    async fn get_window_state(
        &self,
        request: Request<GetWindowStateRequest>,
    ) -> RpcResult<WindowState> {
        Ok(Response::new(
            self.handle_get_window_state(request.into_inner()).await?,
        ))
    }

    async fn move_window(&self, request: Request<MoveWindowRequest>) -> RpcResult<Window> {
        Ok(Response::new(
            self.handle_move_window(request.into_inner()).await?,
        ))
    }

    async fn resize_window(&self, request: Request<ResizeWindowRequest>) -> RpcResult<Window> {
        Ok(Response::new(
            self.handle_resize_window(request.into_inner()).await?,
        ))
    }

    async fn minimize_window(
        &self,
        request: Request<MinimizeWindowRequest>,
    ) -> RpcResult<Window> {
        Ok(Response::new(
            self.handle_minimize_window(request.into_inner()).await?,
        ))
    }

    async fn restore_window(&self, request: Request<RestoreWindowRequest>) -> RpcResult<Window> {
        Ok(Response::new(
            self.handle_restore_window(request.into_inner()).await?,
        ))
    }

    async fn close_window(&self, request: Request<CloseWindowRequest>) -> RpcResult<()> {
        self.handle_close_window(request.into_inner()).await?;
        Ok(Response::new(()))
    }

    async fn list_displays(
        &self,
        request: Request<ListDisplaysRequest>,
    ) -> RpcResult<ListDisplaysResponse> {
        Ok(Response::new(
            self.handle_list_displays(request.into_inner()).await?,
        ))
    }

    async fn get_display(&self, request: Request<GetDisplayRequest>) -> RpcResult<Display> {
        Ok(Response::new(
            self.handle_get_display(request.into_inner()).await?,
        ))
    }

    async fn find_elements(
        &self,
        request: Request<FindElementsRequest>,
    ) -> RpcResult<FindElementsResponse> {
        Ok(Response::new(
            self.handle_find_elements(request.into_inner()).await?,
        ))
    }

    async fn get_element(&self, request: Request<GetElementRequest>) -> RpcResult<Element> {
        Ok(Response::new(
            self.handle_get_element(request.into_inner()).await?,
        ))
    }

    async fn perform_input(&self, request: Request<PerformInputRequest>) -> RpcResult<Input> {
        Ok(Response::new(
            self.handle_perform_input(request.into_inner()).await?,
        ))
    }

    async fn get_input(&self, request: Request<GetInputRequest>) -> RpcResult<Input> {
        Ok(Response::new(
            self.handle_get_input(request.into_inner()).await?,
        ))
    }

    async fn list_inputs(
        &self,
        request: Request<ListInputsRequest>,
    ) -> RpcResult<ListInputsResponse> {
        Ok(Response::new(
            self.handle_list_inputs(request.into_inner()).await?,
        ))
    }

    async fn create_observation(
        &self,
        request: Request<CreateObservationRequest>,
    ) -> RpcResult<Operation> {
        Ok(Response::new(
            self.handle_create_observation(request.into_inner())
                .await?,
        ))
    }

    async fn get_observation(
        &self,
        request: Request<GetObservationRequest>,
    ) -> RpcResult<Observation> {
        Ok(Response::new(
            self.handle_get_observation(request.into_inner()).await?,
        ))
    }

    async fn list_observations(
        &self,
        request: Request<ListObservationsRequest>,
    ) -> RpcResult<ListObservationsResponse> {
        Ok(Response::new(
            self.handle_list_observations(request.into_inner()).await?,
        ))
    }

    async fn cancel_observation(
        &self,
        request: Request<CancelObservationRequest>,
    ) -> RpcResult<Observation> {
        Ok(Response::new(
            self.handle_cancel_observation(request.into_inner())
                .await?,
        ))
    }

    type StreamObservationsStream = ObservationEventStream;

    async fn stream_observations(
        &self,
        request: Request<StreamObservationsRequest>,
    ) -> RpcResult<Self::StreamObservationsStream> {
        Ok(Response::new(
            self.handle_stream_observations(request.into_inner())
                .await?,
        ))
    }

    async fn create_session(&self, request: Request<CreateSessionRequest>) -> RpcResult<Session> {
        Ok(Response::new(
            self.handle_create_session(request.into_inner()).await?,
        ))
    }

    async fn get_session(&self, request: Request<GetSessionRequest>) -> RpcResult<Session> {
        Ok(Response::new(
            self.handle_get_session(request.into_inner()).await?,
        ))
    }

    async fn list_sessions(
        &self,
        request: Request<ListSessionsRequest>,
    ) -> RpcResult<ListSessionsResponse> {
        Ok(Response::new(
            self.handle_list_sessions(request.into_inner()).await?,
        ))
    }

    async fn delete_session(&self, request: Request<DeleteSessionRequest>) -> RpcResult<()> {
        self.handle_delete_session(request.into_inner()).await?;
        Ok(Response::new(()))
    }

    async fn begin_transaction(
        &self,
        request: Request<BeginTransactionRequest>,
    ) -> RpcResult<Transaction> {
        Ok(Response::new(
            self.handle_begin_transaction(request.into_inner()).await?,
        ))
    }

    async fn commit_transaction(
        &self,
        request: Request<CommitTransactionRequest>,
    ) -> RpcResult<Transaction> {
        Ok(Response::new(
            self.handle_commit_transaction(request.into_inner())
                .await?,
        ))
    }

    async fn rollback_transaction(
        &self,
        request: Request<RollbackTransactionRequest>,
    ) -> RpcResult<Transaction> {
        Ok(Response::new(
            self.handle_rollback_transaction(request.into_inner())
                .await?,
        ))
    }

    async fn record_operation(
        &self,
        request: Request<RecordOperationRequest>,
    ) -> RpcResult<OperationRecord> {
        Ok(Response::new(
            self.handle_record_operation(request.into_inner()).await?,
        ))
    }

    async fn get_session_snapshot(
        &self,
        request: Request<GetSessionSnapshotRequest>,
    ) -> RpcResult<SessionSnapshot> {
        Ok(Response::new(
            self.handle_get_session_snapshot(request.into_inner())
                .await?,
        ))
    }

    async fn create_macro(&self, request: Request<CreateMacroRequest>) -> RpcResult<Macro> {
        Ok(Response::new(
            self.handle_create_macro(request.into_inner()).await?,
        ))
    }

    async fn get_macro(&self, request: Request<GetMacroRequest>) -> RpcResult<Macro> {
        Ok(Response::new(
            self.handle_get_macro(request.into_inner()).await?,
        ))
    }

    async fn list_macros(
        &self,
        request: Request<ListMacrosRequest>,
    ) -> RpcResult<ListMacrosResponse> {
        Ok(Response::new(
            self.handle_list_macros(request.into_inner()).await?,
        ))
    }

    async fn update_macro(&self, request: Request<UpdateMacroRequest>) -> RpcResult<Macro> {
        Ok(Response::new(
            self.handle_update_macro(request.into_inner()).await?,
        ))
    }

    async fn delete_macro(&self, request: Request<DeleteMacroRequest>) -> RpcResult<()> {
        self.handle_delete_macro(request.into_inner()).await?;
        Ok(Response::new(()))
    }

    async fn execute_macro(
        &self,
        request: Request<ExecuteMacroRequest>,
    ) -> RpcResult<Operation> {
        Ok(Response::new(
            self.handle_execute_macro(request.into_inner()).await?,
        ))
    }

    async fn get_clipboard(&self, request: Request<GetClipboardRequest>) -> RpcResult<Clipboard> {
        Ok(Response::new(
            self.handle_get_clipboard(request.into_inner()).await?,
        ))
    }

    async fn write_clipboard(
        &self,
        request: Request<WriteClipboardRequest>,
    ) -> RpcResult<Clipboard> {
        Ok(Response::new(
            self.handle_write_clipboard(request.into_inner()).await?,
        ))
    }

    async fn clear_clipboard(&self, request: Request<ClearClipboardRequest>) -> RpcResult<()> {
        self.handle_clear_clipboard(request.into_inner()).await?;
        Ok(Response::new(()))
    }

    async fn get_clipboard_history(
        &self,
        request: Request<GetClipboardHistoryRequest>,
    ) -> RpcResult<ClipboardHistory> {
        Ok(Response::new(
            self.handle_get_clipboard_history(request.into_inner())
                .await?,
        ))
    }

    async fn take_screenshot(
        &self,
        request: Request<TakeScreenshotRequest>,
    ) -> RpcResult<Screenshot> {
        Ok(Response::new(
            self.handle_take_screenshot(request.into_inner()).await?,
        ))
    }

    async fn execute_script(
        &self,
        request: Request<ExecuteScriptRequest>,
    ) -> RpcResult<ScriptResult> {
        Ok(Response::new(
            self.handle_execute_script(request.into_inner()).await?,
        ))
    }

    async fn validate_script(
        &self,
        request: Request<ValidateScriptRequest>,
    ) -> RpcResult<ValidateScriptResponse> {
        Ok(Response::new(
            self.handle_validate_script(request.into_inner()).await?,
        ))
    }

    async fn open_file_dialog(
        &self,
        request: Request<OpenFileDialogRequest>,
    ) -> RpcResult<OpenFileDialogResponse> {
        Ok(Response::new(
            self.handle_open_file_dialog(request.into_inner()).await?,
        ))
    }

    async fn save_file_dialog(
        &self,
        request: Request<SaveFileDialogRequest>,
    ) -> RpcResult<SaveFileDialogResponse> {
        Ok(Response::new(
            self.handle_save_file_dialog(request.into_inner()).await?,
        ))
    }

    async fn select_file(
        &self,
        request: Request<SelectFileRequest>,
    ) -> RpcResult<SelectionResponse> {
        Ok(Response::new(
            self.handle_select_file(request.into_inner()).await?,
        ))
    }

    async fn select_directory(
        &self,
        request: Request<SelectDirectoryRequest>,
    ) -> RpcResult<SelectionResponse> {
        Ok(Response::new(
            self.handle_select_directory(request.into_inner()).await?,
        ))
    }

    async fn drag_files(&self, request: Request<DragFilesRequest>) -> RpcResult<()> {
        self.handle_drag_files(request.into_inner()).await?;
        Ok(Response::new(()))
    }
}
