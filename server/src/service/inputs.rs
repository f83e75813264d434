//! Input handlers. Every synthesis is recorded as an input resource whose
//! state progresses pending → executing → completed | failed.

use uuid::Uuid;

use macos_use_core::error::AutomationError;
use macos_use_core::error::Result;
use macos_use_core::input::perform_action;
use macos_use_core::input::validate_action;
use macos_use_core::page_token::effective_page_size;
use macos_use_core::page_token::paginate;
use macos_use_core::resource_name::ApplicationScope;
use macos_use_core::resource_name::input_name;
use macos_use_core::resource_name::parse_application_scope;
use macos_use_core::resource_name::parse_input_name;
use macos_use_core::util::now_timestamp;

use macos_use_proto::macosusesdk::v1::GetInputRequest;
use macos_use_proto::macosusesdk::v1::Input;
use macos_use_proto::macosusesdk::v1::InputState;
use macos_use_proto::macosusesdk::v1::ListInputsRequest;
use macos_use_proto::macosusesdk::v1::ListInputsResponse;
use macos_use_proto::macosusesdk::v1::PerformInputRequest;

use super::AutomationService;
use super::DEFAULT_PAGE_SIZE;

impl AutomationService {
    pub(crate) async fn handle_perform_input(
        &self,
        request: PerformInputRequest,
    ) -> Result<Input> {
        let scope = parse_application_scope(&request.parent)?;
        let action = request
            .action
            .ok_or_else(|| AutomationError::required_field("action"))?;
        validate_action(&action)?;

        let id = format!("in_{}", Uuid::new_v4().simple());
        let mut input = Input {
            name: input_name(scope, &id),
            action: Some(action.clone()),
            state: InputState::Pending as i32,
            create_time: Some(now_timestamp()),
            complete_time: None,
            error: String::new(),
        };
        self.applications.put_input(input.clone()).await;

        input.state = InputState::Executing as i32;
        self.applications.put_input(input.clone()).await;

        match perform_action(&self.system, &action).await {
            Ok(()) => {
                input.state = InputState::Completed as i32;
                input.complete_time = Some(now_timestamp());
                self.applications.put_input(input.clone()).await;
                self.record_session_op(&request.session, "performInput", &input.name, true, "")
                    .await;
                Ok(input)
            }
            Err(err) => {
                input.state = InputState::Failed as i32;
                input.complete_time = Some(now_timestamp());
                input.error = err.to_string();
                self.applications.put_input(input.clone()).await;
                self.record_session_op(
                    &request.session,
                    "performInput",
                    &input.name,
                    false,
                    &input.error,
                )
                .await;
                Err(err)
            }
        }
    }

    pub(crate) async fn handle_get_input(&self, request: GetInputRequest) -> Result<Input> {
        parse_input_name(&request.name)?;
        self.applications.get_input(&request.name).await
    }

    pub(crate) async fn handle_list_inputs(
        &self,
        request: ListInputsRequest,
    ) -> Result<ListInputsResponse> {
        let prefix = match parse_application_scope(&request.parent)? {
            ApplicationScope::All if request.parent.is_empty() => String::new(),
            ApplicationScope::All => "desktopInputs/".to_string(),
            ApplicationScope::Pid(pid) => format!("applications/{pid}/inputs/"),
        };
        let all = self.applications.list_inputs(&prefix).await;
        let page_size = effective_page_size(request.page_size, DEFAULT_PAGE_SIZE);
        let (inputs, next_page_token) = paginate(&all, page_size, &request.page_token)?;
        Ok(ListInputsResponse {
            inputs,
            next_page_token,
        })
    }
}
