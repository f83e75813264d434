//! Macro handlers. Execution is a long-running operation running on the
//! serialized executor; the completed operation carries the action count
//! and final variable bindings.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use macos_use_core::error::Result;
use macos_use_core::page_token::effective_page_size;
use macos_use_core::page_token::paginate;
use macos_use_core::resource_name::operation_name;
use macos_use_core::resource_name::parse_application_scope;
use macos_use_core::resource_name::parse_macro_name;
use macos_use_core::validation::require_string;

use macos_use_proto::google::longrunning::Operation;
use macos_use_proto::macosusesdk::v1::CreateMacroRequest;
use macos_use_proto::macosusesdk::v1::DeleteMacroRequest;
use macos_use_proto::macosusesdk::v1::ExecuteMacroMetadata;
use macos_use_proto::macosusesdk::v1::ExecuteMacroRequest;
use macos_use_proto::macosusesdk::v1::ExecuteMacroResponse;
use macos_use_proto::macosusesdk::v1::GetMacroRequest;
use macos_use_proto::macosusesdk::v1::ListMacrosRequest;
use macos_use_proto::macosusesdk::v1::ListMacrosResponse;
use macos_use_proto::macosusesdk::v1::Macro;
use macos_use_proto::macosusesdk::v1::UpdateMacroRequest;

use super::AutomationService;
use super::SMALL_PAGE_SIZE;
use super::pack_any;
use super::record_session;

const DEFAULT_EXECUTE_TIMEOUT: Duration = Duration::from_secs(300);

impl AutomationService {
    pub(crate) async fn handle_create_macro(&self, request: CreateMacroRequest) -> Result<Macro> {
        let definition = request
            .r#macro
            .ok_or_else(|| macos_use_core::AutomationError::required_field("macro"))?;
        require_string("display_name", &definition.display_name)?;
        self.macros.create(definition).await
    }

    pub(crate) async fn handle_get_macro(&self, request: GetMacroRequest) -> Result<Macro> {
        let parsed = parse_macro_name(&request.name)?;
        self.macros.get(&parsed.id).await
    }

    pub(crate) async fn handle_list_macros(
        &self,
        request: ListMacrosRequest,
    ) -> Result<ListMacrosResponse> {
        let all = self.macros.list().await;
        let page_size = effective_page_size(request.page_size, SMALL_PAGE_SIZE);
        let (macros, next_page_token) = paginate(&all, page_size, &request.page_token)?;
        Ok(ListMacrosResponse {
            macros,
            next_page_token,
        })
    }

    pub(crate) async fn handle_update_macro(&self, request: UpdateMacroRequest) -> Result<Macro> {
        let update = request
            .r#macro
            .ok_or_else(|| macos_use_core::AutomationError::required_field("macro"))?;
        let parsed = parse_macro_name(&update.name)?;
        self.macros
            .update(&parsed.id, update, request.update_mask.as_ref())
            .await
    }

    pub(crate) async fn handle_delete_macro(&self, request: DeleteMacroRequest) -> Result<()> {
        let parsed = parse_macro_name(&request.name)?;
        self.macros.delete(&parsed.id).await
    }

    pub(crate) async fn handle_execute_macro(
        &self,
        request: ExecuteMacroRequest,
    ) -> Result<Operation> {
        let parsed = parse_macro_name(&request.name)?;
        let scope = parse_application_scope(&request.parent)?;
        let definition = self.macros.get(&parsed.id).await?;
        let timeout = if request.timeout > 0.0 {
            Duration::from_secs_f64(request.timeout)
        } else {
            DEFAULT_EXECUTE_TIMEOUT
        };

        let op_name = operation_name("macro", &Uuid::new_v4().to_string());
        let metadata = pack_any(
            "macosusesdk.v1.ExecuteMacroMetadata",
            &ExecuteMacroMetadata {
                name: request.name.clone(),
            },
        );
        let operation = self.operations.create(op_name.clone(), Some(metadata)).await;

        let executor = Arc::clone(&self.macro_executor);
        let registry = Arc::clone(&self.macros);
        let operations = Arc::clone(&self.operations);
        let sessions = Arc::clone(&self.sessions);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let work = executor.execute(&definition, request.parameters, scope, timeout);
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => {
                    Err(macos_use_core::AutomationError::cancelled(
                        "server shutting down",
                    ))
                }
                outcome = work => outcome,
            };

            match outcome {
                Ok(result) => {
                    registry.increment_execution_count(&parsed.id).await;
                    record_session(
                        &sessions,
                        &request.session,
                        "executeMacro",
                        &request.name,
                        true,
                        "",
                    )
                    .await;
                    let response = pack_any(
                        "macosusesdk.v1.ExecuteMacroResponse",
                        &ExecuteMacroResponse {
                            actions_executed: result.actions_executed as i32,
                            variables: result.variables,
                        },
                    );
                    let _ = operations.finish(&op_name, response).await;
                }
                Err(err) => {
                    debug!("macro {} failed: {err}", request.name);
                    record_session(
                        &sessions,
                        &request.session,
                        "executeMacro",
                        &request.name,
                        false,
                        &err.to_string(),
                    )
                    .await;
                    let _ = operations.fail(&op_name, err.to_rpc_status()).await;
                }
            }
        });

        Ok(operation)
    }
}
