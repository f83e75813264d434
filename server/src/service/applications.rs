//! Application resource handlers. Opening is a long-running operation:
//! the handler registers `operations/open/{uuid}`, forks the launch, and
//! the task lands on finish or fail.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use macos_use_core::error::Result;
use macos_use_core::field_mask::apply_application_read_mask;
use macos_use_core::page_token::effective_page_size;
use macos_use_core::page_token::paginate;
use macos_use_core::resource_name::application_name;
use macos_use_core::resource_name::operation_name;
use macos_use_core::resource_name::parse_application_name;
use macos_use_core::validation::require_string;

use macos_use_proto::google::longrunning::Operation;
use macos_use_proto::macosusesdk::v1::ActivateApplicationRequest;
use macos_use_proto::macosusesdk::v1::Application;
use macos_use_proto::macosusesdk::v1::DeleteApplicationRequest;
use macos_use_proto::macosusesdk::v1::GetApplicationRequest;
use macos_use_proto::macosusesdk::v1::ListApplicationsRequest;
use macos_use_proto::macosusesdk::v1::ListApplicationsResponse;
use macos_use_proto::macosusesdk::v1::OpenApplicationMetadata;
use macos_use_proto::macosusesdk::v1::OpenApplicationRequest;
use macos_use_proto::macosusesdk::v1::OpenApplicationResponse;

use super::AutomationService;
use super::DEFAULT_PAGE_SIZE;
use super::pack_any;
use super::record_session;
use super::track_application;

impl AutomationService {
    pub(crate) async fn handle_open_application(
        &self,
        request: OpenApplicationRequest,
    ) -> Result<Operation> {
        require_string("id", &request.id)?;

        let name = operation_name("open", &Uuid::new_v4().to_string());
        let metadata = pack_any(
            "macosusesdk.v1.OpenApplicationMetadata",
            &OpenApplicationMetadata {
                id: request.id.clone(),
            },
        );
        let operation = self.operations.create(name.clone(), Some(metadata)).await;

        let system = Arc::clone(&self.system);
        let applications = Arc::clone(&self.applications);
        let operations = Arc::clone(&self.operations);
        let sessions = Arc::clone(&self.sessions);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let work = async {
                let launched = system.open_application(&request.id).await?;
                let application = Application {
                    name: application_name(launched.pid),
                    display_name: launched.display_name,
                    pid: launched.pid,
                    bundle_id: launched.bundle_id,
                };
                applications.add_application(application.clone()).await;
                Ok::<Application, macos_use_core::AutomationError>(application)
            };

            let outcome = tokio::select! {
                _ = shutdown.cancelled() => {
                    Err(macos_use_core::AutomationError::cancelled(
                        "server shutting down",
                    ))
                }
                outcome = work => outcome,
            };

            match outcome {
                Ok(application) => {
                    record_session(
                        &sessions,
                        &request.session,
                        "openApplication",
                        &application.name,
                        true,
                        "",
                    )
                    .await;
                    track_application(&sessions, &request.session, &application.name).await;
                    let response = pack_any(
                        "macosusesdk.v1.OpenApplicationResponse",
                        &OpenApplicationResponse {
                            application: Some(application),
                        },
                    );
                    let _ = operations.finish(&name, response).await;
                }
                Err(err) => {
                    debug!("open {} failed: {err}", request.id);
                    record_session(
                        &sessions,
                        &request.session,
                        "openApplication",
                        "",
                        false,
                        &err.to_string(),
                    )
                    .await;
                    let _ = operations.fail(&name, err.to_rpc_status()).await;
                }
            }
        });

        Ok(operation)
    }

    pub(crate) async fn handle_get_application(
        &self,
        request: GetApplicationRequest,
    ) -> Result<Application> {
        let parsed = parse_application_name(&request.name)?;
        let mut application = self.applications.get_application(parsed.pid).await?;
        apply_application_read_mask(&mut application, request.read_mask.as_ref());
        Ok(application)
    }

    pub(crate) async fn handle_list_applications(
        &self,
        request: ListApplicationsRequest,
    ) -> Result<ListApplicationsResponse> {
        let all = self.applications.list_applications().await;
        let page_size = effective_page_size(request.page_size, DEFAULT_PAGE_SIZE);
        let (mut page, next_page_token) = paginate(&all, page_size, &request.page_token)?;
        for application in &mut page {
            apply_application_read_mask(application, request.read_mask.as_ref());
        }
        Ok(ListApplicationsResponse {
            applications: page,
            next_page_token,
        })
    }

    /// Terminates the host process, then forgets the application and every
    /// input recorded beneath it.
    pub(crate) async fn handle_delete_application(
        &self,
        request: DeleteApplicationRequest,
    ) -> Result<()> {
        let parsed = parse_application_name(&request.name)?;
        // Verify it is tracked before touching the host.
        self.applications.get_application(parsed.pid).await?;

        if let Err(err) = self.system.terminate_application(parsed.pid).await {
            let err: macos_use_core::AutomationError = err.into();
            self.record_session_op(
                &request.session,
                "deleteApplication",
                &request.name,
                false,
                &err.to_string(),
            )
            .await;
            return Err(err);
        }

        self.applications.remove_application(parsed.pid).await?;
        self.applications
            .remove_inputs_under(&format!("{}/", request.name))
            .await;
        self.elements.clear_pid(parsed.pid).await;
        self.record_session_op(&request.session, "deleteApplication", &request.name, true, "")
            .await;
        Ok(())
    }

    /// Brings the application frontmost. The activation is marked as
    /// SDK-caused first so the resulting accessibility notifications are
    /// suppressed rather than reported as user events.
    pub(crate) async fn handle_activate_application(
        &self,
        request: ActivateApplicationRequest,
    ) -> Result<Application> {
        let parsed = parse_application_name(&request.name)?;
        let application = self.applications.get_application(parsed.pid).await?;

        self.observations.mark_sdk_activation(parsed.pid).await;
        self.system.activate_application(parsed.pid).await?;

        self.record_session_op(
            &request.session,
            "activateApplication",
            &request.name,
            true,
            "",
        )
        .await;
        Ok(application)
    }
}
