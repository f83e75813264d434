//! Session and transaction handlers.

use macos_use_core::error::Result;
use macos_use_core::page_token::effective_page_size;
use macos_use_core::resource_name::parse_application_name;
use macos_use_core::resource_name::parse_observation_name;
use macos_use_core::resource_name::parse_session_name;
use macos_use_core::validation::require_string;

use macos_use_proto::macosusesdk::v1::BeginTransactionRequest;
use macos_use_proto::macosusesdk::v1::CommitTransactionRequest;
use macos_use_proto::macosusesdk::v1::CreateSessionRequest;
use macos_use_proto::macosusesdk::v1::DeleteSessionRequest;
use macos_use_proto::macosusesdk::v1::GetSessionRequest;
use macos_use_proto::macosusesdk::v1::GetSessionSnapshotRequest;
use macos_use_proto::macosusesdk::v1::ListSessionsRequest;
use macos_use_proto::macosusesdk::v1::ListSessionsResponse;
use macos_use_proto::macosusesdk::v1::OperationRecord;
use macos_use_proto::macosusesdk::v1::RecordOperationRequest;
use macos_use_proto::macosusesdk::v1::RollbackTransactionRequest;
use macos_use_proto::macosusesdk::v1::Session;
use macos_use_proto::macosusesdk::v1::SessionSnapshot;
use macos_use_proto::macosusesdk::v1::Transaction;

use super::AutomationService;
use super::SMALL_PAGE_SIZE;

impl AutomationService {
    pub(crate) async fn handle_create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<Session> {
        let metadata = request
            .session
            .map(|session| session.metadata)
            .unwrap_or_default();
        Ok(self.sessions.create(metadata).await)
    }

    pub(crate) async fn handle_get_session(&self, request: GetSessionRequest) -> Result<Session> {
        let parsed = parse_session_name(&request.name)?;
        self.sessions.get(&parsed.id).await
    }

    /// Keyset-paged listing: the token is the last name of the previous
    /// page.
    pub(crate) async fn handle_list_sessions(
        &self,
        request: ListSessionsRequest,
    ) -> Result<ListSessionsResponse> {
        let page_size = effective_page_size(request.page_size, SMALL_PAGE_SIZE);
        let (sessions, next_page_token) = self
            .sessions
            .list_after(&request.page_token, page_size)
            .await;
        Ok(ListSessionsResponse {
            sessions,
            next_page_token,
        })
    }

    pub(crate) async fn handle_delete_session(&self, request: DeleteSessionRequest) -> Result<()> {
        let parsed = parse_session_name(&request.name)?;
        self.sessions.delete(&parsed.id).await
    }

    pub(crate) async fn handle_begin_transaction(
        &self,
        request: BeginTransactionRequest,
    ) -> Result<Transaction> {
        let parsed = parse_session_name(&request.name)?;
        self.sessions
            .begin_transaction(&parsed.id, request.isolation_level())
            .await
    }

    pub(crate) async fn handle_commit_transaction(
        &self,
        request: CommitTransactionRequest,
    ) -> Result<Transaction> {
        let parsed = parse_session_name(&request.name)?;
        require_string("transaction_id", &request.transaction_id)?;
        self.sessions
            .commit_transaction(&parsed.id, &request.transaction_id)
            .await
    }

    pub(crate) async fn handle_rollback_transaction(
        &self,
        request: RollbackTransactionRequest,
    ) -> Result<Transaction> {
        let parsed = parse_session_name(&request.name)?;
        require_string("transaction_id", &request.transaction_id)?;
        require_string("revision_id", &request.revision_id)?;
        self.sessions
            .rollback_transaction(&parsed.id, &request.transaction_id, &request.revision_id)
            .await
    }

    pub(crate) async fn handle_record_operation(
        &self,
        request: RecordOperationRequest,
    ) -> Result<OperationRecord> {
        let parsed = parse_session_name(&request.name)?;
        require_string("operation_type", &request.operation_type)?;
        self.sessions
            .record_operation(
                &parsed.id,
                &request.operation_type,
                &request.resource,
                request.success,
                &request.error,
            )
            .await
    }

    /// Session plus resolved tracked resources plus ordered history.
    /// Tracked names that no longer resolve are skipped rather than
    /// failing the snapshot.
    pub(crate) async fn handle_get_session_snapshot(
        &self,
        request: GetSessionSnapshotRequest,
    ) -> Result<SessionSnapshot> {
        let parsed = parse_session_name(&request.name)?;
        let view = self.sessions.snapshot_view(&parsed.id).await?;

        let mut applications = Vec::new();
        for name in &view.tracked_applications {
            if let Ok(parsed) = parse_application_name(name)
                && let Ok(application) = self.applications.get_application(parsed.pid).await
            {
                applications.push(application);
            }
        }

        let mut observations = Vec::new();
        for name in &view.tracked_observations {
            if parse_observation_name(name).is_ok()
                && let Ok(observation) = self.observations.get(name).await
            {
                observations.push(observation);
            }
        }

        Ok(SessionSnapshot {
            session: Some(view.session),
            applications,
            observations,
            history: view.history,
        })
    }
}
