//! `google.longrunning.Operations` service over the operation store.

use std::sync::Arc;
use std::time::Duration;

use tonic::Request;
use tonic::Response;
use tonic::Status;

use macos_use_core::operation_store::OperationStore;
use macos_use_core::resource_name::parse_operation_name;

use macos_use_proto::google::longrunning::CancelOperationRequest;
use macos_use_proto::google::longrunning::DeleteOperationRequest;
use macos_use_proto::google::longrunning::GetOperationRequest;
use macos_use_proto::google::longrunning::ListOperationsRequest;
use macos_use_proto::google::longrunning::ListOperationsResponse;
use macos_use_proto::google::longrunning::Operation;
use macos_use_proto::google::longrunning::WaitOperationRequest;
use macos_use_proto::google::longrunning::operations_server::Operations;

pub struct OperationsService {
    store: Arc<OperationStore>,
}

impl OperationsService {
    pub fn new(store: Arc<OperationStore>) -> Self {
        Self { store }
    }
}

#[tonic::async_trait]
impl Operations for OperationsService {
    /// `name` acts as a prefix filter; `filter` currently understands only
    /// `done=true`.
    async fn list_operations(
        &self,
        request: Request<ListOperationsRequest>,
    ) -> Result<Response<ListOperationsResponse>, Status> {
        let request = request.into_inner();
        let only_done = matches!(request.filter.as_str(), "done" | "done=true");
        let (operations, next_page_token) = self
            .store
            .list(
                &request.name,
                only_done,
                request.page_size,
                &request.page_token,
            )
            .await?;
        Ok(Response::new(ListOperationsResponse {
            operations,
            next_page_token,
        }))
    }

    async fn get_operation(
        &self,
        request: Request<GetOperationRequest>,
    ) -> Result<Response<Operation>, Status> {
        let request = request.into_inner();
        parse_operation_name(&request.name)?;
        Ok(Response::new(self.store.get(&request.name).await?))
    }

    async fn delete_operation(
        &self,
        request: Request<DeleteOperationRequest>,
    ) -> Result<Response<()>, Status> {
        let request = request.into_inner();
        parse_operation_name(&request.name)?;
        self.store.delete(&request.name).await?;
        Ok(Response::new(()))
    }

    async fn cancel_operation(
        &self,
        request: Request<CancelOperationRequest>,
    ) -> Result<Response<()>, Status> {
        let request = request.into_inner();
        parse_operation_name(&request.name)?;
        self.store.cancel(&request.name).await?;
        Ok(Response::new(()))
    }

    /// Polls until done or the requested timeout, returning the current
    /// snapshot either way.
    async fn wait_operation(
        &self,
        request: Request<WaitOperationRequest>,
    ) -> Result<Response<Operation>, Status> {
        let request = request.into_inner();
        parse_operation_name(&request.name)?;
        let timeout = request.timeout.and_then(|timeout| {
            let seconds = timeout.seconds.max(0) as u64;
            let nanos = timeout.nanos.max(0) as u32;
            let duration = Duration::new(seconds, nanos);
            (!duration.is_zero()).then_some(duration)
        });
        Ok(Response::new(self.store.wait(&request.name, timeout).await?))
    }
}
