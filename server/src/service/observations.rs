//! Observation handlers. Creation is a long-running operation: the
//! response operation completes once the native observer is attached.
//! Streaming bridges the manager's broadcast ring onto the gRPC response
//! stream, counting ring-overflow losses on the observation record.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;
use tracing::debug;
use uuid::Uuid;

use macos_use_core::error::Result;
use macos_use_core::observation::STREAM_BUFFER;
use macos_use_core::page_token::effective_page_size;
use macos_use_core::page_token::paginate;
use macos_use_core::resource_name::observation_name;
use macos_use_core::resource_name::operation_name;
use macos_use_core::resource_name::parse_application_name;
use macos_use_core::resource_name::parse_observation_name;

use macos_use_proto::google::longrunning::Operation;
use macos_use_proto::macosusesdk::v1::CancelObservationRequest;
use macos_use_proto::macosusesdk::v1::CreateObservationMetadata;
use macos_use_proto::macosusesdk::v1::CreateObservationRequest;
use macos_use_proto::macosusesdk::v1::CreateObservationResponse;
use macos_use_proto::macosusesdk::v1::GetObservationRequest;
use macos_use_proto::macosusesdk::v1::ListObservationsRequest;
use macos_use_proto::macosusesdk::v1::ListObservationsResponse;
use macos_use_proto::macosusesdk::v1::Observation;
use macos_use_proto::macosusesdk::v1::ObservationEvent;
use macos_use_proto::macosusesdk::v1::StreamObservationsRequest;

use super::AutomationService;
use super::DEFAULT_PAGE_SIZE;
use super::pack_any;

pub(crate) type ObservationEventStream =
    ReceiverStream<std::result::Result<ObservationEvent, Status>>;

impl AutomationService {
    pub(crate) async fn handle_create_observation(
        &self,
        request: CreateObservationRequest,
    ) -> Result<Operation> {
        let parent = parse_application_name(&request.parent)?;
        let observation = request.observation.unwrap_or_default();
        let observation_type = observation.observation_type();
        let filter = observation.filter;

        let op_name = operation_name("observe", &Uuid::new_v4().to_string());
        let metadata = pack_any(
            "macosusesdk.v1.CreateObservationMetadata",
            &CreateObservationMetadata {
                parent: request.parent.clone(),
                observation_type: observation_type as i32,
            },
        );
        let operation = self.operations.create(op_name.clone(), Some(metadata)).await;

        let manager = Arc::clone(&self.observations);
        let operations = Arc::clone(&self.operations);
        let shutdown = self.shutdown.clone();
        let resource_name = observation_name(parent.pid, &Uuid::new_v4().to_string());
        tokio::spawn(async move {
            let work = manager.start_observation(
                resource_name.clone(),
                parent.pid,
                observation_type,
                filter,
            );
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => {
                    Err(macos_use_core::AutomationError::cancelled(
                        "server shutting down",
                    ))
                }
                outcome = work => outcome,
            };

            match outcome {
                Ok(observation) => {
                    let response = pack_any(
                        "macosusesdk.v1.CreateObservationResponse",
                        &CreateObservationResponse {
                            observation: Some(observation),
                        },
                    );
                    let _ = operations.finish(&op_name, response).await;
                }
                Err(err) => {
                    debug!("observation attach failed: {err}");
                    let _ = operations.fail(&op_name, err.to_rpc_status()).await;
                }
            }
        });

        Ok(operation)
    }

    pub(crate) async fn handle_get_observation(
        &self,
        request: GetObservationRequest,
    ) -> Result<Observation> {
        parse_observation_name(&request.name)?;
        self.observations.get(&request.name).await
    }

    pub(crate) async fn handle_list_observations(
        &self,
        request: ListObservationsRequest,
    ) -> Result<ListObservationsResponse> {
        let parent = parse_application_name(&request.parent)?;
        let all = self
            .observations
            .list(&format!("applications/{}/observations/", parent.pid))
            .await;
        let page_size = effective_page_size(request.page_size, DEFAULT_PAGE_SIZE);
        let (observations, next_page_token) = paginate(&all, page_size, &request.page_token)?;
        Ok(ListObservationsResponse {
            observations,
            next_page_token,
        })
    }

    pub(crate) async fn handle_cancel_observation(
        &self,
        request: CancelObservationRequest,
    ) -> Result<Observation> {
        parse_observation_name(&request.name)?;
        self.observations.cancel(&request.name).await
    }

    /// Subscribes to the observation's ring and forwards events until the
    /// client goes away (the forwarder notices the closed channel and
    /// drops its subscription) or the observation completes.
    pub(crate) async fn handle_stream_observations(
        &self,
        request: StreamObservationsRequest,
    ) -> Result<ObservationEventStream> {
        parse_observation_name(&request.name)?;
        let mut subscription = self.observations.subscribe(&request.name).await?;

        let manager = Arc::clone(&self.observations);
        let observation = request.name.clone();
        let (sender, receiver) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            loop {
                match subscription.recv().await {
                    Ok(event) => {
                        if sender.send(Ok(event)).await.is_err() {
                            // Client cancelled; dropping the subscription
                            // closes this consumer only.
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(dropped)) => {
                        manager.add_dropped(&observation, dropped).await;
                        debug!("stream for {observation} lagged, dropped {dropped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(ReceiverStream::new(receiver))
    }
}
