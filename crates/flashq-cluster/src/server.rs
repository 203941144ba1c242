use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::error::ClusterError;
use crate::proto::{
    cluster_server::Cluster, DescribeClusterRequest, DescribeClusterResponse, HeartbeatRequest,
    HeartbeatResponse, ReportPartitionStatusRequest, ReportPartitionStatusResponse,
};
use crate::traits::ClusterService;

/// Server adapter that implements the Cluster service.
///
/// This adapter converts tonic requests into ClusterService trait calls,
/// providing the bridge between the network layer and business logic.
#[derive(Debug)]
pub struct ClusterServer<T: ClusterService> {
    cluster_service: Arc<T>,
}

impl<T: ClusterService> ClusterServer<T> {
    /// Create a new cluster server with the given cluster service implementation.
    pub fn new(cluster_service: Arc<T>) -> Self {
        Self { cluster_service }
    }

    /// Get a reference to the underlying cluster service.
    pub fn cluster_service(&self) -> &T {
        &self.cluster_service
    }
}

#[tonic::async_trait]
impl<T: ClusterService + 'static> Cluster for ClusterServer<T> {
    async fn describe_cluster(
        &self,
        _request: Request<DescribeClusterRequest>,
    ) -> Result<Response<DescribeClusterResponse>, Status> {
        let response = self
            .cluster_service
            .describe_cluster()
            .await
            .map_err(cluster_error_to_status)?;

        Ok(Response::new(response))
    }

    type HeartbeatStream = ReceiverStream<Result<HeartbeatResponse, Status>>;

    async fn heartbeat(
        &self,
        request: Request<Streaming<HeartbeatRequest>>,
    ) -> Result<Response<Self::HeartbeatStream>, Status> {
        let mut stream = request.into_inner();
        let cluster_service = Arc::clone(&self.cluster_service);

        let (tx, rx) = tokio::sync::mpsc::channel(128);

        tokio::spawn(async move {
            while let Some(result) = stream.message().await.transpose() {
                match result {
                    Ok(heartbeat_request) => {
                        match cluster_service.handle_heartbeat(heartbeat_request).await {
                            Ok(response) => {
                                if tx.send(Ok(response)).await.is_err() {
                                    // Client disconnected
                                    break;
                                }
                            }
                            Err(err) => {
                                let status = cluster_error_to_status(err);
                                if tx.send(Err(status)).await.is_err() {
                                    // Client disconnected
                                    break;
                                }
                            }
                        }
                    }
                    Err(status) => {
                        if tx.send(Err(status)).await.is_err() {
                            // Client disconnected
                            break;
                        }
                    }
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn report_partition_status(
        &self,
        request: Request<ReportPartitionStatusRequest>,
    ) -> Result<Response<ReportPartitionStatusResponse>, Status> {
        let response = self
            .cluster_service
            .report_partition_status(request.into_inner())
            .await
            .map_err(cluster_error_to_status)?;

        Ok(Response::new(response))
    }
}

/// Convert a ClusterError to a tonic Status for gRPC responses.
fn cluster_error_to_status(error: ClusterError) -> Status {
    match error {
        ClusterError::TopicNotFound { .. } => Status::not_found(error.to_string()),
        ClusterError::PartitionNotFound { .. } => Status::not_found(error.to_string()),
        ClusterError::BrokerNotFound { .. } => Status::not_found(error.to_string()),
        ClusterError::InvalidEpoch { .. } => Status::invalid_argument(error.to_string()),
        ClusterError::InvalidReplica { .. } => Status::invalid_argument(error.to_string()),
        ClusterError::InvalidManifest { .. } => Status::invalid_argument(error.to_string()),
        ClusterError::ManifestIo { .. } => Status::internal(error.to_string()),
        ClusterError::Transport { .. } => Status::internal(error.to_string()),
        ClusterError::UnknownBroker { .. } => Status::not_found(error.to_string()),
        ClusterError::StaleControllerEpoch { .. } => Status::failed_precondition(error.to_string()),
        ClusterError::NotController { .. } => Status::failed_precondition(error.to_string()),
        ClusterError::InvalidUpdateVersion { .. } => Status::invalid_argument(error.to_string()),
        ClusterError::IneligibleReplica { .. } => Status::invalid_argument(error.to_string()),
        ClusterError::IllegalStateTransition { .. } => Status::internal(error.to_string()),
    }
}
