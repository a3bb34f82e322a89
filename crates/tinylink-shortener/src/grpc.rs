//! gRPC transport over [`ShortenerService`].

use crate::deletion::DeletionError;
use crate::error::ShortenerError;
use crate::service::ShortenerService;
use std::sync::Arc;
use tinylink_core::{Repository, ShortId, StorageError};
use tinylink_proto_schema::v1 as proto;
use tinylink_proto_schema::v1::shortener_service_server::{
    ShortenerService as ShortenerRpc, ShortenerServiceServer,
};
use tonic::{Code, Request, Response, Status};
use tracing::debug;

/// Fully qualified gRPC service name, as reported by health checks.
pub const SERVICE_NAME: &str = "shortener.v1.ShortenerService";

impl From<ShortenerError> for Status {
    fn from(error: ShortenerError) -> Self {
        match error {
            ShortenerError::Conflict(id) => {
                Status::new(Code::AlreadyExists, format!("url already shortened as {id}"))
            }
            ShortenerError::NotFound(_) => Status::new(Code::NotFound, "short url not found"),
            ShortenerError::Gone(_) => {
                Status::new(Code::FailedPrecondition, "short url has been deleted")
            }
            ShortenerError::InvalidUrl(message) => Status::new(Code::InvalidArgument, message),
            ShortenerError::Deletion(DeletionError::ShuttingDown) => {
                Status::new(Code::Unavailable, "service is shutting down")
            }
            ShortenerError::Storage(
                source @ (StorageError::Unavailable(_) | StorageError::Timeout(_)),
            ) => Status::new(Code::Unavailable, source.to_string()),
            ShortenerError::Storage(source) => Status::new(Code::Internal, source.to_string()),
        }
    }
}

fn require_user(user_id: &str) -> Result<&str, Status> {
    if user_id.is_empty() {
        return Err(Status::new(Code::InvalidArgument, "user id is required"));
    }
    Ok(user_id)
}

pub struct ShortenerGrpcServer<R: ?Sized> {
    service: Arc<ShortenerService<R>>,
    base_url: String,
}

impl<R: Repository + ?Sized> ShortenerGrpcServer<R> {
    pub fn new(service: Arc<ShortenerService<R>>, base_url: impl Into<String>) -> Self {
        Self {
            service,
            base_url: base_url.into(),
        }
    }

    /// Wraps the server into the tonic service to mount on a router.
    pub fn into_service(self) -> ShortenerServiceServer<Self> {
        ShortenerServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl<R: Repository + ?Sized> ShortenerRpc for ShortenerGrpcServer<R> {
    async fn short(
        &self,
        request: Request<proto::ShortRequest>,
    ) -> Result<Response<proto::ShortResponse>, Status> {
        let request = request.into_inner();
        let owner = require_user(&request.user_id)?;

        let id = match self.service.shorten(owner, &request.url).await {
            Ok(id) => id,
            Err(ShortenerError::Conflict(id)) => {
                return Err(Status::new(
                    Code::AlreadyExists,
                    id.to_url(&self.base_url),
                ));
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Response::new(proto::ShortResponse {
            short_url: id.to_url(&self.base_url),
            short_id: id.into_inner(),
        }))
    }

    async fn expand(
        &self,
        request: Request<proto::ExpandRequest>,
    ) -> Result<Response<proto::ExpandResponse>, Status> {
        let id = ShortId::new(request.into_inner().short_id);
        let original_url = self.service.expand(&id).await?;
        Ok(Response::new(proto::ExpandResponse { original_url }))
    }

    async fn delete(
        &self,
        request: Request<proto::DeleteRequest>,
    ) -> Result<Response<proto::DeleteResponse>, Status> {
        let request = request.into_inner();
        let owner = require_user(&request.user_id)?;
        let ids = request.short_ids.into_iter().map(ShortId::new).collect();

        let ticket = self.service.delete_urls(owner, ids)?;
        debug!(request_id = %ticket.request_id(), "grpc deletion accepted");

        Ok(Response::new(proto::DeleteResponse {
            request_id: ticket.request_id().to_string(),
        }))
    }

    async fn get_user_bucket(
        &self,
        request: Request<proto::GetUserBucketRequest>,
    ) -> Result<Response<proto::GetUserBucketResponse>, Status> {
        let request = request.into_inner();
        let owner = require_user(&request.user_id)?;

        let urls = self
            .service
            .user_urls(owner)
            .await?
            .into_iter()
            .map(|record| proto::UrlPair {
                short_url: record.id.to_url(&self.base_url),
                original_url: record.original_url,
            })
            .collect();

        Ok(Response::new(proto::GetUserBucketResponse { urls }))
    }

    async fn short_batch(
        &self,
        request: Request<proto::ShortBatchRequest>,
    ) -> Result<Response<proto::ShortBatchResponse>, Status> {
        let request = request.into_inner();
        let owner = require_user(&request.user_id)?;
        let items = request
            .urls
            .into_iter()
            .map(|item| (item.correlation_id, item.original_url))
            .collect();

        let urls = self
            .service
            .shorten_batch(owner, items)
            .await?
            .into_iter()
            .map(|(correlation_id, id)| proto::CorrelatedShortUrl {
                correlation_id,
                short_url: id.to_url(&self.base_url),
            })
            .collect();

        Ok(Response::new(proto::ShortBatchResponse { urls }))
    }

    async fn stats(
        &self,
        _request: Request<proto::StatsRequest>,
    ) -> Result<Response<proto::StatsResponse>, Status> {
        let stats = self.service.stats().await?;
        Ok(Response::new(proto::StatsResponse {
            urls: stats.urls,
            users: stats.users,
        }))
    }
}
