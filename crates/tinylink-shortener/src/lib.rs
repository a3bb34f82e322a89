//! URL shortener service implementation.
//!
//! This crate provides the shortener use cases, the background deletion
//! pipeline and the gRPC transport. Core types live in `tinylink_core`.

pub mod deletion;
pub mod error;
pub mod grpc;
pub mod service;

pub use deletion::{
    DeletionError, DeletionPipeline, DeletionReport, DeletionTicket, MetricsSnapshot,
    PipelineConfig,
};
pub use error::ShortenerError;
pub use grpc::ShortenerGrpcServer;
pub use service::ShortenerService;
