pub mod config;
pub mod contracts;
pub mod db;
pub mod import_service;
pub mod job_queue;
pub mod pg_store;
pub mod redis_bus;
pub mod sheets;

pub use config::{QueueConfig, ServiceConfig, SheetsConfig};
pub use contracts::{
    ApiResponse, BulkEnqueueRequest, BulkEnqueueResponse, ChatMessageRequest, ChatMessageResponse,
    EnqueueOrderResponse, ImportResponse, TrackingListResponse, UpdateOrderStatusRequest,
    UpdateTrackingRequest,
};
pub use db::connect_database;
pub use import_service::{ImportServiceClient, ImportServiceError};
pub use job_queue::RedisJobQueue;
pub use pg_store::PgOrderStore;
pub use redis_bus::RedisBus;
pub use sheets::{SheetsClient, SheetsError};
