use orderline_core::{ImportResult, NewOrderJob, OrderTracking};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every HTTP response body: `success` plus either `data` or an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            detail: None,
        }
    }

    pub fn err(error: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            detail,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueOrderResponse {
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkEnqueueRequest {
    pub orders: Vec<NewOrderJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkEnqueueResponse {
    pub job_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResponse {
    pub rows: usize,
    pub result: ImportResult,
}

/// Inbound chat message relayed by the messaging webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageRequest {
    pub from: String,
    pub text: String,
    #[serde(default)]
    pub order: Option<NewOrderJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageResponse {
    pub agent: String,
    pub customer_phone: Option<String>,
    pub job_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTrackingRequest {
    pub status: String,
    #[serde(default)]
    pub courier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderStatusRequest {
    /// Either vocabulary is accepted; see [`orderline_core::OrderStatus`].
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingListResponse {
    pub order_id: Uuid,
    pub items: Vec<OrderTracking>,
}
