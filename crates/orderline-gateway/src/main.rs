use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result as AnyResult};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use orderline_core::{
    AgentDirectory, JOB_NEW_ORDER, Job, JobQueue, NewOrderJob, OrderError, OrderStatus, OrderStore,
    PhoneResolver, TOPIC_TRACKING_UPDATED, TrackingStore, TrackingUpdatedEvent,
};
use orderline_pipeline::{CsvImportPipeline, PipelineError};
use orderline_platform::{
    ApiResponse, BulkEnqueueRequest, BulkEnqueueResponse, ChatMessageRequest, ChatMessageResponse,
    EnqueueOrderResponse, ImportResponse, ImportServiceClient, PgOrderStore, RedisBus,
    RedisJobQueue, ServiceConfig, TrackingListResponse, UpdateOrderStatusRequest,
    UpdateTrackingRequest, connect_database,
};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

const CHAT_SOURCE: &str = "chat";

#[derive(Clone)]
struct AppState {
    store: Arc<PgOrderStore>,
    queue: Arc<RedisJobQueue>,
    bus: RedisBus,
    agents: Arc<AgentDirectory>,
    resolver: PhoneResolver,
    importer: Arc<CsvImportPipeline<PgOrderStore, ImportServiceClient>>,
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Upstream(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "invalid request",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not found",
            ApiError::Upstream(_) => "upstream service failed",
            ApiError::Internal(_) => "internal error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let label = self.label();
        let detail = match self {
            ApiError::BadRequest(detail)
            | ApiError::Forbidden(detail)
            | ApiError::NotFound(detail)
            | ApiError::Upstream(detail)
            | ApiError::Internal(detail) => detail,
        };
        if status.is_server_error() {
            error!("{label}: {detail}");
        }
        (status, Json(ApiResponse::<()>::err(label, Some(detail)))).into_response()
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Validation(_) | OrderError::UnknownProduct(_) => {
                ApiError::BadRequest(err.to_string())
            }
            OrderError::NotFound { .. } => ApiError::NotFound(err.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Order(err) => err.into(),
            PipelineError::MissingFile(_) | PipelineError::Payload(_) => {
                ApiError::BadRequest(err.to_string())
            }
            PipelineError::Store(_)
            | PipelineError::Mirror(_)
            | PipelineError::Both { .. }
            | PipelineError::Import(_) => ApiError::Upstream(err.to_string()),
        }
    }
}

/// Keeps malformed bodies inside the JSON envelope instead of axum's plain
/// text rejection.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

fn upstream(err: anyhow::Error) -> ApiError {
    ApiError::Upstream(format!("{err:#}"))
}

fn internal_error<E: std::fmt::Display>(err: E) -> ApiError {
    ApiError::Internal(err.to_string())
}

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn respond<T: Serialize>(status: StatusCode, data: T) -> ApiResult<T> {
    Ok((status, Json(ApiResponse::ok(data))))
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "orderline_gateway=info,orderline_pipeline=info,orderline_platform=info".to_string()
        }))
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let pool = connect_database(&config.database_url).await?;
    let bus = RedisBus::connect(&config.redis_url)?;

    let resolver = PhoneResolver::default();
    let agents = AgentDirectory::new(config.agents.clone(), resolver.clone());
    if agents.is_empty() {
        warn!("no agents configured; chat webhook will reject every sender");
    }

    let import_url = config
        .import_service_url
        .as_deref()
        .context("IMPORT_SERVICE_URL is required")?;
    let store = Arc::new(PgOrderStore::new(pool));
    let importer = CsvImportPipeline::new(store.clone(), Arc::new(ImportServiceClient::new(import_url)?))
        .with_resolver(resolver.clone());

    let state = AppState {
        store,
        queue: Arc::new(RedisJobQueue::new(bus.client().clone(), &config.queue)),
        bus,
        agents: Arc::new(agents),
        resolver,
        importer: Arc::new(importer),
    };

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/orders", post(enqueue_order))
        .route("/orders/bulk", post(enqueue_orders))
        .route("/orders/{order_id}/status", put(update_order_status))
        .route(
            "/orders/{order_id}/tracking",
            get(list_tracking).post(update_tracking),
        )
        .route("/imports", post(import_csv))
        .route("/webhooks/messages", post(chat_message))
        .with_state(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn enqueue_order(
    State(state): State<AppState>,
    payload: Result<Json<NewOrderJob>, JsonRejection>,
) -> ApiResult<EnqueueOrderResponse> {
    let Json(payload) = payload?;
    let job_id = enqueue(&state, &payload).await?;
    respond(StatusCode::ACCEPTED, EnqueueOrderResponse { job_id })
}

async fn enqueue_orders(
    State(state): State<AppState>,
    payload: Result<Json<BulkEnqueueRequest>, JsonRejection>,
) -> ApiResult<BulkEnqueueResponse> {
    let Json(payload) = payload?;
    if payload.orders.is_empty() {
        return Err(ApiError::BadRequest("orders must not be empty".to_string()));
    }

    let jobs = payload
        .orders
        .iter()
        .map(|order| Job::new(JOB_NEW_ORDER, order))
        .collect::<AnyResult<Vec<_>>>()
        .map_err(internal_error)?;
    state.queue.enqueue_bulk(&jobs).await.map_err(upstream)?;

    info!("enqueued {} orders", jobs.len());
    respond(
        StatusCode::ACCEPTED,
        BulkEnqueueResponse {
            job_ids: jobs.iter().map(|job| job.id).collect(),
        },
    )
}

async fn enqueue(state: &AppState, payload: &NewOrderJob) -> Result<Uuid, ApiError> {
    let job = Job::new(JOB_NEW_ORDER, payload).map_err(internal_error)?;
    state.queue.enqueue(&job).await.map_err(upstream)?;
    info!("enqueued order job {} from {}", job.id, payload.source);
    Ok(job.id)
}

/// The request body is the raw CSV file. It is staged in the temp directory
/// and handed to the import pipeline, which removes it when done.
async fn import_csv(State(state): State<AppState>, body: Bytes) -> ApiResult<ImportResponse> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("import file is empty".to_string()));
    }

    let path = std::env::temp_dir().join(format!("orderline-import-{}.csv", Uuid::new_v4()));
    tokio::fs::write(&path, &body).await.map_err(internal_error)?;

    let result = state.importer.import_batch(&path).await?;
    respond(
        StatusCode::OK,
        ImportResponse {
            rows: result.row_count(),
            result,
        },
    )
}

async fn chat_message(
    State(state): State<AppState>,
    payload: Result<Json<ChatMessageRequest>, JsonRejection>,
) -> ApiResult<ChatMessageResponse> {
    let Json(payload) = payload?;
    if !state.agents.is_authorized(&payload.from) {
        warn!("chat message from unauthorized sender {}", payload.from);
        return Err(ApiError::Forbidden(format!(
            "{} is not an authorized agent",
            payload.from
        )));
    }
    let agent = state.agents.display_name(&payload.from);

    let extracted = state.resolver.extract(&payload.text);
    let (customer_phone, job_id) = match payload.order {
        Some(mut order) => {
            if order.customer.phone_number.trim().is_empty() {
                order.customer.phone_number = extracted.clone().ok_or_else(|| {
                    ApiError::BadRequest("no customer phone number in order or message".to_string())
                })?;
            }
            order.source = CHAT_SOURCE.to_string();
            let phone = state.resolver.normalize(&order.customer.phone_number);
            (Some(phone), Some(enqueue(&state, &order).await?))
        }
        None => (extracted, None),
    };

    info!("chat message from {agent} handled");
    respond(
        StatusCode::OK,
        ChatMessageResponse {
            agent,
            customer_phone,
            job_id,
        },
    )
}

async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    payload: Result<Json<UpdateOrderStatusRequest>, JsonRejection>,
) -> ApiResult<orderline_core::Order> {
    let Json(payload) = payload?;
    let status: OrderStatus = payload.status.parse()?;
    let order = state
        .store
        .update_order_status(order_id, status)
        .await
        .map_err(upstream)?
        .ok_or_else(|| OrderError::not_found("order", order_id))?;

    info!("order {order_id} status set to {status}");
    respond(StatusCode::OK, order)
}

async fn list_tracking(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<TrackingListResponse> {
    ensure_order(&state, order_id).await?;
    let items = state
        .store
        .tracking_for_order(order_id)
        .await
        .map_err(upstream)?;
    respond(StatusCode::OK, TrackingListResponse { order_id, items })
}

/// Publishes a tracking update for the subscriber to apply; the row itself
/// is not written here.
async fn update_tracking(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    payload: Result<Json<UpdateTrackingRequest>, JsonRejection>,
) -> ApiResult<TrackingUpdatedEvent> {
    let Json(payload) = payload?;
    let status = payload.status.trim();
    if status.is_empty() {
        return Err(ApiError::BadRequest("status is required".to_string()));
    }
    ensure_order(&state, order_id).await?;

    let event = TrackingUpdatedEvent {
        order_id,
        status: status.to_string(),
        courier: payload.courier,
        tracking_number: payload.tracking_number,
    };
    state
        .bus
        .publish_json(TOPIC_TRACKING_UPDATED, &event)
        .await
        .map_err(upstream)?;

    respond(StatusCode::ACCEPTED, event)
}

async fn ensure_order(state: &AppState, order_id: Uuid) -> Result<(), ApiError> {
    state
        .store
        .get_order(order_id)
        .await
        .map_err(upstream)?
        .map(|_| ())
        .ok_or_else(|| OrderError::not_found("order", order_id).into())
}
