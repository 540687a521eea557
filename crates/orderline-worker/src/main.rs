use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use futures_util::StreamExt;
use orderline_core::{
    JobQueue, LedgerMirror, OrderBackend, TOPIC_ORDER_CREATED, TOPIC_TRACKING_UPDATED,
    TrackingStore,
};
use orderline_pipeline::{OrderIngestionWorker, TrackingSync};
use orderline_platform::{
    PgOrderStore, RedisBus, RedisJobQueue, ServiceConfig, SheetsClient, connect_database,
};
use tracing::{error, info, warn};

const POLL_TIMEOUT: Duration = Duration::from_secs(5);
const QUEUE_RETRY_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "orderline_worker=info,orderline_pipeline=info,orderline_platform=info".to_string()
        }))
        .init();

    let config = ServiceConfig::worker_from_env()?;
    let pool = connect_database(&config.database_url).await?;
    let redis = RedisBus::connect(&config.redis_url)?;

    let store = Arc::new(PgOrderStore::new(pool));
    let sheets = Arc::new(SheetsClient::new(&config.sheets)?);
    let queue = RedisJobQueue::new(redis.client().clone(), &config.queue);
    queue.recover().await?;

    let tracking = Arc::new(TrackingSync::new(store.clone()));
    let subscriber = tokio::spawn(run_subscriber(redis.clone(), tracking));

    let worker = OrderIngestionWorker::new(store, sheets, config.sheets.order_sheet.clone())
        .with_publisher(Arc::new(redis));

    info!(
        "order worker {} consuming queue {}",
        config.queue.worker_id, config.queue.name
    );

    tokio::select! {
        result = run_jobs(&queue, &worker) => result,
        joined = subscriber => joined.context("tracking subscriber task panicked")?,
    }
}

/// What one pass of the job loop did with the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Idle,
    Acked,
    Retried,
    Parked,
}

/// Pulls one job at a time. Failures go back to the queue, which decides
/// between a retry and the failed list.
async fn run_jobs<Q, S, M>(queue: &Q, worker: &OrderIngestionWorker<S, M>) -> Result<()>
where
    Q: JobQueue,
    S: OrderBackend,
    M: LedgerMirror,
{
    loop {
        if let Err(err) = run_once(queue, worker).await {
            error!("failed to fetch next job: {err:#}");
            tokio::time::sleep(QUEUE_RETRY_DELAY).await;
        }
    }
}

/// Takes at most one job off the queue and settles it. Only a failure to
/// fetch is returned; ack and fail errors are logged and the job is left
/// reserved for `recover`.
async fn run_once<Q, S, M>(queue: &Q, worker: &OrderIngestionWorker<S, M>) -> Result<JobOutcome>
where
    Q: JobQueue,
    S: OrderBackend,
    M: LedgerMirror,
{
    let Some(job) = queue.next_job(POLL_TIMEOUT).await? else {
        return Ok(JobOutcome::Idle);
    };

    match worker.handle_job(&job).await {
        Ok(_) => {
            if let Err(err) = queue.ack(&job).await {
                error!("failed to ack job {}: {err:#}", job.id);
            }
            Ok(JobOutcome::Acked)
        }
        Err(err) => {
            let reason = err.to_string();
            match queue.fail(&job, &reason, err.is_retryable()).await {
                Ok(true) => {
                    error!(
                        "job {} moved to failed after {} attempt(s): {reason}",
                        job.id,
                        job.attempts + 1
                    );
                    Ok(JobOutcome::Parked)
                }
                Ok(false) => {
                    warn!("job {} failed and will be retried: {reason}", job.id);
                    Ok(JobOutcome::Retried)
                }
                Err(fail_err) => {
                    error!("failed to record failure of job {}: {fail_err:#}", job.id);
                    Ok(JobOutcome::Retried)
                }
            }
        }
    }
}

async fn run_subscriber<S>(redis: RedisBus, sync: Arc<TrackingSync<S>>) -> Result<()>
where
    S: TrackingStore + 'static,
{
    let mut pubsub = redis.client().get_async_pubsub().await?;
    pubsub.subscribe(TOPIC_ORDER_CREATED).await?;
    pubsub.subscribe(TOPIC_TRACKING_UPDATED).await?;
    let mut messages = pubsub.on_message();

    info!("tracking sync subscribed to {TOPIC_ORDER_CREATED} and {TOPIC_TRACKING_UPDATED}");

    loop {
        let msg = messages
            .next()
            .await
            .context("order event stream ended unexpectedly")?;
        let topic = msg.get_channel_name().to_string();
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(err) => {
                error!("unreadable message on {topic}: {err}");
                continue;
            }
        };

        let sync = sync.clone();
        tokio::spawn(async move {
            sync.handle(&topic, &payload).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use orderline_core::{
        AddressInput, CustomerInput, ItemInput, JOB_NEW_ORDER, Job, NewOrderJob, OrderStore,
    };
    use orderline_memstore::{InMemoryJobQueue, InMemoryLedger, InMemoryOrderStore};

    use super::*;

    const HEADERS: &[&str] = &["Order ID", "Customer Name", "Phone", "Items", "Total", "Status"];

    fn order() -> NewOrderJob {
        NewOrderJob {
            customer: CustomerInput {
                name: "Farah".to_string(),
                phone_number: "0123456789".to_string(),
                email: None,
            },
            address: AddressInput {
                line1: "3 Lorong Kurau".to_string(),
                line2: None,
                city: "Kuala Lumpur".to_string(),
                state: None,
                postcode: "59100".to_string(),
                country: "Malaysia".to_string(),
            },
            items: vec![ItemInput {
                product_id: None,
                product_name: Some("Nasi Lemak".to_string()),
                quantity: 1,
            }],
            status: None,
            notes: None,
            source: "api".to_string(),
        }
    }

    fn worker(
        store: &Arc<InMemoryOrderStore>,
        ledger: InMemoryLedger,
    ) -> OrderIngestionWorker<InMemoryOrderStore, InMemoryLedger> {
        OrderIngestionWorker::new(store.clone(), Arc::new(ledger), "Orders")
    }

    #[tokio::test]
    async fn empty_queue_is_idle() {
        let store = Arc::new(InMemoryOrderStore::default());
        let worker = worker(&store, InMemoryLedger::with_sheet("Orders", HEADERS));
        let queue = InMemoryJobQueue::default();

        assert_eq!(run_once(&queue, &worker).await.unwrap(), JobOutcome::Idle);
    }

    #[tokio::test]
    async fn successful_job_is_acked() {
        let store = Arc::new(InMemoryOrderStore::default());
        let worker = worker(&store, InMemoryLedger::with_sheet("Orders", HEADERS));
        let queue = InMemoryJobQueue::default();
        let job = Job::new(JOB_NEW_ORDER, &order()).unwrap();
        queue.enqueue(&job).await.unwrap();

        assert_eq!(run_once(&queue, &worker).await.unwrap(), JobOutcome::Acked);

        assert_eq!(queue.pending_len().await, 0);
        assert_eq!(queue.reserved_len().await, 0);
        assert!(queue.failed_jobs().await.is_empty());
        assert!(store.get_order(job.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn retryable_failure_is_requeued_with_one_more_attempt() {
        let store = Arc::new(InMemoryOrderStore::default());
        let worker = worker(&store, InMemoryLedger::failing());
        let queue = InMemoryJobQueue::new(3);
        let job = Job::new(JOB_NEW_ORDER, &order()).unwrap();
        queue.enqueue(&job).await.unwrap();

        assert_eq!(run_once(&queue, &worker).await.unwrap(), JobOutcome::Retried);

        assert_eq!(queue.reserved_len().await, 0);
        assert!(queue.failed_jobs().await.is_empty());
        let requeued = queue.next_job(POLL_TIMEOUT).await.unwrap().unwrap();
        assert_eq!(requeued.id, job.id);
        assert_eq!(requeued.attempts, 1);
    }

    #[tokio::test]
    async fn retries_run_out_on_the_failed_list() {
        let store = Arc::new(InMemoryOrderStore::default());
        let worker = worker(&store, InMemoryLedger::failing());
        let queue = InMemoryJobQueue::new(2);
        queue.enqueue(&Job::new(JOB_NEW_ORDER, &order()).unwrap()).await.unwrap();

        assert_eq!(run_once(&queue, &worker).await.unwrap(), JobOutcome::Retried);
        assert_eq!(run_once(&queue, &worker).await.unwrap(), JobOutcome::Parked);

        let failed = queue.failed_jobs().await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0.attempts, 2);
        assert_eq!(queue.pending_len().await, 0);
        assert_eq!(store.orders().await.len(), 1);
    }

    #[tokio::test]
    async fn malformed_and_invalid_jobs_go_straight_to_failed() {
        let store = Arc::new(InMemoryOrderStore::default());
        let worker = worker(&store, InMemoryLedger::with_sheet("Orders", HEADERS));
        let queue = InMemoryJobQueue::new(5);

        let mut invalid = order();
        invalid.customer.name = " ".to_string();
        queue.enqueue(&Job::new(JOB_NEW_ORDER, &"not an order").unwrap()).await.unwrap();
        queue.enqueue(&Job::new(JOB_NEW_ORDER, &invalid).unwrap()).await.unwrap();

        assert_eq!(run_once(&queue, &worker).await.unwrap(), JobOutcome::Parked);
        assert_eq!(run_once(&queue, &worker).await.unwrap(), JobOutcome::Parked);

        let failed = queue.failed_jobs().await;
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|(job, _)| job.attempts == 1));
        assert!(failed[0].1.contains("malformed job payload"));
        assert_eq!(queue.pending_len().await, 0);
        assert!(store.customers().await.is_empty());
    }
}
