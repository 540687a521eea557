//! Turns one `new_order` job into a customer, an address, an order in the
//! primary store and a row in the spreadsheet ledger.
//!
//! The order insert and the ledger append run concurrently and neither rolls
//! the other back. A job that fails halfway is redelivered by the queue; the
//! job id doubles as the order id and the address id, so any later delivery
//! of the same job finds what the earlier run stored and only fills the gaps.

use std::sync::Arc;

use chrono::Utc;
use orderline_core::{
    Address, Customer, EventPublisher, JOB_NEW_ORDER, Job, LedgerMirror, NewOrder, NewOrderJob,
    Order, OrderBackend, OrderCreatedEvent, OrderError, PhoneResolver, TOPIC_ORDER_CREATED,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    catalog::{ProductCatalog, ProductMatch},
    entities,
    error::PipelineError,
    ledger::{self, LedgerFields},
};

#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    pub order: Order,
    pub customer: Customer,
    pub address: Address,
    /// Values appended to the ledger, `None` when the order was already there.
    pub ledger_row: Option<Vec<String>>,
}

pub struct OrderIngestionWorker<S, M> {
    store: Arc<S>,
    mirror: Arc<M>,
    publisher: Option<Arc<dyn EventPublisher>>,
    resolver: PhoneResolver,
    sheet: String,
}

impl<S, M> OrderIngestionWorker<S, M>
where
    S: OrderBackend,
    M: LedgerMirror,
{
    pub fn new(store: Arc<S>, mirror: Arc<M>, sheet: impl Into<String>) -> Self {
        Self {
            store,
            mirror,
            publisher: None,
            resolver: PhoneResolver::default(),
            sheet: sheet.into(),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_resolver(mut self, resolver: PhoneResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub async fn handle_job(&self, job: &Job) -> Result<IngestionOutcome, PipelineError> {
        if job.name != JOB_NEW_ORDER {
            return Err(OrderError::validation(format!("unsupported job '{}'", job.name)).into());
        }

        let payload: NewOrderJob = serde_json::from_value(job.payload.clone())?;
        // Recovered jobs come back with their attempt count untouched, so every
        // delivery is checked against what is already stored.
        self.ingest(job.id, payload, true).await
    }

    /// Ingests a payload that did not come through the queue under a fresh
    /// order id.
    pub async fn process(&self, payload: NewOrderJob) -> Result<IngestionOutcome, PipelineError> {
        self.ingest(Uuid::new_v4(), payload, false).await
    }

    async fn ingest(
        &self,
        order_id: Uuid,
        payload: NewOrderJob,
        queued: bool,
    ) -> Result<IngestionOutcome, PipelineError> {
        let status = entities::parse_status(payload.status.as_deref())?;
        let new_customer = entities::new_customer(&self.resolver, &payload.customer)?;
        let mut new_address = entities::new_address(order_id, &payload.address)?;

        if queued {
            if let Some(existing) = self
                .store
                .get_order(order_id)
                .await
                .map_err(PipelineError::Store)?
            {
                return self.repair_ledger(existing, &new_customer.phone_number).await;
            }
        }

        let catalog = ProductCatalog::load(&*self.store)
            .await
            .map_err(PipelineError::Store)?;
        let items = catalog.resolve_items(&payload.items, ProductMatch::Lenient)?;

        let customer = entities::upsert_customer(&*self.store, new_customer).await?;
        new_address.customer_id = customer.id;
        let address = entities::create_address(&*self.store, new_address).await?;

        let new_order = NewOrder {
            id: order_id,
            customer_id: customer.id,
            address_id: Some(address.id),
            items,
            status,
            notes: payload.notes,
            source: payload.source,
        };
        let fields = ledger::order_fields(&new_order.to_order(Utc::now()), &customer, &address);

        let (stored, mirrored) = tokio::join!(
            self.store.create_order(new_order),
            self.mirror_once(order_id, &fields, queued),
        );

        let (order, ledger_row) = match (stored, mirrored) {
            (Ok(order), Ok(row)) => (order, row),
            (Ok(order), Err(mirror)) => {
                warn!("order {} stored but ledger append failed: {mirror:#}", order.id);
                return Err(PipelineError::Mirror(mirror));
            }
            (Err(store), Ok(_)) => {
                warn!("ledger row for order {order_id} written but store insert failed: {store:#}");
                return Err(PipelineError::Store(store));
            }
            (Err(store), Err(mirror)) => return Err(PipelineError::Both { store, mirror }),
        };

        info!(
            "order {} ingested for customer {} ({} items, total {}); ledger {}",
            order.id,
            customer.phone_number,
            order.items.len(),
            order.total_amount,
            if ledger_row.is_some() { "appended" } else { "already current" },
        );

        self.announce(order.id).await;

        Ok(IngestionOutcome {
            order,
            customer,
            address,
            ledger_row,
        })
    }

    /// Redelivery of a job whose order insert already went through.
    async fn repair_ledger(
        &self,
        order: Order,
        phone_number: &str,
    ) -> Result<IngestionOutcome, PipelineError> {
        let customer = self
            .store
            .find_customer_by_phone(phone_number)
            .await
            .map_err(PipelineError::Store)?
            .filter(|customer| customer.id == order.customer_id)
            .ok_or_else(|| OrderError::not_found("customer", order.customer_id))?;

        let address_id = order
            .address_id
            .ok_or_else(|| OrderError::not_found("address", format!("for order {}", order.id)))?;
        let address = self
            .store
            .get_address(address_id)
            .await
            .map_err(PipelineError::Store)?
            .ok_or_else(|| OrderError::not_found("address", address_id))?;

        let fields = ledger::order_fields(&order, &customer, &address);
        let ledger_row = self
            .mirror_once(order.id, &fields, true)
            .await
            .map_err(PipelineError::Mirror)?;

        info!("order {} already stored; ledger repaired on redelivery", order.id);
        self.announce(order.id).await;

        Ok(IngestionOutcome {
            order,
            customer,
            address,
            ledger_row,
        })
    }

    async fn mirror_once(
        &self,
        order_id: Uuid,
        fields: &LedgerFields,
        check_existing: bool,
    ) -> anyhow::Result<Option<Vec<String>>> {
        if check_existing && ledger::contains_order(&*self.mirror, &self.sheet, order_id).await? {
            debug!("ledger already has order {order_id}");
            return Ok(None);
        }
        ledger::append_fields(&*self.mirror, &self.sheet, fields)
            .await
            .map(Some)
    }

    async fn announce(&self, order_id: Uuid) {
        let Some(publisher) = &self.publisher else {
            return;
        };

        let payload = match serde_json::to_string(&OrderCreatedEvent { order_id }) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("failed to encode {TOPIC_ORDER_CREATED} for order {order_id}: {err}");
                return;
            }
        };
        if let Err(err) = publisher.publish(TOPIC_ORDER_CREATED, payload).await {
            warn!("failed to publish {TOPIC_ORDER_CREATED} for order {order_id}: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use orderline_core::{AddressInput, CustomerInput, ItemInput};
    use orderline_memstore::{InMemoryLedger, InMemoryOrderStore, RecordingPublisher};
    use rust_decimal::Decimal;

    use super::*;

    const HEADERS: &[&str] = &["Order ID", "Customer Name", "Phone", "Items", "Total", "Status"];

    fn payload(phone: &str, product: &str) -> NewOrderJob {
        NewOrderJob {
            customer: CustomerInput {
                name: "Siti".to_string(),
                phone_number: phone.to_string(),
                email: None,
            },
            address: AddressInput {
                line1: "12 Jalan Telawi".to_string(),
                line2: None,
                city: "Kuala Lumpur".to_string(),
                state: Some("WP".to_string()),
                postcode: "59100".to_string(),
                country: "Malaysia".to_string(),
            },
            items: vec![ItemInput {
                product_id: None,
                product_name: Some(product.to_string()),
                quantity: 2,
            }],
            status: Some("paid".to_string()),
            notes: None,
            source: "chat".to_string(),
        }
    }

    fn worker(
        store: &Arc<InMemoryOrderStore>,
        ledger: &Arc<InMemoryLedger>,
    ) -> OrderIngestionWorker<InMemoryOrderStore, InMemoryLedger> {
        OrderIngestionWorker::new(store.clone(), ledger.clone(), "Orders")
    }

    #[tokio::test]
    async fn same_phone_twice_gives_one_customer_and_two_orders() {
        let store = Arc::new(InMemoryOrderStore::default());
        store.add_product("Kopi Kampung", Decimal::new(1500, 2)).await;
        let ledger = Arc::new(InMemoryLedger::with_sheet("Orders", HEADERS));
        let worker = worker(&store, &ledger);

        let first = worker.process(payload("012-345 6789", "kopi kampung")).await.unwrap();
        let second = worker.process(payload("+60123456789", "Kopi Kampung")).await.unwrap();

        assert_eq!(first.customer.id, second.customer.id);
        assert_ne!(first.order.id, second.order.id);
        assert_eq!(store.customers().await.len(), 1);
        assert_eq!(store.orders().await.len(), 2);
        assert_eq!(first.order.total_amount, Decimal::new(3000, 2));
        assert_eq!(ledger.read_all_rows("Orders").await.unwrap().len(), 3);

        let row = first.ledger_row.unwrap();
        assert_eq!(row[0], first.order.id.to_string());
        assert_eq!(row[2], "60123456789");
        assert_eq!(row[5], "confirmed");
    }

    #[tokio::test]
    async fn unmatched_product_name_is_stored_without_id() {
        let store = Arc::new(InMemoryOrderStore::default());
        let ledger = Arc::new(InMemoryLedger::with_sheet("Orders", HEADERS));

        let outcome = worker(&store, &ledger)
            .process(payload("0123456789", "Teh Tarik"))
            .await
            .unwrap();

        assert_eq!(outcome.order.items[0].product_id, None);
        assert_eq!(outcome.order.items[0].product_name, "Teh Tarik");
    }

    #[tokio::test]
    async fn unknown_explicit_product_id_is_permanent_and_writes_nothing() {
        let store = Arc::new(InMemoryOrderStore::default());
        let ledger = Arc::new(InMemoryLedger::with_sheet("Orders", HEADERS));
        let mut order = payload("0123456789", "Teh Tarik");
        order.items[0].product_id = Some(Uuid::new_v4());

        let job = Job::new(JOB_NEW_ORDER, &order).unwrap();
        let err = worker(&store, &ledger).handle_job(&job).await.unwrap_err();

        assert!(matches!(err, PipelineError::Order(OrderError::UnknownProduct(_))));
        assert!(!err.is_retryable());
        assert!(store.customers().await.is_empty());
        assert!(store.addresses().await.is_empty());
        assert!(store.orders().await.is_empty());
        assert_eq!(ledger.read_all_rows("Orders").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mirror_failure_keeps_stored_order_and_fails_job() {
        let store = Arc::new(InMemoryOrderStore::default());
        let ledger = Arc::new(InMemoryLedger::failing());

        let err = worker(&store, &ledger)
            .process(payload("0123456789", "Teh Tarik"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Mirror(_)));
        assert!(err.is_retryable());
        assert_eq!(store.orders().await.len(), 1);
    }

    #[tokio::test]
    async fn invalid_payload_writes_nothing() {
        let store = Arc::new(InMemoryOrderStore::default());
        let ledger = Arc::new(InMemoryLedger::with_sheet("Orders", HEADERS));
        let mut bad = payload("0123456789", "Teh Tarik");
        bad.items.clear();

        let err = worker(&store, &ledger).process(bad).await.unwrap_err();

        assert!(!err.is_retryable());
        assert!(store.customers().await.is_empty());
        assert_eq!(ledger.read_all_rows("Orders").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn success_publishes_order_created() {
        let store = Arc::new(InMemoryOrderStore::default());
        let ledger = Arc::new(InMemoryLedger::with_sheet("Orders", HEADERS));
        let publisher = Arc::new(RecordingPublisher::default());
        let worker = worker(&store, &ledger).with_publisher(publisher.clone());

        let job = Job::new(JOB_NEW_ORDER, &payload("91234567", "Teh Tarik")).unwrap();
        let outcome = worker.handle_job(&job).await.unwrap();

        assert_eq!(outcome.order.id, job.id);
        assert_eq!(outcome.customer.phone_number, "6591234567");
        let published = publisher.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, TOPIC_ORDER_CREATED);
        let event: OrderCreatedEvent = serde_json::from_str(&published[0].1).unwrap();
        assert_eq!(event.order_id, job.id);
    }

    #[tokio::test]
    async fn redelivered_job_does_not_duplicate() {
        let store = Arc::new(InMemoryOrderStore::default());
        let ledger = Arc::new(InMemoryLedger::with_sheet("Orders", HEADERS));
        let worker = worker(&store, &ledger);

        let mut job = Job::new(JOB_NEW_ORDER, &payload("0123456789", "Teh Tarik")).unwrap();
        worker.handle_job(&job).await.unwrap();

        job.attempts = 1;
        let again = worker.handle_job(&job).await.unwrap();

        assert_eq!(again.order.id, job.id);
        assert!(again.ledger_row.is_none());
        assert_eq!(store.orders().await.len(), 1);
        assert_eq!(store.addresses().await.len(), 1);
        assert_eq!(ledger.read_all_rows("Orders").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn recovered_job_with_zero_attempts_does_not_duplicate() {
        let store = Arc::new(InMemoryOrderStore::default());
        let ledger = Arc::new(InMemoryLedger::with_sheet("Orders", HEADERS));
        let worker = worker(&store, &ledger);

        // A job recovered from a dead worker's processing list is requeued
        // as it was, still at zero attempts.
        let job = Job::new(JOB_NEW_ORDER, &payload("0123456789", "Teh Tarik")).unwrap();
        assert_eq!(job.attempts, 0);
        let first = worker.handle_job(&job).await.unwrap();
        let again = worker.handle_job(&job).await.unwrap();

        assert_eq!(again.order.id, first.order.id);
        assert_eq!(again.address.id, first.address.id);
        assert!(again.ledger_row.is_none());
        assert_eq!(store.orders().await.len(), 1);
        assert_eq!(store.addresses().await.len(), 1);
        assert_eq!(ledger.read_all_rows("Orders").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn job_whose_store_insert_failed_reuses_its_address_and_ledger_row() {
        let store = Arc::new(InMemoryOrderStore::default());
        let ledger = Arc::new(InMemoryLedger::with_sheet("Orders", HEADERS));
        let worker = worker(&store, &ledger);
        let job = Job::new(JOB_NEW_ORDER, &payload("0123456789", "Teh Tarik")).unwrap();

        // First delivery wrote the address and the ledger row, then the
        // order insert was lost.
        let customer = entities::upsert_customer(
            &*store,
            entities::new_customer(&PhoneResolver::default(), &payload("0123456789", "").customer)
                .unwrap(),
        )
        .await
        .unwrap();
        let mut address = entities::new_address(job.id, &payload("0123456789", "").address).unwrap();
        address.customer_id = customer.id;
        entities::create_address(&*store, address).await.unwrap();
        ledger
            .append_row("Orders", vec![job.id.to_string()])
            .await
            .unwrap();

        let outcome = worker.handle_job(&job).await.unwrap();

        assert_eq!(outcome.order.id, job.id);
        assert_eq!(outcome.address.id, job.id);
        assert!(outcome.ledger_row.is_none());
        assert_eq!(store.addresses().await.len(), 1);
        assert_eq!(store.orders().await.len(), 1);
        assert_eq!(ledger.read_all_rows("Orders").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn wrong_job_name_and_bad_json_are_permanent() {
        let store = Arc::new(InMemoryOrderStore::default());
        let ledger = Arc::new(InMemoryLedger::with_sheet("Orders", HEADERS));
        let worker = worker(&store, &ledger);

        let other = Job::new("send_invoice", &payload("0123456789", "Teh Tarik")).unwrap();
        assert!(!worker.handle_job(&other).await.unwrap_err().is_retryable());

        let garbage = Job::new(JOB_NEW_ORDER, &"not an order").unwrap();
        let err = worker.handle_job(&garbage).await.unwrap_err();
        assert!(matches!(err, PipelineError::Payload(_)));
        assert!(!err.is_retryable());
    }
}
