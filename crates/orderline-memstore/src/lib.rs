//! In-process stand-ins for the Postgres store, the spreadsheet ledger, the
//! Redis job queue and the pub/sub bus.

use std::{
    collections::{HashMap, VecDeque},
    path::Path,
    time::Duration,
};

use anyhow::bail;
use async_trait::async_trait;
use chrono::Utc;
use orderline_core::{
    Address, AddressStore, Customer, CustomerStore, EventPublisher, ImportSource, Job, JobQueue,
    LedgerMirror, NewAddress, NewCustomer, NewOrder, NewOrderJob, NewTracking, Order, OrderStatus,
    OrderStore, OrderTracking, Product, ProductStore, TrackingPatch, TrackingStore,
};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    customers: HashMap<Uuid, Customer>,
    addresses: HashMap<Uuid, Address>,
    orders: HashMap<Uuid, Order>,
    tracking: Vec<OrderTracking>,
    products: Vec<Product>,
}

/// Primary store kept in memory. Foreign keys and the unique phone column are
/// enforced the way the Postgres schema enforces them.
#[derive(Default)]
pub struct InMemoryOrderStore {
    tables: RwLock<Tables>,
}

impl InMemoryOrderStore {
    pub async fn add_product(&self, name: &str, price: Decimal) -> Product {
        let product = Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            sku: None,
            price,
        };
        self.tables.write().await.products.push(product.clone());
        product
    }

    pub async fn customers(&self) -> Vec<Customer> {
        self.tables.read().await.customers.values().cloned().collect()
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.tables.read().await.orders.values().cloned().collect()
    }

    pub async fn addresses(&self) -> Vec<Address> {
        self.tables.read().await.addresses.values().cloned().collect()
    }

    pub async fn all_tracking(&self) -> Vec<OrderTracking> {
        self.tables.read().await.tracking.clone()
    }
}

#[async_trait]
impl CustomerStore for InMemoryOrderStore {
    async fn upsert_customer(&self, customer: NewCustomer) -> anyhow::Result<Customer> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        if let Some(existing) = tables
            .customers
            .values_mut()
            .find(|c| c.phone_number == customer.phone_number)
        {
            existing.name = customer.name;
            if customer.email.is_some() {
                existing.email = customer.email;
            }
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let created = Customer {
            id: Uuid::new_v4(),
            name: customer.name,
            phone_number: customer.phone_number,
            email: customer.email,
            created_at: now,
            updated_at: now,
        };
        tables.customers.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_customer_by_phone(&self, phone_number: &str) -> anyhow::Result<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables
            .customers
            .values()
            .find(|c| c.phone_number == phone_number)
            .cloned())
    }
}

#[async_trait]
impl AddressStore for InMemoryOrderStore {
    async fn create_address(&self, address: NewAddress) -> anyhow::Result<Address> {
        let mut tables = self.tables.write().await;
        if !tables.customers.contains_key(&address.customer_id) {
            bail!("address references unknown customer {}", address.customer_id);
        }
        if let Some(existing) = tables.addresses.get(&address.id) {
            return Ok(existing.clone());
        }

        let created = Address {
            id: address.id,
            customer_id: address.customer_id,
            line1: address.line1,
            line2: address.line2,
            city: address.city,
            state: address.state,
            postcode: address.postcode,
            country: address.country,
            created_at: Utc::now(),
        };
        tables.addresses.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_address(&self, address_id: Uuid) -> anyhow::Result<Option<Address>> {
        Ok(self.tables.read().await.addresses.get(&address_id).cloned())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, order: NewOrder) -> anyhow::Result<Order> {
        let mut tables = self.tables.write().await;
        if !tables.customers.contains_key(&order.customer_id) {
            bail!("order references unknown customer {}", order.customer_id);
        }
        if let Some(address_id) = order.address_id {
            if !tables.addresses.contains_key(&address_id) {
                bail!("order references unknown address {address_id}");
            }
        }
        for product_id in order.items.iter().filter_map(|item| item.product_id) {
            if !tables.products.iter().any(|p| p.id == product_id) {
                bail!("order item references unknown product {product_id}");
            }
        }
        if tables.orders.contains_key(&order.id) {
            bail!("duplicate order id {}", order.id);
        }

        let created = order.to_order(Utc::now());
        tables.orders.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_order(&self, order_id: Uuid) -> anyhow::Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn update_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> anyhow::Result<Option<Order>> {
        let mut tables = self.tables.write().await;
        Ok(tables.orders.get_mut(&order_id).map(|order| {
            order.status = status;
            order.updated_at = Utc::now();
            order.clone()
        }))
    }
}

#[async_trait]
impl TrackingStore for InMemoryOrderStore {
    async fn create_tracking(&self, tracking: NewTracking) -> anyhow::Result<OrderTracking> {
        let mut tables = self.tables.write().await;
        if !tables.orders.contains_key(&tracking.order_id) {
            bail!("tracking references unknown order {}", tracking.order_id);
        }

        let now = Utc::now();
        let created = OrderTracking {
            id: Uuid::new_v4(),
            order_id: tracking.order_id,
            status: tracking.status,
            courier: tracking.courier,
            tracking_number: tracking.tracking_number,
            message_status: tracking.message_status,
            last_message_sent_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.tracking.push(created.clone());
        Ok(created)
    }

    async fn tracking_for_order(&self, order_id: Uuid) -> anyhow::Result<Vec<OrderTracking>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tracking
            .iter()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn update_tracking(
        &self,
        tracking_id: Uuid,
        patch: TrackingPatch,
    ) -> anyhow::Result<Option<OrderTracking>> {
        let mut tables = self.tables.write().await;
        let Some(row) = tables.tracking.iter_mut().find(|t| t.id == tracking_id) else {
            return Ok(None);
        };

        if let Some(status) = patch.status {
            row.status = status;
        }
        if patch.courier.is_some() {
            row.courier = patch.courier;
        }
        if patch.tracking_number.is_some() {
            row.tracking_number = patch.tracking_number;
        }
        if let Some(message_status) = patch.message_status {
            row.message_status = message_status;
        }
        if patch.last_message_sent_at.is_some() {
            row.last_message_sent_at = patch.last_message_sent_at;
        }
        row.updated_at = Utc::now();

        Ok(Some(row.clone()))
    }
}

#[async_trait]
impl ProductStore for InMemoryOrderStore {
    async fn list_products(&self) -> anyhow::Result<Vec<Product>> {
        Ok(self.tables.read().await.products.clone())
    }
}

/// Spreadsheet stand-in. Sheets are created with a header row; `failing`
/// makes every call return an error.
#[derive(Default)]
pub struct InMemoryLedger {
    sheets: RwLock<HashMap<String, Vec<Vec<String>>>>,
    failing: bool,
}

impl InMemoryLedger {
    pub fn with_sheet(sheet: &str, headers: &[&str]) -> Self {
        let mut sheets = HashMap::new();
        sheets.insert(
            sheet.to_string(),
            vec![headers.iter().map(|h| h.to_string()).collect()],
        );
        Self {
            sheets: RwLock::new(sheets),
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            sheets: RwLock::default(),
            failing: true,
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.failing {
            bail!("spreadsheet unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerMirror for InMemoryLedger {
    async fn header_row(&self, sheet: &str) -> anyhow::Result<Vec<String>> {
        self.check()?;
        let sheets = self.sheets.read().await;
        Ok(sheets
            .get(sheet)
            .and_then(|rows| rows.first().cloned())
            .unwrap_or_default())
    }

    async fn append_row(&self, sheet: &str, values: Vec<String>) -> anyhow::Result<()> {
        self.check()?;
        let mut sheets = self.sheets.write().await;
        sheets.entry(sheet.to_string()).or_default().push(values);
        Ok(())
    }

    async fn read_all_rows(&self, sheet: &str) -> anyhow::Result<Vec<Vec<String>>> {
        self.check()?;
        let sheets = self.sheets.read().await;
        Ok(sheets.get(sheet).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    reserved: Vec<Job>,
    failed: Vec<(Job, String)>,
}

/// FIFO job queue with the same reserve/ack/fail contract as the Redis one.
pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
    max_attempts: u32,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new(3)
    }
}

impl InMemoryJobQueue {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: Mutex::default(),
            max_attempts,
        }
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Jobs handed out and neither acked nor failed yet.
    pub async fn reserved_len(&self) -> usize {
        self.state.lock().await.reserved.len()
    }

    pub async fn failed_jobs(&self) -> Vec<(Job, String)> {
        self.state.lock().await.failed.clone()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: &Job) -> anyhow::Result<()> {
        self.state.lock().await.pending.push_back(job.clone());
        Ok(())
    }

    async fn enqueue_bulk(&self, jobs: &[Job]) -> anyhow::Result<()> {
        self.state.lock().await.pending.extend(jobs.iter().cloned());
        Ok(())
    }

    async fn next_job(&self, _timeout: Duration) -> anyhow::Result<Option<Job>> {
        let mut state = self.state.lock().await;
        let job = state.pending.pop_front();
        if let Some(job) = &job {
            state.reserved.push(job.clone());
        }
        Ok(job)
    }

    async fn ack(&self, job: &Job) -> anyhow::Result<()> {
        self.state.lock().await.reserved.retain(|j| j.id != job.id);
        Ok(())
    }

    async fn fail(&self, job: &Job, reason: &str, retry: bool) -> anyhow::Result<bool> {
        let mut state = self.state.lock().await;
        state.reserved.retain(|j| j.id != job.id);

        let mut next = job.clone();
        next.attempts += 1;
        if !retry || next.attempts >= self.max_attempts {
            state.failed.push((next, reason.to_string()));
            return Ok(true);
        }
        state.pending.push_back(next);
        Ok(false)
    }
}

/// Publisher that records what it was asked to send.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, String)>>,
}

impl RecordingPublisher {
    pub async fn published(&self) -> Vec<(String, String)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: String) -> anyhow::Result<()> {
        self.published.lock().await.push((topic.to_string(), payload));
        Ok(())
    }
}

/// Import source that hands back a fixed payload list, or an error.
pub struct StaticImportSource {
    rows: Option<Vec<NewOrderJob>>,
}

impl StaticImportSource {
    pub fn new(rows: Vec<NewOrderJob>) -> Self {
        Self { rows: Some(rows) }
    }

    pub fn unavailable() -> Self {
        Self { rows: None }
    }
}

#[async_trait]
impl ImportSource for StaticImportSource {
    async fn parse_file(&self, _path: &Path) -> anyhow::Result<Vec<NewOrderJob>> {
        match &self.rows {
            Some(rows) => Ok(rows.clone()),
            None => bail!("import service unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use orderline_core::{NewCustomer, OrderItem};

    use super::*;

    fn customer(phone: &str, name: &str) -> NewCustomer {
        NewCustomer {
            name: name.to_string(),
            phone_number: phone.to_string(),
            email: None,
        }
    }

    #[tokio::test]
    async fn upsert_by_phone_updates_in_place() {
        let store = InMemoryOrderStore::default();
        let first = store.upsert_customer(customer("60123456789", "Ali")).await.unwrap();
        let second = store
            .upsert_customer(customer("60123456789", "Ali bin Abu"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Ali bin Abu");
        assert_eq!(store.customers().await.len(), 1);
    }

    #[tokio::test]
    async fn order_rejects_unknown_product() {
        let store = InMemoryOrderStore::default();
        let c = store.upsert_customer(customer("60123456789", "Ali")).await.unwrap();
        let result = store
            .create_order(NewOrder {
                id: Uuid::new_v4(),
                customer_id: c.id,
                address_id: None,
                items: vec![OrderItem {
                    product_id: Some(Uuid::new_v4()),
                    product_name: "Ghost".to_string(),
                    quantity: 1,
                    unit_price: None,
                }],
                status: OrderStatus::Pending,
                notes: None,
                source: "api".to_string(),
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn failed_job_is_parked_after_max_attempts() {
        let queue = InMemoryJobQueue::new(2);
        let job = Job::new("new_order", &"payload").unwrap();
        queue.enqueue(&job).await.unwrap();

        let first = queue.next_job(Duration::ZERO).await.unwrap().unwrap();
        assert!(!queue.fail(&first, "boom", true).await.unwrap());
        let second = queue.next_job(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(second.attempts, 1);
        assert!(queue.fail(&second, "boom again", true).await.unwrap());

        assert_eq!(queue.pending_len().await, 0);
        assert_eq!(queue.failed_jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn permanent_failure_skips_retries() {
        let queue = InMemoryJobQueue::new(5);
        queue.enqueue(&Job::new("new_order", &"payload").unwrap()).await.unwrap();

        let job = queue.next_job(Duration::ZERO).await.unwrap().unwrap();
        assert!(queue.fail(&job, "bad payload", false).await.unwrap());
        assert_eq!(queue.pending_len().await, 0);
        assert_eq!(queue.failed_jobs().await[0].1, "bad payload");
    }
}
