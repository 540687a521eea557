use std::path::Path;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    events::NewOrderJob,
    models::{
        Address, Customer, NewAddress, NewCustomer, NewOrder, NewTracking, Order, OrderStatus,
        OrderTracking, Product, TrackingPatch,
    },
};

#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// Create-or-update keyed by `phone_number`. A second call with the same
    /// number updates the existing row and returns it.
    async fn upsert_customer(&self, customer: NewCustomer) -> anyhow::Result<Customer>;
    async fn find_customer_by_phone(&self, phone_number: &str) -> anyhow::Result<Option<Customer>>;
}

#[async_trait]
pub trait AddressStore: Send + Sync {
    /// Idempotent on `address.id`.
    async fn create_address(&self, address: NewAddress) -> anyhow::Result<Address>;
    async fn get_address(&self, address_id: Uuid) -> anyhow::Result<Option<Address>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_order(&self, order: NewOrder) -> anyhow::Result<Order>;
    async fn get_order(&self, order_id: Uuid) -> anyhow::Result<Option<Order>>;
    async fn update_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> anyhow::Result<Option<Order>>;
}

#[async_trait]
pub trait TrackingStore: Send + Sync {
    async fn create_tracking(&self, tracking: NewTracking) -> anyhow::Result<OrderTracking>;
    /// Rows for one order. No particular order is promised.
    async fn tracking_for_order(&self, order_id: Uuid) -> anyhow::Result<Vec<OrderTracking>>;
    async fn update_tracking(
        &self,
        tracking_id: Uuid,
        patch: TrackingPatch,
    ) -> anyhow::Result<Option<OrderTracking>>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn list_products(&self) -> anyhow::Result<Vec<Product>>;
}

/// Everything the order pipelines need from the primary store.
pub trait OrderBackend: CustomerStore + AddressStore + OrderStore + TrackingStore + ProductStore {}

impl<T> OrderBackend for T where
    T: CustomerStore + AddressStore + OrderStore + TrackingStore + ProductStore
{
}

/// Tabular best-effort replica of order data.
#[async_trait]
pub trait LedgerMirror: Send + Sync {
    async fn header_row(&self, sheet: &str) -> anyhow::Result<Vec<String>>;
    async fn append_row(&self, sheet: &str, values: Vec<String>) -> anyhow::Result<()>;
    async fn read_all_rows(&self, sheet: &str) -> anyhow::Result<Vec<Vec<String>>>;
}

/// External service that turns an uploaded file into order payloads.
#[async_trait]
pub trait ImportSource: Send + Sync {
    async fn parse_file(&self, path: &Path) -> anyhow::Result<Vec<NewOrderJob>>;
}
