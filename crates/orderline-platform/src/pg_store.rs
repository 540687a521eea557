use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use orderline_core::{
    Address, AddressStore, Customer, CustomerStore, MessageStatus, NewAddress, NewCustomer,
    NewOrder, NewTracking, Order, OrderItem, OrderStatus, OrderStore, OrderTracking, Product,
    ProductStore, TrackingPatch, TrackingStore,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

const CUSTOMER_COLUMNS: &str = "id, name, phone_number, email, created_at, updated_at";
const ADDRESS_COLUMNS: &str =
    "id, customer_id, line1, line2, city, state, postcode, country, created_at";
const ORDER_COLUMNS: &str =
    "id, customer_id, address_id, status, total_amount, notes, source, created_at, updated_at";
const TRACKING_COLUMNS: &str = "id, order_id, status, courier, tracking_number, message_status, last_message_sent_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            "SELECT product_id, product_name, quantity, unit_price FROM order_items WHERE order_id = $1 ORDER BY position",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(OrderItem {
                    product_id: row.try_get("product_id")?,
                    product_name: row.try_get("product_name")?,
                    quantity: row.try_get("quantity")?,
                    unit_price: row.try_get("unit_price")?,
                })
            })
            .collect()
    }
}

fn customer_from_row(row: &PgRow) -> Result<Customer> {
    Ok(Customer {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        phone_number: row.try_get("phone_number")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn address_from_row(row: &PgRow) -> Result<Address> {
    Ok(Address {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        line1: row.try_get("line1")?,
        line2: row.try_get("line2")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        postcode: row.try_get("postcode")?,
        country: row.try_get("country")?,
        created_at: row.try_get("created_at")?,
    })
}

fn order_from_row(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        address_id: row.try_get("address_id")?,
        items,
        status: status.parse()?,
        total_amount: row.try_get("total_amount")?,
        notes: row.try_get("notes")?,
        source: row.try_get("source")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn tracking_from_row(row: &PgRow) -> Result<OrderTracking> {
    let message_status: String = row.try_get("message_status")?;
    Ok(OrderTracking {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        status: row.try_get("status")?,
        courier: row.try_get("courier")?,
        tracking_number: row.try_get("tracking_number")?,
        message_status: message_status.parse::<MessageStatus>()?,
        last_message_sent_at: row.try_get("last_message_sent_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl CustomerStore for PgOrderStore {
    async fn upsert_customer(&self, customer: NewCustomer) -> Result<Customer> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO customers (id, name, phone_number, email, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (phone_number) DO UPDATE SET
                name = EXCLUDED.name,
                email = COALESCE(EXCLUDED.email, customers.email),
                updated_at = EXCLUDED.updated_at
            RETURNING {CUSTOMER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(customer.name.trim())
        .bind(&customer.phone_number)
        .bind(customer.email.as_deref().map(str::trim))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("failed to upsert customer")?;

        customer_from_row(&row)
    }

    async fn find_customer_by_phone(&self, phone_number: &str) -> Result<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE phone_number = $1"
        ))
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(customer_from_row).transpose()
    }
}

#[async_trait]
impl AddressStore for PgOrderStore {
    async fn create_address(&self, address: NewAddress) -> Result<Address> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO addresses (id, customer_id, line1, line2, city, state, postcode, country, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            RETURNING {ADDRESS_COLUMNS}
            "#
        ))
        .bind(address.id)
        .bind(address.customer_id)
        .bind(address.line1.trim())
        .bind(address.line2.as_deref().map(str::trim))
        .bind(address.city.trim())
        .bind(address.state.as_deref().map(str::trim))
        .bind(address.postcode.trim())
        .bind(address.country.trim())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .context("failed to create address")?;

        match row {
            Some(row) => address_from_row(&row),
            None => self
                .get_address(address.id)
                .await?
                .with_context(|| format!("address {} vanished after conflict", address.id)),
        }
    }

    async fn get_address(&self, address_id: Uuid) -> Result<Option<Address>> {
        let row = sqlx::query(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = $1"
        ))
        .bind(address_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(address_from_row).transpose()
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        let now = Utc::now();
        let total_amount = order.total_amount();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (id, customer_id, address_id, status, total_amount, notes, source, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.id)
        .bind(order.customer_id)
        .bind(order.address_id)
        .bind(order.status.as_str())
        .bind(total_amount)
        .bind(order.notes.as_deref())
        .bind(&order.source)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert order")?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, product_name, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order.id)
            .bind(position as i32)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to insert order item '{}'", item.product_name))?;
        }

        tx.commit().await?;

        order_from_row(&row, order.items)
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let items = self.order_items(order_id).await?;
                Ok(Some(order_from_row(&row, items)?))
            }
            None => Ok(None),
        }
    }

    async fn update_order_status(&self, order_id: Uuid, status: OrderStatus) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order_id)
        .bind(status.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let items = self.order_items(order_id).await?;
                Ok(Some(order_from_row(&row, items)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TrackingStore for PgOrderStore {
    async fn create_tracking(&self, tracking: NewTracking) -> Result<OrderTracking> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO order_tracking (
                id, order_id, status, courier, tracking_number, message_status,
                last_message_sent_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, NULL, $7, $7)
            RETURNING {TRACKING_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(tracking.order_id)
        .bind(&tracking.status)
        .bind(tracking.courier.as_deref())
        .bind(tracking.tracking_number.as_deref())
        .bind(tracking.message_status.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("failed to create tracking row")?;

        tracking_from_row(&row)
    }

    async fn tracking_for_order(&self, order_id: Uuid) -> Result<Vec<OrderTracking>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRACKING_COLUMNS} FROM order_tracking WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(tracking_from_row).collect()
    }

    async fn update_tracking(
        &self,
        tracking_id: Uuid,
        patch: TrackingPatch,
    ) -> Result<Option<OrderTracking>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE order_tracking SET
                status = COALESCE($2, status),
                courier = COALESCE($3, courier),
                tracking_number = COALESCE($4, tracking_number),
                message_status = COALESCE($5, message_status),
                last_message_sent_at = COALESCE($6, last_message_sent_at),
                updated_at = $7
            WHERE id = $1
            RETURNING {TRACKING_COLUMNS}
            "#
        ))
        .bind(tracking_id)
        .bind(patch.status.as_deref())
        .bind(patch.courier.as_deref())
        .bind(patch.tracking_number.as_deref())
        .bind(patch.message_status.map(|s| s.as_str()))
        .bind(patch.last_message_sent_at)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(tracking_from_row).transpose()
    }
}

#[async_trait]
impl ProductStore for PgOrderStore {
    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query("SELECT id, name, sku, price FROM products ORDER BY created_at, name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(Product {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    sku: row.try_get("sku")?,
                    price: row.try_get("price")?,
                })
            })
            .collect()
    }
}
