use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OrderError;

/// Canonical order lifecycle.
///
/// Two vocabularies reach this service: the payment one used by the chat and
/// spreadsheet flows (`unpaid`, `paid`, `refunded`) and the fulfilment one used
/// by the dashboard (`pending`, `confirmed`, `shipped`, `delivered`). Both parse
/// into this enum; only the fulfilment names are ever written back out.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" | "unpaid" => Ok(OrderStatus::Pending),
            "confirmed" | "paid" => Ok(OrderStatus::Confirmed),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(OrderError::Validation(format!(
                "unsupported order status: {other}"
            ))),
        }
    }
}

/// Delivery state of the customer-facing notification, independent of the
/// shipment itself.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Pending,
    Sent,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sent => "sent",
            MessageStatus::Failed => "failed",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = OrderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(MessageStatus::Pending),
            "sent" => Ok(MessageStatus::Sent),
            "failed" => Ok(MessageStatus::Failed),
            other => Err(OrderError::Validation(format!(
                "unsupported message status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub phone_number: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    /// Always normalized; unique across customers.
    pub phone_number: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postcode: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
}

impl Address {
    /// Single-line rendering used by the spreadsheet ledger.
    pub fn one_line(&self) -> String {
        let mut parts = vec![self.line1.as_str()];
        if let Some(line2) = self.line2.as_deref().filter(|l| !l.trim().is_empty()) {
            parts.push(line2);
        }
        parts.push(self.postcode.as_str());
        parts.push(self.city.as_str());
        if let Some(state) = self.state.as_deref().filter(|s| !s.trim().is_empty()) {
            parts.push(state);
        }
        parts.push(self.country.as_str());
        parts.join(", ")
    }
}

/// Address ids are minted by the caller; creating the same id twice returns
/// the first row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAddress {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postcode: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderItem {
    /// `None` when the inbound name matched no catalogue product.
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub address_id: Option<Uuid>,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order ids are minted by the caller so the spreadsheet mirror can be written
/// concurrently with the primary insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub address_id: Option<Uuid>,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub source: String,
}

impl NewOrder {
    /// The row this order becomes once stored at `at`.
    pub fn to_order(&self, at: DateTime<Utc>) -> Order {
        Order {
            id: self.id,
            customer_id: self.customer_id,
            address_id: self.address_id,
            items: self.items.clone(),
            status: self.status,
            total_amount: self.total_amount(),
            notes: self.notes.clone(),
            source: self.source.clone(),
            created_at: at,
            updated_at: at,
        }
    }

    pub fn total_amount(&self) -> Decimal {
        self.items
            .iter()
            .filter_map(|item| {
                item.unit_price
                    .map(|price| price * Decimal::from(item.quantity))
            })
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTracking {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: String,
    pub courier: Option<String>,
    pub tracking_number: Option<String>,
    pub message_status: MessageStatus,
    pub last_message_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTracking {
    pub order_id: Uuid,
    pub status: String,
    pub courier: Option<String>,
    pub tracking_number: Option<String>,
    pub message_status: MessageStatus,
}

impl NewTracking {
    pub fn pending(order_id: Uuid) -> Self {
        Self {
            order_id,
            status: TRACKING_STATUS_PENDING.to_string(),
            courier: None,
            tracking_number: None,
            message_status: MessageStatus::Pending,
        }
    }
}

/// In-place patch for an existing tracking row. `None` leaves a column as is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackingPatch {
    pub status: Option<String>,
    pub courier: Option<String>,
    pub tracking_number: Option<String>,
    pub message_status: Option<MessageStatus>,
    pub last_message_sent_at: Option<DateTime<Utc>>,
}

pub const TRACKING_STATUS_PENDING: &str = "pending";

/// Per-row failure inside a batch import.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportRowError {
    /// 1-based position in the parsed payload list.
    pub row: usize,
    pub customer: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportResult {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<ImportRowError>,
}

impl ImportResult {
    pub fn row_count(&self) -> usize {
        self.success + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_status_vocabularies_parse_to_canonical() {
        assert_eq!("unpaid".parse::<OrderStatus>().unwrap(), OrderStatus::Pending);
        assert_eq!("PAID".parse::<OrderStatus>().unwrap(), OrderStatus::Confirmed);
        assert_eq!(
            " refunded ".parse::<OrderStatus>().unwrap(),
            OrderStatus::Refunded
        );
        assert_eq!("shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert!("lost".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&OrderStatus::Delivered).unwrap();
        assert_eq!(json, "\"delivered\"");
    }

    #[test]
    fn total_skips_unpriced_items() {
        let order = NewOrder {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            address_id: None,
            items: vec![
                OrderItem {
                    product_id: Some(Uuid::new_v4()),
                    product_name: "Kopi".to_string(),
                    quantity: 3,
                    unit_price: Some(Decimal::new(1250, 2)),
                },
                OrderItem {
                    product_id: None,
                    product_name: "Mystery".to_string(),
                    quantity: 1,
                    unit_price: None,
                },
            ],
            status: OrderStatus::Pending,
            notes: None,
            source: "api".to_string(),
        };

        assert_eq!(order.total_amount(), Decimal::new(3750, 2));
    }
}
