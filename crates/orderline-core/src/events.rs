use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TOPIC_ORDER_CREATED: &str = "orders.created";
pub const TOPIC_TRACKING_UPDATED: &str = "orders.tracking_updated";

pub const JOB_NEW_ORDER: &str = "new_order";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerInput {
    pub name: String,
    pub phone_number: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressInput {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    pub postcode: String,
    #[serde(default = "default_country")]
    pub country: String,
}

/// A line as it arrives: direct API callers send `product_id`, chat and
/// spreadsheet flows only know the product name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemInput {
    #[serde(default)]
    pub product_id: Option<Uuid>,
    #[serde(default)]
    pub product_name: Option<String>,
    pub quantity: i32,
}

/// Payload of a `new_order` job and of each row returned by the import
/// service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderJob {
    pub customer: CustomerInput,
    pub address: AddressInput,
    pub items: Vec<ItemInput>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingUpdatedEvent {
    pub order_id: Uuid,
    pub status: String,
    #[serde(default)]
    pub courier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

fn default_country() -> String {
    "Malaysia".to_string()
}

fn default_source() -> String {
    "api".to_string()
}
