//! Mirroring orders into the spreadsheet ledger.
//!
//! Column order in the sheet is not fixed. Each append reads the header row
//! and places every known field under the header that names it; headers this
//! service does not know get an empty cell.

use std::collections::BTreeMap;

use anyhow::bail;
use orderline_core::{Address, Customer, LedgerMirror, Order};
use uuid::Uuid;

pub type LedgerFields = BTreeMap<&'static str, String>;

pub fn order_fields(order: &Order, customer: &Customer, address: &Address) -> LedgerFields {
    let items = order
        .items
        .iter()
        .map(|item| format!("{} x{}", item.product_name, item.quantity))
        .collect::<Vec<_>>()
        .join(", ");
    let quantity: i32 = order.items.iter().map(|item| item.quantity).sum();

    let mut fields = LedgerFields::new();
    fields.insert("order_id", order.id.to_string());
    fields.insert("date", order.created_at.format("%Y-%m-%d %H:%M:%S").to_string());
    fields.insert("customer_name", customer.name.clone());
    fields.insert("phone", customer.phone_number.clone());
    fields.insert("email", customer.email.clone().unwrap_or_default());
    fields.insert("address", address.one_line());
    fields.insert("items", items);
    fields.insert("quantity", quantity.to_string());
    fields.insert("total", order.total_amount.round_dp(2).to_string());
    fields.insert("status", order.status.to_string());
    fields.insert("notes", order.notes.clone().unwrap_or_default());
    fields.insert("source", order.source.clone());
    fields
}

/// `"Customer Name"`, `"customer-name"` and `" customer_name "` all key to
/// `customer_name`.
pub fn header_key(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

pub fn map_to_headers(fields: &LedgerFields, headers: &[String]) -> Vec<String> {
    headers
        .iter()
        .map(|header| {
            fields
                .get(header_key(header).as_str())
                .cloned()
                .unwrap_or_default()
        })
        .collect()
}

/// Appends one row laid out against the sheet's current header row and
/// returns the values written.
pub async fn append_fields<M: LedgerMirror + ?Sized>(
    mirror: &M,
    sheet: &str,
    fields: &LedgerFields,
) -> anyhow::Result<Vec<String>> {
    let headers = mirror.header_row(sheet).await?;
    if headers.iter().all(|h| h.trim().is_empty()) {
        bail!("sheet '{sheet}' has no header row");
    }

    let row = map_to_headers(fields, &headers);
    mirror.append_row(sheet, row.clone()).await?;
    Ok(row)
}

/// Whether a data row under the sheet's order id column already carries
/// `order_id`. Sheets without such a column never match.
pub async fn contains_order<M: LedgerMirror + ?Sized>(
    mirror: &M,
    sheet: &str,
    order_id: Uuid,
) -> anyhow::Result<bool> {
    let rows = mirror.read_all_rows(sheet).await?;
    let Some((headers, data)) = rows.split_first() else {
        return Ok(false);
    };
    let Some(column) = headers.iter().position(|h| header_key(h) == "order_id") else {
        return Ok(false);
    };

    let wanted = order_id.to_string();
    Ok(data
        .iter()
        .any(|row| row.get(column).is_some_and(|cell| cell.trim() == wanted)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_keys_ignore_case_and_separators() {
        assert_eq!(header_key("Customer Name"), "customer_name");
        assert_eq!(header_key(" order-id "), "order_id");
        assert_eq!(header_key("PHONE"), "phone");
        assert_eq!(header_key("Delivery  Notes"), "delivery_notes");
    }

    #[test]
    fn values_follow_header_order() {
        let mut fields = LedgerFields::new();
        fields.insert("order_id", "o-1".to_string());
        fields.insert("phone", "60123456789".to_string());
        fields.insert("status", "pending".to_string());

        let headers = vec![
            "Status".to_string(),
            "Courier".to_string(),
            "Phone".to_string(),
            "Order ID".to_string(),
        ];

        assert_eq!(
            map_to_headers(&fields, &headers),
            vec!["pending", "", "60123456789", "o-1"]
        );
    }

    #[tokio::test]
    async fn appended_order_is_found_by_id() {
        let ledger = orderline_memstore::InMemoryLedger::with_sheet("Orders", &["Phone", "Order ID"]);
        let order_id = Uuid::new_v4();
        assert!(!contains_order(&ledger, "Orders", order_id).await.unwrap());

        let mut fields = LedgerFields::new();
        fields.insert("order_id", order_id.to_string());
        let row = append_fields(&ledger, "Orders", &fields).await.unwrap();

        assert_eq!(row, vec![String::new(), order_id.to_string()]);
        assert!(contains_order(&ledger, "Orders", order_id).await.unwrap());
        assert!(!contains_order(&ledger, "Orders", Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn missing_header_row_is_an_error() {
        let ledger = orderline_memstore::InMemoryLedger::default();
        let fields = LedgerFields::new();
        assert!(append_fields(&ledger, "Orders", &fields).await.is_err());
    }
}
