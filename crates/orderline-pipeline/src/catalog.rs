use orderline_core::{ItemInput, OrderError, OrderItem, Product, ProductStore};
use uuid::Uuid;

/// How to treat an item whose product cannot be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductMatch {
    /// Keep a line whose name is unmatched, with no product id. An unknown
    /// explicit id is still rejected.
    Lenient,
    /// Reject the order.
    Strict,
}

/// Snapshot of the product table used to turn inbound lines into order items.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: Vec<Product>,
}

impl ProductCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    pub async fn load<S: ProductStore + ?Sized>(store: &S) -> anyhow::Result<Self> {
        Ok(Self::new(store.list_products().await?))
    }

    /// First product whose name equals `name` ignoring case and surrounding
    /// whitespace.
    pub fn find_by_name(&self, name: &str) -> Option<&Product> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.products
            .iter()
            .find(|product| product.name.trim().to_lowercase() == wanted)
    }

    pub fn find_by_id(&self, id: Uuid) -> Option<&Product> {
        self.products.iter().find(|product| product.id == id)
    }

    pub fn resolve_items(
        &self,
        items: &[ItemInput],
        mode: ProductMatch,
    ) -> Result<Vec<OrderItem>, OrderError> {
        if items.is_empty() {
            return Err(OrderError::validation("order has no items"));
        }

        items.iter().map(|item| self.resolve_item(item, mode)).collect()
    }

    fn resolve_item(&self, item: &ItemInput, mode: ProductMatch) -> Result<OrderItem, OrderError> {
        if item.quantity <= 0 {
            return Err(OrderError::validation(format!(
                "quantity must be positive, got {}",
                item.quantity
            )));
        }

        let name = item
            .product_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());

        let found = match (item.product_id, name) {
            (Some(id), _) => self.find_by_id(id),
            (None, Some(name)) => self.find_by_name(name),
            (None, None) => {
                return Err(OrderError::validation(
                    "order item needs a product_id or product_name",
                ));
            }
        };

        if let Some(product) = found {
            return Ok(OrderItem {
                product_id: Some(product.id),
                product_name: product.name.clone(),
                quantity: item.quantity,
                unit_price: Some(product.price),
            });
        }

        // An explicit id must exist in either mode.
        if let Some(id) = item.product_id {
            return Err(OrderError::UnknownProduct(id.to_string()));
        }

        let name = name.unwrap_or_default();
        match mode {
            ProductMatch::Strict => Err(OrderError::UnknownProduct(name.to_string())),
            ProductMatch::Lenient => Ok(OrderItem {
                product_id: None,
                product_name: name.to_string(),
                quantity: item.quantity,
                unit_price: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn catalog() -> ProductCatalog {
        ProductCatalog::new(vec![
            Product {
                id: Uuid::new_v4(),
                name: "Kopi Kampung".to_string(),
                sku: Some("KK-1".to_string()),
                price: Decimal::new(1500, 2),
            },
            Product {
                id: Uuid::new_v4(),
                name: "kopi kampung".to_string(),
                sku: Some("KK-2".to_string()),
                price: Decimal::new(1800, 2),
            },
        ])
    }

    fn by_name(name: &str, quantity: i32) -> ItemInput {
        ItemInput {
            product_id: None,
            product_name: Some(name.to_string()),
            quantity,
        }
    }

    #[test]
    fn name_match_is_case_insensitive_and_takes_first() {
        let catalog = catalog();
        let items = catalog
            .resolve_items(&[by_name("  KOPI kampung ", 2)], ProductMatch::Strict)
            .unwrap();

        assert_eq!(items[0].product_name, "Kopi Kampung");
        assert_eq!(items[0].unit_price, Some(Decimal::new(1500, 2)));
    }

    #[test]
    fn lenient_mode_keeps_unmatched_name_without_id() {
        let items = catalog()
            .resolve_items(&[by_name("Teh Tarik", 1)], ProductMatch::Lenient)
            .unwrap();

        assert_eq!(items[0].product_id, None);
        assert_eq!(items[0].product_name, "Teh Tarik");
        assert_eq!(items[0].unit_price, None);
    }

    #[test]
    fn lenient_mode_rejects_unknown_explicit_id() {
        let id = Uuid::new_v4();
        let unknown_id = ItemInput {
            product_id: Some(id),
            product_name: Some("Teh Tarik".to_string()),
            quantity: 1,
        };

        let err = catalog()
            .resolve_items(&[unknown_id], ProductMatch::Lenient)
            .unwrap_err();

        assert!(matches!(err, OrderError::UnknownProduct(ref reference) if *reference == id.to_string()));
        assert!(err.is_permanent());
    }

    #[test]
    fn strict_mode_rejects_unmatched_reference() {
        let err = catalog()
            .resolve_items(&[by_name("Teh Tarik", 1)], ProductMatch::Strict)
            .unwrap_err();
        assert!(matches!(err, OrderError::UnknownProduct(ref name) if name == "Teh Tarik"));

        let unknown_id = ItemInput {
            product_id: Some(Uuid::new_v4()),
            product_name: None,
            quantity: 1,
        };
        assert!(matches!(
            catalog().resolve_items(&[unknown_id], ProductMatch::Strict),
            Err(OrderError::UnknownProduct(_))
        ));
    }

    #[test]
    fn bad_lines_are_validation_errors() {
        let catalog = catalog();
        assert!(matches!(
            catalog.resolve_items(&[], ProductMatch::Lenient),
            Err(OrderError::Validation(_))
        ));
        assert!(matches!(
            catalog.resolve_items(&[by_name("Kopi Kampung", 0)], ProductMatch::Lenient),
            Err(OrderError::Validation(_))
        ));
        let empty = ItemInput {
            product_id: None,
            product_name: Some("  ".to_string()),
            quantity: 1,
        };
        assert!(matches!(
            catalog.resolve_items(&[empty], ProductMatch::Lenient),
            Err(OrderError::Validation(_))
        ));
    }
}
