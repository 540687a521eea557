use orderline_core::{
    Address, AddressInput, AddressStore, Customer, CustomerInput, CustomerStore, NewAddress,
    NewCustomer, OrderError, OrderStatus, PhoneResolver,
};
use uuid::Uuid;

use crate::error::PipelineError;

pub(crate) fn parse_status(raw: Option<&str>) -> Result<OrderStatus, OrderError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(status) => status.parse(),
        None => Ok(OrderStatus::default()),
    }
}

pub(crate) fn new_customer(
    resolver: &PhoneResolver,
    input: &CustomerInput,
) -> Result<NewCustomer, OrderError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(OrderError::validation("customer name is required"));
    }

    let phone_number = resolver.normalize(&input.phone_number);
    if phone_number.is_empty() {
        return Err(OrderError::validation(format!(
            "customer phone number '{}' has no digits",
            input.phone_number
        )));
    }

    Ok(NewCustomer {
        name: name.to_string(),
        phone_number,
        email: input
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(str::to_string),
    })
}

/// The customer id is filled in once the customer has been upserted.
pub(crate) fn new_address(id: Uuid, input: &AddressInput) -> Result<NewAddress, OrderError> {
    for (field, value) in [
        ("line1", &input.line1),
        ("city", &input.city),
        ("postcode", &input.postcode),
    ] {
        if value.trim().is_empty() {
            return Err(OrderError::validation(format!("address {field} is required")));
        }
    }

    Ok(NewAddress {
        id,
        customer_id: Uuid::nil(),
        line1: input.line1.trim().to_string(),
        line2: input.line2.clone(),
        city: input.city.trim().to_string(),
        state: input.state.clone(),
        postcode: input.postcode.trim().to_string(),
        country: input.country.trim().to_string(),
    })
}

pub(crate) async fn upsert_customer<S: CustomerStore + ?Sized>(
    store: &S,
    customer: NewCustomer,
) -> Result<Customer, PipelineError> {
    store
        .upsert_customer(customer)
        .await
        .map_err(PipelineError::Store)
}

pub(crate) async fn create_address<S: AddressStore + ?Sized>(
    store: &S,
    address: NewAddress,
) -> Result<Address, PipelineError> {
    store
        .create_address(address)
        .await
        .map_err(PipelineError::Store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_phone_is_normalized() {
        let input = CustomerInput {
            name: " Ali ".to_string(),
            phone_number: "012-345 6789".to_string(),
            email: Some("  ".to_string()),
        };
        let customer = new_customer(&PhoneResolver::default(), &input).unwrap();

        assert_eq!(customer.name, "Ali");
        assert_eq!(customer.phone_number, "60123456789");
        assert_eq!(customer.email, None);
    }

    #[test]
    fn missing_fields_are_rejected() {
        let input = CustomerInput {
            name: "Ali".to_string(),
            phone_number: "n/a".to_string(),
            email: None,
        };
        assert!(new_customer(&PhoneResolver::default(), &input).is_err());

        let address = AddressInput {
            line1: "1 Jalan Ampang".to_string(),
            line2: None,
            city: " ".to_string(),
            state: None,
            postcode: "50450".to_string(),
            country: "Malaysia".to_string(),
        };
        assert!(new_address(Uuid::new_v4(), &address).is_err());
    }

    #[test]
    fn blank_status_defaults_to_pending() {
        assert_eq!(parse_status(None).unwrap(), OrderStatus::Pending);
        assert_eq!(parse_status(Some(" ")).unwrap(), OrderStatus::Pending);
        assert_eq!(parse_status(Some("paid")).unwrap(), OrderStatus::Confirmed);
    }
}
