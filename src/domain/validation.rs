//! Field-level validation of decoded orders.
//!
//! Validation never fails: it returns the (possibly empty) set of problems
//! found. Nested blocks report their own fields through [`Delivery::problems`]
//! and [`Payment::problems`] and contribute a single aggregated marker to the
//! order-level set.

use std::{collections::HashMap, fmt};

use super::order::{Delivery, Order, Payment};

/// Unordered set of `(field, message)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Problems(HashMap<&'static str, &'static str>);

impl Problems {
    pub fn new() -> Self {
        Self::default()
    }

    fn require(&mut self, ok: bool, field: &'static str, message: &'static str) {
        if !ok {
            self.0.insert(field, message);
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn message(&self, field: &str) -> Option<&'static str> {
        self.0.get(field).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.0.iter().map(|(field, message)| (*field, *message))
    }
}

impl fmt::Display for Problems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_unstable();
        for (index, (field, message)) in entries.into_iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
        }
        Ok(())
    }
}

/// Validate an order; shorthand for [`Order::problems`].
pub fn validate(order: &Order) -> Problems {
    order.problems()
}

impl Order {
    pub fn problems(&self) -> Problems {
        let mut problems = Problems::new();

        problems.require(
            !self.uid.is_blank(),
            "order_uid",
            "Order UID is required and must be a valid UUID",
        );
        problems.require(
            !self.track_number.is_empty(),
            "track_number",
            "Track Number is required",
        );
        problems.require(!self.entry.is_empty(), "entry", "Entry is required");
        problems.require(
            !self.items.is_empty(),
            "items",
            "At least one item is required",
        );
        problems.require(!self.locale.is_empty(), "locale", "Locale is required");
        problems.require(
            !self.customer_id.is_empty(),
            "customer_id",
            "Customer ID is required",
        );
        problems.require(
            !self.delivery_service.is_empty(),
            "delivery_service",
            "Delivery Service is required",
        );
        problems.require(
            !self.shard_key.is_empty(),
            "shardkey",
            "ShardKey is required",
        );
        problems.require(self.sm_id > 0, "sm_id", "SmID must be a positive integer");
        problems.require(
            self.has_creation_time(),
            "date_created",
            "Date Created is required",
        );
        problems.require(
            self.delivery.problems().is_empty(),
            "delivery",
            "Delivery attributes are invalid",
        );
        problems.require(
            self.payment.problems().is_empty(),
            "payment",
            "Payment attributes are invalid",
        );

        problems
    }

    pub fn is_valid(&self) -> bool {
        self.problems().is_empty()
    }
}

impl Delivery {
    pub fn problems(&self) -> Problems {
        let mut problems = Problems::new();
        problems.require(!self.name.is_empty(), "name", "Name is required");
        problems.require(!self.phone.is_empty(), "phone", "Phone is required");
        problems.require(!self.zip.is_empty(), "zip", "Zip is required");
        problems.require(!self.city.is_empty(), "city", "City is required");
        problems.require(!self.address.is_empty(), "address", "Address is required");
        problems.require(!self.region.is_empty(), "region", "Region is required");
        problems.require(!self.email.is_empty(), "email", "Email is required");
        problems
    }
}

impl Payment {
    pub fn problems(&self) -> Problems {
        let mut problems = Problems::new();
        problems.require(
            !self.transaction.is_empty(),
            "transaction",
            "Transaction ID is required and must be a valid UUID",
        );
        problems.require(!self.currency.is_empty(), "currency", "Currency is required");
        problems.require(!self.provider.is_empty(), "provider", "Provider is required");
        problems.require(
            self.amount > 0,
            "amount",
            "Amount must be a positive integer",
        );
        problems
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::domain::order::{Item, OrderUid};

    fn valid_order() -> Order {
        Order {
            uid: OrderUid::new("valid-uuid"),
            track_number: "123456".to_string(),
            entry: "entry".to_string(),
            delivery: Delivery {
                name: "John Doe".to_string(),
                phone: "1234567890".to_string(),
                zip: "12345".to_string(),
                city: "City".to_string(),
                address: "Address".to_string(),
                region: "Region".to_string(),
                email: "email@example.com".to_string(),
            },
            payment: Payment {
                transaction: "valid-uuid".to_string(),
                currency: "USD".to_string(),
                provider: "provider".to_string(),
                amount: 100,
                ..Default::default()
            },
            items: vec![Item {
                chrt_id: 1,
                price: 100,
                rid: "rid".to_string(),
                name: "name".to_string(),
                ..Default::default()
            }],
            locale: "en".to_string(),
            customer_id: "customer-id".to_string(),
            delivery_service: "delivery-service".to_string(),
            shard_key: "shardkey".to_string(),
            sm_id: 1,
            date_created: Some(OffsetDateTime::now_utc()),
            ..Default::default()
        }
    }

    #[test]
    fn valid_order_has_no_problems() {
        let problems = validate(&valid_order());
        assert!(problems.is_empty(), "unexpected problems: {problems}");
    }

    #[test]
    fn empty_order_reports_every_field() {
        let problems = Order::default().problems();

        for field in [
            "order_uid",
            "track_number",
            "entry",
            "items",
            "locale",
            "customer_id",
            "delivery_service",
            "shardkey",
            "sm_id",
            "date_created",
            "delivery",
            "payment",
        ] {
            assert!(problems.contains(field), "missing marker for {field}");
        }
        assert_eq!(problems.len(), 12);
    }

    #[test]
    fn nested_email_is_aggregated_under_delivery() {
        let mut order = valid_order();
        order.uid = OrderUid::default();
        order.locale.clear();
        order.delivery.email.clear();

        let problems = order.problems();

        assert_eq!(problems.len(), 3);
        assert!(problems.contains("order_uid"));
        assert!(problems.contains("locale"));
        assert!(problems.contains("delivery"));
        assert!(!problems.contains("email"));

        let nested = order.delivery.problems();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested.message("email"), Some("Email is required"));
    }

    #[test]
    fn non_positive_numbers_are_rejected() {
        let mut order = valid_order();
        order.sm_id = -1;
        order.payment.amount = 0;

        let problems = order.problems();

        assert_eq!(problems.len(), 2);
        assert!(problems.contains("sm_id"));
        assert!(problems.contains("payment"));
        assert!(order.payment.problems().contains("amount"));
    }

    #[test]
    fn whitespace_uid_counts_as_missing() {
        let mut order = valid_order();
        order.uid = OrderUid::new("   ");
        assert!(order.problems().contains("order_uid"));
    }

    #[test]
    fn display_is_sorted_by_field() {
        let mut order = valid_order();
        order.locale.clear();
        order.entry.clear();

        assert_eq!(
            order.problems().to_string(),
            "entry: Entry is required; locale: Locale is required"
        );
    }
}
