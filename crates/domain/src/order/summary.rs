//! Notification payload for a placed order.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::{Money, Order};

/// What the confirmation channel needs to know about a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub user_id: Option<UserId>,
    pub recipient_name: String,
    pub recipient_email: String,
    pub total_amount: Money,
    pub line_count: usize,
    pub total_quantity: u64,
    pub placed_at: DateTime<Utc>,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id(),
            user_id: order.user_id(),
            recipient_name: order.shipping().recipient_name.clone(),
            recipient_email: order.shipping().email.clone(),
            total_amount: order.total_amount(),
            line_count: order.lines().len(),
            total_quantity: order.total_quantity(),
            placed_at: order.created_at(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{OrderLine, ShippingDetails};

    #[test]
    fn summary_copies_order_fields() {
        let shipping = ShippingDetails::new("Ada", "ada@example.com", "1 Road", "Town", "000", "GB");
        let lines = vec![
            OrderLine::new("SKU-001", "Widget", "", Money::from_cents(999), 2),
            OrderLine::new("SKU-002", "Gadget", "", Money::from_cents(500), 1),
        ];
        let order = Order::place(None, shipping, lines).unwrap();

        let summary = OrderSummary::from(&order);

        assert_eq!(summary.order_id, order.id());
        assert_eq!(summary.recipient_email, "ada@example.com");
        assert_eq!(summary.total_amount, Money::from_cents(2498));
        assert_eq!(summary.line_count, 2);
        assert_eq!(summary.total_quantity, 3);
    }
}
