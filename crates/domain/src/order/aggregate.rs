//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::{Money, OrderError, OrderLine, OrderStatus, ShippingDetails};

/// Order aggregate root.
///
/// Built exactly once from a validated cart. After creation only the status
/// moves, and only forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    id: OrderId,

    /// Registered owner; `None` for guest checkout.
    user_id: Option<UserId>,

    /// When the order was placed.
    created_at: DateTime<Utc>,

    /// Current status of the order.
    status: OrderStatus,

    /// Delivery details as entered at checkout.
    shipping: ShippingDetails,

    /// Frozen lines, in checkout order.
    lines: Vec<OrderLine>,

    /// Sum of line subtotals.
    total_amount: Money,
}

// Construction
impl Order {
    /// Places a new `Pending` order.
    ///
    /// Fails if there are no lines, a line has zero quantity or a negative
    /// price, or the total does not fit in the money representation.
    pub fn place(
        user_id: Option<UserId>,
        shipping: ShippingDetails,
        lines: Vec<OrderLine>,
    ) -> Result<Self, OrderError> {
        Self::from_parts(
            OrderId::new(),
            user_id,
            Utc::now(),
            OrderStatus::Pending,
            shipping,
            lines,
        )
    }

    /// Rebuilds an order from stored parts, re-checking every invariant.
    pub fn from_parts(
        id: OrderId,
        user_id: Option<UserId>,
        created_at: DateTime<Utc>,
        status: OrderStatus,
        shipping: ShippingDetails,
        lines: Vec<OrderLine>,
    ) -> Result<Self, OrderError> {
        let total_amount = Self::total_of(&lines)?;

        Ok(Self {
            id,
            user_id,
            created_at,
            status,
            shipping,
            lines,
            total_amount,
        })
    }

    /// Validates `lines` and returns their exact total.
    pub fn total_of(lines: &[OrderLine]) -> Result<Money, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::NoLines);
        }

        let mut total = Money::zero();
        for line in lines {
            if line.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: line.product_id.to_string(),
                });
            }
            if line.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    product_id: line.product_id.to_string(),
                    price: line.unit_price.cents(),
                });
            }

            total = total
                .checked_add(line.subtotal()?)
                .ok_or(OrderError::TotalOverflow)?;
        }

        Ok(total)
    }
}

// Query methods
impl Order {
    /// Returns the order ID.
    pub fn id(&self) -> OrderId {
        self.id
    }

    /// Returns the owning user, if any.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// Returns the creation timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the current status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns the shipping snapshot.
    pub fn shipping(&self) -> &ShippingDetails {
        &self.shipping
    }

    /// Returns the order lines in checkout order.
    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Returns the total quantity of all lines.
    pub fn total_quantity(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Returns the total amount.
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    /// Returns true if the order was placed without a registered user.
    pub fn is_guest(&self) -> bool {
        self.user_id.is_none()
    }
}

// Status transitions, driven by fulfilment outside this crate.
impl Order {
    /// Moves a pending order to `Shipped`.
    pub fn mark_shipped(&mut self) -> Result<(), OrderError> {
        if !self.status.can_ship() {
            return Err(OrderError::InvalidStatusTransition {
                current: self.status,
                action: "ship",
            });
        }
        self.status = OrderStatus::Shipped;
        Ok(())
    }

    /// Moves a shipped order to `Delivered`.
    pub fn mark_delivered(&mut self) -> Result<(), OrderError> {
        if !self.status.can_deliver() {
            return Err(OrderError::InvalidStatusTransition {
                current: self.status,
                action: "deliver",
            });
        }
        self.status = OrderStatus::Delivered;
        Ok(())
    }
}
