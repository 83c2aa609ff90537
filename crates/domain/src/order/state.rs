//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of a placed order.
///
/// Status transitions are forward only:
/// ```text
/// Pending ──► Shipped ──► Delivered
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order has been placed and stock decremented.
    #[default]
    Pending,

    /// Order has left the warehouse.
    Shipped,

    /// Order has reached the customer (terminal state).
    Delivered,
}

impl OrderStatus {
    /// Returns true if the order can be shipped in this status.
    pub fn can_ship(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can be delivered in this status.
    pub fn can_deliver(&self) -> bool {
        matches!(self, OrderStatus::Shipped)
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a stored status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "SHIPPED" => Ok(OrderStatus::Shipped),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_only_pending_can_ship() {
        assert!(OrderStatus::Pending.can_ship());
        assert!(!OrderStatus::Shipped.can_ship());
        assert!(!OrderStatus::Delivered.can_ship());
    }

    #[test]
    fn test_only_shipped_can_deliver() {
        assert!(!OrderStatus::Pending.can_deliver());
        assert!(OrderStatus::Shipped.can_deliver());
        assert!(!OrderStatus::Delivered.can_deliver());
    }

    #[test]
    fn test_terminal_status() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
        assert!(OrderStatus::Delivered.is_terminal());
    }

    #[test]
    fn test_display_and_parse() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            assert_eq!(status.to_string().parse::<OrderStatus>(), Ok(status));
        }
        assert!("CANCELLED".parse::<OrderStatus>().is_err());
    }
}
