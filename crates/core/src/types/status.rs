//! Status and classification enums for the domain entities.
//!
//! Each lifecycle enum owns its transition table so every caller (HTTP
//! handlers, WebSocket commands, the CLI) applies the same rules.

use serde::{Deserialize, Serialize};

/// Macro to implement `Display`/`FromStr`/`as_str` over the snake_case
/// names used on the wire.
macro_rules! wire_names {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The snake_case wire name.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!(concat!("invalid ", stringify!($name), ": {}"), s)),
                }
            }
        }
    };
}

/// Account role with different permission levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Buys products, files support tickets, writes reviews.
    #[default]
    Customer,
    /// Lists products and manages their stock and orders.
    Seller,
    /// Support staff working the ticket queue.
    Agent,
    /// Full access including user management.
    Admin,
}

wire_names!(UserRole {
    Customer => "customer",
    Seller => "seller",
    Agent => "agent",
    Admin => "admin",
});

impl UserRole {
    /// Support staff: may see and work every ticket.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        matches!(self, Self::Agent | Self::Admin)
    }

    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }

    /// May list products and manage inventory.
    #[must_use]
    pub const fn can_sell(self) -> bool {
        matches!(self, Self::Seller | Self::Admin)
    }

    /// Roles a user may pick for themselves at sign-up.
    #[must_use]
    pub const fn self_assignable(self) -> bool {
        matches!(self, Self::Customer | Self::Seller)
    }
}

/// Support ticket lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

wire_names!(TicketStatus {
    Open => "open",
    InProgress => "in_progress",
    Resolved => "resolved",
    Closed => "closed",
});

impl TicketStatus {
    /// Whether a ticket may move from `self` to `next`.
    ///
    /// Staying in the same status is always allowed. `Closed` is terminal;
    /// a resolved ticket can be reopened.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self as u8 == next as u8 {
            return true;
        }
        match self {
            Self::Open => matches!(next, Self::InProgress | Self::Resolved | Self::Closed),
            Self::InProgress => matches!(next, Self::Open | Self::Resolved | Self::Closed),
            Self::Resolved => matches!(next, Self::Open | Self::Closed),
            Self::Closed => false,
        }
    }

    /// Open or in progress.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }
}

/// Support ticket urgency.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

wire_names!(TicketPriority {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

/// Support ticket topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    #[default]
    General,
    Billing,
    Technical,
    Account,
    Shipping,
}

wire_names!(TicketCategory {
    General => "general",
    Billing => "billing",
    Technical => "technical",
    Account => "account",
    Shipping => "shipping",
});

/// Marketplace order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

wire_names!(OrderStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// Whether an order may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Confirmed | Self::Cancelled),
            Self::Confirmed => matches!(next, Self::Shipped | Self::Cancelled),
            Self::Shipped => matches!(next, Self::Delivered),
            Self::Delivered | Self::Cancelled => false,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Moving into this status puts the ordered quantities back on the shelf.
    #[must_use]
    pub const fn releases_stock(self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Shipment tracking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShippingStatus {
    #[default]
    Pending,
    InTransit,
    Delivered,
    Returned,
}

wire_names!(ShippingStatus {
    Pending => "pending",
    InTransit => "in_transit",
    Delivered => "delivered",
    Returned => "returned",
});

/// Why a stock level changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    Restock,
    Sale,
    Return,
    Damage,
    Correction,
}

wire_names!(AdjustmentReason {
    Restock => "restock",
    Sale => "sale",
    Return => "return",
    Damage => "damage",
    Correction => "correction",
});

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TicketCreated,
    TicketUpdated,
    TicketComment,
    OrderCreated,
    OrderStatus,
    ShippingUpdate,
    NewMessage,
    LowStock,
    ReviewPosted,
}

wire_names!(NotificationKind {
    TicketCreated => "ticket_created",
    TicketUpdated => "ticket_updated",
    TicketComment => "ticket_comment",
    OrderCreated => "order_created",
    OrderStatus => "order_status",
    ShippingUpdate => "shipping_update",
    NewMessage => "new_message",
    LowStock => "low_stock",
    ReviewPosted => "review_posted",
});

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_role_permissions() {
        assert!(UserRole::Admin.is_staff());
        assert!(UserRole::Agent.is_staff());
        assert!(!UserRole::Seller.is_staff());
        assert!(UserRole::Seller.can_sell());
        assert!(!UserRole::Agent.can_sell());
        assert!(UserRole::Customer.self_assignable());
        assert!(!UserRole::Admin.self_assignable());
    }

    #[test]
    fn test_role_wire_names_round_trip() {
        for role in UserRole::ALL {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), *role);
            assert_eq!(
                serde_json::to_string(role).unwrap(),
                format!("\"{role}\"")
            );
        }
        assert!("root".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_ticket_transitions() {
        use TicketStatus::{Closed, InProgress, Open, Resolved};

        assert!(Open.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Resolved));
        assert!(Resolved.can_transition_to(Open));
        assert!(!Resolved.can_transition_to(InProgress));
        assert!(!Closed.can_transition_to(Open));
        assert!(Closed.can_transition_to(Closed));
    }

    #[test]
    fn test_order_transitions() {
        use OrderStatus::{Cancelled, Confirmed, Delivered, Pending, Shipped};

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Shipped));
        assert!(Confirmed.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(Cancelled.is_terminal());
    }

    #[test]
    fn test_in_progress_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TicketStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&ShippingStatus::InTransit).unwrap(),
            "\"in_transit\""
        );
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TicketPriority::Urgent > TicketPriority::High);
        assert!(TicketPriority::Low < TicketPriority::Medium);
    }
}
