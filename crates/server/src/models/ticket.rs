//! Support tickets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradepost_core::{
    TicketCategory, TicketCommentId, TicketId, TicketPriority, TicketStatus, UserId,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub requester_id: UserId,
    pub assignee_id: Option<UserId>,
    pub subject: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub category: TicketCategory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the ticket last entered `resolved`, cleared on reopen.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// The requester and the assignee, if any.
    pub fn participants(&self) -> impl Iterator<Item = UserId> {
        std::iter::once(self.requester_id).chain(self.assignee_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketComment {
    pub id: TicketCommentId,
    pub ticket_id: TicketId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
