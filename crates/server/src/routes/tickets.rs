//! Support tickets.
//!
//! Requesters see and edit their own tickets; agents and admins ("staff")
//! see all of them and drive the workflow. Status changes follow
//! [`TicketStatus::can_transition_to`].

use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tradepost_core::{
    NotificationKind, TicketCategory, TicketCommentId, TicketId, TicketPriority, TicketStatus,
    UserId,
};

use crate::error::{AppError, Result, Validator};
use crate::extract::{Json, Page, Pagination, Path, Query};
use crate::middleware::{RequireAdmin, RequireAuth, RequireStaff};
use crate::models::{Ticket, TicketComment, User};
use crate::services::notifier::{self, Draft};
use crate::state::AppState;
use crate::store::Tables;

const MAX_SUBJECT_LENGTH: usize = 200;
const MAX_BODY_LENGTH: usize = 5000;

#[derive(Debug, Default, Deserialize)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub category: Option<TicketCategory>,
    pub assignee_id: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub subject: String,
    pub description: String,
    #[serde(default)]
    pub priority: TicketPriority,
    #[serde(default)]
    pub category: TicketCategory,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTicketRequest {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub category: Option<TicketCategory>,
    /// `null` unassigns.
    #[serde(default, deserialize_with = "crate::extract::double_option")]
    pub assignee_id: Option<Option<UserId>>,
}

impl UpdateTicketRequest {
    const fn touches_workflow(&self) -> bool {
        self.status.is_some()
            || self.priority.is_some()
            || self.category.is_some()
            || self.assignee_id.is_some()
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub requester_name: Option<String>,
    pub assignee_name: Option<String>,
    pub comment_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: TicketComment,
    pub author_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    pub open_unassigned: usize,
}

fn display_name(tables: &Tables, id: UserId) -> Option<String> {
    tables.get::<User>(id).map(|u| u.display_name.clone())
}

fn view(tables: &Tables, ticket: &Ticket) -> TicketView {
    TicketView {
        ticket: ticket.clone(),
        requester_name: display_name(tables, ticket.requester_id),
        assignee_name: ticket.assignee_id.and_then(|id| display_name(tables, id)),
        comment_count: tables
            .all::<TicketComment>()
            .filter(|c| c.ticket_id == ticket.id)
            .count(),
    }
}

fn staff_ids(tables: &Tables) -> Vec<UserId> {
    tables
        .all::<User>()
        .filter(|u| u.role.is_staff())
        .map(|u| u.id)
        .collect()
}

/// A ticket the user may see: its requester, or any staff member.
fn visible_ticket<'t>(tables: &'t Tables, id: TicketId, user: &User) -> Result<&'t Ticket> {
    let ticket = tables
        .get::<Ticket>(id)
        .ok_or_else(|| AppError::not_found("Ticket"))?;
    if ticket.requester_id != user.id && !user.role.is_staff() {
        return Err(AppError::forbidden());
    }
    Ok(ticket)
}

/// List tickets, newest first.
///
/// GET /api/tickets
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(filter): Query<TicketFilter>,
    Query(page): Query<Pagination>,
) -> Json<Page<TicketView>> {
    let staff = user.role.is_staff();
    let mut tickets: Vec<TicketView> = state
        .store()
        .read(|t| {
            t.all::<Ticket>()
                .filter(|k| staff || k.requester_id == user.id)
                .filter(|k| filter.status.is_none_or(|s| k.status == s))
                .filter(|k| filter.priority.is_none_or(|p| k.priority == p))
                .filter(|k| filter.category.is_none_or(|c| k.category == c))
                .filter(|k| filter.assignee_id.is_none_or(|a| k.assignee_id == Some(a)))
                .map(|k| view(t, k))
                .collect()
        })
        .await;

    tickets.sort_by(|a, b| b.ticket.created_at.cmp(&a.ticket.created_at));
    Json(page.paginate(tickets))
}

/// Open a ticket and notify staff.
///
/// POST /api/tickets
///
/// # Errors
///
/// Returns 400 for a missing subject or description.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<TicketView>)> {
    let mut v = Validator::new();
    v.length(&body.subject, "subject", 1, MAX_SUBJECT_LENGTH);
    v.length(&body.description, "description", 1, MAX_BODY_LENGTH);
    v.finish()?;

    let now = Utc::now();
    let ticket = Ticket {
        id: TicketId::new(),
        requester_id: user.id,
        assignee_id: None,
        subject: body.subject.trim().to_string(),
        description: body.description.trim().to_string(),
        status: TicketStatus::Open,
        priority: body.priority,
        category: body.category,
        created_at: now,
        updated_at: now,
        resolved_at: None,
    };

    let (created, notifications) = state
        .store()
        .write(|tx| {
            tx.put(ticket.clone());

            let recipients: Vec<UserId> = staff_ids(tx.tables())
                .into_iter()
                .filter(|id| *id != user.id)
                .collect();
            let draft = Draft::new(
                NotificationKind::TicketCreated,
                format!("New {} ticket", ticket.priority),
                ticket.subject.clone(),
            )
            .with_data(serde_json::json!({ "ticket_id": ticket.id }));
            let notifications = notifier::stage(tx, recipients, &draft);

            Ok::<_, AppError>((view(tx.tables(), &ticket), notifications))
        })
        .await?;

    state.notifier().deliver(&notifications);
    tracing::info!(ticket_id = %ticket.id, "Ticket created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// Ticket detail.
///
/// GET /api/tickets/{id}
///
/// # Errors
///
/// Returns 403 unless requester or staff.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<TicketId>,
) -> Result<Json<TicketView>> {
    state
        .store()
        .read(|t| visible_ticket(t, id, &user).map(|k| view(t, k)))
        .await
        .map(Json)
}

/// Validate a requested update against the current ticket and describe it.
fn plan_update(
    tables: &Tables,
    ticket: &Ticket,
    actor: &User,
    body: &UpdateTicketRequest,
) -> Result<Vec<String>> {
    let staff = actor.role.is_staff();
    if ticket.requester_id != actor.id && !staff {
        return Err(AppError::forbidden());
    }
    if body.touches_workflow() && !staff {
        return Err(AppError::Forbidden(
            "Only staff can change status, priority, category, or assignee".to_string(),
        ));
    }
    if ticket.status == TicketStatus::Closed {
        return Err(AppError::Conflict("Ticket is closed".to_string()));
    }

    let mut v = Validator::new();
    if let Some(subject) = &body.subject {
        v.length(subject, "subject", 1, MAX_SUBJECT_LENGTH);
    }
    if let Some(description) = &body.description {
        v.length(description, "description", 1, MAX_BODY_LENGTH);
    }
    if let Some(Some(assignee)) = body.assignee_id {
        let is_staff = tables
            .get::<User>(assignee)
            .is_some_and(|u| u.role.is_staff());
        v.check(is_staff, "assignee_id", "must be an agent or admin");
    }
    v.finish()?;

    let mut changes = Vec::new();
    if let Some(next) = body.status {
        if !ticket.status.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "Cannot move ticket from {} to {next}",
                ticket.status
            )));
        }
        if next != ticket.status {
            changes.push(format!("Status changed to {next}"));
        }
    }
    if let Some(priority) = body.priority.filter(|p| *p != ticket.priority) {
        changes.push(format!("Priority changed to {priority}"));
    }
    if let Some(category) = body.category.filter(|c| *c != ticket.category) {
        changes.push(format!("Category changed to {category}"));
    }
    if let Some(assignee) = body.assignee_id.filter(|a| *a != ticket.assignee_id) {
        changes.push(match assignee.and_then(|id| display_name(tables, id)) {
            Some(name) => format!("Assigned to {name}"),
            None => "Unassigned".to_string(),
        });
    }
    if body.subject.is_some() || body.description.is_some() {
        changes.push("Details edited".to_string());
    }

    Ok(changes)
}

/// Update a ticket.
///
/// PUT /api/tickets/{id}
///
/// # Errors
///
/// Returns 403 for non-participants or non-staff workflow changes, 409 for
/// a closed ticket or a disallowed status transition.
#[instrument(skip_all, fields(ticket_id = %id, user_id = %actor.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(actor): RequireAuth,
    Path(id): Path<TicketId>,
    Json(body): Json<UpdateTicketRequest>,
) -> Result<Json<TicketView>> {
    let (updated, notifications) = state
        .store()
        .write(|tx| {
            let ticket = tx
                .get::<Ticket>(id)
                .cloned()
                .ok_or_else(|| AppError::not_found("Ticket"))?;
            let changes = plan_update(tx.tables(), &ticket, &actor, &body)?;

            let now = Utc::now();
            let updated = tx
                .update::<Ticket>(id, |k| {
                    if let Some(subject) = &body.subject {
                        k.subject = subject.trim().to_string();
                    }
                    if let Some(description) = &body.description {
                        k.description = description.trim().to_string();
                    }
                    if let Some(status) = body.status {
                        if status == TicketStatus::Resolved && k.status != status {
                            k.resolved_at = Some(now);
                        } else if status.is_active() {
                            k.resolved_at = None;
                        }
                        k.status = status;
                    }
                    if let Some(priority) = body.priority {
                        k.priority = priority;
                    }
                    if let Some(category) = body.category {
                        k.category = category;
                    }
                    if let Some(assignee) = body.assignee_id {
                        k.assignee_id = assignee;
                    }
                    k.updated_at = now;
                })
                .cloned()
                .ok_or_else(|| AppError::not_found("Ticket"))?;

            let notifications = if changes.is_empty() {
                Vec::new()
            } else {
                let recipients = updated.participants().filter(|uid| *uid != actor.id);
                let draft = Draft::new(
                    NotificationKind::TicketUpdated,
                    format!("Ticket updated: {}", updated.subject),
                    changes.join("; "),
                )
                .with_data(serde_json::json!({ "ticket_id": id }));
                notifier::stage(tx, recipients.collect::<Vec<_>>(), &draft)
            };

            Ok::<_, AppError>((view(tx.tables(), &updated), notifications))
        })
        .await?;

    state.notifier().deliver(&notifications);
    Ok(Json(updated))
}

/// Delete a ticket and its comments.
///
/// DELETE /api/tickets/{id}
///
/// # Errors
///
/// Returns 404 if the ticket does not exist.
#[instrument(skip_all, fields(ticket_id = %id))]
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<TicketId>,
) -> Result<StatusCode> {
    state
        .store()
        .write(|tx| {
            tx.remove::<Ticket>(id)
                .ok_or_else(|| AppError::not_found("Ticket"))?;
            tx.remove_where::<TicketComment>(|c| c.ticket_id == id);
            Ok::<_, AppError>(())
        })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Comments on a ticket, oldest first.
///
/// GET /api/tickets/{id}/comments
///
/// # Errors
///
/// Returns 403 unless requester or staff.
pub async fn comments(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<TicketId>,
    Query(page): Query<Pagination>,
) -> Result<Json<Page<CommentView>>> {
    let mut comments = state
        .store()
        .read(|t| {
            visible_ticket(t, id, &user)?;
            Ok::<_, AppError>(
                t.all::<TicketComment>()
                    .filter(|c| c.ticket_id == id)
                    .map(|c| CommentView {
                        comment: c.clone(),
                        author_name: display_name(t, c.author_id),
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .await?;

    comments.sort_by(|a, b| a.comment.created_at.cmp(&b.comment.created_at));
    Ok(Json(page.paginate(comments)))
}

/// Who hears about a new comment: the other side of the conversation.
fn comment_recipients(tables: &Tables, ticket: &Ticket, author: &User) -> Vec<UserId> {
    let mut recipients = Vec::new();
    if author.id == ticket.requester_id {
        match ticket.assignee_id {
            Some(assignee) => recipients.push(assignee),
            None => recipients.extend(staff_ids(tables)),
        }
    } else {
        recipients.extend(ticket.participants());
    }
    recipients.retain(|id| *id != author.id);
    recipients
}

/// Comment on a ticket.
///
/// POST /api/tickets/{id}/comments
///
/// # Errors
///
/// Returns 403 unless requester or staff, 409 on a closed ticket.
#[instrument(skip_all, fields(ticket_id = %id, user_id = %user.id))]
pub async fn add_comment(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<TicketId>,
    Json(body): Json<CommentRequest>,
) -> Result<(StatusCode, Json<CommentView>)> {
    let mut v = Validator::new();
    v.length(&body.body, "body", 1, MAX_BODY_LENGTH);
    v.finish()?;

    let (comment, notifications) = state
        .store()
        .write(|tx| {
            let ticket = visible_ticket(tx.tables(), id, &user)?.clone();
            if ticket.status == TicketStatus::Closed {
                return Err(AppError::Conflict("Ticket is closed".to_string()));
            }

            let now = Utc::now();
            let comment = TicketComment {
                id: TicketCommentId::new(),
                ticket_id: id,
                author_id: user.id,
                body: body.body.trim().to_string(),
                created_at: now,
            };
            tx.put(comment.clone());
            tx.update::<Ticket>(id, |k| k.updated_at = now);

            let recipients = comment_recipients(tx.tables(), &ticket, &user);
            let draft = Draft::new(
                NotificationKind::TicketComment,
                format!("New comment on: {}", ticket.subject),
                comment.body.clone(),
            )
            .with_data(serde_json::json!({
                "ticket_id": id,
                "comment_id": comment.id,
            }));
            let notifications = notifier::stage(tx, recipients, &draft);

            Ok((
                CommentView {
                    comment,
                    author_name: Some(user.display_name.clone()),
                },
                notifications,
            ))
        })
        .await?;

    state.notifier().deliver(&notifications);
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Ticket counts for the support dashboard.
///
/// GET /api/tickets/stats
pub async fn stats(
    State(state): State<AppState>,
    RequireStaff(_staff): RequireStaff,
) -> Json<TicketStats> {
    let stats = state
        .store()
        .read(|t| {
            let mut by_status: BTreeMap<String, usize> = TicketStatus::ALL
                .iter()
                .map(|s| (s.to_string(), 0))
                .collect();
            let mut by_priority: BTreeMap<String, usize> = TicketPriority::ALL
                .iter()
                .map(|p| (p.to_string(), 0))
                .collect();
            let mut total = 0;
            let mut open_unassigned = 0;

            for ticket in t.all::<Ticket>() {
                total += 1;
                *by_status.entry(ticket.status.to_string()).or_default() += 1;
                *by_priority.entry(ticket.priority.to_string()).or_default() += 1;
                if ticket.status.is_active() && ticket.assignee_id.is_none() {
                    open_unassigned += 1;
                }
            }

            TicketStats {
                total,
                by_status,
                by_priority,
                open_unassigned,
            }
        })
        .await;

    Json(stats)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_assignee_null_vs_absent() {
        let absent: UpdateTicketRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.assignee_id, None);

        let null: UpdateTicketRequest =
            serde_json::from_str(r#"{"assignee_id": null}"#).unwrap();
        assert_eq!(null.assignee_id, Some(None));
        assert!(null.touches_workflow());

        let id = UserId::new();
        let set: UpdateTicketRequest =
            serde_json::from_str(&format!(r#"{{"assignee_id": "{id}"}}"#)).unwrap();
        assert_eq!(set.assignee_id, Some(Some(id)));
    }
}
