//! Marketplace orders.
//!
//! An order buys from exactly one seller. Placing it takes the stock off
//! the shelf in the same write that stores the order, so either every line
//! is reserved or nothing changes. Cancelling puts the stock back.

use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tradepost_core::{
    AdjustmentReason, Money, NotificationKind, OrderId, OrderStatus, ProductId, ShipmentId,
    ShippingStatus, UserId,
};

use crate::error::{AppError, Result, Validator};
use crate::extract::{Json, Page, Pagination, Path, Query};
use crate::middleware::RequireAuth;
use crate::models::{InventoryItem, Notification, Order, OrderItem, Product, Shipment, User};
use crate::services::chat::ensure_room;
use crate::services::notifier::{self, Draft};
use crate::services::stock::{self, Movement};
use crate::state::AppState;
use crate::store::{Tables, Txn};

const MAX_ADDRESS_LENGTH: usize = 500;
const MAX_NOTE_LENGTH: usize = 1000;
const MAX_LINES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderRole {
    Buyer,
    Seller,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub role: Option<OrderRole>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLineRequest>,
    pub shipping_address: String,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub buyer_name: Option<String>,
    pub seller_name: Option<String>,
    pub shipment: Option<Shipment>,
}

fn display_name(tables: &Tables, id: UserId) -> Option<String> {
    tables.get::<User>(id).map(|u| u.display_name.clone())
}

/// The shipment belonging to an order.
pub fn shipment_for(tables: &Tables, order_id: OrderId) -> Option<&Shipment> {
    tables.all::<Shipment>().find(|s| s.order_id == order_id)
}

pub fn view(tables: &Tables, order: &Order) -> OrderView {
    OrderView {
        order: order.clone(),
        buyer_name: display_name(tables, order.buyer_id),
        seller_name: display_name(tables, order.seller_id),
        shipment: shipment_for(tables, order.id).cloned(),
    }
}

/// An order the user may see: buyer, seller, or admin.
///
/// # Errors
///
/// Returns 404 for an unknown order, 403 for anyone else.
pub fn visible_order<'t>(tables: &'t Tables, id: OrderId, user: &User) -> Result<&'t Order> {
    let order = tables
        .get::<Order>(id)
        .ok_or_else(|| AppError::not_found("Order"))?;
    if !order.involves(user.id) && !user.role.is_admin() {
        return Err(AppError::forbidden());
    }
    Ok(order)
}

/// Move an order to `next` and apply the side effects on stock and
/// shipment. Permission checks are the caller's.
///
/// # Errors
///
/// Returns 409 for a transition the lifecycle does not allow.
pub fn transition(
    tx: &mut Txn<'_>,
    order_id: OrderId,
    next: OrderStatus,
    actor_id: UserId,
) -> Result<Order> {
    let order = tx
        .get::<Order>(order_id)
        .cloned()
        .ok_or_else(|| AppError::not_found("Order"))?;
    if !order.status.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "Cannot move order from {} to {next}",
            order.status
        )));
    }

    if next.releases_stock() {
        for item in &order.items {
            // The product may have been delisted since.
            if tx.get::<InventoryItem>(item.product_id).is_none() {
                continue;
            }
            stock::adjust(
                tx,
                Movement {
                    product_id: item.product_id,
                    actor_id,
                    delta: i64::from(item.quantity),
                    reason: AdjustmentReason::Return,
                    note: Some(format!("Order {order_id} cancelled")),
                    order_id: Some(order_id),
                },
            )?;
        }
    }

    let now = Utc::now();
    if let Some(shipment_id) = shipment_for(tx.tables(), order_id).map(|s| s.id) {
        tx.update::<Shipment>(shipment_id, |s| {
            match next {
                OrderStatus::Shipped => {
                    s.status = ShippingStatus::InTransit;
                    s.shipped_at = Some(now);
                }
                OrderStatus::Delivered => {
                    s.status = ShippingStatus::Delivered;
                    s.delivered_at = Some(now);
                }
                OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Cancelled => return,
            }
            s.updated_at = now;
        });
    }

    let updated = tx
        .update::<Order>(order_id, |o| {
            o.status = next;
            o.updated_at = now;
        })
        .cloned()
        .ok_or_else(|| AppError::not_found("Order"))?;

    tracing::info!(order_id = %order_id, from = %order.status, to = %next, "Order status changed");
    Ok(updated)
}

/// Stage an `order_status` notification for the other participant(s).
fn stage_status_notice(tx: &mut Txn<'_>, order: &Order, actor_id: UserId) -> Vec<Notification> {
    let recipients = [order.buyer_id, order.seller_id]
        .into_iter()
        .filter(|id| *id != actor_id);
    let draft = Draft::new(
        NotificationKind::OrderStatus,
        format!("Order {}", order.status),
        format!("Order {} is now {}", order.id, order.status),
    )
    .with_data(serde_json::json!({
        "order_id": order.id,
        "status": order.status,
    }));
    notifier::stage(tx, recipients, &draft)
}

/// Collapse repeated products into one line, keeping first-seen order.
fn merge_lines(lines: &[OrderLineRequest]) -> Vec<(ProductId, u32)> {
    let mut order: Vec<ProductId> = Vec::new();
    let mut quantities: BTreeMap<ProductId, u32> = BTreeMap::new();
    for line in lines {
        let quantity = quantities.entry(line.product_id).or_insert_with(|| {
            order.push(line.product_id);
            0
        });
        *quantity = quantity.saturating_add(line.quantity);
    }
    order
        .into_iter()
        .filter_map(|id| quantities.get(&id).map(|q| (id, *q)))
        .collect()
}

/// The caller's orders, newest first.
///
/// GET /api/orders
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(filter): Query<OrderFilter>,
    Query(page): Query<Pagination>,
) -> Json<Page<OrderView>> {
    let admin = user.role.is_admin();
    let mut orders: Vec<OrderView> = state
        .store()
        .read(|t| {
            t.all::<Order>()
                .filter(|o| match filter.role {
                    Some(OrderRole::Buyer) => o.buyer_id == user.id,
                    Some(OrderRole::Seller) => o.seller_id == user.id,
                    None => admin || o.involves(user.id),
                })
                .filter(|o| filter.status.is_none_or(|s| o.status == s))
                .map(|o| view(t, o))
                .collect()
        })
        .await;

    orders.sort_by(|a, b| b.order.created_at.cmp(&a.order.created_at));
    Json(page.paginate(orders))
}

/// Place an order.
///
/// POST /api/orders
///
/// # Errors
///
/// Returns 400 for an empty order, mixed sellers, or buying your own
/// product; 404 for an unknown product; 409 if any line is out of stock.
#[instrument(skip_all, fields(buyer_id = %buyer.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(buyer): RequireAuth,
    Json(body): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderView>)> {
    let mut v = Validator::new();
    v.check(!body.items.is_empty(), "items", "must not be empty");
    v.check(body.items.len() <= MAX_LINES, "items", "too many lines");
    v.check(
        body.items.iter().all(|l| l.quantity >= 1),
        "items",
        "quantity must be at least 1",
    );
    v.length(&body.shipping_address, "shipping_address", 1, MAX_ADDRESS_LENGTH);
    if let Some(note) = &body.note {
        v.length(note, "note", 0, MAX_NOTE_LENGTH);
    }
    v.finish()?;

    let lines = merge_lines(&body.items);
    let order_id = OrderId::new();

    let (created, notifications) = state
        .store()
        .write(|tx| {
            let mut seller_id: Option<UserId> = None;
            let mut items = Vec::with_capacity(lines.len());
            for (product_id, quantity) in &lines {
                let product = tx
                    .get::<Product>(*product_id)
                    .cloned()
                    .ok_or_else(|| AppError::not_found("Product"))?;
                if product.seller_id == buyer.id {
                    return Err(AppError::BadRequest(
                        "Cannot order your own product".to_string(),
                    ));
                }
                if *seller_id.get_or_insert(product.seller_id) != product.seller_id {
                    return Err(AppError::BadRequest(
                        "All items in an order must come from the same seller".to_string(),
                    ));
                }
                let line_total = product
                    .price
                    .times(*quantity)
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                items.push(OrderItem {
                    product_id: product.id,
                    product_name: product.name,
                    unit_price: product.price,
                    quantity: *quantity,
                    line_total,
                });
            }
            let seller_id = seller_id.ok_or_else(|| {
                AppError::BadRequest("Order has no items".to_string())
            })?;

            let mut notifications = Vec::new();
            for item in &items {
                let applied = stock::adjust(
                    tx,
                    Movement {
                        product_id: item.product_id,
                        actor_id: buyer.id,
                        delta: -i64::from(item.quantity),
                        reason: AdjustmentReason::Sale,
                        note: None,
                        order_id: Some(order_id),
                    },
                )?;
                notifications.extend(stock::alert_if_worsened(tx, &applied));
            }

            let room = ensure_room(tx, buyer.id, seller_id, Some(order_id));
            let now = Utc::now();
            let total: Money = items.iter().map(|i| i.line_total).sum();
            let shipping_address = body.shipping_address.trim().to_string();
            let order = Order {
                id: order_id,
                buyer_id: buyer.id,
                seller_id,
                items,
                total,
                status: OrderStatus::Pending,
                shipping_address: shipping_address.clone(),
                note: body
                    .note
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string),
                chat_room_id: room.id,
                created_at: now,
                updated_at: now,
            };
            tx.put(order.clone());
            tx.put(Shipment {
                id: ShipmentId::new(),
                order_id,
                status: ShippingStatus::Pending,
                carrier: None,
                tracking_number: None,
                address: shipping_address,
                shipped_at: None,
                delivered_at: None,
                updated_at: now,
            });

            let draft = Draft::new(
                NotificationKind::OrderCreated,
                "New order",
                format!("{} placed an order totalling {}", buyer.display_name, order.total),
            )
            .with_data(serde_json::json!({
                "order_id": order.id,
                "room_id": room.id,
            }));
            notifications.extend(notifier::stage(tx, [seller_id], &draft));

            Ok((view(tx.tables(), &order), notifications))
        })
        .await?;

    state.notifier().deliver(&notifications);
    tracing::info!(order_id = %order_id, total = %created.order.total, "Order placed");
    Ok((StatusCode::CREATED, Json(created)))
}

/// Order detail.
///
/// GET /api/orders/{id}
///
/// # Errors
///
/// Returns 403 unless buyer, seller, or admin.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderView>> {
    state
        .store()
        .read(|t| visible_order(t, id, &user).map(|o| view(t, o)))
        .await
        .map(Json)
}

/// Advance an order through its lifecycle.
///
/// PUT /api/orders/{id}/status
///
/// # Errors
///
/// Returns 403 unless seller or admin, 409 for a disallowed transition.
#[instrument(skip_all, fields(order_id = %id, status = %body.status))]
pub async fn set_status(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
    Json(body): Json<SetStatusRequest>,
) -> Result<Json<OrderView>> {
    let (updated, notifications) = state
        .store()
        .write(|tx| {
            let order = visible_order(tx.tables(), id, &user)?;
            if order.seller_id != user.id && !user.role.is_admin() {
                return Err(AppError::Forbidden(
                    "Only the seller can update an order".to_string(),
                ));
            }
            let order = transition(tx, id, body.status, user.id)?;
            let notifications = stage_status_notice(tx, &order, user.id);
            Ok((view(tx.tables(), &order), notifications))
        })
        .await?;

    state.notifier().deliver(&notifications);
    Ok(Json(updated))
}

/// Cancel an order and put its stock back.
///
/// POST /api/orders/{id}/cancel
///
/// # Errors
///
/// Returns 409 when the buyer cancels after confirmation or anyone cancels
/// after shipping.
#[instrument(skip_all, fields(order_id = %id, user_id = %user.id))]
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderView>> {
    let (updated, notifications) = state
        .store()
        .write(|tx| {
            let order = visible_order(tx.tables(), id, &user)?;
            let seller_side = order.seller_id == user.id || user.role.is_admin();
            if !seller_side && order.status != OrderStatus::Pending {
                return Err(AppError::Conflict(
                    "Orders can only be cancelled by the buyer while pending".to_string(),
                ));
            }
            let order = transition(tx, id, OrderStatus::Cancelled, user.id)?;
            let notifications = stage_status_notice(tx, &order, user.id);
            Ok((view(tx.tables(), &order), notifications))
        })
        .await?;

    state.notifier().deliver(&notifications);
    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_lines_sums_repeats_in_order() {
        let a = ProductId::new();
        let b = ProductId::new();
        let merged = merge_lines(&[
            OrderLineRequest {
                product_id: a,
                quantity: 1,
            },
            OrderLineRequest {
                product_id: b,
                quantity: 2,
            },
            OrderLineRequest {
                product_id: a,
                quantity: 3,
            },
        ]);
        assert_eq!(merged, vec![(a, 4), (b, 2)]);
    }
}
