//! Stock movements.
//!
//! Every quantity change, manual or caused by an order, goes through
//! [`adjust`] so it is checked against the shelf, recorded as a
//! [`StockAdjustment`], and raises a `low_stock` alert when the product
//! drops into a worse needs-attention status.

use chrono::Utc;

use tradepost_core::{
    AdjustmentId, AdjustmentReason, NotificationKind, OrderId, ProductId, StockError, StockStatus,
    UserId,
};

use crate::error::{AppError, FieldError};
use crate::models::{InventoryItem, Notification, Product, StockAdjustment, User};
use crate::services::notifier::{self, Draft};
use crate::store::Txn;

/// One requested quantity change.
#[derive(Debug, Clone)]
pub struct Movement {
    pub product_id: ProductId,
    pub actor_id: UserId,
    pub delta: i64,
    pub reason: AdjustmentReason,
    pub note: Option<String>,
    pub order_id: Option<OrderId>,
}

/// Result of an applied movement.
#[derive(Debug, Clone)]
pub struct Applied {
    pub adjustment: StockAdjustment,
    pub before: StockStatus,
    pub after: StockStatus,
}

/// Whether moving from `before` to `after` should raise a restock alert.
#[must_use]
pub fn worsened(before: StockStatus, after: StockStatus) -> bool {
    after.needs_attention() && after < before
}

fn stock_error(err: StockError, product_name: &str) -> AppError {
    match err {
        StockError::ZeroDelta => AppError::Validation(vec![FieldError {
            field: "delta".to_string(),
            message: err.to_string(),
        }]),
        StockError::Insufficient {
            available,
            requested,
        } => AppError::Conflict(format!(
            "Insufficient stock for {product_name}: {available} available, {requested} requested"
        )),
        StockError::Overflow => AppError::BadRequest(err.to_string()),
    }
}

/// Apply a movement inside `tx`.
///
/// # Errors
///
/// Returns 404 if the product has no inventory record, 400 for a zero
/// delta, 409 if the shelf would go negative.
pub fn adjust(tx: &mut Txn<'_>, movement: Movement) -> Result<Applied, AppError> {
    let item = tx
        .get::<InventoryItem>(movement.product_id)
        .cloned()
        .ok_or_else(|| AppError::not_found("Inventory record"))?;
    let product_name = tx
        .get::<Product>(movement.product_id)
        .map_or_else(|| movement.product_id.to_string(), |p| p.name.clone());

    let before = item.status();
    let quantity = item
        .level()
        .apply(movement.delta)
        .map_err(|e| stock_error(e, &product_name))?;

    let now = Utc::now();
    let updated = tx
        .update::<InventoryItem>(movement.product_id, |i| {
            i.quantity = quantity;
            i.updated_at = now;
        })
        .cloned()
        .ok_or_else(|| AppError::not_found("Inventory record"))?;

    let adjustment = StockAdjustment {
        id: AdjustmentId::new(),
        product_id: movement.product_id,
        actor_id: movement.actor_id,
        delta: movement.delta,
        reason: movement.reason,
        note: movement.note,
        resulting_quantity: quantity,
        order_id: movement.order_id,
        created_at: now,
    };
    tx.put(adjustment.clone());

    Ok(Applied {
        adjustment,
        before,
        after: updated.status(),
    })
}

/// Stage a `low_stock` notification for the owner and admins if the
/// movement made things worse.
pub fn alert_if_worsened(tx: &mut Txn<'_>, applied: &Applied) -> Vec<Notification> {
    if !worsened(applied.before, applied.after) {
        return Vec::new();
    }

    let product_id = applied.adjustment.product_id;
    let Some(product) = tx.get::<Product>(product_id).cloned() else {
        return Vec::new();
    };

    let mut recipients: Vec<UserId> = tx
        .tables()
        .all::<User>()
        .filter(|u| u.role.is_admin())
        .map(|u| u.id)
        .collect();
    recipients.push(product.seller_id);

    let draft = Draft::new(
        NotificationKind::LowStock,
        format!("{} is {}", product.name, applied.after.as_str().replace('_', " ")),
        format!(
            "{} left in stock",
            applied.adjustment.resulting_quantity
        ),
    )
    .with_data(serde_json::json!({
        "product_id": product_id,
        "status": applied.after,
        "quantity": applied.adjustment.resulting_quantity,
    }));

    tracing::info!(product_id = %product_id, status = %applied.after, "Stock needs attention");
    notifier::stage(tx, recipients, &draft)
}
