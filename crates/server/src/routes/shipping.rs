//! Shipment tracking for an order.

use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use tradepost_core::{NotificationKind, OrderId, OrderStatus, ShippingStatus};

use crate::error::{AppError, Result, Validator};
use crate::extract::{Json, Path};
use crate::middleware::RequireAuth;
use crate::models::Shipment;
use crate::routes::orders::{shipment_for, transition, visible_order};
use crate::services::notifier::{self, Draft};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UpdateShipmentRequest {
    pub status: Option<ShippingStatus>,
    /// `null` clears the carrier.
    #[serde(default, deserialize_with = "crate::extract::double_option")]
    pub carrier: Option<Option<String>>,
    /// `null` clears the tracking number.
    #[serde(default, deserialize_with = "crate::extract::double_option")]
    pub tracking_number: Option<Option<String>>,
    pub address: Option<String>,
}

/// What a requested shipping status means for the order.
///
/// `Ok(Some(next))` advances the order, `Ok(None)` leaves it alone.
fn order_step(order: OrderStatus, shipping: ShippingStatus) -> Result<Option<OrderStatus>> {
    match (shipping, order) {
        (ShippingStatus::InTransit, OrderStatus::Confirmed) => Ok(Some(OrderStatus::Shipped)),
        (ShippingStatus::Delivered, OrderStatus::Shipped) => Ok(Some(OrderStatus::Delivered)),
        (ShippingStatus::InTransit, OrderStatus::Shipped)
        | (ShippingStatus::Delivered, OrderStatus::Delivered)
        | (ShippingStatus::Pending, OrderStatus::Pending | OrderStatus::Confirmed)
        | (ShippingStatus::Returned, OrderStatus::Shipped | OrderStatus::Delivered) => Ok(None),
        (shipping, order) => Err(AppError::Conflict(format!(
            "Cannot mark shipment {shipping} while the order is {order}"
        ))),
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Shipment of an order.
///
/// GET /api/orders/{id}/shipping
///
/// # Errors
///
/// Returns 403 unless buyer, seller, or admin.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Shipment>> {
    state
        .store()
        .read(|t| {
            visible_order(t, order_id, &user)?;
            shipment_for(t, order_id)
                .cloned()
                .ok_or_else(|| AppError::not_found("Shipment"))
        })
        .await
        .map(Json)
}

/// Update carrier details or tracking status.
///
/// PUT /api/orders/{id}/shipping
///
/// # Errors
///
/// Returns 403 unless seller or admin, 409 when the status does not fit the
/// order's state.
#[instrument(skip_all, fields(order_id = %order_id, user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(order_id): Path<OrderId>,
    Json(body): Json<UpdateShipmentRequest>,
) -> Result<Json<Shipment>> {
    let mut v = Validator::new();
    if let Some(Some(carrier)) = &body.carrier {
        v.length(carrier, "carrier", 0, 100);
    }
    if let Some(Some(tracking)) = &body.tracking_number {
        v.length(tracking, "tracking_number", 0, 100);
    }
    if let Some(address) = &body.address {
        v.length(address, "address", 1, 500);
    }
    v.finish()?;

    let (shipment, notifications) = state
        .store()
        .write(|tx| {
            let order = visible_order(tx.tables(), order_id, &user)?.clone();
            if order.seller_id != user.id && !user.role.is_admin() {
                return Err(AppError::Forbidden(
                    "Only the seller can update shipping".to_string(),
                ));
            }
            if order.status == OrderStatus::Cancelled {
                return Err(AppError::Conflict("Order is cancelled".to_string()));
            }
            let shipment_id = shipment_for(tx.tables(), order_id)
                .map(|s| s.id)
                .ok_or_else(|| AppError::not_found("Shipment"))?;

            let step = body
                .status
                .map(|status| order_step(order.status, status))
                .transpose()?
                .flatten();
            if let Some(next) = step {
                transition(tx, order_id, next, user.id)?;
            }

            let shipment = tx
                .update::<Shipment>(shipment_id, |s| {
                    if let Some(status) = body.status {
                        s.status = status;
                    }
                    if let Some(carrier) = &body.carrier {
                        s.carrier = trimmed(carrier.as_deref());
                    }
                    if let Some(tracking) = &body.tracking_number {
                        s.tracking_number = trimmed(tracking.as_deref());
                    }
                    if let Some(address) = &body.address {
                        s.address = address.trim().to_string();
                    }
                    s.updated_at = Utc::now();
                })
                .cloned()
                .ok_or_else(|| AppError::not_found("Shipment"))?;

            let details = shipment
                .tracking_number
                .as_deref()
                .map_or_else(String::new, |t| format!(" (tracking {t})"));
            let draft = Draft::new(
                NotificationKind::ShippingUpdate,
                format!("Shipment {}", shipment.status.as_str().replace('_', " ")),
                format!("Your order {order_id} is {}{details}", shipment.status),
            )
            .with_data(serde_json::json!({
                "order_id": order_id,
                "status": shipment.status,
                "carrier": shipment.carrier,
                "tracking_number": shipment.tracking_number,
            }));
            let notifications = notifier::stage(tx, [order.buyer_id], &draft);

            Ok((shipment, notifications))
        })
        .await?;

    state.notifier().deliver(&notifications);
    tracing::info!(status = %shipment.status, "Shipment updated");
    Ok(Json(shipment))
}
