//! Stock levels and adjustments.
//!
//! Sellers manage the stock of their own products; agents and admins can
//! see every record, and admins can adjust any of them.

use std::collections::BTreeMap;

use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tradepost_core::{AdjustmentReason, ProductId, StockStatus, UserId};

use crate::error::{AppError, FieldError, Result, Validator};
use crate::extract::{Json, Page, Pagination, Path, Query};
use crate::middleware::RequireAuth;
use crate::models::{InventoryItem, Product, StockAdjustment, User};
use crate::routes::products::owned_product;
use crate::services::stock::{self, Movement};
use crate::state::AppState;
use crate::store::Tables;

const MAX_NOTE_LENGTH: usize = 500;
const MAX_LOCATION_LENGTH: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct InventoryFilter {
    pub status: Option<StockStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateInventoryRequest {
    pub critical_level: Option<u32>,
    /// `null` removes the ceiling.
    #[serde(default, deserialize_with = "crate::extract::double_option")]
    pub max_level: Option<Option<u32>>,
    /// `null` clears the location.
    #[serde(default, deserialize_with = "crate::extract::double_option")]
    pub location: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub delta: i64,
    pub reason: AdjustmentReason,
    pub note: Option<String>,
}

/// A stock record with its product and derived status.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryView {
    #[serde(flatten)]
    pub item: InventoryItem,
    pub product_name: String,
    pub sku: Option<String>,
    pub status: StockStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentView {
    #[serde(flatten)]
    pub adjustment: StockAdjustment,
    pub actor_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySummary {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub needs_attention: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdjustResponse {
    pub item: InventoryView,
    pub adjustment: StockAdjustment,
}

fn view(tables: &Tables, item: &InventoryItem) -> InventoryView {
    let product = tables.get::<Product>(item.product_id);
    InventoryView {
        item: item.clone(),
        product_name: product.map_or_else(String::new, |p| p.name.clone()),
        sku: product.and_then(|p| p.sku.clone()),
        status: item.status(),
    }
}

/// Records `user` may see: everything for staff, own products for sellers.
fn visible_items<'t>(
    tables: &'t Tables,
    user: &'t User,
) -> Result<impl Iterator<Item = &'t InventoryItem>> {
    if !user.role.is_staff() && !user.role.can_sell() {
        return Err(AppError::forbidden());
    }
    let staff = user.role.is_staff();
    Ok(tables
        .all::<InventoryItem>()
        .filter(move |i| staff || i.seller_id == user.id))
}

fn visible_item<'t>(tables: &'t Tables, product_id: ProductId, user: &User) -> Result<&'t InventoryItem> {
    let item = tables
        .get::<InventoryItem>(product_id)
        .ok_or_else(|| AppError::not_found("Inventory record"))?;
    if item.seller_id != user.id && !user.role.is_staff() {
        return Err(AppError::forbidden());
    }
    Ok(item)
}

/// Stock records, lowest status first.
///
/// GET /api/inventory
///
/// # Errors
///
/// Returns 403 for customers.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(filter): Query<InventoryFilter>,
    Query(page): Query<Pagination>,
) -> Result<Json<Page<InventoryView>>> {
    let mut items: Vec<InventoryView> = state
        .store()
        .read(|t| {
            visible_items(t, &user).map(|items| {
                items
                    .map(|i| view(t, i))
                    .filter(|v| filter.status.is_none_or(|s| v.status == s))
                    .collect()
            })
        })
        .await?;

    items.sort_by(|a, b| {
        a.status
            .cmp(&b.status)
            .then_with(|| a.product_name.cmp(&b.product_name))
    });
    Ok(Json(page.paginate(items)))
}

/// Count of visible records per stock status.
///
/// GET /api/inventory/summary
///
/// # Errors
///
/// Returns 403 for customers.
pub async fn summary(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<InventorySummary>> {
    let statuses: Vec<StockStatus> = state
        .store()
        .read(|t| visible_items(t, &user).map(|items| items.map(InventoryItem::status).collect()))
        .await?;

    let mut by_status: BTreeMap<String, usize> = StockStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    for status in &statuses {
        *by_status.entry(status.as_str().to_string()).or_default() += 1;
    }

    Ok(Json(InventorySummary {
        total: statuses.len(),
        needs_attention: statuses.iter().filter(|s| s.needs_attention()).count(),
        by_status,
    }))
}

/// One product's stock record.
///
/// GET /api/inventory/{product_id}
///
/// # Errors
///
/// Returns 403 unless owner or staff.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<Json<InventoryView>> {
    state
        .store()
        .read(|t| visible_item(t, product_id, &user).map(|i| view(t, i)))
        .await
        .map(Json)
}

/// Change thresholds and location.
///
/// PUT /api/inventory/{product_id}
///
/// # Errors
///
/// Returns 403 unless owner or admin, 400 if the max level would be below
/// the critical level.
#[instrument(skip_all, fields(product_id = %product_id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
    Json(body): Json<UpdateInventoryRequest>,
) -> Result<Json<InventoryView>> {
    let mut v = Validator::new();
    if let Some(Some(location)) = &body.location {
        v.length(location, "location", 1, MAX_LOCATION_LENGTH);
    }
    v.finish()?;

    let updated = state
        .store()
        .write(|tx| {
            owned_product(tx.tables(), product_id, &user)?;
            let current = tx
                .get::<InventoryItem>(product_id)
                .ok_or_else(|| AppError::not_found("Inventory record"))?;

            let critical_level = body.critical_level.unwrap_or(current.critical_level);
            let max_level = body.max_level.unwrap_or(current.max_level);
            if max_level.is_some_and(|max| max < critical_level) {
                return Err(AppError::Validation(vec![FieldError {
                    field: "max_level".to_string(),
                    message: "must not be below the critical level".to_string(),
                }]));
            }

            let item = tx
                .update::<InventoryItem>(product_id, |i| {
                    i.critical_level = critical_level;
                    i.max_level = max_level;
                    if let Some(location) = &body.location {
                        i.location = location.as_deref().map(str::trim).map(str::to_string);
                    }
                    i.updated_at = Utc::now();
                })
                .cloned()
                .ok_or_else(|| AppError::not_found("Inventory record"))?;
            Ok(view(tx.tables(), &item))
        })
        .await?;

    Ok(Json(updated))
}

/// Apply a manual stock movement.
///
/// POST /api/inventory/{product_id}/adjust
///
/// # Errors
///
/// Returns 403 unless owner or admin, 400 for a zero delta, 409 if the
/// quantity would go below zero.
#[instrument(skip_all, fields(product_id = %product_id, user_id = %user.id))]
pub async fn adjust(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
    Json(body): Json<AdjustRequest>,
) -> Result<Json<AdjustResponse>> {
    let mut v = Validator::new();
    if let Some(note) = &body.note {
        v.length(note, "note", 0, MAX_NOTE_LENGTH);
    }
    v.finish()?;

    let (response, notifications) = state
        .store()
        .write(|tx| {
            owned_product(tx.tables(), product_id, &user)?;

            let applied = stock::adjust(
                tx,
                Movement {
                    product_id,
                    actor_id: user.id,
                    delta: body.delta,
                    reason: body.reason,
                    note: body
                        .note
                        .as_deref()
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(str::to_string),
                    order_id: None,
                },
            )?;
            let notifications = stock::alert_if_worsened(tx, &applied);

            let item = tx
                .get::<InventoryItem>(product_id)
                .ok_or_else(|| AppError::not_found("Inventory record"))?;
            let response = AdjustResponse {
                item: view(tx.tables(), item),
                adjustment: applied.adjustment,
            };
            Ok::<_, AppError>((response, notifications))
        })
        .await?;

    state.notifier().deliver(&notifications);
    tracing::info!(
        delta = body.delta,
        reason = %body.reason,
        quantity = response.adjustment.resulting_quantity,
        "Stock adjusted"
    );
    Ok(Json(response))
}

/// Adjustment history, newest first.
///
/// GET /api/inventory/{product_id}/history
///
/// # Errors
///
/// Returns 403 unless owner or staff.
pub async fn history(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
    Query(page): Query<Pagination>,
) -> Result<Json<Page<AdjustmentView>>> {
    let mut entries: Vec<AdjustmentView> = state
        .store()
        .read(|t| {
            visible_item(t, product_id, &user)?;
            Ok::<_, AppError>(
                t.all::<StockAdjustment>()
                    .filter(|a| a.product_id == product_id)
                    .map(|a| AdjustmentView {
                        adjustment: a.clone(),
                        actor_name: actor_name(t, a.actor_id),
                    })
                    .collect(),
            )
        })
        .await?;

    entries.sort_by(|a, b| newest_first(a.adjustment.created_at, b.adjustment.created_at));
    Ok(Json(page.paginate(entries)))
}

fn actor_name(tables: &Tables, id: UserId) -> Option<String> {
    tables.get::<User>(id).map(|u| u.display_name.clone())
}

fn newest_first(a: DateTime<Utc>, b: DateTime<Utc>) -> std::cmp::Ordering {
    b.cmp(&a)
}
