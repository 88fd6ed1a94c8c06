//! Product catalog.

use std::cmp::Ordering;

use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tradepost_core::{
    AdjustmentId, AdjustmentReason, Money, ProductId, RatingSummary, StockLevel, StockStatus,
    UserId,
};

use crate::error::{AppError, Result, Validator};
use crate::extract::{Json, Page, Pagination, Path, Query};
use crate::middleware::RequireAuth;
use crate::models::{InventoryItem, Product, Review, StockAdjustment, User};
use crate::store::{Tables, Txn};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Rating,
    Name,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub q: Option<String>,
    pub category: Option<String>,
    pub seller_id: Option<UserId>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub sort: ProductSort,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub price: Money,
    pub sku: Option<String>,
    pub initial_stock: Option<u32>,
    pub critical_level: Option<u32>,
    pub max_level: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<Money>,
    /// `null` clears the SKU.
    #[serde(default, deserialize_with = "crate::extract::double_option")]
    pub sku: Option<Option<String>>,
}

/// Stock as shown alongside a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub quantity: u32,
    pub status: StockStatus,
}

/// A product with its derived rating and stock.
#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub seller_name: Option<String>,
    pub rating: RatingSummary,
    pub stock: Option<StockSnapshot>,
}

/// Rating summary over a product's reviews.
pub fn rating_summary(tables: &Tables, product_id: ProductId) -> RatingSummary {
    RatingSummary::from_ratings(
        tables
            .all::<Review>()
            .filter(|r| r.product_id == product_id)
            .map(|r| r.rating),
    )
}

fn view(tables: &Tables, product: &Product) -> ProductView {
    ProductView {
        product: product.clone(),
        seller_name: tables
            .get::<User>(product.seller_id)
            .map(|u| u.display_name.clone()),
        rating: rating_summary(tables, product.id),
        stock: tables
            .get::<InventoryItem>(product.id)
            .map(|item| StockSnapshot {
                quantity: item.quantity,
                status: item.status(),
            }),
    }
}

/// Fetch a product the actor may modify (its seller, or an admin).
///
/// # Errors
///
/// Returns 404 for an unknown product, 403 for anyone else.
pub fn owned_product(tables: &Tables, id: ProductId, actor: &User) -> Result<Product> {
    let product = tables
        .get::<Product>(id)
        .ok_or_else(|| AppError::not_found("Product"))?;
    if product.seller_id != actor.id && !actor.role.is_admin() {
        return Err(AppError::forbidden());
    }
    Ok(product.clone())
}

fn normalize_sku(sku: &str) -> String {
    sku.trim().to_uppercase()
}

fn sku_taken(tables: &Tables, sku: &str, except: Option<ProductId>) -> bool {
    tables.all::<Product>().any(|p| {
        Some(p.id) != except && p.sku.as_deref().is_some_and(|existing| existing == sku)
    })
}

fn compare(sort: ProductSort, a: &ProductView, b: &ProductView) -> Ordering {
    match sort {
        ProductSort::Newest => b.product.created_at.cmp(&a.product.created_at),
        ProductSort::PriceAsc => a.product.price.cmp(&b.product.price),
        ProductSort::PriceDesc => b.product.price.cmp(&a.product.price),
        ProductSort::Rating => b
            .rating
            .average
            .unwrap_or(0.0)
            .total_cmp(&a.rating.average.unwrap_or(0.0))
            .then(b.rating.count.cmp(&a.rating.count)),
        ProductSort::Name => a
            .product
            .name
            .to_lowercase()
            .cmp(&b.product.name.to_lowercase()),
    }
}

/// List and search products.
///
/// GET /api/products
#[instrument(skip_all)]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Query(filter): Query<ProductFilter>,
    Query(page): Query<Pagination>,
) -> Json<Page<ProductView>> {
    let needle = filter
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase);
    let category = filter.category.as_deref().map(str::trim);

    let mut products: Vec<ProductView> = state
        .store()
        .read(|t| {
            t.all::<Product>()
                .filter(|p| needle.as_deref().is_none_or(|q| p.matches_query(q)))
                .filter(|p| category.is_none_or(|c| p.category.eq_ignore_ascii_case(c)))
                .filter(|p| filter.seller_id.is_none_or(|s| p.seller_id == s))
                .filter(|p| filter.min_price.is_none_or(|min| p.price.amount() >= min))
                .filter(|p| filter.max_price.is_none_or(|max| p.price.amount() <= max))
                .map(|p| view(t, p))
                .collect()
        })
        .await;

    products.sort_by(|a, b| compare(filter.sort, a, b));
    Json(page.paginate(products))
}

/// List a new product and open its inventory record.
///
/// POST /api/products
///
/// # Errors
///
/// Returns 403 for customers and agents, 400 for invalid input, 409 for a
/// duplicate SKU.
#[instrument(skip_all, fields(seller_id = %seller.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(seller): RequireAuth,
    Json(body): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductView>)> {
    if !seller.role.can_sell() {
        return Err(AppError::Forbidden(
            "Only sellers can list products".to_string(),
        ));
    }

    let critical_level = body
        .critical_level
        .unwrap_or(StockLevel::DEFAULT_CRITICAL_LEVEL);

    let mut v = Validator::new();
    v.length(&body.name, "name", 1, 200);
    v.length(&body.description, "description", 0, 5000);
    v.length(&body.category, "category", 1, 50);
    if let Some(sku) = &body.sku {
        v.length(sku, "sku", 1, 64);
    }
    if let Some(max) = body.max_level {
        v.check(
            max >= critical_level,
            "max_level",
            "must not be below the critical level",
        );
    }
    v.finish()?;

    let now = Utc::now();
    let product = Product {
        id: ProductId::new(),
        seller_id: seller.id,
        name: body.name.trim().to_string(),
        description: body.description.trim().to_string(),
        category: body.category.trim().to_lowercase(),
        price: body.price,
        sku: body.sku.as_deref().map(normalize_sku),
        created_at: now,
        updated_at: now,
    };
    let initial_stock = body.initial_stock.unwrap_or(0);

    let created = state
        .store()
        .write(|tx| {
            if let Some(sku) = &product.sku {
                if sku_taken(tx.tables(), sku, None) {
                    return Err(AppError::Conflict(format!("SKU '{sku}' already exists")));
                }
            }

            tx.put(product.clone());
            tx.put(InventoryItem {
                product_id: product.id,
                seller_id: product.seller_id,
                quantity: initial_stock,
                critical_level,
                max_level: body.max_level,
                location: None,
                updated_at: now,
            });
            if initial_stock > 0 {
                record_initial_stock(tx, &product, seller.id, initial_stock);
            }

            Ok(view(tx.tables(), &product))
        })
        .await?;

    tracing::info!(product_id = %product.id, "Product created");
    Ok((StatusCode::CREATED, Json(created)))
}

fn record_initial_stock(tx: &mut Txn<'_>, product: &Product, actor: UserId, quantity: u32) {
    tx.put(StockAdjustment {
        id: AdjustmentId::new(),
        product_id: product.id,
        actor_id: actor,
        delta: i64::from(quantity),
        reason: AdjustmentReason::Restock,
        note: Some("Initial stock".to_string()),
        resulting_quantity: quantity,
        order_id: None,
        created_at: product.created_at,
    });
}

/// Product detail.
///
/// GET /api/products/{id}
///
/// # Errors
///
/// Returns 404 if the product does not exist.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductView>> {
    state
        .store()
        .read(|t| t.get::<Product>(id).map(|p| view(t, p)))
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found("Product"))
}

/// Partially update a product.
///
/// PUT /api/products/{id}
///
/// # Errors
///
/// Returns 403 unless owner or admin, 409 for a duplicate SKU.
#[instrument(skip_all, fields(product_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(actor): RequireAuth,
    Path(id): Path<ProductId>,
    Json(body): Json<UpdateProductRequest>,
) -> Result<Json<ProductView>> {
    let mut v = Validator::new();
    if let Some(name) = &body.name {
        v.length(name, "name", 1, 200);
    }
    if let Some(description) = &body.description {
        v.length(description, "description", 0, 5000);
    }
    if let Some(category) = &body.category {
        v.length(category, "category", 1, 50);
    }
    if let Some(Some(sku)) = &body.sku {
        v.length(sku, "sku", 1, 64);
    }
    v.finish()?;

    let sku = body.sku.as_ref().map(|sku| sku.as_deref().map(normalize_sku));

    let updated = state
        .store()
        .write(|tx| {
            owned_product(tx.tables(), id, &actor)?;
            if let Some(Some(sku)) = &sku {
                if sku_taken(tx.tables(), sku, Some(id)) {
                    return Err(AppError::Conflict(format!("SKU '{sku}' already exists")));
                }
            }

            let product = tx
                .update::<Product>(id, |p| {
                    if let Some(name) = &body.name {
                        p.name = name.trim().to_string();
                    }
                    if let Some(description) = &body.description {
                        p.description = description.trim().to_string();
                    }
                    if let Some(category) = &body.category {
                        p.category = category.trim().to_lowercase();
                    }
                    if let Some(price) = body.price {
                        p.price = price;
                    }
                    if let Some(sku) = &sku {
                        p.sku.clone_from(sku);
                    }
                    p.updated_at = Utc::now();
                })
                .cloned()
                .ok_or_else(|| AppError::not_found("Product"))?;

            Ok(view(tx.tables(), &product))
        })
        .await?;

    Ok(Json(updated))
}

/// Delete a product with its reviews, inventory, and stock history.
///
/// DELETE /api/products/{id}
///
/// # Errors
///
/// Returns 403 unless owner or admin.
#[instrument(skip_all, fields(product_id = %id))]
pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(actor): RequireAuth,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    state
        .store()
        .write(|tx| {
            owned_product(tx.tables(), id, &actor)?;
            tx.remove::<Product>(id);
            tx.remove::<InventoryItem>(id);
            tx.remove_where::<Review>(|r| r.product_id == id);
            tx.remove_where::<StockAdjustment>(|a| a.product_id == id);
            Ok::<_, AppError>(())
        })
        .await?;

    tracing::info!(product_id = %id, "Product deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_sku() {
        assert_eq!(normalize_sku("  ab-12 "), "AB-12");
    }

    #[test]
    fn test_sort_names() {
        let sort: ProductSort = serde_json::from_str("\"price_desc\"").unwrap_or_default();
        assert_eq!(sort, ProductSort::PriceDesc);
    }
}
