//! Product reviews and ratings.

use axum::{extract::State, http::StatusCode};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tradepost_core::{NotificationKind, ProductId, Rating, RatingSummary, ReviewId};

use crate::error::{AppError, Result, Validator};
use crate::extract::{Json, Page, Pagination, Path, Query};
use crate::middleware::RequireAuth;
use crate::models::{Product, Review, User};
use crate::routes::products::rating_summary;
use crate::services::notifier::{self, Draft};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub rating: Rating,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<Rating>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewView {
    #[serde(flatten)]
    pub review: Review,
    pub author_name: Option<String>,
}

const MAX_COMMENT_LENGTH: usize = 2000;

/// Reviews of a product, newest first.
///
/// GET /api/products/{id}/reviews
///
/// # Errors
///
/// Returns 404 if the product does not exist.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(product_id): Path<ProductId>,
    Query(page): Query<Pagination>,
) -> Result<Json<Page<ReviewView>>> {
    let mut reviews = state
        .store()
        .read(|t| {
            t.get::<Product>(product_id)?;
            Some(
                t.all::<Review>()
                    .filter(|r| r.product_id == product_id)
                    .map(|r| ReviewView {
                        review: r.clone(),
                        author_name: t.get::<User>(r.user_id).map(|u| u.display_name.clone()),
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .await
        .ok_or_else(|| AppError::not_found("Product"))?;

    reviews.sort_by(|a, b| b.review.created_at.cmp(&a.review.created_at));
    Ok(Json(page.paginate(reviews)))
}

/// Rating summary for a product.
///
/// GET /api/products/{id}/rating
///
/// # Errors
///
/// Returns 404 if the product does not exist.
pub async fn rating(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<Json<RatingSummary>> {
    state
        .store()
        .read(|t| {
            t.get::<Product>(product_id)
                .map(|_| rating_summary(t, product_id))
        })
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found("Product"))
}

/// Review a product. One review per user per product.
///
/// POST /api/products/{id}/reviews
///
/// # Errors
///
/// Returns 403 for the product's own seller and 409 for a second review.
#[instrument(skip_all, fields(product_id = %product_id, user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
    Json(body): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>)> {
    let mut v = Validator::new();
    v.length(&body.comment, "comment", 0, MAX_COMMENT_LENGTH);
    v.finish()?;

    let (review, notifications) = state
        .store()
        .write(|tx| {
            let product = tx
                .get::<Product>(product_id)
                .cloned()
                .ok_or_else(|| AppError::not_found("Product"))?;
            if product.seller_id == user.id {
                return Err(AppError::Forbidden(
                    "Sellers cannot review their own products".to_string(),
                ));
            }
            if tx
                .tables()
                .all::<Review>()
                .any(|r| r.product_id == product_id && r.user_id == user.id)
            {
                return Err(AppError::Conflict(
                    "You have already reviewed this product".to_string(),
                ));
            }

            let now = Utc::now();
            let review = Review {
                id: ReviewId::new(),
                product_id,
                user_id: user.id,
                rating: body.rating,
                comment: body.comment.trim().to_string(),
                created_at: now,
                updated_at: now,
            };
            tx.put(review.clone());

            let draft = Draft::new(
                NotificationKind::ReviewPosted,
                format!("New {}-star review", review.rating.get()),
                format!("{} reviewed {}", user.display_name, product.name),
            )
            .with_data(serde_json::json!({
                "product_id": product_id,
                "review_id": review.id,
            }));
            let notifications = notifier::stage(tx, [product.seller_id], &draft);

            Ok((review, notifications))
        })
        .await?;

    state.notifier().deliver(&notifications);
    Ok((StatusCode::CREATED, Json(review)))
}

/// Edit your own review.
///
/// PUT /api/reviews/{id}
///
/// # Errors
///
/// Returns 403 for anyone but the author.
#[instrument(skip_all, fields(review_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ReviewId>,
    Json(body): Json<UpdateReviewRequest>,
) -> Result<Json<Review>> {
    let mut v = Validator::new();
    if let Some(comment) = &body.comment {
        v.length(comment, "comment", 0, MAX_COMMENT_LENGTH);
    }
    v.finish()?;

    let review = state
        .store()
        .write(|tx| {
            let existing = tx
                .get::<Review>(id)
                .ok_or_else(|| AppError::not_found("Review"))?;
            if existing.user_id != user.id {
                return Err(AppError::forbidden());
            }

            tx.update::<Review>(id, |r| {
                if let Some(rating) = body.rating {
                    r.rating = rating;
                }
                if let Some(comment) = &body.comment {
                    r.comment = comment.trim().to_string();
                }
                r.updated_at = Utc::now();
            })
            .cloned()
            .ok_or_else(|| AppError::not_found("Review"))
        })
        .await?;

    Ok(Json(review))
}

/// Delete a review (author or admin).
///
/// DELETE /api/reviews/{id}
///
/// # Errors
///
/// Returns 403 for anyone but the author or an admin.
#[instrument(skip_all, fields(review_id = %id))]
pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ReviewId>,
) -> Result<StatusCode> {
    state
        .store()
        .write(|tx| {
            let existing = tx
                .get::<Review>(id)
                .ok_or_else(|| AppError::not_found("Review"))?;
            if existing.user_id != user.id && !user.role.is_admin() {
                return Err(AppError::forbidden());
            }
            tx.remove::<Review>(id);
            Ok(())
        })
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
