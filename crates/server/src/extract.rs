//! Request extractors whose rejections use the JSON error body.
//!
//! Axum's own `Json`, `Query`, and `Path` reject with plain-text bodies
//! (and 422 for JSON data errors). These wrappers turn every rejection into
//! an [`AppError::BadRequest`].

use axum::extract::{FromRequest, FromRequestParts};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;

/// JSON body extractor and response.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// Query string extractor.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct Query<T>(pub T);

/// Path parameter extractor.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct Path<T>(pub T);

/// For `#[serde(default, deserialize_with = "double_option")]` fields:
/// absent is `None`, `null` is `Some(None)`.
///
/// # Errors
///
/// Returns the inner deserializer's error.
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// =============================================================================
// Pagination
// =============================================================================

/// `?page=&per_page=` parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl Pagination {
    pub const DEFAULT_PER_PAGE: usize = 20;
    pub const MAX_PER_PAGE: usize = 100;

    /// 1-based page number.
    #[must_use]
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    #[must_use]
    pub fn per_page(&self) -> usize {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    /// Slice an already filtered and sorted list into one page.
    #[must_use]
    pub fn paginate<T>(&self, items: Vec<T>) -> Page<T> {
        let page = self.page();
        let per_page = self.per_page();
        let total = items.len();
        let skip = (page - 1).saturating_mul(per_page);

        Page {
            items: items.into_iter().skip(skip).take(per_page).collect(),
            page,
            per_page,
            total,
        }
    }
}

/// One page of a list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_clamping() {
        let p = Pagination::default();
        assert_eq!((p.page(), p.per_page()), (1, 20));

        let p = Pagination {
            page: Some(0),
            per_page: Some(1000),
        };
        assert_eq!((p.page(), p.per_page()), (1, 100));
    }

    #[test]
    fn test_paginate() {
        let p = Pagination {
            page: Some(2),
            per_page: Some(3),
        };
        let page = p.paginate((1..=7).collect());
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total, 7);

        let past_end = Pagination {
            page: Some(9),
            per_page: Some(3),
        }
        .paginate((1..=7).collect::<Vec<i32>>());
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 7);
    }
}
