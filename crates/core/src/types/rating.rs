//! Review star ratings and their aggregate.

use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingError {
    #[error("rating must be between 1 and 5 (got {0})")]
    OutOfRange(i64),
}

/// A 1-5 star rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// # Errors
    ///
    /// Returns `RatingError::OutOfRange` unless `1 <= value <= 5`.
    pub fn new(value: i64) -> Result<Self, RatingError> {
        u8::try_from(value)
            .ok()
            .filter(|v| (Self::MIN..=Self::MAX).contains(v))
            .map(Self)
            .ok_or(RatingError::OutOfRange(value))
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = RatingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

/// Aggregate of a product's ratings.
///
/// The average is the arithmetic mean rounded to one decimal place, and is
/// `None` when there are no ratings at all rather than a misleading `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RatingSummary {
    pub count: usize,
    pub average: Option<f64>,
    /// Number of ratings per star, index 0 is one star.
    pub histogram: [usize; 5],
}

impl RatingSummary {
    /// Summarize a set of ratings.
    ///
    /// ```
    /// use tradepost_core::{Rating, RatingSummary};
    ///
    /// let ratings = [5, 4, 4].map(|r| Rating::new(r).unwrap());
    /// let summary = RatingSummary::from_ratings(ratings);
    /// assert_eq!(summary.count, 3);
    /// assert_eq!(summary.average, Some(4.3));
    /// ```
    pub fn from_ratings(ratings: impl IntoIterator<Item = Rating>) -> Self {
        let mut histogram = [0usize; 5];
        let mut sum = 0u64;
        let mut count = 0usize;

        for rating in ratings {
            if let Some(bucket) = histogram.get_mut(usize::from(rating.get() - 1)) {
                *bucket += 1;
            }
            sum += u64::from(rating.get());
            count += 1;
        }

        let average = (count > 0).then(|| {
            #[allow(clippy::cast_precision_loss)] // counts of reviews stay far below 2^52
            let mean = sum as f64 / count as f64;
            (mean * 10.0).round() / 10.0
        });

        Self {
            count,
            average,
            histogram,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ratings(values: &[i64]) -> Vec<Rating> {
        values.iter().map(|v| Rating::new(*v).unwrap()).collect()
    }

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(1).is_ok());
        assert!(Rating::new(5).is_ok());
        assert_eq!(Rating::new(0), Err(RatingError::OutOfRange(0)));
        assert_eq!(Rating::new(6), Err(RatingError::OutOfRange(6)));
        assert_eq!(Rating::new(-3), Err(RatingError::OutOfRange(-3)));
    }

    #[test]
    fn test_rating_deserialize_validates() {
        assert_eq!(serde_json::from_str::<Rating>("4").unwrap().get(), 4);
        assert!(serde_json::from_str::<Rating>("9").is_err());
    }

    #[test]
    fn test_empty_summary_has_no_average() {
        let summary = RatingSummary::from_ratings(Vec::new());
        assert_eq!(summary.count, 0);
        assert_eq!(summary.average, None);
        assert_eq!(summary.histogram, [0; 5]);
    }

    #[test]
    fn test_average_rounds_to_one_decimal() {
        // 14 / 3 = 4.666..
        let summary = RatingSummary::from_ratings(ratings(&[5, 5, 4]));
        assert_eq!(summary.average, Some(4.7));

        // 7 / 4 = 1.75 rounds half away from zero
        let summary = RatingSummary::from_ratings(ratings(&[1, 2, 2, 2]));
        assert_eq!(summary.average, Some(1.8));
    }

    #[test]
    fn test_histogram_counts_each_star() {
        let summary = RatingSummary::from_ratings(ratings(&[1, 3, 3, 5, 5, 5]));
        assert_eq!(summary.histogram, [1, 0, 2, 0, 3]);
        assert_eq!(summary.count, 6);
    }
}
