//! Validation helpers for query parameters.

use banner_core::{BannerFilter, FeatureId, TagId};

use crate::error::{ApiError, ApiResult};
use crate::types::BannerListQuery;

/// Trait for validating that a signed value is not negative.
///
/// # Example
/// ```ignore
/// use banner_api::validation::ValidateNonNegative;
///
/// let offset = (-1i64).validate_non_negative("offset");
/// assert!(offset.is_err());
/// ```
pub trait ValidateNonNegative {
    /// Validate and convert to an unsigned value.
    ///
    /// # Errors
    /// Returns `ApiError::invalid_range` if the value is below zero.
    fn validate_non_negative(&self, field_name: &str) -> ApiResult<u64>;
}

impl ValidateNonNegative for i64 {
    fn validate_non_negative(&self, field_name: &str) -> ApiResult<u64> {
        u64::try_from(*self).map_err(|_| ApiError::invalid_range(field_name, 0, i64::MAX))
    }
}

impl BannerListQuery {
    /// Build a store filter, applying `default_limit` when the request gives
    /// no limit or a limit of 0. A `default_limit` of 0 means unlimited.
    pub fn into_filter(self, default_limit: u64) -> ApiResult<BannerFilter> {
        let limit = match self.limit {
            Some(limit) => match limit.validate_non_negative("limit")? {
                0 => default_limit,
                limit => limit,
            },
            None => default_limit,
        };
        let offset = match self.offset {
            Some(offset) => offset.validate_non_negative("offset")?,
            None => 0,
        };

        Ok(BannerFilter {
            feature_id: self.feature_id.map(FeatureId),
            tag_id: self.tag_id.map(TagId),
            limit: (limit > 0).then_some(limit),
            offset,
        })
    }
}
