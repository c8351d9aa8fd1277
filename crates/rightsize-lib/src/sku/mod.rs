//! SKU naming and right-size selection

mod matcher;
mod tokens;

pub use matcher::{is_compatible, is_eligible, select_right_size, SizeMatcher};
pub use tokens::{
    digits_align, SkuNameError, SkuNameTokens, MAX_SEGMENTS, MIN_SEGMENTS, PROMO_SEGMENT,
};

use crate::models::SkuProfile;

/// Find the catalog entry for a size name (exact match)
pub fn find_profile<'a>(catalog: &'a [SkuProfile], name: &str) -> Option<&'a SkuProfile> {
    catalog.iter().find(|s| s.name == name)
}
