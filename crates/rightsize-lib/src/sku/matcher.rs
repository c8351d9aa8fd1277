//! Right-size selection over a size catalog
//!
//! A candidate is eligible when it keeps at least half of the current cores
//! and memory while being strictly smaller in both. Among eligible
//! candidates the first one whose name has the same family shape as the
//! current size wins, so the result depends on catalog order.

use crate::models::{ResizeDecision, SkuProfile};

use super::tokens::SkuNameTokens;

/// Whether `candidate` falls in `[current / 2, current)` for both cores and
/// memory. Halves are compared by doubling, which is exact for integers.
pub fn is_eligible(current: &SkuProfile, candidate: &SkuProfile) -> bool {
    candidate.cores.saturating_mul(2) >= current.cores
        && candidate.cores < current.cores
        && candidate.memory_mb.saturating_mul(2) >= current.memory_mb
        && candidate.memory_mb < current.memory_mb
}

/// Whether `candidate` belongs to the same SKU family shape as `current`
pub fn is_compatible(current: &SkuNameTokens, candidate: &SkuNameTokens) -> bool {
    if !current.same_shape(candidate) {
        return false;
    }

    if current.is_promo() {
        return candidate.is_promo()
            && candidate.second_to_last() == current.second_to_last()
            && current.aligns_with(candidate);
    }

    let suffix_matches = match current.len() {
        4 => candidate.trailing(2) == current.trailing(2),
        3 => candidate.last() == current.last(),
        _ => true,
    };

    suffix_matches && current.aligns_with(candidate)
}

/// Stateless size matcher
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeMatcher;

impl SizeMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Pick the first candidate, in the given order, that is both eligible
    /// and compatible with `current`.
    ///
    /// Returns `None` when nothing qualifies or when `current` has a name
    /// that cannot be tokenized. Candidates with malformed names are skipped.
    pub fn select_right_size<'a>(
        &self,
        current: &SkuProfile,
        candidates: &'a [SkuProfile],
    ) -> Option<&'a SkuProfile> {
        let current_tokens = match SkuNameTokens::parse(&current.name) {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::debug!(sku = %current.name, error = %e, "Current size name not matchable");
                return None;
            }
        };

        candidates
            .iter()
            .filter(|c| is_eligible(current, c))
            .find(|c| match SkuNameTokens::parse(&c.name) {
                Ok(tokens) => is_compatible(&current_tokens, &tokens),
                Err(e) => {
                    tracing::trace!(sku = %c.name, error = %e, "Skipping malformed candidate");
                    false
                }
            })
    }

    /// Run selection and wrap the result in a [`ResizeDecision`]
    pub fn decide(&self, current: &SkuProfile, candidates: &[SkuProfile]) -> ResizeDecision {
        match self.select_right_size(current, candidates) {
            Some(chosen) => ResizeDecision::resized(current.clone(), chosen.clone()),
            None => ResizeDecision::no_candidate(current.clone()),
        }
    }
}

/// Convenience wrapper around [`SizeMatcher::select_right_size`]
pub fn select_right_size<'a>(
    current: &SkuProfile,
    candidates: &'a [SkuProfile],
) -> Option<&'a SkuProfile> {
    SizeMatcher.select_right_size(current, candidates)
}
