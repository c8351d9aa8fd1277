//! SKU name tokenization
//!
//! Azure size names are `_`-separated segments, e.g. `Standard_D4s_v3` or
//! `Standard_DS2_v2_Promo`. The second segment carries the family letter and
//! a trailing `Promo` segment marks a preview tier variant.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Trailing segment marking a preview (promotional) tier
pub const PROMO_SEGMENT: &str = "Promo";

/// Smallest supported number of name segments
pub const MIN_SEGMENTS: usize = 2;

/// Largest supported number of name segments
pub const MAX_SEGMENTS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkuNameError {
    #[error("SKU name is empty")]
    Empty,

    #[error("SKU name '{name}' has {count} segments, expected 2 to 4")]
    UnsupportedShape { name: String, count: usize },

    #[error("SKU name '{0}' has an empty family segment")]
    MissingFamily(String),
}

/// A SKU name split into its `_`-separated segments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SkuNameTokens {
    raw: String,
    tokens: Vec<String>,
    family: char,
}

impl SkuNameTokens {
    pub fn parse(name: &str) -> Result<Self, SkuNameError> {
        if name.is_empty() {
            return Err(SkuNameError::Empty);
        }

        let tokens: Vec<String> = name.split('_').map(str::to_string).collect();
        if !(MIN_SEGMENTS..=MAX_SEGMENTS).contains(&tokens.len()) {
            return Err(SkuNameError::UnsupportedShape {
                name: name.to_string(),
                count: tokens.len(),
            });
        }

        let family = tokens[1]
            .chars()
            .next()
            .ok_or_else(|| SkuNameError::MissingFamily(name.to_string()))?;

        Ok(Self {
            raw: name.to_string(),
            tokens,
            family,
        })
    }

    /// Number of segments (always 2..=4)
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Leading character of the second segment (`D` in `Standard_D4s_v3`)
    pub fn family(&self) -> char {
        self.family
    }

    pub fn is_promo(&self) -> bool {
        self.last() == PROMO_SEGMENT
    }

    pub fn last(&self) -> &str {
        &self.tokens[self.tokens.len() - 1]
    }

    /// Second-to-last segment; the tier/version segment for Promo names
    pub fn second_to_last(&self) -> &str {
        &self.tokens[self.tokens.len() - 2]
    }

    /// The trailing `n` segments (clamped to the segment count)
    pub fn trailing(&self, n: usize) -> &[String] {
        let start = self.tokens.len().saturating_sub(n);
        &self.tokens[start..]
    }

    pub fn same_shape(&self, other: &SkuNameTokens) -> bool {
        self.len() == other.len() && self.family == other.family
    }

    /// Digit-wildcard alignment against another name, see [`digits_align`]
    pub fn aligns_with(&self, other: &SkuNameTokens) -> bool {
        digits_align(&self.raw, &other.raw)
    }
}

impl FromStr for SkuNameTokens {
    type Err = SkuNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SkuNameTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Position-by-position comparison where digits act as wildcards.
///
/// Names of different length never align. At each position both characters
/// must be equal, or both must be ASCII digits.
pub fn digits_align(current: &str, candidate: &str) -> bool {
    if current.chars().count() != candidate.chars().count() {
        return false;
    }

    current
        .chars()
        .zip(candidate.chars())
        .all(|(a, b)| a == b || (a.is_ascii_digit() && b.is_ascii_digit()))
}
