// crates/chainpulse-core/src/core/category.rs
// ============================================================================
// Module: ChainPulse Categories
// Description: Closed insight category set and its on-ledger integer codes.
// Purpose: Map generator category strings to ledger codes without a fallback bucket.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Categories are a closed enumeration. [`Category::parse`] is the only mapping
//! from the generator's string form and it fails on anything it does not know;
//! there is no "unknown" variant that could reach the ledger.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Category
// ============================================================================

/// Insight category as committed on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Market trend commentary.
    Trend,
    /// Risk warning.
    Risk,
    /// Large holder movement.
    WhaleAlert,
    /// General market insight.
    MarketInsight,
}

impl Category {
    /// All categories in code order.
    pub const ALL: [Self; 4] = [Self::Trend, Self::Risk, Self::WhaleAlert, Self::MarketInsight];

    /// Returns the ledger code (0..=3).
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Trend => 0,
            Self::Risk => 1,
            Self::WhaleAlert => 2,
            Self::MarketInsight => 3,
        }
    }

    /// Returns the upper-case display name used by the generator.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Trend => "TREND",
            Self::Risk => "RISK",
            Self::WhaleAlert => "WHALE_ALERT",
            Self::MarketInsight => "MARKET_INSIGHT",
        }
    }

    /// Maps a ledger code back to its category.
    ///
    /// # Errors
    ///
    /// Returns [`CategoryError::UnknownCode`] for codes above 3.
    pub const fn from_code(code: u8) -> Result<Self, CategoryError> {
        match code {
            0 => Ok(Self::Trend),
            1 => Ok(Self::Risk),
            2 => Ok(Self::WhaleAlert),
            3 => Ok(Self::MarketInsight),
            other => Err(CategoryError::UnknownCode(other)),
        }
    }

    /// Maps an external category string (case-sensitive) to a category.
    ///
    /// # Errors
    ///
    /// Returns [`CategoryError::UnknownName`] when the string is not one of the four names.
    pub fn parse(name: &str) -> Result<Self, CategoryError> {
        Self::ALL
            .into_iter()
            .find(|category| category.name() == name)
            .ok_or_else(|| CategoryError::UnknownName(name.to_string()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = CategoryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Category mapping failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryError {
    /// External string does not name a known category.
    #[error("unknown category: {0}")]
    UnknownName(String),
    /// Ledger code is outside 0..=3.
    #[error("unknown category code: {0}")]
    UnknownCode(u8),
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions favor direct unwrap/expect for clarity."
    )]

    use super::*;

    #[test]
    fn codes_and_names_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_code(category.code()).unwrap(), category);
            assert_eq!(Category::parse(category.name()).unwrap(), category);
        }
        assert_eq!(Category::Trend.code(), 0);
        assert_eq!(Category::MarketInsight.code(), 3);
    }

    #[test]
    fn parse_is_case_sensitive_and_closed() {
        assert_eq!(
            Category::parse("UNKNOWN_CATEGORY"),
            Err(CategoryError::UnknownName("UNKNOWN_CATEGORY".to_string()))
        );
        assert!(Category::parse("risk").is_err());
        assert_eq!(Category::from_code(4), Err(CategoryError::UnknownCode(4)));
    }

    #[test]
    fn serde_uses_display_names() {
        let json = serde_json::to_string(&Category::WhaleAlert).unwrap();
        assert_eq!(json, "\"WHALE_ALERT\"");
    }
}
