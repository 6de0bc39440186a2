//! OCC option symbol parsing and formatting.
//!
//! Broker feeds identify option contracts with compact OCC symbols such as
//! `SPY260117C00695000`: a 1-6 character underlying root, a 6-digit
//! `YYMMDD` expiry, a `C`/`P` type character, and an 8-digit strike
//! expressed as price × 1000.
//!
//! Parsing is a pure function: input is accepted case-insensitively and
//! normalized so that `format(parse(s)) == normalize(s)` for every
//! well-formed identifier.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Strike digits encode price × 1000.
const STRIKE_SCALE: u32 = 3;

/// Length of the fixed-width tail: 6 date digits + type char + 8 strike digits.
const TAIL_LEN: usize = 15;

/// Maximum length of the underlying root.
const MAX_ROOT_LEN: usize = 6;

/// Errors from option symbol parsing.
///
/// Each variant is fatal for the single record carrying the symbol; batch
/// processing continues over the remainder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    /// The string does not match the fixed-width OCC layout.
    #[error("symbol '{raw}' does not match the OCC option layout")]
    Layout {
        /// The offending input.
        raw: String,
    },

    /// The six date digits do not form a valid calendar date.
    #[error("symbol '{raw}' encodes an invalid expiry date")]
    InvalidExpiry {
        /// The offending input.
        raw: String,
    },

    /// The strike digits decode to zero.
    #[error("symbol '{raw}' encodes a zero strike")]
    ZeroStrike {
        /// The offending input.
        raw: String,
    },
}

/// Option right (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionRight {
    /// Call option (right to buy).
    Call,
    /// Put option (right to sell).
    Put,
}

impl OptionRight {
    /// The single-letter OCC encoding.
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::Call => 'C',
            Self::Put => 'P',
        }
    }
}

impl fmt::Display for OptionRight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "Call"),
            Self::Put => write!(f, "Put"),
        }
    }
}

/// A parsed, validated option contract identifier.
///
/// Immutable once parsed. Invariants: strike > 0, expiry is a valid
/// calendar date, underlying is uppercase.
///
/// Two-digit years expand to `2000 + YY`; contracts expiring past 2099
/// are not representable (listed options do not trade that far out).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OccSymbol {
    underlying: String,
    expiry: NaiveDate,
    right: OptionRight,
    strike: Decimal,
    raw: String,
}

impl OccSymbol {
    /// Parse a raw broker symbol.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolError`] when the input does not match the layout,
    /// encodes an impossible date, or has a zero strike.
    pub fn parse(raw: &str) -> Result<Self, SymbolError> {
        let normalized = raw.trim().to_uppercase();
        let len = normalized.len();

        if !normalized.is_ascii() || len <= TAIL_LEN || len > TAIL_LEN + MAX_ROOT_LEN {
            return Err(SymbolError::Layout {
                raw: raw.to_string(),
            });
        }

        let (root, tail) = normalized.split_at(len - TAIL_LEN);
        if root.is_empty() || !root.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SymbolError::Layout {
                raw: raw.to_string(),
            });
        }

        let (date_part, rest) = tail.split_at(6);
        let (right_part, strike_part) = rest.split_at(1);

        if !date_part.chars().all(|c| c.is_ascii_digit())
            || !strike_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(SymbolError::Layout {
                raw: raw.to_string(),
            });
        }

        let right = match right_part {
            "C" => OptionRight::Call,
            "P" => OptionRight::Put,
            _ => {
                return Err(SymbolError::Layout {
                    raw: raw.to_string(),
                });
            }
        };

        let yy: i32 = date_part[0..2].parse().map_err(|_| SymbolError::Layout {
            raw: raw.to_string(),
        })?;
        let mm: u32 = date_part[2..4].parse().map_err(|_| SymbolError::Layout {
            raw: raw.to_string(),
        })?;
        let dd: u32 = date_part[4..6].parse().map_err(|_| SymbolError::Layout {
            raw: raw.to_string(),
        })?;

        let expiry =
            NaiveDate::from_ymd_opt(2000 + yy, mm, dd).ok_or_else(|| SymbolError::InvalidExpiry {
                raw: raw.to_string(),
            })?;

        let strike_millis: i64 = strike_part.parse().map_err(|_| SymbolError::Layout {
            raw: raw.to_string(),
        })?;
        if strike_millis == 0 {
            return Err(SymbolError::ZeroStrike {
                raw: raw.to_string(),
            });
        }
        let strike = Decimal::new(strike_millis, STRIKE_SCALE).normalize();

        Ok(Self {
            underlying: root.to_string(),
            expiry,
            right,
            strike,
            raw: normalized,
        })
    }

    /// Underlying ticker (uppercase).
    #[must_use]
    pub fn underlying(&self) -> &str {
        &self.underlying
    }

    /// Expiration date.
    #[must_use]
    pub const fn expiry(&self) -> NaiveDate {
        self.expiry
    }

    /// Call or put.
    #[must_use]
    pub const fn right(&self) -> OptionRight {
        self.right
    }

    /// Strike price.
    #[must_use]
    pub const fn strike(&self) -> Decimal {
        self.strike
    }

    /// The normalized identifier this symbol was parsed from.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for OccSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Parsing is the only constructor, so the canonical form was fixed
        // at parse time.
        write!(f, "{}", self.raw)
    }
}

impl FromStr for OccSymbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
