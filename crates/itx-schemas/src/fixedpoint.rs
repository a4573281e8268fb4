//! Fixed-point money/price type.
//!
//! # Motivation
//!
//! All money amounts in this system use a 1e-6 (micros) fixed-point
//! representation stored as `i64`.  Using raw `i64` for money is error-prone:
//! it allows accidental arithmetic with unrelated integers (quantities, IDs,
//! prices at different scales) without any compile-time signal.
//!
//! `Micros` wraps the raw `i64` so the type system prevents:
//! - Implicit construction from raw `i64` (no `From<i64>` impl).
//! - Mixing `Micros` with unrelated `i64` values in arithmetic.
//!
//! # Scale
//!
//! 1 USD = 1_000_000 Micros.  All monetary values (cash, PnL, price × qty)
//! use this scale.  Non-monetary quantities (share counts, order IDs, day
//! counters) remain plain `i64`/`u64` and are never implicitly convertible.
//!
//! # Arithmetic
//!
//! - `Add`, `Sub`, `Neg`, `AddAssign`, `SubAssign` are implemented for
//!   `Micros op Micros`; these panic on overflow in debug builds and wrap in
//!   release (matching Rust's standard integer semantics).
//! - `saturating_add` / `saturating_sub` — safe alternatives that clamp at
//!   `i64::MAX` / `i64::MIN`.
//! - `checked_mul_qty(qty: i64) -> Option<Micros>` — multiply a per-unit
//!   Micros price by an integer share quantity with overflow detection.
//!   Returns `None` on overflow; callers must handle this explicitly.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

// ---------------------------------------------------------------------------
// Micros newtype
// ---------------------------------------------------------------------------

/// A fixed-point monetary amount at 1e-6 scale (micros).
///
/// 1 USD = `Micros(1_000_000)`.
///
/// # Construction
///
/// Use [`Micros::new`] for explicit construction.  There is intentionally
/// no `From<i64>` implementation — callers must be deliberate about when a
/// raw integer represents a monetary amount.
///
/// # Retrieval
///
/// Use [`Micros::raw`] to extract the underlying `i64` when crossing
/// crate or layer boundaries that require raw integers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Micros(i64);

impl Micros {
    /// Zero monetary amount.
    pub const ZERO: Micros = Micros(0);

    /// Maximum representable value.
    pub const MAX: Micros = Micros(i64::MAX);

    /// Minimum representable value.
    pub const MIN: Micros = Micros(i64::MIN);

    /// Construct a `Micros` from a raw `i64`.
    ///
    /// Prefer over transmutation; use only when the raw integer is known to
    /// represent a fixed-point monetary amount at 1e-6 scale.
    #[inline]
    pub const fn new(raw: i64) -> Self {
        Micros(raw)
    }

    /// Extract the underlying raw `i64`.
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Saturating addition — clamps at [`Micros::MAX`] on overflow.
    #[inline]
    pub fn saturating_add(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_add(rhs.0))
    }

    /// Saturating subtraction — clamps at [`Micros::MIN`] on underflow.
    #[inline]
    pub fn saturating_sub(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_sub(rhs.0))
    }

    /// Absolute value.  `Micros::MIN.abs()` saturates to `Micros::MAX`.
    #[inline]
    pub fn abs(self) -> Micros {
        Micros(self.0.saturating_abs())
    }

    /// Sign: returns `1`, `0`, or `-1` as a plain integer (not a Micros value).
    #[inline]
    pub fn signum(self) -> i64 {
        self.0.signum()
    }

    /// `true` if this amount is non-negative.
    #[inline]
    pub fn is_non_negative(self) -> bool {
        self.0 >= 0
    }

    /// `true` if this amount is strictly negative.
    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Multiply a per-unit price by an integer share quantity.
    ///
    /// Returns `None` if the multiplication overflows `i64`.  Callers MUST
    /// handle `None` explicitly; there is no implicit clamp here because
    /// overflow in a trade value calculation is a critical error, not a
    /// routine saturation.
    ///
    /// `qty` is a plain share count (not a Micros value).
    #[inline]
    pub fn checked_mul_qty(self, qty: i64) -> Option<Micros> {
        self.0.checked_mul(qty).map(Micros)
    }
}

// ---------------------------------------------------------------------------
// Arithmetic operators (closed over Micros)
// ---------------------------------------------------------------------------

impl Add for Micros {
    type Output = Micros;
    #[inline]
    fn add(self, rhs: Micros) -> Micros {
        Micros(self.0 + rhs.0)
    }
}

impl Sub for Micros {
    type Output = Micros;
    #[inline]
    fn sub(self, rhs: Micros) -> Micros {
        Micros(self.0 - rhs.0)
    }
}

impl Neg for Micros {
    type Output = Micros;
    #[inline]
    fn neg(self) -> Micros {
        Micros(-self.0)
    }
}

impl AddAssign for Micros {
    #[inline]
    fn add_assign(&mut self, rhs: Micros) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Micros {
    #[inline]
    fn sub_assign(&mut self, rhs: Micros) {
        self.0 -= rhs.0;
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl std::fmt::Display for Micros {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dollars = self.0 / 1_000_000;
        let frac = (self.0 % 1_000_000).abs();
        // When |value| < $1 and value is negative, dollars truncates to 0,
        // losing the sign.  Emit "-0" explicitly in that case.
        if self.0 < 0 && dollars == 0 {
            write!(f, "-{dollars}.{frac:06}")
        } else {
            write!(f, "{dollars}.{frac:06}")
        }
    }
}

// ---------------------------------------------------------------------------
// Decimal string round-trip (persistence: journals store decimals as text to
// avoid binary-float drift across process restarts)
// ---------------------------------------------------------------------------

impl Micros {
    /// Parse a plain decimal string (`"12.34"`, `"-0.5"`, `"7"`) into Micros.
    /// Rejects scientific notation and anything with more than 6 fractional
    /// digits (silent truncation would lose precision the caller didn't ask
    /// to lose).
    pub fn parse_decimal(s: &str) -> Result<Micros, ParseMicrosError> {
        let s = s.trim();
        let negative = s.starts_with('-');
        let unsigned = s.strip_prefix(['-', '+']).unwrap_or(s);
        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((i, f)) => (i, f),
            None => (unsigned, ""),
        };
        if frac_part.len() > 6 {
            return Err(ParseMicrosError::TooManyFractionalDigits);
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ParseMicrosError::Empty);
        }
        let int_val: i64 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| ParseMicrosError::InvalidDigits)?
        };
        let mut frac_digits = frac_part.to_string();
        while frac_digits.len() < 6 {
            frac_digits.push('0');
        }
        let frac_val: i64 = if frac_digits.is_empty() {
            0
        } else {
            frac_digits
                .parse()
                .map_err(|_| ParseMicrosError::InvalidDigits)?
        };
        let magnitude = int_val
            .checked_mul(1_000_000)
            .and_then(|v| v.checked_add(frac_val))
            .ok_or(ParseMicrosError::Overflow)?;
        Ok(Micros(if negative { -magnitude } else { magnitude }))
    }

    /// Render as a plain decimal string with six fractional digits, the
    /// inverse of [`Micros::parse_decimal`].
    pub fn to_decimal_string(self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMicrosError {
    Empty,
    InvalidDigits,
    TooManyFractionalDigits,
    Overflow,
}

impl std::fmt::Display for ParseMicrosError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseMicrosError::Empty => write!(f, "empty decimal string"),
            ParseMicrosError::InvalidDigits => write!(f, "invalid digits in decimal string"),
            ParseMicrosError::TooManyFractionalDigits => {
                write!(f, "more than 6 fractional digits")
            }
            ParseMicrosError::Overflow => write!(f, "decimal value overflows i64 micros"),
        }
    }
}

impl std::error::Error for ParseMicrosError {}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
