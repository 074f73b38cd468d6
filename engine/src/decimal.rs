//! Exact-precision price and quantity primitives.
//!
//! The source system uses an arbitrary-precision decimal. Per the Design
//! Notes this is ported to a fixed-scale decimal backed by `rust_decimal`'s
//! 96-bit mantissa (28-29 significant digits), which comfortably covers
//! venue price/quantity scales and is orders of magnitude cheaper than an
//! arbitrary-precision type. `f64` is only ever reached at the statistical
//! layer (`anomaly` module), never in book or metrics arithmetic.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::fmt;

/// An exact price. Non-negative by construction at the parser boundary;
/// the type itself does not enforce this so that intermediate arithmetic
/// (e.g. `ask - bid`) stays cheap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(pub Decimal);

/// An exact quantity. `Qty::ZERO` is the sentinel for "level removed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Qty(pub Decimal);

impl Price {
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Convert to `f64` at the final statistical boundary only.
    pub fn to_f64(&self) -> Option<f64> {
        self.0.to_f64()
    }
}

impl Qty {
    pub const ZERO: Qty = Qty(Decimal::ZERO);

    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn to_f64(&self) -> Option<f64> {
        self.0.to_f64()
    }
}

impl std::ops::Add for Price {
    type Output = Price;
    fn add(self, rhs: Price) -> Price {
        Price(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Price {
    type Output = Price;
    fn sub(self, rhs: Price) -> Price {
        Price(self.0 - rhs.0)
    }
}

impl std::ops::Add for Qty {
    type Output = Qty;
    fn add(self, rhs: Qty) -> Qty {
        Qty(self.0 + rhs.0)
    }
}

impl std::ops::Mul<Qty> for Price {
    type Output = Decimal;
    /// Notional value `price * qty`, exact.
    fn mul(self, rhs: Qty) -> Decimal {
        self.0 * rhs.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Qty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
