use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::{ConfigurationError, EngineResult};

/// Decimal places carried by one minor unit (cents).
pub const MINOR_UNIT_SCALE: u32 = 2;
const MINOR_PER_MAJOR: i64 = 100;

/// Largest magnitude any intermediate amount may reach: 10^15 major units.
pub const MONEY_LIMIT_MINOR: i64 = 100_000_000_000_000_000;

/// A currency amount held as an integer count of minor units.
///
/// Arithmetic never leaves the integer domain except when an amount is scaled
/// by a rate, and that product is rounded half-to-even straight back into
/// minor units. Every result is checked against [`MONEY_LIMIT_MINOR`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Whole major units from a literal known to be in range.
    pub(crate) const fn from_major(major: i64) -> Self {
        Self(major * MINOR_PER_MAJOR)
    }

    pub fn try_from_major(major: i64) -> EngineResult<Self> {
        let minor = major
            .checked_mul(MINOR_PER_MAJOR)
            .ok_or(ConfigurationError::NumericOverflow { stage: "amount" })?;
        bounded(minor, "amount")
    }

    /// Converts a major-unit decimal (e.g. `1234.565`) into minor units,
    /// rounding half-to-even.
    pub fn from_decimal(major: Decimal) -> EngineResult<Self> {
        let minor = major
            .checked_mul(Decimal::from(MINOR_PER_MAJOR))
            .ok_or(ConfigurationError::NumericOverflow { stage: "amount" })?;
        round_to_minor(minor, "amount")
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, MINOR_UNIT_SCALE)
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money, stage: &'static str) -> EngineResult<Money> {
        let sum = self
            .0
            .checked_add(other.0)
            .ok_or(ConfigurationError::NumericOverflow { stage })?;
        bounded(sum, stage)
    }

    pub fn checked_sub(self, other: Money, stage: &'static str) -> EngineResult<Money> {
        let diff = self
            .0
            .checked_sub(other.0)
            .ok_or(ConfigurationError::NumericOverflow { stage })?;
        bounded(diff, stage)
    }

    /// `self - other`, floored at zero.
    pub fn shortfall_from(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0).max(0))
    }

    /// Multiplies by a decimal factor and rounds half-to-even.
    pub fn scale(self, factor: Decimal, stage: &'static str) -> EngineResult<Money> {
        let product = Decimal::from(self.0)
            .checked_mul(factor)
            .ok_or(ConfigurationError::NumericOverflow { stage })?;
        round_to_minor(product, stage)
    }

    /// Like [`Money::scale`] but rounds any fractional minor unit upward, for
    /// targets that must never be undershot.
    pub fn scale_ceil(self, factor: Decimal, stage: &'static str) -> EngineResult<Money> {
        let product = Decimal::from(self.0)
            .checked_mul(factor)
            .ok_or(ConfigurationError::NumericOverflow { stage })?;
        let rounded = product
            .ceil()
            .to_i64()
            .ok_or(ConfigurationError::NumericOverflow { stage })?;
        bounded(rounded, stage)
    }

    /// One period of growth on this balance at `rate`.
    pub fn growth_at(self, rate: Rate, stage: &'static str) -> EngineResult<Money> {
        self.scale(rate.as_decimal(), stage)
    }

    /// Balance after one period of growth at `rate`.
    pub fn grown_by(self, rate: Rate, stage: &'static str) -> EngineResult<Money> {
        let growth = self.growth_at(rate, stage)?;
        self.checked_add(growth, stage)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Serialize::serialize(&self.to_decimal(), serializer)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let major = <Decimal as Deserialize>::deserialize(deserializer)?;
        Money::from_decimal(major).map_err(D::Error::custom)
    }
}

fn bounded(minor: i64, stage: &'static str) -> EngineResult<Money> {
    if minor.unsigned_abs() > MONEY_LIMIT_MINOR as u64 {
        return Err(ConfigurationError::NumericOverflow { stage });
    }
    Ok(Money(minor))
}

fn round_to_minor(minor: Decimal, stage: &'static str) -> EngineResult<Money> {
    let rounded = minor
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        .to_i64()
        .ok_or(ConfigurationError::NumericOverflow { stage })?;
    bounded(rounded, stage)
}

/// An annual rate expressed as an exact decimal fraction (`0.05` is 5%).
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    pub const fn new(fraction: Decimal) -> Self {
        Self(fraction)
    }

    pub fn from_percent(percent: Decimal) -> Self {
        Self(percent / Decimal::ONE_HUNDRED)
    }

    pub const fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// `(1 + rate)^years` as a deterministic decimal product. Precision is
    /// rust_decimal's 28 significant digits, so long horizons round.
    pub fn compound(self, years: u32, stage: &'static str) -> EngineResult<Decimal> {
        let base = Decimal::ONE
            .checked_add(self.0)
            .ok_or(ConfigurationError::NumericOverflow { stage })?;
        let mut factor = Decimal::ONE;
        for _ in 0..years {
            factor = factor
                .checked_mul(base)
                .ok_or(ConfigurationError::NumericOverflow { stage })?;
        }
        Ok(factor)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
