use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::error::{ConfigurationError, EngineResult};
use super::money::{Money, Rate};
use super::types::PersonProfile;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetClass {
    Equity,
    Debt,
    Gold,
    Savings,
}

impl AssetClass {
    pub fn expected_return(self) -> Rate {
        match self {
            AssetClass::Equity => Rate::new(dec!(0.12)),
            AssetClass::Debt => Rate::new(dec!(0.07)),
            AssetClass::Gold => Rate::new(dec!(0.06)),
            AssetClass::Savings => Rate::new(dec!(0.04)),
        }
    }
}

/// Risk appetite on a 1 (cautious) to 5 (aggressive) scale.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RiskLevel(u8);

impl RiskLevel {
    pub const LOWEST: RiskLevel = RiskLevel(1);
    pub const HIGHEST: RiskLevel = RiskLevel(5);

    pub fn new(level: u8) -> EngineResult<Self> {
        if !(Self::LOWEST.0..=Self::HIGHEST.0).contains(&level) {
            return Err(ConfigurationError::InvalidRate {
                field: "risk level",
                reason: format!("{level} is outside 1..=5"),
            });
        }
        Ok(Self(level))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Portfolio weights for this level; they sum to one.
    pub fn allocation(self) -> [(AssetClass, Decimal); 4] {
        let [equity, debt, gold, savings] = match self.0 {
            1 => [dec!(0.25), dec!(0.45), dec!(0.10), dec!(0.20)],
            2 => [dec!(0.35), dec!(0.40), dec!(0.10), dec!(0.15)],
            3 => [dec!(0.50), dec!(0.30), dec!(0.10), dec!(0.10)],
            4 => [dec!(0.65), dec!(0.20), dec!(0.10), dec!(0.05)],
            _ => [dec!(0.75), dec!(0.10), dec!(0.10), dec!(0.05)],
        };
        [
            (AssetClass::Equity, equity),
            (AssetClass::Debt, debt),
            (AssetClass::Gold, gold),
            (AssetClass::Savings, savings),
        ]
    }
}

impl TryFrom<u8> for RiskLevel {
    type Error = ConfigurationError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::new(level)
    }
}

impl From<RiskLevel> for u8 {
    fn from(level: RiskLevel) -> Self {
        level.0
    }
}

/// Weighted expected return of the level's allocation.
pub fn portfolio_return(level: RiskLevel) -> Rate {
    let blended = level
        .allocation()
        .iter()
        .map(|(asset, weight)| *weight * asset.expected_return().as_decimal())
        .sum::<Decimal>();
    Rate::new(blended)
}

/// Risk the plan can carry given the time left, one notch higher when
/// contributions are behind.
pub fn system_risk_level(years_to_retirement: u32, is_behind: bool) -> RiskLevel {
    let base = if years_to_retirement > 25 {
        4
    } else if years_to_retirement > 15 {
        3
    } else {
        2
    };
    let level = if is_behind { (base + 1).min(5) } else { base };
    RiskLevel(level)
}

/// 60/40 blend of the user's tolerance and the system suggestion.
pub fn blended_risk(user: RiskLevel, system: RiskLevel) -> RiskLevel {
    let weighted = dec!(0.6) * Decimal::from(user.0) + dec!(0.4) * Decimal::from(system.0);
    let level = weighted
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        .to_u8()
        .unwrap_or(RiskLevel::LOWEST.0)
        .clamp(RiskLevel::LOWEST.0, RiskLevel::HIGHEST.0);
    RiskLevel(level)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAllocation {
    pub asset: AssetClass,
    pub weight: Rate,
    pub monthly_amount: Money,
}

pub fn allocate(monthly: Money, level: RiskLevel) -> EngineResult<Vec<AssetAllocation>> {
    level
        .allocation()
        .into_iter()
        .map(|(asset, weight)| {
            Ok(AssetAllocation {
                asset,
                weight: Rate::new(weight),
                monthly_amount: monthly.scale(weight, "allocation")?,
            })
        })
        .collect()
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAdvice {
    pub user_risk: RiskLevel,
    pub system_risk: RiskLevel,
    pub blended_risk: RiskLevel,
    pub expected_return: Rate,
    pub allocation: Vec<AssetAllocation>,
}

pub fn advise(
    user: RiskLevel,
    profile: &PersonProfile,
    is_behind: bool,
    monthly: Money,
) -> EngineResult<RiskAdvice> {
    let system = system_risk_level(profile.years_to_retirement(), is_behind);
    let blended = blended_risk(user, system);
    Ok(RiskAdvice {
        user_risk: user,
        system_risk: system,
        blended_risk: blended,
        expected_return: portfolio_return(blended),
        allocation: allocate(monthly, blended)?,
    })
}
